// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Frame cursors and byte/bit field views.
//!
//! All field values are network order. Numeric access is only defined
//! for widths of 1, 2, 4 and 8 bytes; asking for anything else is a
//! bug in the caller and panics. Byte-level `set` and the wrapping
//! arithmetic helpers work for any width.

use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ReadErr {
    #[error("end of frame")]
    EndOfFrame,

    #[error("not enough bytes: wanted {wanted}, have {avail}")]
    NotEnoughBytes { wanted: usize, avail: usize },
}

/// A read cursor over a frame's bytes.
///
/// Bytes before the read position have been consumed by a header;
/// bytes after the end have been stripped as trailer. Neither is
/// reachable again through the cursor.
#[derive(Clone, Debug)]
pub struct Frame<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Frame<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, end: buf.len() }
    }

    /// The number of unread bytes.
    pub fn len(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The offset of the read position from the start of the frame.
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn check(&self, wanted: usize) -> Result<(), ReadErr> {
        let avail = self.len();
        if avail == 0 && wanted > 0 {
            return Err(ReadErr::EndOfFrame);
        }
        if wanted > avail {
            return Err(ReadErr::NotEnoughBytes { wanted, avail });
        }
        Ok(())
    }

    /// Borrow `n` bytes starting `offset` bytes past the read position,
    /// without advancing.
    pub fn peek(&self, offset: usize, n: usize) -> Result<&'a [u8], ReadErr> {
        self.check(offset.saturating_add(n))?;
        let start = self.pos + offset;
        Ok(&self.buf[start..start + n])
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_header(&mut self, n: usize) -> Result<&'a [u8], ReadErr> {
        self.check(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    /// Borrow everything left and advance to the end.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let start = self.pos;
        self.pos = self.end;
        &self.buf[start..self.end]
    }

    /// Shrink the frame by `n` bytes from the tail, returning them.
    pub fn strip_trailing(&mut self, n: usize) -> Result<&'a [u8], ReadErr> {
        self.check(n)?;
        self.end -= n;
        Ok(&self.buf[self.end..self.end + n])
    }
}

#[track_caller]
fn check_numeric(width: usize) {
    assert!(
        matches!(width, 1 | 2 | 4 | 8),
        "numeric field access on unsupported width {width}"
    );
}

/// A range of bits within a numeric field, `pos` bits up from the
/// least significant bit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BitField {
    pub pos: u8,
    pub count: u8,
}

impl BitField {
    pub const fn new(pos: u8, count: u8) -> Self {
        Self { pos, count }
    }

    const fn mask(&self) -> u64 {
        if self.count >= 64 { u64::MAX } else { (1u64 << self.count) - 1 }
    }
}

/// A read-only view of a field.
#[derive(Clone, Copy, Debug)]
pub struct FieldView<'a> {
    bytes: &'a [u8],
}

impl<'a> FieldView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The field as a big-endian number.
    ///
    /// # Panics
    ///
    /// If the field is not 1, 2, 4 or 8 bytes wide.
    #[track_caller]
    pub fn get(&self) -> u64 {
        check_numeric(self.bytes.len());
        self.bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    }

    #[track_caller]
    pub fn bits(&self, bits: BitField) -> u64 {
        (self.get() >> bits.pos) & bits.mask()
    }
}

/// A mutable view of a field. All writes land in place.
#[derive(Debug)]
pub struct FieldViewMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> FieldViewMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn view(&self) -> FieldView<'_> {
        FieldView::new(self.bytes)
    }

    #[track_caller]
    pub fn get(&self) -> u64 {
        self.view().get()
    }

    /// Store `val` as a big-endian number, truncated to the width.
    ///
    /// # Panics
    ///
    /// If the field is not 1, 2, 4 or 8 bytes wide.
    #[track_caller]
    pub fn set_num(&mut self, val: u64) {
        let width = self.bytes.len();
        check_numeric(width);
        let be = val.to_be_bytes();
        self.bytes.copy_from_slice(&be[8 - width..]);
    }

    #[track_caller]
    pub fn set_bits(&mut self, bits: BitField, val: u64) {
        let mask = bits.mask() << bits.pos;
        let cur = self.get() & !mask;
        self.set_num(cur | ((val << bits.pos) & mask));
    }

    /// Copy `src` in, left-padding with zeros or dropping its high
    /// bytes to fit the field.
    pub fn set(&mut self, src: &[u8]) {
        set_bytes(self.bytes, src);
    }
}

/// Copy `src` into `dst` with network-order resizing: a short `src`
/// is left-padded with zeros, a long one loses its high bytes.
pub fn set_bytes(dst: &mut [u8], src: &[u8]) {
    let dlen = dst.len();
    let slen = src.len();

    if slen >= dlen {
        dst.copy_from_slice(&src[slen - dlen..]);
    } else {
        let pad = dlen - slen;
        dst[..pad].fill(0);
        dst[pad..].copy_from_slice(src);
    }
}

/// `src` resized to `width` bytes, as [`set_bytes`] would store it.
pub fn resize_be(src: &[u8], width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    set_bytes(&mut out, src);
    out
}

/// `dst += arg`, wrapping at the width of `dst`. `arg` is aligned to
/// the low-order end of `dst`.
pub fn wrapping_add_be(dst: &mut [u8], arg: &[u8]) {
    let mut carry = 0u16;
    let mut args = arg.iter().rev();

    for d in dst.iter_mut().rev() {
        let a = args.next().copied().unwrap_or(0);
        let sum = u16::from(*d) + u16::from(a) + carry;
        *d = sum as u8;
        carry = sum >> 8;
    }
}

/// `dst -= arg`, wrapping at the width of `dst`.
pub fn wrapping_sub_be(dst: &mut [u8], arg: &[u8]) {
    let mut borrow = 0i16;
    let mut args = arg.iter().rev();

    for d in dst.iter_mut().rev() {
        let a = args.next().copied().unwrap_or(0);
        let mut diff = i16::from(*d) - i16::from(a) - borrow;
        if diff < 0 {
            diff += 0x100;
            borrow = 1;
        } else {
            borrow = 0;
        }
        *d = diff as u8;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cursor_reads() {
        let bytes = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut frame = Frame::new(&bytes);
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.peek(2, 2).unwrap(), &[3, 4]);
        assert_eq!(frame.read_header(3).unwrap(), &[1, 2, 3]);
        assert_eq!(frame.offset(), 3);
        assert_eq!(frame.strip_trailing(2).unwrap(), &[7, 8]);
        assert_eq!(frame.len(), 3);
        assert_eq!(
            frame.read_header(4),
            Err(ReadErr::NotEnoughBytes { wanted: 4, avail: 3 })
        );
        assert_eq!(frame.read_rest(), &[4, 5, 6]);
        assert_eq!(frame.peek(0, 1), Err(ReadErr::EndOfFrame));
        assert!(frame.strip_trailing(1).is_err());
        assert_eq!(frame.peek(0, 0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn strip_never_touches_read_bytes() {
        let bytes = [1, 2, 3, 4];
        let mut frame = Frame::new(&bytes);
        frame.read_header(3).unwrap();
        assert!(frame.strip_trailing(2).is_err());
        assert_eq!(frame.strip_trailing(1).unwrap(), &[4]);
    }

    #[test]
    fn numeric_views() {
        let mut bytes = [0x12, 0x34, 0x56, 0x78];
        let mut f = FieldViewMut::new(&mut bytes);
        assert_eq!(f.get(), 0x1234_5678);
        f.set_num(0xAABB_CCDD_0011_2233);
        assert_eq!(bytes, [0x00, 0x11, 0x22, 0x33]);
    }

    #[test]
    fn bit_views() {
        // An IPv6 first word: version 6, traffic class 0xAB, flow
        // label 0xCDEF1.
        let mut word = [0x6A, 0xBC, 0xDE, 0xF1];
        let tc = BitField::new(20, 8);
        let flow = BitField::new(0, 20);
        assert_eq!(FieldView::new(&word).bits(tc), 0xAB);
        assert_eq!(FieldView::new(&word).bits(flow), 0xCDEF1);

        FieldViewMut::new(&mut word).set_bits(tc, 0x1FF);
        assert_eq!(word, [0x6F, 0xFC, 0xDE, 0xF1]);
        FieldViewMut::new(&mut word).set_bits(flow, 0x12345);
        assert_eq!(word, [0x6F, 0xF1, 0x23, 0x45]);
    }

    #[test]
    #[should_panic]
    fn numeric_get_bad_width() {
        FieldView::new(&[1, 2, 3]).get();
    }

    #[test]
    #[should_panic]
    fn numeric_set_bad_width() {
        FieldViewMut::new(&mut [0u8; 6]).set_num(1);
    }

    #[test]
    fn resize_semantics() {
        assert_eq!(resize_be(&[0xAB], 3), vec![0, 0, 0xAB]);
        assert_eq!(resize_be(&[1, 2, 3, 4], 2), vec![3, 4]);
        let mut dst = [9u8; 2];
        FieldViewMut::new(&mut dst).set(&[7]);
        assert_eq!(dst, [0, 7]);
    }

    #[test]
    fn wrapping_arithmetic() {
        let mut v = [0x00, 0xFF, 0xFF];
        wrapping_add_be(&mut v, &[1]);
        assert_eq!(v, [0x01, 0x00, 0x00]);
        wrapping_sub_be(&mut v, &[1]);
        assert_eq!(v, [0x00, 0xFF, 0xFF]);

        let mut v = [0xFF, 0xFF, 0xFF];
        wrapping_add_be(&mut v, &[2]);
        assert_eq!(v, [0x00, 0x00, 0x01]);

        let mut v = [0x00];
        wrapping_sub_be(&mut v, &[0x01]);
        assert_eq!(v, [0xFF]);
    }
}
