// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! MPLS label stacks (RFC 3032).
//!
//! Each entry is a 32-bit word: a 20-bit label, 3 bits of traffic
//! class, the bottom-of-stack bit, and an 8-bit TTL.

use super::frame::BitField;
use super::frame::FieldView;
use super::frame::FieldViewMut;
use super::frame::Frame;
use super::headers::FieldError;
use super::headers::Handler;
use super::headers::HeaderError;
use super::headers::HeaderHandler;
use super::headers::ParseError;
use super::headers::apply_bits;
use super::headers::get_bits;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;


pub const MPLS_ENTRY_SZ: usize = 4;
pub const DEF_MPLS_TTL: u64 = 64;

const LABEL: BitField = BitField::new(12, 20);
const TC: BitField = BitField::new(9, 3);
const BOS: BitField = BitField::new(8, 1);
const TTL: BitField = BitField::new(0, 8);

type Entry = [u8; MPLS_ENTRY_SZ];

/// A label stack, outermost entry first.
#[derive(Clone, Debug)]
pub struct Mpls {
    stack: Vec<Entry>,
}

impl Default for Mpls {
    fn default() -> Self {
        let mut entry = [0; MPLS_ENTRY_SZ];
        let mut view = FieldViewMut::new(&mut entry);
        view.set_bits(BOS, 1);
        view.set_bits(TTL, DEF_MPLS_TTL);
        Self { stack: vec![entry] }
    }
}

pub fn parse(
    frame: &mut Frame<'_>,
    _kind: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let mut stack = vec![];

    loop {
        let bytes = frame.read_header(MPLS_ENTRY_SZ)?;
        let entry: Entry = [bytes[0], bytes[1], bytes[2], bytes[3]];
        stack.push(entry);
        if FieldView::new(&entry).bits(BOS) == 1 {
            break;
        }
    }

    Ok((Handler::Mpls(Mpls { stack }), HeaderKind::Opaque))
}

pub fn add(_kind: HeaderKind) -> Result<Handler, HeaderError> {
    Ok(Handler::Mpls(Mpls::default()))
}

impl Mpls {
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn label(&self, idx: usize) -> Option<u32> {
        let entry = self.stack.get(idx)?;
        u32::try_from(FieldView::new(entry).bits(LABEL)).ok()
    }

    fn entry(&self, num: FieldNum, instance: Instance) -> Result<usize, FieldError> {
        instance
            .resolve(self.stack.len())
            .ok_or_else(|| FieldError::no_field(num, instance))
    }
}

fn layout(num: FieldNum) -> Option<(BitField, usize)> {
    match num {
        FieldNum::MplsLabel => Some((LABEL, 4)),
        FieldNum::MplsTc => Some((TC, 1)),
        FieldNum::MplsTtl => Some((TTL, 1)),
        _ => None,
    }
}

impl HeaderHandler for Mpls {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        instance.resolve(self.stack.len()).map(|_| HeaderKind::Mpls)
    }

    fn len(&self) -> usize {
        MPLS_ENTRY_SZ * self.stack.len()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        for entry in &self.stack {
            out.extend_from_slice(entry);
        }
    }

    fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        let (bits, width) =
            layout(num).ok_or_else(|| FieldError::no_field(num, instance))?;
        let idx = self.entry(num, instance)?;
        Ok(get_bits(&self.stack[idx], bits, width))
    }

    fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<bool, FieldError> {
        let (bits, width) =
            layout(num).ok_or_else(|| FieldError::no_field(num, instance))?;
        let idx = self.entry(num, instance)?;
        apply_bits(&mut self.stack[idx], bits, width, op, arg);
        Ok(true)
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        let mut frame = Frame::new(bytes);
        match parse(&mut frame, HeaderKind::Mpls) {
            Ok((Handler::Mpls(mpls), _))
                if frame.is_empty() && mpls.depth() == self.depth() =>
            {
                self.stack = mpls.stack;
                true
            }
            _ => false,
        }
    }

    /// Push a new outermost entry, inheriting the TTL of the current
    /// outermost.
    fn modify(&mut self, kind: HeaderKind) -> Result<(), HeaderError> {
        if kind != HeaderKind::Mpls {
            return Err(HeaderError::DoubleEncap(kind));
        }

        let ttl = self
            .stack
            .first()
            .map(|e| FieldView::new(e).bits(TTL))
            .unwrap_or(DEF_MPLS_TTL);

        let mut entry = [0; MPLS_ENTRY_SZ];
        FieldViewMut::new(&mut entry).set_bits(TTL, ttl);
        self.stack.insert(0, entry);
        Ok(())
    }

    /// Pop the outermost entry.
    fn remove(&mut self, kind: HeaderKind) -> Result<bool, HeaderError> {
        if kind != HeaderKind::Mpls {
            return Err(HeaderError::WrongOutermost {
                want: kind,
                found: HeaderKind::Mpls,
            });
        }
        if !self.stack.is_empty() {
            self.stack.remove(0);
        }
        Ok(self.stack.is_empty())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    const TWO_LABELS: [u8; 10] = [
        // label 16, tc 0, ttl 64
        0x00, 0x01, 0x00, 0x40,
        // label 17, tc 5, bos, ttl 63
        0x00, 0x01, 0x1b, 0x3f,
        // payload
        0xde, 0xad,
    ];

    #[test]
    fn walk_to_bottom_of_stack() {
        let mut frame = Frame::new(&TWO_LABELS);
        let (h, next) = parse(&mut frame, HeaderKind::Mpls).unwrap();
        let Handler::Mpls(mpls) = h else { panic!("not mpls") };
        assert_eq!(next, HeaderKind::Opaque);
        assert_eq!(frame.len(), 2);
        assert_eq!(mpls.depth(), 2);
        assert_eq!(mpls.label(0), Some(16));
        assert_eq!(mpls.label(1), Some(17));
        assert_eq!(mpls.get(FieldNum::MplsTc, Instance::LAST).unwrap(), vec![5]);
        assert_eq!(mpls.get(FieldNum::MplsTtl, Instance::FIRST).unwrap(), vec![64]);
        assert_eq!(
            mpls.get(FieldNum::MplsLabel, Instance::new(1)).unwrap(),
            vec![0, 0, 0, 17]
        );
    }

    #[test]
    fn missing_bottom_of_stack() {
        assert!(matches!(
            parse(&mut Frame::new(&TWO_LABELS[..4]), HeaderKind::Mpls),
            Err(ParseError::Read(_))
        ));
    }

    #[test]
    fn push_and_pop() {
        let (h, _) = parse(&mut Frame::new(&TWO_LABELS), HeaderKind::Mpls).unwrap();
        let Handler::Mpls(mut mpls) = h else { panic!("not mpls") };

        mpls.modify(HeaderKind::Mpls).unwrap();
        mpls.update(FieldNum::MplsLabel, Instance::FIRST, FieldOp::Set, &[0x03, 0xE8])
            .unwrap();
        assert_eq!(mpls.depth(), 3);
        assert_eq!(mpls.label(0), Some(1000));

        let mut out = vec![];
        mpls.emit(&mut out);
        assert_eq!(out[..4], [0x00, 0x3E, 0x80, 0x40]);

        assert_eq!(mpls.remove(HeaderKind::Mpls), Ok(false));
        assert_eq!(mpls.remove(HeaderKind::Mpls), Ok(false));
        assert_eq!(mpls.remove(HeaderKind::Mpls), Ok(true));
    }

    #[test]
    fn synthesized_entry() {
        let Handler::Mpls(mpls) = add(HeaderKind::Mpls).unwrap() else {
            panic!("not mpls");
        };
        let mut out = vec![];
        mpls.emit(&mut out);
        assert_eq!(out, vec![0x00, 0x00, 0x01, 0x40]);
    }
}
