// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The internet checksum.
//!
//! [`Checksum`] is a rolling one's complement sum that can be built up
//! over several byte ranges, or incrementally adjusted by subtracting
//! old bytes and adding new ones (RFC 1624), before it is finalized
//! into the [`HeaderChecksum`] stored in a header.
//!
//! # Endianness
//!
//! The checksum is a pair of bytes, never a logical integer. Every
//! pair of bytes summed, and the checksum itself, is read and written
//! with `{to,from}_ne_bytes()`. Summing network-order data in host
//! order and storing the result in host order puts the result back in
//! network order (RFC 1071 section 1.B). An odd trailing byte is
//! summed as if padded with a zero byte.
//!
//! # Relevant RFCs
//!
//! * 1071 Computing the Internet Checksum
//!
//! * 1624 Computation of the Internet Checksum via Incremental Update

/// The checksum bytes as stored in a header: the one's complement of
/// the one's complement sum.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderChecksum {
    inner: [u8; 2],
}

impl HeaderChecksum {
    pub fn bytes(&self) -> [u8; 2] {
        self.inner
    }

    /// Wrap checksum bytes read from a header.
    pub fn wrap(hc: [u8; 2]) -> Self {
        Self { inner: hc }
    }
}

impl From<Checksum> for HeaderChecksum {
    fn from(mut csum: Checksum) -> HeaderChecksum {
        Self { inner: (!csum.finalize()).to_ne_bytes() }
    }
}

/// A rolling one's complement checksum. Carries are folded lazily.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Checksum {
    inner: u32,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a sum over `bytes`.
    pub fn compute(bytes: &[u8]) -> Self {
        Self { inner: csum_add(0, bytes) }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_add(self.inner, bytes);
    }

    /// Remove `bytes` from the sum, as when they are about to be
    /// overwritten.
    pub fn sub_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_sub(self.inner, bytes);
    }

    /// Fold the carries and return the sum.
    pub fn finalize(&mut self) -> u16 {
        while (self.inner >> 16) != 0 {
            self.inner = (self.inner >> 16) + (self.inner & 0xFFFF);
        }

        (self.inner & 0xFFFF) as u16
    }
}

impl From<HeaderChecksum> for Checksum {
    fn from(hc: HeaderChecksum) -> Self {
        Self { inner: u32::from(!u16::from_ne_bytes(hc.bytes())) }
    }
}

impl core::ops::AddAssign for Checksum {
    fn add_assign(&mut self, other: Self) {
        let mut other = other;
        self.add_bytes(&other.finalize().to_ne_bytes());
    }
}

// The accumulator is folded whenever its top bit is set, so ranges of
// any length cannot overflow it.
fn csum_add(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        csum += u32::from(u16::from_ne_bytes([pair[0], pair[1]]));
        if csum & 0x8000_0000 != 0 {
            csum = (csum >> 16) + (csum & 0xFFFF);
        }
    }

    if let [last] = chunks.remainder() {
        csum += u32::from(u16::from_ne_bytes([*last, 0]));
    }

    csum
}

fn csum_sub(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        csum += u32::from(!u16::from_ne_bytes([pair[0], pair[1]]));
        if csum & 0x8000_0000 != 0 {
            csum = (csum >> 16) + (csum & 0xFFFF);
        }
    }

    if let [last] = chunks.remainder() {
        csum += u32::from(!u16::from_ne_bytes([*last, 0]));
    }

    csum
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    const IP4: [u8; 20] = [
        0x45, 0x01, 0x00, 0x2c,
        0x00, 0x00, 0x00, 0x00,
        0xff, 0x06, 0xa1, 0xad,
        0x01, 0x02, 0x03, 0x04,
        0x0a, 0x0b, 0x0c, 0x0d,
    ];

    fn full(hdr: &[u8; 20]) -> [u8; 2] {
        let mut zeroed = *hdr;
        zeroed[10] = 0;
        zeroed[11] = 0;
        HeaderChecksum::from(Checksum::compute(&zeroed)).bytes()
    }

    #[test]
    fn full_compute() {
        assert_eq!(full(&IP4), [0xa1, 0xad]);
        let mut valid = Checksum::compute(&IP4);
        assert_eq!(valid.finalize(), 0xFFFF);
    }

    #[test]
    fn incremental_matches_full() {
        let mut hdr = IP4;
        let mut csum =
            Checksum::from(HeaderChecksum::wrap([hdr[10], hdr[11]]));
        csum.sub_bytes(&hdr[8..10]);
        hdr[8] -= 1;
        csum.add_bytes(&hdr[8..10]);
        let hc = HeaderChecksum::from(csum).bytes();

        assert_eq!(hc, [0xa2, 0xad]);
        assert_eq!(hc, full(&hdr));
    }

    #[test]
    fn odd_length() {
        let a = Checksum::compute(&[0x12, 0x34, 0x56]);
        let b = Checksum::compute(&[0x12, 0x34, 0x56, 0x00]);
        assert_eq!(a, b);

        let mut c = Checksum::compute(&[0x12, 0x34, 0x56]);
        c.sub_bytes(&[0x56]);
        assert_eq!(c.finalize(), Checksum::compute(&[0x12, 0x34]).finalize());
    }
}
