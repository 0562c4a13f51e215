// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Generic Routing Encapsulation (RFC 2784, RFC 2890).
//!
//! The fixed header is a flags/version word and a protocol type,
//! followed by the optional checksum, key and sequence number words in
//! that order, each present when its flag bit is set.

use super::checksum::Checksum;
use super::checksum::HeaderChecksum;
use super::ether::ETHER_TYPE_IPV4;
use super::ether::ETHER_TYPE_IPV6;
use super::frame::Frame;
use super::headers::ParseError;
use super::headers::apply_op;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use bitflags::bitflags;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const GRE_HDR_SZ: usize = 4;
pub const GRE_OPT_SZ: usize = 4;

const VERSION_MASK: u16 = 0x0007;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct GreFlags: u16 {
        const CSUM = 0x8000;
        const KEY = 0x2000;
        const SEQ = 0x1000;
    }
}

#[repr(C)]
#[derive(
    Clone, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable,
    Unaligned,
)]
pub struct GreHdrRaw {
    pub flags_ver: [u8; 2],
    pub proto: [u8; 2],
}

#[derive(Clone, Debug, Default)]
pub struct GreHdr {
    base: GreHdrRaw,
    csum: Option<[u8; 4]>,
    key: Option<[u8; 4]>,
    seq: Option<[u8; 4]>,
}

impl GreHdr {
    pub fn parse(frame: &mut Frame<'_>) -> Result<Self, ParseError> {
        let bytes = frame.read_header(GRE_HDR_SZ)?;
        let (base, _) = GreHdrRaw::read_from_prefix(bytes).map_err(|_| bad("short"))?;

        let raw_flags = u16::from_be_bytes(base.flags_ver);
        if raw_flags & VERSION_MASK != 0 {
            return Err(bad("unsupported version"));
        }
        let flags = GreFlags::from_bits(raw_flags)
            .ok_or(bad("unsupported flags"))?;

        let mut opt = |present: bool| -> Result<Option<[u8; 4]>, ParseError> {
            if !present {
                return Ok(None);
            }
            let b = frame.read_header(GRE_OPT_SZ)?;
            Ok(Some([b[0], b[1], b[2], b[3]]))
        };

        let csum = opt(flags.contains(GreFlags::CSUM))?;
        let key = opt(flags.contains(GreFlags::KEY))?;
        let seq = opt(flags.contains(GreFlags::SEQ))?;
        Ok(Self { base, csum, key, seq })
    }

    pub fn flags(&self) -> GreFlags {
        GreFlags::from_bits_truncate(u16::from_be_bytes(self.base.flags_ver))
    }

    fn set_flag(&mut self, flag: GreFlags) {
        let flags = self.flags() | flag;
        self.base.flags_ver = flags.bits().to_be_bytes();
    }

    pub fn proto(&self) -> u16 {
        u16::from_be_bytes(self.base.proto)
    }

    pub fn hdr_len(&self) -> usize {
        GRE_HDR_SZ
            + [self.csum, self.key, self.seq].iter().flatten().count() * GRE_OPT_SZ
    }

    pub fn next_kind(&self) -> HeaderKind {
        match self.proto() {
            ETHER_TYPE_IPV4 => HeaderKind::Ip4,
            ETHER_TYPE_IPV6 => HeaderKind::Ip6,
            _ => HeaderKind::Opaque,
        }
    }

    pub fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.base.as_bytes());
        for opt in [self.csum, self.key, self.seq].iter().flatten() {
            out.extend_from_slice(opt);
        }
    }

    pub fn reload(&mut self, bytes: &[u8]) -> bool {
        let mut frame = Frame::new(bytes);
        match Self::parse(&mut frame) {
            Ok(hdr) if frame.is_empty() && hdr.flags() == self.flags() => {
                *self = hdr;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, num: FieldNum) -> Option<Vec<u8>> {
        match num {
            FieldNum::GreProtocol => Some(self.base.proto.to_vec()),
            FieldNum::GreKey => self.key.map(|k| k.to_vec()),
            FieldNum::GreSeq => self.seq.map(|s| s.to_vec()),
            _ => None,
        }
    }

    /// Apply `op` to a field. Key and sequence words are inserted on
    /// first use. `None` means no such field.
    pub fn update(&mut self, num: FieldNum, op: FieldOp, arg: &[u8]) -> Option<bool> {
        match num {
            FieldNum::GreProtocol => apply_op(&mut self.base.proto, op, arg),

            FieldNum::GreKey => {
                self.set_flag(GreFlags::KEY);
                apply_op(self.key.get_or_insert([0; 4]), op, arg);
            }

            FieldNum::GreSeq => {
                self.set_flag(GreFlags::SEQ);
                apply_op(self.seq.get_or_insert([0; 4]), op, arg);
            }

            _ => return None,
        }

        Some(true)
    }

    /// Stamp the protocol of the inner header, and the checksum over
    /// this header and `inner` when the checksum word is present.
    pub fn rebuild(&mut self, proto: Option<u16>, inner: impl FnOnce(&mut Vec<u8>)) {
        if let Some(proto) = proto {
            self.base.proto = proto.to_be_bytes();
        }

        if self.csum.is_none() {
            return;
        }

        self.csum = Some([0; 4]);
        let mut bytes = Vec::new();
        self.emit(&mut bytes);
        inner(&mut bytes);
        let hc = HeaderChecksum::from(Checksum::compute(&bytes)).bytes();
        self.csum = Some([hc[0], hc[1], 0, 0]);
    }
}

fn bad(msg: &'static str) -> ParseError {
    ParseError::BadHeader { kind: HeaderKind::Gre, msg }
}

/// The GRE protocol type for a header kind.
pub fn kind_proto(kind: HeaderKind) -> Option<u16> {
    match kind {
        HeaderKind::Ip4 => Some(ETHER_TYPE_IPV4),
        HeaderKind::Ip6 => Some(ETHER_TYPE_IPV6),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn options_in_order() {
        #[rustfmt::skip]
        let bytes = [
            0x30, 0x00, 0x86, 0xdd,
            // key
            0x00, 0x00, 0x12, 0x34,
            // seq
            0x00, 0x00, 0x00, 0x07,
        ];
        let gre = GreHdr::parse(&mut Frame::new(&bytes)).unwrap();
        assert_eq!(gre.hdr_len(), 12);
        assert_eq!(gre.next_kind(), HeaderKind::Ip6);
        assert_eq!(gre.get(FieldNum::GreKey), Some(vec![0, 0, 0x12, 0x34]));
        assert_eq!(gre.get(FieldNum::GreSeq), Some(vec![0, 0, 0, 7]));

        let mut out = vec![];
        gre.emit(&mut out);
        assert_eq!(out, bytes.to_vec());
    }

    #[test]
    fn key_inserted_on_first_set() {
        let mut gre = GreHdr::default();
        assert_eq!(gre.hdr_len(), 4);
        assert_eq!(gre.get(FieldNum::GreKey), None);
        gre.update(FieldNum::GreKey, FieldOp::Set, &[0xAB]);
        assert_eq!(gre.hdr_len(), 8);
        assert_eq!(gre.flags(), GreFlags::KEY);
        assert_eq!(gre.get(FieldNum::GreKey), Some(vec![0, 0, 0, 0xAB]));
    }

    #[test]
    fn checksum_covers_inner() {
        let bytes = [0x80, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut gre = GreHdr::parse(&mut Frame::new(&bytes)).unwrap();
        let inner = [0x45, 0x00, 0x00, 0x14];
        gre.rebuild(Some(ETHER_TYPE_IPV4), |out| out.extend_from_slice(&inner));

        let mut all = vec![];
        gre.emit(&mut all);
        all.extend_from_slice(&inner);
        assert_eq!(Checksum::compute(&all).finalize(), 0xFFFF);
    }

    #[test]
    fn routing_rejected() {
        let bytes = [0x40, 0x00, 0x08, 0x00];
        assert!(GreHdr::parse(&mut Frame::new(&bytes)).is_err());
        let bytes = [0x00, 0x01, 0x08, 0x00];
        assert!(GreHdr::parse(&mut Frame::new(&bytes)).is_err());
    }
}
