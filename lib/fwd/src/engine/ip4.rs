// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! IPv4 headers.

use super::checksum::Checksum;
use super::checksum::HeaderChecksum;
use super::frame::BitField;
use super::frame::Frame;
use super::headers::ParseError;
use super::headers::apply_bits;
use super::headers::apply_op;
use super::headers::get_bits;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use core::net::Ipv4Addr;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const IPV4_HDR_LEN_MASK: u8 = 0x0F;
pub const IPV4_HDR_VER_MASK: u8 = 0xF0;
pub const IPV4_HDR_VER_SHIFT: u8 = 4;
pub const IPV4_VERSION: u8 = 4;
pub const IPV4_HDR_SZ: usize = 20;
pub const IPV4_MAX_HDR_SZ: usize = 60;
pub const DEF_TTL: u8 = 64;

const FLAG_MF: u16 = 0x2000;
const FRAG_OFFSET_MASK: u16 = 0x1FFF;
const VERSION: BitField = BitField::new(4, 4);

#[repr(C)]
#[derive(Clone, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: [u8; 2],
    pub ident: [u8; 2],
    pub frag_and_flags: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub csum: [u8; 2],
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Default for Ipv4HdrRaw {
    fn default() -> Self {
        Ipv4HdrRaw {
            ver_hdr_len: 0x45,
            dscp_ecn: 0x0,
            total_len: [0x0; 2],
            ident: [0x0; 2],
            frag_and_flags: [0x40, 0x0],
            ttl: DEF_TTL,
            proto: 0xFF,
            csum: [0x0; 2],
            src: [0x0; 4],
            dst: [0x0; 4],
        }
    }
}

/// An IPv4 header, options included.
#[derive(Clone, Debug, Default)]
pub struct Ipv4Hdr {
    base: Ipv4HdrRaw,
    opts: Vec<u8>,
}

impl Ipv4Hdr {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        let base =
            Ipv4HdrRaw { src: src.octets(), dst: dst.octets(), ..Default::default() };
        Self { base, opts: vec![] }
    }

    pub fn parse(frame: &mut Frame<'_>) -> Result<Self, ParseError> {
        let first = frame.peek(0, 1)?[0];
        let version = (first & IPV4_HDR_VER_MASK) >> IPV4_HDR_VER_SHIFT;
        if version != IPV4_VERSION {
            return Err(bad("version is not 4"));
        }

        let hdr_len = usize::from(first & IPV4_HDR_LEN_MASK) * 4;
        if hdr_len < IPV4_HDR_SZ {
            return Err(bad("header length below minimum"));
        }

        let bytes = frame.read_header(hdr_len)?;
        let hdr = Self::from_bytes(bytes).ok_or(bad("short"))?;
        if usize::from(hdr.total_len()) < hdr_len {
            return Err(bad("total length below header length"));
        }
        Ok(hdr)
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (base, opts) = Ipv4HdrRaw::read_from_prefix(bytes).ok()?;
        Some(Self { base, opts: opts.to_vec() })
    }

    pub fn hdr_len(&self) -> usize {
        IPV4_HDR_SZ + self.opts.len()
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes(self.base.total_len)
    }

    /// The number of bytes the header claims follow it.
    pub fn payload_len(&self) -> usize {
        usize::from(self.total_len()).saturating_sub(self.hdr_len())
    }

    pub fn proto(&self) -> u8 {
        self.base.proto
    }

    pub fn ttl(&self) -> u8 {
        self.base.ttl
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base.src)
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base.dst)
    }

    pub fn set_src(&mut self, src: [u8; 4]) {
        self.base.src = src;
    }

    pub fn set_dst(&mut self, dst: [u8; 4]) {
        self.base.dst = dst;
    }

    pub fn csum(&self) -> [u8; 2] {
        self.base.csum
    }

    /// Is this any fragment other than a whole datagram?
    pub fn is_fragment(&self) -> bool {
        let ff = u16::from_be_bytes(self.base.frag_and_flags);
        ff & FLAG_MF != 0 || ff & FRAG_OFFSET_MASK != 0
    }

    /// The kind of the header carried in the payload.
    pub fn next_kind(&self) -> HeaderKind {
        if self.is_fragment() {
            return HeaderKind::Opaque;
        }

        proto_kind(self.base.proto)
    }

    pub fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.base.as_bytes());
        out.extend_from_slice(&self.opts);
    }

    /// Replace the header with `bytes` if they describe a header of
    /// the same length.
    pub fn reload(&mut self, bytes: &[u8]) -> bool {
        match Self::from_bytes(bytes) {
            Some(hdr) if hdr.hdr_len() == self.hdr_len() => {
                *self = hdr;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, num: FieldNum) -> Option<Vec<u8>> {
        let val = match num {
            FieldNum::IpVersion => get_bits(&[self.base.ver_hdr_len], VERSION, 1),
            FieldNum::IpAddrSrc => self.base.src.to_vec(),
            FieldNum::IpAddrDst => self.base.dst.to_vec(),
            FieldNum::IpHop => vec![self.base.ttl],
            FieldNum::IpProtocol => vec![self.base.proto],
            FieldNum::IpQos => vec![self.base.dscp_ecn],
            _ => return None,
        };
        Some(val)
    }

    /// Apply `op` to a field, returning whether the checksum needs a
    /// full recompute. `None` means no such field.
    pub fn update(
        &mut self,
        num: FieldNum,
        op: FieldOp,
        arg: &[u8],
    ) -> Option<bool> {
        match num {
            FieldNum::IpHop if op == FieldOp::Dec => {
                self.dec_ttl(arg);
                return Some(false);
            }

            FieldNum::IpVersion => {
                let mut vhl = [self.base.ver_hdr_len];
                apply_bits(&mut vhl, VERSION, 1, op, arg);
                self.base.ver_hdr_len = vhl[0];
            }

            FieldNum::IpAddrSrc => apply_op(&mut self.base.src, op, arg),
            FieldNum::IpAddrDst => apply_op(&mut self.base.dst, op, arg),

            FieldNum::IpHop => {
                let mut ttl = [self.base.ttl];
                apply_op(&mut ttl, op, arg);
                self.base.ttl = ttl[0];
            }

            FieldNum::IpProtocol => {
                let mut proto = [self.base.proto];
                apply_op(&mut proto, op, arg);
                self.base.proto = proto[0];
            }

            FieldNum::IpQos => {
                let mut qos = [self.base.dscp_ecn];
                apply_op(&mut qos, op, arg);
                self.base.dscp_ecn = qos[0];
            }

            _ => return None,
        }

        Some(true)
    }

    /// Decrement the TTL, adjusting the checksum incrementally
    /// (RFC 1624). TTL shares its 16-bit word with the protocol.
    fn dec_ttl(&mut self, arg: &[u8]) {
        let mut csum = Checksum::from(HeaderChecksum::wrap(self.base.csum));
        csum.sub_bytes(&[self.base.ttl, self.base.proto]);
        let mut ttl = [self.base.ttl];
        apply_op(&mut ttl, FieldOp::Dec, arg);
        self.base.ttl = ttl[0];
        csum.add_bytes(&[self.base.ttl, self.base.proto]);
        self.base.csum = HeaderChecksum::from(csum).bytes();
    }

    /// Stamp the payload length and protocol, recomputing the checksum
    /// if anything changed or `force` is set.
    pub fn rebuild(&mut self, payload_len: usize, proto: Option<u8>, force: bool) {
        let total = u16::try_from(self.hdr_len() + payload_len).unwrap_or(u16::MAX);
        let proto = proto.unwrap_or(self.base.proto);
        let changed = total != self.total_len() || proto != self.base.proto;

        self.base.total_len = total.to_be_bytes();
        self.base.proto = proto;

        if changed || force {
            self.compute_csum();
        }
    }

    pub fn compute_csum(&mut self) {
        self.base.csum = [0; 2];
        let mut csum = Checksum::compute(self.base.as_bytes());
        csum.add_bytes(&self.opts);
        self.base.csum = HeaderChecksum::from(csum).bytes();
    }
}

fn bad(msg: &'static str) -> ParseError {
    ParseError::BadHeader { kind: HeaderKind::Ip4, msg }
}

/// The header kind for an IP protocol number.
pub fn proto_kind(proto: u8) -> HeaderKind {
    match proto {
        PROTO_ICMP => HeaderKind::Icmp4,
        PROTO_IPIP => HeaderKind::Ip4,
        PROTO_TCP => HeaderKind::Tcp,
        PROTO_UDP => HeaderKind::Udp,
        PROTO_IPV6 => HeaderKind::Ip6,
        PROTO_GRE => HeaderKind::Gre,
        PROTO_ICMPV6 => HeaderKind::Icmp6,
        _ => HeaderKind::Opaque,
    }
}

/// The IP protocol number for a header kind, if it has one.
pub fn kind_proto(kind: HeaderKind) -> Option<u8> {
    match kind {
        HeaderKind::Icmp4 => Some(PROTO_ICMP),
        HeaderKind::Ip4 => Some(PROTO_IPIP),
        HeaderKind::Tcp => Some(PROTO_TCP),
        HeaderKind::Udp => Some(PROTO_UDP),
        HeaderKind::Ip6 => Some(PROTO_IPV6),
        HeaderKind::Gre => Some(PROTO_GRE),
        HeaderKind::Icmp6 => Some(PROTO_ICMPV6),
        _ => None,
    }
}

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_IPIP: u8 = 4;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;
pub const PROTO_IPV6: u8 = 41;
pub const PROTO_GRE: u8 = 47;
pub const PROTO_ICMPV6: u8 = 58;
