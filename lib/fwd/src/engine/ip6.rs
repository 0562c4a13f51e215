// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! IPv6 headers.
//!
//! Extension headers are not walked: a next header that is not a
//! protocol the engine parses leaves the rest of the frame opaque.

use super::frame::BitField;
use super::frame::Frame;
use super::headers::ParseError;
use super::headers::apply_bits;
use super::headers::apply_op;
use super::headers::get_bits;
use super::ip4::proto_kind;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use core::net::Ipv6Addr;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const IPV6_HDR_SZ: usize = 40;
pub const IPV6_VERSION: u64 = 6;
pub const DEF_HOP_LIMIT: u8 = 64;

const VERSION: BitField = BitField::new(28, 4);
const TRAFFIC_CLASS: BitField = BitField::new(20, 8);
const FLOW_LABEL: BitField = BitField::new(0, 20);

#[repr(C)]
#[derive(Clone, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct Ipv6HdrRaw {
    pub vtc_flow: [u8; 4],
    pub payload_len: [u8; 2],
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src: [u8; 16],
    pub dst: [u8; 16],
}

impl Default for Ipv6HdrRaw {
    fn default() -> Self {
        Ipv6HdrRaw {
            vtc_flow: [0x60, 0x00, 0x00, 0x00],
            payload_len: [0; 2],
            next_hdr: 0xFF,
            hop_limit: DEF_HOP_LIMIT,
            src: [0; 16],
            dst: [0; 16],
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Ipv6Hdr {
    base: Ipv6HdrRaw,
}

impl Ipv6Hdr {
    pub fn new(src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        Self {
            base: Ipv6HdrRaw {
                src: src.octets(),
                dst: dst.octets(),
                ..Default::default()
            },
        }
    }

    pub fn parse(frame: &mut Frame<'_>) -> Result<Self, ParseError> {
        let bytes = frame.read_header(IPV6_HDR_SZ)?;
        let hdr = Self::from_bytes(bytes).ok_or(bad("short"))?;
        if hdr.version() != IPV6_VERSION {
            return Err(bad("version is not 6"));
        }
        Ok(hdr)
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (base, rest) = Ipv6HdrRaw::read_from_prefix(bytes).ok()?;
        rest.is_empty().then_some(Self { base })
    }

    fn version(&self) -> u64 {
        u64::from(self.base.vtc_flow[0] >> 4)
    }

    pub fn hdr_len(&self) -> usize {
        IPV6_HDR_SZ
    }

    pub fn payload_len(&self) -> usize {
        usize::from(u16::from_be_bytes(self.base.payload_len))
    }

    pub fn next_hdr(&self) -> u8 {
        self.base.next_hdr
    }

    pub fn hop_limit(&self) -> u8 {
        self.base.hop_limit
    }

    pub fn src(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.base.src)
    }

    pub fn dst(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.base.dst)
    }

    pub fn next_kind(&self) -> HeaderKind {
        match proto_kind(self.base.next_hdr) {
            HeaderKind::Icmp4 => HeaderKind::Opaque,
            kind => kind,
        }
    }

    pub fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.base.as_bytes());
    }

    pub fn reload(&mut self, bytes: &[u8]) -> bool {
        match Self::from_bytes(bytes) {
            Some(hdr) => {
                *self = hdr;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, num: FieldNum) -> Option<Vec<u8>> {
        let val = match num {
            FieldNum::IpVersion => get_bits(&self.base.vtc_flow, VERSION, 1),
            FieldNum::IpQos => get_bits(&self.base.vtc_flow, TRAFFIC_CLASS, 1),
            FieldNum::IpFlowLabel => get_bits(&self.base.vtc_flow, FLOW_LABEL, 4),
            FieldNum::IpAddrSrc => self.base.src.to_vec(),
            FieldNum::IpAddrDst => self.base.dst.to_vec(),
            FieldNum::IpHop => vec![self.base.hop_limit],
            FieldNum::IpProtocol => vec![self.base.next_hdr],
            _ => return None,
        };
        Some(val)
    }

    /// Apply `op` to a field, returning whether the header is now
    /// dirty. `None` means no such field.
    pub fn update(
        &mut self,
        num: FieldNum,
        op: FieldOp,
        arg: &[u8],
    ) -> Option<bool> {
        match num {
            FieldNum::IpVersion => {
                apply_bits(&mut self.base.vtc_flow, VERSION, 1, op, arg)
            }
            FieldNum::IpQos => {
                apply_bits(&mut self.base.vtc_flow, TRAFFIC_CLASS, 1, op, arg)
            }
            FieldNum::IpFlowLabel => {
                apply_bits(&mut self.base.vtc_flow, FLOW_LABEL, 4, op, arg)
            }
            FieldNum::IpAddrSrc => apply_op(&mut self.base.src, op, arg),
            FieldNum::IpAddrDst => apply_op(&mut self.base.dst, op, arg),

            // No header checksum; the hop limit is covered by nothing.
            FieldNum::IpHop => {
                let mut hop = [self.base.hop_limit];
                apply_op(&mut hop, op, arg);
                self.base.hop_limit = hop[0];
                return Some(false);
            }

            FieldNum::IpProtocol => {
                let mut nh = [self.base.next_hdr];
                apply_op(&mut nh, op, arg);
                self.base.next_hdr = nh[0];
            }

            _ => return None,
        }

        Some(true)
    }

    pub fn rebuild(&mut self, payload_len: usize, next_hdr: Option<u8>) {
        let len = u16::try_from(payload_len).unwrap_or(u16::MAX);
        self.base.payload_len = len.to_be_bytes();
        if let Some(nh) = next_hdr {
            self.base.next_hdr = nh;
        }
    }
}

fn bad(msg: &'static str) -> ParseError {
    ParseError::BadHeader { kind: HeaderKind::Ip6, msg }
}
