// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! ARP for IPv4 over Ethernet.

use super::ether::ETHER_TYPE_IPV4;
use super::frame::Frame;
use super::headers::FieldError;
use super::headers::Handler;
use super::headers::HeaderHandler;
use super::headers::ParseError;
use super::headers::apply_op;
use super::headers::single;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use crate::api::MacAddr;
use core::net::Ipv4Addr;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const ARP_HTYPE_ETHERNET: u16 = 1;
pub const ARP_HDR_SZ: usize = 28;

pub const ARP_REQUEST: u16 = 1;
pub const ARP_REPLY: u16 = 2;

#[repr(C)]
#[derive(
    Clone, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable,
    Unaligned,
)]
pub struct ArpEthIpv4Raw {
    pub htype: [u8; 2],
    pub ptype: [u8; 2],
    pub hlen: u8,
    pub plen: u8,
    pub op: [u8; 2],
    pub sha: [u8; 6],
    pub spa: [u8; 4],
    pub tha: [u8; 6],
    pub tpa: [u8; 4],
}

impl ArpEthIpv4Raw {
    fn validate(&self) -> Result<(), ParseError> {
        if u16::from_be_bytes(self.htype) != ARP_HTYPE_ETHERNET {
            return Err(bad("hardware type is not Ethernet"));
        }
        if u16::from_be_bytes(self.ptype) != ETHER_TYPE_IPV4 {
            return Err(bad("protocol type is not IPv4"));
        }
        if self.hlen != 6 || self.plen != 4 {
            return Err(bad("bad address length"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Arp {
    base: ArpEthIpv4Raw,
}

fn bad(msg: &'static str) -> ParseError {
    ParseError::BadHeader { kind: HeaderKind::Arp, msg }
}

pub fn parse(
    frame: &mut Frame<'_>,
    _kind: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let bytes = frame.read_header(ARP_HDR_SZ)?;
    let (base, _) =
        ArpEthIpv4Raw::read_from_prefix(bytes).map_err(|_| bad("short"))?;
    base.validate()?;
    Ok((Handler::Arp(Arp { base }), HeaderKind::Opaque))
}

impl Arp {
    pub fn op(&self) -> u16 {
        u16::from_be_bytes(self.base.op)
    }

    pub fn sha(&self) -> MacAddr {
        MacAddr::from(self.base.sha)
    }

    pub fn spa(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base.spa)
    }

    pub fn tha(&self) -> MacAddr {
        MacAddr::from(self.base.tha)
    }

    pub fn tpa(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base.tpa)
    }

    fn field_mut(&mut self, num: FieldNum) -> Option<&mut [u8]> {
        let f: &mut [u8] = match num {
            FieldNum::ArpOp => &mut self.base.op,
            FieldNum::ArpSha => &mut self.base.sha,
            FieldNum::ArpSpa => &mut self.base.spa,
            FieldNum::ArpTha => &mut self.base.tha,
            FieldNum::ArpTpa => &mut self.base.tpa,
            _ => return None,
        };
        Some(f)
    }
}

impl HeaderHandler for Arp {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        (instance.resolve(1) == Some(0)).then_some(HeaderKind::Arp)
    }

    fn len(&self) -> usize {
        ARP_HDR_SZ
    }

    fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.base.as_bytes());
    }

    fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        single(num, instance)?;
        let val: &[u8] = match num {
            FieldNum::ArpOp => &self.base.op,
            FieldNum::ArpSha => &self.base.sha,
            FieldNum::ArpSpa => &self.base.spa,
            FieldNum::ArpTha => &self.base.tha,
            FieldNum::ArpTpa => &self.base.tpa,
            _ => return Err(FieldError::no_field(num, instance)),
        };
        Ok(val.to_vec())
    }

    fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<bool, FieldError> {
        single(num, instance)?;
        let field = self
            .field_mut(num)
            .ok_or_else(|| FieldError::no_field(num, instance))?;
        apply_op(field, op, arg);
        Ok(true)
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        match ArpEthIpv4Raw::read_from_bytes(bytes) {
            Ok(base) if base.validate().is_ok() => {
                self.base = base;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    const REQUEST: [u8; 28] = [
        0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01,
        0xa8, 0x40, 0x25, 0xff, 0x00, 0x01,
        10, 0, 0, 1,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        10, 0, 0, 2,
    ];

    #[test]
    fn request_fields() {
        let mut frame = Frame::new(&REQUEST);
        let (h, next) = parse(&mut frame, HeaderKind::Arp).unwrap();
        let Handler::Arp(mut arp) = h else { panic!("not arp") };
        assert_eq!(next, HeaderKind::Opaque);
        assert_eq!(arp.op(), ARP_REQUEST);
        assert_eq!(arp.spa(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(arp.get(FieldNum::ArpTpa, Instance::FIRST).unwrap(), vec![10, 0, 0, 2]);

        arp.update(FieldNum::ArpOp, Instance::FIRST, FieldOp::Set, &[2]).unwrap();
        assert_eq!(arp.op(), ARP_REPLY);
        assert!(arp.get(FieldNum::IpHop, Instance::FIRST).is_err());
    }

    #[test]
    fn rejects_non_ipv4() {
        let mut bytes = REQUEST;
        bytes[2] = 0x86;
        bytes[3] = 0xdd;
        assert!(matches!(
            parse(&mut Frame::new(&bytes), HeaderKind::Arp),
            Err(ParseError::BadHeader { .. })
        ));
        bytes = REQUEST;
        bytes[5] = 16;
        assert!(parse(&mut Frame::new(&bytes), HeaderKind::Arp).is_err());
    }

    #[test]
    fn udf_write_keeps_shape() {
        let (mut h, _) = parse(&mut Frame::new(&REQUEST), HeaderKind::Arp).unwrap();
        assert!(h.write_udf(24, &[192, 168, 0, 1]));
        assert_eq!(h.get(FieldNum::ArpTpa, Instance::FIRST).unwrap(), vec![192, 168, 0, 1]);
        assert!(!h.write_udf(0, &[0, 2]));
    }
}
