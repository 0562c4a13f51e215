// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! UDP headers.
//!
//! Over IPv4 a recomputed checksum is left zero (RFC 768 permits
//! this). Over IPv6 the checksum is mandatory, and a computed zero is
//! sent as all ones.

use super::frame::Frame;
use super::headers::FieldError;
use super::headers::Handler;
use super::headers::HeaderEnv;
use super::headers::HeaderError;
use super::headers::HeaderHandler;
use super::headers::ParseError;
use super::headers::apply_op;
use super::headers::single;
use super::ip::PseudoHeader;
use super::ip::upper_layer_csum;
use super::ip4::PROTO_UDP;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const UDP_HDR_SZ: usize = 8;

#[repr(C)]
#[derive(
    Clone, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable,
    Unaligned,
)]
pub struct UdpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub length: [u8; 2],
    pub csum: [u8; 2],
}

#[derive(Clone, Debug, Default)]
pub struct Udp {
    base: UdpHdrRaw,
    pseudo: PseudoHeader,
}

pub fn parse(
    frame: &mut Frame<'_>,
    _kind: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let bytes = frame.read_header(UDP_HDR_SZ)?;
    let (base, _) = UdpHdrRaw::read_from_prefix(bytes).map_err(|_| {
        ParseError::BadHeader { kind: HeaderKind::Udp, msg: "short" }
    })?;
    Ok((Handler::Udp(Udp { base, pseudo: PseudoHeader::default() }), HeaderKind::Opaque))
}

pub fn add(_kind: HeaderKind) -> Result<Handler, HeaderError> {
    Ok(Handler::Udp(Udp::default()))
}

impl Udp {
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.base.src_port)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.base.dst_port)
    }

    pub fn length(&self) -> u16 {
        u16::from_be_bytes(self.base.length)
    }

    pub fn csum(&self) -> [u8; 2] {
        self.base.csum
    }
}

impl HeaderHandler for Udp {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        (instance.resolve(1) == Some(0)).then_some(HeaderKind::Udp)
    }

    fn len(&self) -> usize {
        UDP_HDR_SZ
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
        match num {
            FieldNum::L4PortSrc => Ok(self.base.src_port.to_vec()),
            FieldNum::L4PortDst => Ok(self.base.dst_port.to_vec()),
            _ => Err(FieldError::no_field(num, instance)),
        }
    }

    fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<bool, FieldError> {
        single(num, instance)?;
        match num {
            FieldNum::L4PortSrc => apply_op(&mut self.base.src_port, op, arg),
            FieldNum::L4PortDst => apply_op(&mut self.base.dst_port, op, arg),
            _ => return Err(FieldError::no_field(num, instance)),
        }
        Ok(true)
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        match UdpHdrRaw::read_from_bytes(bytes) {
            Ok(base) => {
                self.base = base;
                true
            }
            Err(_) => false,
        }
    }

    fn attach(&mut self, env: &HeaderEnv<'_>) {
        self.pseudo.attach(env);
    }

    fn rebuild(&mut self, env: &HeaderEnv<'_>, dirty: bool) {
        let len = u16::try_from(UDP_HDR_SZ + env.inner_len()).unwrap_or(u16::MAX);
        let resized = len != self.length();
        self.base.length = len.to_be_bytes();

        let Some(addrs) = self.pseudo.stale(env, dirty || resized) else {
            return;
        };

        self.base.csum = [0; 2];
        if addrs.is_v4() {
            return;
        }

        let mut hdr = Vec::with_capacity(UDP_HDR_SZ);
        self.emit(&mut hdr);
        self.base.csum = match upper_layer_csum(&addrs, PROTO_UDP, &hdr, env) {
            [0, 0] => [0xFF, 0xFF],
            csum => csum,
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ports() {
        let bytes = [0x00, 0x35, 0xd4, 0x31, 0x00, 0x0c, 0xbe, 0xef, 1, 2, 3, 4];
        let mut frame = Frame::new(&bytes);
        let (h, next) = parse(&mut frame, HeaderKind::Udp).unwrap();
        let Handler::Udp(mut udp) = h else { panic!("not udp") };
        assert_eq!(next, HeaderKind::Opaque);
        assert_eq!(udp.src_port(), 53);
        assert_eq!(udp.length(), 12);
        assert_eq!(frame.len(), 4);

        udp.update(FieldNum::L4PortSrc, Instance::LAST, FieldOp::Set, &[0x01, 0xbb])
            .unwrap();
        assert_eq!(udp.get(FieldNum::L4PortSrc, Instance::FIRST).unwrap(), vec![0x01, 0xbb]);
        assert!(udp.get(FieldNum::TcpSeq, Instance::FIRST).is_err());
    }

    #[test]
    fn short() {
        assert!(parse(&mut Frame::new(&[0; 7]), HeaderKind::Udp).is_err());
    }
}
