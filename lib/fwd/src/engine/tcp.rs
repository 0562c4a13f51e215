// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! TCP headers.

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
use super::ip4::PROTO_TCP;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const TCP_HDR_OFFSET_MASK: u8 = 0xF0;
pub const TCP_HDR_OFFSET_SHIFT: u8 = 4;
pub const TCP_HDR_SZ: usize = 20;

#[repr(C)]
#[derive(
    Clone, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable,
    Unaligned,
)]
pub struct TcpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub seq: [u8; 4],
    pub ack: [u8; 4],
    pub offset: u8,
    pub flags: u8,
    pub win: [u8; 2],
    pub csum: [u8; 2],
    pub urg: [u8; 2],
}

#[derive(Clone, Debug)]
pub struct Tcp {
    base: TcpHdrRaw,
    opts: Vec<u8>,
    pseudo: PseudoHeader,
}

impl Default for Tcp {
    fn default() -> Self {
        let base = TcpHdrRaw {
            offset: (TCP_HDR_SZ as u8 / 4) << TCP_HDR_OFFSET_SHIFT,
            ..Default::default()
        };
        Self { base, opts: vec![], pseudo: PseudoHeader::default() }
    }
}

pub fn parse(
    frame: &mut Frame<'_>,
    _kind: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let bytes = frame.read_header(TCP_HDR_SZ)?;
    let (base, _) = TcpHdrRaw::read_from_prefix(bytes).map_err(|_| bad("short"))?;

    let hdr_len =
        usize::from((base.offset & TCP_HDR_OFFSET_MASK) >> TCP_HDR_OFFSET_SHIFT) * 4;
    if hdr_len < TCP_HDR_SZ {
        return Err(bad("data offset below minimum"));
    }
    let opts = frame.read_header(hdr_len - TCP_HDR_SZ)?.to_vec();

    let tcp = Tcp { base, opts, pseudo: PseudoHeader::default() };
    Ok((Handler::Tcp(tcp), HeaderKind::Opaque))
}

pub fn add(_kind: HeaderKind) -> Result<Handler, HeaderError> {
    Ok(Handler::Tcp(Tcp::default()))
}

fn bad(msg: &'static str) -> ParseError {
    ParseError::BadHeader { kind: HeaderKind::Tcp, msg }
}

impl Tcp {
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.base.src_port)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.base.dst_port)
    }

    pub fn csum(&self) -> [u8; 2] {
        self.base.csum
    }

    fn field_mut(&mut self, num: FieldNum) -> Option<&mut [u8]> {
        let f: &mut [u8] = match num {
            FieldNum::L4PortSrc => &mut self.base.src_port,
            FieldNum::L4PortDst => &mut self.base.dst_port,
            FieldNum::TcpSeq => &mut self.base.seq,
            FieldNum::TcpAck => &mut self.base.ack,
            FieldNum::TcpFlags => core::slice::from_mut(&mut self.base.flags),
            _ => return None,
        };
        Some(f)
    }
}

impl HeaderHandler for Tcp {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        (instance.resolve(1) == Some(0)).then_some(HeaderKind::Tcp)
    }

    fn len(&self) -> usize {
        TCP_HDR_SZ + self.opts.len()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.base.as_bytes());
        out.extend_from_slice(&self.opts);
    }

    fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        single(num, instance)?;
        let val = match num {
            FieldNum::L4PortSrc => self.base.src_port.to_vec(),
            FieldNum::L4PortDst => self.base.dst_port.to_vec(),
            FieldNum::TcpSeq => self.base.seq.to_vec(),
            FieldNum::TcpAck => self.base.ack.to_vec(),
            FieldNum::TcpFlags => vec![self.base.flags],
            _ => return Err(FieldError::no_field(num, instance)),
        };
        Ok(val)
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
        let mut frame = Frame::new(bytes);
        match parse(&mut frame, HeaderKind::Tcp) {
            Ok((Handler::Tcp(tcp), _)) if frame.is_empty() => {
                self.base = tcp.base;
                self.opts = tcp.opts;
                true
            }
            _ => false,
        }
    }

    fn attach(&mut self, env: &HeaderEnv<'_>) {
        self.pseudo.attach(env);
    }

    fn rebuild(&mut self, env: &HeaderEnv<'_>, dirty: bool) {
        let Some(addrs) = self.pseudo.stale(env, dirty) else {
            return;
        };

        self.base.csum = [0; 2];
        let mut hdr = Vec::with_capacity(self.len());
        self.emit(&mut hdr);
        self.base.csum = upper_layer_csum(&addrs, PROTO_TCP, &hdr, env);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    const SYN: [u8; 24] = [
        0x30, 0x39, 0x00, 0x50,
        0x00, 0x00, 0x00, 0x01,
        0x00, 0x00, 0x00, 0x00,
        0x60, 0x02, 0xff, 0xff,
        0x00, 0x00, 0x00, 0x00,
        // MSS option
        0x02, 0x04, 0x05, 0xb4,
    ];

    #[test]
    fn parse_with_options() {
        let mut frame = Frame::new(&SYN);
        let (h, next) = parse(&mut frame, HeaderKind::Tcp).unwrap();
        let Handler::Tcp(tcp) = h else { panic!("not tcp") };
        assert_eq!(next, HeaderKind::Opaque);
        assert_eq!(tcp.len(), 24);
        assert_eq!(tcp.src_port(), 12345);
        assert_eq!(tcp.get(FieldNum::TcpFlags, Instance::FIRST).unwrap(), vec![0x02]);

        let mut out = vec![];
        tcp.emit(&mut out);
        assert_eq!(out, SYN.to_vec());
    }

    #[test]
    fn bad_offset() {
        let mut bytes = SYN;
        bytes[12] = 0x40;
        assert!(parse(&mut Frame::new(&bytes), HeaderKind::Tcp).is_err());
        bytes[12] = 0x70;
        assert!(matches!(
            parse(&mut Frame::new(&bytes), HeaderKind::Tcp),
            Err(ParseError::Read(_))
        ));
    }

    #[test]
    fn port_update() {
        let mut tcp = Tcp::default();
        assert!(tcp.update(FieldNum::L4PortDst, Instance::FIRST, FieldOp::Set, &[0x1f, 0x90]).unwrap());
        tcp.update(FieldNum::L4PortDst, Instance::FIRST, FieldOp::Inc, &[1]).unwrap();
        assert_eq!(tcp.dst_port(), 8081);
        assert!(tcp.get(FieldNum::IcmpType, Instance::FIRST).is_err());
        assert!(tcp.get(FieldNum::L4PortSrc, Instance::new(1)).is_err());
    }
}
