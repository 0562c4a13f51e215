// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! ICMPv6, including the Neighbor Discovery messages (RFC 4861).
//!
//! For ND messages the type-specific body (target and destination
//! addresses, router advertisement timers) and the trailing options
//! are part of the header. Options are type-length-value records whose
//! length counts 8-octet units, type and length bytes included.

use super::ICMP_HDR_SZ;
use super::IcmpHdrRaw;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use crate::engine::frame::Frame;
use crate::engine::headers::FieldError;
use crate::engine::headers::Handler;
use crate::engine::headers::HeaderEnv;
use crate::engine::headers::HeaderError;
use crate::engine::headers::HeaderHandler;
use crate::engine::headers::ParseError;
use crate::engine::headers::apply_op;
use crate::engine::headers::single;
use crate::engine::ip::PseudoHeader;
use crate::engine::ip::upper_layer_csum;
use crate::engine::ip4::PROTO_ICMPV6;
use zerocopy::IntoBytes;

pub const ND_ROUTER_SOLICIT: u8 = 133;
pub const ND_ROUTER_ADVERT: u8 = 134;
pub const ND_NEIGHBOR_SOLICIT: u8 = 135;
pub const ND_NEIGHBOR_ADVERT: u8 = 136;
pub const ND_REDIRECT: u8 = 137;

pub const ND_OPT_SLL: u8 = 1;
pub const ND_OPT_TLL: u8 = 2;

const ND_OPT_UNIT: usize = 8;
const ND_TARGET_SZ: usize = 16;
const LL_ADDR_SZ: usize = 6;

/// The length of the fixed body following the ICMPv6 header for an
/// ND message type. `None` for anything that isn't ND.
fn nd_body_len(msg_type: u8) -> Option<usize> {
    match msg_type {
        ND_ROUTER_SOLICIT => Some(0),
        ND_ROUTER_ADVERT => Some(8),
        ND_NEIGHBOR_SOLICIT | ND_NEIGHBOR_ADVERT => Some(ND_TARGET_SZ),
        ND_REDIRECT => Some(2 * ND_TARGET_SZ),
        _ => None,
    }
}

/// A Neighbor Discovery option. `data` excludes the type and length
/// bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NdOption {
    pub opt_type: u8,
    pub data: Vec<u8>,
}

impl NdOption {
    fn wire_len(&self) -> usize {
        2 + self.data.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Icmp6 {
    base: IcmpHdrRaw,
    body: Vec<u8>,
    opts: Vec<NdOption>,
    pseudo: PseudoHeader,
}

fn malformed(msg: &'static str) -> ParseError {
    ParseError::MalformedOption { kind: HeaderKind::Icmp6, msg }
}

fn parse_opts(frame: &mut Frame<'_>) -> Result<Vec<NdOption>, ParseError> {
    let mut opts = vec![];

    while !frame.is_empty() {
        let tl = frame.peek(0, 2).map_err(|_| malformed("truncated"))?;
        let len = usize::from(tl[1]) * ND_OPT_UNIT;
        if len == 0 {
            return Err(malformed("zero length"));
        }
        if len > frame.len() {
            return Err(malformed("overruns the frame"));
        }

        let bytes = frame.read_header(len)?;
        opts.push(NdOption { opt_type: bytes[0], data: bytes[2..].to_vec() });
    }

    Ok(opts)
}

pub fn parse(
    frame: &mut Frame<'_>,
    kind: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let base = IcmpHdrRaw::parse(frame, kind)?;
    let mut icmp = Icmp6 { base, ..Default::default() };

    if let Some(body_len) = nd_body_len(icmp.base.msg_type) {
        icmp.body = frame.read_header(body_len)?.to_vec();
        icmp.opts = parse_opts(frame)?;
    }

    Ok((Handler::Icmp6(icmp), HeaderKind::Opaque))
}

pub fn add(_kind: HeaderKind) -> Result<Handler, HeaderError> {
    Ok(Handler::Icmp6(Icmp6::default()))
}

impl Icmp6 {
    pub fn msg_type(&self) -> u8 {
        self.base.msg_type
    }

    pub fn csum(&self) -> [u8; 2] {
        self.base.csum
    }

    pub fn options(&self) -> &[NdOption] {
        &self.opts
    }

    fn has_target(&self) -> bool {
        matches!(
            self.base.msg_type,
            ND_NEIGHBOR_SOLICIT | ND_NEIGHBOR_ADVERT | ND_REDIRECT
        )
    }

    fn field(&self, num: FieldNum) -> Option<&[u8]> {
        match num {
            FieldNum::NdTarget if self.has_target() => {
                self.body.get(..ND_TARGET_SZ)
            }
            FieldNum::NdSll => self.ll_opt(ND_OPT_SLL),
            FieldNum::NdTll => self.ll_opt(ND_OPT_TLL),
            _ => None,
        }
    }

    fn ll_opt(&self, opt_type: u8) -> Option<&[u8]> {
        self.opts
            .iter()
            .find(|o| o.opt_type == opt_type)
            .and_then(|o| o.data.get(..LL_ADDR_SZ))
    }

    fn field_mut(&mut self, num: FieldNum) -> Option<&mut [u8]> {
        let opt_type = match num {
            FieldNum::NdTarget if self.has_target() => {
                return self.body.get_mut(..ND_TARGET_SZ);
            }
            FieldNum::NdSll => ND_OPT_SLL,
            FieldNum::NdTll => ND_OPT_TLL,
            _ => return None,
        };

        self.opts
            .iter_mut()
            .find(|o| o.opt_type == opt_type)
            .and_then(|o| o.data.get_mut(..LL_ADDR_SZ))
    }
}

impl HeaderHandler for Icmp6 {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        (instance.resolve(1) == Some(0)).then_some(HeaderKind::Icmp6)
    }

    fn len(&self) -> usize {
        ICMP_HDR_SZ
            + self.body.len()
            + self.opts.iter().map(NdOption::wire_len).sum::<usize>()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.base.as_bytes());
        out.extend_from_slice(&self.body);
        for opt in &self.opts {
            let units = u8::try_from(opt.wire_len() / ND_OPT_UNIT).unwrap_or(0);
            out.extend_from_slice(&[opt.opt_type, units]);
            out.extend_from_slice(&opt.data);
        }
    }

    fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        single(num, instance)?;
        if let Some(val) = self.base.get(num) {
            return Ok(val);
        }
        self.field(num)
            .map(|f| f.to_vec())
            .ok_or_else(|| FieldError::no_field(num, instance))
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
            FieldNum::IcmpType | FieldNum::IcmpCode => {
                self.base.update(num, instance, op, arg)?;
            }
            _ => {
                let field = self
                    .field_mut(num)
                    .ok_or_else(|| FieldError::no_field(num, instance))?;
                apply_op(field, op, arg);
            }
        }
        Ok(true)
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        let mut frame = Frame::new(bytes);
        match parse(&mut frame, HeaderKind::Icmp6) {
            Ok((Handler::Icmp6(icmp), _))
                if frame.is_empty() && icmp.len() == self.len() =>
            {
                self.base = icmp.base;
                self.body = icmp.body;
                self.opts = icmp.opts;
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
        self.base.csum = upper_layer_csum(&addrs, PROTO_ICMPV6, &hdr, env);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[rustfmt::skip]
    const NS: [u8; 32] = [
        // type, code, checksum, reserved
        0x87, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        // target fe80::1
        0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01,
        // SLL option
        0x01, 0x01, 0xa8, 0x40, 0x25, 0x00, 0x00, 0x01,
    ];

    #[test]
    fn neighbor_solicit() {
        let mut frame = Frame::new(&NS);
        let (h, next) = parse(&mut frame, HeaderKind::Icmp6).unwrap();
        let Handler::Icmp6(mut icmp) = h else { panic!("not icmpv6") };
        assert_eq!(next, HeaderKind::Opaque);
        assert!(frame.is_empty());
        assert_eq!(icmp.len(), 32);
        assert_eq!(
            icmp.get(FieldNum::NdSll, Instance::FIRST).unwrap(),
            vec![0xa8, 0x40, 0x25, 0x00, 0x00, 0x01]
        );
        assert_eq!(icmp.get(FieldNum::NdTarget, Instance::FIRST).unwrap()[0], 0xfe);
        assert!(icmp.get(FieldNum::NdTll, Instance::FIRST).is_err());

        icmp.update(FieldNum::NdSll, Instance::FIRST, FieldOp::Set, &[0xAA; 6])
            .unwrap();
        let mut out = vec![];
        icmp.emit(&mut out);
        assert_eq!(&out[26..], &[0xAA; 6]);
        assert_eq!(out[24..26], NS[24..26]);
    }

    #[test]
    fn malformed_options() {
        let mut bytes = NS;
        bytes[25] = 0;
        assert!(matches!(
            parse(&mut Frame::new(&bytes), HeaderKind::Icmp6),
            Err(ParseError::MalformedOption { .. })
        ));

        bytes[25] = 2;
        assert!(matches!(
            parse(&mut Frame::new(&bytes), HeaderKind::Icmp6),
            Err(ParseError::MalformedOption { .. })
        ));
    }

    #[test]
    fn echo_has_no_nd_fields() {
        let bytes = [0x80, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0xde, 0xad];
        let mut frame = Frame::new(&bytes);
        let (h, _) = parse(&mut frame, HeaderKind::Icmp6).unwrap();
        assert_eq!(frame.len(), 2);
        assert!(h.get(FieldNum::NdTarget, Instance::FIRST).is_err());
        assert_eq!(h.get(FieldNum::IcmpType, Instance::FIRST).unwrap(), vec![0x80]);
    }
}
