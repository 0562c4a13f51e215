// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! ICMPv4. The checksum covers the message only; there is no
//! pseudo-header.

use super::ICMP_HDR_SZ;
use super::IcmpHdrRaw;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use crate::engine::checksum::Checksum;
use crate::engine::checksum::HeaderChecksum;
use crate::engine::frame::Frame;
use crate::engine::headers::FieldError;
use crate::engine::headers::Handler;
use crate::engine::headers::HeaderEnv;
use crate::engine::headers::HeaderError;
use crate::engine::headers::HeaderHandler;
use crate::engine::headers::ParseError;
use crate::engine::headers::single;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_ECHO: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

#[derive(Clone, Debug, Default)]
pub struct Icmp4 {
    base: IcmpHdrRaw,
}

pub fn parse(
    frame: &mut Frame<'_>,
    kind: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let base = IcmpHdrRaw::parse(frame, kind)?;
    Ok((Handler::Icmp4(Icmp4 { base }), HeaderKind::Opaque))
}

pub fn add(_kind: HeaderKind) -> Result<Handler, HeaderError> {
    Ok(Handler::Icmp4(Icmp4::default()))
}

impl Icmp4 {
    pub fn msg_type(&self) -> u8 {
        self.base.msg_type
    }

    pub fn csum(&self) -> [u8; 2] {
        self.base.csum
    }
}

impl HeaderHandler for Icmp4 {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        (instance.resolve(1) == Some(0)).then_some(HeaderKind::Icmp4)
    }

    fn len(&self) -> usize {
        ICMP_HDR_SZ
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
        self.base.get(num).ok_or_else(|| FieldError::no_field(num, instance))
    }

    fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<bool, FieldError> {
        single(num, instance)?;
        self.base.update(num, instance, op, arg)?;
        Ok(true)
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        match IcmpHdrRaw::read_from_bytes(bytes) {
            Ok(base) => {
                self.base = base;
                true
            }
            Err(_) => false,
        }
    }

    fn rebuild(&mut self, env: &HeaderEnv<'_>, dirty: bool) {
        if !dirty && !env.inner_dirty() {
            return;
        }

        self.base.csum = [0; 2];
        let mut bytes = Vec::with_capacity(ICMP_HDR_SZ + env.inner_len());
        self.emit(&mut bytes);
        env.emit_inner(&mut bytes);
        self.base.csum = HeaderChecksum::from(Checksum::compute(&bytes)).bytes();
    }
}
