// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Internet Control Message Protocol (ICMP) shared data structures.

pub mod v4;
pub mod v6;

pub use v4::Icmp4;
pub use v6::Icmp6;

use super::frame::Frame;
use super::headers::FieldError;
use super::headers::ParseError;
use super::headers::apply_op;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const ICMP_HDR_SZ: usize = 8;

/// The header common to both ICMP versions.
#[repr(C)]
#[derive(
    Clone, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable,
    Unaligned,
)]
pub struct IcmpHdrRaw {
    pub msg_type: u8,
    pub msg_code: u8,
    pub csum: [u8; 2],
    pub rest_of_hdr: [u8; 4],
}

impl IcmpHdrRaw {
    pub(crate) fn parse(
        frame: &mut Frame<'_>,
        kind: HeaderKind,
    ) -> Result<Self, ParseError> {
        let bytes = frame.read_header(ICMP_HDR_SZ)?;
        let (hdr, _) = Self::read_from_prefix(bytes)
            .map_err(|_| ParseError::BadHeader { kind, msg: "short" })?;
        Ok(hdr)
    }

    pub(crate) fn get(&self, num: FieldNum) -> Option<Vec<u8>> {
        match num {
            FieldNum::IcmpType => Some(vec![self.msg_type]),
            FieldNum::IcmpCode => Some(vec![self.msg_code]),
            _ => None,
        }
    }

    pub(crate) fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<(), FieldError> {
        let field = match num {
            FieldNum::IcmpType => &mut self.msg_type,
            FieldNum::IcmpCode => &mut self.msg_code,
            _ => return Err(FieldError::no_field(num, instance)),
        };
        apply_op(core::slice::from_mut(field), op, arg);
        Ok(())
    }
}
