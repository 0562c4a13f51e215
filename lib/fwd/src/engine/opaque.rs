// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Payload bytes with no structure the engine understands.

use super::frame::Frame;
use super::headers::FieldError;
use super::headers::Handler;
use super::headers::HeaderHandler;
use super::headers::ParseError;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;

#[derive(Clone, Debug, Default)]
pub struct Opaque {
    bytes: Vec<u8>,
}

pub fn parse(
    frame: &mut Frame<'_>,
    _kind: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let bytes = frame.read_rest().to_vec();
    Ok((Handler::Opaque(Opaque { bytes }), HeaderKind::None))
}

impl Opaque {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl HeaderHandler for Opaque {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        (instance.resolve(1) == Some(0)).then_some(HeaderKind::Opaque)
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.bytes);
    }

    fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        Err(FieldError::no_field(num, instance))
    }

    fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        _op: FieldOp,
        _arg: &[u8],
    ) -> Result<bool, FieldError> {
        Err(FieldError::no_field(num, instance))
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != self.bytes.len() {
            return false;
        }
        self.bytes.copy_from_slice(bytes);
        true
    }
}
