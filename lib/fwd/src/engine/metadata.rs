// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Per-packet metadata.
//!
//! The metadata handler always occupies the PACKET group. It has no
//! bytes on the wire; its fields carry the forwarding state that
//! travels with a packet through the pipeline.

use super::frame::FieldView;
use super::frame::Frame;
use super::headers::FieldError;
use super::headers::Handler;
use super::headers::HeaderEnv;
use super::headers::HeaderHandler;
use super::headers::ParseError;
use super::headers::apply_op;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use crate::api::Nid;

/// The number of instances of each scratch attribute width.
pub const ATTR_SLOTS: usize = 8;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    input_port: [u8; 8],
    output_port: [u8; 8],
    vrf: [u8; 8],
    packet_length: [u8; 4],
    nexthop_id: [u8; 8],
    nexthop_group_id: [u8; 8],
    trap_id: [u8; 8],
    tunnel_id: [u8; 8],
    policer_id: [u8; 8],
    packet_action: [u8; 1],
    attr8: [[u8; 1]; ATTR_SLOTS],
    attr16: [[u8; 2]; ATTR_SLOTS],
    attr24: [[u8; 3]; ATTR_SLOTS],
    attr32: [[u8; 4]; ATTR_SLOTS],
}

/// The metadata parser consumes nothing and hands off to the
/// caller's start header.
pub fn parse(
    _frame: &mut Frame<'_>,
    start: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    Ok((Handler::Metadata(Metadata::default()), start))
}

impl Metadata {
    pub fn input_port(&self) -> Nid {
        Nid::new(FieldView::new(&self.input_port).get())
    }

    pub fn set_input_port(&mut self, nid: Nid) {
        self.input_port = nid.to_be_bytes();
    }

    pub fn output_port(&self) -> Nid {
        Nid::new(FieldView::new(&self.output_port).get())
    }

    pub fn set_output_port(&mut self, nid: Nid) {
        self.output_port = nid.to_be_bytes();
    }

    pub fn packet_length(&self) -> u32 {
        u32::from_be_bytes(self.packet_length)
    }

    /// Cache the wire length of everything after the metadata.
    fn set_packet_length(&mut self, env: &HeaderEnv<'_>) {
        let len = u32::try_from(env.inner_len()).unwrap_or(u32::MAX);
        self.packet_length = len.to_be_bytes();
    }

    fn field(&self, num: FieldNum, instance: Instance) -> Option<&[u8]> {
        use FieldNum::*;

        if let Some(slot) = Self::attr_slot(num, instance) {
            return match num {
                Attribute8 => Some(&self.attr8[slot]),
                Attribute16 => Some(&self.attr16[slot]),
                Attribute24 => Some(&self.attr24[slot]),
                _ => Some(&self.attr32[slot]),
            };
        }

        if instance.resolve(1) != Some(0) {
            return None;
        }

        let f: &[u8] = match num {
            InputPort => &self.input_port,
            OutputPort => &self.output_port,
            Vrf => &self.vrf,
            PacketLength => &self.packet_length,
            NexthopId => &self.nexthop_id,
            NexthopGroupId => &self.nexthop_group_id,
            TrapId => &self.trap_id,
            TunnelId => &self.tunnel_id,
            PolicerId => &self.policer_id,
            PacketAction => &self.packet_action,
            _ => return None,
        };
        Some(f)
    }

    fn field_mut(
        &mut self,
        num: FieldNum,
        instance: Instance,
    ) -> Option<&mut [u8]> {
        use FieldNum::*;

        if let Some(slot) = Self::attr_slot(num, instance) {
            return match num {
                Attribute8 => Some(&mut self.attr8[slot]),
                Attribute16 => Some(&mut self.attr16[slot]),
                Attribute24 => Some(&mut self.attr24[slot]),
                _ => Some(&mut self.attr32[slot]),
            };
        }

        if instance.resolve(1) != Some(0) {
            return None;
        }

        let f: &mut [u8] = match num {
            InputPort => &mut self.input_port,
            OutputPort => &mut self.output_port,
            Vrf => &mut self.vrf,
            PacketLength => &mut self.packet_length,
            NexthopId => &mut self.nexthop_id,
            NexthopGroupId => &mut self.nexthop_group_id,
            TrapId => &mut self.trap_id,
            TunnelId => &mut self.tunnel_id,
            PolicerId => &mut self.policer_id,
            PacketAction => &mut self.packet_action,
            _ => return None,
        };
        Some(f)
    }

    fn attr_slot(num: FieldNum, instance: Instance) -> Option<usize> {
        match num {
            FieldNum::Attribute8
            | FieldNum::Attribute16
            | FieldNum::Attribute24
            | FieldNum::Attribute32 => instance.resolve(ATTR_SLOTS),
            _ => None,
        }
    }
}

impl HeaderHandler for Metadata {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        (instance.resolve(1) == Some(0)).then_some(HeaderKind::Metadata)
    }

    fn len(&self) -> usize {
        0
    }

    fn emit(&self, _out: &mut Vec<u8>) {}

    fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        self.field(num, instance)
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
        let scratch = Self::attr_slot(num, instance).is_some();
        if op != FieldOp::Set && !scratch {
            return Err(FieldError::bad_op(num, instance, op));
        }

        let field = self
            .field_mut(num, instance)
            .ok_or_else(|| FieldError::no_field(num, instance))?;
        apply_op(field, op, arg);
        Ok(true)
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        bytes.is_empty()
    }

    fn attach(&mut self, env: &HeaderEnv<'_>) {
        self.set_packet_length(env);
    }

    fn rebuild(&mut self, env: &HeaderEnv<'_>, _dirty: bool) {
        self.set_packet_length(env);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scalar_fields_set_only() {
        let mut md = Metadata::default();
        md.update(FieldNum::Vrf, Instance::FIRST, FieldOp::Set, &[7]).unwrap();
        assert_eq!(
            md.get(FieldNum::Vrf, Instance::FIRST).unwrap(),
            vec![0, 0, 0, 0, 0, 0, 0, 7]
        );

        let err = md
            .update(FieldNum::Vrf, Instance::FIRST, FieldOp::Inc, &[1])
            .unwrap_err();
        assert!(matches!(err, FieldError::BadOp { .. }));
        assert!(md.get(FieldNum::Vrf, Instance::new(1)).is_err());
    }

    #[test]
    fn scratch_slots() {
        let mut md = Metadata::default();
        let num = FieldNum::Attribute16;
        md.update(num, Instance::new(3), FieldOp::Set, &[0x01, 0xFF]).unwrap();
        md.update(num, Instance::new(3), FieldOp::Inc, &[1]).unwrap();
        assert_eq!(md.get(num, Instance::new(3)).unwrap(), vec![0x02, 0x00]);

        md.update(num, Instance::LAST, FieldOp::Dec, &[1]).unwrap();
        assert_eq!(md.get(num, Instance::new(7)).unwrap(), vec![0xFF, 0xFF]);
        assert!(md.get(num, Instance::new(8)).is_err());

        md.update(FieldNum::Attribute24, Instance::FIRST, FieldOp::Set, &[
            1, 2, 3, 4,
        ])
        .unwrap();
        assert_eq!(
            md.get(FieldNum::Attribute24, Instance::FIRST).unwrap(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn ports() {
        let mut md = Metadata::default();
        md.set_output_port(Nid::new(0x1234));
        assert_eq!(md.output_port(), Nid::new(0x1234));
        assert_eq!(
            md.get(FieldNum::OutputPort, Instance::FIRST).unwrap(),
            0x1234u64.to_be_bytes().to_vec()
        );
        assert!(!md.input_port().is_valid());
    }
}
