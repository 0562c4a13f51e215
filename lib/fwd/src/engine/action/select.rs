// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Choose one of several action lists by hashing packet fields.

use super::Action;
use super::ActionList;
use super::BuildError;
use super::Outcome;
use super::build_list;
use crate::Context;
use crate::api::ActionAttrDesc;
use crate::api::ActionDesc;
use crate::api::CounterId;
use crate::api::FieldId;
use crate::api::SelectAlgo;
use crate::api::State;
use crate::engine::counter::CounterSink;
use crate::engine::counter::count_packet;
use crate::engine::headers::FieldError;
use crate::engine::packet::Packet;
use core::fmt;
use core::fmt::Display;

/// CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no
/// reflection, no final XOR.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for b in bytes {
        crc ^= u16::from(*b) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

pub struct SelectActionList {
    fields: Vec<FieldId>,
    algo: SelectAlgo,
    lists: Vec<ActionList>,
}

impl SelectActionList {
    pub fn new(
        ctx: &Context,
        fields: Vec<FieldId>,
        algo: SelectAlgo,
        lists: &[Vec<ActionAttrDesc>],
    ) -> Result<Self, BuildError> {
        if lists.is_empty() {
            return Err(BuildError::invalid(
                &ActionDesc::SelectActionList { fields, algo, lists: vec![] },
                "no action lists to select from",
            ));
        }

        let lists = lists
            .iter()
            .map(|l| build_list(ctx, l))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields, algo, lists })
    }

    fn key(&self, pkt: &Packet) -> Result<Vec<u8>, FieldError> {
        let mut key = vec![];
        for f in &self.fields {
            key.extend_from_slice(&pkt.field_get(*f)?);
        }
        Ok(key)
    }

    fn hash(&self, key: &[u8]) -> u32 {
        match self.algo {
            SelectAlgo::Crc16 => u32::from(crc16(key)),
            SelectAlgo::Crc32 => crc32fast::hash(key),
            SelectAlgo::Random => rand::random(),
        }
    }
}

impl Display for SelectActionList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "select_action_list({:?}, {} lists)", self.algo, self.lists.len())
    }
}

impl Action for SelectActionList {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        let key = match self.key(pkt) {
            Ok(key) => key,
            Err(e) => {
                count_packet(
                    counters,
                    CounterId::ErrorPackets,
                    CounterId::ErrorOctets,
                    pkt.len(),
                );
                pkt.log_error(format!("select_action_list: {e}"));
                return Outcome::state(State::Drop);
            }
        };

        let idx = self.hash(&key) as usize % self.lists.len();
        pkt.log_debug(format!("select_action_list: chose list {idx}"));
        Outcome::then(self.lists[idx].clone())
    }
}
