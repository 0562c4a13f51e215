// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use super::Action;
use super::BuildError;
use super::Outcome;
use crate::Context;
use crate::api::CounterId;
use crate::api::ObjectKind;
use crate::api::State;
use crate::engine::counter::CounterSink;
use crate::engine::counter::count_packet;
use crate::engine::object::ObjectRef;
use crate::engine::packet::Packet;
use core::fmt;
use core::fmt::Display;

/// Hand the packet to a table, running whatever it returns.
pub struct Lookup {
    table: ObjectRef,
}

impl Lookup {
    pub fn new(ctx: &Context, table: &str) -> Result<Self, BuildError> {
        let table = ctx.objects().acquire_kind(table, ObjectKind::Table)?;
        Ok(Self { table })
    }
}

impl Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "lookup({})", self.table.id())
    }
}

impl Action for Lookup {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        match self.table.as_table() {
            Some(table) if !self.table.is_cleaned() => {
                table.process(pkt, counters)
            }

            _ => {
                count_packet(
                    counters,
                    CounterId::DropPackets,
                    CounterId::DropOctets,
                    pkt.len(),
                );
                pkt.log_error(format!("lookup: table {} is gone", self.table.id()));
                Outcome::state(State::Drop)
            }
        }
    }
}
