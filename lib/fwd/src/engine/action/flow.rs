// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use super::Action;
use super::BuildError;
use super::Outcome;
use crate::Context;
use crate::api::ObjectKind;
use crate::api::State;
use crate::engine::counter::CounterSink;
use crate::engine::object::ObjectRef;
use crate::engine::packet::Packet;
use core::fmt;
use core::fmt::Display;

/// Credit the packet to a shared flow counter.
pub struct FlowCount {
    counter: ObjectRef,
}

impl FlowCount {
    pub fn new(ctx: &Context, counter: &str) -> Result<Self, BuildError> {
        let counter =
            ctx.objects().acquire_kind(counter, ObjectKind::FlowCounter)?;
        Ok(Self { counter })
    }
}

impl Display for FlowCount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "flow_counter({})", self.counter.id())
    }
}

impl Action for FlowCount {
    fn process(&self, pkt: &mut Packet, _: &dyn CounterSink) -> Outcome {
        if let Some(fc) = self.counter.as_flow_counter() {
            fc.add(pkt.len());
        }
        Outcome::state(State::Continue)
    }
}
