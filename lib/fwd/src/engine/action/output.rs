// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Actions that choose where a packet leaves.

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
use std::sync::Weak;

/// Output to the port the packet already names, if there is one.
pub struct Output {
    ctx: Weak<Context>,
}

impl Output {
    pub fn new(ctx: &Context) -> Self {
        Self { ctx: ctx.weak() }
    }
}

impl Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "output")
    }
}

impl Action for Output {
    fn process(&self, pkt: &mut Packet, _: &dyn CounterSink) -> Outcome {
        let resolved = self
            .ctx
            .upgrade()
            .and_then(|ctx| ctx.resolve_port(pkt.output_port()))
            .is_some();

        if resolved {
            Outcome::state(State::Output)
        } else {
            Outcome::state(State::Continue)
        }
    }
}

pub struct Transmit {
    port: ObjectRef,
    immediate: bool,
}

impl Transmit {
    pub fn new(
        ctx: &Context,
        port: &str,
        immediate: bool,
    ) -> Result<Self, BuildError> {
        let port = ctx.objects().acquire_kind(port, ObjectKind::Port)?;
        Ok(Self { port, immediate })
    }
}

impl Display for Transmit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "transmit({}, immediate={})", self.port.id(), self.immediate)
    }
}

impl Action for Transmit {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        if self.port.is_cleaned() {
            count_packet(
                counters,
                CounterId::TxErrorPackets,
                CounterId::TxErrorOctets,
                pkt.len(),
            );
            pkt.log_error(format!("transmit: port {} is gone", self.port.id()));
            return Outcome::state(State::Drop);
        }

        pkt.set_output_port(self.port.nid());
        if self.immediate {
            Outcome::state(State::Output)
        } else {
            Outcome::state(State::Continue)
        }
    }
}

/// Send the packet out the other side of the port it came in on.
pub struct SwapOutput {
    ctx: Weak<Context>,
}

impl SwapOutput {
    pub fn new(ctx: &Context) -> Self {
        Self { ctx: ctx.weak() }
    }

    fn paired(&self, pkt: &Packet) -> Result<ObjectRef, String> {
        let ctx = self.ctx.upgrade().ok_or("context is gone")?;
        let input = ctx
            .objects()
            .find_nid(pkt.input_port())
            .map_err(|e| e.to_string())?;
        let pair = ctx
            .pair_port(input.core().id())
            .ok_or_else(|| format!("{} has no paired port", input.core().id()))?;
        ctx.objects()
            .acquire_kind(&pair, ObjectKind::Port)
            .map_err(|e| e.to_string())
    }
}

impl Display for SwapOutput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "swap_output")
    }
}

impl Action for SwapOutput {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        match self.paired(pkt) {
            Ok(port) => {
                pkt.set_output_port(port.nid());
                Outcome::state(State::Continue)
            }
            Err(e) => {
                count_packet(
                    counters,
                    CounterId::TxErrorPackets,
                    CounterId::TxErrorOctets,
                    pkt.len(),
                );
                pkt.log_error(format!("swap_output: {e}"));
                Outcome::state(State::Drop)
            }
        }
    }
}
