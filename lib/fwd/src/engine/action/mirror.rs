// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Packet mirroring.
//!
//! The replica runs its own pipeline in line with the original. What
//! happens to the replica never changes the disposition of the
//! original packet.

use super::Action;
use super::ActionList;
use super::BuildError;
use super::Outcome;
use super::build_list;
use crate::Context;
use crate::api::ActionAttrDesc;
use crate::api::CounterId;
use crate::api::FieldId;
use crate::api::ObjectKind;
use crate::api::State;
use crate::engine::counter::CounterSink;
use crate::engine::counter::count_packet;
use crate::engine::object::ObjectRef;
use crate::engine::packet::PORT_FIELDS;
use crate::engine::packet::Packet;
use crate::engine::pipeline;
use crate::provider::LogLevel;
use core::fmt;
use core::fmt::Display;
use std::sync::Weak;

pub struct Mirror {
    ctx: Weak<Context>,
    port: Option<ObjectRef>,
    actions: ActionList,
    fields: Vec<FieldId>,
}

impl Mirror {
    pub fn new(
        ctx: &Context,
        port: Option<&str>,
        actions: &[ActionAttrDesc],
        fields: &[FieldId],
    ) -> Result<Self, BuildError> {
        let port = port
            .map(|p| ctx.objects().acquire_kind(p, ObjectKind::Port))
            .transpose()?;
        let actions = build_list(ctx, actions)?;
        let fields = fields.iter().chain(PORT_FIELDS.iter()).copied().collect();
        Ok(Self { ctx: ctx.weak(), port, actions, fields })
    }

    /// Deliver a replica whose pipeline finished with `state`.
    fn deliver(&self, replica: Packet, state: State) -> Result<bool, String> {
        let ctx = self.ctx.upgrade().ok_or("context is gone")?;

        match state {
            State::Output => match ctx.dispatch(replica) {
                State::Drop => Err("output port dropped the replica".into()),
                _ => Ok(true),
            },

            State::Continue => match &self.port {
                Some(port) if !port.is_cleaned() => {
                    let mut replica = replica;
                    replica.set_output_port(port.nid());
                    let p = port.as_port().ok_or("mirror port is not a port")?;
                    match p.write(replica) {
                        State::Drop => Err("mirror port dropped the replica".into()),
                        _ => Ok(true),
                    }
                }

                Some(port) => Err(format!("mirror port {} is gone", port.id())),

                None => {
                    ctx.log(
                        LogLevel::Note,
                        &format!("mirror replica {replica} has no destination"),
                    );
                    Ok(false)
                }
            },

            _ => Ok(false),
        }
    }
}

impl Display for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.port {
            Some(port) => write!(f, "mirror({}, {} actions)", port.id(), self.actions.len()),
            None => write!(f, "mirror({} actions)", self.actions.len()),
        }
    }
}

impl Action for Mirror {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        let len = pkt.len();
        let res = pkt.mirror(&self.fields).map_err(|e| e.to_string()).and_then(
            |mut replica| {
                let state =
                    pipeline::process_pipeline(&mut replica, &self.actions, counters);
                self.deliver(replica, state)
            },
        );

        match res {
            Ok(true) => count_packet(
                counters,
                CounterId::MirrorPackets,
                CounterId::MirrorOctets,
                len,
            ),
            Ok(false) => {}
            Err(e) => {
                count_packet(
                    counters,
                    CounterId::MirrorErrorPackets,
                    CounterId::MirrorErrorOctets,
                    len,
                );
                pkt.log_error(format!("mirror: {e}"));
            }
        }

        Outcome::state(State::Continue)
    }
}
