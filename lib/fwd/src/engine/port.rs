// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The port contract.
//!
//! Port drivers live outside the engine. A driver implements [`Port`]
//! and [`Object`] and is inserted into a context like any other
//! object; [`PortActions`] holds the per-direction action lists most
//! drivers need, and [`receive`] runs a packet arriving on a port
//! through them.

use super::action::ActionList;
use super::action::BuildError;
use super::action::build_list;
use super::action::empty;
use super::counter::CounterSink;
use super::counter::Counters;
use super::counter::count_packet;
use super::object::Object;
use super::packet::Packet;
use super::pipeline;
use crate::Context;
use crate::api::CounterId;
use crate::api::Direction;
use crate::api::Nid;
use crate::api::PortDesc;
use crate::api::PortStateReply;
use crate::api::PortStateReq;
use crate::api::State;
use crate::sync::KRwLock;

/// The suffix naming the tap side of a port pair.
pub const TAP_SUFFIX: &str = "-tap";

pub trait Port: Send + Sync {
    /// Take ownership of a packet leaving through this port.
    fn write(&self, pkt: Packet) -> State;

    fn id(&self) -> &str;

    fn nid(&self) -> Nid;

    /// The actions run on packets crossing this port in `dir`.
    fn actions(&self, dir: Direction) -> ActionList;

    fn update(&self, ctx: &Context, desc: &PortDesc) -> Result<(), BuildError>;

    fn state(&self, req: &PortStateReq) -> PortStateReply;
}

/// The default pairing of the tap and interface sides of a port:
/// `vif0` and `vif0-tap`.
pub fn tap_pair(id: &str) -> Option<String> {
    match id.strip_suffix(TAP_SUFFIX) {
        Some("") => None,
        Some(base) => Some(base.to_string()),
        None if id.is_empty() => None,
        None => Some(format!("{id}{TAP_SUFFIX}")),
    }
}

/// Per-direction action lists.
pub struct PortActions {
    rx: KRwLock<ActionList>,
    tx: KRwLock<ActionList>,
}

impl Default for PortActions {
    fn default() -> Self {
        Self { rx: KRwLock::new(empty()), tx: KRwLock::new(empty()) }
    }
}

impl PortActions {
    fn slot(&self, dir: Direction) -> &KRwLock<ActionList> {
        match dir {
            Direction::In => &self.rx,
            Direction::Out => &self.tx,
        }
    }

    pub fn get(&self, dir: Direction) -> ActionList {
        self.slot(dir).read().clone()
    }

    /// Build and install the list `desc` describes. The old list is
    /// kept if the new one fails to build.
    pub fn update(&self, ctx: &Context, desc: &PortDesc) -> Result<(), BuildError> {
        let list = build_list(ctx, &desc.actions)?;
        let old = core::mem::replace(&mut *self.slot(desc.dir).write(), list);
        drop(old);
        Ok(())
    }

    /// Drop both lists and the references they hold.
    pub fn clear(&self) {
        for dir in [Direction::In, Direction::Out] {
            let old = core::mem::replace(&mut *self.slot(dir).write(), empty());
            drop(old);
        }
    }
}

/// Build a state reply for `port`.
pub fn port_state(
    port: &dyn Port,
    counters: Option<&Counters>,
    req: &PortStateReq,
) -> PortStateReply {
    PortStateReply {
        id: port.id().to_string(),
        nid: port.nid(),
        rx_actions: port.actions(Direction::In).len(),
        tx_actions: port.actions(Direction::Out).len(),
        counters: match counters {
            Some(c) if req.counters => c.counters(),
            _ => Default::default(),
        },
    }
}

/// Run a packet crossing `obj`, which must be a port, in `dir`.
///
/// The packet is stamped with the port as its input port when it
/// arrives. A packet whose pipeline ends in `Output` is dispatched to
/// its output port and the state of that write is returned; any other
/// state is returned as is, with the packet dropped.
pub fn receive(
    ctx: &Context,
    obj: &dyn Object,
    dir: Direction,
    mut pkt: Packet,
) -> State {
    let Some(port) = obj.as_port() else {
        return State::Drop;
    };
    let counters: &dyn CounterSink = match obj.counters() {
        Some(c) => c,
        None => &super::counter::NullSink,
    };

    if dir == Direction::In {
        pkt.set_input_port(port.nid());
        count_packet(counters, CounterId::RxPackets, CounterId::RxOctets, pkt.len());
    }

    let state = pipeline::process_pipeline(&mut pkt, &port.actions(dir), counters);
    if state != State::Output {
        return state;
    }

    let len = pkt.len();
    match ctx.dispatch(pkt) {
        State::Drop => {
            count_packet(
                counters,
                CounterId::TxErrorPackets,
                CounterId::TxErrorOctets,
                len,
            );
            State::Drop
        }
        s => {
            count_packet(counters, CounterId::TxPackets, CounterId::TxOctets, len);
            s
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pairing() {
        assert_eq!(tap_pair("vif0").as_deref(), Some("vif0-tap"));
        assert_eq!(tap_pair("vif0-tap").as_deref(), Some("vif0"));
        assert_eq!(tap_pair("-tap"), None);
        assert_eq!(tap_pair(""), None);
    }
}
