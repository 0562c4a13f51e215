// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A port that keeps what it is given.

use fwd::Context;
use fwd::api::Direction;
use fwd::api::Nid;
use fwd::api::ObjectKind;
use fwd::api::PortDesc;
use fwd::api::PortStateReply;
use fwd::api::PortStateReq;
use fwd::api::State;
use fwd::engine::action::ActionList;
use fwd::engine::action::BuildError;
use fwd::engine::counter::Counters;
use fwd::engine::object::Object;
use fwd::engine::object::ObjectCore;
use fwd::engine::object::RegistryError;
use fwd::engine::packet::Packet;
use fwd::engine::port::Port;
use fwd::engine::port::PortActions;
use fwd::engine::port::port_state;
use fwd::sync::KMutex;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

pub struct TestPort {
    core: ObjectCore,
    counters: Counters,
    actions: PortActions,
    written: KMutex<Vec<Packet>>,
    refuse: AtomicBool,
    cleanups: AtomicUsize,
}

impl Default for TestPort {
    fn default() -> Self {
        Self {
            core: ObjectCore::default(),
            counters: Counters::port(),
            actions: PortActions::default(),
            written: KMutex::new(vec![]),
            refuse: AtomicBool::new(false),
            cleanups: AtomicUsize::new(0),
        }
    }
}

impl TestPort {
    /// Create a port and register it with `ctx` under `id`.
    pub fn add(ctx: &Context, id: &str) -> Result<Arc<Self>, RegistryError> {
        let port = Arc::new(Self::default());
        ctx.add_object(id, port.clone())?;
        Ok(port)
    }

    /// Take every packet written so far.
    pub fn take(&self) -> Vec<Packet> {
        core::mem::take(&mut *self.written.lock())
    }

    pub fn written(&self) -> usize {
        self.written.lock().len()
    }

    /// Make writes fail with `Drop`.
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Relaxed);
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::Relaxed)
    }
}

impl Port for TestPort {
    fn write(&self, pkt: Packet) -> State {
        if self.refuse.load(Ordering::Relaxed) {
            return State::Drop;
        }
        self.written.lock().push(pkt);
        State::Consume
    }

    fn id(&self) -> &str {
        self.core.id()
    }

    fn nid(&self) -> Nid {
        self.core.nid()
    }

    fn actions(&self, dir: Direction) -> ActionList {
        self.actions.get(dir)
    }

    fn update(&self, ctx: &Context, desc: &PortDesc) -> Result<(), BuildError> {
        self.actions.update(ctx, desc)
    }

    fn state(&self, req: &PortStateReq) -> PortStateReply {
        port_state(self, Some(&self.counters), req)
    }
}

impl Object for TestPort {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Port
    }

    fn counters(&self) -> Option<&Counters> {
        Some(&self.counters)
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::Relaxed);
        self.actions.clear();
    }

    fn as_port(&self) -> Option<&dyn Port> {
        Some(self)
    }
}
