// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The context: one instance of the forwarding core.
//!
//! A context owns the object registry, the services the engine
//! depends on (logging, a clock, the port pairing convention), the
//! builders of custom actions, and the context-wide attribute map.
//! It is the entry point for creating packets and running pipelines,
//! and it tears down its objects, ports first, when the integrator is
//! done with it.

use super::action::ActionList;
use super::action::BuildError;
use super::action::CustomBuilder;
use super::counter::CounterObject;
use super::counter::CounterSink;
use super::counter::FlowCounter;
use super::headers::ParseError;
use super::object::Object;
use super::object::ObjectInfo;
use super::object::ObjectTable;
use super::object::RegistryError;
use super::packet::Packet;
use super::pipeline;
use super::port::tap_pair;
use super::table::ActionTable;
use super::table::TableError;
use crate::api::CounterId;
use crate::api::EntryDesc;
use crate::api::HeaderKind;
use crate::api::Nid;
use crate::api::ObjectKind;
use crate::api::State;
use crate::api::TableDesc;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use crate::provider::PrintlnLog;
use crate::sync::KMutex;
use crate::time::Clock;
use crate::time::SystemClock;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Weak;

/// Where injected packets without an output port go.
pub type PacketSink = Arc<dyn Fn(Packet) + Send + Sync>;

/// Receives [`Notification`]s.
pub type NotificationSink = Arc<dyn Fn(Notification) + Send + Sync>;

/// Maps a port ID to the ID of the other side of its pair.
pub type PortPairFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// An object lifecycle event.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Notification {
    ObjectAdded { id: String, nid: Nid, kind: ObjectKind },
    ObjectRemoved { id: String, nid: Nid },
}

pub struct ContextBuilder {
    id: String,
    instance: u32,
    log: Box<dyn LogProvider>,
    clock: Box<dyn Clock>,
    port_pair: PortPairFn,
    builders: BTreeMap<String, CustomBuilder>,
}

impl ContextBuilder {
    pub fn new(id: &str, instance: u32) -> Self {
        Self {
            id: id.to_string(),
            instance,
            log: Box::new(PrintlnLog),
            clock: Box::new(SystemClock),
            port_pair: Arc::new(tap_pair),
            builders: BTreeMap::new(),
        }
    }

    pub fn log(mut self, log: Box<dyn LogProvider>) -> Self {
        self.log = log;
        self
    }

    pub fn clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn port_pair(mut self, f: PortPairFn) -> Self {
        self.port_pair = f;
        self
    }

    /// Register the builder of custom actions of `kind`.
    pub fn register_action(mut self, kind: &str, builder: CustomBuilder) -> Self {
        self.builders.insert(kind.to_string(), builder);
        self
    }

    pub fn build(self) -> Arc<Context> {
        Arc::new_cyclic(|this| Context {
            id: self.id,
            instance: self.instance,
            this: this.clone(),
            objects: ObjectTable::new(),
            attrs: KMutex::new(BTreeMap::new()),
            log: self.log,
            clock: self.clock,
            port_pair: self.port_pair,
            builders: self.builders,
            packet_sink: KMutex::new(None),
            notify: KMutex::new(None),
        })
    }
}

pub struct Context {
    id: String,
    instance: u32,
    this: Weak<Context>,
    objects: Arc<ObjectTable>,
    attrs: KMutex<BTreeMap<String, String>>,
    log: Box<dyn LogProvider>,
    clock: Box<dyn Clock>,
    port_pair: PortPairFn,
    builders: BTreeMap<String, CustomBuilder>,
    packet_sink: KMutex<Option<PacketSink>>,
    notify: KMutex<Option<NotificationSink>>,
}

impl Context {
    /// A context with the default services.
    pub fn new(id: &str, instance: u32) -> Arc<Self> {
        ContextBuilder::new(id, instance).build()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn weak(&self) -> Weak<Context> {
        self.this.clone()
    }

    pub fn objects(&self) -> &Arc<ObjectTable> {
        &self.objects
    }

    pub fn log(&self, level: LogLevel, msg: &str) {
        self.log.log(level, &format!("{}:{}: {msg}", self.id, self.instance));
    }

    /// A handle on the context's clock.
    pub fn clock(&self) -> Box<dyn Clock> {
        dyn_clone::clone_box(&*self.clock)
    }

    pub fn pair_port(&self, id: &str) -> Option<String> {
        (self.port_pair)(id)
    }

    pub fn custom_builder(&self, kind: &str) -> Option<CustomBuilder> {
        self.builders.get(kind).cloned()
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        self.attrs.lock().get(key).cloned()
    }

    pub fn set_attr(&self, key: &str, val: &str) {
        self.attrs.lock().insert(key.to_string(), val.to_string());
    }

    pub fn set_packet_sink(&self, sink: PacketSink) {
        *self.packet_sink.lock() = Some(sink);
    }

    pub fn set_notification(&self, sink: NotificationSink) {
        *self.notify.lock() = Some(sink);
    }

    fn notify(&self, n: Notification) {
        let sink = self.notify.lock().clone();
        if let Some(sink) = sink {
            sink(n);
        }
    }

    pub fn new_packet(
        &self,
        start: HeaderKind,
        bytes: &[u8],
    ) -> Result<Packet, ParseError> {
        Packet::parse(start, bytes)
    }

    pub fn process_pipeline(
        &self,
        pkt: &mut Packet,
        actions: &ActionList,
        counters: &dyn CounterSink,
    ) -> State {
        pipeline::process_pipeline(pkt, actions, counters)
    }

    /// Register an object built outside the context (a port).
    pub fn add_object(
        &self,
        id: &str,
        obj: Arc<dyn Object>,
    ) -> Result<Nid, RegistryError> {
        let kind = obj.kind();
        let nid = self.objects.insert(id, obj)?;
        self.notify(Notification::ObjectAdded { id: id.to_string(), nid, kind });
        Ok(nid)
    }

    pub fn remove_object(&self, id: &str) -> Result<(), RegistryError> {
        let nid = self.objects.remove(id, false)?;
        self.notify(Notification::ObjectRemoved { id: id.to_string(), nid });
        Ok(())
    }

    pub fn create_table(&self, id: &str, desc: &TableDesc) -> Result<Nid, BuildError> {
        let table = ActionTable::new(self, desc)?;
        Ok(self.add_object(id, Arc::new(table))?)
    }

    pub fn create_counter(
        &self,
        id: &str,
        counters: &[CounterId],
    ) -> Result<Nid, RegistryError> {
        self.add_object(id, Arc::new(CounterObject::new(counters)))
    }

    pub fn create_flow_counter(&self, id: &str) -> Result<Nid, RegistryError> {
        self.add_object(id, Arc::new(FlowCounter::default()))
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&dyn super::table::Table) -> Result<R, TableError>,
    ) -> Result<R, TableError> {
        let obj = self.objects.find_id(table).map_err(BuildError::from)?;
        let t = obj
            .as_table()
            .ok_or_else(|| TableError::NotATable(table.to_string()))?;
        f(t)
    }

    pub fn add_entry(
        &self,
        table: &str,
        entry: &str,
        desc: &EntryDesc,
    ) -> Result<(), TableError> {
        self.with_table(table, |t| t.add_entry(self, entry, desc))
    }

    pub fn remove_entry(&self, table: &str, entry: &str) -> Result<(), TableError> {
        self.with_table(table, |t| t.remove_entry(entry))
    }

    /// The live port with `nid`, if there is one.
    pub fn resolve_port(&self, nid: Nid) -> Option<Arc<dyn Object>> {
        if !nid.is_valid() {
            return None;
        }
        let obj = self.objects.find_nid(nid).ok()?;
        (obj.as_port().is_some() && !obj.core().is_cleaned()).then_some(obj)
    }

    /// Send `pkt` to its output port. Without one, the packet goes to
    /// the packet sink, or is dropped when no sink is set.
    pub fn dispatch(&self, pkt: Packet) -> State {
        if let Some(obj) = self.resolve_port(pkt.output_port()) {
            return match obj.as_port() {
                Some(port) => port.write(pkt),
                None => State::Drop,
            };
        }

        let sink = self.packet_sink.lock().clone();
        match sink {
            Some(sink) => {
                sink(pkt);
                State::Consume
            }
            None => State::Drop,
        }
    }

    pub fn snapshot(&self) -> Vec<ObjectInfo> {
        self.objects.snapshot()
    }

    /// Tear down every object: first those `is_port` selects, then,
    /// after `barrier` returns, the rest.
    pub fn cleanup(
        &self,
        barrier: impl FnOnce(),
        is_port: impl Fn(&dyn Object) -> bool,
    ) {
        let mut ports = vec![];
        let mut rest = vec![];
        for info in self.objects.snapshot() {
            let port = self
                .objects
                .find_id(&info.id)
                .map(|o| is_port(&*o))
                .unwrap_or(false);
            if port {
                ports.push(info);
            } else {
                rest.push(info);
            }
        }

        self.teardown(&ports);
        barrier();
        self.teardown(&rest);
    }

    /// [`Self::cleanup`] with no barrier, treating every object
    /// implementing [`Port`](super::port::Port) as a port.
    pub fn shutdown(&self) {
        self.cleanup(|| {}, |o| o.as_port().is_some());
    }

    fn teardown(&self, objs: &[ObjectInfo]) {
        for info in objs {
            // References held by objects torn down earlier in this
            // pass are already gone.
            let refs = self.objects.refs(&info.id).unwrap_or(info.refs);
            if refs > 1 {
                self.log(
                    LogLevel::Warn,
                    &format!(
                        "forcing out {} {} with {} references",
                        info.kind,
                        info.id,
                        refs - 1
                    ),
                );
            }

            if let Ok(nid) = self.objects.remove(&info.id, true) {
                self.notify(Notification::ObjectRemoved { id: info.id.clone(), nid });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::ActionDesc;
    use crate::api::Position;

    #[test]
    fn tables_and_entries() {
        let ctx = Context::new("ctx", 1);
        ctx.create_table("t0", &TableDesc::Action { default_actions: vec![] })
            .unwrap();
        ctx.create_table("t1", &TableDesc::Action { default_actions: vec![] })
            .unwrap();

        let lookup = EntryDesc::Action {
            actions: vec![ActionDesc::Lookup { table: "t1".into() }.into()],
            position: Position::Tail,
        };
        ctx.add_entry("t0", "e0", &lookup).unwrap();
        assert_eq!(ctx.objects().refs("t1"), Ok(2));

        ctx.remove_entry("t0", "e0").unwrap();
        assert_eq!(ctx.objects().refs("t1"), Ok(1));

        let missing = EntryDesc::Action {
            actions: vec![ActionDesc::Lookup { table: "t9".into() }.into()],
            position: Position::Tail,
        };
        assert!(matches!(
            ctx.add_entry("t0", "e1", &missing),
            Err(TableError::Build(BuildError::Registry(RegistryError::NotFound(_))))
        ));
        ctx.create_flow_counter("fc").unwrap();
        assert!(matches!(
            ctx.add_entry("fc", "e1", &lookup),
            Err(TableError::NotATable(_))
        ));
    }

    #[test]
    fn partial_build_releases_siblings() {
        let ctx = Context::new("ctx", 1);
        ctx.create_table("t1", &TableDesc::Action { default_actions: vec![] })
            .unwrap();

        let desc = TableDesc::Action {
            default_actions: vec![
                ActionDesc::Lookup { table: "t1".into() }.into(),
                ActionDesc::Lookup { table: "t1".into() }.into(),
                ActionDesc::Lookup { table: "nope".into() }.into(),
            ],
        };
        assert!(ctx.create_table("t0", &desc).is_err());
        assert_eq!(ctx.objects().refs("t1"), Ok(1));
    }

    #[test]
    fn notifications() {
        let ctx = Context::new("ctx", 1);
        let seen = Arc::new(KMutex::new(vec![]));
        let s = seen.clone();
        ctx.set_notification(Arc::new(move |n| s.lock().push(n)));

        let nid = ctx.create_flow_counter("fc").unwrap();
        ctx.remove_object("fc").unwrap();
        assert_eq!(
            *seen.lock(),
            [
                Notification::ObjectAdded {
                    id: "fc".into(),
                    nid,
                    kind: ObjectKind::FlowCounter
                },
                Notification::ObjectRemoved { id: "fc".into(), nid },
            ]
        );
    }

    #[test]
    fn cyclic_tables_torn_down() {
        let ctx = Context::new("ctx", 1);
        let empty = TableDesc::Action { default_actions: vec![] };
        ctx.create_table("a", &empty).unwrap();
        ctx.create_table("b", &empty).unwrap();
        let to = |t: &str| EntryDesc::Action {
            actions: vec![ActionDesc::Lookup { table: t.into() }.into()],
            position: Position::Tail,
        };
        ctx.add_entry("a", "to-b", &to("b")).unwrap();
        ctx.add_entry("b", "to-a", &to("a")).unwrap();
        ctx.add_entry("a", "to-a", &to("a")).unwrap();

        let barrier = Arc::new(KMutex::new(false));
        let b = barrier.clone();
        ctx.cleanup(move || *b.lock() = true, |_| false);
        assert!(*barrier.lock());
        assert_eq!(ctx.objects().live(), 0);
        assert!(ctx.snapshot().is_empty());
    }

    #[test]
    fn attrs_and_dispatch_without_port() {
        let ctx = Context::new("ctx", 1);
        ctx.set_attr("mode", "strict");
        assert_eq!(ctx.attr("mode").as_deref(), Some("strict"));
        assert_eq!(ctx.attr("other"), None);

        let pkt = ctx.new_packet(HeaderKind::Opaque, &[1, 2, 3]).unwrap();
        assert_eq!(ctx.dispatch(pkt.clone()), State::Drop);

        let got = Arc::new(KMutex::new(vec![]));
        let g = got.clone();
        ctx.set_packet_sink(Arc::new(move |p: Packet| g.lock().push(p.len())));
        assert_eq!(ctx.dispatch(pkt), State::Consume);
        assert_eq!(*got.lock(), [3]);
    }
}
