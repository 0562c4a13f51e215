// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Named packet counters.
//!
//! A counter set is fixed when it is created. Increments are relaxed
//! atomic adds so that any number of packets may credit the same set
//! concurrently; a read is a snapshot of every counter at some point
//! during the read.

use super::object::Object;
use super::object::ObjectCore;
use crate::api::CounterId;
use crate::api::ObjectKind;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;
use std::collections::BTreeMap;

/// Where actions credit their packet and octet counts.
pub trait CounterSink: Send + Sync {
    /// Add `delta` to `id`. Counters the sink does not carry are
    /// ignored.
    fn increment(&self, id: CounterId, delta: u64);

    /// A snapshot of every counter.
    fn counters(&self) -> BTreeMap<CounterId, u64>;
}

/// Credit one packet of `len` bytes to a packets/octets pair.
pub fn count_packet(
    sink: &dyn CounterSink,
    packets: CounterId,
    octets: CounterId,
    len: usize,
) {
    sink.increment(packets, 1);
    sink.increment(octets, len as u64);
}

/// A fixed set of atomic counters.
#[derive(Debug)]
pub struct Counters {
    vals: BTreeMap<CounterId, AtomicU64>,
}

impl Counters {
    pub fn new(ids: &[CounterId]) -> Self {
        Self { vals: ids.iter().map(|id| (*id, AtomicU64::new(0))).collect() }
    }

    /// The counters every port carries.
    pub fn port() -> Self {
        Self::new(&CounterId::PORT)
    }

    pub fn get(&self, id: CounterId) -> Option<u64> {
        self.vals.get(&id).map(|v| v.load(Ordering::Relaxed))
    }

    pub fn ids(&self) -> impl Iterator<Item = CounterId> + '_ {
        self.vals.keys().copied()
    }
}

impl CounterSink for Counters {
    fn increment(&self, id: CounterId, delta: u64) {
        if let Some(v) = self.vals.get(&id) {
            v.fetch_add(delta, Ordering::Relaxed);
        }
    }

    fn counters(&self) -> BTreeMap<CounterId, u64> {
        self.vals
            .iter()
            .map(|(id, v)| (*id, v.load(Ordering::Relaxed)))
            .collect()
    }
}

/// A sink that counts nothing, for pipelines run outside any port.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl CounterSink for NullSink {
    fn increment(&self, _id: CounterId, _delta: u64) {}

    fn counters(&self) -> BTreeMap<CounterId, u64> {
        BTreeMap::new()
    }
}

/// A registry object holding an arbitrary counter set.
#[derive(Debug)]
pub struct CounterObject {
    core: ObjectCore,
    counters: Counters,
}

impl CounterObject {
    pub fn new(ids: &[CounterId]) -> Self {
        Self { core: ObjectCore::default(), counters: Counters::new(ids) }
    }
}

impl Object for CounterObject {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Counter
    }

    fn counters(&self) -> Option<&Counters> {
        Some(&self.counters)
    }
}

/// A packets/octets pair shared by every `flow_counter` action that
/// names it.
#[derive(Debug)]
pub struct FlowCounter {
    core: ObjectCore,
    counters: Counters,
}

impl Default for FlowCounter {
    fn default() -> Self {
        Self { core: ObjectCore::default(), counters: Counters::new(&CounterId::FLOW) }
    }
}

impl FlowCounter {
    pub fn add(&self, len: usize) {
        count_packet(
            &self.counters,
            CounterId::FlowPackets,
            CounterId::FlowOctets,
            len,
        );
    }
}

impl Object for FlowCounter {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::FlowCounter
    }

    fn counters(&self) -> Option<&Counters> {
        Some(&self.counters)
    }

    fn as_flow_counter(&self) -> Option<&FlowCounter> {
        Some(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fixed_set() {
        let c = Counters::new(&[CounterId::DropPackets, CounterId::DropOctets]);
        count_packet(&c, CounterId::DropPackets, CounterId::DropOctets, 60);
        c.increment(CounterId::TxPackets, 1);

        let snap = c.counters();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[&CounterId::DropPackets], 1);
        assert_eq!(snap[&CounterId::DropOctets], 60);
        assert_eq!(c.get(CounterId::TxPackets), None);
    }

    #[test]
    fn concurrent_increments() {
        let c = Arc::new(Counters::port());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = c.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.increment(CounterId::RxPackets, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.get(CounterId::RxPackets), Some(4000));
    }

    #[test]
    fn flow_counter() {
        let fc = FlowCounter::default();
        fc.add(100);
        fc.add(28);
        let snap = Object::counters(&fc).unwrap().counters();
        assert_eq!(snap[&CounterId::FlowPackets], 2);
        assert_eq!(snap[&CounterId::FlowOctets], 128);
    }
}
