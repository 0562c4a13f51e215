// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod frames;
pub mod port;

pub use frames::*;
pub use port::TestPort;

use fwd::api::State;
use fwd::engine::action::Action;
use fwd::engine::action::ActionAttr;
use fwd::engine::action::Outcome;
use fwd::engine::counter::CounterSink;
use fwd::engine::packet::Packet;
use fwd::sync::KMutex;
use fwd::time::Clock;
use fwd::time::Moment;
use slog::Drain;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// The shared log of which [`Recorder`] ran, in order.
pub type Trace = Arc<KMutex<Vec<usize>>>;

/// An action that notes its tag in a [`Trace`] and returns a fixed
/// state.
pub struct Recorder {
    pub tag: usize,
    pub state: State,
    pub trace: Trace,
}

impl Recorder {
    pub fn attr(trace: &Trace, tag: usize, state: State) -> ActionAttr {
        ActionAttr::new(Arc::new(Self { tag, state, trace: trace.clone() }), false)
    }

    /// As [`Self::attr`], deferred until an `Evaluate`.
    pub fn deferred(trace: &Trace, tag: usize, state: State) -> ActionAttr {
        ActionAttr::new(Arc::new(Self { tag, state, trace: trace.clone() }), true)
    }
}

impl fmt::Display for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "record({}, {:?})", self.tag, self.state)
    }
}

impl Action for Recorder {
    fn process(&self, _: &mut Packet, _: &dyn CounterSink) -> Outcome {
        self.trace.lock().push(self.tag);
        Outcome::state(self.state)
    }
}

/// A clock that only moves when told to.
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn advance_nanos(&self, nanos: u64) {
        self.0.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance_nanos(millis * 1_000_000);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Moment {
        Moment::from_nanos(self.0.load(Ordering::Relaxed))
    }
}

/// A logger writing through the test harness's captured stdout.
pub fn test_logger() -> slog::Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}
