// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Moments and the clocks that produce them.

use core::fmt::Debug;
use core::time::Duration;
use dyn_clone::DynClone;
use std::sync::OnceLock;
use std::time::Instant;

/// The number of milliseconds in a second.
pub const MILLIS: u64 = 1_000;

/// The number of nanoseconds in a second.
pub const NANOS: u64 = 1_000_000_000;

/// The conversion from nanoseconds to milliseconds.
pub const NANOS_TO_MILLIS: u64 = NANOS / MILLIS;

/// A moment in time, in nanoseconds since an arbitrary epoch fixed by
/// the [`Clock`] that produced it. Moments from different clocks are
/// not comparable.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct Moment {
    nanos: u64,
}

impl Moment {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub const fn raw_nanos(&self) -> u64 {
        self.nanos
    }

    /// The time elapsed from `earlier` to `self`, saturating at zero
    /// when `earlier` is in fact later.
    pub fn delta_as_nanos(&self, earlier: Moment) -> u64 {
        self.nanos.saturating_sub(earlier.nanos)
    }

    pub fn delta_as_millis(&self, earlier: Moment) -> u64 {
        self.delta_as_nanos(earlier) / NANOS_TO_MILLIS
    }
}

impl core::ops::Add<Duration> for Moment {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let delta = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        Self { nanos: self.nanos.saturating_add(delta) }
    }
}

/// A source of [`Moment`]s.
///
/// Anything with time-dependent behavior (rate limiting) takes its
/// clock as a construction parameter so that tests can inject a
/// manual one.
pub trait Clock: DynClone + Debug + Send + Sync {
    fn now(&self) -> Moment;
}

dyn_clone::clone_trait_object!(Clock);

/// The monotonic system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Moment {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = *EPOCH.get_or_init(Instant::now);
        let nanos = Instant::now().duration_since(epoch).as_nanos();
        Moment::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deltas() {
        let t0 = Moment::from_nanos(5 * NANOS);
        let t1 = t0 + Duration::from_millis(1500);
        assert_eq!(t1.delta_as_millis(t0), 1500);
        assert_eq!(t0.delta_as_nanos(t1), 0);
    }

    #[test]
    fn system_clock_monotonic() {
        let clock: Box<dyn Clock> = Box::new(SystemClock);
        let a = clock.now();
        let b = dyn_clone::clone_box(&*clock).now();
        assert!(b >= a);
    }
}
