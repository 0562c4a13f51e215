// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A token bucket rate limiter.
//!
//! The bucket starts full at `burst` bytes. A packet that fits in the
//! bucket passes and takes its length in tokens. Tokens are replenished
//! at `rate` bytes per second for the time elapsed since the last
//! passing packet, capped at `burst`. A packet that does not fit is
//! limited: it takes no tokens and does not move the reference time.

use super::Action;
use super::BuildError;
use super::Outcome;
use crate::Context;
use crate::api::ActionDesc;
use crate::api::CounterId;
use crate::api::State;
use crate::engine::attribute;
use crate::engine::attribute::RATELIMIT_ADVISORY;
use crate::engine::counter::CounterSink;
use crate::engine::counter::count_packet;
use crate::engine::packet::Packet;
use crate::sync::KMutex;
use crate::time::Clock;
use crate::time::Moment;
use crate::time::NANOS;
use core::fmt;
use core::fmt::Display;

#[derive(Debug)]
struct Bucket {
    tokens: u64,
    last: Option<Moment>,
}

pub struct Ratelimit {
    rate: u64,
    burst: u64,
    clock: Box<dyn Clock>,
    bucket: KMutex<Bucket>,
}

impl Ratelimit {
    pub fn new(ctx: &Context, rate: u64, burst: u64) -> Result<Self, BuildError> {
        Self::with_clock(ctx.clock(), rate, burst)
    }

    pub fn with_clock(
        clock: Box<dyn Clock>,
        rate: u64,
        burst: u64,
    ) -> Result<Self, BuildError> {
        if burst == 0 {
            return Err(BuildError::invalid(
                &ActionDesc::Ratelimit { rate, burst },
                "burst must be nonzero",
            ));
        }

        Ok(Self {
            rate,
            burst,
            clock,
            bucket: KMutex::new(Bucket { tokens: burst, last: None }),
        })
    }

    /// Try to take `len` tokens at `now`.
    fn admit(&self, len: u64, now: Moment) -> bool {
        let mut b = self.bucket.lock();

        let refill = match b.last {
            Some(last) => {
                let elapsed = u128::from(now.delta_as_nanos(last));
                let add = elapsed * u128::from(self.rate) / u128::from(NANOS);
                u64::try_from(add).unwrap_or(u64::MAX)
            }
            None => 0,
        };
        let avail = b.tokens.saturating_add(refill).min(self.burst);

        if len > avail {
            return false;
        }

        b.tokens = avail - len;
        b.last = Some(now);
        true
    }
}

impl Display for Ratelimit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ratelimit({}B/s, burst={}B)", self.rate, self.burst)
    }
}

impl Action for Ratelimit {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        let len = pkt.len();
        if self.admit(len as u64, self.clock.now()) {
            return Outcome::state(State::Continue);
        }

        count_packet(
            counters,
            CounterId::RatelimitPackets,
            CounterId::RatelimitOctets,
            len,
        );

        if attribute::is_true(pkt.attr(RATELIMIT_ADVISORY)) {
            pkt.log_debug(format!("ratelimit: advisory pass of {len}B"));
            Outcome::state(State::Continue)
        } else {
            Outcome::state(State::Drop)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::HeaderKind;
    use crate::engine::counter::Counters;
    use core::sync::atomic::AtomicU64;
    use core::sync::atomic::Ordering;
    use core::time::Duration;
    use std::sync::Arc;

    #[derive(Clone, Debug, Default)]
    struct FakeClock(Arc<AtomicU64>);

    impl FakeClock {
        fn advance(&self, d: Duration) {
            self.0.fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Moment {
            Moment::from_nanos(self.0.load(Ordering::Relaxed))
        }
    }

    fn pkt(len: usize) -> Packet {
        Packet::parse(HeaderKind::Opaque, &vec![0u8; len]).unwrap()
    }

    #[test]
    fn burst_then_limit() {
        let clock = FakeClock::default();
        let rl = Ratelimit::with_clock(Box::new(clock), 1000, 100).unwrap();
        let c = Counters::new(&[CounterId::RatelimitPackets, CounterId::RatelimitOctets]);

        let states: Vec<_> = [1000, 50, 50, 50]
            .into_iter()
            .map(|len| rl.process(&mut pkt(len), &c).state)
            .collect();
        assert_eq!(
            states,
            [State::Drop, State::Continue, State::Continue, State::Drop]
        );
        assert_eq!(c.get(CounterId::RatelimitPackets), Some(2));
        assert_eq!(c.get(CounterId::RatelimitOctets), Some(1050));
    }

    #[test]
    fn refill_capped_at_burst() {
        let clock = FakeClock::default();
        let rl = Ratelimit::with_clock(Box::new(clock.clone()), 1000, 100).unwrap();
        let c = Counters::port();

        assert_eq!(rl.process(&mut pkt(100), &c).state, State::Continue);
        assert_eq!(rl.process(&mut pkt(1), &c).state, State::Drop);

        // 50ms at 1000B/s is 50 bytes.
        clock.advance(Duration::from_millis(50));
        assert_eq!(rl.process(&mut pkt(51), &c).state, State::Drop);
        assert_eq!(rl.process(&mut pkt(50), &c).state, State::Continue);

        // A long idle period only fills the bucket to its depth.
        clock.advance(Duration::from_secs(60));
        assert_eq!(rl.process(&mut pkt(101), &c).state, State::Drop);
        assert_eq!(rl.process(&mut pkt(100), &c).state, State::Continue);
    }

    #[test]
    fn advisory_passes_and_counts() {
        let clock = FakeClock::default();
        let rl = Ratelimit::with_clock(Box::new(clock), 1000, 10).unwrap();
        let c = Counters::new(&[CounterId::RatelimitPackets, CounterId::RatelimitOctets]);

        let mut p = pkt(64);
        p.set_attr(RATELIMIT_ADVISORY, "true");
        assert_eq!(rl.process(&mut p, &c).state, State::Continue);
        assert_eq!(c.get(CounterId::RatelimitPackets), Some(1));

        // The advisory pass took no tokens.
        assert_eq!(rl.process(&mut pkt(10), &c).state, State::Continue);
    }

    #[test]
    fn window_bound() {
        let clock = FakeClock::default();
        let rl = Ratelimit::with_clock(Box::new(clock.clone()), 2000, 300).unwrap();
        let c = Counters::port();

        let mut passed = 0u64;
        for i in 0..500u64 {
            let len = 40 + (i * 37) % 200;
            if rl.process(&mut pkt(len as usize), &c).state == State::Continue {
                passed += len;
            }
            clock.advance(Duration::from_millis(3));
        }

        // 500 packets 3ms apart span 1.497s.
        assert!(passed <= 2000 * 1497 / 1000 + 300);
    }

    #[test]
    fn zero_burst_rejected() {
        assert!(Ratelimit::with_clock(Box::new(FakeClock::default()), 10, 0).is_err());
    }
}
