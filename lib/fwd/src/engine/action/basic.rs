// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Actions that only touch the packet.

use super::Action;
use super::Outcome;
use crate::api::CounterId;
use crate::api::FieldId;
use crate::api::HeaderKind;
use crate::api::State;
use crate::engine::counter::CounterSink;
use crate::engine::counter::count_packet;
use crate::engine::packet::Packet;
use core::fmt;
use core::fmt::Display;

pub struct DropPacket;

impl Display for DropPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "drop")
    }
}

impl Action for DropPacket {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        count_packet(
            counters,
            CounterId::DropPackets,
            CounterId::DropOctets,
            pkt.len(),
        );
        Outcome::state(State::Drop)
    }
}

pub struct SetDebug;

impl Display for SetDebug {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "debug")
    }
}

impl Action for SetDebug {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        pkt.set_debug(true);
        count_packet(
            counters,
            CounterId::RxDebugPackets,
            CounterId::RxDebugOctets,
            pkt.len(),
        );
        pkt.log_debug(format!("debug: {pkt}"));
        Outcome::state(State::Continue)
    }
}

pub struct Evaluate;

impl Display for Evaluate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "evaluate")
    }
}

impl Action for Evaluate {
    fn process(&self, _pkt: &mut Packet, _: &dyn CounterSink) -> Outcome {
        Outcome::state(State::Evaluate)
    }
}

/// Best-effort removal of a header; failures leave the packet as it
/// was.
pub struct Decap {
    kind: HeaderKind,
}

impl Decap {
    pub fn new(kind: HeaderKind) -> Self {
        Self { kind }
    }
}

impl Display for Decap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "decap({})", self.kind)
    }
}

impl Action for Decap {
    fn process(&self, pkt: &mut Packet, _: &dyn CounterSink) -> Outcome {
        if let Err(e) = pkt.decap(self.kind) {
            pkt.log_debug(format!("decap {}: {e}", self.kind));
        }
        Outcome::state(State::Continue)
    }
}

pub struct Encap {
    kind: HeaderKind,
}

impl Encap {
    pub fn new(kind: HeaderKind) -> Self {
        Self { kind }
    }
}

impl Display for Encap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "encap({})", self.kind)
    }
}

impl Action for Encap {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        match pkt.encap(self.kind) {
            Ok(()) => Outcome::state(State::Continue),
            Err(e) => {
                count_packet(
                    counters,
                    CounterId::EncapErrorPackets,
                    CounterId::EncapErrorOctets,
                    pkt.len(),
                );
                pkt.log_error(format!("encap {}: {e}", self.kind));
                Outcome::state(State::Drop)
            }
        }
    }
}

pub struct Reparse {
    kind: HeaderKind,
    fields: Vec<FieldId>,
    prepend: Vec<u8>,
}

impl Reparse {
    pub fn new(kind: HeaderKind, fields: Vec<FieldId>, prepend: Vec<u8>) -> Self {
        Self { kind, fields, prepend }
    }
}

impl Display for Reparse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "reparse({}, prepend={}B)", self.kind, self.prepend.len())
    }
}

impl Action for Reparse {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        match pkt.reparse(self.kind, &self.fields, &self.prepend) {
            Ok(()) => Outcome::state(State::Continue),
            Err(e) => {
                count_packet(
                    counters,
                    CounterId::ErrorPackets,
                    CounterId::ErrorOctets,
                    pkt.len(),
                );
                pkt.log_error(format!("reparse as {}: {e}", self.kind));
                Outcome::state(State::Drop)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::FieldNum;
    use crate::engine::counter::Counters;
    use fwd_test_utils::ether_ipv4_tcp;

    fn pkt() -> Packet {
        Packet::parse(HeaderKind::Eth, &ether_ipv4_tcp(&[0xAA; 8])).unwrap()
    }

    #[test]
    fn drop_counts() {
        let c = Counters::port();
        let mut p = pkt();
        let out = DropPacket.process(&mut p, &c);
        assert_eq!(out.state, State::Drop);
        assert!(out.next.is_none());
        assert_eq!(c.get(CounterId::DropPackets), Some(1));
        assert_eq!(c.get(CounterId::DropOctets), Some(p.len() as u64));
    }

    #[test]
    fn debug_sets_flag() {
        let c = Counters::port();
        let mut p = pkt();
        assert_eq!(SetDebug.process(&mut p, &c).state, State::Continue);
        assert!(p.debug());
        assert_eq!(p.log().len(), 1);
        assert_eq!(c.get(CounterId::RxDebugPackets), Some(1));
    }

    #[test]
    fn decap_is_best_effort() {
        let c = Counters::port();
        let mut p = pkt();
        let before = p.clone().serialize();
        let out = Decap::new(HeaderKind::Udp).process(&mut p, &c);
        assert_eq!(out.state, State::Continue);
        assert_eq!(p.serialize(), before);
    }

    #[test]
    fn encap_failure_drops() {
        let c = Counters::port();
        let mut p = pkt();
        let out = Encap::new(HeaderKind::Opaque).process(&mut p, &c);
        assert_eq!(out.state, State::Drop);
        assert_eq!(c.get(CounterId::EncapErrorPackets), Some(1));
        assert_eq!(p.log().len(), 1);

        let out = Encap::new(HeaderKind::EthVlan).process(&mut p, &c);
        assert_eq!(out.state, State::Continue);
        assert_eq!(c.get(CounterId::EncapErrorPackets), Some(1));
    }

    #[test]
    fn reparse_failure_drops() {
        let c = Counters::port();
        let mut p = pkt();
        p.set_input_port(7.into());

        // Strip the Ethernet header by reparsing from 14 bytes in.
        let fields = [FieldId::new(FieldNum::InputPort)];
        let out = Reparse::new(HeaderKind::Tcp, fields.to_vec(), vec![])
            .process(&mut p, &c);
        assert_eq!(out.state, State::Drop);
        assert_eq!(c.get(CounterId::ErrorPackets), Some(1));

        let out = Reparse::new(HeaderKind::Eth, fields.to_vec(), vec![])
            .process(&mut p, &c);
        assert_eq!(out.state, State::Continue);
        assert_eq!(p.input_port(), 7.into());
    }
}
