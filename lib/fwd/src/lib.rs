// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The forwarding core of a software dataplane.
//!
//! A raw frame is parsed into a [`Packet`](engine::packet::Packet): a
//! per-group table of protocol handlers (Ethernet, an IP/GRE tunnel
//! chain, TCP/UDP/ICMP, ARP, MPLS). An action sequence then runs
//! against the packet in the [pipeline](engine::pipeline), resolving
//! tables, ports and counters through the reference-counted
//! [object registry](engine::object) of a
//! [`Context`](engine::context::Context). The packet is finally
//! serialized, with lengths and checksums rebuilt only where they may
//! have gone stale.

#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub use fwd_api as api;

pub mod engine;
pub mod print;
pub mod provider;
pub mod sync;
pub mod time;

pub use engine::context::Context;
pub use engine::packet::Packet;
