// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The forwarding engine.
pub mod action;
pub mod arp;
pub mod attribute;
pub mod checksum;
pub mod context;
pub mod counter;
pub mod ether;
pub mod field;
pub mod frame;
pub mod gre;
pub mod headers;
pub mod icmp;
pub mod ip;
pub mod ip4;
pub mod ip6;
pub mod metadata;
pub mod mpls;
pub mod object;
pub mod opaque;
pub mod packet;
pub mod pipeline;
pub mod port;
pub mod protocol;
pub mod table;
pub mod tcp;
pub mod udp;
