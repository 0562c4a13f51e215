// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The protocol registry: how each header kind is parsed, whether it
//! can be synthesized, and which group it lives in.
//!
//! The table is built once, on first use, and never changes.

use super::arp;
use super::ether;
use super::frame::Frame;
use super::headers::Handler;
use super::headers::HeaderError;
use super::headers::ParseError;
use super::icmp;
use super::ip;
use super::metadata;
use super::mpls;
use super::opaque;
use super::tcp;
use super::udp;
use crate::api::HeaderGroup;
use crate::api::HeaderKind;
use std::sync::LazyLock;

/// Parse one handler's worth of headers, returning the handler and
/// the kind of the header that follows.
pub type ParseFn = fn(
    &mut Frame<'_>,
    HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError>;

/// Synthesize a fresh handler holding a default header of a kind.
pub type AddFn = fn(HeaderKind) -> Result<Handler, HeaderError>;

#[derive(Clone, Copy)]
pub struct Protocol {
    pub kind: HeaderKind,
    pub group: HeaderGroup,
    pub parse: Option<ParseFn>,
    pub add: Option<AddFn>,
}

impl Protocol {
    const fn new(
        kind: HeaderKind,
        group: HeaderGroup,
        parse: Option<ParseFn>,
        add: Option<AddFn>,
    ) -> Self {
        Self { kind, group, parse, add }
    }
}

static PROTOCOLS: LazyLock<[Option<Protocol>; HeaderKind::COUNT]> =
    LazyLock::new(|| {
        use HeaderGroup as G;
        use HeaderKind as K;

        let entries = [
            Protocol::new(K::Opaque, G::Payload, Some(opaque::parse), None),
            Protocol::new(K::Metadata, G::Packet, Some(metadata::parse), None),
            Protocol::new(K::Eth, G::L2, Some(ether::parse), Some(ether::add)),
            Protocol::new(K::EthVlan, G::L2, Some(ether::parse), Some(ether::add)),
            Protocol::new(K::Eth1Q, G::L2, Some(ether::parse), Some(ether::add)),
            Protocol::new(K::Ip4, G::L3, Some(ip::parse), Some(ip::add)),
            Protocol::new(K::Ip6, G::L3, Some(ip::parse), Some(ip::add)),
            Protocol::new(K::Gre, G::L3, Some(ip::parse), None),
            // Only meaningful as modifications of an existing chain.
            Protocol::new(K::SixToFourAuto, G::L3, None, None),
            Protocol::new(K::SixToFourSecure, G::L3, None, None),
            Protocol::new(K::Arp, G::L3, Some(arp::parse), None),
            Protocol::new(K::Mpls, G::L3, Some(mpls::parse), Some(mpls::add)),
            Protocol::new(K::Tcp, G::L4, Some(tcp::parse), Some(tcp::add)),
            Protocol::new(K::Udp, G::L4, Some(udp::parse), Some(udp::add)),
            Protocol::new(K::Icmp4, G::L4, Some(icmp::v4::parse), Some(icmp::v4::add)),
            Protocol::new(K::Icmp6, G::L4, Some(icmp::v6::parse), Some(icmp::v6::add)),
        ];

        let mut table = [None; HeaderKind::COUNT];
        for p in entries {
            table[p.kind.index()] = Some(p);
        }
        table
    });

/// Look up the registry entry for `kind`. [`HeaderKind::None`] has
/// none.
pub fn lookup(kind: HeaderKind) -> Option<&'static Protocol> {
    PROTOCOLS[kind.index()].as_ref()
}
