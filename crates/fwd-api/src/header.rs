// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// The layer bucket a header lives in.
///
/// The declaration order is the on-wire order: every frame holds its
/// groups in the order `Packet < L2 < L3 < L4 < Payload`.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum HeaderGroup {
    /// Synthetic per-packet metadata, never on the wire.
    Packet = 0,
    L2 = 1,
    L3 = 2,
    L4 = 3,
    Payload = 4,
}

impl HeaderGroup {
    pub const COUNT: usize = 5;

    /// All groups in on-wire order.
    pub const ALL: [HeaderGroup; Self::COUNT] =
        [Self::Packet, Self::L2, Self::L3, Self::L4, Self::Payload];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The group immediately outside this one.
    pub const fn outer(self) -> Option<Self> {
        match self {
            Self::Packet => None,
            Self::L2 => Some(Self::Packet),
            Self::L3 => Some(Self::L2),
            Self::L4 => Some(Self::L3),
            Self::Payload => Some(Self::L4),
        }
    }

    /// The group immediately inside this one.
    pub const fn inner(self) -> Option<Self> {
        match self {
            Self::Packet => Some(Self::L2),
            Self::L2 => Some(Self::L3),
            Self::L3 => Some(Self::L4),
            Self::L4 => Some(Self::Payload),
            Self::Payload => None,
        }
    }
}

impl Display for HeaderGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Packet => "PACKET",
            Self::L2 => "L2",
            Self::L3 => "L3",
            Self::L4 => "L4",
            Self::Payload => "PAYLOAD",
        };
        write!(f, "{s}")
    }
}

/// A kind of header the engine knows how to parse, and possibly
/// synthesize.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum HeaderKind {
    /// Terminates parsing.
    None,
    /// Remaining bytes are payload with no further structure.
    Opaque,
    Metadata,
    Eth,
    /// Ethernet with a single 802.1Q tag.
    EthVlan,
    /// Ethernet with stacked 802.1ad/802.1Q tags.
    Eth1Q,
    Ip4,
    Ip6,
    Gre,
    /// IPv6 in IPv4 where the IPv6 destination is a 6to4 address
    /// embedding the outer IPv4 destination.
    SixToFourAuto,
    /// As [`Self::SixToFourAuto`], additionally requiring the IPv6
    /// source to embed the outer IPv4 source.
    SixToFourSecure,
    Arp,
    Mpls,
    Tcp,
    Udp,
    Icmp4,
    Icmp6,
}

impl HeaderKind {
    pub const COUNT: usize = 17;

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The group a header of this kind is placed in. `None` has no
    /// group.
    pub const fn group(self) -> Option<HeaderGroup> {
        use HeaderGroup::*;

        match self {
            Self::None => None,
            Self::Opaque => Some(Payload),
            Self::Metadata => Some(Packet),
            Self::Eth | Self::EthVlan | Self::Eth1Q => Some(L2),
            Self::Ip4
            | Self::Ip6
            | Self::Gre
            | Self::SixToFourAuto
            | Self::SixToFourSecure
            | Self::Arp
            | Self::Mpls => Some(L3),
            Self::Tcp | Self::Udp | Self::Icmp4 | Self::Icmp6 => Some(L4),
        }
    }

    pub const fn is_ip(self) -> bool {
        matches!(self, Self::Ip4 | Self::Ip6)
    }
}

impl Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Opaque => "OPAQUE",
            Self::Metadata => "METADATA",
            Self::Eth => "ETH",
            Self::EthVlan => "ETH_VLAN",
            Self::Eth1Q => "ETH_1Q",
            Self::Ip4 => "IP4",
            Self::Ip6 => "IP6",
            Self::Gre => "GRE",
            Self::SixToFourAuto => "6TO4_AUTO",
            Self::SixToFourSecure => "6TO4_SECURE",
            Self::Arp => "ARP",
            Self::Mpls => "MPLS",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Icmp4 => "ICMP4",
            Self::Icmp6 => "ICMP6",
        };
        write!(f, "{s}")
    }
}

impl FromStr for HeaderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "OPAQUE" => Ok(Self::Opaque),
            "METADATA" => Ok(Self::Metadata),
            "ETH" => Ok(Self::Eth),
            "ETH_VLAN" => Ok(Self::EthVlan),
            "ETH_1Q" => Ok(Self::Eth1Q),
            "IP4" => Ok(Self::Ip4),
            "IP6" => Ok(Self::Ip6),
            "GRE" => Ok(Self::Gre),
            "6TO4_AUTO" => Ok(Self::SixToFourAuto),
            "6TO4_SECURE" => Ok(Self::SixToFourSecure),
            "ARP" => Ok(Self::Arp),
            "MPLS" => Ok(Self::Mpls),
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            "ICMP4" => Ok(Self::Icmp4),
            "ICMP6" => Ok(Self::Icmp6),
            _ => Err(format!("unknown header kind: {s}")),
        }
    }
}
