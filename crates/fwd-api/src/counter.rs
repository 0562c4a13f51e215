// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// A named counter held by a forwarding object.
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
pub enum CounterId {
    RxPackets,
    RxOctets,
    TxPackets,
    TxOctets,
    DropPackets,
    DropOctets,
    ErrorPackets,
    ErrorOctets,
    RxDebugPackets,
    RxDebugOctets,
    EncapErrorPackets,
    EncapErrorOctets,
    TxErrorPackets,
    TxErrorOctets,
    MirrorPackets,
    MirrorOctets,
    MirrorErrorPackets,
    MirrorErrorOctets,
    RatelimitPackets,
    RatelimitOctets,
    FlowPackets,
    FlowOctets,
}

impl CounterId {
    pub const ALL: [CounterId; 22] = [
        Self::RxPackets,
        Self::RxOctets,
        Self::TxPackets,
        Self::TxOctets,
        Self::DropPackets,
        Self::DropOctets,
        Self::ErrorPackets,
        Self::ErrorOctets,
        Self::RxDebugPackets,
        Self::RxDebugOctets,
        Self::EncapErrorPackets,
        Self::EncapErrorOctets,
        Self::TxErrorPackets,
        Self::TxErrorOctets,
        Self::MirrorPackets,
        Self::MirrorOctets,
        Self::MirrorErrorPackets,
        Self::MirrorErrorOctets,
        Self::RatelimitPackets,
        Self::RatelimitOctets,
        Self::FlowPackets,
        Self::FlowOctets,
    ];

    /// The counters every port carries.
    pub const PORT: [CounterId; 18] = [
        Self::RxPackets,
        Self::RxOctets,
        Self::TxPackets,
        Self::TxOctets,
        Self::DropPackets,
        Self::DropOctets,
        Self::ErrorPackets,
        Self::ErrorOctets,
        Self::RxDebugPackets,
        Self::RxDebugOctets,
        Self::EncapErrorPackets,
        Self::EncapErrorOctets,
        Self::TxErrorPackets,
        Self::TxErrorOctets,
        Self::MirrorPackets,
        Self::MirrorOctets,
        Self::MirrorErrorPackets,
        Self::MirrorErrorOctets,
    ];

    /// The counters of a flow counter object.
    pub const FLOW: [CounterId; 2] = [Self::FlowPackets, Self::FlowOctets];
}

impl Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::RxPackets => "RX_PACKETS",
            Self::RxOctets => "RX_OCTETS",
            Self::TxPackets => "TX_PACKETS",
            Self::TxOctets => "TX_OCTETS",
            Self::DropPackets => "DROP_PACKETS",
            Self::DropOctets => "DROP_OCTETS",
            Self::ErrorPackets => "ERROR_PACKETS",
            Self::ErrorOctets => "ERROR_OCTETS",
            Self::RxDebugPackets => "RX_DEBUG_PACKETS",
            Self::RxDebugOctets => "RX_DEBUG_OCTETS",
            Self::EncapErrorPackets => "ENCAP_ERROR_PACKETS",
            Self::EncapErrorOctets => "ENCAP_ERROR_OCTETS",
            Self::TxErrorPackets => "TX_ERROR_PACKETS",
            Self::TxErrorOctets => "TX_ERROR_OCTETS",
            Self::MirrorPackets => "MIRROR_PACKETS",
            Self::MirrorOctets => "MIRROR_OCTETS",
            Self::MirrorErrorPackets => "MIRROR_ERROR_PACKETS",
            Self::MirrorErrorOctets => "MIRROR_ERROR_OCTETS",
            Self::RatelimitPackets => "RATELIMIT_PACKETS",
            Self::RatelimitOctets => "RATELIMIT_OCTETS",
            Self::FlowPackets => "FLOW_PACKETS",
            Self::FlowOctets => "FLOW_OCTETS",
        };
        write!(f, "{s}")
    }
}
