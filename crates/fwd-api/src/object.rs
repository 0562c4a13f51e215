// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The internal numeric identifier of a forwarding object.
///
/// NIDs are allocated from a pool and recycled once the object they
/// named is finally released. Zero is never allocated.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Nid(u64);

impl Nid {
    pub const INVALID: Self = Self(0);

    pub const fn new(val: u64) -> Self {
        Self(val)
    }

    pub const fn val(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Big-endian bytes, as carried in packet metadata.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for Nid {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl Display for Nid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The broad class of a forwarding object.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
pub enum ObjectKind {
    Port,
    Table,
    Counter,
    FlowCounter,
    Other,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Port => "port",
            Self::Table => "table",
            Self::Counter => "counter",
            Self::FlowCounter => "flow-counter",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}
