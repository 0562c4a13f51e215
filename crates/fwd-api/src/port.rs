// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use super::Direction;
use super::action::ActionAttrDesc;
use super::counter::CounterId;
use super::object::Nid;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use serde::Deserialize;
use serde::Serialize;

/// Replace the action list a port runs in one direction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PortDesc {
    pub dir: Direction,
    pub actions: Vec<ActionAttrDesc>,
}

/// What a caller wants to know about a port.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PortStateReq {
    pub counters: bool,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PortStateReply {
    pub id: String,
    pub nid: Nid,
    pub rx_actions: usize,
    pub tx_actions: usize,
    pub counters: BTreeMap<CounterId, u64>,
}
