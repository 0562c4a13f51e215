// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Shared setup for the forwarding benchmarks.

use fwd::Context;
use fwd::api::ActionDesc;
use fwd::api::Direction;
use fwd::api::EntryDesc;
use fwd::api::FieldNum;
use fwd::api::PortDesc;
use fwd::api::Position;
use fwd::api::TableDesc;
use fwd::api::UpdateDesc;
use fwd::engine::port::Port;
use fwd_test_utils::TestPort;
use std::sync::Arc;

/// A guest port whose inbound pipeline routes everything to an
/// uplink: lookup, TTL decrement, source rewrite, transmit.
pub struct Routed {
    pub ctx: Arc<Context>,
    pub vif: Arc<TestPort>,
    pub uplink: Arc<TestPort>,
}

pub fn routed() -> Routed {
    let ctx = Context::new("bench", 0);
    let vif = TestPort::add(&ctx, "vif0").unwrap();
    let uplink = TestPort::add(&ctx, "uplink0").unwrap();
    ctx.create_table("route", &TableDesc::Action { default_actions: vec![] })
        .unwrap();
    ctx.add_entry(
        "route",
        "default",
        &EntryDesc::Action {
            actions: vec![
                ActionDesc::from(UpdateDesc::dec(FieldNum::IpHop, &[1])).into(),
                ActionDesc::from(UpdateDesc::set(
                    FieldNum::IpAddrSrc,
                    &[192, 168, 0, 1],
                ))
                .into(),
                ActionDesc::Transmit { port: "uplink0".into(), immediate: true }
                    .into(),
            ],
            position: Position::Tail,
        },
    )
    .unwrap();
    vif.update(
        &ctx,
        &PortDesc {
            dir: Direction::In,
            actions: vec![ActionDesc::Lookup { table: "route".into() }.into()],
        },
    )
    .unwrap();

    Routed { ctx, vif, uplink }
}
