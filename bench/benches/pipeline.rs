// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use criterion::BatchSize;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use fwd::api::Direction;
use fwd::api::HeaderKind;
use fwd::engine::counter::Counters;
use fwd::engine::packet::Packet;
use fwd::engine::pipeline::process_pipeline;
use fwd::engine::port::Port;
use fwd_bench::Routed;
use fwd_bench::routed;
use fwd_test_utils::*;
use std::hint::black_box;

pub fn parse(c: &mut Criterion) {
    let tcp = ether_ipv4_tcp(&[0u8; 512]);
    let vlan = ether_vlan_ipv4_tcp(100, &[0u8; 512]);

    let mut c = c.benchmark_group("parse");
    c.bench_function("eth/ip4/tcp", |b| {
        b.iter(|| Packet::parse(HeaderKind::Eth, black_box(&tcp)))
    });
    c.bench_function("eth/vlan/ip4/tcp", |b| {
        b.iter(|| Packet::parse(HeaderKind::Eth, black_box(&vlan)))
    });
}

pub fn route(c: &mut Criterion) {
    let Routed { ctx: _ctx, vif, uplink: _uplink } = routed();
    let frame = ether_ipv4_tcp(&[0u8; 512]);
    let actions = vif.actions(Direction::In);
    let counters = Counters::port();

    let mut c = c.benchmark_group("pipeline");
    c.bench_function("lookup/update/transmit", |b| {
        b.iter_batched(
            || Packet::parse(HeaderKind::Eth, &frame).unwrap(),
            |mut pkt| {
                let state = process_pipeline(&mut pkt, &actions, &counters);
                (state, pkt.serialize())
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, parse, route);
criterion_main!(benches);
