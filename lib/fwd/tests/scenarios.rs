// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! End-to-end runs of frames through action pipelines.

use fwd::Context;
use fwd::api::ActionDesc;
use fwd::api::CounterId;
use fwd::api::FieldNum;
use fwd::api::HeaderKind;
use fwd::api::State;
use fwd::api::UpdateDesc;
use fwd::engine::action::ActionList;
use fwd::engine::action::build_list;
use fwd::engine::context::ContextBuilder;
use fwd::engine::counter::Counters;
use fwd::engine::packet::Packet;
use fwd::engine::pipeline::evaluate;
use fwd::engine::pipeline::process_pipeline;
use fwd_test_utils::*;

fn actions(ctx: &Context, descs: Vec<ActionDesc>) -> ActionList {
    let descs: Vec<_> = descs.into_iter().map(Into::into).collect();
    build_list(ctx, &descs).unwrap()
}

#[test]
fn basic_drop() {
    let ctx = Context::new("scenario", 0);
    let c = Counters::port();
    let mut pkt = Packet::parse(HeaderKind::Eth, &ether_ipv4_tcp(b"hello")).unwrap();
    let len = pkt.len() as u64;

    let seq = actions(&ctx, vec![ActionDesc::Drop]);
    assert_eq!(process_pipeline(&mut pkt, &seq, &c), State::Drop);
    assert_eq!(c.get(CounterId::DropPackets), Some(1));
    assert_eq!(c.get(CounterId::DropOctets), Some(len));
}

#[test]
fn ttl_decrement_and_rebuild() {
    let ctx = Context::new("scenario", 0);
    let c = Counters::port();
    let input = ipv4_ttl_ff();
    let mut pkt = Packet::parse(HeaderKind::Ip4, &input).unwrap();

    let seq = actions(&ctx, vec![UpdateDesc::dec(FieldNum::IpHop, &[0x01]).into()]);
    assert_eq!(process_pipeline(&mut pkt, &seq, &c), State::Continue);

    let out = pkt.serialize();
    #[rustfmt::skip]
    let want = [
        0x45, 0x01, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
        0xfe, 0x06, 0xa2, 0xad,
        0x01, 0x02, 0x03, 0x04,
        0x0a, 0x0b, 0x0c, 0x0d,
    ];
    assert_eq!(&out[..20], &want);
    // The TCP segment, stale checksum included, is untouched.
    assert_eq!(&out[20..], &input[20..]);
}

#[test]
fn ordered_pipeline_with_middle_terminator() {
    let trace = Trace::default();
    let seq: ActionList = vec![
        Recorder::attr(&trace, 0, State::Continue),
        Recorder::attr(&trace, 1, State::Consume),
        Recorder::attr(&trace, 2, State::Drop),
    ]
    .into();

    let mut pkt = Packet::parse(HeaderKind::Opaque, &[0u8; 8]).unwrap();
    assert_eq!(process_pipeline(&mut pkt, &seq, &Counters::port()), State::Consume);
    assert_eq!(*trace.lock(), [0, 1]);
}

#[test]
fn evaluate_deferral() {
    let trace = Trace::default();
    let seq: ActionList = vec![
        Recorder::deferred(&trace, 2, State::Continue),
        Recorder::deferred(&trace, 3, State::Continue),
        Recorder::attr(&trace, 0, State::Continue),
        Recorder::attr(&trace, 1, State::Evaluate),
    ]
    .into();

    let mut pkt = Packet::parse(HeaderKind::Opaque, &[0u8; 8]).unwrap();
    let v = evaluate(&mut pkt, &seq, &Counters::port());
    assert_eq!(v.state, State::Continue);
    assert_eq!(v.executed, 4);
    assert_eq!(*trace.lock(), [0, 1, 2, 3]);
}

#[test]
fn mirror_with_field_update() {
    let ctx = Context::new("scenario", 0);
    let port = TestPort::add(&ctx, "mirror0").unwrap();
    let c = Counters::port();

    let input = ether_opaque([1, 2, 3, 4, 5, 6], 28);
    let mut pkt = Packet::parse(HeaderKind::Eth, &input).unwrap();

    let set_dst = UpdateDesc::set(FieldNum::EtherMacDst, &[0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
    let seq = actions(
        &ctx,
        vec![ActionDesc::Mirror {
            port: Some("mirror0".into()),
            actions: vec![ActionDesc::from(set_dst).into()],
            fields: vec![],
        }],
    );

    assert_eq!(process_pipeline(&mut pkt, &seq, &c), State::Continue);
    assert_eq!(pkt.serialize(), input);

    let mut got = port.take();
    assert_eq!(got.len(), 1);
    let replica = got[0].serialize();
    assert_eq!(&replica[..6], &[0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
    assert_eq!(&replica[6..], &input[6..]);
    assert_eq!(got.pop().map(|p| p.output_port()), Some(port_nid(&ctx, "mirror0")));
    assert_eq!(c.get(CounterId::MirrorPackets), Some(1));
    assert_eq!(c.get(CounterId::MirrorErrorPackets), Some(0));
}

fn port_nid(ctx: &Context, id: &str) -> fwd::api::Nid {
    ctx.objects().find_id(id).unwrap().core().nid()
}

#[test]
fn ratelimit_token_bucket() {
    let clock = ManualClock::default();
    let ctx = ContextBuilder::new("scenario", 0).clock(Box::new(clock.clone())).build();
    let c = Counters::new(&CounterId::ALL);
    let seq = actions(&ctx, vec![ActionDesc::Ratelimit { rate: 1000, burst: 100 }]);

    let mut states = vec![];
    for len in [1000, 50, 50, 50] {
        let mut pkt = Packet::parse(HeaderKind::Opaque, &vec![0u8; len]).unwrap();
        states.push(process_pipeline(&mut pkt, &seq, &c));
    }
    assert_eq!(states, [State::Drop, State::Continue, State::Continue, State::Drop]);
    assert_eq!(c.get(CounterId::RatelimitPackets), Some(2));
    assert_eq!(c.get(CounterId::RatelimitOctets), Some(1050));

    // 50ms at 1000B/s buys back 50B.
    clock.advance_millis(50);
    let mut pkt = Packet::parse(HeaderKind::Opaque, &[0u8; 50]).unwrap();
    assert_eq!(process_pipeline(&mut pkt, &seq, &c), State::Continue);
}

#[test]
fn vlan_tag_moves_ethertype() {
    let untagged = Packet::parse(HeaderKind::Eth, &ether_ipv4_tcp(&[])).unwrap();
    let tagged = Packet::parse(HeaderKind::Eth, &ether_vlan_ipv4_tcp(42, &[])).unwrap();

    assert_eq!(untagged.field_get(FieldNum::EtherType.into()).unwrap(), vec![0x08, 0x00]);
    assert_eq!(tagged.field_get(FieldNum::EtherType.into()).unwrap(), vec![0x08, 0x00]);
    assert_eq!(tagged.field_get(FieldNum::VlanId.into()).unwrap(), vec![0x00, 42]);
    assert!(untagged.field_get(FieldNum::VlanId.into()).is_err());
}
