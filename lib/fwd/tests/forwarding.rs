// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Ports, tables and counters wired together in a context.

use fwd::Context;
use fwd::api::ActionAttrDesc;
use fwd::api::ActionDesc;
use fwd::api::CounterId;
use fwd::api::Direction;
use fwd::api::EntryDesc;
use fwd::api::FieldId;
use fwd::api::FieldNum;
use fwd::api::HeaderKind;
use fwd::api::ObjectKind;
use fwd::api::PortDesc;
use fwd::api::PortStateReq;
use fwd::api::Position;
use fwd::api::SelectAlgo;
use fwd::api::State;
use fwd::api::TableDesc;
use fwd::engine::action::Action;
use fwd::engine::action::BuildError;
use fwd::engine::action::Outcome;
use fwd::engine::context::ContextBuilder;
use fwd::engine::context::Notification;
use fwd::engine::counter::CounterSink;
use fwd::engine::object::RegistryError;
use fwd::engine::packet::Packet;
use fwd::engine::port::Port;
use fwd::engine::port::receive;
use fwd::sync::KMutex;
use fwd_test_utils::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

fn port_desc(dir: Direction, actions: Vec<ActionDesc>) -> PortDesc {
    PortDesc { dir, actions: actions.into_iter().map(Into::into).collect() }
}

fn rx(ctx: &Context, port: &str, bytes: &[u8]) -> State {
    let obj = ctx.objects().find_id(port).unwrap();
    let pkt = Packet::parse(HeaderKind::Eth, bytes).unwrap();
    receive(ctx, &*obj, Direction::In, pkt)
}

#[test]
fn table_forwards_between_ports() {
    let ctx = Context::new("fwd", 0);
    let vif0 = TestPort::add(&ctx, "vif0").unwrap();
    let vif1 = TestPort::add(&ctx, "vif1").unwrap();
    ctx.create_table("l2", &TableDesc::Action { default_actions: vec![ActionDesc::Drop.into()] })
        .unwrap();
    ctx.create_flow_counter("flows").unwrap();

    vif0.update(
        &ctx,
        &port_desc(
            Direction::In,
            vec![ActionDesc::Lookup { table: "l2".into() }, ActionDesc::Output],
        ),
    )
    .unwrap();

    // Nothing in the table yet: the default drops.
    let frame = ether_ipv4_tcp(b"ping");
    assert_eq!(rx(&ctx, "vif0", &frame), State::Drop);
    assert_eq!(vif1.written(), 0);

    ctx.add_entry(
        "l2",
        "to-vif1",
        &EntryDesc::Action {
            actions: vec![
                ActionDesc::FlowCounter { counter: "flows".into() }.into(),
                ActionDesc::Transmit { port: "vif1".into(), immediate: false }.into(),
            ],
            position: Position::Tail,
        },
    )
    .unwrap();

    assert_eq!(rx(&ctx, "vif0", &frame), State::Consume);
    let out = vif1.take();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].input_port(), vif0.nid());
    assert_eq!(out[0].output_port(), vif1.nid());

    let flows = ctx.objects().find_id("flows").unwrap();
    assert!(flows.as_flow_counter().is_some());
    let fc = flows.counters().unwrap();
    assert_eq!(fc.get(CounterId::FlowPackets), Some(1));
    assert_eq!(fc.get(CounterId::FlowOctets), Some(frame.len() as u64));

    let state = vif0.state(&PortStateReq { counters: true });
    assert_eq!(state.rx_actions, 2);
    assert_eq!(state.counters.get(&CounterId::RxPackets), Some(&2));
    assert_eq!(state.counters.get(&CounterId::TxPackets), Some(&1));
    assert_eq!(state.counters.get(&CounterId::DropPackets), Some(&1));

    // A refusing port turns the output into a transmit error.
    vif1.refuse(true);
    assert_eq!(rx(&ctx, "vif0", &frame), State::Drop);
    let state = vif0.state(&PortStateReq { counters: true });
    assert_eq!(state.counters.get(&CounterId::TxErrorPackets), Some(&1));

    let json = serde_json::to_string(&ctx.snapshot()).unwrap();
    assert!(json.contains(r#""id":"l2","nid":"#));
}

#[test]
fn swap_output_uses_tap_pair() {
    let ctx = Context::new("fwd", 0);
    let vif = TestPort::add(&ctx, "vif0").unwrap();
    let tap = TestPort::add(&ctx, "vif0-tap").unwrap();

    tap.update(&ctx, &port_desc(Direction::In, vec![ActionDesc::SwapOutput, ActionDesc::Output]))
        .unwrap();
    vif.update(&ctx, &port_desc(Direction::In, vec![ActionDesc::SwapOutput, ActionDesc::Output]))
        .unwrap();

    assert_eq!(rx(&ctx, "vif0-tap", &ether_ipv4_udp(1000, 53, b"q")), State::Consume);
    assert_eq!(vif.written(), 1);
    assert_eq!(rx(&ctx, "vif0", &ether_ipv4_udp(53, 1000, b"a")), State::Consume);
    assert_eq!(tap.written(), 1);

    let lone = TestPort::add(&ctx, "vif9").unwrap();
    lone.update(&ctx, &port_desc(Direction::In, vec![ActionDesc::SwapOutput])).unwrap();
    assert_eq!(rx(&ctx, "vif9", &ether_ipv4_udp(1, 2, b"x")), State::Drop);
    let state = lone.state(&PortStateReq { counters: true });
    assert_eq!(state.counters.get(&CounterId::TxErrorPackets), Some(&1));
}

#[test]
fn select_spreads_by_flow() {
    let ctx = Context::new("fwd", 0);
    let ports: Vec<_> =
        (0..4).map(|n| TestPort::add(&ctx, &format!("uplink{n}")).unwrap()).collect();
    let lists = (0..4)
        .map(|n| {
            vec![ActionAttrDesc::from(ActionDesc::Transmit {
                port: format!("uplink{n}"),
                immediate: true,
            })]
        })
        .collect();
    let vif = TestPort::add(&ctx, "vif0").unwrap();
    vif.update(
        &ctx,
        &port_desc(
            Direction::In,
            vec![ActionDesc::SelectActionList {
                fields: vec![
                    FieldId::new(FieldNum::IpAddrSrc),
                    FieldId::new(FieldNum::L4PortSrc),
                ],
                algo: SelectAlgo::Crc32,
                lists,
            }],
        ),
    )
    .unwrap();

    for sport in 1000..1064 {
        assert_eq!(rx(&ctx, "vif0", &ether_ipv4_udp(sport, 53, b"")), State::Consume);
    }
    // The same flow always lands on the same uplink.
    let before: Vec<_> = ports.iter().map(|p| p.written()).collect();
    for _ in 0..8 {
        rx(&ctx, "vif0", &ether_ipv4_udp(1000, 53, b""));
    }
    let after: Vec<_> = ports.iter().map(|p| p.written()).collect();
    let moved: Vec<_> = before.iter().zip(&after).filter(|(b, a)| b != a).collect();
    assert_eq!(moved.len(), 1);
    assert_eq!(after.iter().sum::<usize>(), 72);
    assert!(after.iter().filter(|n| **n > 0).count() > 1);
}

#[test]
fn removal_waits_for_references() {
    let ctx = Context::new("fwd", 0);
    let events = Arc::new(KMutex::new(vec![]));
    let ev = events.clone();
    ctx.set_notification(Arc::new(move |n| ev.lock().push(n)));

    let vif = TestPort::add(&ctx, "vif0").unwrap();
    ctx.create_table("t0", &TableDesc::Action { default_actions: vec![] }).unwrap();
    ctx.add_entry(
        "t0",
        "out",
        &EntryDesc::Action {
            actions: vec![ActionDesc::Transmit { port: "vif0".into(), immediate: true }.into()],
            position: Position::Head,
        },
    )
    .unwrap();
    vif.update(&ctx, &port_desc(Direction::In, vec![ActionDesc::Lookup { table: "t0".into() }]))
        .unwrap();
    assert_eq!(ctx.objects().refs("vif0"), Ok(2));
    assert_eq!(ctx.objects().refs("t0"), Ok(2));

    // Held by the table, the port outlives its ID.
    ctx.remove_object("vif0").unwrap();
    assert_eq!(vif.cleanups(), 0);
    assert_eq!(
        ctx.objects().find_id("vif0").map(|_| ()),
        Err(RegistryError::NotFound("vif0".into()))
    );
    assert!(ctx.resolve_port(vif.nid()).is_some());

    // Dropping the entry drops the last reference.
    ctx.remove_entry("t0", "out").unwrap();
    assert_eq!(vif.cleanups(), 1);
    assert!(ctx.resolve_port(vif.nid()).is_none());
    ctx.remove_object("t0").unwrap();
    assert_eq!(ctx.objects().live(), 0);
}

#[test]
fn teardown_removes_ports_first() {
    let ctx = Context::new("fwd", 0);
    let events = Arc::new(KMutex::new(vec![]));
    let ev = events.clone();
    ctx.set_notification(Arc::new(move |n| ev.lock().push(n)));

    let vif = TestPort::add(&ctx, "vif0").unwrap();
    ctx.create_table("t0", &TableDesc::Action { default_actions: vec![] }).unwrap();
    ctx.add_entry(
        "t0",
        "out",
        &EntryDesc::Action {
            actions: vec![ActionDesc::Transmit { port: "vif0".into(), immediate: true }.into()],
            position: Position::Head,
        },
    )
    .unwrap();
    vif.update(&ctx, &port_desc(Direction::In, vec![ActionDesc::Lookup { table: "t0".into() }]))
        .unwrap();

    let at_barrier = Arc::new(KMutex::new(None));
    let (b, v, t) = (at_barrier.clone(), vif.clone(), ctx.objects().clone());
    ctx.cleanup(
        move || *b.lock() = Some((v.cleanups(), t.refs("t0"))),
        |o| o.kind() == ObjectKind::Port,
    );

    // The port was forced out ahead of the barrier, dropping its
    // reference on the table.
    assert_eq!(*at_barrier.lock(), Some((1, Ok(1))));
    assert_eq!(vif.cleanups(), 1);
    assert_eq!(ctx.objects().live(), 0);

    let removed: Vec<_> = events
        .lock()
        .iter()
        .filter_map(|n| match n {
            Notification::ObjectRemoved { id, .. } => Some(id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(removed, ["vif0", "t0"]);
}

struct Stamp(String);

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "stamp({})", self.0)
    }
}

impl Action for Stamp {
    fn process(&self, pkt: &mut Packet, _: &dyn CounterSink) -> Outcome {
        pkt.set_attr("stamp", self.0.clone());
        Outcome::state(State::Continue)
    }
}

#[test]
fn custom_actions_and_slog() {
    let ctx = ContextBuilder::new("fwd", 7)
        .log(Box::new(test_logger()))
        .register_action(
            "stamp",
            Arc::new(
                |_ctx: &Context,
                 args: &BTreeMap<String, String>|
                 -> Result<Arc<dyn Action>, BuildError> {
                    let tag = args.get("tag").ok_or_else(|| BuildError::Invalid {
                        action: "stamp".into(),
                        msg: "missing tag".into(),
                    })?;
                    Ok(Arc::new(Stamp(tag.clone())))
                },
            ),
        )
        .build();

    let stamp = |args: &[(&str, &str)]| ActionDesc::Custom {
        kind: "stamp".into(),
        args: args.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    };

    let vif = TestPort::add(&ctx, "vif0").unwrap();
    vif.update(&ctx, &port_desc(Direction::In, vec![stamp(&[("tag", "blue")])])).unwrap();
    let obj = ctx.objects().find_id("vif0").unwrap();
    let mut pkt = Packet::parse(HeaderKind::Eth, &ether_ipv4_tcp(b"")).unwrap();
    let state = ctx.process_pipeline(&mut pkt, &vif.actions(Direction::In), obj.counters().unwrap());
    assert_eq!(state, State::Continue);
    assert_eq!(pkt.attr("stamp"), Some("blue"));

    // A failed update leaves the old list in place.
    assert!(vif.update(&ctx, &port_desc(Direction::In, vec![stamp(&[])])).is_err());
    assert!(matches!(
        vif.update(
            &ctx,
            &port_desc(Direction::In, vec![ActionDesc::Custom { kind: "paint".into(), args: BTreeMap::new() }])
        ),
        Err(BuildError::UnknownAction(k)) if k == "paint"
    ));
    assert_eq!(vif.actions(Direction::In).len(), 1);
}

#[test]
fn config_from_ron() {
    let ctx = Context::new("fwd", 0);
    let out = TestPort::add(&ctx, "out0").unwrap();

    let table: TableDesc = ron::from_str(
        r#"Action(default_actions: [
            (action: Update((field: Field(num: IpHop, instance: Instance(0)), op: Dec, value: [1]))),
            (action: Transmit(port: "out0", immediate: true), on_evaluate: true),
            (action: Evaluate),
        ])"#,
    )
    .unwrap();
    ctx.create_table("route", &table).unwrap();

    let entry: EntryDesc = serde_json::from_str(
        r#"{"Action": {"actions": [{"action": "Debug"}], "position": "Head"}}"#,
    )
    .unwrap();
    ctx.add_entry("route", "dbg", &entry).unwrap();
    ctx.remove_entry("route", "dbg").unwrap();

    let seq = fwd::engine::action::build_list(
        &ctx,
        &[ActionDesc::Lookup { table: "route".into() }.into()],
    )
    .unwrap();
    let mut pkt = Packet::parse(HeaderKind::Eth, &ether_ipv4_tcp(b"")).unwrap();
    let counters = fwd::engine::counter::Counters::port();
    assert_eq!(ctx.process_pipeline(&mut pkt, &seq, &counters), State::Output);
    assert_eq!(pkt.field_get(FieldNum::IpHop.into()).unwrap(), vec![63]);
    assert_eq!(ctx.dispatch(pkt), State::Consume);
    assert_eq!(out.written(), 1);
}
