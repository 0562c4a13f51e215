// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print engine state in a human-friendly manner.
//!
//! This is mostly a place to hang printing routines so that they can
//! be used by both integrators and integration tests.

use crate::api::CounterId;
use crate::api::PortStateReply;
use crate::engine::object::ObjectInfo;
use crate::engine::table::ActionTable;
use std::collections::BTreeMap;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a registry snapshot.
pub fn print_objects(objs: &[ObjectInfo]) -> std::io::Result<()> {
    print_objects_into(&mut std::io::stdout(), objs)
}

/// Print a registry snapshot into a given writer.
pub fn print_objects_into(
    writer: &mut impl Write,
    objs: &[ObjectInfo],
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "ID\tNID\tKIND\tREFS")?;
    for o in objs {
        writeln!(t, "{}\t{}\t{}\t{}", o.id, o.nid, o.kind, o.refs)?;
    }
    t.flush()
}

/// Print a counter map into a given writer.
pub fn print_counters_into(
    writer: &mut impl Write,
    counters: &BTreeMap<CounterId, u64>,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "COUNTER\tVALUE")?;
    for (id, val) in counters {
        writeln!(t, "{id}\t{val}")?;
    }
    t.flush()
}

/// Print a [`PortStateReply`] into a given writer.
pub fn print_port_into(
    writer: &mut impl Write,
    state: &PortStateReply,
) -> std::io::Result<()> {
    writeln!(writer, "Port {} (NID {})", state.id, state.nid)?;
    write_hrb(writer)?;
    writeln!(writer, "RX actions: {}", state.rx_actions)?;
    writeln!(writer, "TX actions: {}", state.tx_actions)?;
    if !state.counters.is_empty() {
        writeln!(writer)?;
        print_counters_into(writer, &state.counters)?;
    }
    Ok(())
}

/// Print the entries of an [`ActionTable`] into a given writer.
pub fn print_table_into(
    writer: &mut impl Write,
    id: &str,
    table: &ActionTable,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Table {id}")?;
    write_hrb(&mut t)?;
    writeln!(t, "ENTRY\tPOS\tACTION")?;
    let mut pos = 0;
    for (entry, actions) in table.entry_actions() {
        for a in actions.iter() {
            writeln!(t, "{entry}\t{pos}\t{a}")?;
            pos += 1;
        }
    }
    t.flush()?;

    writeln!(t, "\nDefault Actions")?;
    write_hr(&mut t)?;
    for a in table.default_actions().iter() {
        writeln!(t, "{a}")?;
    }
    t.flush()
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Context;
    use crate::api::ActionDesc;
    use crate::api::EntryDesc;
    use crate::api::Position;
    use crate::api::TableDesc;
    use crate::engine::table::Table;

    #[test]
    fn objects_and_tables() {
        let ctx = Context::new("print", 0);
        let desc = TableDesc::Action { default_actions: vec![ActionDesc::Drop.into()] };
        let table = ActionTable::new(&ctx, &desc).unwrap();
        table
            .add_entry(
                &ctx,
                "e0",
                &EntryDesc::Action {
                    actions: vec![ActionDesc::Debug.into()],
                    position: Position::Tail,
                },
            )
            .unwrap();

        let mut out = vec![];
        print_table_into(&mut out, "t0", &table).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.starts_with("Table t0\n"));
        assert!(s.contains("e0"));
        assert!(s.contains("debug"));
        assert!(s.contains("drop"));

        ctx.create_flow_counter("fc").unwrap();
        let mut out = vec![];
        print_objects_into(&mut out, &ctx.snapshot()).unwrap();
        let s = String::from_utf8(out).unwrap();
        let mut lines = s.lines();
        assert!(lines.next().unwrap().starts_with("ID"));
        assert!(lines.next().unwrap().starts_with("fc"));
        assert_eq!(lines.next(), None);
    }
}
