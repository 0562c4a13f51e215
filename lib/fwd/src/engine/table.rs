// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Tables.
//!
//! A table answers a `lookup` action with an action sequence for the
//! pipeline to run next. The [`ActionTable`] is the building block:
//! every entry contributes a run of actions to one flat list, placed
//! at its head or its tail when the entry is added.

use super::action::ActionList;
use super::action::BuildError;
use super::action::Outcome;
use super::action::build_list;
use super::counter::CounterSink;
use super::object::Object;
use super::object::ObjectCore;
use super::packet::Packet;
use crate::Context;
use crate::api::EntryDesc;
use crate::api::ObjectKind;
use crate::api::Position;
use crate::api::TableDesc;
use crate::sync::KRwLock;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TableError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("no entry {0}")]
    NoEntry(String),

    #[error("entry {0} already exists")]
    DuplicateEntry(String),

    #[error("object {0} is not a table")]
    NotATable(String),
}

pub trait Table: Send + Sync {
    /// The actions to run for `pkt`, returned as a continuation.
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome;

    fn add_entry(
        &self,
        ctx: &Context,
        id: &str,
        desc: &EntryDesc,
    ) -> Result<(), TableError>;

    fn remove_entry(&self, id: &str) -> Result<(), TableError>;

    fn clear(&self);

    /// Entry IDs in the order their actions run.
    fn entries(&self) -> Vec<String>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Span {
    start: usize,
    len: usize,
}

struct Inner {
    list: ActionList,
    spans: BTreeMap<String, Span>,
}

impl Default for Inner {
    fn default() -> Self {
        Self { list: super::action::empty(), spans: BTreeMap::new() }
    }
}

pub struct ActionTable {
    core: ObjectCore,
    default: KRwLock<ActionList>,
    inner: KRwLock<Inner>,
}

impl ActionTable {
    pub fn new(ctx: &Context, desc: &TableDesc) -> Result<Self, BuildError> {
        let TableDesc::Action { default_actions } = desc;
        Ok(Self {
            core: ObjectCore::default(),
            default: KRwLock::new(build_list(ctx, default_actions)?),
            inner: KRwLock::new(Inner::default()),
        })
    }

    /// The flattened action list of every entry.
    pub fn actions(&self) -> ActionList {
        self.inner.read().list.clone()
    }

    pub fn default_actions(&self) -> ActionList {
        self.default.read().clone()
    }

    /// Each entry with its run of actions, in list order.
    pub fn entry_actions(&self) -> Vec<(String, ActionList)> {
        let inner = self.inner.read();
        let mut spans: Vec<_> = inner.spans.iter().collect();
        spans.sort_by_key(|(_, s)| s.start);
        spans
            .into_iter()
            .map(|(id, s)| {
                let run: ActionList =
                    inner.list[s.start..s.start + s.len].to_vec().into();
                (id.clone(), run)
            })
            .collect()
    }

    fn insert(
        &self,
        id: &str,
        actions: ActionList,
        pos: Position,
    ) -> Result<(), TableError> {
        let mut inner = self.inner.write();
        if inner.spans.contains_key(id) {
            return Err(TableError::DuplicateEntry(id.to_string()));
        }

        let len = actions.len();
        let mut list = Vec::with_capacity(inner.list.len() + len);
        let start = match pos {
            Position::Head => {
                list.extend(actions.iter().cloned());
                list.extend(inner.list.iter().cloned());
                for s in inner.spans.values_mut() {
                    s.start += len;
                }
                0
            }

            Position::Tail => {
                list.extend(inner.list.iter().cloned());
                list.extend(actions.iter().cloned());
                inner.list.len()
            }
        };

        inner.list = list.into();
        inner.spans.insert(id.to_string(), Span { start, len });
        Ok(())
    }
}

impl Table for ActionTable {
    fn process(&self, _pkt: &mut Packet, _: &dyn CounterSink) -> Outcome {
        let list = self.actions();
        if list.is_empty() {
            Outcome::then(self.default_actions())
        } else {
            Outcome::then(list)
        }
    }

    fn add_entry(
        &self,
        ctx: &Context,
        id: &str,
        desc: &EntryDesc,
    ) -> Result<(), TableError> {
        let EntryDesc::Action { actions, position } = desc;
        let actions = build_list(ctx, actions)?;
        self.insert(id, actions, *position)
    }

    fn remove_entry(&self, id: &str) -> Result<(), TableError> {
        let old = {
            let mut inner = self.inner.write();
            let span = inner
                .spans
                .remove(id)
                .ok_or_else(|| TableError::NoEntry(id.to_string()))?;

            let mut list = inner.list.to_vec();
            list.drain(span.start..span.start + span.len);
            for s in inner.spans.values_mut() {
                if s.start > span.start {
                    s.start -= span.len;
                }
            }
            core::mem::replace(&mut inner.list, list.into())
        };

        // Released outside the lock, the removed actions may hold the
        // last reference to another table.
        drop(old);
        Ok(())
    }

    fn clear(&self) {
        let old = core::mem::take(&mut *self.inner.write());
        drop(old);
    }

    fn entries(&self) -> Vec<String> {
        self.entry_actions().into_iter().map(|(id, _)| id).collect()
    }
}

impl Object for ActionTable {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Table
    }

    fn cleanup(&self) {
        self.clear();
        let old = core::mem::replace(
            &mut *self.default.write(),
            super::action::empty(),
        );
        drop(old);
    }

    fn as_table(&self) -> Option<&dyn Table> {
        Some(self)
    }
}
