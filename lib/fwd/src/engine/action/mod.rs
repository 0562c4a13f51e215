// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Actions: the steps of a pipeline.
//!
//! An action is built once from its [`ActionDesc`] and then shared by
//! every packet that runs through the list holding it, so
//! [`Action::process`] takes `&self`; any state an action keeps
//! between packets (a token bucket) sits behind its own lock.
//! References an action takes on other objects at build time are
//! [`ObjectRef`](super::object::ObjectRef)s, released when the action
//! is dropped.

use super::counter::CounterSink;
use super::object::RegistryError;
use super::packet::Packet;
use crate::Context;
use crate::api::ActionAttrDesc;
use crate::api::ActionDesc;
use crate::api::State;
use crate::provider::LogLevel;
use core::fmt;
use core::fmt::Display;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub mod basic;
pub mod flow;
pub mod lookup;
pub mod mirror;
pub mod output;
pub mod ratelimit;
pub mod select;
pub mod update;

/// An immutable, shareable action sequence.
pub type ActionList = Arc<[ActionAttr]>;

/// The result of one action invocation: a continuation to run ahead
/// of the remaining actions, and the state of the packet.
#[derive(Clone, Default)]
pub struct Outcome {
    pub next: Option<ActionList>,
    pub state: State,
}

impl Outcome {
    pub const fn state(state: State) -> Self {
        Self { next: None, state }
    }

    /// Continue with `next` spliced in front of the remaining actions.
    pub fn then(next: ActionList) -> Self {
        Self { next: Some(next), state: State::Continue }
    }
}

impl From<State> for Outcome {
    fn from(state: State) -> Self {
        Self::state(state)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let next = self.next.as_ref().map(|n| n.len()).unwrap_or(0);
        write!(f, "Outcome({}, next={next})", self.state)
    }
}

pub trait Action: Display + Send + Sync {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome;
}

/// An action with its scheduling flag and its identity hash.
#[derive(Clone)]
pub struct ActionAttr {
    action: Arc<dyn Action>,
    on_evaluate: bool,
    hash: u32,
}

impl ActionAttr {
    /// Wrap an action built outside the descriptor path. The hash is
    /// taken over the action's display form.
    pub fn new(action: Arc<dyn Action>, on_evaluate: bool) -> Self {
        let mut h = crc32fast::Hasher::new();
        h.update(action.to_string().as_bytes());
        h.update(&[u8::from(on_evaluate)]);
        Self { action, on_evaluate, hash: h.finalize() }
    }

    pub fn from_desc(desc: &ActionAttrDesc, action: Arc<dyn Action>) -> Self {
        Self { action, on_evaluate: desc.on_evaluate, hash: hash_desc(desc) }
    }

    pub fn action(&self) -> &dyn Action {
        &*self.action
    }

    pub fn on_evaluate(&self) -> bool {
        self.on_evaluate
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

impl Display for ActionAttr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.on_evaluate {
            write!(f, "{} (on evaluate)", self.action)
        } else {
            write!(f, "{}", self.action)
        }
    }
}

impl fmt::Debug for ActionAttr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ActionAttr({self}, {:#010x})", self.hash)
    }
}

/// CRC32 over the postcard encoding of the descriptor and its flag.
pub fn hash_desc(desc: &ActionAttrDesc) -> u32 {
    let mut h = crc32fast::Hasher::new();
    match postcard::to_allocvec(&desc.action) {
        Ok(bytes) => h.update(&bytes),
        Err(_) => h.update(desc.action.to_string().as_bytes()),
    }
    h.update(&[u8::from(desc.on_evaluate)]);
    h.finalize()
}

/// Do two sequences hold the same actions, element by element?
pub fn is_equal(a: &[ActionAttr], b: &[ActionAttr]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.hash == y.hash)
}

/// An empty action list.
pub fn empty() -> ActionList {
    Arc::from(Vec::new())
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum BuildError {
    #[error("no builder registered for action {0}")]
    UnknownAction(String),

    #[error("invalid {action} action: {msg}")]
    Invalid { action: String, msg: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl BuildError {
    pub(crate) fn invalid(desc: &ActionDesc, msg: impl Into<String>) -> Self {
        Self::Invalid { action: desc.kind_name().to_string(), msg: msg.into() }
    }
}

/// A builder for [`ActionDesc::Custom`] actions of one kind.
pub type CustomBuilder = Arc<
    dyn Fn(&Context, &BTreeMap<String, String>) -> Result<Arc<dyn Action>, BuildError>
        + Send
        + Sync,
>;

/// Build one action. `continue` builds to nothing.
pub fn build(
    ctx: &Context,
    desc: &ActionDesc,
) -> Result<Option<Arc<dyn Action>>, BuildError> {
    let action: Arc<dyn Action> = match desc {
        ActionDesc::Continue => return Ok(None),
        ActionDesc::Drop => Arc::new(basic::DropPacket),
        ActionDesc::Debug => Arc::new(basic::SetDebug),
        ActionDesc::Decap { header } => Arc::new(basic::Decap::new(*header)),
        ActionDesc::Encap { header } => Arc::new(basic::Encap::new(*header)),
        ActionDesc::Evaluate => Arc::new(basic::Evaluate),
        ActionDesc::Reparse { header, fields, prepend } => Arc::new(
            basic::Reparse::new(*header, fields.clone(), prepend.clone()),
        ),
        ActionDesc::Output => Arc::new(output::Output::new(ctx)),
        ActionDesc::Transmit { port, immediate } => {
            Arc::new(output::Transmit::new(ctx, port, *immediate)?)
        }
        ActionDesc::SwapOutput => Arc::new(output::SwapOutput::new(ctx)),
        ActionDesc::Lookup { table } => Arc::new(lookup::Lookup::new(ctx, table)?),
        ActionDesc::Mirror { port, actions, fields } => Arc::new(
            mirror::Mirror::new(ctx, port.as_deref(), actions, fields)?,
        ),
        ActionDesc::Ratelimit { rate, burst } => {
            Arc::new(ratelimit::Ratelimit::new(ctx, *rate, *burst)?)
        }
        ActionDesc::SelectActionList { fields, algo, lists } => Arc::new(
            select::SelectActionList::new(ctx, fields.clone(), *algo, lists)?,
        ),
        ActionDesc::Update(u) => Arc::new(update::Update::new(u)?),
        ActionDesc::FlowCounter { counter } => {
            Arc::new(flow::FlowCount::new(ctx, counter)?)
        }
        ActionDesc::Custom { kind, args } => {
            let builder = ctx
                .custom_builder(kind)
                .ok_or_else(|| BuildError::UnknownAction(kind.clone()))?;
            builder(ctx, args)?
        }
    };

    Ok(Some(action))
}

/// Build an action list. When one action fails to build, the
/// references its already built siblings took are released before
/// the error is returned.
pub fn build_list(
    ctx: &Context,
    descs: &[ActionAttrDesc],
) -> Result<ActionList, BuildError> {
    let mut out = Vec::with_capacity(descs.len());

    for desc in descs {
        match build(ctx, &desc.action) {
            Ok(Some(action)) => out.push(ActionAttr::from_desc(desc, action)),
            Ok(None) => {}
            Err(e) => {
                ctx.log(
                    LogLevel::Error,
                    &format!("failed to build {}: {e}", desc.action),
                );
                return Err(e);
            }
        }
    }

    Ok(out.into())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::FieldNum;
    use crate::api::UpdateDesc;

    fn attr(desc: ActionDesc, on_evaluate: bool) -> ActionAttr {
        let desc = ActionAttrDesc { action: desc, on_evaluate };
        ActionAttr::from_desc(&desc, Arc::new(basic::DropPacket))
    }

    #[test]
    fn hash_equality() {
        let a = [
            attr(ActionDesc::Drop, false),
            attr(UpdateDesc::dec(FieldNum::IpHop, &[1]).into(), false),
        ];
        let b = [
            attr(ActionDesc::Drop, false),
            attr(UpdateDesc::dec(FieldNum::IpHop, &[1]).into(), false),
        ];
        assert!(is_equal(&a, &b));

        let c = [
            attr(ActionDesc::Drop, true),
            attr(UpdateDesc::dec(FieldNum::IpHop, &[1]).into(), false),
        ];
        assert!(!is_equal(&a, &c));

        let d = [
            attr(ActionDesc::Drop, false),
            attr(UpdateDesc::dec(FieldNum::IpHop, &[2]).into(), false),
        ];
        assert!(!is_equal(&a, &d));
        assert!(!is_equal(&a, &a[..1]));
        assert!(is_equal(&[], &[]));
    }

    #[test]
    fn display_marks_deferred() {
        let a = attr(ActionDesc::Drop, true);
        assert_eq!(a.to_string(), "drop (on evaluate)");
    }
}
