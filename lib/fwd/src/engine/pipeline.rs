// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The action pipeline.
//!
//! A pipeline runs an action sequence against one packet. Each action
//! returns a state and, optionally, a continuation: a further sequence
//! to run ahead of the actions that follow it. Continuations are kept
//! on a stack of shared sub-sequences rather than spliced into a new
//! flat list, so a splice costs one push regardless of how much work
//! remains.
//!
//! Actions flagged on-evaluate are deferred while the top-level
//! sequence runs. When an action returns [`State::Evaluate`] the
//! deferred actions run, in the order they were met, as a nested pass
//! in which on-evaluate flags are ignored and a further `Evaluate`
//! counts as `Continue`. The state of that pass becomes the state of
//! the evaluating action.
//!
//! Every invocation counts against [`MAX_ACTIONS`]. The packet is
//! dropped once the bound is reached.

use super::action::ActionAttr;
use super::action::ActionList;
use super::action::Outcome;
use super::counter::CounterSink;
use super::packet::Packet;
use crate::api::State;
use thiserror::Error;

/// The most action invocations one packet may cost.
pub const MAX_ACTIONS: usize = 100;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum PipelineError {
    #[error("action limit of {0} reached")]
    ActionLimit(usize),
}

/// The result of a pipeline run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Verdict {
    /// One of `Drop`, `Consume`, `Output` or `Continue`.
    pub state: State,
    /// The number of action invocations.
    pub executed: usize,
    pub error: Option<PipelineError>,
}

struct Pipeline<'a> {
    counters: &'a dyn CounterSink,
    executed: usize,
    deferred: Vec<ActionAttr>,
}

impl Pipeline<'_> {
    fn run(
        &mut self,
        pkt: &mut Packet,
        seq: ActionList,
        top: bool,
    ) -> Result<State, PipelineError> {
        let mut stack: Vec<(ActionList, usize)> = vec![(seq, 0)];

        while let Some((list, curr)) = stack.last_mut() {
            let attr = list.get(*curr).cloned();
            *curr += 1;
            let Some(attr) = attr else {
                stack.pop();
                continue;
            };

            if top && attr.on_evaluate() {
                self.deferred.push(attr);
                continue;
            }

            let Outcome { next, state } = attr.action().process(pkt, self.counters);
            self.executed += 1;
            if self.executed >= MAX_ACTIONS {
                return Err(PipelineError::ActionLimit(MAX_ACTIONS));
            }

            let state = match state {
                State::Evaluate if top => {
                    let deferred: ActionList =
                        core::mem::take(&mut self.deferred).into();
                    self.run(pkt, deferred, false)?
                }
                State::Evaluate => State::Continue,
                s => s,
            };

            if state != State::Continue {
                return Ok(state);
            }

            if let Some(next) = next.filter(|n| !n.is_empty()) {
                stack.push((next, 0));
            }
        }

        Ok(State::Continue)
    }
}

/// Run `actions` against `pkt`, reporting how the run went.
pub fn evaluate(
    pkt: &mut Packet,
    actions: &ActionList,
    counters: &dyn CounterSink,
) -> Verdict {
    let mut p = Pipeline { counters, executed: 0, deferred: vec![] };

    match p.run(pkt, actions.clone(), true) {
        Ok(state) => Verdict { state, executed: p.executed, error: None },
        Err(e) => {
            pkt.log_error(format!("pipeline: {e}"));
            Verdict { state: State::Drop, executed: p.executed, error: Some(e) }
        }
    }
}

/// Run `actions` against `pkt` and return its final state.
pub fn process_pipeline(
    pkt: &mut Packet,
    actions: &ActionList,
    counters: &dyn CounterSink,
) -> State {
    evaluate(pkt, actions, counters).state
}
