// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types shared between the forwarding engine and the things that
//! drive it: control planes building descriptors, port drivers
//! feeding frames, and tooling printing state.

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod action;
pub mod counter;
pub mod field;
pub mod header;
pub mod mac;
pub mod object;
pub mod port;

pub use action::*;
pub use counter::*;
pub use field::*;
pub use header::*;
pub use mac::*;
pub use object::*;
pub use port::*;

/// The overall version of the API. Anytime a descriptor is added,
/// removed, or modified, this number should increment.
pub const API_VERSION: u64 = 1;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Direction {
    In = 1,
    Out = 2,
}

impl core::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            _ => Err(format!("invalid direction: {}", s)),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dirstr = match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        };

        write!(f, "{}", dirstr)
    }
}

/// The disposition produced by an action, and by a pipeline as a
/// whole.
///
/// `Evaluate` only ever flows between an action and the pipeline
/// running it. A finished pipeline reports one of the other four.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum State {
    /// No terminating decision was made.
    #[default]
    Continue,
    /// The packet is to be disposed of.
    Drop,
    /// The action framework is done with the packet.
    Consume,
    /// Dispatch the packet to its current output port.
    Output,
    /// Run the deferred on-evaluate actions.
    Evaluate,
}

impl State {
    /// Does this state end a pipeline?
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Drop | Self::Consume | Self::Output)
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Continue => "CONTINUE",
            Self::Drop => "DROP",
            Self::Consume => "CONSUME",
            Self::Output => "OUTPUT",
            Self::Evaluate => "EVALUATE",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn direction_from_str() {
        assert_eq!("IN".parse::<Direction>(), Ok(Direction::In));
        assert_eq!("out".parse::<Direction>(), Ok(Direction::Out));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(State::Drop.is_terminal());
        assert!(State::Output.is_terminal());
        assert!(State::Consume.is_terminal());
        assert!(!State::Continue.is_terminal());
        assert!(!State::Evaluate.is_terminal());
    }
}
