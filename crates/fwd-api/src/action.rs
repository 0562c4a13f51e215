// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Build-time descriptors for actions and tables.

use super::field::FieldId;
use super::header::HeaderKind;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The configuration of a single action. Each variant is built by
/// the action builder registered under [`ActionDesc::kind_name`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ActionDesc {
    Continue,
    Drop,
    Debug,
    Decap {
        header: HeaderKind,
    },
    Encap {
        header: HeaderKind,
    },
    Evaluate,
    Output,
    Transmit {
        port: String,
        #[serde(default)]
        immediate: bool,
    },
    Lookup {
        table: String,
    },
    Mirror {
        #[serde(default)]
        port: Option<String>,
        #[serde(default)]
        actions: Vec<ActionAttrDesc>,
        #[serde(default)]
        fields: Vec<FieldId>,
    },
    Ratelimit {
        /// Sustained rate in bytes per second.
        rate: u64,
        /// Bucket depth in bytes.
        burst: u64,
    },
    Reparse {
        header: HeaderKind,
        #[serde(default)]
        fields: Vec<FieldId>,
        #[serde(default)]
        prepend: Vec<u8>,
    },
    SelectActionList {
        fields: Vec<FieldId>,
        algo: SelectAlgo,
        lists: Vec<Vec<ActionAttrDesc>>,
    },
    SwapOutput,
    Update(UpdateDesc),
    FlowCounter {
        counter: String,
    },
    /// An action provided by a builder registered at context
    /// construction.
    Custom {
        kind: String,
        #[serde(default)]
        args: BTreeMap<String, String>,
    },
}

impl ActionDesc {
    /// The name the builder for this descriptor is registered under.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Continue => "continue",
            Self::Drop => "drop",
            Self::Debug => "debug",
            Self::Decap { .. } => "decap",
            Self::Encap { .. } => "encap",
            Self::Evaluate => "evaluate",
            Self::Output => "output",
            Self::Transmit { .. } => "transmit",
            Self::Lookup { .. } => "lookup",
            Self::Mirror { .. } => "mirror",
            Self::Ratelimit { .. } => "ratelimit",
            Self::Reparse { .. } => "reparse",
            Self::SelectActionList { .. } => "select_action_list",
            Self::SwapOutput => "swap_output",
            Self::Update(_) => "update",
            Self::FlowCounter { .. } => "flow_counter",
            Self::Custom { kind, .. } => kind,
        }
    }

    /// Defer this action until an `EVALUATE`.
    pub fn on_evaluate(self) -> ActionAttrDesc {
        ActionAttrDesc { action: self, on_evaluate: true }
    }
}

impl Display for ActionDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Decap { header } => write!(f, "decap({header})"),
            Self::Encap { header } => write!(f, "encap({header})"),
            Self::Transmit { port, immediate } => {
                write!(f, "transmit({port}, immediate={immediate})")
            }
            Self::Lookup { table } => write!(f, "lookup({table})"),
            Self::Ratelimit { rate, burst } => {
                write!(f, "ratelimit({rate}B/s, burst={burst}B)")
            }
            Self::Update(u) => write!(f, "update({} {})", u.field, u.op),
            Self::FlowCounter { counter } => {
                write!(f, "flow_counter({counter})")
            }
            _ => write!(f, "{}", self.kind_name()),
        }
    }
}

/// An action descriptor plus its scheduling flag.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActionAttrDesc {
    pub action: ActionDesc,
    #[serde(default)]
    pub on_evaluate: bool,
}

impl From<ActionDesc> for ActionAttrDesc {
    fn from(action: ActionDesc) -> Self {
        Self { action, on_evaluate: false }
    }
}

/// How `select_action_list` hashes the selected fields.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub enum SelectAlgo {
    Crc16,
    #[default]
    Crc32,
    Random,
}

/// The operation applied by an update action.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum UpdateOp {
    Set,
    Inc,
    Dec,
    Copy,
    BitWrite,
    BitAnd,
    BitOr,
}

impl Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Set => "SET",
            Self::Inc => "INC",
            Self::Dec => "DEC",
            Self::Copy => "COPY",
            Self::BitWrite => "BIT_WRITE",
            Self::BitAnd => "BIT_AND",
            Self::BitOr => "BIT_OR",
        };
        write!(f, "{s}")
    }
}

/// The configuration of an update action.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateDesc {
    pub field: FieldId,
    pub op: UpdateOp,
    /// Big-endian operand of every op but `Copy`.
    #[serde(default)]
    pub value: Vec<u8>,
    /// The field `Copy` reads from.
    #[serde(default)]
    pub src: Option<FieldId>,
    /// First bit written by `BitWrite`, counted from the least
    /// significant bit of the field.
    #[serde(default)]
    pub bit_offset: u16,
    #[serde(default)]
    pub bit_count: u16,
}

impl UpdateDesc {
    fn with_value(field: FieldId, op: UpdateOp, value: &[u8]) -> Self {
        Self {
            field,
            op,
            value: value.to_vec(),
            src: None,
            bit_offset: 0,
            bit_count: 0,
        }
    }

    pub fn set(field: impl Into<FieldId>, value: &[u8]) -> Self {
        Self::with_value(field.into(), UpdateOp::Set, value)
    }

    pub fn inc(field: impl Into<FieldId>, value: &[u8]) -> Self {
        Self::with_value(field.into(), UpdateOp::Inc, value)
    }

    pub fn dec(field: impl Into<FieldId>, value: &[u8]) -> Self {
        Self::with_value(field.into(), UpdateOp::Dec, value)
    }

    pub fn bit_and(field: impl Into<FieldId>, value: &[u8]) -> Self {
        Self::with_value(field.into(), UpdateOp::BitAnd, value)
    }

    pub fn bit_or(field: impl Into<FieldId>, value: &[u8]) -> Self {
        Self::with_value(field.into(), UpdateOp::BitOr, value)
    }

    pub fn copy(field: impl Into<FieldId>, src: impl Into<FieldId>) -> Self {
        Self {
            field: field.into(),
            op: UpdateOp::Copy,
            value: Vec::new(),
            src: Some(src.into()),
            bit_offset: 0,
            bit_count: 0,
        }
    }

    pub fn bit_write(
        field: impl Into<FieldId>,
        bit_offset: u16,
        bit_count: u16,
        value: &[u8],
    ) -> Self {
        Self {
            bit_offset,
            bit_count,
            ..Self::with_value(field.into(), UpdateOp::BitWrite, value)
        }
    }
}

impl From<UpdateDesc> for ActionDesc {
    fn from(desc: UpdateDesc) -> Self {
        Self::Update(desc)
    }
}

/// Where an entry's actions are spliced into an action table.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub enum Position {
    Head,
    #[default]
    Tail,
}

/// The configuration of a table, one variant per table kind.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TableDesc {
    Action {
        /// Returned by lookups while the table holds no entries.
        #[serde(default)]
        default_actions: Vec<ActionAttrDesc>,
    },
}

/// The configuration of a table entry, one variant per table kind.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum EntryDesc {
    Action {
        actions: Vec<ActionAttrDesc>,
        #[serde(default)]
        position: Position,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::field::FieldNum;

    #[test]
    fn kind_names() {
        assert_eq!(ActionDesc::Drop.kind_name(), "drop");
        assert_eq!(ActionDesc::SwapOutput.kind_name(), "swap_output");
        let custom = ActionDesc::Custom {
            kind: "punt".into(),
            args: BTreeMap::new(),
        };
        assert_eq!(custom.kind_name(), "punt");
    }

    #[test]
    fn entry_from_ron() {
        let text = r#"Action(
            actions: [
                (action: Update((
                    field: Field(num: IpHop, instance: Instance(0)),
                    op: Dec,
                    value: [1],
                ))),
                (action: Transmit(port: "vif0"), on_evaluate: true),
            ],
        )"#;

        let desc: EntryDesc = ron::from_str(text).unwrap();
        let EntryDesc::Action { actions, position } = desc;
        assert_eq!(position, Position::Tail);
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0].action,
            ActionDesc::Update(UpdateDesc::dec(FieldNum::IpHop, &[1]))
        );
        assert!(actions[1].on_evaluate);
        assert_eq!(
            actions[1].action,
            ActionDesc::Transmit { port: "vif0".into(), immediate: false }
        );
    }

    #[test]
    fn mirror_json() {
        let desc = ActionDesc::Mirror {
            port: Some("mirror0".into()),
            actions: vec![ActionDesc::Output.into()],
            fields: vec![FieldId::new(FieldNum::Vrf)],
        };
        let json = serde_json::to_string(&desc).unwrap();
        let back: ActionDesc = serde_json::from_str(&json).unwrap();
        assert_eq!(desc, back);
    }
}
