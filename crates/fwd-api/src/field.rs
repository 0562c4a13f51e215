// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Packet field identifiers.

use super::header::HeaderGroup;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// A well-known packet field.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum FieldNum {
    // Metadata.
    InputPort,
    OutputPort,
    Vrf,
    PacketLength,
    NexthopId,
    NexthopGroupId,
    TrapId,
    TunnelId,
    PolicerId,
    PacketAction,
    Attribute8,
    Attribute16,
    Attribute24,
    Attribute32,

    // Ethernet.
    EtherMacDst,
    EtherMacSrc,
    EtherType,
    VlanId,
    VlanPriority,

    // IP chain.
    IpVersion,
    IpAddrSrc,
    IpAddrDst,
    IpHop,
    IpProtocol,
    IpQos,
    IpFlowLabel,
    GreProtocol,
    GreKey,
    GreSeq,

    // ARP.
    ArpOp,
    ArpSha,
    ArpSpa,
    ArpTha,
    ArpTpa,

    // MPLS.
    MplsLabel,
    MplsTc,
    MplsTtl,

    // Transport.
    L4PortSrc,
    L4PortDst,
    TcpFlags,
    TcpSeq,
    TcpAck,
    IcmpType,
    IcmpCode,
    NdTarget,
    NdSll,
    NdTll,
}

impl FieldNum {
    pub const COUNT: usize = 47;

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The header group owning this field.
    pub const fn group(self) -> HeaderGroup {
        use FieldNum::*;

        match self {
            InputPort | OutputPort | Vrf | PacketLength | NexthopId
            | NexthopGroupId | TrapId | TunnelId | PolicerId
            | PacketAction | Attribute8 | Attribute16 | Attribute24
            | Attribute32 => HeaderGroup::Packet,

            EtherMacDst | EtherMacSrc | EtherType | VlanId | VlanPriority => {
                HeaderGroup::L2
            }

            IpVersion | IpAddrSrc | IpAddrDst | IpHop | IpProtocol | IpQos
            | IpFlowLabel | GreProtocol | GreKey | GreSeq | ArpOp | ArpSha
            | ArpSpa | ArpTha | ArpTpa | MplsLabel | MplsTc | MplsTtl => {
                HeaderGroup::L3
            }

            L4PortSrc | L4PortDst | TcpFlags | TcpSeq | TcpAck | IcmpType
            | IcmpCode | NdTarget | NdSll | NdTll => HeaderGroup::L4,
        }
    }
}

impl Display for FieldNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Selects between repeated occurrences of a field.
///
/// Instance 0 is the outermost occurrence. [`Instance::LAST`] selects
/// the innermost, whatever the count.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Instance(u8);

impl Instance {
    pub const FIRST: Self = Self(0);
    pub const LAST: Self = Self(u8::MAX);

    pub const fn new(n: u8) -> Self {
        Self(n)
    }

    pub const fn is_last(self) -> bool {
        self.0 == u8::MAX
    }

    /// Resolve against `count` occurrences, returning the index of the
    /// selected one.
    pub fn resolve(self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }

        if self.is_last() {
            return Some(count - 1);
        }

        let idx = usize::from(self.0);
        (idx < count).then_some(idx)
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_last() { write!(f, "last") } else { write!(f, "{}", self.0) }
    }
}

/// Identifies a packet field.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum FieldId {
    /// A well-known field.
    Field { num: FieldNum, instance: Instance },

    /// A user-defined field: `size` raw bytes at `offset` from the
    /// start of the header in `group`. Offsets past the end of that
    /// header continue into the next non-empty group.
    Udf { group: HeaderGroup, offset: u16, size: u16, instance: Instance },
}

impl FieldId {
    /// The first instance of a well-known field.
    pub const fn new(num: FieldNum) -> Self {
        Self::Field { num, instance: Instance::FIRST }
    }

    pub const fn nth(num: FieldNum, n: u8) -> Self {
        Self::Field { num, instance: Instance::new(n) }
    }

    pub const fn last(num: FieldNum) -> Self {
        Self::Field { num, instance: Instance::LAST }
    }

    pub const fn udf(group: HeaderGroup, offset: u16, size: u16) -> Self {
        Self::Udf { group, offset, size, instance: Instance::FIRST }
    }

    /// The group resolution starts from.
    pub const fn group(&self) -> HeaderGroup {
        match self {
            Self::Field { num, .. } => num.group(),
            Self::Udf { group, .. } => *group,
        }
    }

    pub const fn instance(&self) -> Instance {
        match self {
            Self::Field { instance, .. } | Self::Udf { instance, .. } => {
                *instance
            }
        }
    }
}

impl From<FieldNum> for FieldId {
    fn from(num: FieldNum) -> Self {
        Self::new(num)
    }
}

impl Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Field { num, instance } => write!(f, "{num}[{instance}]"),
            Self::Udf { group, offset, size, instance } => {
                write!(f, "UDF({group}+{offset}:{size})[{instance}]")
            }
        }
    }
}

/// An operation a protocol handler applies to one of its fields.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum FieldOp {
    /// Overwrite the field, padding or truncating the argument to the
    /// field's width.
    Set,
    /// Add the argument, wrapping at the field's width.
    Inc,
    /// Subtract the argument, wrapping at the field's width.
    Dec,
}

impl Display for FieldOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Set => "SET",
            Self::Inc => "INC",
            Self::Dec => "DEC",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn instance_resolve() {
        assert_eq!(Instance::FIRST.resolve(0), None);
        assert_eq!(Instance::FIRST.resolve(2), Some(0));
        assert_eq!(Instance::new(1).resolve(2), Some(1));
        assert_eq!(Instance::new(2).resolve(2), None);
        assert_eq!(Instance::LAST.resolve(3), Some(2));
    }

    #[test]
    fn field_groups() {
        assert_eq!(FieldNum::Attribute24.group(), HeaderGroup::Packet);
        assert_eq!(FieldNum::VlanPriority.group(), HeaderGroup::L2);
        assert_eq!(FieldNum::MplsTtl.group(), HeaderGroup::L3);
        assert_eq!(FieldNum::NdTll.group(), HeaderGroup::L4);
        assert_eq!(FieldNum::NdTll.index() + 1, FieldNum::COUNT);
    }

    #[test]
    fn field_id_json() {
        let id = FieldId::last(FieldNum::IpAddrDst);
        let json = serde_json::to_string(&id).unwrap();
        let back: FieldId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        assert_eq!(format!("{id}"), "IpAddrDst[last]");
    }
}
