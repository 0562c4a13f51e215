// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The field registry: the widths each well-known field accepts.

use crate::api::FieldNum;
use crate::api::HeaderGroup;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldInfo {
    /// The widths a field's value is read back at. A field with more
    /// than one width (IP addresses) reports the width of the header
    /// actually present.
    pub sizes: &'static [usize],
    /// The width of a freshly synthesized field.
    pub default: usize,
    pub group: HeaderGroup,
}

impl FieldInfo {
    const fn new(sizes: &'static [usize], num: FieldNum) -> Self {
        Self { sizes, default: sizes[0], group: num.group() }
    }

    pub fn max_size(&self) -> usize {
        self.sizes.iter().copied().max().unwrap_or(self.default)
    }

    /// Can an operand of `len` bytes be applied to this field? Any
    /// non-empty operand up to the widest size is padded or truncated
    /// to fit.
    pub fn accepts(&self, len: usize) -> bool {
        len > 0 && len <= self.max_size()
    }
}

pub const fn info(num: FieldNum) -> FieldInfo {
    use FieldNum::*;

    let sizes: &'static [usize] = match num {
        InputPort | OutputPort | Vrf | NexthopId | NexthopGroupId | TrapId
        | TunnelId | PolicerId => &[8],
        PacketLength => &[4],
        PacketAction => &[1],
        Attribute8 => &[1],
        Attribute16 => &[2],
        Attribute24 => &[3],
        Attribute32 => &[4],

        EtherMacDst | EtherMacSrc => &[6],
        EtherType | VlanId => &[2],
        VlanPriority => &[1],

        IpVersion | IpHop | IpProtocol | IpQos => &[1],
        IpAddrSrc | IpAddrDst => &[4, 16],
        IpFlowLabel => &[4],
        GreProtocol => &[2],
        GreKey | GreSeq => &[4],

        ArpOp => &[2],
        ArpSha | ArpTha => &[6],
        ArpSpa | ArpTpa => &[4],

        MplsLabel => &[4],
        MplsTc | MplsTtl => &[1],

        L4PortSrc | L4PortDst => &[2],
        TcpFlags => &[1],
        TcpSeq | TcpAck => &[4],
        IcmpType | IcmpCode => &[1],
        NdTarget => &[16],
        NdSll | NdTll => &[6],
    };

    FieldInfo::new(sizes, num)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_widths() {
        let ip = info(FieldNum::IpAddrDst);
        assert_eq!(ip.default, 4);
        assert_eq!(ip.group, HeaderGroup::L3);
        assert!(ip.accepts(16));
        assert!(!ip.accepts(17));
        assert!(!ip.accepts(0));
        assert!(info(FieldNum::L4PortSrc).accepts(1));
        assert!(!info(FieldNum::L4PortSrc).accepts(4));
    }
}
