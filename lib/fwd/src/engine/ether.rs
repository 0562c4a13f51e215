// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Ethernet frames with zero, one or two VLAN tags.

use super::frame::BitField;
use super::frame::Frame;
use super::headers::FieldError;
use super::headers::Handler;
use super::headers::HeaderEnv;
use super::headers::HeaderError;
use super::headers::HeaderHandler;
use super::headers::ParseError;
use super::headers::apply_bits;
use super::headers::apply_op;
use super::headers::get_bits;
use super::headers::single;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use crate::api::MacAddr;
use heapless::Vec as TagVec;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_ARP: u16 = 0x0806;
pub const ETHER_TYPE_VLAN: u16 = 0x8100;
pub const ETHER_TYPE_IPV6: u16 = 0x86DD;
pub const ETHER_TYPE_MPLS: u16 = 0x8847;
pub const ETHER_TYPE_QINQ: u16 = 0x88A8;
pub const ETHER_TYPE_QINQ_OLD: u16 = 0x9100;

pub const ETHER_ADDR_LEN: usize = 6;
pub const ETHER_HDR_SZ: usize = 14;
pub const VLAN_TAG_SZ: usize = 4;
pub const MAX_VLAN_TAGS: usize = 2;

const VLAN_ID: BitField = BitField::new(0, 12);
const VLAN_PRIO: BitField = BitField::new(12, 4);

#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable,
    Unaligned,
)]
pub struct EtherAddrsRaw {
    pub dst: [u8; 6],
    pub src: [u8; 6],
}

/// An 802.1Q tag: the tag protocol identifier followed by the tag
/// control information word.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    KnownLayout,
    Immutable,
    Unaligned,
)]
pub struct VlanTagRaw {
    pub tpid: [u8; 2],
    pub tci: [u8; 2],
}

impl VlanTagRaw {
    fn new(tpid: u16) -> Self {
        Self { tpid: tpid.to_be_bytes(), tci: [0; 2] }
    }
}

fn is_tpid(ether_type: u16) -> bool {
    matches!(ether_type, ETHER_TYPE_VLAN | ETHER_TYPE_QINQ | ETHER_TYPE_QINQ_OLD)
}

#[derive(Clone, Debug, Default)]
pub struct Ether {
    addrs: EtherAddrsRaw,
    tags: TagVec<VlanTagRaw, MAX_VLAN_TAGS>,
    ether_type: [u8; 2],
}

impl Ether {
    pub fn dst(&self) -> MacAddr {
        MacAddr::from(self.addrs.dst)
    }

    pub fn src(&self) -> MacAddr {
        MacAddr::from(self.addrs.src)
    }

    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(self.ether_type)
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// The offset of the ethertype from the start of the frame.
    pub fn ether_type_offset(&self) -> usize {
        2 * ETHER_ADDR_LEN + VLAN_TAG_SZ * self.tags.len()
    }

    fn with_tags(tpids: &[u16]) -> Self {
        let mut eth = Self::default();
        for tpid in tpids {
            // At most MAX_VLAN_TAGS tpids are ever passed.
            let _ = eth.tags.push(VlanTagRaw::new(*tpid));
        }
        eth
    }

    fn from_frame(frame: &mut Frame<'_>) -> Result<Self, ParseError> {
        let bytes = frame.read_header(2 * ETHER_ADDR_LEN)?;
        let (addrs, _) = EtherAddrsRaw::read_from_prefix(bytes).map_err(|_| {
            ParseError::BadHeader { kind: HeaderKind::Eth, msg: "short" }
        })?;

        let mut tags = TagVec::new();
        loop {
            let peek = frame.peek(0, 2)?;
            let et = u16::from_be_bytes([peek[0], peek[1]]);
            if !is_tpid(et) || tags.is_full() {
                break;
            }

            let bytes = frame.read_header(VLAN_TAG_SZ)?;
            let (tag, _) = VlanTagRaw::read_from_prefix(bytes).map_err(|_| {
                ParseError::BadHeader { kind: HeaderKind::EthVlan, msg: "short" }
            })?;
            let _ = tags.push(tag);
        }

        let et = frame.read_header(2)?;
        Ok(Self { addrs, tags, ether_type: [et[0], et[1]] })
    }

    fn next_kind(&self) -> HeaderKind {
        match self.ether_type() {
            ETHER_TYPE_IPV4 => HeaderKind::Ip4,
            ETHER_TYPE_IPV6 => HeaderKind::Ip6,
            ETHER_TYPE_ARP => HeaderKind::Arp,
            ETHER_TYPE_MPLS => HeaderKind::Mpls,
            _ => HeaderKind::Opaque,
        }
    }

    fn tag(&self, num: FieldNum, instance: Instance) -> Result<usize, FieldError> {
        instance
            .resolve(self.tags.len())
            .ok_or_else(|| FieldError::no_field(num, instance))
    }
}

pub fn parse(
    frame: &mut Frame<'_>,
    _kind: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let eth = Ether::from_frame(frame)?;
    let next = eth.next_kind();
    Ok((Handler::Ether(eth), next))
}

pub fn add(kind: HeaderKind) -> Result<Handler, HeaderError> {
    let eth = match kind {
        HeaderKind::Eth => Ether::default(),
        HeaderKind::EthVlan => Ether::with_tags(&[ETHER_TYPE_VLAN]),
        HeaderKind::Eth1Q => {
            Ether::with_tags(&[ETHER_TYPE_QINQ, ETHER_TYPE_VLAN])
        }
        _ => return Err(HeaderError::NoSynthesis(kind)),
    };
    Ok(Handler::Ether(eth))
}

impl HeaderHandler for Ether {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        if instance.resolve(1) != Some(0) {
            return None;
        }

        match self.tags.len() {
            0 => Some(HeaderKind::Eth),
            1 => Some(HeaderKind::EthVlan),
            _ => Some(HeaderKind::Eth1Q),
        }
    }

    fn len(&self) -> usize {
        ETHER_HDR_SZ + VLAN_TAG_SZ * self.tags.len()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.addrs.as_bytes());
        for tag in &self.tags {
            out.extend_from_slice(tag.as_bytes());
        }
        out.extend_from_slice(&self.ether_type);
    }

    fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        match num {
            FieldNum::EtherMacDst => {
                single(num, instance)?;
                Ok(self.addrs.dst.to_vec())
            }

            FieldNum::EtherMacSrc => {
                single(num, instance)?;
                Ok(self.addrs.src.to_vec())
            }

            FieldNum::EtherType => {
                single(num, instance)?;
                Ok(self.ether_type.to_vec())
            }

            FieldNum::VlanId => {
                let idx = self.tag(num, instance)?;
                Ok(get_bits(&self.tags[idx].tci, VLAN_ID, 2))
            }

            FieldNum::VlanPriority => {
                let idx = self.tag(num, instance)?;
                Ok(get_bits(&self.tags[idx].tci, VLAN_PRIO, 1))
            }

            _ => Err(FieldError::no_field(num, instance)),
        }
    }

    fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<bool, FieldError> {
        match num {
            FieldNum::EtherMacDst => {
                single(num, instance)?;
                apply_op(&mut self.addrs.dst, op, arg);
            }

            FieldNum::EtherMacSrc => {
                single(num, instance)?;
                apply_op(&mut self.addrs.src, op, arg);
            }

            FieldNum::EtherType => {
                single(num, instance)?;
                apply_op(&mut self.ether_type, op, arg);
            }

            FieldNum::VlanId => {
                let idx = self.tag(num, instance)?;
                apply_bits(&mut self.tags[idx].tci, VLAN_ID, 2, op, arg);
            }

            FieldNum::VlanPriority => {
                let idx = self.tag(num, instance)?;
                apply_bits(&mut self.tags[idx].tci, VLAN_PRIO, 1, op, arg);
            }

            _ => return Err(FieldError::no_field(num, instance)),
        }

        Ok(true)
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        let mut frame = Frame::new(bytes);
        match Ether::from_frame(&mut frame) {
            Ok(eth) if eth.tags.len() == self.tags.len() && frame.is_empty() => {
                *self = eth;
                true
            }
            _ => false,
        }
    }

    fn modify(&mut self, kind: HeaderKind) -> Result<(), HeaderError> {
        if !self.tags.is_empty() {
            return Err(HeaderError::DoubleEncap(kind));
        }

        match kind {
            HeaderKind::EthVlan => {
                self.tags = Self::with_tags(&[ETHER_TYPE_VLAN]).tags;
            }

            HeaderKind::Eth1Q => {
                self.tags =
                    Self::with_tags(&[ETHER_TYPE_QINQ, ETHER_TYPE_VLAN]).tags;
            }

            _ => return Err(HeaderError::DoubleEncap(kind)),
        }

        Ok(())
    }

    fn remove(&mut self, kind: HeaderKind) -> Result<bool, HeaderError> {
        let found = self.kind(Instance::FIRST).unwrap_or(HeaderKind::None);

        match kind {
            HeaderKind::Eth => Ok(true),

            HeaderKind::EthVlan if !self.tags.is_empty() => {
                self.tags.remove(0);
                Ok(false)
            }

            HeaderKind::Eth1Q if self.tags.len() == MAX_VLAN_TAGS => {
                self.tags.clear();
                Ok(false)
            }

            _ => Err(HeaderError::WrongOutermost { want: kind, found }),
        }
    }

    fn rebuild(&mut self, env: &HeaderEnv<'_>, _dirty: bool) {
        let et = match env.inner_kind() {
            Some(HeaderKind::Ip4) => ETHER_TYPE_IPV4,
            Some(HeaderKind::Ip6) => ETHER_TYPE_IPV6,
            Some(HeaderKind::Arp) => ETHER_TYPE_ARP,
            Some(HeaderKind::Mpls) => ETHER_TYPE_MPLS,
            _ => return,
        };
        self.ether_type = et.to_be_bytes();
    }
}
