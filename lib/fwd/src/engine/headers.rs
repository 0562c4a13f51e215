// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Protocol handlers and the per-packet header table.
//!
//! A packet holds at most one [`Descriptor`] per [`HeaderGroup`]. Each
//! descriptor owns a [`Handler`], which owns a copy of its header
//! bytes, and a dirty bit saying whether the handler's derived fields
//! (lengths, checksums) may be stale.
//!
//! Handlers that need to see other groups (TCP summing the IP
//! pseudo-header, Ethernet picking its ethertype) do so through a
//! [`HeaderEnv`]: the descriptor being operated on is taken out of its
//! slot for the duration of the call, leaving read-only access to the
//! rest of the table.

use super::arp::Arp;
use super::ether::Ether;
use super::frame::BitField;
use super::frame::FieldView;
use super::frame::FieldViewMut;
use super::frame::ReadErr;
use super::frame::set_bytes;
use super::frame::wrapping_add_be;
use super::frame::wrapping_sub_be;
use super::icmp::v4::Icmp4;
use super::icmp::v6::Icmp6;
use super::ip::IpAddrs;
use super::ip::IpChain;
use super::metadata::Metadata;
use super::mpls::Mpls;
use super::opaque::Opaque;
use super::tcp::Tcp;
use super::udp::Udp;
use crate::api::FieldId;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderGroup;
use crate::api::HeaderKind;
use crate::api::Instance;
use thiserror::Error;

/// A frame could not be parsed into a packet.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParseError {
    #[error("frame too short: {0}")]
    Read(#[from] ReadErr),

    #[error("no parser for header kind {0}")]
    UnknownHeader(HeaderKind),

    #[error("bad {kind} header: {msg}")]
    BadHeader { kind: HeaderKind, msg: &'static str },

    #[error("malformed {kind} option: {msg}")]
    MalformedOption { kind: HeaderKind, msg: &'static str },

    #[error("{kind} cannot follow a header in group {after}")]
    OutOfOrder { kind: HeaderKind, after: HeaderGroup },
}

/// A field could not be read or updated.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum FieldError {
    #[error("no such field: {0}")]
    NoSuchField(FieldId),

    #[error("unsupported operation {op} on {field}")]
    BadOp { field: FieldId, op: FieldOp },

    #[error("bad size {size} for {field}")]
    BadSize { field: FieldId, size: usize },
}

impl FieldError {
    pub(crate) fn no_field(num: FieldNum, instance: Instance) -> Self {
        Self::NoSuchField(FieldId::Field { num, instance })
    }

    pub(crate) fn bad_op(num: FieldNum, instance: Instance, op: FieldOp) -> Self {
        Self::BadOp { field: FieldId::Field { num, instance }, op }
    }
}

/// An encap, decap or modify request could not be carried out.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum HeaderError {
    #[error("{0} cannot be synthesized")]
    NoSynthesis(HeaderKind),

    #[error("{0} cannot be placed in the packet's group order")]
    GroupOrder(HeaderKind),

    #[error("{0} is already present")]
    DoubleEncap(HeaderKind),

    #[error("{0} is not present")]
    NotPresent(HeaderKind),

    #[error("cannot remove {want}: outermost header is {found}")]
    WrongOutermost { want: HeaderKind, found: HeaderKind },

    #[error("{kind}: {msg}")]
    Precondition { kind: HeaderKind, msg: &'static str },
}

/// The behavior every protocol handler provides.
///
/// Instances count from the outermost occurrence of a header or field
/// within the handler; [`Instance::LAST`] is the innermost.
pub trait HeaderHandler {
    /// The kind of the header at `instance`.
    fn kind(&self, instance: Instance) -> Option<HeaderKind>;

    /// The number of header bytes on the wire.
    fn len(&self) -> usize;

    /// Append the header bytes to `out`.
    fn emit(&self, out: &mut Vec<u8>);

    /// Bytes emitted after all inner content.
    fn trailer(&self) -> &[u8] {
        &[]
    }

    fn get(&self, num: FieldNum, instance: Instance)
    -> Result<Vec<u8>, FieldError>;

    /// Apply `op` to a field, returning whether derived fields may now
    /// be stale.
    fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<bool, FieldError>;

    /// Replace the header with `bytes`, which are the header's own
    /// emitted bytes with some range overwritten. Returns false if the
    /// result no longer describes a header of the same shape.
    fn reload(&mut self, bytes: &[u8]) -> bool;

    /// Add a header of `kind` to a handler that already exists.
    fn modify(&mut self, kind: HeaderKind) -> Result<(), HeaderError> {
        Err(HeaderError::DoubleEncap(kind))
    }

    /// Remove the outermost header of `kind`, returning whether the
    /// handler is now empty.
    fn remove(&mut self, kind: HeaderKind) -> Result<bool, HeaderError> {
        match self.kind(Instance::FIRST) {
            Some(k) if k == kind => Ok(true),
            found => Err(HeaderError::WrongOutermost {
                want: kind,
                found: found.unwrap_or(HeaderKind::None),
            }),
        }
    }

    /// Called once the whole packet is parsed.
    fn attach(&mut self, _env: &HeaderEnv<'_>) {}

    /// Recompute derived fields.
    fn rebuild(&mut self, _env: &HeaderEnv<'_>, _dirty: bool) {}
}

/// A protocol handler. The set of protocols is closed.
#[derive(Clone, Debug)]
pub enum Handler {
    Metadata(Metadata),
    Ether(Ether),
    Ip(IpChain),
    Arp(Arp),
    Mpls(Mpls),
    Tcp(Tcp),
    Udp(Udp),
    Icmp4(Icmp4),
    Icmp6(Icmp6),
    Opaque(Opaque),
}

macro_rules! dispatch {
    ($self:expr, $h:ident => $e:expr) => {
        match $self {
            Handler::Metadata($h) => $e,
            Handler::Ether($h) => $e,
            Handler::Ip($h) => $e,
            Handler::Arp($h) => $e,
            Handler::Mpls($h) => $e,
            Handler::Tcp($h) => $e,
            Handler::Udp($h) => $e,
            Handler::Icmp4($h) => $e,
            Handler::Icmp6($h) => $e,
            Handler::Opaque($h) => $e,
        }
    };
}

impl Handler {
    pub fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        dispatch!(self, h => h.kind(instance))
    }

    pub fn len(&self) -> usize {
        dispatch!(self, h => h.len())
    }

    pub fn emit(&self, out: &mut Vec<u8>) {
        dispatch!(self, h => h.emit(out))
    }

    pub fn trailer(&self) -> &[u8] {
        dispatch!(self, h => h.trailer())
    }

    pub fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        dispatch!(self, h => h.get(num, instance))
    }

    pub fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<bool, FieldError> {
        dispatch!(self, h => h.update(num, instance, op, arg))
    }

    /// Read `size` raw header bytes at `offset`.
    pub fn read_udf(&self, offset: usize, size: usize) -> Option<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.len());
        self.emit(&mut bytes);
        bytes.get(offset..offset.checked_add(size)?).map(|b| b.to_vec())
    }

    /// Overwrite raw header bytes at `offset`.
    pub fn write_udf(&mut self, offset: usize, val: &[u8]) -> bool {
        let mut bytes = Vec::with_capacity(self.len());
        self.emit(&mut bytes);
        let Some(end) = offset.checked_add(val.len()) else {
            return false;
        };
        match bytes.get_mut(offset..end) {
            Some(dst) => dst.copy_from_slice(val),
            None => return false,
        }
        dispatch!(self, h => h.reload(&bytes))
    }

    pub fn modify(&mut self, kind: HeaderKind) -> Result<(), HeaderError> {
        dispatch!(self, h => h.modify(kind))
    }

    pub fn remove(&mut self, kind: HeaderKind) -> Result<bool, HeaderError> {
        dispatch!(self, h => h.remove(kind))
    }

    pub fn attach(&mut self, env: &HeaderEnv<'_>) {
        dispatch!(self, h => h.attach(env))
    }

    pub fn rebuild(&mut self, env: &HeaderEnv<'_>, dirty: bool) {
        dispatch!(self, h => h.rebuild(env, dirty))
    }
}

/// The per-packet, per-group record of a handler.
#[derive(Clone, Debug)]
pub struct Descriptor {
    pub group: HeaderGroup,
    pub handler: Handler,
    pub dirty: bool,
}

impl Descriptor {
    pub fn new(group: HeaderGroup, handler: Handler) -> Self {
        Self { group, handler, dirty: false }
    }

    /// Header plus trailer length.
    pub fn wire_len(&self) -> usize {
        self.handler.len() + self.handler.trailer().len()
    }
}

type Slots = [Option<Descriptor>; HeaderGroup::COUNT];

/// The descriptors of one packet, indexed by group.
///
/// Indexing by group keeps the table in on-wire order by
/// construction. The "linked list" view of the descriptors is the
/// sequence of occupied slots.
#[derive(Clone, Debug, Default)]
pub struct Headers {
    slots: Slots,
}

impl Headers {
    pub fn get(&self, group: HeaderGroup) -> Option<&Descriptor> {
        self.slots[group.index()].as_ref()
    }

    pub fn get_mut(&mut self, group: HeaderGroup) -> Option<&mut Descriptor> {
        self.slots[group.index()].as_mut()
    }

    pub fn is_present(&self, group: HeaderGroup) -> bool {
        self.slots[group.index()].is_some()
    }

    pub fn insert(&mut self, desc: Descriptor) {
        let idx = desc.group.index();
        self.slots[idx] = Some(desc);
    }

    pub fn unlink(&mut self, group: HeaderGroup) -> Option<Descriptor> {
        self.slots[group.index()].take()
    }

    /// Occupied descriptors in on-wire order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Descriptor> {
        self.slots.iter().flatten()
    }

    /// The nearest occupied group outside `group`.
    pub fn prev(&self, group: HeaderGroup) -> Option<HeaderGroup> {
        HeaderGroup::ALL[..group.index()]
            .iter()
            .rev()
            .copied()
            .find(|g| self.is_present(*g))
    }

    /// The nearest occupied group inside `group`.
    pub fn next(&self, group: HeaderGroup) -> Option<HeaderGroup> {
        HeaderGroup::ALL[group.index() + 1..]
            .iter()
            .copied()
            .find(|g| self.is_present(*g))
    }

    /// The innermost occupied group.
    pub fn last(&self) -> Option<HeaderGroup> {
        self.iter().next_back().map(|d| d.group)
    }

    /// Run `f` against the descriptor in `group` with read access to
    /// every other group.
    pub fn with_env<R>(
        &mut self,
        group: HeaderGroup,
        f: impl FnOnce(&mut Descriptor, &HeaderEnv<'_>) -> R,
    ) -> Option<R> {
        let mut desc = self.slots[group.index()].take()?;
        let res = f(&mut desc, &HeaderEnv { slots: &self.slots, group });
        self.slots[group.index()] = Some(desc);
        Some(res)
    }

    /// Give every handler its first look at the parsed packet.
    pub fn attach_all(&mut self) {
        for group in HeaderGroup::ALL {
            self.with_env(group, |d, env| d.handler.attach(env));
        }
    }

    fn rebuild_groups(&mut self, groups: &[HeaderGroup]) {
        // Every rebuild must see the dirty bits as they stood before
        // any of them ran.
        for group in groups {
            self.with_env(*group, |d, env| d.handler.rebuild(env, d.dirty));
        }
        for group in groups {
            if let Some(d) = self.get_mut(*group) {
                d.dirty = false;
            }
        }
    }

    /// Rebuild every header, innermost first, and mark all clean.
    pub fn rebuild_all(&mut self) {
        let mut groups = HeaderGroup::ALL;
        groups.reverse();
        self.rebuild_groups(&groups);
    }

    /// Rebuild `from` and every group outside it.
    pub fn rebuild_outward(&mut self, from: HeaderGroup) {
        let groups: Vec<HeaderGroup> =
            HeaderGroup::ALL[..=from.index()].iter().rev().copied().collect();
        self.rebuild_groups(&groups);
    }

    /// Total header and trailer bytes.
    pub fn wire_len(&self) -> usize {
        self.iter().map(Descriptor::wire_len).sum()
    }

    /// Headers outermost first, then trailers innermost first.
    pub fn emit(&self, out: &mut Vec<u8>) {
        for d in self.iter() {
            d.handler.emit(out);
        }
        for d in self.iter().rev() {
            out.extend_from_slice(d.handler.trailer());
        }
    }
}

/// What a handler sees of the rest of its packet.
pub struct HeaderEnv<'a> {
    slots: &'a Slots,
    group: HeaderGroup,
}

impl HeaderEnv<'_> {
    fn inner(&self) -> impl DoubleEndedIterator<Item = &Descriptor> {
        self.slots[self.group.index() + 1..].iter().flatten()
    }

    fn outer(&self) -> Option<&Descriptor> {
        self.slots[..self.group.index()].iter().flatten().next_back()
    }

    /// The kind of the first header inside this group.
    pub fn inner_kind(&self) -> Option<HeaderKind> {
        self.inner().next().and_then(|d| d.handler.kind(Instance::FIRST))
    }

    /// The wire length of everything inside this group.
    pub fn inner_len(&self) -> usize {
        self.inner().map(Descriptor::wire_len).sum()
    }

    /// Append the wire bytes of everything inside this group.
    pub fn emit_inner(&self, out: &mut Vec<u8>) {
        for d in self.inner() {
            d.handler.emit(out);
        }
        for d in self.inner().rev() {
            out.extend_from_slice(d.handler.trailer());
        }
    }

    /// Is the nearest enclosing header dirty?
    pub fn outer_dirty(&self) -> bool {
        self.outer().is_some_and(|d| d.dirty)
    }

    /// Is anything inside this group dirty?
    pub fn inner_dirty(&self) -> bool {
        self.inner().any(|d| d.dirty)
    }

    /// The addresses of the innermost IP header, as summed into an
    /// upper-layer pseudo-header.
    pub fn ip_addrs(&self) -> Option<IpAddrs> {
        match &self.slots[HeaderGroup::L3.index()] {
            Some(Descriptor { handler: Handler::Ip(chain), .. }) => {
                chain.innermost_addrs()
            }
            _ => None,
        }
    }
}

/// Apply `op` to a field held as raw bytes.
pub(crate) fn apply_op(field: &mut [u8], op: FieldOp, arg: &[u8]) {
    match op {
        FieldOp::Set => set_bytes(field, arg),
        FieldOp::Inc => wrapping_add_be(field, arg),
        FieldOp::Dec => wrapping_sub_be(field, arg),
    }
}

/// Read a bit-field of a numeric word as a `width`-byte value.
pub(crate) fn get_bits(word: &[u8], bits: BitField, width: usize) -> Vec<u8> {
    let val = FieldView::new(word).bits(bits);
    val.to_be_bytes()[8 - width..].to_vec()
}

/// Apply `op` to a bit-field of a numeric word, the field's value
/// presented as `width` bytes.
pub(crate) fn apply_bits(
    word: &mut [u8],
    bits: BitField,
    width: usize,
    op: FieldOp,
    arg: &[u8],
) {
    let mut cur = get_bits(word, bits, width);
    apply_op(&mut cur, op, arg);
    let val = FieldView::new(&cur).get();
    FieldViewMut::new(word).set_bits(bits, val);
}

/// Resolve a field that occurs exactly once in a header.
pub(crate) fn single(
    num: FieldNum,
    instance: Instance,
) -> Result<(), FieldError> {
    match instance.resolve(1) {
        Some(0) => Ok(()),
        _ => Err(FieldError::no_field(num, instance)),
    }
}
