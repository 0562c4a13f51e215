// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The packet: a parsed frame plus the per-packet state the pipeline
//! carries alongside it.
//!
//! A [`Packet`] owns its headers outright. Parsing copies each
//! header's bytes into its handler, so every mutation is a plain
//! `&mut` call routed through the packet to the handler owning the
//! field; nothing aliases the original frame.

use super::field;
use super::frame::Frame;
use super::frame::resize_be;
use super::headers::Descriptor;
use super::headers::FieldError;
use super::headers::Handler;
use super::headers::HeaderError;
use super::headers::Headers;
use super::headers::ParseError;
use super::headers::apply_op;
use super::metadata;
use super::metadata::Metadata;
use super::protocol;
use crate::api::FieldId;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderGroup;
use crate::api::HeaderKind;
use crate::api::Instance;
use crate::api::Nid;
use crate::provider::LogLevel;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;
use thiserror::Error;

/// An error from an operation combining several packet steps.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PacketError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// One line of a packet's log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub msg: String,
}

#[derive(Clone, Debug)]
pub struct Packet {
    start: HeaderKind,
    headers: Headers,
    attrs: BTreeMap<String, String>,
    debug: bool,
    log: Vec<LogEntry>,
    desc: String,
}

impl Packet {
    /// Parse `bytes` as a frame starting with a `start` header.
    ///
    /// The metadata handler always takes the PACKET group; parsing
    /// then proceeds from `start` until a handler reports
    /// [`HeaderKind::None`].
    pub fn parse(start: HeaderKind, bytes: &[u8]) -> Result<Self, ParseError> {
        let mut frame = Frame::new(bytes);
        let mut headers = Headers::default();

        let (md, mut next) = metadata::parse(&mut frame, start)?;
        headers.insert(Descriptor::new(HeaderGroup::Packet, md));
        let mut last = HeaderGroup::Packet;

        while next != HeaderKind::None {
            let proto = protocol::lookup(next)
                .ok_or(ParseError::UnknownHeader(next))?;
            let parse = proto.parse.ok_or(ParseError::UnknownHeader(next))?;

            if proto.group <= last {
                return Err(ParseError::OutOfOrder { kind: next, after: last });
            }

            let (handler, following) = parse(&mut frame, next)?;
            headers.insert(Descriptor::new(proto.group, handler));
            last = proto.group;
            next = following;
        }

        headers.attach_all();
        let desc = describe(&headers);

        Ok(Self {
            start,
            headers,
            attrs: BTreeMap::new(),
            debug: false,
            log: vec![],
            desc,
        })
    }

    pub fn start(&self) -> HeaderKind {
        self.start
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The handler in `group`, if any.
    pub fn handler(&self, group: HeaderGroup) -> Option<&Handler> {
        self.headers.get(group).map(|d| &d.handler)
    }

    /// The header kinds present, outermost first. Handlers holding a
    /// stack report each header.
    pub fn kinds(&self) -> Vec<HeaderKind> {
        self.headers.iter().flat_map(|d| stacked_kinds(&d.handler)).collect()
    }

    fn metadata(&self) -> Option<&Metadata> {
        match self.handler(HeaderGroup::Packet) {
            Some(Handler::Metadata(md)) => Some(md),
            _ => None,
        }
    }

    fn metadata_mut(&mut self) -> Option<&mut Metadata> {
        match self.headers.get_mut(HeaderGroup::Packet) {
            Some(Descriptor { handler: Handler::Metadata(md), .. }) => Some(md),
            _ => None,
        }
    }

    pub fn input_port(&self) -> Nid {
        self.metadata().map(Metadata::input_port).unwrap_or(Nid::INVALID)
    }

    pub fn set_input_port(&mut self, nid: Nid) {
        if let Some(md) = self.metadata_mut() {
            md.set_input_port(nid);
        }
    }

    pub fn output_port(&self) -> Nid {
        self.metadata().map(Metadata::output_port).unwrap_or(Nid::INVALID)
    }

    pub fn set_output_port(&mut self, nid: Nid) {
        if let Some(md) = self.metadata_mut() {
            md.set_output_port(nid);
        }
    }

    /// The number of bytes [`Packet::serialize`] produces.
    pub fn len(&self) -> usize {
        self.headers.wire_len()
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.attrs.insert(key.into(), val.into());
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Record a debug message. Dropped unless the debug flag is set.
    pub fn log_debug(&mut self, msg: impl Into<String>) {
        if self.debug {
            self.log.push(LogEntry { level: LogLevel::Note, msg: msg.into() });
        }
    }

    pub fn log_error(&mut self, msg: impl Into<String>) {
        self.log.push(LogEntry { level: LogLevel::Error, msg: msg.into() });
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn description(&self) -> &str {
        &self.desc
    }

    pub fn set_description(&mut self, desc: impl Into<String>) {
        self.desc = desc.into();
    }

    /// Find the header a UDF lands in, and the offset within it.
    ///
    /// The offset is measured from the start of `group`; an offset
    /// past the end of one header continues into the next non-empty
    /// group.
    fn locate_udf(
        &self,
        id: FieldId,
        group: HeaderGroup,
        offset: usize,
    ) -> Result<(HeaderGroup, usize), FieldError> {
        let mut off = offset;
        for g in &HeaderGroup::ALL[group.index()..] {
            let Some(d) = self.headers.get(*g) else {
                continue;
            };
            let len = d.handler.len();
            if off < len {
                return Ok((*g, off));
            }
            off -= len;
        }
        Err(FieldError::NoSuchField(id))
    }

    fn udf(
        &self,
        id: FieldId,
    ) -> Result<(HeaderGroup, usize, usize), FieldError> {
        let FieldId::Udf { group, offset, size, instance } = id else {
            return Err(FieldError::NoSuchField(id));
        };

        if instance.resolve(1) != Some(0) {
            return Err(FieldError::NoSuchField(id));
        }

        let size = usize::from(size);
        if size == 0 {
            return Err(FieldError::BadSize { field: id, size });
        }

        let (g, off) = self.locate_udf(id, group, usize::from(offset))?;
        Ok((g, off, size))
    }

    /// Read the value of a field.
    pub fn field_get(&self, id: FieldId) -> Result<Vec<u8>, FieldError> {
        match id {
            FieldId::Field { num, instance } => {
                let d = self
                    .headers
                    .get(num.group())
                    .ok_or(FieldError::NoSuchField(id))?;
                d.handler.get(num, instance)
            }

            FieldId::Udf { .. } => {
                let (g, off, size) = self.udf(id)?;
                self.headers
                    .get(g)
                    .and_then(|d| d.handler.read_udf(off, size))
                    .ok_or(FieldError::BadSize { field: id, size })
            }
        }
    }

    /// Apply `op` with operand `arg` to a field.
    pub fn field_update(
        &mut self,
        id: FieldId,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<(), FieldError> {
        match id {
            FieldId::Field { num, instance } => {
                if !field::info(num).accepts(arg.len()) {
                    return Err(FieldError::BadSize {
                        field: id,
                        size: arg.len(),
                    });
                }

                let d = self
                    .headers
                    .get_mut(num.group())
                    .ok_or(FieldError::NoSuchField(id))?;
                if d.handler.update(num, instance, op, arg)? {
                    d.dirty = true;
                }
                Ok(())
            }

            FieldId::Udf { .. } => {
                let (g, off, size) = self.udf(id)?;
                if arg.is_empty() || arg.len() > size {
                    return Err(FieldError::BadSize {
                        field: id,
                        size: arg.len(),
                    });
                }

                let d = self
                    .headers
                    .get_mut(g)
                    .ok_or(FieldError::NoSuchField(id))?;
                let mut val = match op {
                    FieldOp::Set => resize_be(arg, size),
                    FieldOp::Inc | FieldOp::Dec => d
                        .handler
                        .read_udf(off, size)
                        .ok_or(FieldError::BadSize { field: id, size })?,
                };
                if op != FieldOp::Set {
                    apply_op(&mut val, op, arg);
                }

                if !d.handler.write_udf(off, &val) {
                    return Err(FieldError::BadOp { field: id, op });
                }
                d.dirty = true;
                Ok(())
            }
        }
    }

    /// Add a header of `kind`.
    ///
    /// If the kind's group already holds a handler, the handler adds
    /// the header to what it holds (an outer IP, a VLAN tag, an MPLS
    /// label). Otherwise a fresh handler is synthesized and placed
    /// after the nearest occupied group outside it. Metadata and
    /// payload sit at fixed ends of the frame and are never added.
    pub fn encap(&mut self, kind: HeaderKind) -> Result<(), HeaderError> {
        let proto =
            protocol::lookup(kind).ok_or(HeaderError::NoSynthesis(kind))?;
        let group = proto.group;
        if matches!(group, HeaderGroup::Packet | HeaderGroup::Payload) {
            return Err(HeaderError::GroupOrder(kind));
        }

        if let Some(d) = self.headers.get_mut(group) {
            d.handler.modify(kind)?;
            d.dirty = true;
        } else {
            let add = proto.add.ok_or(HeaderError::NoSynthesis(kind))?;
            let mut desc = Descriptor::new(group, add(kind)?);
            desc.dirty = true;
            self.headers.insert(desc);
            self.headers.with_env(group, |d, env| d.handler.attach(env));
        }

        self.headers.rebuild_outward(group);
        self.desc = describe(&self.headers);
        Ok(())
    }

    /// Remove the outermost header of `kind`. The header must be the
    /// outermost its handler holds.
    pub fn decap(&mut self, kind: HeaderKind) -> Result<(), HeaderError> {
        let group = kind.group().ok_or(HeaderError::NotPresent(kind))?;
        if group == HeaderGroup::Packet {
            return Err(HeaderError::Precondition {
                kind,
                msg: "packet metadata cannot be removed",
            });
        }

        let d = self
            .headers
            .get_mut(group)
            .ok_or(HeaderError::NotPresent(kind))?;

        let rebuild_from = if d.handler.remove(kind)? {
            self.headers.unlink(group);
            self.headers.prev(group)
        } else {
            d.dirty = true;
            Some(group)
        };

        if let Some(from) = rebuild_from {
            self.headers.rebuild_outward(from);
        }
        self.desc = describe(&self.headers);
        Ok(())
    }

    /// Rebuild every header and return the frame.
    pub fn serialize(&mut self) -> Vec<u8> {
        self.headers.rebuild_all();
        let mut out = Vec::with_capacity(self.len());
        self.headers.emit(&mut out);
        out
    }

    /// The frame as [`Packet::serialize`] would produce it, leaving
    /// this packet untouched.
    fn rebuilt_frame(&self, prepend: &[u8]) -> Vec<u8> {
        let mut headers = self.headers.clone();
        headers.rebuild_all();
        let mut out = Vec::with_capacity(prepend.len() + headers.wire_len());
        out.extend_from_slice(prepend);
        headers.emit(&mut out);
        out
    }

    fn copy_fields(
        &self,
        to: &mut Packet,
        fields: &[FieldId],
    ) -> Result<(), FieldError> {
        for f in fields {
            let val = self.field_get(*f)?;
            to.field_update(*f, FieldOp::Set, &val)?;
        }
        Ok(())
    }

    /// Produce an independent replica of this packet.
    ///
    /// The replica is reparsed from this packet's frame, so only wire
    /// state carries over by default. The values of `fields` are
    /// copied explicitly, along with the attributes, the debug flag and
    /// the log.
    pub fn mirror(&self, fields: &[FieldId]) -> Result<Packet, PacketError> {
        let bytes = self.rebuilt_frame(&[]);
        let mut replica = Packet::parse(self.start, &bytes)?;
        self.copy_fields(&mut replica, fields)?;
        replica.attrs = self.attrs.clone();
        replica.debug = self.debug;
        replica.log = self.log.clone();
        Ok(replica)
    }

    /// Reparse this packet's frame, with `prepend` in front of it, as
    /// a frame starting with `start`.
    ///
    /// On failure the packet is unchanged.
    pub fn reparse(
        &mut self,
        start: HeaderKind,
        fields: &[FieldId],
        prepend: &[u8],
    ) -> Result<(), PacketError> {
        let bytes = self.rebuilt_frame(prepend);
        let mut pkt = Packet::parse(start, &bytes)?;
        self.copy_fields(&mut pkt, fields)?;
        pkt.attrs = core::mem::take(&mut self.attrs);
        pkt.debug = self.debug;
        pkt.log = core::mem::take(&mut self.log);
        *self = pkt;
        Ok(())
    }
}

/// The header kinds of a packet joined with `/`, e.g.
/// `ETH/IP4/TCP/OPAQUE`.
fn describe(headers: &Headers) -> String {
    headers
        .iter()
        .filter(|d| d.group != HeaderGroup::Packet)
        .flat_map(|d| stacked_kinds(&d.handler))
        .join("/")
}

fn stacked_kinds(h: &Handler) -> impl Iterator<Item = HeaderKind> + '_ {
    (0..u8::MAX).map_while(|n| h.kind(Instance::new(n)))
}

impl Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.desc, self.len())
    }
}

/// The metadata fields a replica or reparsed packet inherits unless
/// told otherwise.
pub const PORT_FIELDS: [FieldId; 2] =
    [FieldId::new(FieldNum::InputPort), FieldId::new(FieldNum::OutputPort)];
