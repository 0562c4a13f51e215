// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Field updates.

use super::Action;
use super::BuildError;
use super::Outcome;
use crate::api::CounterId;
use crate::api::FieldId;
use crate::api::FieldOp;
use crate::api::State;
use crate::api::UpdateDesc;
use crate::api::UpdateOp;
use crate::engine::counter::CounterSink;
use crate::engine::counter::count_packet;
use crate::engine::frame::resize_be;
use crate::engine::headers::FieldError;
use crate::engine::packet::Packet;
use core::fmt;
use core::fmt::Display;

pub struct Update {
    desc: UpdateDesc,
}

impl Update {
    pub fn new(desc: &UpdateDesc) -> Result<Self, BuildError> {
        let invalid = |msg: &str| BuildError::invalid(&desc.clone().into(), msg);

        match desc.op {
            UpdateOp::Copy => {
                if desc.src.is_none() {
                    return Err(invalid("COPY needs a source field"));
                }
            }

            UpdateOp::BitWrite => {
                if desc.value.is_empty() {
                    return Err(invalid("BIT_WRITE needs a value"));
                }
                if usize::from(desc.bit_count) > desc.value.len() * 8 {
                    return Err(invalid("bit count exceeds the value"));
                }
            }

            _ => {
                if desc.value.is_empty() {
                    return Err(invalid("missing value"));
                }
            }
        }

        Ok(Self { desc: desc.clone() })
    }

    fn apply(&self, pkt: &mut Packet) -> Result<(), FieldError> {
        let d = &self.desc;
        match d.op {
            UpdateOp::Set => pkt.field_update(d.field, FieldOp::Set, &d.value),
            UpdateOp::Inc => pkt.field_update(d.field, FieldOp::Inc, &d.value),
            UpdateOp::Dec => pkt.field_update(d.field, FieldOp::Dec, &d.value),

            UpdateOp::Copy => {
                let Some(src) = d.src else {
                    return Err(FieldError::NoSuchField(d.field));
                };
                let width = pkt.field_get(d.field)?.len();
                let val = pkt.field_get(src)?;
                pkt.field_update(d.field, FieldOp::Set, &resize_be(&val, width))
            }

            UpdateOp::BitWrite => {
                let mut cur = pkt.field_get(d.field)?;
                write_bits(&mut cur, d.bit_offset, d.bit_count, &d.value)
                    .ok_or(FieldError::BadSize { field: d.field, size: cur.len() })?;
                pkt.field_update(d.field, FieldOp::Set, &cur)
            }

            UpdateOp::BitAnd | UpdateOp::BitOr => {
                let mut cur = pkt.field_get(d.field)?;
                let n = d.value.len();
                if n > cur.len() {
                    return Err(FieldError::BadSize { field: d.field, size: n });
                }

                let off = cur.len() - n;
                for (c, v) in cur[off..].iter_mut().zip(&d.value) {
                    if d.op == UpdateOp::BitAnd {
                        *c &= v;
                    } else {
                        *c |= v;
                    }
                }
                pkt.field_update(d.field, FieldOp::Set, &cur)
            }
        }
    }

    pub fn field(&self) -> FieldId {
        self.desc.field
    }
}

/// Write the low `count` bits of `value` into `field` starting
/// `offset` bits above its least significant bit. Both are big
/// endian. Returns `None` if the bits do not fit in `field`.
pub fn write_bits(
    field: &mut [u8],
    offset: u16,
    count: u16,
    value: &[u8],
) -> Option<()> {
    let (offset, count) = (usize::from(offset), usize::from(count));
    if offset + count > field.len() * 8 || count > value.len() * 8 {
        return None;
    }

    let flen = field.len();
    let vlen = value.len();
    for i in 0..count {
        let bit = (value[vlen - 1 - i / 8] >> (i % 8)) & 1;
        let pos = offset + i;
        let byte = &mut field[flen - 1 - pos / 8];
        let mask = 1u8 << (pos % 8);
        if bit == 1 {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
    Some(())
}

impl Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "update({} {})", self.desc.field, self.desc.op)
    }
}

impl Action for Update {
    fn process(&self, pkt: &mut Packet, counters: &dyn CounterSink) -> Outcome {
        match self.apply(pkt) {
            Ok(()) => Outcome::state(State::Continue),
            Err(e) => {
                count_packet(
                    counters,
                    CounterId::ErrorPackets,
                    CounterId::ErrorOctets,
                    pkt.len(),
                );
                pkt.log_error(format!("{self}: {e}"));
                Outcome::state(State::Drop)
            }
        }
    }
}
