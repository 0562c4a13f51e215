// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The L3 handler: a chain of IPv4, IPv6 and GRE headers.
//!
//! A tunnel such as IPv6-in-IPv4-in-GRE-in-IPv6 is a single chain,
//! outermost header first. IP field instances count IP headers only,
//! GRE field instances count GRE headers only; in both cases
//! [`Instance::LAST`] is the innermost.
//!
//! The outermost IP header's length bounds the frame: any bytes past
//! it (Ethernet padding) are held as the chain's trailer.

use super::checksum::Checksum;
use super::checksum::HeaderChecksum;
use super::frame::Frame;
use super::gre;
use super::gre::GreHdr;
use super::headers::FieldError;
use super::headers::Handler;
use super::headers::HeaderEnv;
use super::headers::HeaderError;
use super::headers::HeaderHandler;
use super::headers::ParseError;
use super::ip4;
use super::ip4::Ipv4Hdr;
use super::ip6::Ipv6Hdr;
use crate::api::FieldNum;
use crate::api::FieldOp;
use crate::api::HeaderKind;
use crate::api::Instance;
use core::net::Ipv6Addr;
use ipnetwork::Ipv6Network;

/// One header of the chain.
#[derive(Clone, Debug)]
pub enum IpHdr {
    V4(Ipv4Hdr),
    V6(Ipv6Hdr),
    Gre(GreHdr),
}

impl IpHdr {
    pub fn kind(&self) -> HeaderKind {
        match self {
            Self::V4(_) => HeaderKind::Ip4,
            Self::V6(_) => HeaderKind::Ip6,
            Self::Gre(_) => HeaderKind::Gre,
        }
    }

    pub fn hdr_len(&self) -> usize {
        match self {
            Self::V4(h) => h.hdr_len(),
            Self::V6(h) => h.hdr_len(),
            Self::Gre(h) => h.hdr_len(),
        }
    }

    pub fn emit(&self, out: &mut Vec<u8>) {
        match self {
            Self::V4(h) => h.emit(out),
            Self::V6(h) => h.emit(out),
            Self::Gre(h) => h.emit(out),
        }
    }

    fn next_kind(&self) -> HeaderKind {
        match self {
            Self::V4(h) => h.next_kind(),
            Self::V6(h) => h.next_kind(),
            Self::Gre(h) => h.next_kind(),
        }
    }

    fn payload_len(&self) -> Option<usize> {
        match self {
            Self::V4(h) => Some(h.payload_len()),
            Self::V6(h) => Some(h.payload_len()),
            Self::Gre(_) => None,
        }
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        match self {
            Self::V4(h) => h.reload(bytes),
            Self::V6(h) => h.reload(bytes),
            Self::Gre(h) => h.reload(bytes),
        }
    }

    fn addrs(&self) -> Option<IpAddrs> {
        match self {
            Self::V4(h) => {
                Some(IpAddrs::V4 { src: h.src().octets(), dst: h.dst().octets() })
            }
            Self::V6(h) => {
                Some(IpAddrs::V6 { src: h.src().octets(), dst: h.dst().octets() })
            }
            Self::Gre(_) => None,
        }
    }
}

/// The source and destination of an IP header, as summed into an
/// upper-layer pseudo-header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IpAddrs {
    V4 { src: [u8; 4], dst: [u8; 4] },
    V6 { src: [u8; 16], dst: [u8; 16] },
}

impl IpAddrs {
    /// The pseudo-header sum for an upper-layer packet of `len` bytes.
    pub fn pseudo_header(&self, proto: u8, len: usize) -> Checksum {
        let mut csum = Checksum::new();
        match self {
            Self::V4 { src, dst } => {
                csum.add_bytes(src);
                csum.add_bytes(dst);
                csum.add_bytes(&[0, proto]);
                let len = u16::try_from(len).unwrap_or(u16::MAX);
                csum.add_bytes(&len.to_be_bytes());
            }

            Self::V6 { src, dst } => {
                csum.add_bytes(src);
                csum.add_bytes(dst);
                let len = u32::try_from(len).unwrap_or(u32::MAX);
                csum.add_bytes(&len.to_be_bytes());
                csum.add_bytes(&[0, 0, 0, proto]);
            }
        }
        csum
    }

    pub fn is_v4(&self) -> bool {
        matches!(self, Self::V4 { .. })
    }
}

/// The pseudo-header an upper-layer checksum was last computed over.
///
/// The checksum is only recomputed when the upper-layer header, its
/// payload or its enclosing header is dirty, or when the innermost IP
/// addresses have changed underneath it (a decap, or an outward
/// rebuild that already cleared the enclosing header).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PseudoHeader {
    seen: Option<IpAddrs>,
}

impl PseudoHeader {
    pub fn attach(&mut self, env: &HeaderEnv<'_>) {
        self.seen = env.ip_addrs();
    }

    /// The addresses to recompute over, if the checksum is stale.
    pub fn stale(&mut self, env: &HeaderEnv<'_>, dirty: bool) -> Option<IpAddrs> {
        let cur = env.ip_addrs();
        if !(dirty || env.outer_dirty() || env.inner_dirty() || cur != self.seen) {
            return None;
        }
        self.seen = cur;
        cur
    }
}

/// The checksum of an upper-layer header `hdr` (its checksum zeroed)
/// followed by everything inside it.
pub fn upper_layer_csum(
    addrs: &IpAddrs,
    proto: u8,
    hdr: &[u8],
    env: &HeaderEnv<'_>,
) -> [u8; 2] {
    let mut body = hdr.to_vec();
    env.emit_inner(&mut body);
    let mut csum = addrs.pseudo_header(proto, body.len());
    csum.add_bytes(&body);
    HeaderChecksum::from(csum).bytes()
}

/// The IPv4 address embedded in a 6to4 address, if `addr` is one.
pub fn six_to_four_v4(addr: Ipv6Addr) -> Option<[u8; 4]> {
    let prefix = Ipv6Network::new(Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0), 16).ok()?;
    if !prefix.contains(addr) {
        return None;
    }
    let o = addr.octets();
    Some([o[2], o[3], o[4], o[5]])
}

#[derive(Clone, Debug, Default)]
pub struct IpChain {
    hdrs: Vec<IpHdr>,
    trailer: Vec<u8>,
}

pub fn parse(
    frame: &mut Frame<'_>,
    start: HeaderKind,
) -> Result<(Handler, HeaderKind), ParseError> {
    let mut chain = IpChain::default();
    let mut kind = start;

    loop {
        let hdr = match kind {
            HeaderKind::Ip4 => IpHdr::V4(Ipv4Hdr::parse(frame)?),
            HeaderKind::Ip6 => IpHdr::V6(Ipv6Hdr::parse(frame)?),
            HeaderKind::Gre => IpHdr::Gre(GreHdr::parse(frame)?),
            _ => return Err(ParseError::UnknownHeader(kind)),
        };

        if chain.hdrs.is_empty() {
            if let Some(payload) = hdr.payload_len() {
                let avail = frame.len();
                if payload > avail {
                    return Err(ParseError::BadHeader {
                        kind,
                        msg: "length exceeds frame",
                    });
                }
                chain.trailer = frame.strip_trailing(avail - payload)?.to_vec();
            }
        }

        let next = hdr.next_kind();
        chain.hdrs.push(hdr);

        match next {
            HeaderKind::Ip4 | HeaderKind::Ip6 | HeaderKind::Gre => kind = next,
            _ => return Ok((Handler::Ip(chain), next)),
        }
    }
}

pub fn add(kind: HeaderKind) -> Result<Handler, HeaderError> {
    let hdr = match kind {
        HeaderKind::Ip4 => IpHdr::V4(Ipv4Hdr::default()),
        HeaderKind::Ip6 => IpHdr::V6(Ipv6Hdr::default()),
        _ => return Err(HeaderError::NoSynthesis(kind)),
    };
    Ok(Handler::Ip(IpChain { hdrs: vec![hdr], trailer: vec![] }))
}

impl IpChain {
    pub fn hdrs(&self) -> &[IpHdr] {
        &self.hdrs
    }

    /// The addresses of the innermost IP header.
    pub fn innermost_addrs(&self) -> Option<IpAddrs> {
        self.hdrs.iter().rev().find_map(IpHdr::addrs)
    }

    fn index(&self, num: FieldNum, instance: Instance) -> Result<usize, FieldError> {
        let gre = matches!(
            num,
            FieldNum::GreProtocol | FieldNum::GreKey | FieldNum::GreSeq
        );
        let positions: Vec<usize> = self
            .hdrs
            .iter()
            .enumerate()
            .filter(|(_, h)| matches!(h, IpHdr::Gre(_)) == gre)
            .map(|(i, _)| i)
            .collect();

        instance
            .resolve(positions.len())
            .map(|i| positions[i])
            .ok_or_else(|| FieldError::no_field(num, instance))
    }

    fn six_to_four_check(&self, kind: HeaderKind) -> Result<(), HeaderError> {
        let pre = |msg| HeaderError::Precondition { kind, msg };

        let (Some(IpHdr::V4(v4)), Some(IpHdr::V6(v6))) =
            (self.hdrs.first(), self.hdrs.get(1))
        else {
            return Err(pre("not an IPv6-in-IPv4 tunnel"));
        };

        if six_to_four_v4(v6.dst()) != Some(v4.dst().octets()) {
            return Err(pre("destination does not embed the IPv4 destination"));
        }

        if kind == HeaderKind::SixToFourSecure
            && six_to_four_v4(v6.src()) != Some(v4.src().octets())
        {
            return Err(pre("source does not embed the IPv4 source"));
        }

        Ok(())
    }

    fn six_to_four_outer(&self, kind: HeaderKind) -> Result<Ipv4Hdr, HeaderError> {
        let pre = |msg| HeaderError::Precondition { kind, msg };

        let Some(IpHdr::V6(v6)) = self.hdrs.first() else {
            return Err(pre("outermost header is not IPv6"));
        };

        let dst = six_to_four_v4(v6.dst())
            .ok_or(pre("destination is not a 6to4 address"))?;
        let src = match six_to_four_v4(v6.src()) {
            Some(src) => src,
            None if kind == HeaderKind::SixToFourSecure => {
                return Err(pre("source is not a 6to4 address"));
            }
            None => [0; 4],
        };

        let mut v4 = Ipv4Hdr::default();
        v4.set_src(src);
        v4.set_dst(dst);
        Ok(v4)
    }
}

impl HeaderHandler for IpChain {
    fn kind(&self, instance: Instance) -> Option<HeaderKind> {
        let idx = instance.resolve(self.hdrs.len())?;
        Some(self.hdrs[idx].kind())
    }

    fn len(&self) -> usize {
        self.hdrs.iter().map(IpHdr::hdr_len).sum()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        for hdr in &self.hdrs {
            hdr.emit(out);
        }
    }

    fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    fn get(
        &self,
        num: FieldNum,
        instance: Instance,
    ) -> Result<Vec<u8>, FieldError> {
        let idx = self.index(num, instance)?;
        let val = match &self.hdrs[idx] {
            IpHdr::V4(h) => h.get(num),
            IpHdr::V6(h) => h.get(num),
            IpHdr::Gre(h) => h.get(num),
        };
        val.ok_or_else(|| FieldError::no_field(num, instance))
    }

    fn update(
        &mut self,
        num: FieldNum,
        instance: Instance,
        op: FieldOp,
        arg: &[u8],
    ) -> Result<bool, FieldError> {
        let idx = self.index(num, instance)?;
        let dirty = match &mut self.hdrs[idx] {
            IpHdr::V4(h) => h.update(num, op, arg),
            IpHdr::V6(h) => h.update(num, op, arg),
            IpHdr::Gre(h) => h.update(num, op, arg),
        };
        dirty.ok_or_else(|| FieldError::no_field(num, instance))
    }

    fn reload(&mut self, bytes: &[u8]) -> bool {
        let mut hdrs = self.hdrs.clone();
        let mut off = 0;

        for hdr in &mut hdrs {
            let end = off + hdr.hdr_len();
            match bytes.get(off..end) {
                Some(b) if hdr.reload(b) => off = end,
                _ => return false,
            }
        }

        self.hdrs = hdrs;
        off == bytes.len()
    }

    fn modify(&mut self, kind: HeaderKind) -> Result<(), HeaderError> {
        let hdr = match kind {
            HeaderKind::Ip4 => IpHdr::V4(Ipv4Hdr::default()),
            HeaderKind::Ip6 => IpHdr::V6(Ipv6Hdr::default()),

            HeaderKind::Gre => match self.hdrs.first() {
                Some(IpHdr::Gre(_)) => {
                    return Err(HeaderError::Precondition {
                        kind,
                        msg: "GRE over GRE",
                    });
                }
                _ => IpHdr::Gre(GreHdr::default()),
            },

            HeaderKind::SixToFourAuto | HeaderKind::SixToFourSecure => {
                IpHdr::V4(self.six_to_four_outer(kind)?)
            }

            _ => {
                return Err(HeaderError::Precondition {
                    kind,
                    msg: "L3 already holds an IP chain",
                });
            }
        };

        self.hdrs.insert(0, hdr);
        Ok(())
    }

    fn remove(&mut self, kind: HeaderKind) -> Result<bool, HeaderError> {
        let found = self.kind(Instance::FIRST).unwrap_or(HeaderKind::None);

        match (kind, self.hdrs.first()) {
            (HeaderKind::Ip4, Some(IpHdr::V4(_)))
            | (HeaderKind::Ip6, Some(IpHdr::V6(_)))
            | (HeaderKind::Gre, Some(IpHdr::Gre(_))) => {}

            (
                HeaderKind::SixToFourAuto | HeaderKind::SixToFourSecure,
                Some(IpHdr::V4(_)),
            ) => self.six_to_four_check(kind)?,

            _ => return Err(HeaderError::WrongOutermost { want: kind, found }),
        }

        self.hdrs.remove(0);
        Ok(self.hdrs.is_empty())
    }

    fn rebuild(&mut self, env: &HeaderEnv<'_>, dirty: bool) {
        let mut inner_len = env.inner_len();
        let mut inner_kind = env.inner_kind();

        for i in (0..self.hdrs.len()).rev() {
            let Some((hdr, rest)) = self.hdrs[i..].split_first_mut() else {
                continue;
            };

            match &mut *hdr {
                IpHdr::V4(h) => h.rebuild(
                    inner_len,
                    inner_kind.and_then(ip4::kind_proto),
                    dirty,
                ),

                IpHdr::V6(h) => {
                    h.rebuild(inner_len, inner_kind.and_then(ip4::kind_proto))
                }

                IpHdr::Gre(h) => {
                    h.rebuild(inner_kind.and_then(gre::kind_proto), |out| {
                        for r in rest.iter() {
                            r.emit(out);
                        }
                        env.emit_inner(out);
                    })
                }
            }

            inner_len += hdr.hdr_len();
            inner_kind = Some(hdr.kind());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use core::net::Ipv4Addr;

    fn v6_in_v4(v6_src: Ipv6Addr, v6_dst: Ipv6Addr) -> IpChain {
        let mut outer = Ipv4Hdr::new(
            Ipv4Addr::new(192, 0, 2, 1),
            Ipv4Addr::new(198, 51, 100, 7),
        );
        outer.rebuild(40, Some(ip4::PROTO_IPV6), true);
        IpChain {
            hdrs: vec![IpHdr::V4(outer), IpHdr::V6(Ipv6Hdr::new(v6_src, v6_dst))],
            trailer: vec![],
        }
    }

    #[test]
    fn six_to_four_prefix() {
        let addr: Ipv6Addr = "2002:c633:6407::1".parse().unwrap();
        assert_eq!(six_to_four_v4(addr), Some([198, 51, 100, 7]));
        assert_eq!(six_to_four_v4("2001:db8::1".parse().unwrap()), None);
    }

    #[test]
    fn six_to_four_remove() {
        let dst: Ipv6Addr = "2002:c633:6407::1".parse().unwrap();
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();

        let mut chain = v6_in_v4(src, dst);
        assert!(matches!(
            chain.remove(HeaderKind::SixToFourSecure),
            Err(HeaderError::Precondition { .. })
        ));
        assert_eq!(chain.remove(HeaderKind::SixToFourAuto), Ok(false));
        assert_eq!(chain.kind(Instance::FIRST), Some(HeaderKind::Ip6));

        let bad_dst: Ipv6Addr = "2002:c633:6408::1".parse().unwrap();
        let mut chain = v6_in_v4(src, bad_dst);
        assert!(chain.remove(HeaderKind::SixToFourAuto).is_err());

        let secure_src: Ipv6Addr = "2002:c000:201::1".parse().unwrap();
        let mut chain = v6_in_v4(secure_src, dst);
        assert_eq!(chain.remove(HeaderKind::SixToFourSecure), Ok(false));
    }

    #[test]
    fn six_to_four_add() {
        let dst: Ipv6Addr = "2002:c633:6407::1".parse().unwrap();
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let mut chain = IpChain {
            hdrs: vec![IpHdr::V6(Ipv6Hdr::new(src, dst))],
            trailer: vec![],
        };

        assert!(chain.modify(HeaderKind::SixToFourSecure).is_err());
        chain.modify(HeaderKind::SixToFourAuto).unwrap();
        assert_eq!(
            chain.get(FieldNum::IpAddrDst, Instance::FIRST).unwrap(),
            vec![198, 51, 100, 7]
        );
        assert_eq!(
            chain.get(FieldNum::IpAddrDst, Instance::LAST).unwrap(),
            dst.octets().to_vec()
        );
    }

    #[test]
    fn gre_rules() {
        let mut chain = IpChain {
            hdrs: vec![IpHdr::V6(Ipv6Hdr::default())],
            trailer: vec![],
        };
        chain.modify(HeaderKind::Gre).unwrap();
        assert!(chain.modify(HeaderKind::Gre).is_err());
        chain.modify(HeaderKind::Ip4).unwrap();
        assert_eq!(chain.len(), 20 + 4 + 40);

        // GRE fields count GRE headers, IP fields IP headers.
        chain.update(FieldNum::GreKey, Instance::FIRST, FieldOp::Set, &[9]).unwrap();
        assert_eq!(chain.len(), 20 + 8 + 40);
        assert_eq!(
            chain.get(FieldNum::IpVersion, Instance::new(1)).unwrap(),
            vec![6]
        );
        assert!(chain.get(FieldNum::GreKey, Instance::new(1)).is_err());

        assert!(matches!(
            chain.remove(HeaderKind::Gre),
            Err(HeaderError::WrongOutermost { found: HeaderKind::Ip4, .. })
        ));
        assert_eq!(chain.remove(HeaderKind::Ip4), Ok(false));
        assert_eq!(chain.remove(HeaderKind::Gre), Ok(false));
        assert_eq!(chain.remove(HeaderKind::Ip6), Ok(true));
    }

    #[test]
    fn trailer_stripped() {
        let mut outer = Ipv4Hdr::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        outer.rebuild(4, Some(253), true);
        let mut bytes = vec![];
        outer.emit(&mut bytes);
        bytes.extend_from_slice(&[1, 2, 3, 4, 0, 0, 0]);

        let mut frame = Frame::new(&bytes);
        let (h, next) = parse(&mut frame, HeaderKind::Ip4).unwrap();
        let Handler::Ip(chain) = h else { panic!("not an IP chain") };
        assert_eq!(next, HeaderKind::Opaque);
        assert_eq!(chain.trailer(), &[0, 0, 0]);
        assert_eq!(frame.read_rest(), &[1, 2, 3, 4]);

        let short = &bytes[..22];
        assert!(parse(&mut Frame::new(short), HeaderKind::Ip4).is_err());
    }
}
