// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use alloc::string::String;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// A MAC address, as carried in Ethernet, ARP and ND fields.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct MacAddr {
    inner: [u8; 6],
}

impl MacAddr {
    pub const BROADCAST: Self = Self { inner: [0xFF; 6] };
    pub const ZERO: Self = Self { inner: [0x00; 6] };

    pub const fn from_const(bytes: [u8; 6]) -> Self {
        Self { inner: bytes }
    }

    #[inline]
    pub fn bytes(&self) -> [u8; 6] {
        self.inner
    }

    /// Interpret a field value as a MAC address.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let inner: [u8; 6] = bytes.try_into().ok()?;
        Some(Self { inner })
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self { inner: bytes }
    }
}

impl AsRef<[u8]> for MacAddr {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut inner = [0u8; 6];
        let mut count = 0;

        for octet in s.split(':') {
            if count == inner.len() {
                return Err(format!("too many octets: {s}"));
            }
            inner[count] = u8::from_str_radix(octet, 16)
                .map_err(|_| format!("bad octet: {octet}"))?;
            count += 1;
        }

        if count != inner.len() {
            return Err(format!("incorrect number of bytes: {count}"));
        }

        Ok(Self { inner })
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.inner;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_and_print() {
        let mac: MacAddr = "ff:ff:ff:ff:ff:fe".parse().unwrap();
        assert_eq!(mac.bytes(), [0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(format!("{mac}"), "ff:ff:ff:ff:ff:fe");
        assert!("ff:ff".parse::<MacAddr>().is_err());
        assert!("ff:ff:ff:ff:ff:ff:ff".parse::<MacAddr>().is_err());
        assert!("gg:ff:ff:ff:ff:ff".parse::<MacAddr>().is_err());
    }
}
