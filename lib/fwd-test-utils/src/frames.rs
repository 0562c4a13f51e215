// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Frame builders.
//!
//! These return plain bytes so that they can be fed to any parser,
//! including the engine's own unit tests. Checksums are filled in by
//! smoltcp, giving an independent oracle for what the engine
//! rebuilds.

use smoltcp::wire::IpAddress;
use smoltcp::wire::IpProtocol;
use smoltcp::wire::Ipv4Address;
use smoltcp::wire::Ipv4Packet;
use smoltcp::wire::TcpPacket;
use smoltcp::wire::TcpSeqNumber;
use smoltcp::wire::UdpPacket;

pub const GUEST_MAC: [u8; 6] = [0xa8, 0x40, 0x25, 0xf7, 0x00, 0x01];
pub const GW_MAC: [u8; 6] = [0xa8, 0x40, 0x25, 0xff, 0x77, 0x77];
pub const GUEST_IP: [u8; 4] = [10, 0, 0, 5];
pub const REMOTE_IP: [u8; 4] = [52, 10, 128, 69];

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
/// Local experimental; parses as opaque payload.
pub const ETHERTYPE_EXP: u16 = 0x88b5;

pub const SPORT: u16 = 44490;
pub const DPORT: u16 = 80;

pub fn ether(dst: [u8; 6], src: [u8; 6], ethertype: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(14);
    out.extend_from_slice(&dst);
    out.extend_from_slice(&src);
    out.extend_from_slice(&ethertype.to_be_bytes());
    out
}

/// An IPv4 header with a valid checksum, followed by `body`.
pub fn ipv4(src: [u8; 4], dst: [u8; 4], proto: IpProtocol, body: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + body.len()];
    let total = u16::try_from(buf.len()).expect("IPv4 packet too large");
    {
        let mut ip = Ipv4Packet::new_unchecked(&mut buf[..]);
        ip.set_version(4);
        ip.set_header_len(20);
        ip.set_total_len(total);
        ip.set_ident(0x1234);
        ip.clear_flags();
        ip.set_dont_frag(true);
        ip.set_hop_limit(64);
        ip.set_next_header(proto);
        ip.set_src_addr(Ipv4Address::from_bytes(&src));
        ip.set_dst_addr(Ipv4Address::from_bytes(&dst));
        ip.fill_checksum();
    }
    buf[20..].copy_from_slice(body);
    buf
}

/// A SYN-ACK-less TCP segment carrying `payload`, checksummed for the
/// given IPv4 endpoints.
pub fn tcp4(src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + payload.len()];
    buf[20..].copy_from_slice(payload);
    let mut tcp = TcpPacket::new_unchecked(&mut buf[..]);
    tcp.set_src_port(SPORT);
    tcp.set_dst_port(DPORT);
    tcp.set_seq_number(TcpSeqNumber(4224936861u32 as i32));
    tcp.set_ack_number(TcpSeqNumber(0));
    tcp.set_header_len(20);
    tcp.clear_flags();
    tcp.set_psh(true);
    tcp.set_window_len(64240);
    tcp.fill_checksum(
        &IpAddress::Ipv4(Ipv4Address::from_bytes(&src)),
        &IpAddress::Ipv4(Ipv4Address::from_bytes(&dst)),
    );
    buf
}

pub fn udp4(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 8 + payload.len()];
    let len = u16::try_from(buf.len()).expect("UDP datagram too large");
    buf[8..].copy_from_slice(payload);
    let mut udp = UdpPacket::new_unchecked(&mut buf[..]);
    udp.set_src_port(sport);
    udp.set_dst_port(dport);
    udp.set_len(len);
    udp.fill_checksum(
        &IpAddress::Ipv4(Ipv4Address::from_bytes(&src)),
        &IpAddress::Ipv4(Ipv4Address::from_bytes(&dst)),
    );
    buf
}

/// Guest to remote: Ethernet, IPv4, TCP, `payload`.
pub fn ether_ipv4_tcp(payload: &[u8]) -> Vec<u8> {
    let mut out = ether(GW_MAC, GUEST_MAC, ETHERTYPE_IPV4);
    let tcp = tcp4(GUEST_IP, REMOTE_IP, payload);
    out.extend(ipv4(GUEST_IP, REMOTE_IP, IpProtocol::Tcp, &tcp));
    out
}

/// Guest to remote: Ethernet, IPv4, UDP, `payload`.
pub fn ether_ipv4_udp(sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = ether(GW_MAC, GUEST_MAC, ETHERTYPE_IPV4);
    let udp = udp4(GUEST_IP, REMOTE_IP, sport, dport, payload);
    out.extend(ipv4(GUEST_IP, REMOTE_IP, IpProtocol::Udp, &udp));
    out
}

/// As [`ether_ipv4_tcp`] with one 802.1Q tag carrying `vid`.
pub fn ether_vlan_ipv4_tcp(vid: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&GW_MAC);
    out.extend_from_slice(&GUEST_MAC);
    out.extend_from_slice(&ETHERTYPE_VLAN.to_be_bytes());
    out.extend_from_slice(&(vid & 0x0fff).to_be_bytes());
    out.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
    let tcp = tcp4(GUEST_IP, REMOTE_IP, payload);
    out.extend(ipv4(GUEST_IP, REMOTE_IP, IpProtocol::Tcp, &tcp));
    out
}

/// An Ethernet frame of `len` bytes with an opaque payload and `dst`
/// as its destination.
pub fn ether_opaque(dst: [u8; 6], len: usize) -> Vec<u8> {
    let mut out = ether(dst, GUEST_MAC, ETHERTYPE_EXP);
    let body = len.saturating_sub(out.len());
    out.extend((0..body).map(|n| n as u8));
    out
}

/// A bare IPv4 header (TTL 0xff, checksum 0xa1ad) with a 24-byte TCP
/// segment whose checksum is deliberately left at zero.
#[rustfmt::skip]
pub fn ipv4_ttl_ff() -> Vec<u8> {
    let mut out = vec![
        0x45, 0x01, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
        0xff, 0x06, 0xa1, 0xad,
        0x01, 0x02, 0x03, 0x04,
        0x0a, 0x0b, 0x0c, 0x0d,
    ];
    out.extend_from_slice(&[
        // sport 1024, dport 80
        0x04, 0x00, 0x00, 0x50,
        // seq, ack
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        // data offset 5, ACK
        0x50, 0x10, 0xff, 0xff,
        // csum, urg
        0x00, 0x00, 0x00, 0x00,
        // data
        0xde, 0xad, 0xbe, 0xef,
    ]);
    out
}
