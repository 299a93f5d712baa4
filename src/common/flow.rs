/*
 * Copyright (c) 2022 Yunshan Networks
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fmt;
use std::net::IpAddr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::decapsulate::TunnelType;
use super::enums::{PacketDirection, TcpFlags};
use super::l7_protocol::{Category, L7Protocol};
use super::lookup_key::LookupKey;
use super::timestamp::Timestamp;

// Direction-normalized flow identity. The (ip, port) endpoint that sorts
// lower is always stored as `src`, so both directions of a conversation
// produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub ip_src: IpAddr,
    pub ip_dst: IpAddr,
    pub port_src: u16,
    pub port_dst: u16,
    pub proto: u8,
    pub vlan: u16,
    // ids of different tunnel types are unrelated
    pub tunnel_type: TunnelType,
    pub tunnel_id: u32,
}

impl FlowKey {
    // Returns the key and whether the observed packet had to be reversed.
    pub fn new(key: &LookupKey) -> (FlowKey, bool) {
        let reversed = (key.dst_ip, key.dst_port) < (key.src_ip, key.src_port);
        let ((ip_src, port_src), (ip_dst, port_dst)) = if reversed {
            ((key.dst_ip, key.dst_port), (key.src_ip, key.src_port))
        } else {
            ((key.src_ip, key.src_port), (key.dst_ip, key.dst_port))
        };
        (
            FlowKey {
                ip_src,
                ip_dst,
                port_src,
                port_dst,
                proto: key.proto,
                vlan: key.vlan,
                tunnel_type: key.tunnel_type,
                tunnel_id: key.tunnel_id,
            },
            reversed,
        )
    }

    pub fn ip_version(&self) -> u8 {
        match self.ip_src {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 6,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} <-> {}:{} proto: {} vlan: {} tunnel_id: {}",
            self.ip_src,
            self.port_src,
            self.ip_dst,
            self.port_dst,
            self.proto,
            self.vlan,
            self.tunnel_id
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlowMetricsPeer {
    pub packet_count: u64,
    pub byte_count: u64,
    pub first: Timestamp,
    pub last: Timestamp,
    pub tcp_flags: TcpFlags,
}

impl FlowMetricsPeer {
    pub fn update(&mut self, packet_len: u32, tcp_flags: TcpFlags, timestamp: Timestamp) {
        if self.packet_count == 0 {
            self.first = timestamp;
        }
        self.packet_count += 1;
        self.byte_count += packet_len as u64;
        // out of order captures never move last backwards
        self.last = self.last.max(timestamp);
        self.tcp_flags |= tcp_flags;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CloseType {
    Unknown = 0,
    TcpFin = 1,
    TcpReset = 2,
    Timeout = 3,
    Evicted = 4,
    ForcedFlush = 5,
}

impl Default for CloseType {
    fn default() -> Self {
        CloseType::Unknown
    }
}

impl fmt::Display for CloseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseType::Unknown => "unknown",
            CloseType::TcpFin => "tcp-fin",
            CloseType::TcpReset => "tcp-reset",
            CloseType::Timeout => "timeout",
            CloseType::Evicted => "evicted",
            CloseType::ForcedFlush => "forced-flush",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyState {
    Pending,
    Classified,
    GaveUp,
}

impl Default for ClassifyState {
    fn default() -> Self {
        ClassifyState::Pending
    }
}

impl ClassifyState {
    pub fn is_finished(&self) -> bool {
        *self != ClassifyState::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub flow_id: u64,
    pub flow_key: FlowKey,
    // set when the first packet, sent by the client, was reversed by FlowKey::new
    pub reversed: bool,
    // indexed by PacketDirection
    pub peers: [FlowMetricsPeer; 2],
    pub tunnel_type: TunnelType,
    pub l7_protocol: L7Protocol,
    pub category: Category,
    pub classify_state: ClassifyState,
    pub close_type: CloseType,
}

impl Flow {
    pub fn new(flow_id: u64, flow_key: FlowKey, reversed: bool) -> Self {
        Self {
            flow_id,
            flow_key,
            reversed,
            peers: Default::default(),
            tunnel_type: TunnelType::None,
            l7_protocol: L7Protocol::UNKNOWN,
            category: Category::UNSPECIFIED,
            classify_state: ClassifyState::Pending,
            close_type: CloseType::Unknown,
        }
    }

    // Direction of a packet whose key normalization returned `reversed`.
    pub fn direction_of(&self, reversed: bool) -> PacketDirection {
        if reversed == self.reversed {
            PacketDirection::ClientToServer
        } else {
            PacketDirection::ServerToClient
        }
    }

    pub fn client(&self) -> (IpAddr, u16) {
        if self.reversed {
            (self.flow_key.ip_dst, self.flow_key.port_dst)
        } else {
            (self.flow_key.ip_src, self.flow_key.port_src)
        }
    }

    pub fn server(&self) -> (IpAddr, u16) {
        if self.reversed {
            (self.flow_key.ip_src, self.flow_key.port_src)
        } else {
            (self.flow_key.ip_dst, self.flow_key.port_dst)
        }
    }

    pub fn peer(&self, direction: PacketDirection) -> &FlowMetricsPeer {
        &self.peers[direction as usize]
    }

    pub fn total_packets(&self) -> u64 {
        self.peers[0].packet_count + self.peers[1].packet_count
    }

    pub fn total_bytes(&self) -> u64 {
        self.peers[0].byte_count + self.peers[1].byte_count
    }

    pub fn tcp_flags(&self) -> TcpFlags {
        self.peers[0].tcp_flags | self.peers[1].tcp_flags
    }

    pub fn start_time(&self) -> Timestamp {
        let [c2s, s2c] = &self.peers;
        match (c2s.packet_count, s2c.packet_count) {
            (0, _) => s2c.first,
            (_, 0) => c2s.first,
            _ => c2s.first.min(s2c.first),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (client_ip, client_port) = self.client();
        let (server_ip, server_port) = self.server();
        write!(
            f,
            "flow_id: {} {}:{} > {}:{} proto: {} packets: {} bytes: {} close_type: {}",
            self.flow_id,
            client_ip,
            client_port,
            server_ip,
            server_port,
            self.flow_key.proto,
            self.total_packets(),
            self.total_bytes(),
            self.close_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_key(src: &str, src_port: u16, dst: &str, dst_port: u16) -> LookupKey {
        LookupKey {
            src_ip: src.parse().unwrap(),
            dst_ip: dst.parse().unwrap(),
            src_port,
            dst_port,
            proto: 6,
            ..Default::default()
        }
    }

    #[test]
    fn normalization_is_symmetric() {
        let cases = [
            ("10.0.0.1", 40000, "10.0.0.2", 80),
            ("10.0.0.2", 80, "10.0.0.1", 40000),
            ("10.0.0.1", 80, "10.0.0.1", 40000),
            ("2001:db8::5", 443, "2001:db8::1", 50000),
        ];
        for (src, sport, dst, dport) in cases {
            let mut key = lookup_key(src, sport, dst, dport);
            let (forward, forward_reversed) = FlowKey::new(&key);
            key.reverse();
            let (backward, backward_reversed) = FlowKey::new(&key);
            assert_eq!(forward, backward);
            assert_ne!(forward_reversed, backward_reversed);
        }
    }

    #[test]
    fn same_host_orders_by_port() {
        let (key, reversed) = FlowKey::new(&lookup_key("10.0.0.1", 9000, "10.0.0.1", 80));
        assert!(reversed);
        assert_eq!(key.port_src, 80);
        assert_eq!(key.port_dst, 9000);
        assert_eq!(key.ip_version(), 4);
    }

    #[test]
    fn vlan_and_tunnel_are_part_of_key() {
        let mut a = lookup_key("10.0.0.1", 1, "10.0.0.2", 2);
        let b = a.clone();
        a.vlan = 10;
        assert_ne!(FlowKey::new(&a).0, FlowKey::new(&b).0);
        a.vlan = 0;
        a.tunnel_type = TunnelType::Vxlan;
        a.tunnel_id = 7;
        assert_ne!(FlowKey::new(&a).0, FlowKey::new(&b).0);

        // same id under another tunnel type
        let mut c = a.clone();
        c.tunnel_type = TunnelType::Gre;
        assert_ne!(FlowKey::new(&a).0, FlowKey::new(&c).0);

        // ip-in-ip has no id
        let mut d = b.clone();
        d.tunnel_type = TunnelType::Ipip;
        assert_ne!(FlowKey::new(&b).0, FlowKey::new(&d).0);
    }

    #[test]
    fn client_is_first_sender() {
        let key = lookup_key("10.0.0.9", 50000, "10.0.0.1", 22);
        let (flow_key, reversed) = FlowKey::new(&key);
        let flow = Flow::new(1, flow_key, reversed);
        assert_eq!(flow.client(), ("10.0.0.9".parse().unwrap(), 50000));
        assert_eq!(flow.server(), ("10.0.0.1".parse().unwrap(), 22));
        assert_eq!(flow.direction_of(reversed), PacketDirection::ClientToServer);
        assert_eq!(flow.direction_of(!reversed), PacketDirection::ServerToClient);
    }

    #[test]
    fn peer_update() {
        let mut peer = FlowMetricsPeer::default();
        peer.update(60, TcpFlags::SYN, Timestamp::from_secs(5));
        peer.update(1500, TcpFlags::ACK, Timestamp::from_secs(4));
        assert_eq!(peer.packet_count, 2);
        assert_eq!(peer.byte_count, 1560);
        assert_eq!(peer.first, Timestamp::from_secs(5));
        assert_eq!(peer.last, Timestamp::from_secs(5));
        assert_eq!(peer.tcp_flags, TcpFlags::SYN_ACK);
    }
}
