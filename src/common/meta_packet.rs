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
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use super::decapsulate::{TunnelInfo, TunnelTypeBitmap};
use super::enums::{EthernetType, IpProtocol, LinkType, TcpFlags};
use super::lookup_key::LookupKey;
use crate::error::{Error, Result};
use public::bytes::{get_array, get_u16_be, get_u32_be, read_u16_be};
use public::consts::*;

// BSD loopback address families, in host byte order of the capturing machine
const NULL_FAMILY_INET: u32 = 2;
const NULL_FAMILY_INET6: [u32; 4] = [10, 24, 28, 30];

fn truncated() -> Error {
    Error::ParsePacketFailed("packet truncated".into())
}

struct L3Header {
    header_size: usize,
    // end of the IP datagram, excluding any link layer padding
    end: usize,
    protocol: u8,
    // a non-first fragment carries no l4 header
    fragment: bool,
}

// A decoded view of one captured frame. Payload borrows from the capture
// buffer, so a MetaPacket lives no longer than the frame it was built from.
pub struct MetaPacket<'a> {
    pub lookup_key: LookupKey,
    pub tcp_flags: TcpFlags,
    pub tunnel: TunnelInfo,
    // wire length of the whole frame
    pub packet_len: u32,
    // l4 payload, or the l3 payload for protocols without ports
    pub payload: &'a [u8],
}

impl<'a> Default for MetaPacket<'a> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a> MetaPacket<'a> {
    pub fn empty() -> Self {
        Self {
            lookup_key: LookupKey::default(),
            tcp_flags: TcpFlags::empty(),
            tunnel: TunnelInfo::default(),
            packet_len: 0,
            payload: &[],
        }
    }

    pub fn update(
        &mut self,
        packet: &'a [u8],
        link_type: LinkType,
        timestamp: Duration,
        original_length: u32,
        tunnel_types: &TunnelTypeBitmap,
    ) -> Result<()> {
        self.lookup_key = LookupKey {
            timestamp,
            ..Default::default()
        };
        self.tcp_flags = TcpFlags::empty();
        self.tunnel = TunnelInfo::default();
        self.packet_len = original_length.max(packet.len() as u32);
        self.payload = &[];

        let (mut eth_type, mut offset) = match link_type {
            LinkType::Ethernet => self.parse_ethernet(packet, 0)?,
            LinkType::Null | LinkType::Loop => {
                let family = get_array::<4>(packet, 0).ok_or_else(truncated)?;
                // DLT_NULL is host order, DLT_LOOP is network order
                let family = match link_type {
                    LinkType::Loop => u32::from_be_bytes(family),
                    _ => u32::from_ne_bytes(family),
                };
                let eth_type = match family {
                    NULL_FAMILY_INET => EthernetType::Ipv4,
                    f if NULL_FAMILY_INET6.contains(&f) => EthernetType::Ipv6,
                    _ => return Err(Error::NonIpPacket(family as u16)),
                };
                (eth_type, NULL_HEADER_SIZE)
            }
            LinkType::LinuxSll => {
                let protocol =
                    get_u16_be(packet, FIELD_OFFSET_SLL_PROTOCOL).ok_or_else(truncated)?;
                if packet.len() < LINUX_SLL_HEADER_SIZE {
                    return Err(truncated());
                }
                (EthernetType::from(protocol), LINUX_SLL_HEADER_SIZE)
            }
            LinkType::Raw | LinkType::RawDlt | LinkType::RawDltBsd => {
                (Self::ip_version_of(packet, 0)?, 0)
            }
            LinkType::Ipv4 => (EthernetType::Ipv4, 0),
            LinkType::Ipv6 => (EthernetType::Ipv6, 0),
        };

        loop {
            self.lookup_key.eth_type = eth_type;
            let l3 = match eth_type {
                EthernetType::Ipv4 => self.parse_ipv4(packet, offset)?,
                EthernetType::Ipv6 => self.parse_ipv6(packet, offset)?,
                _ => return Err(Error::NonIpPacket(eth_type.into())),
            };
            let protocol = IpProtocol::from(l3.protocol);
            let decapsulated = if l3.fragment {
                None
            } else {
                self.tunnel.decapsulate(
                    &packet[offset..l3.end],
                    l3.header_size,
                    protocol,
                    self.lookup_key.src_ip,
                    self.lookup_key.dst_ip,
                    tunnel_types,
                )
            };
            match decapsulated {
                Some((inner_offset, EthernetType::TransparentEthernetBridging)) => {
                    (eth_type, offset) = self.parse_ethernet(packet, offset + inner_offset)?;
                }
                Some((inner_offset, inner)) => {
                    eth_type = inner;
                    offset += inner_offset;
                }
                None => {
                    self.parse_l4(packet, offset + l3.header_size, &l3)?;
                    break;
                }
            }
        }
        self.lookup_key.tunnel_type = self.tunnel.tunnel_type;
        self.lookup_key.tunnel_id = self.tunnel.id;
        Ok(())
    }

    fn ip_version_of(packet: &[u8], offset: usize) -> Result<EthernetType> {
        match packet.get(offset).ok_or_else(truncated)? >> 4 {
            4 => Ok(EthernetType::Ipv4),
            6 => Ok(EthernetType::Ipv6),
            v => Err(Error::ParsePacketFailed(format!("invalid ip version {}", v))),
        }
    }

    // Returns the type and offset of whatever follows the Ethernet header
    // and any 802.1Q or 802.1ad tags.
    fn parse_ethernet(&mut self, packet: &[u8], offset: usize) -> Result<(EthernetType, usize)> {
        let mut eth_type_offset = offset + FIELD_OFFSET_ETH_TYPE;
        let mut eth_type = EthernetType::from(
            get_u16_be(packet, eth_type_offset).ok_or_else(truncated)?,
        );
        while eth_type == EthernetType::Dot1Q || eth_type == EthernetType::QinQ {
            let vlan_tag = get_u16_be(packet, eth_type_offset + 2).ok_or_else(truncated)?;
            // the innermost tag of the outer frame wins
            if self.tunnel.tier == 0 {
                self.lookup_key.vlan = vlan_tag & VLAN_ID_MASK;
            }
            eth_type_offset += VLAN_HEADER_SIZE;
            eth_type = EthernetType::from(
                get_u16_be(packet, eth_type_offset).ok_or_else(truncated)?,
            );
        }
        let l3_offset = eth_type_offset + 2;
        if packet.len() < l3_offset {
            return Err(truncated());
        }
        Ok((eth_type, l3_offset))
    }

    fn parse_ipv4(&mut self, packet: &[u8], offset: usize) -> Result<L3Header> {
        let header = packet
            .get(offset..offset + IPV4_HEADER_SIZE)
            .ok_or_else(truncated)?;
        if header[0] >> 4 != 4 {
            return Err(Error::ParsePacketFailed(format!(
                "invalid ipv4 version {}",
                header[0] >> 4
            )));
        }
        let header_size = (header[0] & 0xf) as usize * 4;
        if header_size < IPV4_HEADER_SIZE {
            return Err(Error::ParsePacketFailed(format!(
                "invalid ipv4 header length {}",
                header_size
            )));
        }
        if packet.len() < offset + header_size {
            return Err(truncated());
        }
        let total_length = read_u16_be(&header[2..]) as usize;
        let end = if total_length >= header_size {
            (offset + total_length).min(packet.len())
        } else {
            // TSO frames may carry a zero total length
            packet.len()
        };
        let fragment_offset = read_u16_be(&header[IPV4_OFFSET_FRAG..]) & IPV4_FRAG_OFFSET_MASK;

        self.lookup_key.src_ip = IpAddr::V4(Ipv4Addr::from(
            get_array::<IPV4_ADDR_LEN>(header, IPV4_OFFSET_SIP).ok_or_else(truncated)?,
        ));
        self.lookup_key.dst_ip = IpAddr::V4(Ipv4Addr::from(
            get_array::<IPV4_ADDR_LEN>(header, IPV4_OFFSET_DIP).ok_or_else(truncated)?,
        ));
        self.lookup_key.proto = header[IPV4_OFFSET_PROTO];
        Ok(L3Header {
            header_size,
            end,
            protocol: header[IPV4_OFFSET_PROTO],
            fragment: fragment_offset != 0,
        })
    }

    fn parse_ipv6(&mut self, packet: &[u8], offset: usize) -> Result<L3Header> {
        let header = packet
            .get(offset..offset + IPV6_HEADER_SIZE)
            .ok_or_else(truncated)?;
        if header[0] >> 4 != 6 {
            return Err(Error::ParsePacketFailed(format!(
                "invalid ipv6 version {}",
                header[0] >> 4
            )));
        }
        let payload_length = read_u16_be(&header[4..]) as usize;
        let end = if payload_length > 0 {
            (offset + IPV6_HEADER_SIZE + payload_length).min(packet.len())
        } else {
            // jumbograms
            packet.len()
        };
        self.lookup_key.src_ip = IpAddr::V6(Ipv6Addr::from(
            get_array::<IPV6_ADDR_LEN>(header, IPV6_OFFSET_SIP).ok_or_else(truncated)?,
        ));
        self.lookup_key.dst_ip = IpAddr::V6(Ipv6Addr::from(
            get_array::<IPV6_ADDR_LEN>(header, IPV6_OFFSET_DIP).ok_or_else(truncated)?,
        ));

        let mut next_header = header[IPV6_OFFSET_NEXT_HEADER];
        let mut header_size = IPV6_HEADER_SIZE;
        let mut fragment = false;
        for _ in 0..IPV6_MAX_EXTENSION_HEADERS {
            let ext = offset + header_size;
            let size = match IpProtocol::from(next_header) {
                IpProtocol::Ipv6HopByHop | IpProtocol::Ipv6Routing | IpProtocol::Ipv6Destination => {
                    (*packet.get(ext + 1).ok_or_else(truncated)? as usize + 1) * 8
                }
                IpProtocol::Ipv6Fragment => {
                    let frag = get_u16_be(packet, ext + 2).ok_or_else(truncated)?;
                    fragment |= frag >> 3 != 0;
                    IPV6_FRAGMENT_HEADER_SIZE
                }
                IpProtocol::Ah => (*packet.get(ext + 1).ok_or_else(truncated)? as usize + 2) * 4,
                _ => break,
            };
            next_header = packet[ext];
            header_size += size;
            if offset + header_size > packet.len() {
                return Err(truncated());
            }
        }
        self.lookup_key.proto = next_header;
        Ok(L3Header {
            header_size,
            end: end.max(offset + header_size),
            protocol: next_header,
            fragment,
        })
    }

    fn parse_l4(&mut self, packet: &'a [u8], offset: usize, l3: &L3Header) -> Result<()> {
        let protocol = IpProtocol::from(l3.protocol);
        if l3.fragment {
            return Ok(());
        }
        if !protocol.has_ports() {
            self.payload = packet.get(offset..l3.end).unwrap_or_default();
            return Ok(());
        }
        let ports = get_u32_be(packet, offset).ok_or_else(truncated)?;
        if offset + PORTS_SIZE > l3.end {
            return Err(truncated());
        }
        self.lookup_key.src_port = (ports >> 16) as u16;
        self.lookup_key.dst_port = ports as u16;

        let header_size = match protocol {
            IpProtocol::Tcp => {
                if let Some(flags) = packet.get(offset + TCP_OFFSET_FLAGS) {
                    self.tcp_flags = TcpFlags::from_bits_truncate(*flags) & TcpFlags::MASK;
                }
                packet
                    .get(offset + TCP_OFFSET_DATA_OFFSET)
                    .map(|d| ((d >> 4) as usize * 4).max(TCP_HEADER_SIZE))
                    .unwrap_or(TCP_HEADER_SIZE)
            }
            IpProtocol::Udp => UDP_HEADER_SIZE,
            // sctp common header
            _ => 12,
        };
        self.payload = packet.get(offset + header_size..l3.end).unwrap_or_default();
        Ok(())
    }
}

impl fmt::Display for MetaPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lookup_key)?;
        if self.lookup_key.is_tcp() {
            write!(f, " flags: [{}]", self.tcp_flags)?;
        }
        write!(f, " len: {} payload: {}", self.packet_len, self.payload.len())?;
        if self.tunnel.is_tunnelled() {
            write!(f, " tunnel: {{ {} }}", self.tunnel)?;
        }
        Ok(())
    }
}
