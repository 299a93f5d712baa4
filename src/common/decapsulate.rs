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
use std::net::{IpAddr, Ipv4Addr};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use super::enums::{EthernetType, IpProtocol};
use public::bytes;
use public::consts::*;

#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TunnelType {
    None = 0,
    Vxlan = 1,
    Gre = 2,
    Ipip = 3,
    Geneve = 4,
}

impl TunnelType {
    pub const ALL: [TunnelType; 4] = [
        TunnelType::Vxlan,
        TunnelType::Gre,
        TunnelType::Ipip,
        TunnelType::Geneve,
    ];
}

impl fmt::Display for TunnelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelType::None => write!(f, "none"),
            TunnelType::Vxlan => write!(f, "VXLAN"),
            TunnelType::Gre => write!(f, "GRE"),
            TunnelType::Ipip => write!(f, "IPIP"),
            TunnelType::Geneve => write!(f, "Geneve"),
        }
    }
}

impl Default for TunnelType {
    fn default() -> Self {
        TunnelType::None
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TunnelTypeBitmap(u16);

impl TunnelTypeBitmap {
    pub fn new(tunnel_types: &[TunnelType]) -> Self {
        let mut bitmap = TunnelTypeBitmap(0);
        for tunnel_type in tunnel_types.iter() {
            bitmap.add(*tunnel_type);
        }
        bitmap
    }

    pub fn add(&mut self, tunnel_type: TunnelType) {
        if tunnel_type != TunnelType::None {
            self.0 |= 1 << tunnel_type as u16
        }
    }

    pub fn has(&self, tunnel_type: TunnelType) -> bool {
        self.0 & (1 << tunnel_type as u16) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TunnelTypeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{}", TunnelType::None);
        }
        let names = TunnelType::ALL
            .iter()
            .filter(|t| self.has(**t))
            .map(|t| t.to_string())
            .collect::<Vec<_>>();
        write!(f, "{}", names.join(" "))
    }
}

// Only the outermost tunnel is stripped, deeper layers are tracked as payload.
pub const TUNNEL_TIER_LIMIT: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TunnelInfo {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub id: u32,
    pub tunnel_type: TunnelType,
    pub tier: u8,
}

impl Default for TunnelInfo {
    fn default() -> Self {
        TunnelInfo {
            src: Ipv4Addr::UNSPECIFIED.into(),
            dst: Ipv4Addr::UNSPECIFIED.into(),
            id: 0,
            tunnel_type: TunnelType::default(),
            tier: 0,
        }
    }
}

impl fmt::Display for TunnelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type: {}, src: {}, dst: {}, id: {}, tier: {}",
            self.tunnel_type, self.src, self.dst, self.id, self.tier
        )
    }
}

impl TunnelInfo {
    pub fn is_tunnelled(&self) -> bool {
        self.tunnel_type != TunnelType::None
    }

    fn record(&mut self, src: IpAddr, dst: IpAddr, tunnel_type: TunnelType, id: u32) {
        // only the outermost tunnel is recorded
        if self.tier == 0 {
            self.src = src;
            self.dst = dst;
            self.tunnel_type = tunnel_type;
            self.id = id;
        }
        self.tier += 1;
    }

    // `l3_packet` starts at the outer IP header. On success returns the offset
    // of the inner header relative to `l3_packet` and what it contains: an IP
    // header for Ipv4/Ipv6, an Ethernet frame for TransparentEthernetBridging.
    pub fn decapsulate(
        &mut self,
        l3_packet: &[u8],
        ip_header_size: usize,
        protocol: IpProtocol,
        src: IpAddr,
        dst: IpAddr,
        tunnel_types: &TunnelTypeBitmap,
    ) -> Option<(usize, EthernetType)> {
        if self.tier >= TUNNEL_TIER_LIMIT || tunnel_types.is_empty() {
            return None;
        }
        let l4_packet = l3_packet.get(ip_header_size..)?;
        let (tunnel_type, id, offset, inner) = match protocol {
            IpProtocol::Udp => Self::decapsulate_udp(l4_packet, tunnel_types)?,
            IpProtocol::Gre if tunnel_types.has(TunnelType::Gre) => {
                Self::decapsulate_gre(l4_packet)?
            }
            IpProtocol::Ipv4 if tunnel_types.has(TunnelType::Ipip) => {
                (TunnelType::Ipip, 0, 0, EthernetType::Ipv4)
            }
            IpProtocol::Ipv6 if tunnel_types.has(TunnelType::Ipip) => {
                (TunnelType::Ipip, 0, 0, EthernetType::Ipv6)
            }
            _ => return None,
        };
        self.record(src, dst, tunnel_type, id);
        Some((ip_header_size + offset, inner))
    }

    fn decapsulate_udp(
        l4_packet: &[u8],
        tunnel_types: &TunnelTypeBitmap,
    ) -> Option<(TunnelType, u32, usize, EthernetType)> {
        let dst_port = bytes::get_u16_be(l4_packet, 2)?;
        match dst_port {
            p if VXLAN_PORTS.contains(&p) && tunnel_types.has(TunnelType::Vxlan) => {
                Self::decapsulate_vxlan(l4_packet.get(UDP_HEADER_SIZE..)?)
            }
            GENEVE_PORT if tunnel_types.has(TunnelType::Geneve) => {
                Self::decapsulate_geneve(l4_packet.get(UDP_HEADER_SIZE..)?)
            }
            _ => None,
        }
        .map(|(t, id, size, inner)| (t, id, UDP_HEADER_SIZE + size, inner))
    }

    fn decapsulate_vxlan(vxlan: &[u8]) -> Option<(TunnelType, u32, usize, EthernetType)> {
        if vxlan.len() < VXLAN_HEADER_SIZE || vxlan[0] & VXLAN_FLAGS == 0 {
            return None;
        }
        let vni = bytes::read_u32_be(&vxlan[VXLAN_OFFSET_VNI..]) >> 8;
        Some((
            TunnelType::Vxlan,
            vni,
            VXLAN_HEADER_SIZE,
            EthernetType::TransparentEthernetBridging,
        ))
    }

    fn decapsulate_geneve(geneve: &[u8]) -> Option<(TunnelType, u32, usize, EthernetType)> {
        if geneve.len() < GENEVE_HEADER_SIZE || geneve[0] >> GENEVE_VERSION_SHIFT != 0 {
            return None;
        }
        let options_size = (geneve[0] & GENEVE_OPTION_LENGTH_MASK) as usize * 4;
        let inner = Self::inner_type(bytes::read_u16_be(&geneve[GENEVE_OFFSET_PROTOCOL..]))?;
        let vni = bytes::read_u32_be(&geneve[GENEVE_OFFSET_VNI..]) >> 8;
        Some((TunnelType::Geneve, vni, GENEVE_HEADER_SIZE + options_size, inner))
    }

    fn calc_gre_option_size(flags: u16) -> usize {
        let mut size = 0;
        if flags & GRE_FLAGS_KEY_MASK != 0 {
            size += GRE_KEY_LEN;
        }
        if flags & GRE_FLAGS_SEQ_MASK != 0 {
            size += GRE_SEQ_LEN;
        }
        if flags & GRE_FLAGS_CSUM_MASK != 0 {
            size += GRE_CSUM_LEN;
        }
        size
    }

    // RFC 2784/2890 GRE, version 0 without source routing
    fn decapsulate_gre(gre: &[u8]) -> Option<(TunnelType, u32, usize, EthernetType)> {
        let flags = bytes::get_u16_be(gre, GRE_FLAGS_OFFSET)?;
        if flags & GRE_FLAGS_VER_MASK != 0 || flags & GRE_FLAGS_ROUTING_MASK != 0 {
            return None;
        }
        let inner = Self::inner_type(bytes::get_u16_be(gre, GRE_PROTOCOL_OFFSET)?)?;
        let header_size = GRE_HEADER_SIZE + Self::calc_gre_option_size(flags);
        if gre.len() < header_size {
            return None;
        }
        let id = if flags & GRE_FLAGS_KEY_MASK != 0 {
            let mut key_offset = GRE_HEADER_SIZE;
            if flags & GRE_FLAGS_CSUM_MASK != 0 {
                key_offset += GRE_CSUM_LEN;
            }
            bytes::read_u32_be(&gre[key_offset..])
        } else {
            0
        };
        Some((TunnelType::Gre, id, header_size, inner))
    }

    fn inner_type(protocol_type: u16) -> Option<EthernetType> {
        match EthernetType::from(protocol_type) {
            t @ (EthernetType::Ipv4
            | EthernetType::Ipv6
            | EthernetType::TransparentEthernetBridging) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_types() -> TunnelTypeBitmap {
        TunnelTypeBitmap::new(&TunnelType::ALL)
    }

    fn outer() -> (IpAddr, IpAddr) {
        (
            "192.168.0.1".parse().unwrap(),
            "192.168.0.2".parse().unwrap(),
        )
    }

    // 20 bytes of outer IPv4 header are not inspected by decapsulate
    fn l3_with(l4: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; IPV4_HEADER_SIZE];
        packet.extend_from_slice(l4);
        packet
    }

    #[test]
    fn bitmap() {
        let mut bitmap = TunnelTypeBitmap::new(&[TunnelType::Vxlan]);
        assert!(bitmap.has(TunnelType::Vxlan));
        assert!(!bitmap.has(TunnelType::Gre));
        bitmap.add(TunnelType::None);
        bitmap.add(TunnelType::Gre);
        assert_eq!(bitmap.to_string(), "VXLAN GRE");
        assert_eq!(TunnelTypeBitmap::default().to_string(), "none");
    }

    #[test]
    fn vxlan() {
        let l3 = l3_with(&[
            0x30, 0x39, 0x12, 0xb5, 0x00, 0x10, 0x00, 0x00, // udp, dport 4789
            0x08, 0x00, 0x00, 0x00, 0x00, 0x01, 0x23, 0x00, // vxlan, vni 0x123
        ]);
        let (src, dst) = outer();
        let mut info = TunnelInfo::default();
        let r = info.decapsulate(&l3, IPV4_HEADER_SIZE, IpProtocol::Udp, src, dst, &all_types());
        assert_eq!(
            r,
            Some((
                IPV4_HEADER_SIZE + UDP_HEADER_SIZE + VXLAN_HEADER_SIZE,
                EthernetType::TransparentEthernetBridging
            ))
        );
        assert_eq!(info.tunnel_type, TunnelType::Vxlan);
        assert_eq!(info.id, 0x123);
        assert_eq!(info.src, src);
        assert_eq!(info.tier, 1);

        // one tier only
        let r = info.decapsulate(&l3, IPV4_HEADER_SIZE, IpProtocol::Udp, src, dst, &all_types());
        assert_eq!(r, None);
    }

    #[test]
    fn vxlan_disabled_or_invalid() {
        let mut l4 = vec![0x30, 0x39, 0x12, 0xb5, 0x00, 0x10, 0x00, 0x00];
        l4.extend_from_slice(&[0x00, 0, 0, 0, 0, 0, 1, 0]);
        let l3 = l3_with(&l4);
        let (src, dst) = outer();
        let mut info = TunnelInfo::default();
        assert_eq!(
            info.decapsulate(&l3, IPV4_HEADER_SIZE, IpProtocol::Udp, src, dst, &all_types()),
            None
        );
        let bitmap = TunnelTypeBitmap::new(&[TunnelType::Gre]);
        assert_eq!(
            info.decapsulate(&l3, IPV4_HEADER_SIZE, IpProtocol::Udp, src, dst, &bitmap),
            None
        );
        assert_eq!(info, TunnelInfo::default());
    }

    #[test]
    fn geneve_with_options() {
        let l3 = l3_with(&[
            0x30, 0x39, 0x17, 0xc1, 0x00, 0x18, 0x00, 0x00, // udp, dport 6081
            0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x07, 0x00, // 4B options, ipv4, vni 7
            0xaa, 0xbb, 0xcc, 0xdd,
        ]);
        let (src, dst) = outer();
        let mut info = TunnelInfo::default();
        let r = info.decapsulate(&l3, IPV4_HEADER_SIZE, IpProtocol::Udp, src, dst, &all_types());
        assert_eq!(
            r,
            Some((IPV4_HEADER_SIZE + UDP_HEADER_SIZE + 12, EthernetType::Ipv4))
        );
        assert_eq!(info.tunnel_type, TunnelType::Geneve);
        assert_eq!(info.id, 7);
    }

    #[test]
    fn gre_with_checksum_and_key() {
        let l3 = l3_with(&[
            0xa0, 0x00, 0x86, 0xdd, // C and K, ipv6
            0x00, 0x00, 0x00, 0x00, // checksum
            0x00, 0x00, 0x04, 0xd2, // key 1234
        ]);
        let (src, dst) = outer();
        let mut info = TunnelInfo::default();
        let r = info.decapsulate(&l3, IPV4_HEADER_SIZE, IpProtocol::Gre, src, dst, &all_types());
        assert_eq!(r, Some((IPV4_HEADER_SIZE + 12, EthernetType::Ipv6)));
        assert_eq!(info.tunnel_type, TunnelType::Gre);
        assert_eq!(info.id, 1234);
    }

    #[test]
    fn gre_rejects_version_and_truncation() {
        let (src, dst) = outer();
        let mut info = TunnelInfo::default();
        let v1 = l3_with(&[0x20, 0x01, 0x08, 0x00, 0, 0, 0, 1]);
        assert_eq!(
            info.decapsulate(&v1, IPV4_HEADER_SIZE, IpProtocol::Gre, src, dst, &all_types()),
            None
        );
        let short = l3_with(&[0x20, 0x00, 0x08, 0x00, 0, 0]);
        assert_eq!(
            info.decapsulate(&short, IPV4_HEADER_SIZE, IpProtocol::Gre, src, dst, &all_types()),
            None
        );
        let ppp = l3_with(&[0x00, 0x00, 0x88, 0x0b]);
        assert_eq!(
            info.decapsulate(&ppp, IPV4_HEADER_SIZE, IpProtocol::Gre, src, dst, &all_types()),
            None
        );
    }

    #[test]
    fn ip_in_ip() {
        let l3 = l3_with(&[0x45]);
        let (src, dst) = outer();
        let mut info = TunnelInfo::default();
        let r = info.decapsulate(&l3, IPV4_HEADER_SIZE, IpProtocol::Ipv4, src, dst, &all_types());
        assert_eq!(r, Some((IPV4_HEADER_SIZE, EthernetType::Ipv4)));
        assert_eq!(info.tunnel_type, TunnelType::Ipip);
        assert_eq!(info.id, 0);
    }
}
