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
use std::mem::swap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use super::decapsulate::TunnelType;
use super::enums::{EthernetType, IpProtocol};

// The addresses and ports of a packet as observed on the wire, after any
// tunnel has been stripped. FlowKey is derived from it by normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupKey {
    pub timestamp: Duration,
    pub eth_type: EthernetType,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    // raw protocol number, unknown protocols keep their value
    pub proto: u8,
    pub vlan: u16,
    pub tunnel_type: TunnelType,
    pub tunnel_id: u32,
}

impl Default for LookupKey {
    fn default() -> Self {
        LookupKey {
            timestamp: Duration::ZERO,
            eth_type: Default::default(),
            src_ip: Ipv4Addr::UNSPECIFIED.into(),
            dst_ip: Ipv4Addr::UNSPECIFIED.into(),
            src_port: 0,
            dst_port: 0,
            proto: 0,
            vlan: 0,
            tunnel_type: TunnelType::None,
            tunnel_id: 0,
        }
    }
}

impl LookupKey {
    pub fn reverse(&mut self) {
        swap(&mut self.src_ip, &mut self.dst_ip);
        swap(&mut self.src_port, &mut self.dst_port);
    }

    pub fn ip_protocol(&self) -> IpProtocol {
        IpProtocol::from(self.proto)
    }

    pub fn is_tcp(&self) -> bool {
        self.ip_protocol() == IpProtocol::Tcp
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.src_ip {
            IpAddr::V4(_) => write!(
                f,
                "{}:{} > {}:{}",
                self.src_ip, self.src_port, self.dst_ip, self.dst_port
            )?,
            IpAddr::V6(_) => write!(
                f,
                "[{}]:{} > [{}]:{}",
                self.src_ip, self.src_port, self.dst_ip, self.dst_port
            )?,
        }
        write!(f, " proto: {}", self.proto)?;
        if self.vlan != 0 {
            write!(f, " vlan: {}", self.vlan)?;
        }
        if self.tunnel_type != TunnelType::None {
            write!(f, " tunnel: {:?} {}", self.tunnel_type, self.tunnel_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_swaps_endpoints() {
        let mut key = LookupKey {
            src_ip: "10.0.0.1".parse().unwrap(),
            dst_ip: "10.0.0.2".parse().unwrap(),
            src_port: 1234,
            dst_port: 80,
            proto: 6,
            ..Default::default()
        };
        key.reverse();
        assert_eq!(key.src_ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(key.src_port, 80);
        assert_eq!(key.dst_port, 1234);
        assert!(key.is_tcp());
    }

    #[test]
    fn display() {
        let key = LookupKey {
            src_ip: "::1".parse().unwrap(),
            dst_ip: "::2".parse().unwrap(),
            src_port: 53,
            dst_port: 5353,
            proto: 17,
            vlan: 10,
            ..Default::default()
        };
        assert_eq!(key.to_string(), "[::1]:53 > [::2]:5353 proto: 17 vlan: 10");
    }
}
