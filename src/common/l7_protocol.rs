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

use num_enum::{FromPrimitive, IntoPrimitive};

use super::enums::IpProtocol;

// Ids of the built-in protocols follow the numbering used by nDPI so that
// exported records stay comparable with other tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum BuiltinProtocol {
    #[num_enum(default)]
    Unknown = 0,
    Ftp = 1,
    Pop3 = 2,
    Smtp = 3,
    Imap = 4,
    Dns = 5,
    Http = 7,
    Mdns = 8,
    Ntp = 9,
    Bgp = 13,
    Snmp = 14,
    Dhcp = 18,
    PostgreSql = 19,
    MySql = 20,
    Icmp = 81,
    Rdp = 88,
    Tls = 91,
    Ssh = 92,
    Icmpv6 = 102,
    Redis = 182,
    Quic = 188,
    Mqtt = 222,
}

impl BuiltinProtocol {
    pub const ALL: [BuiltinProtocol; 22] = [
        BuiltinProtocol::Unknown,
        BuiltinProtocol::Ftp,
        BuiltinProtocol::Pop3,
        BuiltinProtocol::Smtp,
        BuiltinProtocol::Imap,
        BuiltinProtocol::Dns,
        BuiltinProtocol::Http,
        BuiltinProtocol::Mdns,
        BuiltinProtocol::Ntp,
        BuiltinProtocol::Bgp,
        BuiltinProtocol::Snmp,
        BuiltinProtocol::Dhcp,
        BuiltinProtocol::PostgreSql,
        BuiltinProtocol::MySql,
        BuiltinProtocol::Icmp,
        BuiltinProtocol::Rdp,
        BuiltinProtocol::Tls,
        BuiltinProtocol::Ssh,
        BuiltinProtocol::Icmpv6,
        BuiltinProtocol::Redis,
        BuiltinProtocol::Quic,
        BuiltinProtocol::Mqtt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinProtocol::Unknown => "Unknown",
            BuiltinProtocol::Ftp => "FTP_CONTROL",
            BuiltinProtocol::Pop3 => "POP3",
            BuiltinProtocol::Smtp => "SMTP",
            BuiltinProtocol::Imap => "IMAP",
            BuiltinProtocol::Dns => "DNS",
            BuiltinProtocol::Http => "HTTP",
            BuiltinProtocol::Mdns => "MDNS",
            BuiltinProtocol::Ntp => "NTP",
            BuiltinProtocol::Bgp => "BGP",
            BuiltinProtocol::Snmp => "SNMP",
            BuiltinProtocol::Dhcp => "DHCP",
            BuiltinProtocol::PostgreSql => "PostgreSQL",
            BuiltinProtocol::MySql => "MySQL",
            BuiltinProtocol::Icmp => "ICMP",
            BuiltinProtocol::Rdp => "RDP",
            BuiltinProtocol::Tls => "TLS",
            BuiltinProtocol::Ssh => "SSH",
            BuiltinProtocol::Icmpv6 => "ICMPV6",
            BuiltinProtocol::Redis => "Redis",
            BuiltinProtocol::Quic => "QUIC",
            BuiltinProtocol::Mqtt => "MQTT",
        }
    }

    pub fn default_category(self) -> Category {
        match self {
            BuiltinProtocol::Unknown => Category::UNSPECIFIED,
            BuiltinProtocol::Ftp => Category::DATA_TRANSFER,
            BuiltinProtocol::Pop3 | BuiltinProtocol::Smtp | BuiltinProtocol::Imap => {
                Category::EMAIL
            }
            BuiltinProtocol::Http | BuiltinProtocol::Tls | BuiltinProtocol::Quic => Category::WEB,
            BuiltinProtocol::Ntp => Category::SYSTEM,
            BuiltinProtocol::PostgreSql | BuiltinProtocol::MySql | BuiltinProtocol::Redis => {
                Category::DATABASE
            }
            BuiltinProtocol::Rdp | BuiltinProtocol::Ssh => Category::REMOTE_ACCESS,
            BuiltinProtocol::Mqtt => Category::RPC,
            BuiltinProtocol::Dns
            | BuiltinProtocol::Mdns
            | BuiltinProtocol::Bgp
            | BuiltinProtocol::Snmp
            | BuiltinProtocol::Dhcp
            | BuiltinProtocol::Icmp
            | BuiltinProtocol::Icmpv6 => Category::NETWORK,
        }
    }

    // Well-known ports, the weakest evidence for a protocol.
    pub fn guess_by_port(protocol: IpProtocol, port: u16) -> Option<BuiltinProtocol> {
        let guess = match (protocol, port) {
            (IpProtocol::Tcp, 21) => BuiltinProtocol::Ftp,
            (IpProtocol::Tcp, 110) => BuiltinProtocol::Pop3,
            (IpProtocol::Tcp, 25 | 587) => BuiltinProtocol::Smtp,
            (IpProtocol::Tcp, 143) => BuiltinProtocol::Imap,
            (IpProtocol::Tcp | IpProtocol::Udp, 53) => BuiltinProtocol::Dns,
            (IpProtocol::Tcp, 80 | 8080) => BuiltinProtocol::Http,
            (IpProtocol::Udp, 5353) => BuiltinProtocol::Mdns,
            (IpProtocol::Udp, 123) => BuiltinProtocol::Ntp,
            (IpProtocol::Tcp, 179) => BuiltinProtocol::Bgp,
            (IpProtocol::Udp, 161 | 162) => BuiltinProtocol::Snmp,
            (IpProtocol::Udp, 67 | 68) => BuiltinProtocol::Dhcp,
            (IpProtocol::Tcp, 5432) => BuiltinProtocol::PostgreSql,
            (IpProtocol::Tcp, 3306) => BuiltinProtocol::MySql,
            (IpProtocol::Tcp, 3389) => BuiltinProtocol::Rdp,
            (IpProtocol::Tcp, 443) => BuiltinProtocol::Tls,
            (IpProtocol::Tcp, 22) => BuiltinProtocol::Ssh,
            (IpProtocol::Tcp, 6379) => BuiltinProtocol::Redis,
            (IpProtocol::Udp, 443) => BuiltinProtocol::Quic,
            (IpProtocol::Tcp, 1883) => BuiltinProtocol::Mqtt,
            _ => return None,
        };
        Some(guess)
    }
}

impl fmt::Display for BuiltinProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// Protocol ids assigned to custom protocols start here.
pub const CUSTOM_PROTOCOL_ID_START: u16 = 1024;

// The (master, app) pair reported for a flow, e.g. TLS carrying a custom
// application. `app` is Unknown when only the master is known.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct L7Protocol {
    pub master: u16,
    pub app: u16,
}

impl L7Protocol {
    pub const UNKNOWN: L7Protocol = L7Protocol { master: 0, app: 0 };

    pub fn new(master: u16, app: u16) -> Self {
        Self { master, app }
    }

    pub fn is_unknown(&self) -> bool {
        self.master == 0 && self.app == 0
    }

    // the most specific id known
    pub fn id(&self) -> u16 {
        if self.app != 0 {
            self.app
        } else {
            self.master
        }
    }
}

impl From<BuiltinProtocol> for L7Protocol {
    fn from(p: BuiltinProtocol) -> Self {
        Self {
            master: p.into(),
            app: 0,
        }
    }
}

// Category ids also follow nDPI.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(pub u16);

impl Category {
    pub const UNSPECIFIED: Category = Category(0);
    pub const MEDIA: Category = Category(1);
    pub const VPN: Category = Category(2);
    pub const EMAIL: Category = Category(3);
    pub const DATA_TRANSFER: Category = Category(4);
    pub const WEB: Category = Category(5);
    pub const SOCIAL_NETWORK: Category = Category(6);
    pub const DOWNLOAD: Category = Category(7);
    pub const GAME: Category = Category(8);
    pub const CHAT: Category = Category(9);
    pub const VOIP: Category = Category(10);
    pub const DATABASE: Category = Category(11);
    pub const REMOTE_ACCESS: Category = Category(12);
    pub const CLOUD: Category = Category(13);
    pub const NETWORK: Category = Category(14);
    pub const COLLABORATIVE: Category = Category(15);
    pub const RPC: Category = Category(16);
    pub const STREAMING: Category = Category(17);
    pub const SYSTEM: Category = Category(18);
    pub const SW_UPDATE: Category = Category(19);
    pub const MINING: Category = Category(99);
    pub const MALWARE: Category = Category(100);
    pub const ADVERTISEMENT: Category = Category(101);

    const NAMES: [(&'static str, Category); 23] = [
        ("Unspecified", Category::UNSPECIFIED),
        ("Media", Category::MEDIA),
        ("VPN", Category::VPN),
        ("Email", Category::EMAIL),
        ("DataTransfer", Category::DATA_TRANSFER),
        ("Web", Category::WEB),
        ("SocialNetwork", Category::SOCIAL_NETWORK),
        ("Download", Category::DOWNLOAD),
        ("Game", Category::GAME),
        ("Chat", Category::CHAT),
        ("VoIP", Category::VOIP),
        ("Database", Category::DATABASE),
        ("RemoteAccess", Category::REMOTE_ACCESS),
        ("Cloud", Category::CLOUD),
        ("Network", Category::NETWORK),
        ("Collaborative", Category::COLLABORATIVE),
        ("RPC", Category::RPC),
        ("Streaming", Category::STREAMING),
        ("System", Category::SYSTEM),
        ("SoftwareUpdate", Category::SW_UPDATE),
        ("Mining", Category::MINING),
        ("Malware", Category::MALWARE),
        ("Advertisement", Category::ADVERTISEMENT),
    ];

    // case-insensitive
    pub fn from_name(name: &str) -> Option<Category> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, c)| *c)
    }

    pub fn name(&self) -> Option<&'static str> {
        Self::NAMES.iter().find(|(_, c)| c == self).map(|(n, _)| *n)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_round_trip() {
        for p in BuiltinProtocol::ALL {
            assert_eq!(BuiltinProtocol::from(u16::from(p)), p);
        }
        assert_eq!(BuiltinProtocol::from(6u16), BuiltinProtocol::Unknown);
    }

    #[test]
    fn port_guess() {
        assert_eq!(
            BuiltinProtocol::guess_by_port(IpProtocol::Udp, 53),
            Some(BuiltinProtocol::Dns)
        );
        assert_eq!(
            BuiltinProtocol::guess_by_port(IpProtocol::Udp, 443),
            Some(BuiltinProtocol::Quic)
        );
        assert_eq!(BuiltinProtocol::guess_by_port(IpProtocol::Udp, 80), None);
    }

    #[test]
    fn category_names() {
        assert_eq!(Category::from_name("mining"), Some(Category::MINING));
        assert_eq!(Category::from_name("VoIP"), Some(Category(10)));
        assert_eq!(Category::from_name("nope"), None);
        assert_eq!(Category::WEB.name(), Some("Web"));
        assert_eq!(Category(42).name(), None);
    }

    #[test]
    fn l7_protocol_id() {
        let p = L7Protocol::new(91, 1024);
        assert_eq!(p.id(), 1024);
        assert_eq!(L7Protocol::from(BuiltinProtocol::Dns).id(), 5);
        assert!(L7Protocol::UNKNOWN.is_unknown());
    }
}
