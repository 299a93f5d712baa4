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

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use ipnet::IpNet;
use log::{debug, info};

use crate::common::{
    enums::IpProtocol,
    flow::Flow,
    l7_protocol::{BuiltinProtocol, Category, L7Protocol, CUSTOM_PROTOCOL_ID_START},
};
use crate::config::{read_file, ConfigError};
use public::bytes::{get_u16_be, get_u8};

// How much a Detection can be trusted, weakest first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    #[default]
    Unknown,
    // well-known port only
    Port,
    // implied by the ip protocol, e.g. ICMP
    Protocol,
    // a custom address rule matched
    Address,
    // a custom port or host rule matched
    Custom,
    // recognised from the payload
    Payload,
}

impl Confidence {
    // anything stronger than a port guess ends classification
    pub fn is_confident(&self) -> bool {
        *self > Confidence::Port
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub protocol: L7Protocol,
    pub category: Category,
    pub confidence: Confidence,
    // `category` comes from the category map, not the protocol default
    pub category_matched: bool,
}

impl Detection {
    pub const UNKNOWN: Detection = Detection {
        protocol: L7Protocol::UNKNOWN,
        category: Category::UNSPECIFIED,
        confidence: Confidence::Unknown,
        category_matched: false,
    };
}

// Called for packets of flows still being classified. `payload` may be
// empty, e.g. for a bare SYN.
pub trait ProtocolIdentifier {
    fn identify(&mut self, flow: &Flow, payload: &[u8]) -> Detection;
}

// Protocol names and ids, built-in ones plus those declared in a custom
// protocols file.
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    names: HashMap<u16, String>,
    ids: HashMap<String, u16>,
    next_custom_id: u16,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        let mut registry = Self {
            names: HashMap::new(),
            ids: HashMap::new(),
            next_custom_id: CUSTOM_PROTOCOL_ID_START,
        };
        for p in BuiltinProtocol::ALL {
            registry.insert(p.into(), p.name());
        }
        registry
    }
}

impl ProtocolRegistry {
    fn insert(&mut self, id: u16, name: &str) {
        self.names.insert(id, name.to_owned());
        self.ids.insert(name.to_ascii_lowercase(), id);
    }

    // case-insensitive
    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.ids.get(&name.to_ascii_lowercase()).copied()
    }

    // Returns the id of `name`, assigning a new custom id if it is unknown.
    pub fn register(&mut self, name: &str) -> u16 {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        let id = self.next_custom_id;
        self.next_custom_id += 1;
        self.insert(id, name);
        id
    }

    pub fn name(&self, id: u16) -> &str {
        self.names.get(&id).map(|s| s.as_str()).unwrap_or("Unknown")
    }

    // "TLS", or "TLS.Custom" when an application runs over a known protocol
    pub fn protocol_name(&self, protocol: &L7Protocol) -> String {
        if protocol.master != 0 && protocol.app != 0 && protocol.master != protocol.app {
            format!("{}.{}", self.name(protocol.master), self.name(protocol.app))
        } else {
            self.name(protocol.id()).to_owned()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PortRule {
    protocol: IpProtocol,
    start: u16,
    end: u16,
    id: u16,
}

// User defined protocols, one rule per line:
//
//   tcp:81,tcp:8181@HTTP
//   udp:5061-5062@CustomSIP
//   host:"example.com"@Example
//   ip:192.0.2.0/24@Lab
#[derive(Debug, Default, Clone)]
pub struct CustomProtocols {
    ports: Vec<PortRule>,
    hosts: Vec<(String, u16)>,
    networks: Vec<(IpNet, u16)>,
}

impl CustomProtocols {
    pub fn load_from_file<T: AsRef<Path>>(
        path: T,
        registry: &mut ProtocolRegistry,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = read_file(path)?;
        let custom = Self::load(&contents, &path.display().to_string(), registry)?;
        info!(
            "loaded {} port, {} host and {} address rules from {}",
            custom.ports.len(),
            custom.hosts.len(),
            custom.networks.len(),
            path.display()
        );
        Ok(custom)
    }

    pub fn load(
        contents: &str,
        source: &str,
        registry: &mut ProtocolRegistry,
    ) -> Result<Self, ConfigError> {
        let mut custom = Self::default();
        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |reason: String| ConfigError::InvalidLine {
                path: source.to_owned(),
                line: i + 1,
                reason,
            };
            let Some((rules, name)) = line.rsplit_once('@') else {
                return Err(invalid("missing @<protocol name>".to_owned()));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid("empty protocol name".to_owned()));
            }
            let id = registry.register(name);
            for rule in rules.split(',').map(str::trim) {
                custom.parse_rule(rule, id).map_err(invalid)?;
            }
        }
        Ok(custom)
    }

    fn parse_rule(&mut self, rule: &str, id: u16) -> Result<(), String> {
        let Some((kind, value)) = rule.split_once(':') else {
            return Err(format!("invalid rule '{}'", rule));
        };
        match kind.trim().to_ascii_lowercase().as_str() {
            "tcp" | "udp" => {
                let protocol = if kind.trim().eq_ignore_ascii_case("tcp") {
                    IpProtocol::Tcp
                } else {
                    IpProtocol::Udp
                };
                let (start, end) = parse_port_range(value.trim())
                    .ok_or_else(|| format!("invalid port range '{}'", value))?;
                self.ports.push(PortRule {
                    protocol,
                    start,
                    end,
                    id,
                });
            }
            "host" => {
                let host = value.trim().trim_matches('"').to_ascii_lowercase();
                if host.is_empty() {
                    return Err("empty host".to_owned());
                }
                self.hosts.push((host, id));
            }
            "ip" | "ipv6" => {
                let network = parse_network(value.trim())
                    .ok_or_else(|| format!("invalid address '{}'", value))?;
                self.networks.push((network, id));
            }
            other => return Err(format!("unknown rule type '{}'", other)),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty() && self.hosts.is_empty() && self.networks.is_empty()
    }

    fn match_port(&self, protocol: IpProtocol, port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|r| r.protocol == protocol && r.start <= port && port <= r.end)
            .map(|r| r.id)
    }

    fn match_host(&self, host: &str) -> Option<u16> {
        self.hosts
            .iter()
            .find(|(h, _)| host.contains(h.as_str()))
            .map(|(_, id)| *id)
    }

    fn match_address(&self, addr: &IpAddr) -> Option<u16> {
        longest_match(&self.networks, addr)
    }
}

fn parse_port_range(s: &str) -> Option<(u16, u16)> {
    match s.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (start.trim().parse().ok()?, end.trim().parse().ok()?);
            (start <= end).then_some((start, end))
        }
        None => s.parse().ok().map(|p| (p, p)),
    }
}

fn parse_network(s: &str) -> Option<IpNet> {
    s.parse::<IpNet>()
        .ok()
        .or_else(|| s.parse::<IpAddr>().ok().map(IpNet::from))
}

fn longest_match<T: Copy>(networks: &[(IpNet, T)], addr: &IpAddr) -> Option<T> {
    networks
        .iter()
        .filter(|(n, _)| n.contains(addr))
        .max_by_key(|(n, _)| n.prefix_len())
        .map(|(_, v)| *v)
}

// Category overrides, one per line: an address, a network or a host name
// followed by a category id or name.
//
//   192.0.2.7       Mining
//   198.51.100.0/24 100
//   ads.example.com Advertisement
#[derive(Debug, Default, Clone)]
pub struct CategoryMap {
    networks: Vec<(IpNet, Category)>,
    hosts: Vec<(String, Category)>,
}

impl CategoryMap {
    pub fn load_from_file<T: AsRef<Path>>(path: T) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = read_file(path)?;
        let map = Self::load(&contents, &path.display().to_string())?;
        info!(
            "loaded {} address and {} host categories from {}",
            map.networks.len(),
            map.hosts.len(),
            path.display()
        );
        Ok(map)
    }

    pub fn load(contents: &str, source: &str) -> Result<Self, ConfigError> {
        let mut map = Self::default();
        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |reason: String| ConfigError::InvalidLine {
                path: source.to_owned(),
                line: i + 1,
                reason,
            };
            let mut fields = line.split_whitespace();
            let (Some(target), Some(category), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(invalid("expected '<address|host> <category>'".to_owned()));
            };
            let category = match category.parse::<u16>() {
                Ok(id) => Category(id),
                Err(_) => Category::from_name(category)
                    .ok_or_else(|| invalid(format!("unknown category '{}'", category)))?,
            };
            match parse_network(target) {
                Some(network) => map.networks.push((network, category)),
                None => map.hosts.push((target.to_ascii_lowercase(), category)),
            }
        }
        Ok(map)
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty() && self.hosts.is_empty()
    }

    pub fn has_hosts(&self) -> bool {
        !self.hosts.is_empty()
    }

    pub fn match_address(&self, addr: &IpAddr) -> Option<Category> {
        longest_match(&self.networks, addr)
    }

    // `host` matches an entry equal to it or one of its parent domains
    pub fn match_host(&self, host: &str) -> Option<Category> {
        self.hosts
            .iter()
            .find(|(h, _)| {
                host == h
                    || host
                        .strip_suffix(h.as_str())
                        .map_or(false, |prefix| prefix.ends_with('.'))
            })
            .map(|(_, c)| *c)
    }
}

const TLS_HANDSHAKE: u8 = 22;
const TLS_CLIENT_HELLO: u8 = 1;
const TLS_EXT_SERVER_NAME: u16 = 0;

// Host name announced by a client, from an HTTP/1.x request Host header or
// the SNI of a TLS ClientHello. Lowercase.
pub fn extract_host(payload: &[u8]) -> Option<String> {
    http_host(payload).or_else(|| tls_server_name(payload))
}

fn http_host(payload: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(payload.get(..payload.len().min(2048))?).ok()?;
    let mut lines = text.split("\r\n");
    if !lines.next()?.contains(" HTTP/1.") {
        return None;
    }
    lines
        .take_while(|l| !l.is_empty())
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("host")
                .then(|| value.trim())
        })
        .map(|host| {
            // strip the port
            match host.rsplit_once(':') {
                Some((h, port)) if port.bytes().all(|b| b.is_ascii_digit()) => h,
                _ => host,
            }
            .to_ascii_lowercase()
        })
}

fn tls_server_name(payload: &[u8]) -> Option<String> {
    if get_u8(payload, 0)? != TLS_HANDSHAKE || get_u8(payload, 5)? != TLS_CLIENT_HELLO {
        return None;
    }
    // record header 5, handshake header 4, version 2, random 32
    let mut offset = 5 + 4 + 2 + 32;
    offset += 1 + get_u8(payload, offset)? as usize; // session id
    offset += 2 + get_u16_be(payload, offset)? as usize; // cipher suites
    offset += 1 + get_u8(payload, offset)? as usize; // compression methods
    let extensions_end = offset + 2 + get_u16_be(payload, offset)? as usize;
    offset += 2;
    while offset + 4 <= extensions_end {
        let ext_type = get_u16_be(payload, offset)?;
        let ext_len = get_u16_be(payload, offset + 2)? as usize;
        offset += 4;
        if ext_type == TLS_EXT_SERVER_NAME {
            // list length 2, name type 1, name length 2
            let name_len = get_u16_be(payload, offset + 3)? as usize;
            let name = payload.get(offset + 5..offset + 5 + name_len)?;
            return std::str::from_utf8(name).ok().map(|s| s.to_ascii_lowercase());
        }
        offset += ext_len;
    }
    None
}

// Identification from user rules and well-known ports. Never inspects the
// payload beyond the announced host name.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedIdentifier {
    custom: CustomProtocols,
    categories: CategoryMap,
}

impl RuleBasedIdentifier {
    pub fn new(custom: CustomProtocols, categories: CategoryMap) -> Self {
        Self { custom, categories }
    }

    fn port_guess(flow: &Flow, protocol: IpProtocol) -> Option<BuiltinProtocol> {
        let (_, client_port) = flow.client();
        let (_, server_port) = flow.server();
        BuiltinProtocol::guess_by_port(protocol, server_port)
            .or_else(|| BuiltinProtocol::guess_by_port(protocol, client_port))
    }

    fn custom_port(&self, flow: &Flow, protocol: IpProtocol) -> Option<u16> {
        let (_, client_port) = flow.client();
        let (_, server_port) = flow.server();
        self.custom
            .match_port(protocol, server_port)
            .or_else(|| self.custom.match_port(protocol, client_port))
    }

    fn custom_address(&self, flow: &Flow) -> Option<u16> {
        let (client, _) = flow.client();
        let (server, _) = flow.server();
        self.custom
            .match_address(&server)
            .or_else(|| self.custom.match_address(&client))
    }

    // The bool is set when the category map matched.
    fn category(
        &self,
        flow: &Flow,
        host: Option<&str>,
        protocol: &L7Protocol,
    ) -> (Category, bool) {
        let (client, _) = flow.client();
        let (server, _) = flow.server();
        match self
            .categories
            .match_address(&server)
            .or_else(|| self.categories.match_address(&client))
            .or_else(|| host.and_then(|h| self.categories.match_host(h)))
        {
            Some(category) => (category, true),
            None => (BuiltinProtocol::from(protocol.master).default_category(), false),
        }
    }
}

impl ProtocolIdentifier for RuleBasedIdentifier {
    fn identify(&mut self, flow: &Flow, payload: &[u8]) -> Detection {
        let protocol = IpProtocol::from(flow.flow_key.proto);
        let master = Self::port_guess(flow, protocol).map_or(0, u16::from);
        let host = if !payload.is_empty()
            && (!self.custom.hosts.is_empty() || self.categories.has_hosts())
        {
            extract_host(payload)
        } else {
            None
        };

        let (l7_protocol, confidence) = if let Some(id) = self.custom_address(flow) {
            (L7Protocol::new(master, id), Confidence::Address)
        } else if let Some(id) = host.as_deref().and_then(|h| self.custom.match_host(h)) {
            (L7Protocol::new(master, id), Confidence::Custom)
        } else if let Some(id) = self.custom_port(flow, protocol) {
            (L7Protocol::new(id, 0), Confidence::Custom)
        } else {
            match protocol {
                IpProtocol::Icmpv4 => (BuiltinProtocol::Icmp.into(), Confidence::Protocol),
                IpProtocol::Icmpv6 => (BuiltinProtocol::Icmpv6.into(), Confidence::Protocol),
                _ if master != 0 => (L7Protocol::new(master, 0), Confidence::Port),
                _ => (L7Protocol::UNKNOWN, Confidence::Unknown),
            }
        };
        if let Some(h) = host.as_deref() {
            debug!("flow {} announced host {}", flow.flow_id, h);
        }
        let (category, category_matched) = self.category(flow, host.as_deref(), &l7_protocol);
        Detection {
            protocol: l7_protocol,
            category,
            confidence,
            category_matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    use crate::common::{flow::FlowKey, lookup_key::LookupKey};

    fn flow(src: &str, sport: u16, dst: &str, dport: u16, proto: u8) -> Flow {
        let (key, reversed) = FlowKey::new(&LookupKey {
            src_ip: src.parse().unwrap(),
            dst_ip: dst.parse().unwrap(),
            src_port: sport,
            dst_port: dport,
            proto,
            ..Default::default()
        });
        Flow::new(1, key, reversed)
    }

    fn client_hello(server_name: &str) -> Vec<u8> {
        let name = server_name.as_bytes();
        let mut sni = vec![];
        sni.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
        sni.push(0);
        sni.extend_from_slice(&(name.len() as u16).to_be_bytes());
        sni.extend_from_slice(name);
        let mut extensions = vec![0x00, 0x0b, 0x00, 0x02, 0x01, 0x00]; // ec point formats
        extensions.extend_from_slice(&TLS_EXT_SERVER_NAME.to_be_bytes());
        extensions.extend_from_slice(&(sni.len() as u16).to_be_bytes());
        extensions.extend_from_slice(&sni);

        let mut hello = vec![0x03, 0x03];
        hello.extend_from_slice(&[0u8; 32]);
        hello.push(0); // session id
        hello.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]);
        hello.extend_from_slice(&[0x01, 0x00]);
        hello.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        hello.extend_from_slice(&extensions);

        let mut handshake = vec![TLS_CLIENT_HELLO, 0];
        handshake.extend_from_slice(&(hello.len() as u16).to_be_bytes());
        handshake.extend_from_slice(&hello);
        let mut record = vec![TLS_HANDSHAKE, 0x03, 0x01];
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    #[test]
    fn registry() {
        let mut registry = ProtocolRegistry::default();
        assert_eq!(registry.lookup("tls"), Some(91));
        assert_eq!(registry.register("HTTP"), 7);
        let id = registry.register("Corp");
        assert_eq!(id, CUSTOM_PROTOCOL_ID_START);
        assert_eq!(registry.register("corp"), id);
        assert_eq!(registry.register("Other"), id + 1);
        assert_eq!(registry.protocol_name(&L7Protocol::new(91, id)), "TLS.Corp");
        assert_eq!(registry.protocol_name(&L7Protocol::new(id, 0)), "Corp");
        assert_eq!(registry.protocol_name(&L7Protocol::UNKNOWN), "Unknown");
        assert_eq!(registry.name(999), "Unknown");
    }

    #[test]
    fn custom_protocols_file() {
        let mut registry = ProtocolRegistry::default();
        let custom = CustomProtocols::load(
            "# comment\n\
             tcp:81,tcp:8181@HTTP\n\
             udp:5061-5062@CustomSIP\n\
             host:\"example.com\"@Example\n\
             ip:192.0.2.0/24@Lab\n\
             ip:192.0.2.7@Printer\n",
            "protos.txt",
            &mut registry,
        )
        .unwrap();
        assert_eq!(custom.match_port(IpProtocol::Tcp, 8181), Some(7));
        assert_eq!(custom.match_port(IpProtocol::Udp, 81), None);
        let sip = registry.lookup("customsip").unwrap();
        assert_eq!(custom.match_port(IpProtocol::Udp, 5062), Some(sip));
        assert_eq!(
            custom.match_host("www.example.com"),
            registry.lookup("Example")
        );
        assert_eq!(
            custom.match_address(&"192.0.2.7".parse().unwrap()),
            registry.lookup("Printer")
        );
        assert_eq!(
            custom.match_address(&"192.0.2.8".parse().unwrap()),
            registry.lookup("Lab")
        );
    }

    #[test]
    fn custom_protocols_errors() {
        let mut registry = ProtocolRegistry::default();
        for (contents, line) in [
            ("tcp:80", 1),
            ("\ntcp:99999@X", 2),
            ("tcp:90-80@X", 1),
            ("foo:1@X", 1),
            ("ip:not-an-ip@X", 1),
            ("tcp:80@ ", 1),
        ] {
            match CustomProtocols::load(contents, "p", &mut registry) {
                Err(ConfigError::InvalidLine { line: l, .. }) => assert_eq!(l, line, "{}", contents),
                other => panic!("{:?} for {}", other.map(|c| c.is_empty()), contents),
            }
        }
    }

    #[test]
    fn category_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# mining hosts").unwrap();
        writeln!(file, "192.0.2.7 Mining").unwrap();
        writeln!(file, "198.51.100.0/24\t100").unwrap();
        writeln!(file, "ads.example.com Advertisement").unwrap();
        let map = CategoryMap::load_from_file(file.path()).unwrap();
        assert_eq!(
            map.match_address(&"192.0.2.7".parse().unwrap()),
            Some(Category::MINING)
        );
        assert_eq!(
            map.match_address(&"198.51.100.20".parse().unwrap()),
            Some(Category::MALWARE)
        );
        assert_eq!(
            map.match_host("cdn.ads.example.com"),
            Some(Category::ADVERTISEMENT)
        );
        assert_eq!(map.match_host("badads.example.com"), None);

        assert!(matches!(
            CategoryMap::load("192.0.2.1", "c"),
            Err(ConfigError::InvalidLine { line: 1, .. })
        ));
        assert!(matches!(
            CategoryMap::load("192.0.2.1 Nonsense", "c"),
            Err(ConfigError::InvalidLine { .. })
        ));
        assert!(matches!(
            CategoryMap::load_from_file("/nonexistent/categories.txt"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn host_extraction() {
        assert_eq!(
            extract_host(b"GET / HTTP/1.1\r\nUser-Agent: x\r\nHost: WWW.Example.com:8080\r\n\r\n"),
            Some("www.example.com".to_owned())
        );
        assert_eq!(extract_host(b"HTTP/1.1 200 OK\r\nHost: a\r\n\r\n"), None);
        assert_eq!(
            extract_host(&client_hello("api.example.org")),
            Some("api.example.org".to_owned())
        );
        let hello = client_hello("api.example.org");
        assert_eq!(extract_host(&hello[..hello.len() - 4]), None);
        assert_eq!(extract_host(&[]), None);
    }

    #[test]
    fn identify_by_port_is_not_confident() {
        let mut identifier = RuleBasedIdentifier::default();
        let d = identifier.identify(&flow("10.0.0.1", 50000, "10.0.0.2", 443, 6), b"");
        assert_eq!(d.protocol, BuiltinProtocol::Tls.into());
        assert_eq!(d.confidence, Confidence::Port);
        assert!(!d.confidence.is_confident());
        assert_eq!(d.category, Category::WEB);
        assert!(!d.category_matched);

        let d = identifier.identify(&flow("10.0.0.1", 50000, "10.0.0.2", 9999, 6), b"");
        assert_eq!(d, Detection::UNKNOWN);

        let d = identifier.identify(&flow("10.0.0.1", 0, "10.0.0.2", 0, 1), b"");
        assert_eq!(d.protocol, BuiltinProtocol::Icmp.into());
        assert!(d.confidence.is_confident());
    }

    #[test]
    fn identify_by_rules() {
        let mut registry = ProtocolRegistry::default();
        let custom = CustomProtocols::load(
            "host:\"example.com\"@Example\nip:192.0.2.0/24@Lab\ntcp:7000@Game\n",
            "p",
            &mut registry,
        )
        .unwrap();
        let categories = CategoryMap::load("example.com Media\n", "c").unwrap();
        let mut identifier = RuleBasedIdentifier::new(custom, categories);

        let f = flow("10.0.0.1", 50000, "10.0.0.2", 443, 6);
        let d = identifier.identify(&f, &client_hello("video.example.com"));
        assert_eq!(d.confidence, Confidence::Custom);
        assert_eq!(registry.protocol_name(&d.protocol), "TLS.Example");
        assert_eq!(d.category, Category::MEDIA);
        assert!(d.category_matched);

        let d = identifier.identify(&flow("192.0.2.10", 22, "10.0.0.2", 40000, 6), b"");
        assert_eq!(d.confidence, Confidence::Address);
        assert_eq!(registry.protocol_name(&d.protocol), "SSH.Lab");

        let d = identifier.identify(&flow("10.0.0.1", 40000, "10.0.0.2", 7000, 6), b"");
        assert_eq!(registry.protocol_name(&d.protocol), "Game");
        assert_eq!(d.category, Category::UNSPECIFIED);
    }
}
