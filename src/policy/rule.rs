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
use std::path::Path;

use log::info;
use serde::Deserialize;

use super::Action;
use crate::common::{enums::IpProtocol, flow::Flow};
use crate::config::{read_file, ConfigError};
use crate::flow_generator::ProtocolRegistry;

// Decides the action for each packet of a tracked flow. Called after the
// flow has been updated with the packet.
pub trait FlowFilter {
    fn check(&self, flow: &Flow) -> Action;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum L4Protocol {
    Tcp,
    Udp,
}

impl From<L4Protocol> for IpProtocol {
    fn from(p: L4Protocol) -> Self {
        match p {
            L4Protocol::Tcp => IpProtocol::Tcp,
            L4Protocol::Udp => IpProtocol::Udp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FilterEntry {
    protocol: Option<String>,
    l4_protocol: Option<L4Protocol>,
    port: Option<u16>,
    action: Action,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct ShuntEntry {
    default: u64,
    tcp: u64,
    udp: u64,
    protocols: HashMap<String, u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct RulesFile {
    filter: Vec<FilterEntry>,
    shunt: ShuntEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FilterRule {
    protocol: Option<u16>,
    l4_protocol: Option<IpProtocol>,
    port: Option<u16>,
    action: Action,
}

impl FilterRule {
    fn matches(&self, flow: &Flow) -> bool {
        if let Some(id) = self.protocol {
            let p = &flow.l7_protocol;
            if p.master != id && p.app != id {
                return false;
            }
        }
        if let Some(l4) = self.l4_protocol {
            if IpProtocol::from(flow.flow_key.proto) != l4 {
                return false;
            }
        }
        if let Some(port) = self.port {
            if flow.flow_key.port_src != port && flow.flow_key.port_dst != port {
                return false;
            }
        }
        true
    }
}

// Filtering and shunting rules. The first matching filter decides; flows no
// filter matches are shunted, i.e. discarded once they carried more packets
// than their limit. A limit of 0 never shunts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RuleSet {
    filters: Vec<FilterRule>,
    shunt_default: u64,
    shunt_tcp: u64,
    shunt_udp: u64,
    shunt_protocols: HashMap<u16, u64>,
}

impl RuleSet {
    pub fn load_from_file<T: AsRef<Path>>(
        path: T,
        registry: &ProtocolRegistry,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let rules = Self::load(read_file(path)?, registry)?;
        info!(
            "loaded {} filters and {} protocol shunts from {}",
            rules.filters.len(),
            rules.shunt_protocols.len(),
            path.display()
        );
        Ok(rules)
    }

    pub fn load<C: AsRef<str>>(contents: C, registry: &ProtocolRegistry) -> Result<Self, ConfigError> {
        let contents = contents.as_ref();
        let file: RulesFile = if contents.trim().is_empty() {
            RulesFile::default()
        } else {
            serde_yaml::from_str(contents)
                .map_err(|e| ConfigError::YamlConfigInvalid(e.to_string()))?
        };
        let lookup = |name: &str| {
            registry
                .lookup(name)
                .ok_or_else(|| ConfigError::YamlConfigInvalid(format!("unknown protocol '{}'", name)))
        };

        let mut filters = Vec::with_capacity(file.filter.len());
        for (i, entry) in file.filter.into_iter().enumerate() {
            if entry.protocol.is_none() && entry.l4_protocol.is_none() && entry.port.is_none() {
                return Err(ConfigError::YamlConfigInvalid(format!(
                    "filter {} matches nothing, set protocol, l4-protocol or port",
                    i
                )));
            }
            filters.push(FilterRule {
                protocol: entry.protocol.as_deref().map(&lookup).transpose()?,
                l4_protocol: entry.l4_protocol.map(IpProtocol::from),
                port: entry.port,
                action: entry.action,
            });
        }
        let mut shunt_protocols = HashMap::with_capacity(file.shunt.protocols.len());
        for (name, limit) in file.shunt.protocols.iter() {
            shunt_protocols.insert(lookup(name.as_str())?, *limit);
        }
        Ok(Self {
            filters,
            shunt_default: file.shunt.default,
            shunt_tcp: file.shunt.tcp,
            shunt_udp: file.shunt.udp,
            shunt_protocols,
        })
    }

    fn shunt_limit(&self, flow: &Flow) -> u64 {
        let p = &flow.l7_protocol;
        if let Some(limit) = [p.app, p.master]
            .iter()
            .filter(|id| **id != 0)
            .find_map(|id| self.shunt_protocols.get(id))
        {
            return *limit;
        }
        let l4_limit = match IpProtocol::from(flow.flow_key.proto) {
            IpProtocol::Tcp => self.shunt_tcp,
            IpProtocol::Udp => self.shunt_udp,
            _ => 0,
        };
        if l4_limit > 0 {
            l4_limit
        } else {
            self.shunt_default
        }
    }
}

impl FlowFilter for RuleSet {
    fn check(&self, flow: &Flow) -> Action {
        if let Some(rule) = self.filters.iter().find(|r| r.matches(flow)) {
            return rule.action;
        }
        let limit = self.shunt_limit(flow);
        if limit > 0 && flow.total_packets() > limit {
            Action::Discard
        } else {
            Action::Pass
        }
    }
}
