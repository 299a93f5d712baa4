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

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::common::decapsulate::{TunnelType, TunnelTypeBitmap};
use crate::flow_generator::{
    flow_config::{
        EvictionPolicy, FlowMapConfig, L7Config, DEFAULT_L7_MAX_BYTES, DEFAULT_L7_MAX_PACKETS,
    },
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_FLOWS, TIME_UNIT,
};

pub const DEFAULT_SNAPLEN: i32 = 256;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);
const MIN_SNAPLEN: i32 = 64;
const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("yaml config invalid: {0}")]
    YamlConfigInvalid(String),
    #[error("read {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}:{line}: {reason}")]
    InvalidLine {
        path: String,
        line: usize,
        reason: String,
    },
    #[error("Categories detection require L7 detection (please use -c in combination with -7)")]
    CategoriesRequireL7,
}

pub fn read_file<T: AsRef<Path>>(path: T) -> Result<String, ConfigError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct FlowTableConfig {
    pub max_flows: usize,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    pub eviction_policy: EvictionPolicy,
    // empty disables tunnel decapsulation
    pub decap_tunnel_types: Vec<TunnelType>,
}

impl Default for FlowTableConfig {
    fn default() -> Self {
        Self {
            max_flows: DEFAULT_MAX_FLOWS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            eviction_policy: EvictionPolicy::default(),
            decap_tunnel_types: TunnelType::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct L7InspectConfig {
    pub max_packets: u32,
    pub max_bytes: usize,
}

impl Default for L7InspectConfig {
    fn default() -> Self {
        Self {
            max_packets: DEFAULT_L7_MAX_PACKETS,
            max_bytes: DEFAULT_L7_MAX_BYTES,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CaptureConfig {
    pub snaplen: i32,
    pub promisc: bool,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            promisc: true,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

// Engine tunables, loaded from the optional `--config` file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub flow_table: FlowTableConfig,
    pub l7: L7InspectConfig,
    pub capture: CaptureConfig,
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flow_table: FlowTableConfig::default(),
            l7: L7InspectConfig::default(),
            capture: CaptureConfig::default(),
            stats_interval: TIME_UNIT,
        }
    }
}

impl Config {
    pub fn load_from_file<T: AsRef<Path>>(path: T) -> Result<Self, ConfigError> {
        let contents = read_file(path)?;
        Self::load(&contents)
    }

    pub fn load<C: AsRef<str>>(contents: C) -> Result<Self, ConfigError> {
        let contents = contents.as_ref();
        let cfg = if contents.trim().is_empty() {
            // parsing empty string leads to EOF error
            Self::default()
        } else {
            serde_yaml::from_str(contents)
                .map_err(|e| ConfigError::YamlConfigInvalid(e.to_string()))?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.flow_table.max_flows == 0 {
            return Err(ConfigError::YamlConfigInvalid(
                "flow-table.max-flows must be positive".to_owned(),
            ));
        }
        if self.flow_table.idle_timeout < TIME_UNIT {
            return Err(ConfigError::YamlConfigInvalid(format!(
                "flow-table.idle-timeout {:?} is shorter than {:?}",
                self.flow_table.idle_timeout, TIME_UNIT
            )));
        }
        if self.flow_table.idle_timeout > MAX_IDLE_TIMEOUT {
            return Err(ConfigError::YamlConfigInvalid(format!(
                "flow-table.idle-timeout {:?} is longer than {:?}",
                self.flow_table.idle_timeout, MAX_IDLE_TIMEOUT
            )));
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::YamlConfigInvalid(
                "stats-interval must be positive".to_owned(),
            ));
        }
        if self.capture.snaplen < MIN_SNAPLEN {
            return Err(ConfigError::YamlConfigInvalid(format!(
                "capture.snaplen {} is below {}",
                self.capture.snaplen, MIN_SNAPLEN
            )));
        }
        Ok(())
    }

    pub fn flow_map_config(&self, l7_enabled: bool) -> FlowMapConfig {
        FlowMapConfig {
            max_flows: self.flow_table.max_flows,
            idle_timeout: self.flow_table.idle_timeout,
            eviction: self.flow_table.eviction_policy,
            tunnel_types: TunnelTypeBitmap::new(&self.flow_table.decap_tunnel_types),
            l7: L7Config {
                enabled: l7_enabled,
                max_packets: self.l7.max_packets,
                max_bytes: self.l7.max_bytes,
            },
        }
    }
}
