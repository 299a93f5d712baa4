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

use std::time::Duration;

use serde::Deserialize;

use super::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_FLOWS};
use crate::common::decapsulate::{TunnelType, TunnelTypeBitmap};

pub const DEFAULT_L7_MAX_PACKETS: u32 = 16;
pub const DEFAULT_L7_MAX_BYTES: usize = 4096;

// What to do with a new flow when the table is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    // drop the new flow and count it as no-room
    #[default]
    Reject,
    // export the flow that has been silent the longest and take its place
    OldestIdle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L7Config {
    pub enabled: bool,
    // classification gives up after this many payload packets
    pub max_packets: u32,
    // or after this many payload bytes
    pub max_bytes: usize,
}

impl Default for L7Config {
    fn default() -> Self {
        Self {
            enabled: false,
            max_packets: DEFAULT_L7_MAX_PACKETS,
            max_bytes: DEFAULT_L7_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMapConfig {
    pub max_flows: usize,
    pub idle_timeout: Duration,
    pub eviction: EvictionPolicy,
    pub tunnel_types: TunnelTypeBitmap,
    pub l7: L7Config,
}

impl Default for FlowMapConfig {
    fn default() -> Self {
        Self {
            max_flows: DEFAULT_MAX_FLOWS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            eviction: EvictionPolicy::default(),
            tunnel_types: TunnelTypeBitmap::new(&TunnelType::ALL),
            l7: L7Config::default(),
        }
    }
}
