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

pub mod classifier;
pub mod error;
pub mod flow_config;
pub mod flow_map;
pub mod flow_node;
pub mod flow_state;
pub mod protocol_identifier;

pub use classifier::{Classifier, ClassifierCounter, EngineStats, FlowExporter};
pub use error::{Error, Result};
pub use flow_config::{EvictionPolicy, FlowMapConfig, L7Config};
pub use flow_map::{FlowMap, FlowMapCounter};
pub use flow_state::FlowState;
pub use protocol_identifier::{
    CategoryMap, Confidence, CustomProtocols, Detection, ProtocolIdentifier, ProtocolRegistry,
    RuleBasedIdentifier,
};

use std::time::Duration;

pub const TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_FLOWS: usize = 65536;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
