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

pub mod common;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flow_generator;
pub mod handler;
pub mod policy;
pub mod runner;
pub mod utils;

// for benchmarks
#[doc(hidden)]
pub use {
    common::enums::{LinkType as _LinkType, TcpFlags as _TcpFlags},
    utils::test::{tcp_v4_packet as _tcp_v4_packet, udp_v4_packet as _udp_v4_packet},
};
