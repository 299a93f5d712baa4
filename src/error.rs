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

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("parse packet failed from: {0}")]
    ParsePacketFailed(String),
    #[error("not an ip packet, ethernet type {0:#06x}")]
    NonIpPacket(u16),
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(i32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
