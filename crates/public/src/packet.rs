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
use std::time::Duration;

// A captured frame borrowed from the capture buffer.
pub struct Packet<'a> {
    pub timestamp: Duration,
    // length on the wire, may exceed data.len() when the snaplen truncated it
    pub original_length: u32,
    pub data: &'a [u8],
}

impl<'a> Packet<'a> {
    pub fn new(timestamp: Duration, original_length: u32, data: &'a [u8]) -> Self {
        Self {
            timestamp,
            original_length,
            data,
        }
    }

    pub fn capture_length(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Packet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("timestamp", &self.timestamp)
            .field("original_length", &self.original_length)
            .field("capture_length", &self.data.len())
            .finish()
    }
}
