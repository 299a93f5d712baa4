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

mod pcap_source;

pub use pcap_source::PcapSource;

use public::packet::Packet;

use super::error::Result;
use crate::common::enums::LinkType;

// Capture statistics as reported by the source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub received: u64,
    pub dropped: u64,
    pub if_dropped: u64,
}

// Where packets come from. `next_packet` returns `Ok(None)` when a live
// source timed out without a packet and `Err(Error::EndOfCapture)` once an
// offline source is exhausted.
pub trait PacketSource {
    fn link_type(&self) -> LinkType;

    fn next_packet(&mut self) -> Result<Option<Packet<'_>>>;

    // None when the source keeps no statistics, e.g. capture files.
    fn stats(&mut self) -> Option<CaptureStats>;

    fn stop(&mut self);

    fn is_live(&self) -> bool;
}
