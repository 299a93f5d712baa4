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

use super::{protocol_identifier::Detection, FlowState};
use crate::common::{
    enums::{IpProtocol, PacketDirection, TcpFlags},
    flow::{CloseType, Flow},
    Timestamp,
};

// Per-flow protocol identification progress.
#[derive(Debug, Default, Clone)]
pub struct InspectState {
    // payload-carrying packets handed to the identifier
    pub packets: u32,
    pub bytes: usize,
    // best non-confident result seen so far
    pub guess: Option<Detection>,
    // a category map match is kept over protocol default categories
    pub category_matched: bool,
}

pub struct FlowNode {
    pub flow: Flow,
    pub flow_state: FlowState,
    // the time slot this node is registered in, in TIME_UNIT
    pub(super) timestamp_key: u64,
    pub recent_time: Timestamp,
    pub(super) close_queued: bool,
    pub inspect: InspectState,
}

impl FlowNode {
    pub fn new(flow: Flow, timestamp: Timestamp, timestamp_key: u64) -> Self {
        Self {
            flow,
            flow_state: FlowState::Raw,
            timestamp_key,
            recent_time: timestamp,
            close_queued: false,
            inspect: InspectState::default(),
        }
    }

    // Adds one packet to the counters of its direction and advances the
    // TCP state. Never fails.
    pub fn update(
        &mut self,
        direction: PacketDirection,
        packet_len: u32,
        tcp_flags: TcpFlags,
        timestamp: Timestamp,
    ) {
        self.flow.peers[direction as usize].update(packet_len, tcp_flags, timestamp);
        self.recent_time = self.recent_time.max(timestamp);
        if self.flow.flow_key.proto == u8::from(IpProtocol::Tcp) {
            self.flow_state = self.flow_state.next(direction, tcp_flags);
        }
    }

    pub fn into_flow(self: Box<Self>, close_type: CloseType) -> Box<Flow> {
        let mut flow = Box::new(self.flow);
        flow.close_type = close_type;
        flow
    }
}
