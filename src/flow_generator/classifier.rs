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

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use log::{debug, trace};

use super::{
    flow_config::{FlowMapConfig, L7Config},
    flow_map::{FlowMap, FlowMapCounter},
    flow_node::FlowNode,
    protocol_identifier::{Detection, ProtocolIdentifier},
};
use crate::common::{
    decapsulate::TunnelTypeBitmap,
    enums::LinkType,
    flow::{ClassifyState, Flow, FlowKey},
    MetaPacket, Timestamp,
};
use crate::error::Error;
use crate::policy::{Action, FlowFilter};
use public::counter::{Counter, CounterType, CounterValue, RefCountable};
use public::packet::Packet;

// Receives every flow leaving the table, exactly once.
pub trait FlowExporter {
    fn export(&mut self, flow: Box<Flow>);

    // Called once when protocol identification of a flow completes with a
    // known protocol.
    fn l7_detected(&mut self, _flow: &Flow) {}
}

impl<F: FnMut(Box<Flow>)> FlowExporter for F {
    fn export(&mut self, flow: Box<Flow>) {
        self(flow)
    }
}

#[derive(Default)]
pub struct ClassifierCounter {
    pub(crate) packets: AtomicU64,
    pub(crate) bytes: AtomicU64,
    pub(crate) malformed: AtomicU64,
    pub(crate) non_ip: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) exported: AtomicU64,
}

impl RefCountable for ClassifierCounter {
    fn get_counters(&self) -> Vec<Counter> {
        vec![
            (
                "packets",
                CounterType::Counted,
                CounterValue::Unsigned(self.packets.load(Ordering::Relaxed)),
            ),
            (
                "bytes",
                CounterType::Counted,
                CounterValue::Unsigned(self.bytes.load(Ordering::Relaxed)),
            ),
            (
                "malformed",
                CounterType::Counted,
                CounterValue::Unsigned(self.malformed.load(Ordering::Relaxed)),
            ),
            (
                "non_ip",
                CounterType::Counted,
                CounterValue::Unsigned(self.non_ip.load(Ordering::Relaxed)),
            ),
            (
                "discarded",
                CounterType::Counted,
                CounterValue::Unsigned(self.discarded.load(Ordering::Relaxed)),
            ),
            (
                "exported",
                CounterType::Counted,
                CounterValue::Unsigned(self.exported.load(Ordering::Relaxed)),
            ),
        ]
    }
}

// Point in time copy of the engine counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub packets: u64,
    pub bytes: u64,
    pub malformed: u64,
    pub non_ip: u64,
    pub discarded: u64,
    pub flows_created: u64,
    pub flows_exported: u64,
    pub active_flows: u64,
    pub no_room: u64,
    pub no_mem: u64,
    pub evicted: u64,
}

impl EngineStats {
    pub fn errors(&self) -> u64 {
        self.no_room + self.no_mem
    }
}

// Turns packets into flows. Single threaded, one owner drives both
// `process` and the housekeeping.
pub struct Classifier<E: FlowExporter> {
    flow_map: FlowMap,
    config: FlowMapConfig,
    link_type: LinkType,
    exporter: E,
    identifier: Option<Box<dyn ProtocolIdentifier>>,
    filter: Option<Box<dyn FlowFilter>>,
    // packet time of the last housekeeping, in TIME_UNIT
    last_tick: u64,
    counter: Arc<ClassifierCounter>,
}

impl<E: FlowExporter> Classifier<E> {
    pub fn new(config: FlowMapConfig, exporter: E) -> Self {
        Self {
            flow_map: FlowMap::new(&config),
            config,
            link_type: LinkType::Ethernet,
            exporter,
            identifier: None,
            filter: None,
            last_tick: 0,
            counter: Arc::new(ClassifierCounter::default()),
        }
    }

    // Only consulted when l7 is enabled in the config.
    pub fn with_identifier(mut self, identifier: Box<dyn ProtocolIdentifier>) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn FlowFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn set_link_type(&mut self, link_type: LinkType) {
        self.link_type = link_type;
    }

    pub fn l7_enabled(&self) -> bool {
        self.config.l7.enabled && self.identifier.is_some()
    }

    pub fn tunnel_types(&self) -> &TunnelTypeBitmap {
        &self.config.tunnel_types
    }

    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    pub fn counter(&self) -> &Arc<ClassifierCounter> {
        &self.counter
    }

    pub fn flow_map_counter(&self) -> &Arc<FlowMapCounter> {
        self.flow_map.counter()
    }

    pub fn active_flows(&self) -> usize {
        self.flow_map.len()
    }

    pub fn process(&mut self, packet: &Packet) -> Action {
        let timestamp = Timestamp::from(packet.timestamp);
        self.counter.packets.fetch_add(1, Ordering::Relaxed);
        let length = packet.original_length.max(packet.data.len() as u32);
        self.counter
            .bytes
            .fetch_add(length as u64, Ordering::Relaxed);
        if timestamp.as_secs() > self.last_tick {
            self.tick(timestamp);
        }

        let mut meta_packet = MetaPacket::empty();
        if let Err(e) = meta_packet.update(
            packet.data,
            self.link_type,
            packet.timestamp,
            packet.original_length,
            &self.config.tunnel_types,
        ) {
            match e {
                Error::NonIpPacket(_) => self.counter.non_ip.fetch_add(1, Ordering::Relaxed),
                _ => self.counter.malformed.fetch_add(1, Ordering::Relaxed),
            };
            trace!("discard {:?}: {}", packet, e);
            self.counter.discarded.fetch_add(1, Ordering::Relaxed);
            return Action::Discard;
        }

        let (key, reversed) = FlowKey::new(&meta_packet.lookup_key);
        let (node, created) = match self.flow_map.lookup_or_create(&key, reversed, timestamp) {
            Ok(r) => r,
            Err(e) => {
                debug!("skip flow {}: {}", key, e);
                return Action::Pass;
            }
        };
        if created {
            node.flow.tunnel_type = meta_packet.tunnel.tunnel_type;
        }
        let direction = node.flow.direction_of(reversed);
        node.update(
            direction,
            meta_packet.packet_len,
            meta_packet.tcp_flags,
            timestamp,
        );
        if self.config.l7.enabled && !node.flow.classify_state.is_finished() {
            if let Some(identifier) = self.identifier.as_mut() {
                classify(
                    node,
                    meta_packet.payload,
                    identifier.as_mut(),
                    &mut self.exporter,
                    &self.config.l7,
                );
            }
        }
        let action = self
            .filter
            .as_ref()
            .map_or(Action::Pass, |f| f.check(&node.flow));
        let closed = node.flow_state.is_closed();

        if closed {
            self.flow_map.queue_close(&key);
        }
        for flow in self.flow_map.take_evicted() {
            self.counter.exported.fetch_add(1, Ordering::Relaxed);
            self.exporter.export(flow);
        }
        if action == Action::Discard {
            self.counter.discarded.fetch_add(1, Ordering::Relaxed);
        }
        action
    }

    // Exports closed and idle flows as of `now`. Called with wall clock time
    // while a live capture is quiet.
    pub fn housekeeping(&mut self, now: Duration) {
        self.tick(Timestamp::from(now));
    }

    fn tick(&mut self, now: Timestamp) {
        self.last_tick = self.last_tick.max(now.as_secs());
        for flow in self.flow_map.expire_idle(now, self.config.idle_timeout) {
            self.counter.exported.fetch_add(1, Ordering::Relaxed);
            self.exporter.export(flow);
        }
    }

    // Exports every remaining flow. Safe to call more than once.
    pub fn flush(&mut self) {
        let mut count = 0;
        for flow in self.flow_map.flush_all() {
            count += 1;
            self.exporter.export(flow);
        }
        self.counter.exported.fetch_add(count, Ordering::Relaxed);
        if count > 0 {
            debug!("flushed {} flows", count);
        }
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.counter;
        let m = self.flow_map.counter();
        EngineStats {
            packets: c.packets.load(Ordering::Relaxed),
            bytes: c.bytes.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            non_ip: c.non_ip.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            flows_created: m.new.load(Ordering::Relaxed),
            flows_exported: c.exported.load(Ordering::Relaxed),
            active_flows: self.active_flows() as u64,
            no_room: m.no_room.load(Ordering::Relaxed),
            no_mem: m.no_mem.load(Ordering::Relaxed),
            evicted: m.evicted.load(Ordering::Relaxed),
        }
    }
}

// Runs the identifier on one packet of a flow still being classified.
// Payload-less packets are inspected too but only payload counts toward the
// ceiling.
fn classify<E: FlowExporter>(
    node: &mut FlowNode,
    payload: &[u8],
    identifier: &mut dyn ProtocolIdentifier,
    exporter: &mut E,
    l7: &L7Config,
) {
    let detection = identifier.identify(&node.flow, payload);
    if !payload.is_empty() {
        node.inspect.packets += 1;
        node.inspect.bytes += payload.len();
    }

    // categories matched by address or host name may show up on any packet,
    // whatever the protocol confidence
    if detection.category_matched {
        node.flow.category = detection.category;
        node.inspect.category_matched = true;
    }

    if detection.confidence.is_confident() {
        apply_detection(node, &detection);
        node.flow.classify_state = ClassifyState::Classified;
        exporter.l7_detected(&node.flow);
        return;
    }
    let better = match &node.inspect.guess {
        Some(guess) => detection.confidence > guess.confidence,
        None => !detection.protocol.is_unknown(),
    };
    if better {
        apply_detection(node, &detection);
        node.inspect.guess = Some(detection);
    }

    if node.inspect.packets >= l7.max_packets || node.inspect.bytes >= l7.max_bytes {
        trace!(
            "flow {} gave up after {} packets {} bytes",
            node.flow.flow_id,
            node.inspect.packets,
            node.inspect.bytes
        );
        node.flow.classify_state = ClassifyState::GaveUp;
        if node.inspect.guess.is_some() || node.inspect.category_matched {
            exporter.l7_detected(&node.flow);
        }
    }
}

fn apply_detection(node: &mut FlowNode, detection: &Detection) {
    node.flow.l7_protocol = detection.protocol;
    if !node.inspect.category_matched {
        node.flow.category = detection.category;
    }
}
