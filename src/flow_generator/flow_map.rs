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

use std::collections::{HashMap, HashSet, VecDeque};
use std::mem;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use ahash::RandomState;
use log::debug;

use super::{
    error::{Error, Result},
    flow_config::{EvictionPolicy, FlowMapConfig},
    flow_node::FlowNode,
    TIME_UNIT,
};
use crate::common::{
    flow::{CloseType, Flow, FlowKey},
    Timestamp,
};
use public::counter::{Counter, CounterType, CounterValue, RefCountable};

// Upper bound of the expiry ring, in TIME_UNIT slots.
const MAX_TIME_WINDOW_SIZE: usize = 1 << 12;

// Counters are cumulative since the map was created.
#[derive(Default)]
pub struct FlowMapCounter {
    pub(crate) new: AtomicU64,        // flows created
    pub(crate) closed: AtomicU64,     // flows removed from the map, for any reason
    pub(crate) concurrent: AtomicU64, // flows currently in the map
    pub(crate) no_room: AtomicU64,    // new flows rejected because the map was full
    pub(crate) no_mem: AtomicU64,     // new flows rejected because the map could not grow
    pub(crate) evicted: AtomicU64,    // flows removed to make room
}

impl RefCountable for FlowMapCounter {
    fn get_counters(&self) -> Vec<Counter> {
        vec![
            (
                "new",
                CounterType::Counted,
                CounterValue::Unsigned(self.new.load(Ordering::Relaxed)),
            ),
            (
                "closed",
                CounterType::Counted,
                CounterValue::Unsigned(self.closed.load(Ordering::Relaxed)),
            ),
            (
                "concurrent",
                CounterType::Gauged,
                CounterValue::Unsigned(self.concurrent.load(Ordering::Relaxed)),
            ),
            (
                "no_room",
                CounterType::Counted,
                CounterValue::Unsigned(self.no_room.load(Ordering::Relaxed)),
            ),
            (
                "no_mem",
                CounterType::Counted,
                CounterValue::Unsigned(self.no_mem.load(Ordering::Relaxed)),
            ),
            (
                "evicted",
                CounterType::Counted,
                CounterValue::Unsigned(self.evicted.load(Ordering::Relaxed)),
            ),
        ]
    }
}

// FlowMap is not thread-safe, it has a single owner which feeds it packets
// and drives its expiration.
//
// Every node is registered in exactly one time slot, the one of its
// `timestamp_key`. Packets only refresh `recent_time`; the slot is corrected
// lazily when it is drained, so a packet costs no slot bookkeeping.
pub struct FlowMap {
    node_map: HashMap<FlowKey, Box<FlowNode>, RandomState>,
    time_set: Vec<HashSet<FlowKey, RandomState>>,
    time_window_size: usize,
    // the next time slot to drain, in TIME_UNIT
    start_time_in_unit: u64,
    capacity: usize,
    eviction: EvictionPolicy,
    // flows closed by TCP termination, exported on the next drain
    closed: Vec<FlowKey>,
    evicted: VecDeque<Box<Flow>>,
    total_flow: u64,
    stats_counter: Arc<FlowMapCounter>,
}

impl FlowMap {
    pub fn new(config: &FlowMapConfig) -> Self {
        let time_window_size = {
            let idle = config
                .idle_timeout
                .saturating_add(TIME_UNIT - Duration::from_nanos(1))
                .as_secs();
            // longer timeouts take several laps of the ring
            (idle.min(MAX_TIME_WINDOW_SIZE as u64) + 2)
                .next_power_of_two()
                .min(MAX_TIME_WINDOW_SIZE as u64) as usize
        };
        let capacity = config.max_flows.max(1);
        let initial = capacity.min(1 << 16);
        Self {
            node_map: HashMap::with_capacity_and_hasher(initial, RandomState::new()),
            time_set: (0..time_window_size)
                .map(|_| HashSet::with_hasher(RandomState::new()))
                .collect(),
            time_window_size,
            start_time_in_unit: 0,
            capacity,
            eviction: config.eviction,
            closed: vec![],
            evicted: VecDeque::new(),
            total_flow: 0,
            stats_counter: Arc::new(FlowMapCounter::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counter(&self) -> &Arc<FlowMapCounter> {
        &self.stats_counter
    }

    #[cfg(test)]
    pub fn get(&self, key: &FlowKey) -> Option<&FlowNode> {
        self.node_map.get(key).map(|n| n.as_ref())
    }

    fn slot(&self, time_in_unit: u64) -> usize {
        time_in_unit as usize & (self.time_window_size - 1)
    }

    fn update_concurrent(&self) {
        self.stats_counter
            .concurrent
            .store(self.node_map.len() as u64, Ordering::Relaxed);
    }

    // Returns the node for `key`, creating it if needed. The flag tells
    // whether the node was created by this call.
    pub fn lookup_or_create(
        &mut self,
        key: &FlowKey,
        reversed: bool,
        timestamp: Timestamp,
    ) -> Result<(&mut FlowNode, bool)> {
        let created = !self.node_map.contains_key(key);
        if created {
            if self.node_map.len() >= self.capacity {
                let evicted = match self.eviction {
                    EvictionPolicy::Reject => false,
                    EvictionPolicy::OldestIdle => self.evict_oldest(),
                };
                if !evicted {
                    self.stats_counter.no_room.fetch_add(1, Ordering::Relaxed);
                    return Err(Error::NoRoom);
                }
            }
            if self.node_map.try_reserve(1).is_err() {
                self.stats_counter.no_mem.fetch_add(1, Ordering::Relaxed);
                return Err(Error::NoMemory);
            }
            let time_in_unit = timestamp.as_secs().max(self.start_time_in_unit);
            let slot = self.slot(time_in_unit);
            self.time_set[slot].insert(*key);
            self.total_flow += 1;
            let flow = Flow::new(self.total_flow, *key, reversed);
            self.node_map
                .insert(*key, Box::new(FlowNode::new(flow, timestamp, time_in_unit)));
            self.stats_counter.new.fetch_add(1, Ordering::Relaxed);
            self.update_concurrent();
        }
        match self.node_map.get_mut(key) {
            Some(node) => Ok((node.as_mut(), created)),
            None => Err(Error::NoMemory),
        }
    }

    // Queues a flow whose TCP connection is over, it leaves the map on the
    // next drain.
    pub fn queue_close(&mut self, key: &FlowKey) {
        if let Some(node) = self.node_map.get_mut(key) {
            if !node.close_queued {
                node.close_queued = true;
                self.closed.push(*key);
            }
        }
    }

    // Flows evicted since the last drain.
    pub fn take_evicted(&mut self) -> impl Iterator<Item = Box<Flow>> + '_ {
        self.evicted.drain(..)
    }

    fn remove_node(&mut self, key: &FlowKey) -> Option<Box<FlowNode>> {
        let node = self.node_map.remove(key)?;
        let slot = self.slot(node.timestamp_key);
        self.time_set[slot].remove(key);
        self.stats_counter.closed.fetch_add(1, Ordering::Relaxed);
        self.update_concurrent();
        Some(node)
    }

    // Walks the slots oldest first and evicts the least recently seen flow of
    // the first slot holding flows that are really that old. Nodes found in a
    // slot older than their last packet are moved along the way.
    fn evict_oldest(&mut self) -> bool {
        let mut victim = None;
        for time_in_unit in
            self.start_time_in_unit..self.start_time_in_unit + self.time_window_size as u64
        {
            let slot = self.slot(time_in_unit);
            let keys = self.time_set[slot].iter().copied().collect::<Vec<_>>();
            let mut oldest: Option<(Timestamp, FlowKey)> = None;
            for key in keys {
                let Some(node) = self.node_map.get_mut(&key) else {
                    self.time_set[slot].remove(&key);
                    continue;
                };
                if node.timestamp_key > time_in_unit {
                    continue;
                }
                let recent_in_unit = node.recent_time.as_secs();
                if recent_in_unit > time_in_unit {
                    node.timestamp_key = recent_in_unit;
                    self.time_set[slot].remove(&key);
                    let target = recent_in_unit as usize & (self.time_window_size - 1);
                    self.time_set[target].insert(key);
                    continue;
                }
                if oldest.map_or(true, |(t, _)| node.recent_time < t) {
                    oldest = Some((node.recent_time, key));
                }
            }
            if let Some((_, key)) = oldest {
                victim = Some(key);
                break;
            }
        }
        // every node is registered beyond the window, fall back to a scan
        let victim = victim.or_else(|| {
            self.node_map
                .values()
                .min_by_key(|n| n.recent_time)
                .map(|n| n.flow.flow_key)
        });
        let Some(node) = victim.and_then(|key| self.remove_node(&key)) else {
            return false;
        };
        debug!("evict flow {}", node.flow.flow_key);
        self.stats_counter.evicted.fetch_add(1, Ordering::Relaxed);
        self.evicted.push_back(node.into_flow(CloseType::Evicted));
        true
    }

    // Lazily removes and yields flows idle for at least `idle_timeout` at
    // `now`, after any flows evicted or closed since the last drain. Dropping
    // the iterator early keeps the remaining flows in the map.
    pub fn expire_idle(&mut self, now: Timestamp, idle_timeout: Duration) -> ExpireIdle<'_> {
        let idle = Timestamp::from(idle_timeout);
        // slots up to and including the one of `now - idle` may hold idle flows
        let end = if now > idle {
            (now - idle).as_secs() + 1
        } else {
            0
        };
        let from = self
            .start_time_in_unit
            .max(end.saturating_sub(self.time_window_size as u64));
        ExpireIdle {
            map: self,
            now,
            idle,
            time_in_unit: from,
            end,
            current: None,
            pending: vec![],
        }
    }

    // Lazily removes and yields every flow. Flows closed by TCP termination
    // keep their close type, the rest are ForcedFlush. Safe to call again.
    pub fn flush_all(&mut self) -> Drain<'_> {
        let keys = self.node_map.keys().copied().collect();
        Drain { map: self, keys }
    }
}

pub struct ExpireIdle<'a> {
    map: &'a mut FlowMap,
    now: Timestamp,
    idle: Timestamp,
    time_in_unit: u64,
    end: u64,
    // the slot being drained and its keys not examined yet
    current: Option<u64>,
    pending: Vec<FlowKey>,
}

impl<'a> ExpireIdle<'a> {
    fn next_closed(&mut self) -> Option<Box<Flow>> {
        while let Some(key) = self.map.closed.pop() {
            let closed = matches!(
                self.map.node_map.get(&key),
                Some(n) if n.close_queued && n.flow_state.is_closed()
            );
            if !closed {
                continue;
            }
            if let Some(node) = self.map.remove_node(&key) {
                let close_type = node.flow_state.close_type();
                return Some(node.into_flow(close_type));
            }
        }
        None
    }

    fn next_idle(&mut self) -> Option<Box<Flow>> {
        loop {
            if let Some(time_in_unit) = self.current {
                while let Some(key) = self.pending.pop() {
                    let map = &mut *self.map;
                    let Some(node) = map.node_map.get_mut(&key) else {
                        continue;
                    };
                    if node.timestamp_key > time_in_unit {
                        // registered for a later lap of the ring
                        let slot = map.slot(time_in_unit);
                        map.time_set[slot].insert(key);
                        continue;
                    }
                    if self.now >= node.recent_time + self.idle {
                        if let Some(node) = map.remove_node(&key) {
                            return Some(node.into_flow(CloseType::Timeout));
                        }
                        continue;
                    }
                    let target = node.recent_time.as_secs().max(time_in_unit + 1);
                    node.timestamp_key = target;
                    let slot = map.slot(target);
                    map.time_set[slot].insert(key);
                }
                self.current = None;
            }
            if self.time_in_unit >= self.end {
                return None;
            }
            let slot = self.map.slot(self.time_in_unit);
            self.pending = mem::take(&mut self.map.time_set[slot]).into_iter().collect();
            self.current = Some(self.time_in_unit);
            self.time_in_unit += 1;
            self.map.start_time_in_unit = self.time_in_unit;
        }
    }
}

impl<'a> Iterator for ExpireIdle<'a> {
    type Item = Box<Flow>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(flow) = self.map.evicted.pop_front() {
            return Some(flow);
        }
        if let Some(flow) = self.next_closed() {
            return Some(flow);
        }
        self.next_idle()
    }
}

impl<'a> Drop for ExpireIdle<'a> {
    fn drop(&mut self) {
        if let Some(time_in_unit) = self.current.take() {
            // the slot was not fully examined, give it back
            let slot = self.map.slot(time_in_unit);
            for key in self.pending.drain(..) {
                self.map.time_set[slot].insert(key);
            }
            self.map.start_time_in_unit = time_in_unit;
        }
    }
}

pub struct Drain<'a> {
    map: &'a mut FlowMap,
    keys: Vec<FlowKey>,
}

impl<'a> Iterator for Drain<'a> {
    type Item = Box<Flow>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(flow) = self.map.evicted.pop_front() {
            return Some(flow);
        }
        while let Some(key) = self.keys.pop() {
            if let Some(node) = self.map.remove_node(&key) {
                let close_type = if node.flow_state.is_closed() {
                    node.flow_state.close_type()
                } else {
                    CloseType::ForcedFlush
                };
                return Some(node.into_flow(close_type));
            }
        }
        None
    }
}
