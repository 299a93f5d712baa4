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

use std::time::{Duration, Instant};

use criterion::*;

use ftflow::{
    common::flow::Flow,
    flow_generator::{Classifier, FlowMapConfig},
    _TcpFlags as TcpFlags, _tcp_v4_packet as tcp_v4_packet,
};
use public::packet::Packet;

fn frames(count: u64, per_flow: u64) -> Vec<(Duration, Vec<u8>)> {
    let mut frames = Vec::with_capacity(count as usize);
    for i in (0..count).step_by(per_flow as usize) {
        let client_port = (i / per_flow) as u16;
        let server_port = 1 + ((i / per_flow) >> 16) as u16;
        for k in 0..per_flow {
            let timestamp = Duration::from_secs(100) + Duration::from_nanos(100 * (i + k));
            let frame = match k {
                0 => tcp_v4_packet(
                    "10.0.0.1",
                    client_port,
                    "10.0.0.2",
                    server_port,
                    TcpFlags::SYN,
                    &[],
                ),
                1 => tcp_v4_packet(
                    "10.0.0.2",
                    server_port,
                    "10.0.0.1",
                    client_port,
                    TcpFlags::SYN_ACK,
                    &[],
                ),
                _ => tcp_v4_packet(
                    "10.0.0.1",
                    client_port,
                    "10.0.0.2",
                    server_port,
                    TcpFlags::ACK,
                    &[],
                ),
            };
            frames.push((timestamp, frame));
        }
    }
    frames
}

fn replay(frames: &[(Duration, Vec<u8>)]) -> Duration {
    let config = FlowMapConfig {
        max_flows: 1 << 20,
        ..Default::default()
    };
    let mut classifier = Classifier::new(config, |_: Box<Flow>| {});
    let start = Instant::now();
    for (timestamp, data) in frames {
        classifier.process(&Packet::new(*timestamp, data.len() as u32, data));
    }
    start.elapsed()
}

pub(super) fn bench(c: &mut Criterion) {
    c.bench_function("flow_map_syn_flood", |b| {
        b.iter_custom(|iters| replay(&frames(iters, 1)))
    });

    c.bench_function("flow_map_with_ten_packets_flow_flood", |b| {
        b.iter_custom(|iters| replay(&frames((iters + 9) / 10 * 10, 10)))
    });
}
