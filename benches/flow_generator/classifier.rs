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
    flow_generator::{Classifier, FlowMapConfig, L7Config, RuleBasedIdentifier},
    _udp_v4_packet as udp_v4_packet,
};
use public::packet::Packet;

pub(super) fn bench(c: &mut Criterion) {
    c.bench_function("classifier_l7_dns_queries", |b| {
        b.iter_custom(|iters| {
            let config = FlowMapConfig {
                max_flows: 1 << 20,
                l7: L7Config {
                    enabled: true,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut classifier = Classifier::new(config, |_: Box<Flow>| {})
                .with_identifier(Box::new(RuleBasedIdentifier::default()));
            let frames = (0..iters)
                .map(|i| {
                    (
                        Duration::from_secs(100) + Duration::from_nanos(100 * i),
                        udp_v4_packet("10.0.0.1", i as u16, "10.0.0.53", 53, b"query"),
                    )
                })
                .collect::<Vec<_>>();
            let start = Instant::now();
            for (timestamp, data) in frames.iter() {
                classifier.process(&Packet::new(*timestamp, data.len() as u32, data));
            }
            start.elapsed()
        })
    });
}
