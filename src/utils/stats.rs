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
use std::time::Instant;

use log::{debug, info, warn};

use crate::dispatcher::recv_engine::CaptureStats;
use crate::flow_generator::EngineStats;
pub use public::counter::*;

const SEPARATOR: &str = "=========================";

pub enum StatsOption {
    Tag(&'static str, String),
}

struct Source {
    module: &'static str,
    countable: Countable,
    tags: Vec<(&'static str, String)>,
}

impl PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        self.module == other.module && self.tags == other.tags
    }
}

impl Eq for Source {}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{:?}", self.module, self.tags)
    }
}

// Registry of counter sources, dumped to the log on demand.
#[derive(Default)]
pub struct Collector {
    sources: Vec<Source>,
}

impl Collector {
    pub fn register_countable(
        &mut self,
        module: &'static str,
        countable: Countable,
        options: Vec<StatsOption>,
    ) {
        let mut source = Source {
            module,
            countable,
            tags: vec![],
        };
        for option in options {
            match option {
                StatsOption::Tag(k, v) if !source.tags.iter().any(|(key, _)| key == &k) => {
                    source.tags.push((k, v))
                }
                _ => warn!("ignored duplicated tag for module {}", source.module),
            }
        }
        self.sources.retain(|s| {
            let closed = s.countable.closed();
            let equals = s == &source;
            if !closed && equals {
                warn!(
                    "Found duplicated counter source {}, please check if the old one is correctly closed.",
                    source
                );
            }
            !closed && !equals
        });
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    // One line per source, `final_dump` logs at info instead of debug.
    pub fn log_counters(&mut self, final_dump: bool) {
        self.sources.retain(|s| !s.countable.closed());
        for source in self.sources.iter() {
            let points = source.countable.get_counters();
            if points.is_empty() {
                continue;
            }
            let line = points
                .iter()
                .map(|(name, _, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join(" ");
            if final_dump {
                info!("{}: {}", source, line);
            } else {
                debug!("{}: {}", source, line);
            }
        }
    }
}

// 1234567 => "1'234'567", with two decimals when `decimals` is set.
pub fn format_number(value: f64, decimals: bool) -> String {
    let value = value.max(0.0);
    let integer = value.trunc() as u64;
    let digits = integer.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('\'');
        }
        grouped.push(c);
    }
    if decimals {
        let fraction = ((value - integer as f64) * 100.0) as u64;
        grouped.push_str(&format!(".{:02}", fraction.min(99)));
    }
    grouped
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActualStats {
    pub active_flows: u64,
    pub packets: u64,
    pub elapsed_ms: f64,
    pub packet_rate: f64,
}

// Printed on every reporting tick. Absolute values cover the time since the
// first call, actual ones the time since the previous call.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    pub capture: Option<CaptureStats>,
    pub flows: u64,
    pub errors: u64,
    pub packets: u64,
    pub bytes: u64,
    pub packet_rate: f64,
    pub mbit_rate: f64,
    pub actual: ActualStats,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", SEPARATOR)?;
        match &self.capture {
            Some(c) => {
                writeln!(
                    f,
                    "Absolute Stats: [{} pkts rcvd][{} pkts dropped][{} flows][{} errors]",
                    c.received, c.dropped, self.flows, self.errors
                )?;
                let drop_ratio = if c.received == 0 {
                    0.0
                } else {
                    c.dropped as f64 * 100.0 / c.received as f64
                };
                writeln!(
                    f,
                    "Total Pkts={}/Dropped={:.1} %",
                    c.received.saturating_sub(c.dropped),
                    drop_ratio
                )?;
            }
            None => writeln!(
                f,
                "Absolute Stats: [{} flows][{} errors]",
                self.flows, self.errors
            )?,
        }
        writeln!(
            f,
            "{} pkts [{:.1} pkt/sec] - {} bytes [{:.2} Mbit/sec]",
            self.packets, self.packet_rate, self.bytes, self.mbit_rate
        )?;
        writeln!(f, "{}", SEPARATOR)?;
        writeln!(
            f,
            "Actual Stats: {} flows {} pkts [{:.1} ms][{} pkt/sec]",
            self.actual.active_flows,
            format_number(self.actual.packets as f64, false),
            self.actual.elapsed_ms,
            format_number(self.actual.packet_rate, true)
        )?;
        writeln!(f, "{}", SEPARATOR)
    }
}

struct Sample {
    time: Instant,
    packets: u64,
}

// Turns successive engine snapshots into reports. Only its own bookkeeping
// is mutated.
#[derive(Default)]
pub struct StatsReporter {
    baseline: Option<(Instant, EngineStats)>,
    last: Option<Sample>,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    // The first call only records the baseline.
    pub fn report(
        &mut self,
        now: Instant,
        engine: EngineStats,
        capture: Option<CaptureStats>,
    ) -> Option<StatsReport> {
        let Some((start, baseline)) = self.baseline.as_ref() else {
            self.baseline = Some((now, engine));
            self.last = Some(Sample {
                time: now,
                packets: engine.packets,
            });
            return None;
        };

        let elapsed = now.saturating_duration_since(*start).as_secs_f64();
        let packets = engine.packets.saturating_sub(baseline.packets);
        let bytes = engine.bytes.saturating_sub(baseline.bytes);
        let (packet_rate, mbit_rate) = if elapsed > 0.0 {
            (
                packets as f64 / elapsed,
                8.0 * bytes as f64 / (elapsed * 1_000_000.0),
            )
        } else {
            (0.0, 0.0)
        };

        let actual = match self.last.as_ref() {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last.time).as_secs_f64();
                let delta = engine.packets.saturating_sub(last.packets);
                ActualStats {
                    active_flows: engine.active_flows,
                    packets: delta,
                    elapsed_ms: elapsed * 1000.0,
                    packet_rate: if elapsed > 0.0 {
                        delta as f64 / elapsed
                    } else {
                        0.0
                    },
                }
            }
            None => ActualStats {
                active_flows: engine.active_flows,
                packets: 0,
                elapsed_ms: 0.0,
                packet_rate: 0.0,
            },
        };
        self.last = Some(Sample {
            time: now,
            packets: engine.packets,
        });

        Some(StatsReport {
            capture,
            flows: engine.flows_created,
            errors: engine.errors(),
            packets,
            bytes,
            packet_rate,
            mbit_rate,
            actual,
        })
    }
}
