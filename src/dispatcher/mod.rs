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

pub mod error;
pub mod recv_engine;

pub use error::{Error, Result};
pub use recv_engine::{CaptureStats, PacketSource, PcapSource};

use std::io::{self, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::flow_generator::{Classifier, FlowExporter, TIME_UNIT};
use crate::handler::PacketPrinter;
use crate::utils::stats::{Collector, StatsReporter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    // print a line per packet
    pub verbose: bool,
    pub report_stats: bool,
    pub stats_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            report_stats: true,
            stats_interval: TIME_UNIT,
        }
    }
}

// Pulls packets from a source into the classifier until the source ends or
// `terminated` is set.
pub struct Dispatcher<E: FlowExporter> {
    classifier: Classifier<E>,
    terminated: Arc<AtomicBool>,
    config: DispatcherConfig,
    reporter: StatsReporter,
    collector: Collector,
    packet_printer: Option<PacketPrinter<Box<dyn Write>>>,
    stats_output: Box<dyn Write>,
    stopped: bool,
}

impl<E: FlowExporter> Dispatcher<E> {
    pub fn new(
        classifier: Classifier<E>,
        terminated: Arc<AtomicBool>,
        config: DispatcherConfig,
    ) -> Self {
        let packet_printer = if config.verbose {
            Some(PacketPrinter::new(
                Box::new(io::stdout()) as Box<dyn Write>,
                *classifier.tunnel_types(),
            ))
        } else {
            None
        };
        Self {
            classifier,
            terminated,
            config,
            reporter: StatsReporter::new(),
            collector: Collector::default(),
            packet_printer,
            stats_output: Box::new(io::stderr()),
            stopped: false,
        }
    }

    // Counters in `collector` are logged on every report and at exit.
    pub fn with_collector(mut self, collector: Collector) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_packet_output(mut self, out: Box<dyn Write>) -> Self {
        if self.config.verbose {
            self.packet_printer = Some(PacketPrinter::new(out, *self.classifier.tunnel_types()));
        }
        self
    }

    pub fn with_stats_output(mut self, out: Box<dyn Write>) -> Self {
        self.stats_output = out;
        self
    }

    pub fn classifier(&self) -> &Classifier<E> {
        &self.classifier
    }

    pub fn run(&mut self, source: &mut dyn PacketSource) -> Result<()> {
        let link_type = source.link_type();
        self.classifier.set_link_type(link_type);
        info!(
            "{} capture started, link type {}",
            if source.is_live() { "live" } else { "offline" },
            link_type
        );

        let interval = self.config.stats_interval;
        let mut deadline = Instant::now() + interval;
        if self.config.report_stats {
            self.report(source, Instant::now());
        }
        loop {
            if self.terminated.load(Ordering::Relaxed) {
                info!("Leaving...");
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                if self.config.report_stats {
                    self.report(source, now);
                }
                self.collector.log_counters(false);
                deadline += interval;
                if deadline <= now {
                    // the loop was stalled for longer than an interval
                    deadline = now + interval;
                }
            }

            match source.next_packet() {
                Ok(Some(packet)) => {
                    let action = self.classifier.process(&packet);
                    if let Some(printer) = self.packet_printer.as_mut() {
                        if let Err(e) = printer.print(&packet, link_type, action) {
                            warn!("print packet failed: {}", e);
                        }
                    }
                }
                Ok(None) => {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default();
                    self.classifier.housekeeping(now);
                }
                Err(Error::EndOfCapture) => {
                    debug!("end of capture");
                    break;
                }
                Err(e) => {
                    self.shutdown(source);
                    return Err(e);
                }
            }
        }
        self.shutdown(source);
        Ok(())
    }

    fn report(&mut self, source: &mut dyn PacketSource, now: Instant) {
        let capture = source.stats();
        if let Some(report) = self.reporter.report(now, self.classifier.stats(), capture) {
            if let Err(e) = write!(self.stats_output, "{}", report) {
                warn!("print stats failed: {}", e);
            }
        }
    }

    // Exports every flow and closes the source. Only the first call has an
    // effect.
    pub fn shutdown(&mut self, source: &mut dyn PacketSource) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.classifier.flush();
        source.stop();
        self.collector.log_counters(true);
        let stats = self.classifier.stats();
        info!(
            "processed {} packets {} bytes, {} flows exported, {} discarded",
            stats.packets, stats.bytes, stats.flows_exported, stats.discarded
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    use crate::common::{
        decapsulate::TunnelTypeBitmap,
        enums::{LinkType, TcpFlags},
        flow::{CloseType, Flow},
    };
    use crate::flow_generator::FlowMapConfig;
    use crate::utils::test::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn packets(count: usize) -> Vec<(Duration, Vec<u8>)> {
        (0..count)
            .map(|i| {
                (
                    Duration::from_millis(1000 + i as u64 * 10),
                    tcp_v4_packet("10.0.0.1", 40000 + (i % 3) as u16, "10.0.0.2", 80, TcpFlags::ACK, b""),
                )
            })
            .collect()
    }

    fn dispatcher(
        config: DispatcherConfig,
        terminated: Arc<AtomicBool>,
    ) -> (Dispatcher<impl FnMut(Box<Flow>)>, Rc<RefCell<Vec<Box<Flow>>>>) {
        let flows = Rc::new(RefCell::new(vec![]));
        let sink = flows.clone();
        let classifier = Classifier::new(FlowMapConfig::default(), move |f: Box<Flow>| {
            sink.borrow_mut().push(f)
        });
        (Dispatcher::new(classifier, terminated, config), flows)
    }

    #[test]
    fn offline_source_runs_to_end() {
        let (mut dispatcher, flows) = dispatcher(
            DispatcherConfig {
                report_stats: false,
                ..Default::default()
            },
            Arc::new(AtomicBool::new(false)),
        );
        let mut source = MemorySource::new(LinkType::Ethernet, packets(9));
        dispatcher.run(&mut source).unwrap();
        assert_eq!(source.consumed(), 9);
        assert!(source.stopped());
        let flows = flows.borrow();
        assert_eq!(flows.len(), 3);
        assert!(flows.iter().all(|f| f.close_type == CloseType::ForcedFlush));
        assert_eq!(flows.iter().map(|f| f.total_packets()).sum::<u64>(), 9);
    }

    #[test]
    fn cancellation_stops_and_flushes() {
        let terminated = Arc::new(AtomicBool::new(false));
        let (mut dispatcher, flows) = dispatcher(
            DispatcherConfig {
                report_stats: false,
                ..Default::default()
            },
            terminated.clone(),
        );
        let mut source =
            MemorySource::new(LinkType::Ethernet, packets(9)).cancel_after(4, terminated.clone());
        dispatcher.run(&mut source).unwrap();
        assert_eq!(source.consumed(), 4);
        assert!(source.stopped());
        assert_eq!(
            flows.borrow().iter().map(|f| f.total_packets()).sum::<u64>(),
            4
        );
        // a second shutdown is a no-op
        let exported = flows.borrow().len();
        dispatcher.shutdown(&mut source);
        assert_eq!(flows.borrow().len(), exported);
    }

    #[test]
    fn live_timeouts_drive_housekeeping() {
        let (mut dispatcher, flows) = dispatcher(
            DispatcherConfig {
                report_stats: false,
                ..Default::default()
            },
            Arc::new(AtomicBool::new(false)),
        );
        // packet time far in the past, wall clock housekeeping times them out
        let mut source = MemorySource::new(LinkType::Ethernet, packets(3)).live(2);
        dispatcher.run(&mut source).unwrap();
        let flows = flows.borrow();
        assert_eq!(flows.len(), 3);
        assert!(flows.iter().all(|f| f.close_type == CloseType::Timeout));
    }

    #[test]
    fn verbose_prints_packets() {
        let out = SharedBuffer::default();
        let (dispatcher, _) = dispatcher(
            DispatcherConfig {
                verbose: true,
                report_stats: false,
                ..Default::default()
            },
            Arc::new(AtomicBool::new(false)),
        );
        let mut dispatcher = dispatcher.with_packet_output(Box::new(out.clone()));
        let mut frames = packets(2);
        frames.push((Duration::from_secs(2), vec![0u8; 10]));
        let mut source = MemorySource::new(LinkType::Ethernet, frames);
        dispatcher.run(&mut source).unwrap();
        let text = out.text();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("[Packet] 10.0.0.1:40000 > 10.0.0.2:80"));
        assert!(lines[2].starts_with("[Packet] [discard] caplen: 10"));
    }

    #[test]
    fn verbose_follows_configured_tunnels() {
        let out = SharedBuffer::default();
        let flow_config = FlowMapConfig {
            tunnel_types: TunnelTypeBitmap::default(),
            ..Default::default()
        };
        let classifier = Classifier::new(flow_config, |_: Box<Flow>| {});
        let config = DispatcherConfig {
            verbose: true,
            report_stats: false,
            ..Default::default()
        };
        let mut dispatcher = Dispatcher::new(classifier, Arc::new(AtomicBool::new(false)), config)
            .with_packet_output(Box::new(out.clone()));
        let inner = tcp_v4_packet("192.168.1.1", 40000, "192.168.1.2", 80, TcpFlags::SYN, b"");
        let frame = vxlan_packet("10.0.0.1", "10.0.0.2", 5, &inner);
        let mut source = MemorySource::new(LinkType::Ethernet, vec![(Duration::from_secs(1), frame)]);
        dispatcher.run(&mut source).unwrap();
        assert!(out.text().starts_with("[Packet] 10.0.0.1:"));
    }

    #[test]
    fn stats_baseline_then_reports() {
        let out = SharedBuffer::default();
        let (dispatcher, _) = dispatcher(
            DispatcherConfig {
                // report on every iteration
                stats_interval: Duration::ZERO,
                ..Default::default()
            },
            Arc::new(AtomicBool::new(false)),
        );
        let mut dispatcher = dispatcher.with_stats_output(Box::new(out.clone()));
        let mut source = MemorySource::new(LinkType::Ethernet, packets(1)).live(2);
        dispatcher.run(&mut source).unwrap();
        assert!(out.text().starts_with("========================="));
        assert!(out.text().contains("Absolute Stats: [1 pkts rcvd][0 pkts dropped]"));
    }
}
