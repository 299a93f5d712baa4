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

use std::io::{self, Write};

use log::warn;

use crate::common::{
    enums::PacketDirection,
    flow::{Flow, FlowMetricsPeer},
};
use crate::flow_generator::{FlowExporter, ProtocolRegistry};

// Writes one `[Flow]` line per exported flow and, with l7 enabled, one
// `[Detected]` line per classified flow.
pub struct FlowPrinter<W: Write> {
    out: W,
    registry: ProtocolRegistry,
    l7: bool,
}

impl<W: Write> FlowPrinter<W> {
    pub fn new(out: W, registry: ProtocolRegistry, l7: bool) -> Self {
        Self { out, registry, l7 }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn write_l7(&mut self, flow: &Flow) -> io::Result<()> {
        write!(
            self.out,
            "l7: {}, category: {}, tunnelType: {}",
            self.registry.protocol_name(&flow.l7_protocol),
            flow.category,
            u8::from(flow.tunnel_type)
        )
    }

    fn write_peer(&mut self, name: &str, peer: &FlowMetricsPeer) -> io::Result<()> {
        write!(
            self.out,
            "{}: {{ Packets: {}, Bytes: {}, First: {}, Last: {} }}",
            name, peer.packet_count, peer.byte_count, peer.first, peer.last
        )
    }

    fn write_flow(&mut self, flow: &Flow) -> io::Result<()> {
        write!(self.out, "[Flow] ")?;
        if self.l7 {
            self.write_l7(flow)?;
            write!(self.out, ", ")?;
        }
        let (src_ip, src_port) = flow.client();
        let (dst_ip, dst_port) = flow.server();
        write!(
            self.out,
            "srcIp: {}, dstIp: {}, srcPort: {}, dstPort: {}, protocol: {}, tcpFlags: 0x{:02X}, ",
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            flow.flow_key.proto,
            flow.tcp_flags().bits()
        )?;
        self.write_peer("c2s", flow.peer(PacketDirection::ClientToServer))?;
        write!(self.out, ", ")?;
        self.write_peer("s2c", flow.peer(PacketDirection::ServerToClient))?;
        writeln!(self.out)
    }
}

impl<W: Write> FlowExporter for FlowPrinter<W> {
    fn export(&mut self, flow: Box<Flow>) {
        if let Err(e) = self.write_flow(&flow) {
            warn!("print flow {} failed: {}", flow.flow_id, e);
        }
    }

    fn l7_detected(&mut self, flow: &Flow) {
        if !self.l7 {
            return;
        }
        let result = write!(self.out, "[Detected] ")
            .and_then(|_| self.write_l7(flow))
            .and_then(|_| writeln!(self.out));
        if let Err(e) = result {
            warn!("print flow {} failed: {}", flow.flow_id, e);
        }
    }
}
