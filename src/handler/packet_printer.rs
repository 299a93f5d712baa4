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

use public::packet::Packet;

use crate::common::{
    decapsulate::TunnelTypeBitmap,
    enums::LinkType,
    MetaPacket,
};
use crate::policy::Action;

// Verbose `[Packet]` lines, one per captured packet.
pub struct PacketPrinter<W: Write> {
    out: W,
    tunnel_types: TunnelTypeBitmap,
}

impl<W: Write> PacketPrinter<W> {
    // Decapsulates the same tunnel types as the classifier.
    pub fn new(out: W, tunnel_types: TunnelTypeBitmap) -> Self {
        Self { out, tunnel_types }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn print(&mut self, packet: &Packet, link_type: LinkType, action: Action) -> io::Result<()> {
        let discard = if action == Action::Discard {
            " [discard]"
        } else {
            ""
        };
        let mut meta_packet = MetaPacket::empty();
        match meta_packet.update(
            packet.data,
            link_type,
            packet.timestamp,
            packet.original_length,
            &self.tunnel_types,
        ) {
            Ok(_) => writeln!(self.out, "[Packet]{} {}", discard, meta_packet),
            Err(e) => writeln!(
                self.out,
                "[Packet]{} caplen: {} len: {} ({})",
                discard,
                packet.capture_length(),
                packet.original_length,
                e
            ),
        }
    }
}
