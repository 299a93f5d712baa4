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

use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use pcap::{Active, Capture, Linktype, Offline};

use super::{CaptureStats, PacketSource};
use crate::common::enums::LinkType;
use crate::config::CaptureConfig;
use crate::dispatcher::error::{Error, Result};
use public::packet::Packet;

enum Handle {
    Live(Capture<Active>),
    Offline(Capture<Offline>),
}

// A libpcap handle on a live interface or a capture file.
pub struct PcapSource {
    handle: Option<Handle>,
    link_type: LinkType,
}

impl PcapSource {
    // Opens `device` as a live interface, falling back to reading it as a
    // capture file.
    pub fn open(device: &str, config: &CaptureConfig) -> Result<Self> {
        let live = Capture::from_device(device).and_then(|c| {
            c.promisc(config.promisc)
                .snaplen(config.snaplen)
                .timeout(config.read_timeout.as_millis() as i32)
                .open()
        });
        let handle = match live {
            Ok(capture) => {
                info!("opened interface {}", device);
                Handle::Live(capture)
            }
            Err(live) => match Capture::from_file(Path::new(device)) {
                Ok(capture) => {
                    debug!("{} is not an interface ({}), read as file", device, live);
                    Handle::Offline(capture)
                }
                Err(offline) => {
                    return Err(Error::OpenFailed {
                        device: device.to_owned(),
                        live,
                        offline,
                    })
                }
            },
        };
        let datalink = match &handle {
            Handle::Live(c) => c.get_datalink(),
            Handle::Offline(c) => c.get_datalink(),
        };
        Ok(Self {
            link_type: Self::link_type_of(datalink)?,
            handle: Some(handle),
        })
    }

    fn link_type_of(datalink: Linktype) -> Result<LinkType> {
        u16::try_from(datalink.0)
            .ok()
            .and_then(|l| LinkType::try_from(l).ok())
            .ok_or(Error::UnsupportedLinkType(datalink.0))
    }

    pub fn set_filter(&mut self, filter: &str) -> Result<()> {
        match self.handle.as_mut() {
            Some(Handle::Live(c)) => c.filter(filter, true)?,
            Some(Handle::Offline(c)) => c.filter(filter, true)?,
            None => (),
        }
        Ok(())
    }
}

impl PacketSource for PcapSource {
    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn next_packet(&mut self) -> Result<Option<Packet<'_>>> {
        let next = match self.handle.as_mut() {
            Some(Handle::Live(c)) => c.next(),
            Some(Handle::Offline(c)) => c.next(),
            None => return Err(Error::EndOfCapture),
        };
        match next {
            Ok(p) => {
                let ts = Duration::new(
                    p.header.ts.tv_sec as u64,
                    p.header.ts.tv_usec as u32 * 1000,
                );
                Ok(Some(Packet::new(ts, p.header.len, p.data)))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(pcap::Error::NoMorePackets) => Err(Error::EndOfCapture),
            Err(e) => Err(e.into()),
        }
    }

    fn stats(&mut self) -> Option<CaptureStats> {
        let Some(Handle::Live(c)) = self.handle.as_mut() else {
            return None;
        };
        c.stats().ok().map(|s| CaptureStats {
            received: s.received as u64,
            dropped: s.dropped as u64,
            if_dropped: s.if_dropped as u64,
        })
    }

    fn stop(&mut self) {
        if self.handle.take().is_some() {
            debug!("capture closed");
        }
    }

    fn is_live(&self) -> bool {
        matches!(self.handle, Some(Handle::Live(_)))
    }
}
