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

// Header sizes and field offsets. Offsets are relative to the start of the
// header they belong to, so they apply at any depth of encapsulation.

pub const ETH_HEADER_SIZE: usize = 14;
pub const VLAN_HEADER_SIZE: usize = 4;
pub const VLAN_ID_MASK: u16 = 0xfff;
pub const NULL_HEADER_SIZE: usize = 4;
pub const LINUX_SLL_HEADER_SIZE: usize = 16;

pub const FIELD_OFFSET_ETH_TYPE: usize = 12;
pub const FIELD_OFFSET_SLL_PROTOCOL: usize = 14;

pub const IPV4_HEADER_SIZE: usize = 20;
pub const IPV4_FRAG_OFFSET_MASK: u16 = 0x1fff;
pub const IPV4_OFFSET_FRAG: usize = 6;
pub const IPV4_OFFSET_PROTO: usize = 9;
pub const IPV4_OFFSET_SIP: usize = 12;
pub const IPV4_OFFSET_DIP: usize = 16;
pub const IPV4_ADDR_LEN: usize = 4;

pub const IPV6_HEADER_SIZE: usize = 40;
pub const IPV6_OFFSET_NEXT_HEADER: usize = 6;
pub const IPV6_OFFSET_SIP: usize = 8;
pub const IPV6_OFFSET_DIP: usize = 24;
pub const IPV6_ADDR_LEN: usize = 16;
pub const IPV6_FRAGMENT_HEADER_SIZE: usize = 8;
pub const IPV6_MAX_EXTENSION_HEADERS: usize = 8;

pub const PORTS_SIZE: usize = 4;
pub const UDP_HEADER_SIZE: usize = 8;
pub const TCP_HEADER_SIZE: usize = 20;
pub const TCP_OFFSET_DATA_OFFSET: usize = 12;
pub const TCP_OFFSET_FLAGS: usize = 13;

pub const VXLAN_HEADER_SIZE: usize = 8;
pub const VXLAN_FLAGS: u8 = 0x08;
pub const VXLAN_OFFSET_VNI: usize = 4;
pub const VXLAN_PORTS: [u16; 3] = [4789, 8472, 6784];

pub const GENEVE_HEADER_SIZE: usize = 8;
pub const GENEVE_PORT: u16 = 6081;
pub const GENEVE_VERSION_SHIFT: u8 = 6;
pub const GENEVE_OPTION_LENGTH_MASK: u8 = 0x3f;
pub const GENEVE_OFFSET_PROTOCOL: usize = 2;
pub const GENEVE_OFFSET_VNI: usize = 4;

pub const GRE_HEADER_SIZE: usize = 4;
pub const GRE_FLAGS_OFFSET: usize = 0;
pub const GRE_PROTOCOL_OFFSET: usize = 2;
pub const GRE_FLAGS_VER_MASK: u16 = 0x7;
pub const GRE_FLAGS_SEQ_MASK: u16 = 1 << 12;
pub const GRE_FLAGS_KEY_MASK: u16 = 1 << 13;
pub const GRE_FLAGS_ROUTING_MASK: u16 = 1 << 14;
pub const GRE_FLAGS_CSUM_MASK: u16 = 1 << 15;
pub const GRE_CSUM_LEN: usize = 4;
pub const GRE_KEY_LEN: usize = 4;
pub const GRE_SEQ_LEN: usize = 4;
