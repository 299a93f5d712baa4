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

// Readers without the `get_` prefix expect the caller to have checked the
// length already and panic otherwise. The `get_` variants are used on
// untrusted packet data and return None when the slice is too short.

pub fn read_u16_be(bs: &[u8]) -> u16 {
    assert!(bs.len() >= 2);
    u16::from_be_bytes([bs[0], bs[1]])
}

pub fn read_u32_be(bs: &[u8]) -> u32 {
    assert!(bs.len() >= 4);
    u32::from_be_bytes([bs[0], bs[1], bs[2], bs[3]])
}

pub fn get_u8(bs: &[u8], offset: usize) -> Option<u8> {
    bs.get(offset).copied()
}

pub fn get_u16_be(bs: &[u8], offset: usize) -> Option<u16> {
    bs.get(offset..offset.checked_add(2)?).map(read_u16_be)
}

pub fn get_u32_be(bs: &[u8], offset: usize) -> Option<u32> {
    bs.get(offset..offset.checked_add(4)?).map(read_u32_be)
}

pub fn get_array<const N: usize>(bs: &[u8], offset: usize) -> Option<[u8; N]> {
    bs.get(offset..offset.checked_add(N)?)?.try_into().ok()
}
