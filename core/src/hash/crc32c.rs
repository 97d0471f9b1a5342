//! Copyright (c) 2025-2026 Magsel, Inc.
//!
//! This file is part of Magsel
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU Affero General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU Affero General Public License for more details.
//!
//! You should have received a copy of the GNU Affero General Public License
//! along with this program.  If not, see <http://www.gnu.org/licenses/>.

use super::HashStrategy;

/// the CRC-32C (Castagnoli) polynomial, reflected form
/// this is the same polynomial the SSE4.2 crc32 instruction implements
const CRC32C_POLY: u32 = 0x82f6_3b78;

/// finishing multiplier folded with the length round
const FINISH_MULTIPLIER: u32 = 0x8052_04f3;

/// software crc32c selection hash
///
/// accumulates the raw crc rounds without the pre/post inversion of the
/// standard reflected CRC-32C, so it matches the hardware crc32
/// instruction applied word by word
pub struct Crc32c;

impl HashStrategy for Crc32c {
    fn new() -> Self {
        Crc32c
    }

    fn hash(&self, bytes: &[u8], basis: u32) -> u32 {
        hash_bytes(bytes, basis)
    }
}

/// one crc round over a single byte
fn crc_byte(mut crc: u32, data: u8) -> u32 {
    crc ^= data as u32;
    for _ in 0..8 {
        if crc & 1 != 0 {
            crc = (crc >> 1) ^ CRC32C_POLY;
        } else {
            crc >>= 1;
        }
    }
    crc
}

/// accumulate one 32-bit word
fn crc_u32(mut crc: u32, value: u32) -> u32 {
    for byte in value.to_le_bytes() {
        crc = crc_byte(crc, byte);
    }
    crc
}

/// accumulate one 64-bit word
fn crc_u64(mut crc: u32, value: u64) -> u32 {
    for byte in value.to_le_bytes() {
        crc = crc_byte(crc, byte);
    }
    crc
}

/// fold the accumulated crc with the total message length
/// the final xor shift increases entropy in the low bits
fn finish(hash: u32, len: u64) -> u32 {
    let hash = crc_u64(hash, len).wrapping_mul(FINISH_MULTIPLIER);
    hash ^ (hash >> 16)
}

/// hash a byte sequence starting from the given basis
///
/// the message is consumed as little-endian 32-bit words, a partial tail
/// is zero padded into a full word before its round
pub fn hash_bytes(bytes: &[u8], basis: u32) -> u32 {
    let mut hash = basis;
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        hash = crc_u32(hash, u32::from_le_bytes(chunk.try_into().unwrap()));
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut word = [0u8; 4];
        word[..tail.len()].copy_from_slice(tail);
        hash = crc_u32(hash, u32::from_le_bytes(word));
    }
    finish(hash, bytes.len() as u64)
}
