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

/// lookup3 initializer constant
const GOLDEN: u32 = 0xdead_beef;

/// Bob Jenkins lookup3 selection hash
pub struct Lookup3;

impl HashStrategy for Lookup3 {
    fn new() -> Self {
        Lookup3
    }

    fn hash(&self, bytes: &[u8], basis: u32) -> u32 {
        jhash_bytes(bytes, basis)
    }
}

fn mix(mut a: u32, mut b: u32, mut c: u32) -> (u32, u32, u32) {
    a = a.wrapping_sub(c); a ^= c.rotate_left(4); c = c.wrapping_add(b);
    b = b.wrapping_sub(a); b ^= a.rotate_left(6); a = a.wrapping_add(c);
    c = c.wrapping_sub(b); c ^= b.rotate_left(8); b = b.wrapping_add(a);
    a = a.wrapping_sub(c); a ^= c.rotate_left(16); c = c.wrapping_add(b);
    b = b.wrapping_sub(a); b ^= a.rotate_left(19); a = a.wrapping_add(c);
    c = c.wrapping_sub(b); c ^= b.rotate_left(4); b = b.wrapping_add(a);
    (a, b, c)
}

fn final_mix(mut a: u32, mut b: u32, mut c: u32) -> u32 {
    c ^= b; c = c.wrapping_sub(b.rotate_left(14));
    a ^= c; a = a.wrapping_sub(c.rotate_left(11));
    b ^= a; b = b.wrapping_sub(a.rotate_left(25));
    c ^= b; c = c.wrapping_sub(b.rotate_left(16));
    a ^= c; a = a.wrapping_sub(c.rotate_left(4));
    b ^= a; b = b.wrapping_sub(a.rotate_left(14));
    c ^= b; c = c.wrapping_sub(b.rotate_left(24));
    c
}

fn word(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

/// hash a byte sequence starting from the given basis
///
/// the message is consumed in 12-byte mixing blocks, a partial tail is
/// zero padded and runs the final avalanche, an exact block multiple
/// returns straight out of the last mix
pub fn jhash_bytes(bytes: &[u8], basis: u32) -> u32 {
    let seed = GOLDEN
        .wrapping_add(bytes.len() as u32)
        .wrapping_add(basis);
    let (mut a, mut b, mut c) = (seed, seed, seed);
    let mut blocks = bytes.chunks_exact(12);
    for block in &mut blocks {
        a = a.wrapping_add(word(block, 0));
        b = b.wrapping_add(word(block, 4));
        c = c.wrapping_add(word(block, 8));
        (a, b, c) = mix(a, b, c);
    }
    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut block = [0u8; 12];
        block[..tail.len()].copy_from_slice(tail);
        a = a.wrapping_add(word(&block, 0));
        b = b.wrapping_add(word(&block, 4));
        c = c.wrapping_add(word(&block, 8));
        c = final_mix(a, b, c);
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_flow_record() -> [u8; 36] {
        let mut record = [0u8; 36];
        record[16..20].copy_from_slice(&0xd8b2_0000u32.to_le_bytes());
        record[32..34].copy_from_slice(&0x6ace_u16.to_le_bytes());
        record
    }

    #[test]
    fn four_byte_message() {
        assert_eq!(jhash_bytes(&[0, 1, 2, 3], 0), 0xe4cf_1d42);
    }

    #[test]
    fn exact_block_multiple() {
        // 36 bytes is three full blocks, the avalanche must not run
        assert_eq!(jhash_bytes(&reference_flow_record(), 0), 0x3adc_bda7);
    }

    #[test]
    fn deterministic() {
        let message = b"maglev";
        assert_eq!(jhash_bytes(message, 42), jhash_bytes(message, 42));
        assert_ne!(jhash_bytes(message, 42), jhash_bytes(message, 43));
    }
}
