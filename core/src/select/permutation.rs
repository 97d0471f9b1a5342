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

use super::destination::DestinationSet;
use super::error::BuildError;
use crate::hash::HashStrategy;

/// weight normalization over one destination set snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightScale {
    /// gcd across the positive weight snapshots, 0 when none exist
    pub gcd: u32,
    /// right shift bounding how many slots extreme ratios can claim
    pub rshift: u32,
}

impl WeightScale {
    /// derive gcd and shift from the snapshot weights of the set
    pub fn from_set(set: &DestinationSet, table_size: u32) -> Self {
        let gcd = gcd_weight(set);
        let rshift = shift_weight(set, table_size, gcd);
        WeightScale { gcd, rshift }
    }

    /// no destination carries a positive weight
    pub fn is_degenerate(&self) -> bool {
        self.gcd < 1
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn gcd_weight(set: &DestinationSet) -> u32 {
    let mut g = 0;
    for dest in set.iter() {
        let weight = dest.last_weight();
        if weight > 0 {
            g = if g > 0 { gcd(weight, g) } else { weight };
        }
    }
    g
}

/// highest set bit position, one based, 0 for a zero value
fn fls(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// shift value keeping huge weight ratios within the table precision
///
/// the shift is the occupied bits of max_weight/gcd above half the bit
/// length of the table size
fn shift_weight(set: &DestinationSet, table_size: u32, gcd: u32) -> u32 {
    if gcd < 1 {
        return 0;
    }
    let max_weight = set.iter().map(|d| d.last_weight()).max().unwrap_or(0);
    let table_bits = fls(table_size) / 2;
    let shift = fls(max_weight / gcd) as i32 - table_bits as i32;
    shift.max(0) as u32
}

/// per-destination permutation walk state, lives for one build only
#[derive(Debug)]
pub struct PermutationEntry {
    /// starting slot
    pub offset: u32,
    /// step between candidate slots, always in [1, M-1]
    /// the table size is prime so the walk covers every slot
    pub skip: u32,
    /// next candidate slot
    pub cursor: u32,
    /// slots this destination claims per population round
    pub turns: u32,
}

/// derive the permutation walk of every destination in set order
///
/// the caller must have ruled out a degenerate scale first
pub fn permutation_entries<A, B>(
    set: &DestinationSet,
    table_size: u32,
    scale: WeightScale,
    hash_skip: &A,
    hash_offset: &B,
) -> Result<Vec<PermutationEntry>, BuildError>
where
    A: HashStrategy,
    B: HashStrategy,
{
    debug_assert!(scale.gcd >= 1);
    let mut entries = Vec::new();
    entries
        .try_reserve_exact(set.len())
        .map_err(|_| BuildError::Allocation)?;
    for dest in set.iter() {
        let key = dest.id().to_le_bytes();
        let offset = hash_offset.hash(&key, 0) % table_size;
        let skip = hash_skip.hash(&key, 0) % (table_size - 1) + 1;
        let scaled = (dest.last_weight() / scale.gcd) >> scale.rshift;
        // a present destination with any weight still claims one slot
        let turns = if scaled != 0 {
            scaled
        } else {
            (dest.last_weight() != 0) as u32
        };
        entries.push(PermutationEntry {
            offset,
            skip,
            cursor: offset,
            turns,
        });
    }
    Ok(entries)
}
