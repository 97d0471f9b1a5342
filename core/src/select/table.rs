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

use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use tracing::debug;

use super::destination::{Destination, DestinationSet};
use super::error::BuildError;
use super::permutation::PermutationEntry;

/// valid lookup table sizes, all prime
const TABLE_PRIMES: [u32; 11] = [
    11, 251, 509, 1021, 2039, 4093, 8191, 16381, 32749, 65521, 131071,
];

/// default table size index, used when the given index is out of range
pub const DEFAULT_TABLE_INDEX: u32 = 5;

/// map a table size index to its prime slot count
/// index 0 is small enough to trace table behavior by hand
pub fn table_size(index: u32) -> u32 {
    let index = if index as usize >= TABLE_PRIMES.len() {
        DEFAULT_TABLE_INDEX
    } else {
        index
    };
    TABLE_PRIMES[index as usize]
}

/// fixed-size occupancy bitmap over the lookup slots
struct SlotBitmap {
    words: Vec<u64>,
}

impl SlotBitmap {
    fn new(bits: u32) -> Result<Self, BuildError> {
        let len = (bits as usize + 63) / 64;
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| BuildError::Allocation)?;
        words.resize(len, 0);
        Ok(SlotBitmap { words })
    }

    fn test(&self, bit: u32) -> bool {
        self.words[bit as usize / 64] & (1u64 << (bit % 64)) != 0
    }

    fn set(&mut self, bit: u32) {
        self.words[bit as usize / 64] |= 1u64 << (bit % 64);
    }
}

/// one published lookup table
///
/// immutable once populated, shared ownership is counted and the slot
/// array is freed only when the last holder releases its reference, so
/// a rebuild never invalidates a reader mid-lookup
#[derive(Debug)]
pub struct MaglevState {
    /// lookup slots, one optional destination reference each
    lookup: Box<[Option<Arc<Destination>>]>,
    /// weight gcd this table was built with
    gcd: u32,
    /// weight shift this table was built with
    rshift: u32,
}

impl MaglevState {
    /// allocate an all-empty state for the given table size
    pub(crate) fn empty(table_size: u32, gcd: u32, rshift: u32) -> Result<Self, BuildError> {
        let mut lookup = Vec::new();
        lookup
            .try_reserve_exact(table_size as usize)
            .map_err(|_| BuildError::Allocation)?;
        lookup.resize(table_size as usize, None);
        debug!("alloc maglev state: lookup_size={table_size}");
        Ok(MaglevState {
            lookup: lookup.into_boxed_slice(),
            gcd,
            rshift,
        })
    }

    /// number of lookup slots
    pub fn lookup_size(&self) -> u32 {
        self.lookup.len() as u32
    }

    pub fn gcd(&self) -> u32 {
        self.gcd
    }

    pub fn rshift(&self) -> u32 {
        self.rshift
    }

    /// destination currently claiming the given slot
    pub fn slot(&self, at: u32) -> Option<&Arc<Destination>> {
        self.lookup[at as usize].as_ref()
    }

    /// count claimed slots per destination id
    pub fn occupancy(&self) -> HashMap<u32, u32> {
        let mut counts = HashMap::new();
        for dest in self.lookup.iter().flatten() {
            *counts.entry(dest.id()).or_insert(0) += 1;
        }
        counts
    }

    /// fill the slot array round robin from the permutation walks
    ///
    /// the destination whose turn is current claims its preferred free
    /// slots, stepping the cursor by skip past occupied ones, until the
    /// whole table is filled
    pub(crate) fn populate(
        &mut self,
        set: &DestinationSet,
        entries: &mut [PermutationEntry],
    ) -> Result<(), BuildError> {
        let table_size = self.lookup_size();
        debug_assert!(entries.iter().any(|entry| entry.turns > 0));
        let mut occupied = SlotBitmap::new(table_size)?;
        let mut filled = 0;
        'filling: loop {
            for (dest, entry) in set.iter().zip(entries.iter_mut()) {
                // zero turns claim nothing but stay in the set
                if entry.turns < 1 {
                    continue;
                }
                for _ in 0..entry.turns {
                    let mut slot = entry.cursor;
                    while occupied.test(slot) {
                        slot = (slot + entry.skip) % table_size;
                    }
                    occupied.set(slot);
                    self.lookup[slot as usize] = Some(dest.clone());
                    entry.cursor = (slot + entry.skip) % table_size;
                    filled += 1;
                    if filled == table_size {
                        break 'filling;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for MaglevState {
    fn drop(&mut self) {
        debug!("free maglev state: lookup_size={}", self.lookup_size());
    }
}
