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

use tracing::debug;

use super::destination::Destination;
use super::table::MaglevState;
use crate::hash::HashStrategy;

/// destination claiming the primary slot of the key, available or not
fn slot_dest(state: &MaglevState, key_hash: u32) -> Option<&Arc<Destination>> {
    state.slot(key_hash % state.lookup_size())
}

/// resolve a key against the table
/// an empty slot or an unavailable destination yields none
pub(crate) fn resolve(state: &MaglevState, key_hash: u32) -> Option<Arc<Destination>> {
    match slot_dest(state, key_hash) {
        Some(dest) if dest.is_enabled() => Some(dest.clone()),
        _ => None,
    }
}

/// as resolve, but reprobe the table when the primary choice is unavailable
///
/// probes rehash the key with the skip family and stop at the first
/// empty probe slot, an empty primary slot is never reprobed
pub(crate) fn resolve_fallback<A: HashStrategy>(
    state: &MaglevState,
    key_hash: u32,
    hash_skip: &A,
) -> Option<Arc<Destination>> {
    let dest = slot_dest(state, key_hash)?;
    if dest.is_enabled() {
        return Some(dest.clone());
    }
    debug!(
        "selected unavailable destination (id={}:{}), reselecting",
        dest.group(),
        dest.id()
    );
    // walk the table starting from the key hash until an available
    // destination shows up
    for offset in 0..state.lookup_size() {
        let roffset = offset.wrapping_add(key_hash);
        let rehash = hash_skip.hash(&roffset.to_le_bytes(), 0);
        match slot_dest(state, rehash) {
            None => break,
            Some(dest) if dest.is_enabled() => return Some(dest.clone()),
            Some(dest) => {
                debug!(
                    "selected unavailable destination (id={}:{}, offset={roffset}), reselecting",
                    dest.group(),
                    dest.id()
                );
            }
        }
    }
    None
}
