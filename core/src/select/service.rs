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

use arc_swap::ArcSwapOption;
use http::Extensions;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::destination::{Destination, DestinationSet};
use super::error::BuildError;
use super::lookup;
use super::permutation::{self, WeightScale};
use super::table::{self, MaglevState};
use crate::hash::{Crc32c, HashStrategy, Lookup3};

/// weighted maglev selection service
///
/// owns the destination set and the currently published lookup state,
/// readers resolve keys against the published state while one owner
/// mutates the set and triggers rebuilds
///
/// the skip family A also drives fallback reprobing, the offset family
/// B must be independent from it
pub struct MaglevService<A = Crc32c, B = Lookup3> {
    /// destinations to select between, single writer
    destinations: Mutex<DestinationSet>,
    /// currently published lookup state, swapped atomically on rebuild
    state: ArcSwapOption<MaglevState>,
    /// service group id stamped on every destination
    group: u32,
    /// lookup slot count, fixed for the service lifetime
    table_size: u32,
    /// reselect when the primary destination is unavailable
    fallback: bool,
    /// hash family deriving skip values and fallback probes
    hash_skip: A,
    /// hash family deriving permutation offsets
    hash_offset: B,
}

impl MaglevService {
    /// new service with the stock hash families
    pub fn new(group: u32, table_index: u32) -> Self {
        Self::with_strategies(group, table_index)
    }
}

impl<A: HashStrategy, B: HashStrategy> MaglevService<A, B> {
    /// new service with caller-supplied hash strategies
    pub fn with_strategies(group: u32, table_index: u32) -> Self {
        let table_size = table::table_size(table_index);
        info!("new maglev service: group={group}, table_size={table_size}");
        MaglevService {
            destinations: Mutex::new(DestinationSet::new()),
            state: ArcSwapOption::empty(),
            group,
            table_size,
            fallback: false,
            hash_skip: A::new(),
            hash_offset: B::new(),
        }
    }

    /// set fallback reselection on unavailable destinations
    pub fn with_fallback(&mut self, enabled: bool) {
        self.fallback = enabled;
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.lock().len()
    }

    /// add a new destination or update an existing one by id
    /// returns true when the change warrants a rebuild
    pub fn add_or_update(&self, id: u32, weight: u32, extension: Extensions) -> bool {
        self.destinations
            .lock()
            .add_or_update(id, self.group, weight, extension)
    }

    /// remove a destination by id
    /// already published tables keep serving it until the next rebuild
    pub fn remove(&self, id: u32) -> bool {
        self.destinations.lock().remove(id)
    }

    /// flip lookup-time availability of a destination
    /// takes effect immediately, also through already published tables
    pub fn set_enabled(&self, id: u32, enabled: bool) -> bool {
        match self.destinations.lock().get(id) {
            Some(dest) => {
                debug!("set destination enabled: id={}:{id}, enabled={enabled}", self.group);
                dest.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// rebuild the lookup table from the current destination set
    ///
    /// the table is built into a private scratch state and published
    /// with one atomic swap, a failed build leaves the published state
    /// untouched except for the degenerate weight reset
    pub fn build(&self) -> Result<(), BuildError> {
        let destinations = self.destinations.lock();
        let count = destinations.len();
        info!(
            "building maglev lookup table: group={}, table_size={}, dest_cnt={count}",
            self.group, self.table_size
        );
        if count > self.table_size as usize {
            return Err(BuildError::TooManyDestinations {
                count,
                table_size: self.table_size,
            });
        }
        // freeze the configured weights for this build
        for dest in destinations.iter() {
            dest.snapshot_weight();
        }
        let scale = WeightScale::from_set(&destinations, self.table_size);
        if scale.is_degenerate() {
            // nothing carries weight, drop every lookup instead of
            // serving a stale table until a rebuild succeeds
            warn!(
                "no positive-weight destination: group={}, resetting lookup table",
                self.group
            );
            let reset = MaglevState::empty(self.table_size, 0, 0)?;
            self.state.store(Some(Arc::new(reset)));
            return Err(BuildError::DegenerateWeights);
        }
        let mut entries = permutation::permutation_entries(
            &destinations,
            self.table_size,
            scale,
            &self.hash_skip,
            &self.hash_offset,
        )?;
        let mut scratch = MaglevState::empty(self.table_size, scale.gcd, scale.rshift)?;
        scratch.populate(&destinations, &mut entries)?;
        // publish, the previous state stays alive for current holders
        self.state.store(Some(Arc::new(scratch)));
        self.log_occupancy(&destinations);
        Ok(())
    }

    /// resolve a flow key hash to a destination
    ///
    /// total and side-effect free, none means no eligible destination
    pub fn lookup(&self, key_hash: u32) -> Option<Arc<Destination>> {
        let state = self.state.load();
        let state = state.as_ref()?;
        if self.fallback {
            lookup::resolve_fallback(state, key_hash, &self.hash_skip)
        } else {
            lookup::resolve(state, key_hash)
        }
    }

    /// take a counted reference on the current state
    /// the state stays valid for this holder across rebuilds
    pub fn hold_state(&self) -> Option<Arc<MaglevState>> {
        self.state.load_full()
    }

    /// log how many slots every destination claimed
    fn log_occupancy(&self, destinations: &DestinationSet) {
        if let Some(state) = self.state.load_full() {
            let counts = state.occupancy();
            for dest in destinations.iter() {
                debug!(
                    "maglev dest: id={}:{}, weight={}, slot_cnt={}",
                    dest.group(),
                    dest.id(),
                    dest.last_weight(),
                    counts.get(&dest.id()).copied().unwrap_or(0)
                );
            }
        }
    }
}
