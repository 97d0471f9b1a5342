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

use std::collections::BTreeSet;
use std::sync::Arc;

use http::Extensions;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use magsel::hash::{crc32c, HashStrategy};
use magsel::select::error::BuildError;
use magsel::select::service::MaglevService;

/// the flow key hash of the reference trace
/// 172.20.88.194:52794 -> 172.20.234.26:80 over tcp
const REFERENCE_KEY: u32 = 0x5271_e49c;

const GROUP: u32 = 49394;

fn service_with(table_index: u32, dests: &[(u32, u32)]) -> MaglevService {
    let service = MaglevService::new(GROUP, table_index);
    for &(id, weight) in dests {
        service.add_or_update(id, weight, Extensions::new());
    }
    service
}

/// dump the table as a vector of claiming destination ids
fn table_ids(service: &MaglevService) -> Vec<Option<u32>> {
    let state = service.hold_state().expect("state published");
    (0..state.lookup_size())
        .map(|at| state.slot(at).map(|dest| dest.id()))
        .collect()
}

/// find a key hash whose primary slot is claimed by the given id
fn key_owned_by(service: &MaglevService, id: u32) -> u32 {
    let state = service.hold_state().expect("state published");
    (0..state.lookup_size())
        .find(|&key| state.slot(key).map(|dest| dest.id()) == Some(id))
        .expect("destination claims at least one slot")
}

#[test]
fn determinism_across_rebuilds() {
    let service = service_with(5, &[(1, 10), (2, 20), (3, 30)]);
    service.build().unwrap();
    let first = table_ids(&service);
    service.build().unwrap();
    assert_eq!(first, table_ids(&service));

    // an independently built service over the same set agrees slot by slot
    let other = service_with(5, &[(1, 10), (2, 20), (3, 30)]);
    other.build().unwrap();
    assert_eq!(first, table_ids(&other));
}

#[test]
fn equal_weights_spread_within_one_slot() {
    let service = service_with(5, &[(1, 10), (2, 10), (3, 10)]);
    service.build().unwrap();
    let state = service.hold_state().unwrap();
    let counts = state.occupancy();
    assert_eq!(counts.len(), 3);
    let min = counts.values().min().copied().unwrap();
    let max = counts.values().max().copied().unwrap();
    assert!(max - min <= 1, "uneven spread: min={min}, max={max}");
    assert_eq!(counts.values().sum::<u32>(), state.lookup_size());
}

#[test]
fn every_weighted_destination_covers_a_slot() {
    // the heavy destination dwarfs the light ones after scaling
    let service = service_with(5, &[(1, 1), (2, 100_000), (3, 7)]);
    service.build().unwrap();
    let counts = service.hold_state().unwrap().occupancy();
    for id in [1, 2, 3] {
        assert!(
            counts.get(&id).copied().unwrap_or(0) >= 1,
            "destination {id} claims no slot"
        );
    }
}

#[test]
fn scenario_three_equal_destinations() {
    // table index 5, three destinations of weight 10, the reference key
    // must keep resolving to the same bucket across rebuilds
    let service = service_with(5, &[(1, 10), (2, 10), (3, 10)]);
    service.build().unwrap();
    let first = service.lookup(REFERENCE_KEY).expect("bucket selected").id();
    assert!((1..=3).contains(&first));

    service.build().unwrap();
    assert_eq!(service.lookup(REFERENCE_KEY).unwrap().id(), first);

    let other = service_with(5, &[(1, 10), (2, 10), (3, 10)]);
    other.build().unwrap();
    assert_eq!(other.lookup(REFERENCE_KEY).unwrap().id(), first);
}

#[test]
fn scenario_reference_trace_bucket() {
    // reconstruct the reference key the way the packet path derives it:
    // crc over the protocol byte, then over the folded flow record
    let mut record = [0u8; 36];
    let ip = 0xc258_14acu32 ^ 0x1aea_14ac;
    record[16..20].copy_from_slice(&ip.to_le_bytes());
    let port = 0x3ace_u16 ^ 0x5000;
    record[32..34].copy_from_slice(&port.to_le_bytes());
    let key = crc32c::hash_bytes(&record, crc32c::hash_bytes(&[6], 0));
    assert_eq!(key, REFERENCE_KEY);

    // six equal-weight buckets, the trace selected bucket 5
    let service = service_with(
        5,
        &[(1, 50), (2, 50), (3, 50), (4, 50), (5, 50), (6, 50)],
    );
    service.build().unwrap();
    assert_eq!(service.lookup(key).unwrap().id(), 5);
}

#[test]
fn destination_count_boundaries() {
    // as many destinations as slots still builds, one slot each
    let dests: Vec<(u32, u32)> = (1..=11).map(|id| (id, 1)).collect();
    let service = service_with(0, &dests);
    service.build().unwrap();
    let counts = service.hold_state().unwrap().occupancy();
    assert_eq!(counts.len(), 11);
    assert!(counts.values().all(|&count| count == 1));

    // one more is rejected and the published table stays intact
    let before = table_ids(&service);
    assert!(service.add_or_update(12, 1, Extensions::new()));
    assert_eq!(
        service.build(),
        Err(BuildError::TooManyDestinations {
            count: 12,
            table_size: 11
        })
    );
    assert_eq!(before, table_ids(&service));
    assert!(service.lookup(3).is_some());

    // the count check fires before weight inspection
    let empty_weights: Vec<(u32, u32)> = (1..=12).map(|id| (id, 0)).collect();
    let service = service_with(0, &empty_weights);
    assert_eq!(
        service.build(),
        Err(BuildError::TooManyDestinations {
            count: 12,
            table_size: 11
        })
    );
}

#[test]
fn add_then_remove_round_trips() {
    let service = service_with(5, &[(1, 10), (2, 10), (3, 10)]);
    service.build().unwrap();
    let baseline = table_ids(&service);

    service.add_or_update(4, 10, Extensions::new());
    service.build().unwrap();
    assert_ne!(baseline, table_ids(&service));

    service.remove(4);
    service.build().unwrap();
    let rebuilt = table_ids(&service);
    assert_eq!(baseline, rebuilt);
    assert!(rebuilt.iter().all(|id| *id != Some(4)));
}

#[test]
fn removal_disrupts_a_small_fraction() {
    let mut rng = StdRng::seed_from_u64(0x4d61_676c);
    let mut ids = BTreeSet::new();
    while ids.len() < 8 {
        ids.insert(rng.gen_range(1..1_000_000u32));
    }
    let dests: Vec<(u32, u32)> = ids.iter().map(|&id| (id, 10)).collect();

    let service = service_with(5, &dests);
    service.build().unwrap();
    let before = table_ids(&service);

    let removed = dests[3].0;
    service.remove(removed);
    service.build().unwrap();
    let after = table_ids(&service);

    // identical to a from-scratch build over the surviving set
    let survivors: Vec<(u32, u32)> =
        dests.iter().copied().filter(|&(id, _)| id != removed).collect();
    let fresh = service_with(5, &survivors);
    fresh.build().unwrap();
    assert_eq!(after, table_ids(&fresh));
    assert!(after.iter().all(|id| *id != Some(removed)));

    // slots the removed destination held must move, the survivors keep
    // all but a small fraction of theirs
    let mut survivor_slots = 0u32;
    let mut survivor_moved = 0u32;
    for (old, new) in before.iter().zip(after.iter()) {
        if *old == Some(removed) {
            continue;
        }
        survivor_slots += 1;
        if old != new {
            survivor_moved += 1;
        }
    }
    let moved_fraction = survivor_moved as f64 / survivor_slots as f64;
    assert!(
        moved_fraction < 0.25,
        "too much disruption among survivors: {moved_fraction:.3}"
    );
}

#[test]
fn fallback_reselects_around_unavailable_destination() {
    let mut service = service_with(5, &[(1, 10), (2, 10), (3, 10)]);
    service.build().unwrap();
    let key = key_owned_by(&service, 2);
    assert_eq!(service.lookup(key).unwrap().id(), 2);

    // without fallback a disabled primary yields nothing
    service.set_enabled(2, false);
    assert!(service.lookup(key).is_none());

    // with fallback the probe sequence lands on an available one
    service.with_fallback(true);
    let reselected = service.lookup(key).expect("fallback selects");
    assert_ne!(reselected.id(), 2);
    assert!(reselected.is_enabled());

    // back to available, the primary wins again
    service.set_enabled(2, true);
    assert_eq!(service.lookup(key).unwrap().id(), 2);
}

#[test]
fn disabled_destination_still_claims_slots_at_build() {
    let service = service_with(5, &[(1, 10), (2, 10), (3, 10)]);
    service.set_enabled(1, false);
    service.build().unwrap();
    // the build ignores availability, only lookups do
    let counts = service.hold_state().unwrap().occupancy();
    assert!(counts.get(&1).copied().unwrap_or(0) > 0);
    let key = key_owned_by(&service, 1);
    assert!(service.lookup(key).is_none());
}

#[test]
fn draining_weight_claims_nothing() {
    // a raw weight of zero is excluded before scaling, the minimum-turn
    // rule applies only to weights that scale down to zero
    let service = service_with(5, &[(1, 10), (2, 10), (3, 0)]);
    service.build().unwrap();
    let state = service.hold_state().unwrap();
    let counts = state.occupancy();
    assert_eq!(counts.get(&3), None);
    assert_eq!(counts.values().sum::<u32>(), state.lookup_size());
    // the draining destination remains a set member
    assert_eq!(service.destination_count(), 3);
}

#[test]
fn degenerate_weights_reset_and_recover() {
    let service = service_with(5, &[(1, 0), (2, 0)]);
    assert!(service.lookup(REFERENCE_KEY).is_none());

    assert_eq!(service.build(), Err(BuildError::DegenerateWeights));
    // the reset table is published, every lookup misses
    let state = service.hold_state().expect("reset table published");
    assert!((0..state.lookup_size()).all(|at| state.slot(at).is_none()));
    assert!(service.lookup(REFERENCE_KEY).is_none());

    // one positive weight brings the service back
    service.add_or_update(1, 10, Extensions::new());
    service.build().unwrap();
    assert_eq!(service.lookup(REFERENCE_KEY).unwrap().id(), 1);
}

#[test]
fn held_state_survives_a_rebuild() {
    let service = service_with(5, &[(1, 10), (2, 10), (3, 10)]);
    service.build().unwrap();
    let held = service.hold_state().unwrap();
    let before: Vec<Option<u32>> = (0..held.lookup_size())
        .map(|at| held.slot(at).map(|dest| dest.id()))
        .collect();

    service.remove(2);
    service.build().unwrap();

    // the holder keeps reading the pre-rebuild table
    let after: Vec<Option<u32>> = (0..held.lookup_size())
        .map(|at| held.slot(at).map(|dest| dest.id()))
        .collect();
    assert_eq!(before, after);
    assert!(after.iter().any(|id| *id == Some(2)));
    // while the service already serves the new one
    assert!(table_ids(&service).iter().all(|id| *id != Some(2)));
}

#[test]
fn concurrent_lookups_during_rebuilds() {
    let service = Arc::new(service_with(5, &[(1, 10), (2, 10), (3, 10)]));
    service.build().unwrap();

    let readers: Vec<_> = (0..4)
        .map(|seed| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..20_000 {
                    if let Some(dest) = service.lookup(rng.gen()) {
                        assert!((1..=4).contains(&dest.id()));
                    }
                }
            })
        })
        .collect();

    // churn the set while the readers hammer the table
    for round in 0..50 {
        if round % 2 == 0 {
            service.add_or_update(4, 10, Extensions::new());
        } else {
            service.remove(4);
        }
        service.build().unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn caller_supplied_hash_strategies() {
    struct SplitMix;

    impl HashStrategy for SplitMix {
        fn new() -> Self {
            SplitMix
        }

        fn hash(&self, bytes: &[u8], basis: u32) -> u32 {
            let mut hash = 0x9e37_79b9u32.wrapping_add(basis);
            for &byte in bytes {
                hash ^= byte as u32;
                hash = hash.wrapping_mul(0x85eb_ca6b);
                hash ^= hash >> 13;
            }
            hash
        }
    }

    let service: MaglevService<SplitMix, SplitMix> =
        MaglevService::with_strategies(GROUP, 5);
    for id in 1..=3 {
        service.add_or_update(id, 10, Extensions::new());
    }
    service.build().unwrap();
    let first = service.lookup(REFERENCE_KEY).expect("bucket selected").id();
    assert!((1..=3).contains(&first));
    service.build().unwrap();
    assert_eq!(service.lookup(REFERENCE_KEY).unwrap().id(), first);
}
