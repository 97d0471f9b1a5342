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

pub mod crc32c;
pub mod lookup3;

pub use crc32c::Crc32c;
pub use lookup3::Lookup3;

/// interface for deterministic 32-bit key hashing
///
/// any uniformly distributed implementation satisfies the contract, the
/// selection engine only requires that two independent families are used
/// for the offset and skip derivations
pub trait HashStrategy {
    /// new strategy instance
    fn new() -> Self;
    /// hash the given bytes starting from a basis value
    fn hash(&self, bytes: &[u8], basis: u32) -> u32;
}
