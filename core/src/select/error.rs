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

use thiserror::Error;

/// errors surfaced from a lookup table build
///
/// a failed build never reaches the lookup path, the service keeps
/// serving its last published state except for the degenerate weight
/// case which resets the table on purpose
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// lookup table or permutation buffer could not be reserved
    #[error("lookup table allocation failed")]
    Allocation,
    /// more destinations than lookup slots
    #[error("too many destinations: {count} for table size {table_size}")]
    TooManyDestinations { count: usize, table_size: u32 },
    /// no positive-weight destination to populate with
    #[error("no positive-weight destination in the set")]
    DegenerateWeights,
}
