//! Bounded memo of per-shift axis tables.

use std::sync::Arc;

use moka::sync::Cache;

use super::nested::{axis_table, AxisCoord};

/// Number of shifts kept in memory; tiles rarely use more than two.
const AXIS_TABLE_CAPACITY: u64 = 8;

/// Sub-pixel to axis tables keyed by shift, built on first use.
///
/// Cloning is cheap and clones share entries.
#[derive(Clone)]
pub struct AxisTables {
    tables: Cache<u8, Arc<Vec<AxisCoord>>>,
}

impl AxisTables {
    pub fn new() -> Self {
        Self {
            tables: Cache::new(AXIS_TABLE_CAPACITY),
        }
    }

    pub fn get(&self, shift: u8) -> Arc<Vec<AxisCoord>> {
        self.tables.get_with(shift, || Arc::new(axis_table(shift)))
    }
}

impl Default for AxisTables {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AxisTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxisTables")
            .field("entries", &self.tables.entry_count())
            .finish()
    }
}
