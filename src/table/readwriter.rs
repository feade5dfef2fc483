//! The persistence boundary between the engine and an on-disk format

use std::collections::BTreeSet;
use std::sync::Arc;

use super::TableMeta;
use crate::area::AreaSet;
use crate::error::Result;
use crate::range::RangeSet;
use crate::scanner::TableScan;

/// Reader/writer of named, immutable tables.
///
/// Implementations must be safe to call concurrently for different
/// tables; the engine never flushes the same name twice.
pub trait ReadWriter: Send + Sync {
    /// Format name, for logs
    fn name(&self) -> &str;

    /// Durably write a complete, key-ordered table. `meta` declares what
    /// `data` holds; a mismatch is an integrity violation.
    fn flush(&self, table: &str, meta: &TableMeta, data: TableScan) -> Result<()>;

    /// Schema, key spans and recorded tombstone, without reading data
    fn read_meta(&self, table: &str) -> Result<Arc<TableMeta>>;

    /// Cells of `fields` within `ranges`. The table's own tombstone is
    /// not applied here.
    fn scan_data(&self, table: &str, fields: &BTreeSet<String>, ranges: &RangeSet)
        -> Result<TableScan>;

    /// Record a tombstone against a table without rewriting it
    fn delete(&self, table: &str, areas: &AreaSet) -> Result<()>;

    fn delete_table(&self, table: &str) -> Result<()>;

    /// Remove every table
    fn clear(&self) -> Result<()>;

    /// Names of all recoverable tables, ascending
    fn table_names(&self) -> Result<Vec<String>>;

    /// Drop leftovers of interrupted writes and forget cached state
    fn reload(&self) -> Result<()>;
}
