//! Manager Module
//!
//! Adapter from the execution layer's model (paths with tags, path
//! patterns, tag filters, row or column batches) onto one [`Engine`].
//!
//! ## Responsibilities
//! - Flatten (path, tags) into engine field names and back
//! - Resolve path patterns and tag filters against the live schema
//! - Rewrite value predicates over patterns into predicates over fields
//! - Convert row- and column-oriented batches into engine upserts

mod naming;
mod view;

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::Path;

use tracing::{debug, warn};

pub use naming::{from_full_name, glob_match, to_full_name, TagFilter, Tags};
pub use view::{Column, DataView, KeyInterval, Record, RowStream};

use crate::area::AreaSet;
use crate::config::StorageProperties;
use crate::engine::Engine;
use crate::error::Result;
use crate::filter::Filter;
use crate::range::{KeyRange, RangeSet};
use crate::types::{Key, Row, Value};

pub struct Manager {
    engine: Engine,
}

impl Manager {
    pub fn new(dir: impl AsRef<Path>, properties: StorageProperties) -> Result<Self> {
        Ok(Self::from_engine(Engine::open(dir, properties)?))
    }

    pub fn from_engine(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Rows of every field whose path matches one of `paths` and whose
    /// tags pass `tag_filter`, restricted by `filter`
    pub fn project(
        &self,
        paths: &[String],
        tag_filter: Option<&TagFilter>,
        filter: Option<&Filter>,
    ) -> Result<RowStream> {
        let tagged = self.tagged_columns(tag_filter);
        let header: Vec<Column> = tagged
            .iter()
            .filter(|column| matches_any(paths, &column.path))
            .cloned()
            .collect();
        let fields: BTreeSet<String> = header.iter().map(Column::full_name).collect();
        let filter = filter.map(|f| project_filter(f, &tagged));
        debug!(fields = fields.len(), filter = ?filter.as_ref().map(ToString::to_string), "Projecting");

        let rows = self.engine.query(&fields, &RangeSet::all(), filter.as_ref())?;
        Ok(RowStream::new(header, rows))
    }

    /// Columns matching `paths` (all when empty) and `tag_filter`
    pub fn get_columns(&self, paths: &[String], tag_filter: Option<&TagFilter>) -> Result<Vec<Column>> {
        Ok(self
            .tagged_columns(tag_filter)
            .into_iter()
            .filter(|column| paths.is_empty() || matches_any(paths, &column.path))
            .collect())
    }

    /// Span of all stored keys; `[0, 0)` when nothing is stored
    pub fn get_key_interval(&self) -> Result<KeyInterval> {
        Ok(match self.engine.range()? {
            Some(range) => KeyInterval {
                start: range.start,
                end: range.end.saturating_add(1),
            },
            None => KeyInterval { start: 0, end: 0 },
        })
    }

    /// Live columns passing the tag filter. Names that do not parse are
    /// skipped with a warning.
    fn tagged_columns(&self, tag_filter: Option<&TagFilter>) -> Vec<Column> {
        self.engine
            .schema()
            .into_iter()
            .filter_map(|(name, data_type)| match from_full_name(&name) {
                Ok((path, tags)) => Some(Column::new(path, tags, data_type)),
                Err(e) => {
                    warn!(field = %name, error = %e, "Skipping field with unparsable name");
                    None
                }
            })
            .filter(|column| tag_filter.map_or(true, |f| f.matches(&column.tags)))
            .collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn insert(&self, data: DataView) -> Result<()> {
        data.validate()?;
        let schema = data.schema()?;
        match data {
            DataView::Rows {
                columns,
                keys,
                values,
            } => {
                let names: Vec<String> = columns.iter().map(Column::full_name).collect();
                let rows = keys.into_iter().zip(values).map(|(key, row)| Row {
                    key,
                    cells: names
                        .iter()
                        .zip(row)
                        .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
                        .collect(),
                });
                self.engine.upsert_rows(rows, &schema)
            }
            DataView::Columns {
                columns,
                keys,
                values,
            } => {
                let cells = columns.iter().zip(values).map(|(column, column_values)| {
                    let present: Vec<(Key, Value)> = keys
                        .iter()
                        .zip(column_values)
                        .filter_map(|(&key, value)| value.map(|v| (key, v)))
                        .collect();
                    (column.full_name(), present)
                });
                self.engine.upsert_columns(cells, &schema)
            }
        }
    }

    /// Delete `key_ranges` (half-open) of the matching fields, or the
    /// fields entirely when no range is given.
    ///
    /// `paths = ["*"]` without a tag filter addresses every field: with
    /// no range given the storage unit is cleared.
    pub fn delete(
        &self,
        paths: &[String],
        key_ranges: &[Range<Key>],
        tag_filter: Option<&TagFilter>,
    ) -> Result<()> {
        let ranges: RangeSet = key_ranges
            .iter()
            .filter_map(|range| KeyRange::from_bounds(range.clone()))
            .collect();

        let mut areas = AreaSet::new();
        if tag_filter.is_none() && paths.iter().any(|p| p == "*") {
            if key_ranges.is_empty() {
                return self.engine.clear();
            }
            areas.add_keys(&ranges);
        } else {
            let fields: Vec<String> = self
                .tagged_columns(tag_filter)
                .iter()
                .filter(|column| matches_any(paths, &column.path))
                .map(Column::full_name)
                .collect();
            if key_ranges.is_empty() {
                areas.add_fields(fields);
            } else {
                areas.add_field_keys(fields, &ranges);
            }
        }

        if areas.is_empty() {
            return Ok(());
        }
        self.engine.delete(&areas)
    }

    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").field("engine", &self.engine).finish()
    }
}

fn matches_any(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|pattern| glob_match(pattern, path))
}

/// Rewrite value predicates over path patterns into predicates over the
/// matching fields; a predicate holds if it holds for any of them
fn project_filter(filter: &Filter, columns: &[Column]) -> Filter {
    match filter {
        Filter::Bool(_) | Filter::Key(..) => filter.clone(),
        Filter::Value(pattern, op, value) => Filter::Or(
            columns
                .iter()
                .filter(|column| glob_match(pattern, &column.path))
                .map(|column| Filter::Value(column.full_name(), *op, value.clone()))
                .collect(),
        ),
        Filter::And(filters) => Filter::And(filters.iter().map(|f| project_filter(f, columns)).collect()),
        Filter::Or(filters) => Filter::Or(filters.iter().map(|f| project_filter(f, columns)).collect()),
        Filter::Not(inner) => Filter::not(project_filter(inner, columns)),
    }
}
