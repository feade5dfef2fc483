//! Schema registry: declared field types and per-table key spans.
//!
//! Types are global to a storage unit; the spans let a delete find the
//! persisted tables it can touch without opening any of them.

use std::collections::{BTreeMap, BTreeSet};

use crate::area::AreaSet;
use crate::error::{Result, StoreError};
use crate::range::{KeyRange, RangeSet};
use crate::table::TableMeta;
use crate::types::DataType;

#[derive(Debug, Default)]
pub(crate) struct SchemaRegistry {
    types: BTreeMap<String, DataType>,
    /// Field -> table id -> span of surviving keys
    spans: BTreeMap<String, BTreeMap<u64, KeyRange>>,
}

impl SchemaRegistry {
    pub fn types(&self) -> &BTreeMap<String, DataType> {
        &self.types
    }

    /// Fix a field's type, or check it against the one already fixed
    pub fn declare(&mut self, field: &str, data_type: DataType) -> Result<()> {
        match self.types.get(field) {
            Some(&existing) if existing != data_type => Err(StoreError::SchemaConflict {
                field: field.to_string(),
                existing,
                requested: data_type,
            }),
            Some(_) => Ok(()),
            None => {
                self.types.insert(field.to_string(), data_type);
                Ok(())
            }
        }
    }

    /// Register a table found on disk. Fields it has fully deleted do not
    /// count; any other disagreement with known types is corruption.
    pub fn load_table(&mut self, id: u64, meta: &TableMeta) -> Result<()> {
        for (field, &data_type) in &meta.schema {
            if meta.tombstone.field_deleted(field) {
                continue;
            }
            self.declare(field, data_type).map_err(|e| {
                StoreError::Integrity(format!("table {} disagrees on field types: {}", id, e))
            })?;
        }
        self.add_table(id, meta, &meta.tombstone);
        Ok(())
    }

    /// Record the spans of a freshly persisted table, minus `tombstone`
    pub fn add_table(&mut self, id: u64, meta: &TableMeta, tombstone: &AreaSet) {
        for (field, range) in &meta.ranges {
            if let Some(span) = surviving_span(range, &tombstone.mask_for(field)) {
                self.spans.entry(field.clone()).or_default().insert(id, span);
            }
        }
    }

    /// Ids of persisted tables that may hold cells covered by `areas`
    pub fn find(&self, areas: &AreaSet) -> BTreeSet<u64> {
        self.spans
            .iter()
            .flat_map(|(field, tables)| {
                tables
                    .iter()
                    .filter(move |(_, span)| areas.intersects(field, span))
                    .map(|(id, _)| *id)
            })
            .collect()
    }

    /// Forget fully deleted fields and narrow the remaining spans
    pub fn delete(&mut self, areas: &AreaSet) {
        self.types.retain(|field, _| !areas.field_deleted(field));
        self.spans.retain(|field, tables| {
            if areas.field_deleted(field) {
                return false;
            }
            let mask = areas.mask_for(field);
            if !mask.is_empty() {
                tables.retain(|_, span| match surviving_span(span, &mask) {
                    Some(narrowed) => {
                        *span = narrowed;
                        true
                    }
                    None => false,
                });
            }
            !tables.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.types.clear();
        self.spans.clear();
    }
}

fn surviving_span(range: &KeyRange, mask: &RangeSet) -> Option<KeyRange> {
    if mask.is_empty() {
        return Some(*range);
    }
    RangeSet::from(*range).difference(mask).span()
}
