//! Write batches and read results exchanged with the execution layer

use std::collections::{BTreeMap, BTreeSet};

use super::naming::{to_full_name, Tags};
use crate::engine::QueryScanner;
use crate::error::{Result, StoreError};
use crate::types::{DataType, Key, Row, Value};

/// A field as seen by the execution layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub path: String,
    pub tags: Tags,
    pub data_type: DataType,
}

impl Column {
    pub fn new(path: impl Into<String>, tags: Tags, data_type: DataType) -> Self {
        Self {
            path: path.into(),
            tags,
            data_type,
        }
    }

    pub fn full_name(&self) -> String {
        to_full_name(&self.path, &self.tags)
    }
}

/// Half-open key interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInterval {
    pub start: Key,
    pub end: Key,
}

/// A batch to insert. `None` marks an absent cell.
#[derive(Debug, Clone, PartialEq)]
pub enum DataView {
    /// `values[row][column]`
    Rows {
        columns: Vec<Column>,
        keys: Vec<Key>,
        values: Vec<Vec<Option<Value>>>,
    },
    /// `values[column][row]`
    Columns {
        columns: Vec<Column>,
        keys: Vec<Key>,
        values: Vec<Vec<Option<Value>>>,
    },
}

impl DataView {
    pub fn columns(&self) -> &[Column] {
        match self {
            DataView::Rows { columns, .. } | DataView::Columns { columns, .. } => columns,
        }
    }

    /// Full name -> type of every column
    pub fn schema(&self) -> Result<BTreeMap<String, DataType>> {
        let mut schema = BTreeMap::new();
        for column in self.columns() {
            let name = column.full_name();
            if schema.insert(name.clone(), column.data_type).is_some() {
                return Err(StoreError::InvalidArgument(format!(
                    "column {} appears twice in the batch",
                    name
                )));
            }
        }
        Ok(schema)
    }

    /// Shape checks shared by both layouts
    pub(super) fn validate(&self) -> Result<()> {
        let (outer, inner, what) = match self {
            DataView::Rows { columns, keys, .. } => (keys.len(), columns.len(), "row"),
            DataView::Columns { columns, keys, .. } => (columns.len(), keys.len(), "column"),
        };
        let values = match self {
            DataView::Rows { values, .. } | DataView::Columns { values, .. } => values,
        };
        if values.len() != outer {
            return Err(StoreError::InvalidArgument(format!(
                "expected {} {}s, got {}",
                outer,
                what,
                values.len()
            )));
        }
        if let Some((i, bad)) = values.iter().enumerate().find(|(_, v)| v.len() != inner) {
            return Err(StoreError::InvalidArgument(format!(
                "{} {} has {} values, expected {}",
                what,
                i,
                bad.len(),
                inner
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Row Stream
// =============================================================================

/// A projected row, one slot per header column
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Key,
    pub values: Vec<Option<Value>>,
}

/// Result of `Manager::project`: rows aligned to a fixed header
pub struct RowStream {
    header: Vec<Column>,
    positions: BTreeMap<String, usize>,
    rows: QueryScanner,
}

impl RowStream {
    pub(super) fn new(header: Vec<Column>, rows: QueryScanner) -> Self {
        let positions = header
            .iter()
            .enumerate()
            .map(|(i, column)| (column.full_name(), i))
            .collect();
        Self {
            header,
            positions,
            rows,
        }
    }

    pub fn header(&self) -> &[Column] {
        &self.header
    }

    pub fn fields(&self) -> BTreeSet<String> {
        self.positions.keys().cloned().collect()
    }

    /// Release the underlying scan. Idempotent.
    pub fn close(&mut self) {
        self.rows.close();
    }

    fn align(&self, row: Row) -> Record {
        let mut values = vec![None; self.header.len()];
        for (field, value) in row.cells {
            if let Some(&i) = self.positions.get(&field) {
                values[i] = Some(value);
            }
        }
        Record {
            key: row.key,
            values,
        }
    }
}

impl Iterator for RowStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(row.map(|row| self.align(row)))
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("header", &self.header)
            .field("closed", &self.rows.is_closed())
            .finish()
    }
}
