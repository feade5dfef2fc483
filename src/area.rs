//! AreaSet: the two-dimensional tombstone index over (field, key range).
//!
//! A cell `(field, key)` is deleted iff
//! - the whole field was deleted, or
//! - `key` is covered by the global (all-fields) range set, or
//! - `key` is covered by the per-field range set of `field`.
//!
//! Adding is a pure union: deletions never conflict, and applying two
//! AreaSets one after the other equals applying their union.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::range::{KeyRange, RangeSet};
use crate::types::Key;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaSet {
    /// Fields deleted over their entire history
    fields: BTreeSet<String>,
    /// Key ranges deleted for every field
    keys: RangeSet,
    /// Key ranges deleted for specific fields
    segments: BTreeMap<String, RangeSet>,
}

impl AreaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An AreaSet that covers every cell
    pub fn all() -> Self {
        let mut areas = Self::new();
        areas.add_keys(&RangeSet::all());
        areas
    }

    /// Delete a key range for all fields
    pub fn add_keys(&mut self, ranges: &RangeSet) {
        if ranges.is_empty() {
            return;
        }
        self.keys.add_all(ranges);
        // Segments fully shadowed by the global ranges carry no information
        self.segments.retain(|_, segment| {
            segment.remove_all(ranges);
            !segment.is_empty()
        });
    }

    /// Delete the whole history of the given fields
    pub fn add_fields<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            self.segments.remove(&field);
            self.fields.insert(field);
        }
    }

    /// Delete a key range for specific fields
    pub fn add_field_keys<I, S>(&mut self, fields: I, ranges: &RangeSet)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if ranges.is_empty() {
            return;
        }
        let effective = ranges.difference(&self.keys);
        if effective.is_empty() {
            return;
        }
        for field in fields {
            let field = field.into();
            if self.fields.contains(&field) {
                continue;
            }
            self.segments
                .entry(field)
                .or_default()
                .add_all(&effective);
        }
    }

    /// Union another AreaSet into this one
    pub fn add_all(&mut self, other: &AreaSet) {
        self.add_keys(&other.keys);
        self.add_fields(other.fields.iter().cloned());
        for (field, ranges) in &other.segments {
            self.add_field_keys([field.as_str()], ranges);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.keys.is_empty() && self.segments.is_empty()
    }

    /// Membership test for a single cell
    pub fn covers(&self, field: &str, key: Key) -> bool {
        self.fields.contains(field)
            || self.keys.contains(key)
            || self
                .segments
                .get(field)
                .is_some_and(|ranges| ranges.contains(key))
    }

    /// Whether the whole history of `field` is deleted
    pub fn field_deleted(&self, field: &str) -> bool {
        self.fields.contains(field) || self.keys.is_all()
    }

    /// Whether anything in this AreaSet applies to `field`
    pub fn touches(&self, field: &str) -> bool {
        self.fields.contains(field) || !self.keys.is_empty() || self.segments.contains_key(field)
    }

    /// Everything deleted for `field`, flattened into one range set.
    pub fn mask_for(&self, field: &str) -> RangeSet {
        if self.fields.contains(field) {
            return RangeSet::all();
        }
        let mut mask = self.keys.clone();
        if let Some(segment) = self.segments.get(field) {
            mask.add_all(segment);
        }
        mask
    }

    /// Whether any deleted cell could fall into `field`'s `range`
    pub fn intersects(&self, field: &str, range: &KeyRange) -> bool {
        self.fields.contains(field)
            || self.keys.intersects(range)
            || self
                .segments
                .get(field)
                .is_some_and(|ranges| ranges.intersects(range))
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn keys(&self) -> &RangeSet {
        &self.keys
    }

    pub fn segments(&self) -> &BTreeMap<String, RangeSet> {
        &self.segments
    }
}
