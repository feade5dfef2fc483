//! Range & AreaSet Tests
//!
//! Tests verify:
//! - RangeSet union, subtraction, intersection and complement
//! - Half-open conversion and extreme keys
//! - AreaSet membership for fields, global keys and per-field segments
//! - Union semantics and serialization of tombstones

use unitstore::{AreaSet, KeyRange, RangeSet};

// =============================================================================
// Helper Functions
// =============================================================================

fn set(ranges: &[(i64, i64)]) -> RangeSet {
    ranges
        .iter()
        .map(|&(s, e)| KeyRange::new(s, e).unwrap())
        .collect()
}

fn spans(set: &RangeSet) -> Vec<(i64, i64)> {
    set.iter().map(|r| (r.start, r.end)).collect()
}

// =============================================================================
// RangeSet Tests
// =============================================================================

#[test]
fn test_key_range_rejects_inverted_bounds() {
    assert!(KeyRange::new(5, 4).is_none());
    assert!(KeyRange::from_bounds(3..3).is_none());
    assert_eq!(KeyRange::from_bounds(3..=3), Some(KeyRange::point(3)));
    assert_eq!(KeyRange::from_bounds(..), Some(KeyRange::all()));
}

#[test]
fn test_union_merges_touching_ranges() {
    let mut ranges = set(&[(1, 3), (7, 9)]);
    ranges.add(KeyRange::new(4, 6).unwrap());
    assert_eq!(spans(&ranges), vec![(1, 9)]);

    ranges.add(KeyRange::new(20, 25).unwrap());
    ranges.add_all(&set(&[(0, 0), (26, 30)]));
    assert_eq!(spans(&ranges), vec![(0, 9), (20, 30)]);
}

#[test]
fn test_remove_and_difference() {
    let mut ranges = set(&[(0, 100)]);
    ranges.remove(KeyRange::new(10, 19).unwrap());
    assert_eq!(spans(&ranges), vec![(0, 9), (20, 100)]);

    let rest = ranges.difference(&set(&[(0, 5), (50, 200)]));
    assert_eq!(spans(&rest), vec![(6, 9), (20, 49)]);
}

#[test]
fn test_intersection_and_queries() {
    let a = set(&[(0, 10), (20, 30)]);
    let b = set(&[(5, 25)]);

    assert_eq!(spans(&a.intersection(&b)), vec![(5, 10), (20, 25)]);
    assert!(a.contains(20));
    assert!(!a.contains(15));
    assert!(a.intersects(&KeyRange::new(9, 12).unwrap()));
    assert!(!a.intersects(&KeyRange::new(11, 19).unwrap()));
    assert!(a.encloses(&KeyRange::new(21, 29).unwrap()));
    assert!(!a.encloses(&KeyRange::new(5, 21).unwrap()));
    assert_eq!(a.span(), KeyRange::new(0, 30));
    assert!(a.intersects_set(&b));
}

#[test]
fn test_complement_at_extremes() {
    let ranges = set(&[(i64::MIN, -1), (1, i64::MAX)]);
    assert_eq!(spans(&ranges.complement()), vec![(0, 0)]);

    assert!(RangeSet::new().complement().is_all());
    assert!(RangeSet::all().complement().is_empty());
    assert!(RangeSet::from_range(..0).contains(i64::MIN));
}

#[test]
fn test_equal_sets_compare_equal() {
    let mut a = RangeSet::new();
    a.add(KeyRange::new(1, 2).unwrap());
    a.add(KeyRange::new(3, 4).unwrap());
    assert_eq!(a, RangeSet::from_range(1..5));
}

// =============================================================================
// AreaSet Tests
// =============================================================================

#[test]
fn test_empty_area_set_covers_nothing() {
    let areas = AreaSet::new();
    assert!(areas.is_empty());
    assert!(!areas.covers("f", 0));
    assert!(!areas.touches("f"));
    assert!(areas.mask_for("f").is_empty());
}

#[test]
fn test_field_keys_only_cover_that_field() {
    let mut areas = AreaSet::new();
    areas.add_field_keys(["a", "b"], &RangeSet::from_range(10..20));

    assert!(areas.covers("a", 10));
    assert!(areas.covers("b", 19));
    assert!(!areas.covers("a", 20));
    assert!(!areas.covers("c", 15));
    assert!(areas.touches("a"));
    assert!(!areas.touches("c"));
    assert!(areas.intersects("a", &KeyRange::new(0, 10).unwrap()));
    assert!(!areas.intersects("a", &KeyRange::new(20, 30).unwrap()));
}

#[test]
fn test_global_keys_cover_every_field() {
    let mut areas = AreaSet::new();
    areas.add_keys(&RangeSet::from_range(0..5));

    assert!(areas.covers("anything", 4));
    assert!(!areas.covers("anything", 5));
    assert!(areas.touches("anything"));
    assert!(!areas.field_deleted("anything"));
}

#[test]
fn test_whole_field_and_all_keys() {
    let mut areas = AreaSet::new();
    areas.add_fields(["a"]);
    assert!(areas.field_deleted("a"));
    assert!(areas.covers("a", i64::MIN));
    assert!(!areas.field_deleted("b"));

    // Deleting a segment of an already deleted field adds nothing
    areas.add_field_keys(["a"], &RangeSet::from_range(0..10));
    assert!(areas.segments().is_empty());

    let all = AreaSet::all();
    assert!(all.field_deleted("z"));
    assert!(all.mask_for("z").is_all());
}

#[test]
fn test_field_keys_inside_global_keys_are_dropped() {
    let mut areas = AreaSet::new();
    areas.add_keys(&RangeSet::from_range(0..100));
    areas.add_field_keys(["a"], &RangeSet::from_range(10..20));
    assert!(areas.segments().is_empty());

    areas.add_field_keys(["a"], &RangeSet::from_range(90..110));
    assert_eq!(
        spans(&areas.segments()["a"]),
        vec![(100, 109)]
    );
    assert_eq!(spans(&areas.mask_for("a")), vec![(0, 109)]);
}

#[test]
fn test_union_is_order_independent() {
    let mut first = AreaSet::new();
    first.add_field_keys(["a"], &RangeSet::from_range(0..10));
    let mut second = AreaSet::new();
    second.add_keys(&RangeSet::from_range(5..15));
    second.add_fields(["b"]);

    let mut left = first.clone();
    left.add_all(&second);
    let mut right = second.clone();
    right.add_all(&first);

    for field in ["a", "b", "c"] {
        for key in -1..20 {
            assert_eq!(left.covers(field, key), right.covers(field, key), "{}@{}", field, key);
        }
    }
    assert!(left.covers("a", 2));
    assert!(left.covers("c", 12));
    assert!(left.covers("b", 100));
}

#[test]
fn test_area_set_serializes() {
    let mut areas = AreaSet::new();
    areas.add_fields(["gone"]);
    areas.add_keys(&RangeSet::from_range(-5..5));
    areas.add_field_keys(["a"], &RangeSet::from_range(10..20));

    let bytes = bincode::serialize(&areas).unwrap();
    let decoded: AreaSet = bincode::deserialize(&bytes).unwrap();
    assert_eq!(decoded, areas);
}
