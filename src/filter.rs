//! Row predicates and their key-range supersets.
//!
//! A [`Filter`] is evaluated exactly against assembled rows with
//! [`Filter::matches`]. Before scanning, [`Filter::key_ranges`] derives a
//! range set guaranteed to contain every matching key, which is pushed
//! down into every generation's scan.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, StoreError};
use crate::range::{KeyRange, RangeSet};
use crate::types::{Key, Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// SQL pattern: `%` matches any run, `_` any single character
    Like,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "like",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Bool(bool),
    Key(Op, Key),
    Value(String, Op, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::Or(filters.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Filter {
        Filter::Not(Box::new(filter))
    }

    /// Keys this filter can possibly match. Exact for filters over keys
    /// alone; a superset as soon as value predicates are involved.
    pub fn key_ranges(&self) -> Result<RangeSet> {
        self.validate()?;
        Ok(self.superset())
    }

    /// Reject predicates that cannot be evaluated
    pub fn validate(&self) -> Result<()> {
        match self {
            Filter::Bool(_) => Ok(()),
            Filter::Key(Op::Like, _) => Err(StoreError::InvalidFilter(
                "like is not defined on keys".to_string(),
            )),
            Filter::Key(..) => Ok(()),
            Filter::Value(path, Op::Like, value) if !matches!(value, Value::Binary(_)) => {
                Err(StoreError::InvalidFilter(format!(
                    "like on {} needs a binary pattern, got {}",
                    path,
                    value.data_type()
                )))
            }
            Filter::Value(..) => Ok(()),
            Filter::And(filters) | Filter::Or(filters) => {
                filters.iter().try_for_each(Filter::validate)
            }
            Filter::Not(inner) => inner.validate(),
        }
    }

    fn superset(&self) -> RangeSet {
        match self {
            Filter::Bool(true) | Filter::Value(..) => RangeSet::all(),
            Filter::Bool(false) => RangeSet::new(),
            Filter::Key(op, key) => key_op_ranges(*op, *key),
            Filter::And(filters) => filters
                .iter()
                .fold(RangeSet::all(), |acc, f| acc.intersection(&f.superset())),
            Filter::Or(filters) => filters.iter().fold(RangeSet::new(), |mut acc, f| {
                acc.add_all(&f.superset());
                acc
            }),
            // Only an exact set may be complemented
            Filter::Not(inner) if inner.is_key_only() => inner.superset().complement(),
            Filter::Not(_) => RangeSet::all(),
        }
    }

    fn is_key_only(&self) -> bool {
        match self {
            Filter::Bool(_) | Filter::Key(..) => true,
            Filter::Value(..) => false,
            Filter::And(filters) | Filter::Or(filters) => filters.iter().all(Filter::is_key_only),
            Filter::Not(inner) => inner.is_key_only(),
        }
    }

    /// Fields referenced by value predicates
    pub fn fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut BTreeSet<String>) {
        match self {
            Filter::Value(path, ..) => {
                fields.insert(path.clone());
            }
            Filter::And(filters) | Filter::Or(filters) => {
                filters.iter().for_each(|f| f.collect_fields(fields))
            }
            Filter::Not(inner) => inner.collect_fields(fields),
            Filter::Bool(_) | Filter::Key(..) => {}
        }
    }

    /// Exact evaluation. A value predicate on a missing cell is false.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Bool(b) => *b,
            Filter::Key(op, key) => compare_op(*op, row.key.cmp(key)),
            Filter::Value(path, op, expected) => row
                .get(path)
                .is_some_and(|actual| value_matches(actual, *op, expected)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
            Filter::Not(inner) => !inner.matches(row),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Bool(b) => write!(f, "{}", b),
            Filter::Key(op, key) => write!(f, "key {} {}", op, key),
            Filter::Value(path, op, value) => write!(f, "{} {} {}", path, op, value),
            Filter::And(filters) => write_joined(f, filters, "&&"),
            Filter::Or(filters) => write_joined(f, filters, "||"),
            Filter::Not(inner) => write!(f, "!{}", inner),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn write_joined(f: &mut fmt::Formatter<'_>, filters: &[Filter], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", filter)?;
    }
    f.write_str(")")
}

fn key_op_ranges(op: Op, key: Key) -> RangeSet {
    let range = match op {
        Op::Eq => Some(KeyRange::point(key)),
        Op::Ne => return RangeSet::from(KeyRange::point(key)).complement(),
        Op::Lt => key.checked_sub(1).map(|end| KeyRange { start: Key::MIN, end }),
        Op::Le => Some(KeyRange { start: Key::MIN, end: key }),
        Op::Gt => key.checked_add(1).map(|start| KeyRange { start, end: Key::MAX }),
        Op::Ge => Some(KeyRange { start: key, end: Key::MAX }),
        Op::Like => None,
    };
    range.map(RangeSet::from).unwrap_or_default()
}

fn compare_op(op: Op, ordering: Ordering) -> bool {
    match op {
        Op::Eq => ordering == Ordering::Equal,
        Op::Ne => ordering != Ordering::Equal,
        Op::Lt => ordering == Ordering::Less,
        Op::Le => ordering != Ordering::Greater,
        Op::Gt => ordering == Ordering::Greater,
        Op::Ge => ordering != Ordering::Less,
        Op::Like => false,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::Binary(x), Value::Binary(y)) => Some(x.cmp(y)),
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Long(x), Value::Long(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn value_matches(actual: &Value, op: Op, expected: &Value) -> bool {
    if op == Op::Like {
        return match (actual, expected) {
            (Value::Binary(text), Value::Binary(pattern)) => like(text, pattern),
            _ => false,
        };
    }
    compare_values(actual, expected).is_some_and(|ordering| compare_op(op, ordering))
}

/// SQL LIKE over bytes
fn like(text: &[u8], pattern: &[u8]) -> bool {
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(b'%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'_' || c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, resume)) => {
                    p = star + 1;
                    t = resume + 1;
                    backtrack = Some((star, resume + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'%')
}
