//! Flattened field names and the patterns that select them.
//!
//! A field is a path plus a set of tags, stored under one full name:
//! `path` when there are no tags, `path{k1=v1,k2=v2}` otherwise, with
//! tags sorted by key. `\ { } , =` are backslash-escaped in every part.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};

const ESCAPE: char = '\\';
const RESERVED: [char; 5] = ['\\', '{', '}', ',', '='];

pub type Tags = BTreeMap<String, String>;

pub fn to_full_name(path: &str, tags: &Tags) -> String {
    let mut name = escape(path);
    if tags.is_empty() {
        return name;
    }
    name.push('{');
    for (i, (key, value)) in tags.iter().enumerate() {
        if i > 0 {
            name.push(',');
        }
        name.push_str(&escape(key));
        name.push('=');
        name.push_str(&escape(value));
    }
    name.push('}');
    name
}

pub fn from_full_name(name: &str) -> Result<(String, Tags)> {
    let tokens = tokenize(name)?;
    let Some(open) = tokens.iter().position(|&t| t == (('{', false))) else {
        return Ok((plain(name, &tokens)?, Tags::new()));
    };

    let path = plain(name, &tokens[..open])?;
    let Some((&last, body)) = tokens[open + 1..].split_last() else {
        return Err(invalid(name, "unterminated tag list"));
    };
    if last != ('}', false) || body.is_empty() {
        return Err(invalid(name, "malformed tag list"));
    }

    let mut tags = Tags::new();
    for pair in body.split(|&t| t == (',', false)) {
        let mut parts = pair.split(|&t| t == ('=', false));
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid(name, "tag is not key=value"));
        };
        let key = plain(name, key)?;
        if key.is_empty() {
            return Err(invalid(name, "empty tag key"));
        }
        if tags.insert(key, plain(name, value)?).is_some() {
            return Err(invalid(name, "duplicate tag key"));
        }
    }
    Ok((path, tags))
}

/// Match `text` against a pattern where `*` stands for any run of
/// characters
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let (pattern, text): (Vec<char>, Vec<char>) = (pattern.chars().collect(), text.chars().collect());
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

// =============================================================================
// Tag Filters
// =============================================================================

/// Predicate over a field's tags. Values may use `*` wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    Base { key: String, value: String },
    And(Vec<TagFilter>),
    Or(Vec<TagFilter>),
    /// Only fields without any tag
    WithoutTag,
}

impl TagFilter {
    pub fn base(key: impl Into<String>, value: impl Into<String>) -> Self {
        TagFilter::Base {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        match self {
            TagFilter::Base { key, value } => tags
                .get(key)
                .is_some_and(|actual| glob_match(value, actual)),
            TagFilter::And(filters) => filters.iter().all(|f| f.matches(tags)),
            TagFilter::Or(filters) => filters.iter().any(|f| f.matches(tags)),
            TagFilter::WithoutTag => tags.is_empty(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn escape(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        if RESERVED.contains(&c) {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Characters with a flag telling whether they were escaped
fn tokenize(name: &str) -> Result<Vec<(char, bool)>> {
    let mut tokens = Vec::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            tokens.push((c, false));
            continue;
        }
        match chars.next() {
            Some(next) if RESERVED.contains(&next) => tokens.push((next, true)),
            _ => return Err(invalid(name, "dangling escape")),
        }
    }
    Ok(tokens)
}

/// Rebuild a part that must not contain unescaped reserved characters
fn plain(name: &str, tokens: &[(char, bool)]) -> Result<String> {
    tokens
        .iter()
        .map(|&(c, escaped)| {
            if !escaped && RESERVED.contains(&c) {
                Err(invalid(name, "unescaped reserved character"))
            } else {
                Ok(c)
            }
        })
        .collect()
}

fn invalid(name: &str, reason: &str) -> StoreError {
    StoreError::InvalidArgument(format!("bad field name {:?}: {}", name, reason))
}
