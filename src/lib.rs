//! # unitstore
//!
//! An embedded storage engine for one storage unit:
//! - Typed fields keyed by a 64-bit key
//! - Writes buffered in memory under explicit backpressure
//! - Immutable tables flushed in the background
//! - Out-of-place deletion through range tombstones
//! - Queries that merge every generation, newest value winning
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Manager                              │
//! │        (paths + tags, patterns, row/column batches)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                               │
//! │     query / count / upsert / delete / flush / clear         │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │                      │                       │
//!        ▼                      ▼                       ▼
//! ┌─────────────┐      ┌─────────────────┐      ┌──────────────┐
//! │  MemTable   │─────▶│ ArchivedMemTable│─────▶│  FileTable   │
//! │  (active)   │ swap │ (flush pending) │flush │ (+tombstone) │
//! └─────────────┘      └─────────────────┘      └──────────────┘
//!        ▲                                              │
//!        │ resolver                         ReadWriter  ▼
//!   writers                                        table files
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod types;

pub mod range;
pub mod area;
pub mod scanner;
pub mod shared;
pub mod memtable;
pub mod table;
pub mod filter;
pub mod engine;
pub mod manager;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use area::AreaSet;
pub use config::{StorageProperties, StoragePropertiesBuilder};
pub use engine::{Engine, QueryScanner};
pub use error::{Result, StoreError};
pub use filter::{Filter, Op};
pub use manager::{Column, DataView, KeyInterval, Manager, Record, RowStream, TagFilter};
pub use range::{KeyRange, RangeSet};
pub use shared::Shared;
pub use types::{DataType, Key, Row, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of unitstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
