//! Query parsing and index storage primitives for a full-text search engine.
//!
//! This crate provides:
//! - A query language parser producing boolean query trees
//! - Text analyzers used to turn query words into index terms
//! - RAM and directory-backed stores with named locks
//! - A process-wide registry deduplicating stores by identity

pub mod analysis;
pub mod error;
pub mod query;
pub mod store;

// Re-export main types
pub use analysis::{Analyzer, PerFieldAnalyzer, StandardAnalyzer, WhitespaceAnalyzer};
pub use error::{EngineError, Result};
pub use query::{
    BooleanClause, FieldSelector, FieldSet, Occur, PhraseTerm, Query, QueryParser,
    QueryParserOptions,
};
pub use store::{
    registry_len, FsStore, Lock, ObjectRegistry, RamStore, Store, StoreKey, StoreKind,
    DEFAULT_LOCK_TIMEOUT,
};
