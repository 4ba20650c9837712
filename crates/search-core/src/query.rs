//! Query language parsing for full-text search.
//!
//! This module provides:
//! - Field sets and selectors (`title|body`, `*`)
//! - Parser options, deserializable from JSON
//! - Tokenization and input cleaning for free-form user queries
//! - A recursive-descent parser producing [`Query`] trees

mod clean;
mod fields;
mod lexer;
mod options;
mod parser;
mod tree;

pub use fields::{FieldSelector, FieldSet, ALL_FIELDS, FIELD_SEPARATOR};
pub use options::QueryParserOptions;
pub use parser::{QueryParser, DEFAULT_MIN_SIMILARITY};
pub use tree::{BooleanClause, Occur, PhraseTerm, Query};
