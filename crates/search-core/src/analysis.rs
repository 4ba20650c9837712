//! Text analysis consumed by the query parser.
//!
//! The parser never tokenizes field text itself. It hands each bare word or
//! phrase to an [`Analyzer`] together with the field being searched and builds
//! term or phrase queries from whatever terms come back.

mod per_field;
mod standard;

pub use per_field::PerFieldAnalyzer;
pub use standard::{StandardAnalyzer, WhitespaceAnalyzer, ENGLISH_STOP_WORDS};

/// A single term produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    /// The normalized term text.
    pub text: String,
    /// Distance from the previous emitted token (1 for adjacent terms,
    /// larger when tokens such as stop words were dropped in between).
    pub position_increment: u32,
}

impl AnalyzedToken {
    pub fn new(text: impl Into<String>, position_increment: u32) -> Self {
        Self {
            text: text.into(),
            position_increment,
        }
    }
}

/// Lazily produced, finite sequence of analyzed tokens.
pub type TokenStream<'a> = Box<dyn Iterator<Item = AnalyzedToken> + 'a>;

/// Produces search terms from raw text for a given field.
///
/// Implementations must be restartable: every call to `analyze` returns a
/// fresh stream over `text`.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    fn analyze<'a>(&'a self, field: &str, text: &'a str) -> TokenStream<'a>;
}

/// Collects the term texts of a stream, dropping position information.
pub fn analyze_terms(analyzer: &dyn Analyzer, field: &str, text: &str) -> Vec<String> {
    analyzer
        .analyze(field, text)
        .map(|token| token.text)
        .collect()
}
