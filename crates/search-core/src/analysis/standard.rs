//! Built-in analyzers.

use std::collections::HashSet;

use super::{AnalyzedToken, Analyzer, TokenStream};

/// Default stop words removed by [`StandardAnalyzer`].
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "s", "such", "t", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

/// Splits text on anything that is not alphanumeric, optionally lower-cases
/// each word, and drops stop words.
///
/// Dropped stop words still advance the position, so phrases keep their gaps.
#[derive(Debug, Clone)]
pub struct StandardAnalyzer {
    lowercase: bool,
    stop_words: HashSet<String>,
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StandardAnalyzer {
    /// Creates an analyzer using [`ENGLISH_STOP_WORDS`].
    pub fn new(lowercase: bool) -> Self {
        Self::with_stop_words(lowercase, ENGLISH_STOP_WORDS.iter().copied())
    }

    pub fn with_stop_words<I, S>(lowercase: bool, stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lowercase,
            stop_words: stop_words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_stop_word(&self, term: &str) -> bool {
        self.stop_words.contains(term)
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze<'a>(&'a self, _field: &str, text: &'a str) -> TokenStream<'a> {
        let lowercase = self.lowercase;
        let mut pending_increment = 0u32;
        Box::new(
            text.split(|ch: char| !ch.is_alphanumeric())
                .filter(|word| !word.is_empty())
                .filter_map(move |word| {
                    let term = if lowercase {
                        word.to_lowercase()
                    } else {
                        word.to_string()
                    };
                    pending_increment += 1;
                    if self.stop_words.contains(term.as_str()) {
                        return None;
                    }
                    let increment = pending_increment;
                    pending_increment = 0;
                    Some(AnalyzedToken::new(term, increment))
                }),
        )
    }
}

/// Splits on whitespace only.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceAnalyzer {
    lowercase: bool,
}

impl WhitespaceAnalyzer {
    pub fn new(lowercase: bool) -> Self {
        Self { lowercase }
    }
}

impl Analyzer for WhitespaceAnalyzer {
    fn analyze<'a>(&'a self, _field: &str, text: &'a str) -> TokenStream<'a> {
        let lowercase = self.lowercase;
        Box::new(text.split_whitespace().map(move |word| {
            let term = if lowercase {
                word.to_lowercase()
            } else {
                word.to_string()
            };
            AnalyzedToken::new(term, 1)
        }))
    }
}
