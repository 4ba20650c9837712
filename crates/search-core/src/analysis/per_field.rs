//! Analyzer dispatch by field name.

use std::sync::Arc;

use fnv::FnvHashMap;

use super::{Analyzer, TokenStream};

/// Routes each field to its own analyzer, falling back to a default.
#[derive(Debug, Clone)]
pub struct PerFieldAnalyzer {
    default: Arc<dyn Analyzer>,
    fields: FnvHashMap<String, Arc<dyn Analyzer>>,
}

impl PerFieldAnalyzer {
    pub fn new(default: Arc<dyn Analyzer>) -> Self {
        Self {
            default,
            fields: FnvHashMap::default(),
        }
    }

    /// Registers `analyzer` for `field`, replacing any previous entry.
    pub fn add_field(&mut self, field: impl Into<String>, analyzer: Arc<dyn Analyzer>) {
        self.fields.insert(field.into(), analyzer);
    }

    pub fn with_field(mut self, field: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Self {
        self.add_field(field, analyzer);
        self
    }

    fn analyzer_for(&self, field: &str) -> &dyn Analyzer {
        self.fields
            .get(field)
            .map(|analyzer| analyzer.as_ref())
            .unwrap_or(self.default.as_ref())
    }
}

impl Analyzer for PerFieldAnalyzer {
    fn analyze<'a>(&'a self, field: &str, text: &'a str) -> TokenStream<'a> {
        self.analyzer_for(field).analyze(field, text)
    }
}
