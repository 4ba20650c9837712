//! Query parser configuration.

use std::sync::Arc;

use serde::Deserialize;

use super::fields::FieldSelector;
use super::tree::Occur;
use crate::analysis::Analyzer;
use crate::error::{EngineError, Result};

/// Options recognised when constructing a [`QueryParser`](super::QueryParser).
///
/// Unknown keys are rejected when deserializing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryParserOptions {
    /// Fields a clause may target. Absent means unrestricted.
    pub fields: Option<FieldSelector>,
    /// Return a best-effort query instead of failing on syntax errors.
    pub handle_parse_errors: bool,
    /// Accept field names outside `fields`.
    pub allow_any_fields: bool,
    /// Lower-case wildcard and fuzzy patterns before they reach the index.
    pub wild_lower: bool,
    /// Occurrence applied between clauses with no explicit `AND`/`OR`.
    pub occur_default: Occur,
    /// Slop for phrases written without `~N`.
    pub default_slop: u32,
    /// Repair unbalanced quotes and brackets before tokenizing.
    pub clean_string: bool,
    #[serde(skip)]
    pub analyzer: Option<Arc<dyn Analyzer>>,
}

impl Default for QueryParserOptions {
    fn default() -> Self {
        Self {
            fields: None,
            handle_parse_errors: false,
            allow_any_fields: true,
            wild_lower: false,
            occur_default: Occur::Should,
            default_slop: 0,
            clean_string: true,
            analyzer: None,
        }
    }
}

impl QueryParserOptions {
    /// Parses options from a JSON object.
    pub fn from_json(raw: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(raw)
            .map_err(|error| EngineError::InvalidConfig(format!("query parser options: {error}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_fields(mut self, fields: impl Into<FieldSelector>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.occur_default == Occur::MustNot {
            return Err(EngineError::InvalidConfig(
                "occur_default must be `must` or `should`".to_string(),
            ));
        }
        Ok(())
    }
}
