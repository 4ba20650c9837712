use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("Field not allowed: {field}")]
    FieldNotAllowed { field: String },

    #[error("There is no directory: {}. Use create = true to create one", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Could not obtain lock: {name} ({reason})")]
    LockObtainFailed { name: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// Returns true for errors raised while parsing a query string.
    ///
    /// These are the only errors a parser configured with
    /// `handle_parse_errors` converts into a best-effort result.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            EngineError::QueryParse(_) | EngineError::FieldNotAllowed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Rejects names that would escape a store or address a nested path.
pub(crate) fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(EngineError::InvalidInput(format!("invalid entry name {name:?}")));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(EngineError::InvalidInput(format!("invalid entry name {name:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_are_recoverable_kinds() {
        assert!(EngineError::QueryParse("x".to_string()).is_parse_error());
        assert!(EngineError::FieldNotAllowed {
            field: "other".to_string()
        }
        .is_parse_error());
        assert!(!EngineError::NotFound("a".to_string()).is_parse_error());
    }

    #[test]
    fn messages_name_the_offender() {
        let error = EngineError::LockObtainFailed {
            name: "write".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(error.to_string().contains("write"));

        let error = EngineError::DirectoryNotFound(PathBuf::from("/missing/index"));
        assert!(error.to_string().contains("/missing/index"));
    }

    #[test]
    fn entry_names_are_validated() {
        assert!(validate_entry_name("segments").is_ok());
        assert!(validate_entry_name("_0.cfs").is_ok());
        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name("..").is_err());
        assert!(validate_entry_name("a/b").is_err());
        assert!(validate_entry_name("a\\b").is_err());
    }
}
