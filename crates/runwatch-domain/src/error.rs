//! Error types for snapshot parsing

use thiserror::Error;

/// A provider response that was reachable but could not be turned into a snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("{document} payload does not match the provider schema: {reason}")]
    Schema {
        document: &'static str,
        reason: String,
    },

    #[error("unexpected {field} value: {value:?}")]
    UnknownStatus { field: &'static str, value: String },

    #[error("invalid capture timestamp: {0}")]
    InvalidTimestamp(f64),
}

impl SnapshotError {
    pub(crate) fn schema(document: &'static str, err: impl std::fmt::Display) -> Self {
        SnapshotError::Schema {
            document,
            reason: err.to_string(),
        }
    }
}

/// Result type for domain operations
pub type Result<T> = std::result::Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_document() {
        let err = SnapshotError::schema("jobs", "missing field `jobs`");
        let msg = err.to_string();
        assert!(msg.contains("jobs payload"));
        assert!(msg.contains("missing field"));
    }

    #[test]
    fn test_unknown_status_display() {
        let err = SnapshotError::UnknownStatus {
            field: "run status",
            value: "exploded".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected run status value: \"exploded\"");
    }
}
