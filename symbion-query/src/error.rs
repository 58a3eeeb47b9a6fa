/// Failure of the query transport. Aborts the poll cycle that issued it.
///
/// A statement against a class the host does not know surfaces as
/// `InvalidQuery`, but callers cannot tell it apart from a connectivity
/// failure in any useful way and treat every variant the same.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },
    #[error("access denied on {endpoint}")]
    AccessDenied { endpoint: String },
    #[error("invalid query on {endpoint}: {reason}")]
    InvalidQuery { endpoint: String, reason: String },
    #[error("protocol error on {endpoint}: {reason}")]
    Protocol { endpoint: String, reason: String },
}

/// A row that does not fit its declared shape. Always skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {field} is not a {expected} (found {found})")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}
