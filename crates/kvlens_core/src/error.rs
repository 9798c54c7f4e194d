use thiserror::Error;

/// Malformed TTL expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TtlParseError {
    #[error("Invalid TTL '{0}': expected <number>[s|m|h|d], e.g. 10s, 1h, 1d or -1s")]
    InvalidFormat(String),
}

/// Display text that cannot be turned back into a store value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("Malformed quoting: {0}")]
    MalformedQuoting(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
}

impl DecodeError {
    pub fn malformed_json(message: impl Into<String>) -> Self {
        Self::MalformedJson(message.into())
    }

    pub fn malformed_quoting(message: impl Into<String>) -> Self {
        Self::MalformedQuoting(message.into())
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }
}

/// Failure reported by a store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Key '{0}' already exists")]
    KeyExists(String),

    #[error("Type conflict: {0}")]
    TypeConflict(String),

    #[error("Key '{0}' not found")]
    NotFound(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::CommandFailed(message.into())
    }

    pub fn type_conflict(message: impl Into<String>) -> Self {
        Self::TypeConflict(message.into())
    }
}

/// Reason a create/read/update/delete was aborted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error("Key name must not be empty")]
    EmptyKey,

    #[error("Unknown server '{0}'")]
    UnknownServer(String),

    #[error("No key is selected")]
    NoSelection,

    #[error("Key '{0}' already exists")]
    KeyExists(String),

    #[error("Key '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Ttl(#[from] TtlParseError),

    #[error("Value for '{key}' was written but its TTL could not be applied: {source}")]
    PartialTtlFailure {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for MutationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::KeyExists(key) => Self::KeyExists(key),
            StoreError::NotFound(key) => Self::NotFound(key),
            other => Self::Store(other),
        }
    }
}

impl MutationError {
    /// True when the store already holds the new value despite the error.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialTtlFailure { .. })
    }

    /// True when the request was rejected before any store call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyKey
                | Self::UnknownServer(_)
                | Self::NoSelection
                | Self::Decode(_)
                | Self::Ttl(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_collisions_map_to_mutation_kinds() {
        let error: MutationError = StoreError::KeyExists("k".into()).into();
        assert_eq!(error, MutationError::KeyExists("k".into()));

        let error: MutationError = StoreError::NotFound("k".into()).into();
        assert_eq!(error, MutationError::NotFound("k".into()));
    }

    #[test]
    fn other_store_errors_pass_through_verbatim() {
        let error: MutationError = StoreError::unavailable("connection refused").into();
        assert_eq!(error.to_string(), "Store unavailable: connection refused");
        assert!(!error.is_validation());
    }

    #[test]
    fn partial_failure_is_flagged() {
        let error = MutationError::PartialTtlFailure {
            key: "session".into(),
            source: StoreError::unavailable("timeout"),
        };

        assert!(error.is_partial());
        assert!(error.to_string().contains("session"));
    }
}
