use thiserror::Error;

/// Result type alias for warehouse operations
pub type Result<T, E = WarehouseError> = std::result::Result<T, E>;

/// Errors that can occur while talking to the warehouse
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// The warehouse could not be reached or refused our credentials.
    /// Fatal to the current request; reported as a non-connected envelope.
    #[error("cannot reach or authenticate to the warehouse: {0}")]
    Connection(String),

    /// The warehouse accepted the connection but rejected the statement.
    #[error("statement rejected by the warehouse: {0}")]
    Statement(String),

    /// A reference name failed identifier validation before being
    /// interpolated into a statement.
    #[error("invalid reference name: {0:?}")]
    InvalidReferenceName(String),

    /// The reference introspection call returned a payload that does not
    /// parse as the expected encoding. Carries the raw payload so a
    /// transient warehouse-side error is never masked as "no grants".
    #[error("malformed reference payload {payload:?}: {source}")]
    ReferenceResolution {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
}
