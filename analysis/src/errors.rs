use thiserror::Error;

/// Result type alias for analysis operations
pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

/// Errors that prevent a feedback analysis from completing.
///
/// Persistence problems are deliberately absent: a failed history write is
/// logged and swallowed, never surfaced to the caller.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("classification API key not found: {0}")]
    MissingCredential(String),

    #[error("classification collaborator unreachable: {0}")]
    CollaboratorUnreachable(String),

    #[error("classification collaborator timed out after {0}s")]
    CollaboratorTimeout(u64),

    #[error("classification collaborator returned no content")]
    EmptyResponse,
}
