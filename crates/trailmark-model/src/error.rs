use thiserror::Error;

/// Rejected caller input. Never leaves stored state modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("path name must not be empty")]
    EmptyName,

    #[error("invalid color: {0:?}")]
    InvalidColor(String),

    #[error("no path named {0:?}")]
    UnknownPath(String),
}
