use std::fmt;

use agentmonitor_types::FieldError;

/// Result type for agentmonitor-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the engine layer
#[derive(Debug)]
pub enum Error {
    /// Store layer error
    Store(agentmonitor_store::Error),

    /// Contract rejection; carries the field-level violations
    InvalidPayload(Vec<FieldError>),

    /// Batch envelope malformed (missing or mistyped `events` array)
    InvalidEnvelope(String),

    /// Unknown session or event identifier
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::InvalidPayload(errors) => {
                write!(f, "Invalid payload: ")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}: {}", e.field, e.message)?;
                }
                Ok(())
            }
            Error::InvalidEnvelope(msg) => write!(f, "Invalid envelope: {}", msg),
            Error::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::InvalidPayload(_) | Error::InvalidEnvelope(_) | Error::NotFound(_) => None,
        }
    }
}

impl From<agentmonitor_store::Error> for Error {
    fn from(err: agentmonitor_store::Error) -> Self {
        Error::Store(err)
    }
}
