/// Structured error types for runhook-core.
///
/// Binary crates (runhook-cli) wrap these in `anyhow`; library consumers
/// get structured, composable errors.
use thiserror::Error;

/// Main error type for runhook-core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Required environment variable missing
    #[error("{name} env var not set")]
    MissingVar { name: &'static str },

    /// Environment variable present but unusable
    #[error("Invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    /// Unrecognised run or task status string
    #[error("Unknown {kind} status '{value}'")]
    UnknownStatus { kind: &'static str, value: String },
}

/// Result type alias for runhook-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn invalid_var(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidVar {
            name,
            reason: reason.into(),
        }
    }

    pub fn unknown_status(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownStatus {
            kind,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::MissingVar {
            name: "DATABASE_URL",
        };
        assert_eq!(err.to_string(), "DATABASE_URL env var not set");

        let err = CoreError::unknown_status("run", "EXPLODED");
        assert_eq!(err.to_string(), "Unknown run status 'EXPLODED'");
    }
}
