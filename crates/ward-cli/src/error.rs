//! CLI error types.

use thiserror::Error;
use ward_escalation::EscalationError;

/// Errors surfaced by `wardctl` commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The policy or engine configuration could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    /// A command failed while running.
    #[error("command error: {0}")]
    Command(String),

    /// Output could not be rendered.
    #[error("format error: {0}")]
    Format(String),

    /// A flag value is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The escalation engine rejected an operation.
    #[error("engine error: {0}")]
    Engine(#[from] EscalationError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_config() {
        let err = CliError::Config("no ladders".into());
        assert_eq!(err.to_string(), "configuration error: no ladders");
    }

    #[test]
    fn cli_error_from_engine_error() {
        let err = CliError::from(EscalationError::NotFound {
            id: "a-1".into(),
        });
        assert!(matches!(err, CliError::Engine(_)));
        assert!(err.to_string().starts_with("engine error:"));
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }
}
