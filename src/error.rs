use std::fmt::{self, Display};
use std::io;

/// Provides `TraceNetError` and maps other errors to
/// convert to a `TraceNetError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum TraceNetError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    /// Malformed parameters. Raised before any simulated day runs.
    ConfigurationError(String),
    InvalidArgument(String),
    IllegalGlobalPropertyChange(String),
    TraceNetError(String),
}

impl From<io::Error> for TraceNetError {
    fn from(error: io::Error) -> Self {
        TraceNetError::IoError(error)
    }
}

impl From<serde_json::Error> for TraceNetError {
    fn from(error: serde_json::Error) -> Self {
        TraceNetError::JsonError(error)
    }
}

impl From<csv::Error> for TraceNetError {
    fn from(error: csv::Error) -> Self {
        TraceNetError::CsvError(error)
    }
}

impl From<String> for TraceNetError {
    fn from(error: String) -> Self {
        TraceNetError::TraceNetError(error)
    }
}

impl From<&str> for TraceNetError {
    fn from(error: &str) -> Self {
        TraceNetError::TraceNetError(error.to_string())
    }
}

impl std::error::Error for TraceNetError {}

impl Display for TraceNetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TraceNetError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            TraceNetError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            _ => write!(f, "Error: {self:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_from_str_and_string() {
        let from_str: TraceNetError = "boom".into();
        assert!(matches!(from_str, TraceNetError::TraceNetError(ref m) if m == "boom"));
        let from_string: TraceNetError = String::from("bang").into();
        assert!(matches!(from_string, TraceNetError::TraceNetError(ref m) if m == "bang"));
    }

    #[test]
    fn configuration_error_display() {
        let error = TraceNetError::ConfigurationError("connection_degree must be even".into());
        assert_eq!(
            error.to_string(),
            "Configuration error: connection_degree must be even"
        );
    }

    #[test]
    fn io_error_is_wrapped() {
        let error: TraceNetError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(error, TraceNetError::IoError(_)));
    }
}
