use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum LocustgenError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Test with ID {0} not found")]
    TestNotFound(String),

    #[error("External process error: {message}")]
    ExternalProcess {
        message: String,
        raw_output: Option<String>,
    },

    #[error("Rate limit exceeded: at most {limit} requests per minute")]
    RateLimitExceeded { limit: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl LocustgenError {
    /// Raw process output attached to an [`LocustgenError::ExternalProcess`],
    /// if any was captured.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            LocustgenError::ExternalProcess { raw_output, .. } => raw_output.as_deref(),
            _ => None,
        }
    }
}

impl Serialize for LocustgenError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_display_is_wire_string() {
        let err = LocustgenError::UnknownCommand("explode".to_string());
        assert_eq!(err.to_string(), "Unknown command: explode");
    }

    #[test]
    fn test_not_found_display_is_wire_string() {
        let err = LocustgenError::TestNotFound("20250428_224001".to_string());
        assert_eq!(err.to_string(), "Test with ID 20250428_224001 not found");
    }

    #[test]
    fn rate_limit_display_names_limit() {
        let err = LocustgenError::RateLimitExceeded { limit: 60 };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: at most 60 requests per minute"
        );
    }

    #[test]
    fn external_process_exposes_raw_output() {
        let err = LocustgenError::ExternalProcess {
            message: "bad output".to_string(),
            raw_output: Some("Traceback...".to_string()),
        };
        assert_eq!(err.to_string(), "External process error: bad output");
        assert_eq!(err.raw_output(), Some("Traceback..."));
    }

    #[test]
    fn raw_output_is_none_for_other_variants() {
        let err = LocustgenError::Validation("users must be positive".to_string());
        assert!(err.raw_output().is_none());
    }

    #[test]
    fn io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LocustgenError = io_err.into();
        let msg = err.to_string();
        assert!(msg.contains("IO error"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn serde_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not valid json").unwrap_err();
        let err: LocustgenError = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn serialize_produces_string() {
        let err = LocustgenError::MalformedInput("no URL found".to_string());
        let json = serde_json::to_string(&err).expect("serialize should succeed");
        assert_eq!(json, "\"Malformed input: no URL found\"");
    }
}
