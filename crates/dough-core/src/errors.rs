/// Why an inbound frame was dropped. Never fatal to the channel.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid {kind} payload: {reason}")]
    InvalidShape { kind: &'static str, reason: String },
}

impl DecodeError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::MissingField(_) => "missing_field",
            Self::InvalidShape { .. } => "invalid_shape",
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            DecodeError::MissingField("type").to_string(),
            "missing field: type"
        );
        let shape = DecodeError::InvalidShape {
            kind: "members_update",
            reason: "expected array".into(),
        };
        assert_eq!(shape.to_string(), "invalid members_update payload: expected array");
        assert_eq!(shape.error_kind(), "invalid_shape");
    }

    #[test]
    fn from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        assert!(matches!(DecodeError::from(err), DecodeError::Json(_)));
    }
}
