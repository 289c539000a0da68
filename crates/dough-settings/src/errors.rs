use std::path::PathBuf;

use thiserror::Error;

/// Why a settings file could not be turned into a usable [`ClientSettings`].
///
/// [`ClientSettings`]: crate::ClientSettings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The merged document parsed but does not fit the settings tree,
    /// e.g. a string where a delay in milliseconds belongs.
    #[error("settings have the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value that deserialized fine but cannot drive the client.
    #[error("{key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/dough/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/dough/settings.json: denied");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn parse_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("settings.json"),
            source,
        };
        assert!(err.to_string().starts_with("settings.json is not valid JSON"));
    }

    #[test]
    fn invalid_value_reads_as_key_and_reason() {
        let err = SettingsError::invalid("reconnect.heartbeatIntervalMs", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "reconnect.heartbeatIntervalMs: must be greater than zero"
        );
    }
}
