//! Layered settings: defaults, the user file, then `DOUGH_*` env vars.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientSettings::default()`]
//! 2. If `~/.doughmination/settings.json` exists, [`overlay`] it on the defaults
//! 3. Apply `DOUGH_*` environment variable overrides (highest priority)
//! 4. [`validate`] the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ClientSettings;

/// Resolve the path to the settings file (`~/.doughmination/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".doughmination").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Unreadable files, bad JSON and values the
/// client cannot run with are errors.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    let mut merged = serde_json::to_value(ClientSettings::default())?;

    if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        overlay(&mut merged, user);
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    let mut settings: ClientSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

/// Lay `user` over `base` in place. Objects merge key by key at every depth.
/// A `null` in `user` keeps whatever `base` had, and any other value
/// (arrays included) replaces it outright.
pub fn overlay(base: &mut Value, user: Value) {
    match (base, user) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(user_map)) => {
            for (key, value) in user_map {
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None if value.is_null() => {}
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Reject values that would stall or crash the push channel.
pub fn validate(settings: &ClientSettings) -> Result<()> {
    let reconnect = &settings.reconnect;
    if reconnect.heartbeat_interval_ms == 0 {
        return Err(SettingsError::invalid(
            "reconnect.heartbeatIntervalMs",
            "must be greater than zero",
        ));
    }
    if reconnect.base_delay_ms == 0 {
        return Err(SettingsError::invalid(
            "reconnect.baseDelayMs",
            "must be greater than zero",
        ));
    }
    if reconnect.max_delay_ms < reconnect.base_delay_ms {
        return Err(SettingsError::invalid(
            "reconnect.maxDelayMs",
            format!("{} is below baseDelayMs {}", reconnect.max_delay_ms, reconnect.base_delay_ms),
        ));
    }
    if !(0.0..=1.0).contains(&reconnect.jitter_factor) {
        return Err(SettingsError::invalid(
            "reconnect.jitterFactor",
            format!("{} is outside 0..=1", reconnect.jitter_factor),
        ));
    }
    settings.server.push_url().map(|_| ())
}

/// Apply `DOUGH_*` overrides read through `lookup`. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides<F>(settings: &mut ClientSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = read_string(&lookup, "DOUGH_BASE_URL") {
        settings.server.base_url = v;
    }
    if let Some(v) = read_string(&lookup, "DOUGH_WS_PATH") {
        settings.server.ws_path = v;
    }
    if let Some(v) = read_u64(&lookup, "DOUGH_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.server.request_timeout_ms = v;
    }
    if let Some(v) = read_u64(&lookup, "DOUGH_RECONNECT_MAX_MS", 100, 3_600_000) {
        settings.reconnect.max_delay_ms = v;
    }
    if let Some(v) = read_u64(&lookup, "DOUGH_BANNER_GRACE_MS", 0, 600_000) {
        settings.banner.grace_ms = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_string<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.is_empty())
}

fn read_u64<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, min: u64, max: u64) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn overlay_keeps_base_where_user_is_null_or_silent() {
        let mut base = json!({"server": {"baseUrl": "a", "wsPath": "/ws"}, "banner": {"graceMs": 3000}});
        overlay(&mut base, json!({"server": {"baseUrl": "b", "wsPath": null}}));
        assert_eq!(base["server"], json!({"baseUrl": "b", "wsPath": "/ws"}));
        assert_eq!(base["banner"]["graceMs"], 3000);
    }

    #[test]
    fn overlay_replaces_non_objects_whole() {
        let mut base = json!({"tags": ["a", "b"], "server": {"baseUrl": "a"}});
        overlay(&mut base, json!({"tags": ["c"], "server": "flat"}));
        assert_eq!(base, json!({"tags": ["c"], "server": "flat"}));
    }

    #[test]
    fn overlay_skips_new_null_keys() {
        let mut base = json!({"server": {}});
        overlay(&mut base, json!({"server": {"extra": null}, "other": 1}));
        assert_eq!(base, json!({"server": {}, "other": 1}));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server, ClientSettings::default().server);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"banner": {{"graceMs": 500}}, "metadata": {{"siteName": "Test Site"}}}}"#
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.banner.grace_ms, 500);
        assert_eq!(settings.metadata.site_name, "Test Site");
        assert_eq!(
            settings.metadata.default_title,
            "Doughmination System® Server"
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { path: ref p, .. } if *p == path));
    }

    #[test]
    fn wrong_shape_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"banner": {"graceMs": "soon"}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Shape(_)));
    }

    #[test]
    fn zero_heartbeat_is_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"reconnect": {"heartbeatIntervalMs": 0}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue { key: "reconnect.heartbeatIntervalMs", .. }
        ));
    }

    #[test]
    fn validate_checks_reconnect_bounds() {
        let mut settings = ClientSettings::default();
        assert!(validate(&settings).is_ok());

        settings.reconnect.base_delay_ms = 0;
        assert!(validate(&settings).is_err());

        settings.reconnect.base_delay_ms = 5_000;
        settings.reconnect.max_delay_ms = 1_000;
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue { key: "reconnect.maxDelayMs", .. })
        ));

        settings.reconnect.max_delay_ms = 30_000;
        settings.reconnect.jitter_factor = 1.5;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_rejects_unusable_base_url() {
        let mut settings = ClientSettings::default();
        settings.server.base_url = "gopher://old.example".into();
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue { key: "server.baseUrl", .. })
        ));
    }

    #[test]
    fn env_overrides_apply_and_invalid_are_ignored() {
        let mut settings = ClientSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("DOUGH_BASE_URL", "https://example.org"),
                ("DOUGH_RECONNECT_MAX_MS", "not-a-number"),
                ("DOUGH_BANNER_GRACE_MS", "1500"),
                ("DOUGH_WS_PATH", ""),
            ]),
        );
        assert_eq!(settings.server.base_url, "https://example.org");
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.reconnect.max_delay_ms, 30_000);
        assert_eq!(settings.banner.grace_ms, 1500);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("10", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range(" 5 ", 1, 10), Some(5));
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }
}
