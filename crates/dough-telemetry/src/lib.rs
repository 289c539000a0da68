mod warnings;

pub use warnings::{WarningBuffer, WarningLayer, WarningRecord};

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Level;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

/// Output format for the stdout layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "dough_sync" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub format: LogFormat,
    /// How many warn+ events to keep in memory. Zero disables the buffer.
    pub warning_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: LogFormat::Pretty,
            warning_capacity: 200,
        }
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid log filter {directive:?}: {source}")]
    Directive {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("log filter is no longer installed: {0}")]
    Detached(#[from] reload::Error),
}

/// Handle kept alive by the host after telemetry is initialised.
///
/// Module levels changed here take effect on the live stdout filter.
pub struct TelemetryGuard {
    warnings: Option<Arc<WarningBuffer>>,
    base: String,
    module_levels: RwLock<Vec<(String, Level)>>,
    filter: FilterHandle,
}

impl TelemetryGuard {
    fn new(
        base: String,
        module_levels: Vec<(String, Level)>,
        warnings: Option<Arc<WarningBuffer>>,
    ) -> (Self, reload::Layer<EnvFilter, Registry>) {
        let directive = join_directive(&base, &module_levels);
        let initial = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(&base));
        let (layer, filter) = reload::Layer::new(initial);
        let guard = Self {
            warnings,
            base,
            module_levels: RwLock::new(module_levels),
            filter,
        };
        (guard, layer)
    }

    /// Set `module` to `level` and reload the stdout filter.
    pub fn set_module_level(&self, module: &str, level: Level) -> Result<(), FilterError> {
        let mut levels = self.module_levels.write();
        match levels.iter_mut().find(|(m, _)| m == module) {
            Some(entry) => entry.1 = level,
            None => levels.push((module.to_string(), level)),
        }
        self.reload(&levels)
    }

    /// Drop the override for `module`, falling back to the base level.
    pub fn clear_module_level(&self, module: &str) -> Result<(), FilterError> {
        let mut levels = self.module_levels.write();
        levels.retain(|(m, _)| m != module);
        self.reload(&levels)
    }

    pub fn module_levels(&self) -> Vec<(String, Level)> {
        self.module_levels.read().clone()
    }

    /// The directive the stdout filter is running with right now.
    pub fn current_filter(&self) -> Option<String> {
        self.filter.with_current(|f| f.to_string()).ok()
    }

    /// Recently captured warn+ events, if the buffer is enabled.
    pub fn warnings(&self) -> Option<&WarningBuffer> {
        self.warnings.as_deref()
    }

    fn reload(&self, levels: &[(String, Level)]) -> Result<(), FilterError> {
        let directive = join_directive(&self.base, levels);
        let filter = EnvFilter::try_new(&directive).map_err(|source| FilterError::Directive {
            directive: directive.clone(),
            source,
        })?;
        self.filter.reload(filter)?;
        tracing::debug!(%directive, "log filter reloaded");
        Ok(())
    }
}

fn join_directive(base: &str, module_levels: &[(String, Level)]) -> String {
    let mut directive = base.to_string();
    for (module, level) in module_levels {
        directive.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    directive
}

/// Build the `EnvFilter` directive string from a config, e.g.
/// `info,dough_sync=debug`.
pub fn filter_directive(config: &TelemetryConfig) -> String {
    join_directive(&config.log_level.to_string().to_lowercase(), &config.module_levels)
}

/// Initialize the telemetry subsystem. Call once at startup.
///
/// `RUST_LOG`, when set and valid, replaces the configured base level.
/// Module overrides are layered on top either way.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let base = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty() && EnvFilter::try_new(v).is_ok())
        .unwrap_or_else(|| config.log_level.to_string().to_lowercase());

    let warnings = (config.warning_capacity > 0)
        .then(|| Arc::new(WarningBuffer::new(config.warning_capacity)));
    let warning_layer = warnings.clone().map(WarningLayer::new);

    let (guard, env_filter) = TelemetryGuard::new(base, config.module_levels, warnings);

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(warning_layer)
        .try_init()
    {
        eprintln!("dough-telemetry: subscriber already set: {e}");
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_includes_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("dough_sync".into(), Level::DEBUG),
                ("dough_api".into(), Level::TRACE),
            ],
            ..Default::default()
        };
        assert_eq!(
            filter_directive(&config),
            "warn,dough_sync=debug,dough_api=trace"
        );
    }

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(filter_directive(&config), "info");
    }

    #[test]
    fn module_levels_reload_the_live_filter() {
        let (guard, _layer) =
            TelemetryGuard::new("info".into(), vec![("dough_sync".into(), Level::INFO)], None);
        guard.set_module_level("dough_sync", Level::TRACE).unwrap();
        guard.set_module_level("dough_api", Level::DEBUG).unwrap();

        let levels = guard.module_levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], ("dough_sync".to_string(), Level::TRACE));
        assert_eq!(levels[1], ("dough_api".to_string(), Level::DEBUG));

        let current = guard.current_filter().unwrap();
        assert!(current.contains("dough_sync=trace"), "{current}");
        assert!(current.contains("dough_api=debug"), "{current}");

        guard.clear_module_level("dough_sync").unwrap();
        let current = guard.current_filter().unwrap();
        assert!(!current.contains("dough_sync"), "{current}");
        assert!(guard.warnings().is_none());
    }

    #[test]
    fn raised_level_silences_a_module() {
        let buffer = Arc::new(WarningBuffer::new(10));
        let (guard, filter) = TelemetryGuard::new("info".into(), Vec::new(), None);
        let subscriber =
            tracing_subscriber::registry().with(WarningLayer::new(buffer.clone()).with_filter(filter));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "noisy", "before");
            guard.set_module_level("noisy", Level::ERROR).unwrap();
            tracing::warn!(target: "noisy", "after");
            tracing::warn!(target: "quiet", "other module");
        });

        let messages: Vec<_> = buffer.recent(10).into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["other module", "before"]);
    }

    #[test]
    fn detached_filter_reports_an_error() {
        let (guard, layer) = TelemetryGuard::new("info".into(), Vec::new(), None);
        drop(layer);
        assert!(matches!(
            guard.set_module_level("dough_sync", Level::DEBUG),
            Err(FilterError::Detached(_))
        ));
    }
}
