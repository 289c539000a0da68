use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use dough_api::ApiClient;
use dough_settings::ClientSettings;
use dough_sync::{
    ConnectionManager, ConnectionStatus, EngineExit, EngineInput, MetadataSink, ReconnectPolicy,
    SocialTags, SyncEngine, TagFilter,
};
use dough_telemetry::{init_telemetry, LogFormat, TelemetryConfig, TelemetryGuard};
use tokio::sync::watch;
use tracing::Level;

/// Failed connection attempts in a row before sync logging goes to debug.
const VERBOSE_AFTER_FAILURES: u32 = 3;

/// Recent warnings echoed when a session ends.
const WARNINGS_AT_SESSION_END: usize = 5;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

/// Follow the system's presence in real time.
#[derive(Parser, Debug)]
#[command(name = "dough", version)]
struct Cli {
    /// Server base URL; overrides the settings file.
    #[arg(long)]
    base_url: Option<String>,

    /// Settings file (defaults to ~/.doughmination/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Session token for authenticated endpoints.
    #[arg(long, env = "DOUGH_SESSION_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Initial member search text.
    #[arg(long, default_value = "")]
    search: String,

    /// Initial tag filter; "untagged" selects members without tags.
    #[arg(long)]
    tag: Option<String>,

    #[arg(long, value_enum, default_value_t = Format::Pretty)]
    log_format: Format,
}

/// Writes document metadata to the log.
struct LogSink;

impl MetadataSink for LogSink {
    fn set_title(&mut self, title: &str) {
        tracing::info!(title, "title");
    }

    fn set_favicon(&mut self, href: &str) {
        tracing::debug!(href, "favicon");
    }

    fn set_social_tags(&mut self, tags: &SocialTags) {
        tracing::debug!(
            title = %tags.title,
            description = %tags.description,
            image = %tags.image,
            theme_color = %tags.theme_color,
            "social tags"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = Arc::new(init_telemetry(TelemetryConfig {
        format: match cli.log_format {
            Format::Pretty => LogFormat::Pretty,
            Format::Json => LogFormat::Json,
        },
        ..Default::default()
    }));

    let mut settings = match &cli.settings {
        Some(path) => dough_settings::load_settings_from_path(path),
        None => dough_settings::load_settings(),
    }
    .context("loading settings")?;
    if let Some(base_url) = &cli.base_url {
        settings.server.base_url = base_url.clone();
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received");
        }
        ctrl_c.cancel();
    });

    loop {
        match run_session(&cli, &settings, &telemetry, &shutdown).await? {
            EngineExit::Reload => {
                tracing::info!("reloading with fresh state");
            }
            EngineExit::Shutdown | EngineExit::Cancelled => break,
        }
    }

    tracing::info!("shutting down");
    Ok(())
}

/// One page lifetime: fresh engine, fresh push channel.
async fn run_session(
    cli: &Cli,
    settings: &ClientSettings,
    telemetry: &Arc<TelemetryGuard>,
    shutdown: &CancellationToken,
) -> anyhow::Result<EngineExit> {
    let mut client = ApiClient::new(&settings.server.base_url, settings.server.request_timeout())
        .context("building api client")?;
    if let Some(token) = &cli.token {
        client = client.with_token(SecretString::from(token.clone()));
    }
    let push_url = settings.server.push_url().context("deriving push url")?;

    let mut engine = SyncEngine::new(
        Arc::new(client),
        LogSink,
        settings.metadata.clone(),
        settings.banner.grace(),
    );
    let handle = engine.handle();
    handle.send(EngineInput::SetSearch(cli.search.clone())).await;
    handle
        .send(EngineInput::SetTagFilter(cli.tag.as_deref().map(TagFilter::parse)))
        .await;

    let session = shutdown.child_token();
    let manager = ConnectionManager::new(
        push_url,
        ReconnectPolicy::from(&settings.reconnect),
        settings.reconnect.heartbeat_interval(),
    );
    let status = manager.subscribe();
    let connection = tokio::spawn(manager.run(handle.inputs(), session.clone()));
    let status_log = tokio::spawn(watch_status(status, Arc::clone(telemetry)));

    let exit = engine.run(&session).await;
    session.cancel();
    if let Err(e) = connection.await {
        tracing::error!(error = %e, "push channel task failed");
    }
    status_log.abort();
    if let Err(e) = telemetry.clear_module_level("dough_sync") {
        tracing::warn!(error = %e, "could not restore sync log level");
    }

    if let Some(warnings) = telemetry.warnings() {
        for record in warnings.recent(WARNINGS_AT_SESSION_END) {
            tracing::info!(
                at = %record.timestamp,
                target = %record.target,
                message = %record.message,
                "recent warning"
            );
        }
        warnings.clear();
    }

    let view = handle.current();
    tracing::info!(
        exit = ?exit,
        members = view.members.len(),
        fronters = view.fronting.len(),
        "session ended"
    );
    Ok(exit)
}

/// Log status changes. After repeated failed attempts, turn sync logging up
/// to debug until the channel connects again.
async fn watch_status(mut status: watch::Receiver<ConnectionStatus>, telemetry: Arc<TelemetryGuard>) {
    let mut failures = 0u32;
    let mut verbose = false;
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        tracing::info!(status = ?current, "push channel status");
        match current {
            ConnectionStatus::Connected => {
                failures = 0;
                if verbose {
                    verbose = false;
                    if let Err(e) = telemetry.clear_module_level("dough_sync") {
                        tracing::warn!(error = %e, "could not restore sync log level");
                    }
                }
            }
            ConnectionStatus::Disconnected => {
                failures += 1;
                if failures >= VERBOSE_AFTER_FAILURES && !verbose {
                    verbose = true;
                    tracing::warn!(failures, "push channel keeps failing, raising sync log level");
                    if let Err(e) = telemetry.set_module_level("dough_sync", Level::DEBUG) {
                        tracing::warn!(error = %e, "could not raise sync log level");
                    }
                }
            }
            ConnectionStatus::Connecting => {}
        }
    }
}
