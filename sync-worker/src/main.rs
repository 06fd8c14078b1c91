use anyhow::{Context, Result};
use hubsync::config::{load_config, SinkKind, SyncConfig};
use hubsync::sink::{ActionSink, HttpSink, LogSink};
use hubsync::SqliteAccountStore;
use std::sync::Arc;
use sync_worker::{HubSpotClient, OAuthApp, Orchestrator};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sync_worker=info,hubsync=info".into()),
        )
        .init();

    info!("Sync worker starting...");

    // File configuration is optional; environment overrides always apply
    let mut config = match std::env::var("HUBSYNC_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => SyncConfig::default(),
    };
    config.apply_env();

    let encryption_key = std::env::var("HUBSYNC_ENCRYPTION_KEY")
        .context("HUBSYNC_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    info!(
        hubspot_base_url = %config.hubspot.base_url,
        accounts_db = %config.store.path,
        sink = ?config.sink.kind,
        flush_threshold = config.queue.flush_threshold,
        dry_run = config.dry_run,
        "Configuration loaded"
    );

    let store = Arc::new(
        SqliteAccountStore::new(&config.store.path, &encryption_key)
            .context("Failed to initialize account store")?,
    );
    info!("Account store initialized");

    let client = Arc::new(HubSpotClient::new(&config.hubspot.base_url)?);

    let sink: Arc<dyn ActionSink> = match config.sink.kind {
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::Http => {
            let url = config
                .sink
                .url
                .as_deref()
                .context("sink.url (or HUBSYNC_SINK_URL) is required for the http sink")?;
            Arc::new(HttpSink::new(url, config.sink.token.clone()))
        }
    };

    let app = OAuthApp::from_env()?;

    let orchestrator = Orchestrator::new(store, client, sink, app, &config);
    let summary = orchestrator.run().await?;

    info!(
        run_id = %summary.run_id,
        accounts = summary.accounts.len(),
        failed_stages = summary.failed_stages(),
        "Sync worker finished"
    );

    Ok(())
}
