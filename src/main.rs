use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use helpdesk_insights::{
    check_credentials,
    cli::Cli,
    config::Config,
    connect_store, create_sync_service,
    models::RunStatus,
    services::{ConversationStore, SyncMode, SyncRequest},
    utils::resolve_window,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "helpdesk_insights=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let maintenance = cli.maintenance()?;
    let limit = cli.limit()?;

    // Validate everything that needs no I/O before touching the network.
    let mode = match maintenance {
        Some(_) => None,
        None if cli.analyze_only => Some(SyncMode::AnalyzeOnly),
        None => {
            let window = resolve_window(cli.window_selector()?, Utc::now())?;
            Some(SyncMode::Full { window })
        }
    };
    let full = matches!(mode, Some(SyncMode::Full { .. }));
    check_credentials(&config, full, mode.is_some())?;

    let store = connect_store(&config).await?;

    if let Some(action) = maintenance {
        let affected = action.run(store.as_ref()).await?;
        println!("{action:?}: {affected} rows affected");
        return Ok(());
    }
    let Some(mode) = mode else {
        return Ok(());
    };

    let store: Arc<dyn ConversationStore> = store;
    let service = create_sync_service(&config, store, full).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight work then stopping");
            on_signal.cancel();
        }
    });

    let summary = service.run(SyncRequest { mode, limit }, cancel).await?;

    match summary.status {
        RunStatus::Completed => tracing::info!(run_id = %summary.run_id, "{}", summary),
        RunStatus::StoppedEarly => tracing::warn!(run_id = %summary.run_id, "{}", summary),
    }
    println!("{summary}");

    Ok(())
}
