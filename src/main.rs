use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

mod bot;
mod config;
mod dashboard;
mod db;
mod live_scores;
mod notify;

use bot::{warmup, EnrichmentCaches, Scanner, Sources};
use config::Config;
use dashboard::AppState;
use db::Database;
use live_scores::{ApiFootball, FixtureSource, NewsFeed, NewsSource, NullSource};
use notify::{LogSink, NotificationSink, TelegramSink};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // The alert log and warm cache are optional; scanning works without them.
    let db = match Database::open(&config.database_path) {
        Ok(db) => {
            info!("Database opened: {}", config.database_path);
            Some(db)
        }
        Err(e) => {
            warn!(
                "Database {} unavailable, running without warm cache or alert log: {:#}",
                config.database_path, e
            );
            None
        }
    };

    let sources = build_sources(&config)?;
    let sink = build_sink(&config)?;
    info!("Notifications via {}", sink.name());

    let caches = EnrichmentCaches::from_config(&config);
    if let Some(db) = &db {
        warmup::load_into(&caches.pregame, db).await;
    }

    let scanner = Arc::new(Scanner::new(config.clone(), sources, caches, sink, db));
    match config.scan_disabled_reason() {
        Some(reason) => warn!("⏸️ Scanning disabled: {}", reason),
        None => info!(
            "▶️ Scanning every {}s, window {}'-{}'",
            config.poll_interval_secs, config.window_start, config.window_end
        ),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scan_task = tokio::spawn(Arc::clone(&scanner).run_periodic(
        Duration::from_secs(config.poll_interval_secs),
        shutdown_rx.clone(),
    ));
    let warmup_task = tokio::spawn(warmup::run_warmup_loop(
        Arc::clone(&scanner),
        Duration::from_secs(config.warmup_interval_secs),
        shutdown_rx.clone(),
    ));

    // Start the dashboard HTTP server
    let app = dashboard::router(AppState {
        scanner: Arc::clone(&scanner),
    });
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run dashboard server (blocks until ctrl-c)
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Let an in-flight cycle finish before exiting.
    let _ = scan_task.await;
    let _ = warmup_task.await;
    info!("Stopped");
    Ok(())
}

fn build_sources(config: &Config) -> Result<Sources> {
    let timeout = config.request_timeout();

    let news: Arc<dyn NewsSource> = match config.news_api_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Arc::new(NewsFeed::new(url, timeout)?),
        _ => {
            info!("NEWS_API_URL not set; news boost disabled");
            Arc::new(NullSource)
        }
    };

    let api_key = config
        .football_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty());
    let Some(api_key) = api_key else {
        return Ok(Sources {
            fixtures: Arc::new(NullSource) as Arc<dyn FixtureSource>,
            news,
            pregame: Arc::new(NullSource),
            players: Arc::new(NullSource),
            team_forms: Arc::new(NullSource),
        });
    };

    let provider = Arc::new(ApiFootball::new(api_key, &config.football_api_url, timeout)?);
    info!("Fixture source: {}", provider.name());
    Ok(Sources {
        fixtures: provider.clone(),
        news,
        pregame: provider.clone(),
        players: provider.clone(),
        team_forms: provider,
    })
}

fn build_sink(config: &Config) -> Result<Arc<dyn NotificationSink>> {
    match (
        config.telegram_bot_token.as_deref(),
        config.telegram_chat_id.as_deref(),
    ) {
        (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => Ok(Arc::new(
            TelegramSink::new(token, chat, config.request_timeout())?,
        )),
        _ => Ok(Arc::new(LogSink)),
    }
}
