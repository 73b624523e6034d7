mod adapters;
mod console;
mod records;

use anyhow::Result;
use calmline_core::usage::QuotaResponder;
use calmline_core::{Dispatcher, FlowConfig, FlowEngine, FlowRegistry};
use chrono::Utc;
use dotenvy::dotenv;
use std::{env, sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adapters::{CannedResponder, LogAlert};
use console::{parse_line, ConsoleOutbound};
use records::{JsonUsageStore, JsonlRepository};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Logs go to stderr so stdout stays one JSON action per line.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "calmline_bot=info,calmline_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let records_path =
        env::var("CALMLINE_RECORDS_PATH").unwrap_or_else(|_| "calmline-records.jsonl".to_string());
    let usage_path =
        env::var("CALMLINE_USAGE_PATH").unwrap_or_else(|_| "calmline-usage.json".to_string());
    let sweep_secs: u64 = env::var("CALMLINE_SWEEP_SECS")
        .unwrap_or_else(|_| "60".to_string())
        .parse()?;

    let config = FlowConfig::from_env()?;
    let repository = JsonlRepository::open(records_path).await?;
    info!(records = %repository.path().display(), sweep_secs, "configuration loaded");
    let responder = QuotaResponder::new(CannedResponder, LogAlert, config.quota.clone())
        .with_store(JsonUsageStore::new(usage_path))
        .await?;
    let sweeping = config.session_idle.is_some();
    let engine = Arc::new(FlowEngine::with_config(
        config,
        FlowRegistry::standard()?,
        repository,
        responder,
        ConsoleOutbound,
    ));
    let dispatcher = Dispatcher::new(engine.clone(), ConsoleOutbound);

    if sweeping {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(sweep_secs.max(1)));
            loop {
                ticker.tick().await;
                let expired = engine.sweep_idle(Utc::now());
                if !expired.is_empty() {
                    info!(count = expired.len(), "swept idle sessions");
                }
            }
        });
    }

    info!("calmline ready, reading events from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(event)) => dispatcher.dispatch(event).await,
                    Ok(None) => {}
                    Err(e) => warn!("ignoring input line: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    error!("stdin read failed: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    dispatcher.shutdown().await;
    let active_sessions = engine.store().active_count().await;
    info!(active_sessions, "calmline stopped");
    Ok(())
}
