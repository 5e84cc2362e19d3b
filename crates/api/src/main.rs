//! FieldSync - offline-first scouting sync daemon
//!
//! Usage:
//! - `fieldsync` / `fieldsync run`: keep draining the queue until Ctrl-C
//! - `fieldsync sync`: drain the queue once and print the report
//! - `fieldsync status`: print queue and sync status

use anyhow::{bail, Context};
use fieldsync_app::AppContext;
use fieldsync_infra::{config, init_tracing};

enum Mode {
    Run,
    SyncOnce,
    Status,
}

fn parse_mode() -> anyhow::Result<Mode> {
    match std::env::args().nth(1).as_deref() {
        None | Some("run") => Ok(Mode::Run),
        Some("sync") => Ok(Mode::SyncOnce),
        Some("status") => Ok(Mode::Status),
        Some(other) => bail!("unknown command {other:?} (expected run, sync or status)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_mode()?;

    // A missing .env is normal outside development
    let dotenv = dotenvy::dotenv();

    let config = config::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    init_tracing(&config.logging).context("failed to initialise logging")?;

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "Loaded .env"),
        Err(e) => tracing::debug!(error = %e, "No .env loaded"),
    }

    let ctx = AppContext::new_with_config(config).context("failed to build application context")?;

    match mode {
        Mode::Run => run(&ctx).await,
        Mode::SyncOnce => {
            let report = ctx.sync.sync_now().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Mode::Status => {
            let status = ctx.sync.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    tracing::info!("FieldSync starting...");
    let auto_sync = ctx.start().await?;
    if !auto_sync {
        tracing::warn!("Background sync disabled; running one sync pass and exiting");
        let report = ctx.sync.sync_now().await?;
        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Sync pass finished"
        );
        return Ok(());
    }

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    ctx.shutdown().await?;
    Ok(())
}
