use anyhow::Result;
use clap::Parser;
use fungihub::api::{self, AppState};
use fungihub::print::PrintClient;
use fungihub::{config, db, sweep};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/fungihub.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    // Background ready-check sweep; the cron endpoint can also trigger it.
    let sweep_pool = pool.clone();
    let ready_days = cfg.automation.grain_ready_days;
    let sweep_interval = Duration::from_secs(cfg.automation.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            match sweep::run_ready_check(&sweep_pool, ready_days).await {
                Ok(summary) => {
                    info!(
                        checked = summary.checked,
                        updated = summary.updated,
                        "ready-check sweep finished"
                    );
                }
                Err(err) => error!(?err, "ready-check sweep failed"),
            }
        }
    });

    let printer = PrintClient::new(
        &cfg.print.base_url,
        Duration::from_secs(cfg.print.timeout_secs),
    )?;
    let state = AppState {
        pool,
        printer: Arc::new(printer),
        auth: Arc::new(cfg.auth.clone()),
        grain_ready_days: ready_days,
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr).await?;
    info!(addr = %cfg.app.bind_addr, "starting fungihub");
    axum::serve(listener, app).await?;

    Ok(())
}
