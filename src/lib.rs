pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod mirror;
pub mod render;
pub mod service;
pub mod state;
pub mod storage;

use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use crate::{config::Config, error::Result, state::AppState};

/// 日志过滤规则所在的环境变量
pub const LOG_ENV: &str = "PASSAGE_LOG";

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_env_filter(EnvFilter::from_env(LOG_ENV))
        .init();

    let config = Config::load()?;
    let pool = storage::init_db(&config).await?;
    let app = AppState::from_config(pool, &config)?;

    if let Some(password) = &config.admin_password {
        app.auth().ensure_admin(password).await?;
    }

    if config.sync_on_start {
        match app.passages().sync_all().await {
            Ok(report) => tracing::info!(?report, "startup sync done"),
            Err(e) => tracing::warn!(%e, "startup sync failed"),
        }
    }

    app.auth()
        .sessions()
        .clone()
        .spawn_sweeper(config.session_sweep_interval());

    api::run_server(app, &config.listen).await
}
