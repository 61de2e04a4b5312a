use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use corkboard::config::{Cli, Config};
use corkboard::state::{AppState, DbPool};
use corkboard::{auth, db, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    let pool = match init_database(&config) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database initialization failed: {:#}", e);
            return Err(e);
        }
    };

    let state = AppState {
        db: pool,
        config: config.clone(),
    };
    let app = corkboard::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the database, apply migrations and repair state left by earlier runs.
fn init_database(config: &Config) -> anyhow::Result<DbPool> {
    tracing::info!("Database: {}", config.db_path().display());
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    let conn = pool.get()?;
    let purged = auth::session::purge_expired(&conn)?;
    if purged > 0 {
        tracing::info!("Removed {} expired sessions", purged);
    }
    let fixed = store::posts::reconcile_like_counts(&conn)?;
    if fixed > 0 {
        tracing::warn!("Repaired like counters on {} posts", fixed);
    }
    drop(conn);

    Ok(pool)
}
