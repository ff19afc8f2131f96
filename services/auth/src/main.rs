use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use auth_service::AppState;
use auth_service::config::AuthConfig;
use auth_service::repositories::{InMemoryUserStore, SharedUserStore, UserRepository};
use auth_service::routes;
use auth_service::security_log::TracingSecurityLog;
use common::database::{self, DatabaseConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    info!("Starting authentication service");

    let config = AuthConfig::from_env().context("invalid authentication configuration")?;
    let users = open_user_store().await?;

    let bind_address = config.bind_address.clone();
    let app_state = AppState::new(config, users, Arc::new(TracingSecurityLog));

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&bind_address).await?;
    info!("Authentication service listening on {}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// PostgreSQL unless `STORE_BACKEND=memory` is set
async fn open_user_store() -> Result<SharedUserStore> {
    if std::env::var("STORE_BACKEND").is_ok_and(|backend| backend.eq_ignore_ascii_case("memory")) {
        warn!("Using the in-memory user store; data is lost on shutdown");
        return Ok(Arc::new(InMemoryUserStore::new()));
    }

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let repository = UserRepository::new(pool);
    repository.migrate().await?;
    info!("User schema is up to date");

    Ok(Arc::new(repository))
}
