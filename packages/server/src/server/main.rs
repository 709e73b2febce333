// Main entry point for the auth server

use std::sync::Arc;

use anyhow::{Context, Result};
use cyberpitch_core::domains::auth::store::{
    spawn_purge_task, CredentialStore, InMemoryCredentialStore, PgCredentialStore,
};
use cyberpitch_core::kernel::{
    BaseCodeDelivery, ChannelRouter, LogDelivery, ResendAdapter, ServerDeps, SystemClock,
    TwilioAdapter,
};
use cyberpitch_core::{server::build_app, Config, DeliveryConfig};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twilio::TwilioService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cyberpitch_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CyberPitch auth server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    if config.jwt_secret_generated {
        tracing::warn!(
            "JWT_SECRET not set, using a random secret; tokens will not survive a restart"
        );
    }

    let store: Arc<dyn CredentialStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            Arc::new(PgCredentialStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory credential store");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    if let Some(every) = config.purge_interval {
        tracing::info!(interval_secs = every.as_secs(), "Starting credential purge task");
        spawn_purge_task(store.clone(), every);
    }

    let delivery: Arc<dyn BaseCodeDelivery> = match config.delivery.clone() {
        DeliveryConfig::Providers { sms, email } => {
            let mut channels: Vec<Arc<dyn BaseCodeDelivery>> = Vec::new();
            if let Some(options) = sms {
                tracing::info!("SMS delivery via Twilio");
                channels.push(Arc::new(TwilioAdapter::new(Arc::new(TwilioService::new(
                    options,
                )))));
            }
            if let Some(options) = email {
                tracing::info!("Email delivery via Resend");
                channels.push(Arc::new(ResendAdapter::new(&options)));
            }
            Arc::new(ChannelRouter::new(channels))
        }
        DeliveryConfig::Log => {
            tracing::warn!("OTP_DELIVERY=log: codes are written to the log, do not use in production");
            Arc::new(LogDelivery)
        }
    };

    let deps = ServerDeps::new(
        store,
        delivery,
        Arc::new(SystemClock),
        config.auth.clone(),
        config.admin_identifiers.clone(),
    );

    let app = build_app(deps, config.rate_limit);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
