use std::sync::Arc;

use outlet_auth::config::{environment::Config, init_db};
use outlet_auth::modules::auth::crud::{
    MySqlAuditSink, MySqlSessionRepository, MySqlUserRepository,
};
use outlet_auth::modules::auth::engine::AuthEngine;
use outlet_auth::modules::auth::lockout::LockoutPolicy;
use outlet_auth::services::{jwt::JwtService, totp::TotpService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outlet_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load environment configuration");

    let db = init_db().await;
    tracing::info!("Connected to MySQL");

    let jwt_service = JwtService::with_durations(
        config.jwt_secret.clone(),
        config.access_token_duration(),
        config.refresh_token_duration(),
    );
    let totp_service = TotpService::new(config.totp_issuer.clone());
    let lockout = LockoutPolicy::new(config.lockout_max_attempts, config.lockout_window());

    let engine = AuthEngine::new(
        Arc::new(MySqlUserRepository::new(db.clone())),
        Arc::new(MySqlSessionRepository::new(db.clone())),
        Arc::new(MySqlAuditSink::new(db)),
        jwt_service,
        totp_service,
        lockout,
    );

    let app = outlet_auth::create_app(engine, config.rate_limit_burst).await;

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::info!("Server running on http://localhost:3000");
    axum::serve(listener, app).await.unwrap();
}
