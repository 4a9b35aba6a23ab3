//! Bearer Guard Demo - a protected axum API
//!
//! ```text
//! cargo run -p bearer-guard-demo -- demo/guard.toml
//! curl -H "Authorization: Bearer $TOKEN" http://127.0.0.1:8080/me
//! ```
//!
//! Settings in the config file can be overridden with `BEARER_GUARD_*`
//! environment variables; logging follows `RUST_LOG`.

use std::sync::Arc;

use axum::{Extension, Json, Router, routing::get};
use bearer_guard::{AuthContext, GuardConfig, GuardLayer, ResourceServerGuard};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "demo/guard.toml";
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Echo the caller's verified claims
async fn me(Extension(auth): Extension<AuthContext>) -> Json<AuthContext> {
    Json(auth)
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bearer_guard=debug")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = GuardConfig::from_file(&config_path)?;
    info!(
        config = %config_path,
        issuer = %config.issuer,
        key_source = %config.key_source_uri,
        "Loaded guard configuration"
    );

    let guard = Arc::new(ResourceServerGuard::new(config)?);

    // Only routes added before `route_layer` are protected.
    let app = Router::new()
        .route("/me", get(me))
        .route_layer(GuardLayer::new(guard))
        .route("/health", get(health));

    let addr = std::env::var("DEMO_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Protected API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
