//! Binary entrypoint for the Lockstep API server.
use lockstep_api::run;
use lockstep_core::DEFAULT_TIMEOUT_MS;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Default listen address can be overridden with LOCKSTEP_ADDR
    let addr = std::env::var("LOCKSTEP_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    let ceiling_ms = std::env::var("LOCKSTEP_MAX_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    if let Err(e) = run(&addr, Duration::from_millis(ceiling_ms)).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
