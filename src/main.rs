//! Local server entrypoint.
//!
//! Reads `.env`, loads the catalog, and serves experiments with the
//! process script runtime.

use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use mortimer::catalog::Catalog;
use mortimer::config::Config;
use mortimer::script::process::ProcessRuntime;
use mortimer::{AppState, create_app};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = Config::from_env().expect("Failed to load configuration");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let catalog = Catalog::from_file(&config.catalog_path).expect("Failed to load catalog");
    tracing::info!(
        path = %config.catalog_path.display(),
        experiments = catalog.len(),
        "catalog loaded"
    );

    let runtime = Arc::new(ProcessRuntime::new(
        config.script_interpreter.clone(),
        config.script_call_timeout,
    ));
    let state = Arc::new(AppState::new(config.clone(), catalog, runtime));

    if let Some(every) = config.sweep_interval {
        tracing::info!(interval_secs = every.as_secs(), "periodic session sweep enabled");
        state.sessions.clone().spawn_sweeper(every);
    }

    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
