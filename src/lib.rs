//! Mortimer: hosts experiment scripts and serves one live session per
//! participant over HTTP.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod experiments;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod script;
pub mod session;
pub mod types;

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::experiments::LiveExperiment;
use crate::experiments::store::{Clock, SessionStore, SystemClock};
use crate::script::{ScriptLoader, ScriptRuntime};
use crate::session::cookie::CookieSigner;
use crate::session::memory::InMemoryBackend;
use crate::session::middleware::{SessionLayer, session_middleware};

/// Shared application state available to all route handlers.
pub struct AppState {
    pub config: Config,
    pub catalog: Catalog,
    pub loader: ScriptLoader,
    pub sessions: Arc<SessionStore<LiveExperiment>>,
    pub session_layer: Arc<SessionLayer<InMemoryBackend>>,
}

impl AppState {
    pub fn new(config: Config, catalog: Catalog, runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self::with_clock(config, catalog, runtime, Arc::new(SystemClock))
    }

    /// Like [`AppState::new`], with the experiment session store reading
    /// time from `clock`.
    pub fn with_clock(
        config: Config,
        catalog: Catalog,
        runtime: Arc<dyn ScriptRuntime>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session_layer = Arc::new(SessionLayer {
            backend: Arc::new(InMemoryBackend::new()),
            signer: CookieSigner::new(&config.session_secret),
            https_only: config.session_https_only,
            cookie_domain: config.cookie_domain.clone(),
        });
        let sessions = Arc::new(SessionStore::new(config.experiment_timeout, clock));

        Self {
            config,
            catalog,
            loader: ScriptLoader::new(runtime),
            sessions,
            session_layer,
        }
    }
}

/// Build the Axum router with all middleware and routes.
pub fn create_app(state: Arc<AppState>) -> Router {
    let session_layer = state.session_layer.clone();

    // Everything that talks to a live session.
    let experiment_routes = Router::new()
        .route(
            "/experiment",
            get(routes::experiment::show).post(routes::experiment::submit),
        )
        .route("/staticfile/{id}", get(routes::files::static_file))
        .route("/dynamicfile/{id}", get(routes::files::dynamic_file))
        .route(
            "/callable/{id}",
            get(routes::callable::callable).post(routes::callable::callable),
        )
        .layer(from_fn(crate::middleware::cache::no_cache));

    let owner_routes = Router::new()
        .route("/owner/login", post(routes::owner::login))
        .route("/owner/logout", post(routes::owner::logout))
        .layer(from_fn(crate::middleware::csrf::require_csrf));

    Router::new()
        .route("/", get(routes::health::welcome))
        .route("/health", get(routes::health::health))
        .route(
            "/start/{expid}",
            get(routes::start::start).post(routes::start::start),
        )
        .route(
            "/finish",
            get(routes::finish::finish).post(routes::finish::finish),
        )
        .route("/manage/{expid}", get(routes::owner::manage))
        .merge(experiment_routes)
        .merge(owner_routes)
        .layer(from_fn(move |req, next| {
            let layer = session_layer.clone();
            session_middleware(layer, req, next)
        }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
