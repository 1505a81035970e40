//! Sensor Ingest Server
//!
//! Accepts sensor measurements over WebSocket, derives features, classifies
//! them against a nearest-neighbor reference table and stores the result.
//!
//! # Architecture
//!
//! ```text
//!  client ──ws──► Session ──► decode ──┬──► extract ──► classify (shared model)
//!                                      └──► smooth
//!                    │
//!                    ▼
//!                 Sample ──► channel registry + sample store (PostgreSQL | memory)
//! ```

pub mod auth;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod protocol;
pub mod signal;
pub mod store;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{SessionError, SessionResult};
pub use handlers::session::{Session, SessionContext, SessionState};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionContext>,
}

impl AppState {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session: Arc::new(session),
        }
    }
}

/// Create the router: the ingest socket is served on `/` and `/ws`
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::ws::ws_handler))
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/health", get(handlers::health::check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
