//! Shared application state for the Axum API server.

use herald_notifier::store::PgOutboxStore;
use sqlx::PgPool;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub outbox: PgOutboxStore,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            outbox: PgOutboxStore::new(pool),
        }
    }
}
