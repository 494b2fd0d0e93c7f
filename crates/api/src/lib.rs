//! Herald producer-facing HTTP API.
//!
//! - `GET  /api/health`
//! - `POST /api/notification` (plain email, generic template)
//! - `POST /api/notification/outbox` (raw outbox enqueue)
//! - `GET  /api/notification/outbox/{id}` (delivery state)

pub mod routes;
pub mod state;
