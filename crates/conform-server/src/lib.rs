//! HTTP API for compliance checks.
//!
//! Routes live under `/api/v1`. Everything except `/health` requires
//! `Authorization: Bearer <API_KEY>`.

mod auth;
mod error;
mod routes;
mod server;

pub use error::ApiError;
pub use server::{router, serve, shutdown_signal, AppState, API_PREFIX};
