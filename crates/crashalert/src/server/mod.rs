//! HTTP API for the web client.
//!
//! ## Endpoints
//!
//! ### Contacts
//! - `GET /api/contacts`, `POST /api/contacts`
//! - `GET|PUT|DELETE /api/contacts/{id}`
//!
//! ### Settings
//! - `GET /api/settings`, `POST /api/settings`
//!
//! ### Emergency
//! - `POST /api/emergency/sms` - dispatch through every channel
//! - `POST /api/emergency/sms/fast2sms` - domestic provider only
//! - `POST /api/emergency/sms/twilio` - international provider only
//! - `GET|POST /api/emergency/log`
//! - `POST /api/emergency/countdown` - arm a countdown session
//! - `GET /api/emergency/countdown/{id}`
//! - `POST /api/emergency/countdown/{id}/cancel`
//! - `POST /api/emergency/countdown/{id}/trigger`

pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::error::Result;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Build the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Contacts
        .route(
            "/api/contacts",
            get(handlers::list_contacts).post(handlers::create_contact),
        )
        .route(
            "/api/contacts/{id}",
            get(handlers::get_contact)
                .put(handlers::update_contact)
                .delete(handlers::delete_contact),
        )
        // Settings
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::save_settings),
        )
        // Emergency dispatch
        .route("/api/emergency/sms", post(handlers::send_emergency))
        .route("/api/emergency/sms/fast2sms", post(handlers::send_domestic))
        .route("/api/emergency/sms/twilio", post(handlers::send_international))
        .route(
            "/api/emergency/log",
            get(handlers::recent_log).post(handlers::append_log),
        )
        // Countdown sessions
        .route("/api/emergency/countdown", post(handlers::start_countdown))
        .route("/api/emergency/countdown/{id}", get(handlers::get_countdown))
        .route(
            "/api/emergency/countdown/{id}/cancel",
            post(handlers::cancel_countdown),
        )
        .route(
            "/api/emergency/countdown/{id}/trigger",
            post(handlers::trigger_countdown),
        )
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}
