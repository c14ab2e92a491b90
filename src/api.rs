//! HTTP API for the relay
//!
//! `POST /chat` webhook, `GET /history/{recipient}`, `GET /` liveness.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::relay::Relay;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub service_name: Arc<str>,
}

impl AppState {
    pub fn new(relay: Arc<Relay>, service_name: &str) -> Self {
        Self {
            relay,
            service_name: Arc::from(service_name),
        }
    }
}
