//! HTTP API server for external call control
//!
//! This module provides a REST API for driving calls:
//! - POST /calls - Start a new call
//! - POST /calls/:id/stop - End a call and return final stats
//! - PUT /calls/:id/mute - Gate or ungate the transmit side
//! - GET /calls/:id - Query call status
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
