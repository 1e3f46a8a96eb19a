//! ZK-IoT API facade
//!
//! Thin HTTP/WebSocket surface over the service layer: validates inputs,
//! dispatches to services and translates results to the wire format. No
//! business rules live here.

pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{create_server, run_server, start_background_server};
pub use state::{ApiConfig, AppState};
