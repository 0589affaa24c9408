//! Pairlink Server - axum HTTP and WebSocket surface
//!
//! Exposes the registry-backed pairing API over plain HTTP, the
//! push-based pairing handshake over `/pairing/ws`, and the signalling
//! relay over `/signalling`.

pub mod http;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use state::AppState;
