//! Shared application state

use pairlink_core::Config;
use pairlink_pairing::{PairingEngine, PairingRegistry};
use pairlink_signalling::SignallingEngine;
use std::sync::Arc;

/// Everything the handlers need, shared behind one `Arc`.
///
/// Both pairing implementations are wired in: the registry backs the
/// HTTP polling surface, the engine backs the WebSocket push surface.
/// They issue tokens from the same signer, so either kind of pairing
/// authenticates against the same signalling relay.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<PairingRegistry>,
    pub engine: Arc<PairingEngine>,
    pub signalling: SignallingEngine,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<PairingRegistry>,
        engine: Arc<PairingEngine>,
        signalling: SignallingEngine,
    ) -> Self {
        Self {
            config,
            registry,
            engine,
            signalling,
        }
    }
}
