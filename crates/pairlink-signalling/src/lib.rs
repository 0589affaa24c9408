//! Signalling relay for paired peers
//!
//! Once two parties hold role tokens for the same pairing, each opens a
//! signalling connection, authenticates, and exchanges WebRTC
//! offer/answer/ICE frames through the relay. The relay never inspects
//! content beyond its type tag: frames are forwarded to the opposite
//! role verbatim.
//!
//! Two interchangeable backends implement the rendezvous:
//!
//! - [`SignallingEngine`] / [`ConnectionHandler`]: a shared
//!   [`ConnectionStore`] keyed by `(pairing_id, role)`, for
//!   single-process deployments.
//! - [`ChannelConnectionHandler`]: a broadcast channel per pairing id,
//!   for deployments where the two legs may land on different workers.

mod auth;
mod channel_session;
mod engine;
mod parser;
mod store;

pub use auth::{AuthValidator, ParsedToken, PassThroughAuthValidator, SignedAuthValidator};
pub use channel_session::{
    ChannelConnectionHandler, PeerEvent, SignalEvents, SignallingChannelSession,
};
pub use engine::{ConnectionHandler, SignallingEngine};
pub use parser::{parse_message, IncomingMessage};
pub use store::{ConnectionRecord, ConnectionSink, ConnectionStore, InMemoryConnectionStore};
