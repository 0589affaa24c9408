//! Pairlink Pairing - the shortcode handshake
//!
//! A responder registers interest and receives a 6-character shortcode;
//! an initiator redeems it once, within 60 seconds, and the two sides
//! exchange public keys plus signed role tokens bound to the new
//! pairing id.
//!
//! Two implementations satisfy the same external contract:
//!
//! - [`PairingEngine`] — push-based. A pending request is a live task
//!   rendezvousing with the redeemer on a [`ConnectionChannel`] keyed
//!   by the shortcode, so the two legs may run in different server
//!   processes. Nothing is stored.
//! - [`PairingRegistry`] — store-based. Pending requests are entries in
//!   a keyed registry and the responder polls
//!   [`PairingRegistry::check_pairing_status`].
//!
//! A deployment should bind one of them per surface, not mix them for
//! the same pairing.
//!
//! [`ConnectionChannel`]: pairlink_core::ConnectionChannel

pub mod engine;
pub mod registry;
pub mod session;

pub use engine::{
    generate_pairing_id, generate_shortcode, InitialPairingData, InitiatorPairDetails,
    PairingEngine, PairingOutcome, PendingPairing,
};
pub use registry::{PairingRegistry, PairingStatus};
pub use session::{ChannelSession, PairingEntry};
