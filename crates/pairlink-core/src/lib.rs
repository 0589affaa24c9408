//! Pairlink Core - Shared types and protocol definitions
//!
//! This crate provides the foundational types used across all Pairlink
//! components: the error taxonomy, pairing roles and tokens, the
//! signalling wire protocol, and the broadcast-channel abstraction that
//! lets the engines run unchanged on a single process or across
//! stateless workers.

pub mod channel;
pub mod config;
pub mod error;
pub mod protocol;
pub mod token;

pub use channel::{ConnectionChannel, ConnectionChannelFactory, InMemoryChannelFactory};
pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{AuthPayload, Metadata, ServerFrame};
pub use token::{generate_nonce, KeyedTokenSigner, Role, TokenClaims, TokenSigner};
