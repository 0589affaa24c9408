//! Named broadcast channels for cross-process rendezvous
//!
//! The two legs of a handshake may be handled by different server
//! processes, so they meet on a `ConnectionChannel` keyed by shortcode
//! or pairing id. Engines only see the capability interfaces below and
//! stay oblivious to whether the backing channel is an in-process
//! broadcast or a per-key remote actor; both sides of the seam are
//! async for that reason.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use crate::error::Result;

const CHANNEL_CAPACITY: usize = 32;

/// A named broadcast channel: every subscriber sees every message,
/// including the sender's own.
#[async_trait]
pub trait ConnectionChannel: Send + Sync {
    async fn send_message(&self, message: String) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// Returns the channel for a given id. Idempotent: the same id yields
/// the same listener group for the channel's lifetime.
#[async_trait]
pub trait ConnectionChannelFactory: Send + Sync {
    async fn get_connection_channel(&self, channel_id: &str) -> Result<Arc<dyn ConnectionChannel>>;
}

/// Single-process channel factory backed by tokio broadcast channels.
#[derive(Default)]
pub struct InMemoryChannelFactory {
    channels: Mutex<HashMap<String, Arc<InMemoryChannel>>>,
}

impl InMemoryChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of channels currently retained.
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}

#[async_trait]
impl ConnectionChannelFactory for InMemoryChannelFactory {
    async fn get_connection_channel(&self, channel_id: &str) -> Result<Arc<dyn ConnectionChannel>> {
        let mut channels = self.channels.lock().await;
        // A channel with no outstanding handle and no live subscriber
        // is unreachable; drop it so expired shortcodes don't
        // accumulate. A handle that exists but has not subscribed yet
        // keeps its entry via the strong count.
        channels.retain(|_, ch| Arc::strong_count(ch) > 1 || ch.tx.receiver_count() > 0);
        let channel = channels
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(InMemoryChannel::new()))
            .clone();
        Ok(channel)
    }
}

pub struct InMemoryChannel {
    tx: broadcast::Sender<String>,
}

impl InMemoryChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }
}

#[async_trait]
impl ConnectionChannel for InMemoryChannel {
    async fn send_message(&self, message: String) -> Result<()> {
        // A send with no live subscribers is not an error; there is
        // simply nobody to deliver to.
        let _ = self.tx.send(message);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_id_shares_listeners() {
        let factory = InMemoryChannelFactory::new();
        let a = factory.get_connection_channel("ABC123").await.unwrap();
        let b = factory.get_connection_channel("ABC123").await.unwrap();

        let mut rx = b.subscribe();
        a.send_message("hello".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_different_ids_are_isolated() {
        let factory = InMemoryChannelFactory::new();
        let a = factory.get_connection_channel("AAAAAA").await.unwrap();
        let b = factory.get_connection_channel("BBBBBB").await.unwrap();

        let mut rx = b.subscribe();
        a.send_message("hello".to_string()).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_abandoned_channels_are_swept() {
        let factory = InMemoryChannelFactory::new();
        {
            let abandoned = factory.get_connection_channel("AAAAAA").await.unwrap();
            abandoned.send_message("hello".to_string()).await.unwrap();
        }

        let held = factory.get_connection_channel("BBBBBB").await.unwrap();
        let _rx = held.subscribe();

        // The lookup for a third id sweeps the abandoned entry but
        // keeps the one with a live handle.
        let _new = factory.get_connection_channel("CCCCCC").await.unwrap();
        assert_eq!(factory.channel_count().await, 2);
    }

    #[tokio::test]
    async fn test_unsubscribed_handle_keeps_its_channel() {
        let factory = InMemoryChannelFactory::new();
        let early = factory.get_connection_channel("AAAAAA").await.unwrap();

        // No subscriber yet, but the handle is still out there.
        let same = factory.get_connection_channel("AAAAAA").await.unwrap();
        let mut rx = same.subscribe();
        early.send_message("hello".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_send_without_subscribers_is_ok() {
        let factory = InMemoryChannelFactory::new();
        let a = factory.get_connection_channel("CCCCCC").await.unwrap();
        a.send_message("into the void".to_string()).await.unwrap();
    }
}
