//! Delivery channels
//!
//! Once a message reaches its destination node, its payload may be handed to
//! an outside channel. The registry picks the first registered channel whose
//! validator accepts the destination string.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use wandermesh_protocol::now_ms;

use crate::error::{NetworkError, Result};

/// Confirmation returned by a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub channel: String,
    pub destination: String,
    pub delivered_at_ms: u64,
}

/// An outward delivery capability
#[async_trait::async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Channel name used in receipts and logs
    fn name(&self) -> &str;

    /// Whether this channel can reach `destination`
    fn validate(&self, destination: &str) -> bool;

    /// Deliver `content` to `destination`
    async fn send(&self, destination: &str, content: &[u8]) -> Result<DeliveryReceipt>;
}

/// Ordered set of delivery channels
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Arc<dyn DeliveryChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a channel. Earlier channels take precedence.
    pub fn register(&mut self, channel: Arc<dyn DeliveryChannel>) {
        debug!("Registered delivery channel {}", channel.name());
        self.channels.push(channel);
    }

    /// First channel accepting `destination`
    pub fn detect(&self, destination: &str) -> Option<Arc<dyn DeliveryChannel>> {
        self.channels
            .iter()
            .find(|channel| channel.validate(destination))
            .cloned()
    }

    /// Deliver through the detected channel
    pub async fn deliver(&self, destination: &str, content: &[u8]) -> Result<DeliveryReceipt> {
        let channel = self
            .detect(destination)
            .ok_or_else(|| NetworkError::NoChannelForDestination(destination.to_string()))?;
        channel.send(destination, content).await
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|channel| channel.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Accepts every destination and records the payload in the log
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait::async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn validate(&self, _destination: &str) -> bool {
        true
    }

    async fn send(&self, destination: &str, content: &[u8]) -> Result<DeliveryReceipt> {
        info!(
            "📬 {} <- \"{}\"",
            destination,
            String::from_utf8_lossy(content)
        );
        Ok(DeliveryReceipt {
            channel: self.name().to_string(),
            destination: destination.to_string(),
            delivered_at_ms: now_ms(),
        })
    }
}

/// Keeps delivered payloads in memory, for destinations with a given prefix
#[derive(Debug)]
pub struct MemoryChannel {
    name: String,
    prefix: String,
    delivered: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Everything delivered so far as (destination, content)
    pub async fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl DeliveryChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, destination: &str) -> bool {
        destination.starts_with(&self.prefix)
    }

    async fn send(&self, destination: &str, content: &[u8]) -> Result<DeliveryReceipt> {
        if !self.validate(destination) {
            return Err(NetworkError::DeliveryFailed {
                channel: self.name.clone(),
                reason: format!("{} is not reachable here", destination),
            });
        }

        self.delivered
            .lock()
            .await
            .push((destination.to_string(), content.to_vec()));

        Ok(DeliveryReceipt {
            channel: self.name.clone(),
            destination: destination.to_string(),
            delivered_at_ms: now_ms(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_accepting_channel_wins() {
        let devices = Arc::new(MemoryChannel::new("devices", "DEVICE_"));
        let mut registry = ChannelRegistry::new();
        registry.register(devices.clone());
        registry.register(Arc::new(LogChannel));

        assert_eq!(registry.names(), vec!["devices", "log"]);
        assert_eq!(registry.detect("DEVICE_B").unwrap().name(), "devices");
        assert_eq!(registry.detect("someone@example.org").unwrap().name(), "log");

        let receipt = registry.deliver("DEVICE_B", b"hi").await.unwrap();
        assert_eq!(receipt.channel, "devices");
        assert_eq!(
            devices.delivered().await,
            vec![("DEVICE_B".to_string(), b"hi".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_no_channel_for_destination() {
        let mut registry = ChannelRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(MemoryChannel::new("devices", "DEVICE_")));

        assert!(registry.detect("+15550100").is_none());
        assert!(matches!(
            registry.deliver("+15550100", b"hi").await,
            Err(NetworkError::NoChannelForDestination(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_channel_rejects_foreign_destination() {
        let channel = MemoryChannel::new("devices", "DEVICE_");
        assert!(matches!(
            channel.send("elsewhere", b"x").await,
            Err(NetworkError::DeliveryFailed { .. })
        ));
    }
}
