//! Message types and structures

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{ProtocolError, Result};
use crate::learning::{LearningRecord, RouteObservation};
use crate::now_ms;
use crate::types::{NodeId, Priority};

/// Size of a message ID in bytes
pub const MESSAGE_ID_SIZE: usize = 16;

/// Maximum message content size (1 MB)
pub const MAX_CONTENT_SIZE: usize = 1024 * 1024;

/// Default hop budget for new messages
pub const DEFAULT_TTL: u32 = 100;

/// Maximum number of clone derivations for any message instance
pub const MAX_CLONES: u8 = 5;

/// Size of the content integrity digest in bytes
pub const CONTENT_DIGEST_SIZE: usize = 32;

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// A unique identifier for a message, shared by all of its clones
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId([u8; MESSAGE_ID_SIZE]);

impl MessageId {
    /// Generate a new message ID from message contents
    /// Uses BLAKE2b(timestamp + source + destination + content + sequence)[0:16]
    pub fn generate(
        source: &NodeId,
        destination: &NodeId,
        content: &[u8],
        timestamp: u64,
        sequence: u32,
    ) -> Self {
        let mut hasher = Blake2b512::new();

        hasher.update(timestamp.to_le_bytes());
        hasher.update(source.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(destination.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(content);
        hasher.update(sequence.to_le_bytes());

        let hash = hasher.finalize();

        let mut id = [0u8; MESSAGE_ID_SIZE];
        id.copy_from_slice(&hash[..MESSAGE_ID_SIZE]);

        MessageId(id)
    }

    /// Create from bytes
    pub fn from_bytes(bytes: [u8; MESSAGE_ID_SIZE]) -> Self {
        MessageId(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; MESSAGE_ID_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))?;

        if bytes.len() != MESSAGE_ID_SIZE {
            return Err(ProtocolError::InvalidMessageId);
        }

        let mut arr = [0u8; MESSAGE_ID_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(MessageId(arr))
    }
}

impl std::fmt::Debug for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageId({}...)", &self.to_hex()[..12])
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.to_hex()[..8])
    }
}

/// BLAKE2b-512 of the payload, truncated to [`CONTENT_DIGEST_SIZE`] bytes
pub fn content_digest(content: &[u8]) -> [u8; CONTENT_DIGEST_SIZE] {
    let hash = Blake2b512::digest(content);
    let mut digest = [0u8; CONTENT_DIGEST_SIZE];
    digest.copy_from_slice(&hash[..CONTENT_DIGEST_SIZE]);
    digest
}

/// A message travelling through the WanderMesh network
///
/// The router never interprets `content`. Everything else is routing state
/// and is mutated in place as the message moves from node to node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Logical identity, shared with clones
    pub id: MessageId,

    /// Originating node
    pub source: NodeId,

    /// Final destination
    pub destination: NodeId,

    /// Opaque payload
    pub content: Vec<u8>,

    /// Digest of `content` taken at creation
    pub integrity: [u8; CONTENT_DIGEST_SIZE],

    /// Scheduling priority (higher first)
    pub priority: Priority,

    /// Remaining hop budget
    pub ttl: u32,

    /// Nodes visited so far, starting with the source
    pub path: Vec<NodeId>,

    /// Nodes that confirmed receipt at the destination
    pub deliveries: BTreeSet<NodeId>,

    /// Number of derivations made before this instance
    pub clone_count: u8,

    /// Whether the learning record drives route scoring
    pub cognizant: bool,

    /// Route learning carried with the message
    pub learning: LearningRecord,

    /// Creation time (unix milliseconds)
    pub created_at_ms: u64,
}

impl Message {
    /// Create a new message originating at `source`
    pub fn new(source: NodeId, destination: NodeId, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let created_at_ms = now_ms();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = MessageId::generate(&source, &destination, &content, created_at_ms, sequence);

        Message {
            id,
            path: vec![source.clone()],
            source,
            destination,
            integrity: content_digest(&content),
            content,
            priority: Priority::default(),
            ttl: DEFAULT_TTL,
            deliveries: BTreeSet::new(),
            clone_count: 0,
            cognizant: true,
            learning: LearningRecord::new(),
            created_at_ms,
        }
    }

    /// Set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set hop budget
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable learned scoring
    pub fn with_cognizant(mut self, cognizant: bool) -> Self {
        self.cognizant = cognizant;
        self
    }

    /// Check structural invariants of a message received from elsewhere
    pub fn validate(&self) -> Result<()> {
        if self.content.len() > MAX_CONTENT_SIZE {
            return Err(ProtocolError::ContentTooLarge {
                size: self.content.len(),
                max: MAX_CONTENT_SIZE,
            });
        }
        if !self.verify_integrity() {
            return Err(ProtocolError::IntegrityMismatch);
        }
        if self.clone_count > MAX_CLONES {
            return Err(ProtocolError::CloneCountExceeded {
                count: self.clone_count,
                max: MAX_CLONES,
            });
        }
        if self.path.is_empty() {
            return Err(ProtocolError::EmptyPath);
        }
        Ok(())
    }

    /// Whether the payload still matches the digest taken at creation
    pub fn verify_integrity(&self) -> bool {
        content_digest(&self.content) == self.integrity
    }

    /// Whether this node is the final destination
    pub fn is_for(&self, node: &NodeId) -> bool {
        &self.destination == node
    }

    /// Append `node` to the path unless it is already the most recent entry
    pub fn visit(&mut self, node: &NodeId) {
        if self.path.last() != Some(node) {
            self.path.push(node.clone());
        }
    }

    /// Spend one hop of the TTL budget
    pub fn consume_hop(&mut self) {
        self.ttl = self.ttl.saturating_sub(1);
    }

    /// Whether learned scoring applies to this message
    pub fn uses_learning(&self) -> bool {
        self.cognizant && self.learning.has_preferences()
    }

    /// Record a transmission outcome. Non-cognizant messages learn nothing.
    pub fn record_outcome(&mut self, observation: RouteObservation, success: bool) {
        if !self.cognizant {
            return;
        }
        if success {
            self.learning.record_success(observation);
        } else {
            self.learning.record_failure(observation);
        }
    }

    /// Content as text for logging, lossy for non-UTF-8 payloads
    pub fn content_preview(&self, max_chars: usize) -> String {
        String::from_utf8_lossy(&self.content)
            .chars()
            .take(max_chars)
            .collect()
    }

    /// Encode for transmission
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    /// Decode a received message
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransportKind;

    fn create_test_message() -> Message {
        Message::new(NodeId::from("DEVICE_A"), NodeId::from("DEVICE_B"), "hello")
    }

    fn observation() -> RouteObservation {
        RouteObservation {
            transport: TransportKind::Wifi,
            next_hop: NodeId::from("DEVICE_B"),
            signal_quality: 0.9,
            latency_ms: 20.0,
            observed_at_ms: 1,
        }
    }

    #[test]
    fn test_message_defaults() {
        let msg = create_test_message();

        assert_eq!(msg.path, vec![NodeId::from("DEVICE_A")]);
        assert_eq!(msg.ttl, DEFAULT_TTL);
        assert_eq!(msg.priority, Priority::low());
        assert_eq!(msg.clone_count, 0);
        assert!(msg.cognizant);
        assert!(msg.deliveries.is_empty());
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = create_test_message();
        let b = create_test_message();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_message_id_hex() {
        let msg = create_test_message();
        let parsed = MessageId::from_hex(&msg.id.to_hex()).unwrap();
        assert_eq!(parsed, msg.id);

        assert!(matches!(
            MessageId::from_hex("abcd"),
            Err(ProtocolError::InvalidMessageId)
        ));
    }

    #[test]
    fn test_visit_skips_consecutive_duplicates() {
        let mut msg = create_test_message();
        msg.visit(&NodeId::from("DEVICE_A"));
        assert_eq!(msg.path.len(), 1);

        msg.visit(&NodeId::from("RELAY"));
        msg.visit(&NodeId::from("RELAY"));
        assert_eq!(
            msg.path,
            vec![NodeId::from("DEVICE_A"), NodeId::from("RELAY")]
        );
    }

    #[test]
    fn test_consume_hop_saturates() {
        let mut msg = create_test_message().with_ttl(1);
        msg.consume_hop();
        assert_eq!(msg.ttl, 0);
        msg.consume_hop();
        assert_eq!(msg.ttl, 0);
    }

    #[test]
    fn test_non_cognizant_message_learns_nothing() {
        let mut msg = create_test_message().with_cognizant(false);
        msg.record_outcome(observation(), true);
        msg.record_outcome(observation(), false);

        assert!(msg.learning.preferences.is_empty());
        assert!(msg.learning.successful_routes.is_empty());
        assert!(msg.learning.failed_routes.is_empty());
        assert!(!msg.uses_learning());
    }

    #[test]
    fn test_cognizant_message_learns() {
        let mut msg = create_test_message();
        assert!(!msg.uses_learning());

        msg.record_outcome(observation(), true);
        assert!(msg.uses_learning());
        assert_eq!(msg.learning.preference(TransportKind::Wifi), 1);
    }

    #[test]
    fn test_validation_rejects_broken_messages() {
        let mut msg = create_test_message();
        msg.clone_count = MAX_CLONES + 1;
        assert!(matches!(
            msg.validate(),
            Err(ProtocolError::CloneCountExceeded { .. })
        ));

        let mut msg = create_test_message();
        msg.path.clear();
        assert_eq!(msg.validate(), Err(ProtocolError::EmptyPath));

        let msg = Message::new(
            NodeId::from("a"),
            NodeId::from("b"),
            vec![0u8; MAX_CONTENT_SIZE + 1],
        );
        assert!(matches!(
            msg.validate(),
            Err(ProtocolError::ContentTooLarge { .. })
        ));
    }

    #[test]
    fn test_tampered_content_fails_integrity() {
        let mut msg = create_test_message();
        assert!(msg.verify_integrity());

        msg.content = b"hellO".to_vec();
        assert!(!msg.verify_integrity());
        assert_eq!(msg.validate(), Err(ProtocolError::IntegrityMismatch));

        // Digest survives the wire
        let msg = create_test_message();
        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert!(decoded.verify_integrity());
    }

    #[test]
    fn test_wire_encoding_preserves_learning() {
        let mut msg = create_test_message().with_priority(Priority::high());
        msg.record_outcome(observation(), true);
        msg.visit(&NodeId::from("RELAY"));

        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, msg);

        assert!(Message::from_bytes(&[1, 2, 3]).is_err());
    }
}
