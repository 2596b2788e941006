//! Core protocol types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Identifier of a node in the WanderMesh network
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a NodeId from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

/// Message priority. Higher values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(u8);

impl Priority {
    /// Create priority from u8 (any value is valid)
    pub fn from_u8(value: u8) -> Self {
        Priority(value)
    }

    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn background() -> Self {
        Priority(0)
    }

    /// Default priority for user messages
    pub fn low() -> Self {
        Priority(1)
    }

    pub fn normal() -> Self {
        Priority(3)
    }

    pub fn high() -> Self {
        Priority(5)
    }

    pub fn emergency() -> Self {
        Priority(9)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::low()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport categories a node can probe and transmit over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Short-range wireless LAN
    Wifi,
    /// Short-range personal area radio
    Bluetooth,
    /// Long-range low-power radio
    LoRa,
    /// Acoustic modem
    Acoustic,
    /// Optical / visible light link
    Light,
    /// Wired or overlay mesh backbone
    Mesh,
    /// Cellular data
    Cellular,
    /// Long-range packet radio
    Radio,
}

impl TransportKind {
    /// Every transport kind, in probe order
    pub const ALL: [TransportKind; 8] = [
        TransportKind::Wifi,
        TransportKind::Bluetooth,
        TransportKind::LoRa,
        TransportKind::Acoustic,
        TransportKind::Light,
        TransportKind::Mesh,
        TransportKind::Cellular,
        TransportKind::Radio,
    ];

    /// Wire name of this transport kind
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Wifi => "wifi",
            TransportKind::Bluetooth => "bluetooth",
            TransportKind::LoRa => "lora",
            TransportKind::Acoustic => "acoustic",
            TransportKind::Light => "light",
            TransportKind::Mesh => "mesh",
            TransportKind::Cellular => "cellular",
            TransportKind::Radio => "radio",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransportKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransportKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProtocolError::UnknownTransport(s.to_string()))
    }
}
