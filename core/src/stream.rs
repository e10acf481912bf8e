//! Streaming relay contract.
//!
//! The network surface that actually owns the WebSocket connection lives
//! outside this crate; the response pipeline only knows how to hand packets
//! to a [`StreamSink`].

use serde::{Deserialize, Serialize};

/// One fragment of a streamed answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPacket {
    pub text: String,
    pub is_terminal: bool,
    pub marker: String,
}

impl StreamPacket {
    pub fn fragment(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_terminal: false,
            marker: String::new(),
        }
    }

    pub fn terminal(text: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_terminal: true,
            marker: marker.into(),
        }
    }
}

/// Receives streamed packets; must not block.
pub trait StreamSink: Send + Sync {
    fn send(&self, packet: StreamPacket);
}

/// Drops every packet. The default when no streaming surface is attached.
pub struct NullSink;

impl StreamSink for NullSink {
    fn send(&self, _packet: StreamPacket) {}
}

/// Forwards packets into a channel; used by tests and embedders that relay
/// to their own transport.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<StreamPacket>,
}

impl ChannelSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<StreamPacket>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StreamSink for ChannelSink {
    fn send(&self, packet: StreamPacket) {
        let _ = self.tx.send(packet);
    }
}
