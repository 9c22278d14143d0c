//! Transport seam and per-connection state.
//!
//! The byte transport belongs to the host (game networking, websockets,
//! tests). This crate only needs to probe a channel and push bytes into it.

use crate::error::TransportError;
use crate::protocol::{encode, Channel, ClientMessage};
use trailmark_model::ActorId;

/// Outbound half of a connection to the server.
pub trait Transport {
    /// Whether the peer currently accepts messages on `channel`.
    fn can_send(&self, channel: Channel) -> bool;

    fn send(&self, channel: Channel, bytes: Vec<u8>) -> Result<(), TransportError>;
}

/// Everything that lives exactly as long as one server connection.
///
/// Installed on connect and dropped on disconnect, so sequence tracking
/// starts fresh with every connection, matching the server which also
/// forgets a client's sequence state when it disconnects.
pub struct ConnectionContext {
    actor: ActorId,
    transport: Box<dyn Transport>,
    last_applied_seq: u64,
}

impl ConnectionContext {
    pub fn new(actor: ActorId, transport: Box<dyn Transport>) -> Self {
        Self {
            actor,
            transport,
            last_applied_seq: 0,
        }
    }

    /// The identity this connection was authenticated as.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn can_send(&self, channel: Channel) -> bool {
        self.transport.can_send(channel)
    }

    pub fn send(&self, message: &ClientMessage) -> Result<(), TransportError> {
        let channel = message.channel();
        if !self.transport.can_send(channel) {
            return Err(TransportError::ChannelUnavailable(channel));
        }
        let bytes = encode(message)?;
        self.transport.send(channel, bytes)
    }

    pub fn last_applied_seq(&self) -> u64 {
        self.last_applied_seq
    }

    /// Record `seq` as applied. Returns false for anything at or below the
    /// last applied sequence, which the caller must treat as a duplicate.
    pub fn advance_seq(&mut self, seq: u64) -> bool {
        if seq <= self.last_applied_seq {
            return false;
        }
        self.last_applied_seq = seq;
        true
    }
}
