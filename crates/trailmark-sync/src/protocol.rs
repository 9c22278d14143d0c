//! Wire protocol: messages exchanged between client and server
//!
//! ```text
//!  client                                      server
//!    │── Action(Rename/Recolor/...) ─ actions ──►│
//!    │◄── Result { seq, ack_seq, .. } ─ actions ─│   seq: per-client, increasing
//!    │── Ack { seq } ───────────────── ack ─────►│   drops retransmits <= seq
//!    │── RequestSync ───────────────── sync ────►│
//!    │◄── FullSync { paths } / Shared ─ sync ────│
//! ```
//!
//! Messages are CBOR-encoded inside a versioned envelope. Anything that fails
//! to decode, carries another version, or arrives on the wrong channel is
//! rejected as a whole.

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use trailmark_model::{ActorId, Path, PathId};

/// Protocol version
pub const PROTOCOL_VERSION: u16 = 1;

// ============================================================================
// Channels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Actions,
    Sync,
    Ack,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Actions, Channel::Sync, Channel::Ack];

    /// Stable name used to register the channel with the transport.
    pub const fn name(&self) -> &'static str {
        match self {
            Channel::Actions => "trailmark:actions",
            Channel::Sync => "trailmark:sync",
            Channel::Ack => "trailmark:ack",
        }
    }

    pub fn from_name(name: &str) -> Option<Channel> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Rename,
    Recolor,
    Delete,
    Share,
    StartRecording,
    StopRecording,
}

/// A mutation the client asks the server to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionRequest {
    Rename { path_id: PathId, name: String },
    Recolor { path_id: PathId, color: u32 },
    Delete { path_id: PathId },
    /// `upload` carries the path when the server has not seen it yet
    Share {
        path_id: PathId,
        target: ActorId,
        upload: Option<Path>,
    },
    StartRecording { name: Option<String> },
    StopRecording { save: bool },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Rename { .. } => ActionKind::Rename,
            ActionRequest::Recolor { .. } => ActionKind::Recolor,
            ActionRequest::Delete { .. } => ActionKind::Delete,
            ActionRequest::Share { .. } => ActionKind::Share,
            ActionRequest::StartRecording { .. } => ActionKind::StartRecording,
            ActionRequest::StopRecording { .. } => ActionKind::StopRecording,
        }
    }

    pub fn path_id(&self) -> Option<PathId> {
        match self {
            ActionRequest::Rename { path_id, .. }
            | ActionRequest::Recolor { path_id, .. }
            | ActionRequest::Delete { path_id }
            | ActionRequest::Share { path_id, .. } => Some(*path_id),
            ActionRequest::StartRecording { .. } | ActionRequest::StopRecording { .. } => None,
        }
    }
}

/// The server's answer to an [`ActionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: ActionKind,
    pub path_id: Option<PathId>,
    pub success: bool,
    pub message: String,
    /// Authoritative state of the path after the action, when it still exists
    pub path: Option<Path>,
    /// Assigned by the server, strictly increasing per client connection
    pub seq: u64,
    /// Highest seq the server has seen acknowledged by this client
    pub ack_seq: Option<u64>,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    Action(ActionRequest),
    Ack { seq: u64 },
    RequestSync,
}

impl ClientMessage {
    pub fn channel(&self) -> Channel {
        match self {
            ClientMessage::Action(_) => Channel::Actions,
            ClientMessage::Ack { .. } => Channel::Ack,
            ClientMessage::RequestSync => Channel::Sync,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    Result(ActionResult),
    /// Every path the client owns or has been shared
    FullSync { paths: Vec<Path> },
    /// A single path someone just shared with the client
    Shared { path: Path },
}

impl ServerMessage {
    pub fn channel(&self) -> Channel {
        match self {
            ServerMessage::Result(_) => Channel::Actions,
            ServerMessage::FullSync { .. } | ServerMessage::Shared { .. } => Channel::Sync,
        }
    }
}

/// Anything with a home channel can travel over the wire.
pub trait ChannelMessage: Serialize + DeserializeOwned {
    fn channel(&self) -> Channel;
}

impl ChannelMessage for ClientMessage {
    fn channel(&self) -> Channel {
        ClientMessage::channel(self)
    }
}

impl ChannelMessage for ServerMessage {
    fn channel(&self) -> Channel {
        ServerMessage::channel(self)
    }
}

// ============================================================================
// Codec
// ============================================================================

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u16,
    body: T,
}

pub fn encode<T: ChannelMessage>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let envelope = Envelope {
        version: PROTOCOL_VERSION,
        body: message,
    };
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&envelope, &mut bytes)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decode a message received on `channel`.
pub fn decode<T: ChannelMessage>(channel: Channel, bytes: &[u8]) -> Result<T, ProtocolError> {
    #[derive(Deserialize)]
    struct Header {
        version: u16,
    }

    // Check the version before committing to the body layout.
    let header: Header =
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    if header.version != PROTOCOL_VERSION {
        return Err(ProtocolError::Version {
            found: header.version,
            expected: PROTOCOL_VERSION,
        });
    }

    let envelope: Envelope<T> =
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    let expected = envelope.body.channel();
    if expected != channel {
        return Err(ProtocolError::WrongChannel {
            arrived: channel,
            expected,
        });
    }
    Ok(envelope.body)
}
