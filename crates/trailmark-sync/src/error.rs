use crate::protocol::Channel;
use trailmark_model::{PathId, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Incompatible protocol version: peer {found}, local {expected}")]
    Version { found: u16, expected: u16 },

    #[error("message arrived on {arrived} but belongs on {expected}")]
    WrongChannel { arrived: Channel, expected: Channel },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel {0} is not available")]
    ChannelUnavailable(Channel),

    #[error("send failed: {0}")]
    Send(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordingError {
    #[error("already recording")]
    AlreadyRecording,

    #[error("not recording")]
    NotRecording,

    #[error("position unknown")]
    PositionUnknown,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error("unknown path {0}")]
    UnknownPath(PathId),

    #[error("only the owner can change path {0}")]
    NotOwner(PathId),

    #[error("not connected to a server")]
    Offline,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
