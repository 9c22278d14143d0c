//! Trailmark Sync: recording, ownership and the client/server protocol
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────── client ─────────────────────────────┐
//! │                                                                   │
//! │  RecordingSession ──► PathStore ◄── Reconciler ◄── FullSync       │
//! │   (decimate)           │  Origin: Local / ServerOwned / Shared    │
//! │                        │  visibility set                          │
//! │                        ▼                                          │
//! │                   PathStorage (dirty set, autosave)               │
//! │                                                                   │
//! │  rename / recolor / delete / share ──► ConnectionContext          │
//! └────────────────────────────────────────────┬──────────────────────┘
//!                         trailmark:actions    │ ▲  trailmark:sync
//!                         trailmark:ack        ▼ │  (CBOR, versioned)
//! ┌───────────────────────────── server ─────────────────────────────┐
//! │  PathServer: authorization, per-client seq + retransmit queue     │
//! │  ServerRecorder: DashMap<ActorId, RecordingSession>, tick loop    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! - Local paths belong to the client; the server never overwrites them
//! - Server paths on the client are shadows, replaced by every full sync
//! - Action results are numbered per connection; a replayed result is
//!   recognised by its sequence number and ignored

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod reconcile;
pub mod recording;
pub mod render;
pub mod server;
pub mod store;
pub mod transport;

pub use client::{Inbound, MutationOutcome, PathClient};
pub use config::{DisplayMode, OverflowPolicy, RecordingConfig, TrailConfig};
pub use error::{ClientError, ConfigError, ProtocolError, RecordingError, TransportError};
pub use protocol::{
    ActionKind, ActionRequest, ActionResult, Channel, ClientMessage, ServerMessage,
    PROTOCOL_VERSION,
};
pub use reconcile::{ReconcileReport, Reconciler};
pub use recording::{
    ActorPosition, CaptureAuthority, DiscardReason, RecordingSession, SampleOutcome,
    ServerRecorder, StopOutcome,
};
pub use render::{RenderPath, RenderView};
pub use server::{Outbound, PathServer};
pub use store::{Origin, PathStore};
pub use transport::{ConnectionContext, Transport};
