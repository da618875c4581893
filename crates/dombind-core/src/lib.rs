//! dombind Core Library
//!
//! This crate provides the client side of dombind, which keeps a locally
//! held UI tree in step with a remote server over a WebSocket.
//!
//! # Architecture
//!
//! - **Server**: Owns the UI state and pushes change messages
//! - **Client**: Patches its document and reports interactions back
//!
//! Elements are addressed by their `ref` attribute. Every outbound message
//! carries the session id taken from the root element.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let handle = spawn_connection(config.connection_config());
//!
//! let document = Document::parse(&page);
//! let mut engine = SyncEngine::new(document, handle.sender.clone());
//! engine.run(handle.event_rx, input_rx).await;
//! ```
//!
//! # Modules
//!
//! - `engine`: Sync engine composing everything below (main entry point)
//! - `connection`: WebSocket connection with automatic reconnect
//! - `message`: Inbound change and outbound event messages
//! - `dom`: Arena-backed document tree
//! - `resolver`: Reference lookup
//! - `patcher`: Applies changes to the document
//! - `capture`: Per-node interaction bindings
//! - `effects`: Named effects fired by `trigger` changes
//! - `config`: Application configuration

pub mod capture;
pub mod config;
pub mod connection;
pub mod dom;
pub mod effects;
pub mod engine;
pub mod error;
pub mod message;
pub mod patcher;
pub mod resolver;

pub use capture::{Capture, Dispatch, InteractionKind, NodeBinding};
pub use config::Config;
pub use connection::{
    spawn_connection, ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionSender,
    ConnectionStatus,
};
pub use dom::{Document, Element, NodeData, NodeId};
pub use effects::{EffectRegistry, FiredEffect};
pub use engine::{EngineInput, Interaction, Outbox, SyncEngine};
pub use error::{MessageError, PatchError, ResolveError};
pub use message::{ChangeMessage, Effect, EventKind, EventMessage, Update};
pub use patcher::PatchOutcome;
pub use resolver::{resolve, resolve_within};
