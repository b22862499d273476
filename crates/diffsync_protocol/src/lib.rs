//! # Diffsync Protocol
//!
//! Protocol types and synchronizer contracts for differential synchronization.
//!
//! This crate provides:
//! - `Document`, `ClientDocument`, `ShadowDocument` and `BackupShadowDocument`
//! - `Edit` and the `PatchMessage` wire envelope
//! - `SyncMessage`, the tagged `add` / `patch` / `detach` envelope
//! - The `DiffPatch` primitive contract and the `ClientSynchronizer` /
//!   `ServerSynchronizer` contracts built on top of it
//!
//! This is a pure protocol crate with no I/O operations. Messages are JSON
//! on the wire:
//!
//! ```json
//! { "msgType": "patch", "id": "doc-1", "clientId": "client-a",
//!   "edits": [ { "id": "doc-1", "clientId": "client-a",
//!                "clientVersion": 0, "serverVersion": 0,
//!                "checksum": "…", "diffs": [] } ] }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod edit;
mod error;
mod messages;
mod synchronizer;

pub use document::{BackupShadowDocument, ClientDocument, Document, ShadowDocument, SyncKey};
pub use edit::{Edit, SEED_VERSION};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{AddMessage, DetachMessage, MessageType, PatchMessage, SyncMessage};
pub use synchronizer::{ClientSynchronizer, DiffPatch, DiffSynchronizer, ServerSynchronizer};
