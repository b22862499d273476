//! # Diffsync Engine
//!
//! Client and server engines for differential synchronization.
//!
//! This crate provides:
//! - `ClientSyncEngine`: turns local edits into patch messages and applies
//!   patch messages from the server
//! - `ServerSyncEngine`: keeps one shadow per subscribed client against a
//!   single authoritative document and fans changes out to subscribers
//! - The `DataStore` contracts and in-memory reference stores
//! - Subscriber and listener hooks, configuration and statistics
//!
//! ## Protocol
//!
//! Each (document, client) pair has a shadow, a backup of the shadow and a
//! queue of unacknowledged edits on both sides. Every outbound message
//! carries the whole queue, so a dropped message is retried by the next one.
//! Inbound edits are classified against the shadow:
//!
//! | Inbound edit | Action |
//! |---|---|
//! | behind on our own axis | the peer missed our edits: restore the backup |
//! | behind on the peer's axis | already applied: discard |
//! | matches both versions, or is a seed | apply to the shadow |
//! | ahead | leave for a later message |
//!
//! ## Key Invariants
//!
//! - Edits in a message are applied in order
//! - Shadow versions never decrease, except a seed resetting the client version
//! - The backup is the shadow as of the last applied remote edit
//! - Calls for one (document, client) pair are serialized; different pairs never contend

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod classify;
mod client;
mod config;
mod error;
mod locks;
mod memory;
mod notify;
mod server;
mod stats;
mod store;

pub use client::ClientSyncEngine;
pub use config::{ChecksumPolicy, DocumentUpdate, EngineConfig};
pub use error::{SyncError, SyncResult};
pub use memory::{MemoryClientStore, MemoryServerStore};
pub use notify::{ChannelListener, ChannelSubscriber, PatchListener, Subscriber};
pub use server::ServerSyncEngine;
pub use stats::SyncStats;
pub use store::{ClientDataStore, DataStore, ServerDataStore};
