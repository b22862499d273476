//! # Diffsync Server
//!
//! Request handling for a differential sync server.
//!
//! This crate provides:
//! - `RequestHandler`: parses inbound wire messages and drives a
//!   `ServerSyncEngine`
//! - `ServerConfig`: request limits
//! - `ServerError`: errors classified as client or server faults
//!
//! It opens no sockets. A transport hands each inbound JSON message to
//! [`RequestHandler::handle_message`] and forwards the patch messages that
//! arrive on a client's outbound channel back to that client.
//!
//! # Messages
//!
//! | `msgType` | Effect | Response |
//! |---|---|---|
//! | `add` | subscribe the client, creating the document if new | seed message and outbound channel |
//! | `add` without content, unknown document | nothing | empty patch message |
//! | `patch` | reconcile the edits, then push to every subscriber | number of subscribers notified |
//! | `detach` | unsubscribe the client | whether it was subscribed |

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, HandlerResponse, RequestHandler};
