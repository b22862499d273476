//! # Diffsync Synchronizers
//!
//! Concrete diff/patch primitives for the differential sync engines.
//!
//! | Primitive | Content | Diff |
//! |---|---|---|
//! | [`TextPatcher`] | `String` | [`TextDiffs`], runs of `ADD` / `DELETE` / `UNCHANGED` text |
//! | [`JsonPatcher`] | `serde_json::Value` | RFC 6902 JSON Patch |
//! | [`JsonMergePatcher`] | `serde_json::Value` | RFC 7386 JSON Merge Patch document |
//!
//! Each primitive is wrapped by [`DiffSynchronizer`](diffsync_protocol::DiffSynchronizer),
//! which implements both the client and server synchronizer contracts. The
//! aliases below name the common combinations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod checksum;
mod json_diff;
mod merge_patch;
mod text;

pub use checksum::{checksum_json, checksum_text};
pub use json_diff::JsonPatcher;
pub use merge_patch::JsonMergePatcher;
pub use text::{TextDiff, TextDiffs, TextOperation, TextPatcher};

use diffsync_protocol::DiffSynchronizer;

/// Plain text synchronizer.
pub type TextSynchronizer = DiffSynchronizer<TextPatcher>;

/// JSON synchronizer exchanging RFC 6902 patches.
pub type JsonPatchSynchronizer = DiffSynchronizer<JsonPatcher>;

/// JSON synchronizer exchanging RFC 7386 merge patches.
pub type JsonMergePatchSynchronizer = DiffSynchronizer<JsonMergePatcher>;
