//! # Diffsync Testkit
//!
//! Test utilities for the differential sync engines.
//!
//! This crate provides:
//! - `SyncFixture`: a server engine wired to any number of client engines
//! - `LossyLink`: an in-memory link that drops messages on a script
//! - Property-based test generators using proptest
//! - Tracing initialisation for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use diffsync_testkit::prelude::*;
//!
//! #[test]
//! fn two_clients_converge() {
//!     let mut fixture = SyncFixture::text("doc");
//!     let a = fixture.add_client("Hello".to_string()).unwrap();
//!     let b = fixture.add_client(String::new()).unwrap();
//!     fixture.sync(a, "Hello World".to_string()).unwrap();
//!     fixture.deliver_all().unwrap();
//!     assert!(fixture.is_converged().unwrap());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod network;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::network::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;
pub use network::*;

/// Installs a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
