//! Hearth Test - Shared test utilities for the Hearth event bus.
//!
//! This crate is meant to be used as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! hearth-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use hearth_test::{CapturedLogs, eventually, DEFAULT_WAIT};
//!
//! #[tokio::test]
//! async fn fault_is_logged() {
//!     let logs = CapturedLogs::new();
//!     let _guard = logs.install();
//!     // ... raise an event whose async handler fails
//!     assert!(eventually(DEFAULT_WAIT, || logs.contains("handler failed")).await);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod capture;
pub mod harness;
pub mod wait;

pub use capture::*;
pub use harness::*;
pub use wait::*;
