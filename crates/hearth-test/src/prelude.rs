//! Prelude module - commonly used test helpers.
//!
//! Use `use hearth_test::prelude::*;` in test modules.

pub use crate::capture::CapturedLogs;
pub use crate::harness::{setup_test_logging, setup_test_logging_default, test_dir, test_file};
pub use crate::wait::{DEFAULT_WAIT, eventually, eventually_async};
