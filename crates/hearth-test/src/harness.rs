//! Test harness helpers.

use std::io::Write;
use tempfile::{NamedTempFile, TempDir};
use tracing_subscriber::EnvFilter;

/// Create a temporary directory, removed when the returned `TempDir` drops.
///
/// # Panics
///
/// Panics if the directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Create a temporary file with the given content and extension
/// (e.g. `"toml"`), removed when the returned handle drops.
///
/// # Panics
///
/// Panics if the file cannot be created or written.
#[must_use]
pub fn test_file(content: &str, extension: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{extension}"))
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");
    file.flush().expect("Failed to flush temp file");
    file
}

/// Install a global test subscriber with the given filter.
///
/// Later calls are no-ops, so every test may call this.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Install a global test subscriber at `warn`.
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}
