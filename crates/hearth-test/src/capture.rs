//! In-memory log capture for asserting on emitted records.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Collects formatted `tracing` output in a shared buffer.
///
/// [`CapturedLogs::install`] makes a capturing subscriber the default for the
/// current thread until the returned guard is dropped. Under a
/// current-thread Tokio runtime this also covers spawned tasks, and tasks
/// that carry their dispatcher along via `WithSubscriber`.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

/// Writer handed out by [`CapturedLogs`].
#[derive(Debug)]
pub struct CapturedWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

fn lock(buffer: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.buffer).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl CapturedLogs {
    /// Create an empty capture buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture everything down to `trace` on the current thread.
    #[must_use]
    pub fn install(&self) -> DefaultGuard {
        self.install_with("trace")
    }

    /// Capture records matching `filter` on the current thread.
    #[must_use]
    pub fn install_with(&self, filter: &str) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_writer(self.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Everything captured so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buffer)).into_owned()
    }

    /// Whether any captured output contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    /// Captured lines containing `needle`.
    #[must_use]
    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_owned)
            .collect()
    }

    /// Number of captured lines containing `needle`.
    #[must_use]
    pub fn count(&self, needle: &str) -> usize {
        self.lines_containing(needle).len()
    }

    /// Drop everything captured so far.
    pub fn clear(&self) {
        lock(&self.buffer).clear();
    }
}
