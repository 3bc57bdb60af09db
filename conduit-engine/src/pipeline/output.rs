//! Output buffer
//!
//! Collects everything a pipeline process writes to stdout and stderr.
//! Both streams are appended to the same buffer in arrival order.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// The capture mechanism itself broke; the collected bytes cannot be trusted
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CaptureError(pub String);

#[derive(Default)]
struct OutputState {
    bytes: Vec<u8>,
    error: Option<String>,
    sealed: bool,
}

/// Thread-safe, append-only byte buffer
#[derive(Default)]
pub struct OutputBuffer {
    state: Mutex<OutputState>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk unless the buffer has been sealed
    pub fn append(&self, chunk: &[u8]) {
        let mut state = self.state.lock();
        if !state.sealed {
            state.bytes.extend_from_slice(chunk);
        }
    }

    /// Records that capturing failed. The first reason wins.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.error.is_none() {
            state.error = Some(reason.into());
        }
    }

    /// Freezes the buffer once the process is gone
    pub fn seal(&self) {
        self.state.lock().sealed = true;
    }

    /// Copy of everything collected so far
    pub fn snapshot(&self) -> Result<Vec<u8>, CaptureError> {
        let state = self.state.lock();
        match &state.error {
            Some(reason) => Err(CaptureError(reason.clone())),
            None => Ok(state.bytes.clone()),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads `reader` until EOF, appending every chunk to `buffer`
pub async fn capture<R>(mut reader: R, buffer: Arc<OutputBuffer>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.append(&chunk[..n]),
            Err(e) => {
                warn!("Failed to read {} of pipeline process: {}", stream, e);
                buffer.fail(format!("failed to read {}: {}", stream, e));
                break;
            }
        }
    }
}
