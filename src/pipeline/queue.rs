//! Bounded queue of synthesized audio awaiting playback.

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::time::Duration;

/// Bounded FIFO of PCM chunks between the response stage and playback.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct AudioOutputQueue {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl AudioOutputQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Push one chunk, waiting up to `timeout` for space.
    ///
    /// Hands the chunk back if the queue stayed full for the whole timeout.
    pub fn push(&self, chunk: Vec<u8>, timeout: Duration) -> Result<(), Vec<u8>> {
        match self.tx.send_timeout(chunk, timeout) {
            Ok(()) => Ok(()),
            // Both ends live in `self`, so the channel cannot disconnect.
            Err(SendTimeoutError::Timeout(chunk)) | Err(SendTimeoutError::Disconnected(chunk)) => {
                Err(chunk)
            }
        }
    }

    /// Pop the oldest chunk, waiting up to `timeout`.
    pub fn pop(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard everything queued. Returns the number of chunks dropped.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }
}
