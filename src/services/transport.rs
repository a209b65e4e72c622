//! Media transport carrying caller audio in and bot audio out.

use crate::error::{Result, VoxbotError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Trait for a bidirectional real-time audio connection.
pub trait MediaTransport: Send + Sync {
    fn connect(&self) -> Result<()>;

    /// Wait up to `timeout` for the next inbound frame.
    ///
    /// `Ok(None)` means nothing arrived in time. A [`VoxbotError::Closed`]
    /// error means the caller hung up.
    fn next_frame(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Send bot audio to the caller.
    fn send_frame(&self, pcm: &[u8]) -> Result<()>;

    fn disconnect(&self) -> Result<()>;
}

impl<T: MediaTransport> MediaTransport for Arc<T> {
    fn connect(&self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        (**self).next_frame(timeout)
    }

    fn send_frame(&self, pcm: &[u8]) -> Result<()> {
        (**self).send_frame(pcm)
    }

    fn disconnect(&self) -> Result<()> {
        (**self).disconnect()
    }
}

/// Mock transport for testing
///
/// Inbound frames come from a queue fed by the test, optionally released
/// after a given number of outbound frames have been sent. Outbound frames
/// are recorded.
pub struct MockTransport {
    inbound_tx: Sender<Vec<u8>>,
    inbound_rx: Receiver<Vec<u8>>,
    after_outbound: Mutex<VecDeque<(usize, Vec<Vec<u8>>)>>,
    sent: Mutex<Vec<Vec<u8>>>,
    send_delay: Duration,
    connected: AtomicBool,
    hung_up: AtomicBool,
    close_when_drained: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        Self {
            inbound_tx,
            inbound_rx,
            after_outbound: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            send_delay: Duration::ZERO,
            connected: AtomicBool::new(false),
            hung_up: AtomicBool::new(false),
            close_when_drained: false,
        }
    }

    /// Queue inbound frames available immediately.
    pub fn with_inbound(self, frames: impl IntoIterator<Item = Vec<u8>>) -> Self {
        for frame in frames {
            self.push_inbound(frame);
        }
        self
    }

    /// Release `frames` inbound once `sent` outbound frames have gone out.
    pub fn with_inbound_after_outbound(
        self,
        sent: usize,
        frames: impl IntoIterator<Item = Vec<u8>>,
    ) -> Self {
        self.after_outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((sent, frames.into_iter().collect()));
        self
    }

    /// Sleep in every `send_frame`, pacing playback like a real connection.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Report the caller as gone once the inbound queue is empty.
    pub fn closing_when_drained(mut self) -> Self {
        self.close_when_drained = true;
        self
    }

    pub fn push_inbound(&self, frame: Vec<u8>) {
        // Receiver lives in self; send cannot fail.
        self.inbound_tx.send(frame).ok();
    }

    /// Simulate the caller hanging up.
    pub fn hang_up(&self) {
        self.hung_up.store(true, Ordering::SeqCst);
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTransport for MockTransport {
    fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn next_frame(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let closed = || VoxbotError::Closed {
            source_name: "media transport".to_string(),
        };
        if self.hung_up.load(Ordering::SeqCst) {
            return Err(closed());
        }
        if self.close_when_drained && self.inbound_rx.is_empty() {
            return Err(closed());
        }
        match self.inbound_rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn send_frame(&self, pcm: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(VoxbotError::Transport {
                message: "not connected".to_string(),
            });
        }
        if !self.send_delay.is_zero() {
            std::thread::sleep(self.send_delay);
        }
        let sent = {
            let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
            sent.push(pcm.to_vec());
            sent.len()
        };
        let mut pending = self
            .after_outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while pending.front().is_some_and(|(after, _)| *after <= sent) {
            if let Some((_, frames)) = pending.pop_front() {
                for frame in frames {
                    self.push_inbound(frame);
                }
            }
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
