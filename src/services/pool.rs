//! Shared HTTP connection pool.
//!
//! One pool is created at startup, handed to every HTTP-backed client, and
//! closed at shutdown. Requests made after `close` fail fast.

use crate::error::{Result, VoxbotError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct ConnectionPool {
    client: reqwest::blocking::Client,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Build a pool whose requests time out after `timeout` unless overridden per request.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "HTTP pool created");
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }

    /// Client for issuing a request.
    pub fn client(&self) -> Result<&reqwest::blocking::Client> {
        if self.is_closed() {
            return Err(VoxbotError::PoolClosed);
        }
        Ok(&self.client)
    }

    /// Refuse further requests. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("HTTP pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("closed", &self.is_closed())
            .finish()
    }
}
