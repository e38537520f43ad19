//! Session provider trait — the core abstraction for storage backends
//!
//! All session backends (in-memory, filesystem, database, etc.) implement
//! `SessionProvider` so the `SessionManager` can create, resolve, and
//! expire sessions without knowing where they live.

use crate::error::Result;
use crate::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod file;
pub mod memory;

/// Core trait for session storage backends
///
/// Implementations must be safe to call concurrently from many in-flight
/// requests; storage-level locking, persistence, and I/O failures are the
/// provider's responsibility.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Create a brand-new empty session under `token`
    ///
    /// Fails if a live session already uses the token.
    async fn init(&self, token: &str) -> Result<Arc<dyn Session>>;

    /// Return the session under `token`, creating an empty one if absent
    async fn read(&self, token: &str) -> Result<Arc<dyn Session>>;

    /// Whether a live session exists under `token`
    async fn exists(&self, token: &str) -> Result<bool>;

    /// Remove the session; no-op if it is already gone
    async fn destroy(&self, token: &str) -> Result<()>;

    /// Remove every session idle longer than `max_idle`, returning how many
    async fn sweep(&self, max_idle: Duration) -> Result<usize>;

    /// Get provider info (live session count, etc.)
    async fn info(&self) -> Result<ProviderInfo>;

    /// Provider name (e.g., "memory", "file")
    fn name(&self) -> &str;

    /// Health check — returns true if the backend is operational
    ///
    /// Default implementation delegates to `info()` and returns true if it succeeds.
    async fn health(&self) -> Result<bool> {
        self.info().await.map(|_| true)
    }
}

/// Provider status information
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    /// Provider name
    pub provider: String,
    /// Number of live sessions
    pub sessions: usize,
}
