//! Session trait — per-client key/value state produced by a provider

use crate::error::Result;
use crate::value::SessionValue;
use async_trait::async_trait;
use std::collections::HashMap;

/// A single client's server-side state
///
/// Handles are owned by their provider and handed out per call; holding
/// one does not keep the session alive past a sweep or destroy. Every
/// `get`/`set`/`delete` refreshes the session's last-access time.
#[async_trait]
pub trait Session: Send + Sync {
    /// Store or overwrite a value
    async fn set(&self, key: &str, value: SessionValue) -> Result<()>;

    /// Fetch a value; `None` means the key was never set or was deleted
    async fn get(&self, key: &str) -> Result<Option<SessionValue>>;

    /// Remove a key; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Immutable token identifying this session
    fn id(&self) -> &str;

    /// Snapshot of every stored entry
    ///
    /// Does not count as an access.
    async fn entries(&self) -> Result<HashMap<String, SessionValue>>;

    /// Last-access time in Unix milliseconds
    async fn last_accessed(&self) -> Result<u64>;
}
