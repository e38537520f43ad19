//! In-memory session provider
//!
//! Sessions live in a process-local map and are lost on restart. Suitable
//! for single-process deployments, development, and tests.

use crate::clock::{is_expired, Clock, SystemClock};
use crate::error::{SessionError, Result};
use crate::id::redact;
use crate::provider::{ProviderInfo, SessionProvider};
use crate::session::Session;
use crate::value::SessionValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::RwLock;

/// A session held in process memory
pub struct MemorySession {
    token: String,
    values: StdRwLock<HashMap<String, SessionValue>>,
    last_access: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl MemorySession {
    fn new(token: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            token: token.to_string(),
            values: StdRwLock::new(HashMap::new()),
            last_access: AtomicU64::new(clock.now_millis()),
            clock,
        }
    }

    fn touch(&self) {
        // fetch_max keeps last-access monotonic under concurrent touches
        self.last_access
            .fetch_max(self.clock.now_millis(), Ordering::SeqCst);
    }

    fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn set(&self, key: &str, value: SessionValue) -> Result<()> {
        {
            let mut values = self.values.write().map_err(|e| {
                SessionError::Storage(format!("Session lock poisoned: {}", e))
            })?;
            values.insert(key.to_string(), value);
        }
        self.touch();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SessionValue>> {
        let value = {
            let values = self.values.read().map_err(|e| {
                SessionError::Storage(format!("Session lock poisoned: {}", e))
            })?;
            values.get(key).cloned()
        };
        self.touch();
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        {
            let mut values = self.values.write().map_err(|e| {
                SessionError::Storage(format!("Session lock poisoned: {}", e))
            })?;
            values.remove(key);
        }
        self.touch();
        Ok(())
    }

    fn id(&self) -> &str {
        &self.token
    }

    async fn entries(&self) -> Result<HashMap<String, SessionValue>> {
        let values = self.values.read().map_err(|e| {
            SessionError::Storage(format!("Session lock poisoned: {}", e))
        })?;
        Ok(values.clone())
    }

    async fn last_accessed(&self) -> Result<u64> {
        Ok(self.last_access())
    }
}

/// In-memory session provider
pub struct MemoryProvider {
    /// token → session
    sessions: RwLock<HashMap<String, Arc<MemorySession>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryProvider {
    /// Create a provider stamped by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a provider with a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for MemoryProvider {
    async fn init(&self, token: &str) -> Result<Arc<dyn Session>> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(token) {
            return Err(SessionError::Storage(format!(
                "Session {}… already exists",
                redact(token)
            )));
        }

        let session = Arc::new(MemorySession::new(token, self.clock.clone()));
        sessions.insert(token.to_string(), session.clone());
        tracing::debug!(token = %redact(token), "Memory session created");
        Ok(session)
    }

    async fn read(&self, token: &str) -> Result<Arc<dyn Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(token) {
                session.touch();
                return Ok(session.clone());
            }
        }

        // Another request may have created it between the two locks
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(token.to_string())
            .or_insert_with(|| {
                tracing::debug!(token = %redact(token), "Memory session created on read");
                Arc::new(MemorySession::new(token, self.clock.clone()))
            })
            .clone();
        session.touch();
        Ok(session)
    }

    async fn exists(&self, token: &str) -> Result<bool> {
        let sessions = self.sessions.read().await;
        Ok(sessions.contains_key(token))
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(token);
        Ok(())
    }

    async fn sweep(&self, max_idle: Duration) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !is_expired(session.last_access(), now, max_idle));
        Ok(before - sessions.len())
    }

    async fn info(&self) -> Result<ProviderInfo> {
        let sessions = self.sessions.read().await;
        Ok(ProviderInfo {
            provider: "memory".to_string(),
            sessions: sessions.len(),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
