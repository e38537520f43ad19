//! Session manager — resolves sessions from transport-carried tokens
//!
//! `SessionManager` owns the configuration and the resolved provider. Each
//! request calls `start` (and possibly `destroy` or `regenerate`) with its
//! `TransportContext`; a background sweeper calls `run_sweep`.
//!
//! Operations on the same token are serialized through striped locks, so
//! unrelated clients proceed in parallel. A sweep takes the sweep guard
//! exclusively and therefore never interleaves with a create or destroy.

use crate::config::ManagerConfig;
use crate::error::Result;
use crate::id::{is_well_formed, redact, IdGenerator};
use crate::provider::SessionProvider;
use crate::registry::ProviderRegistry;
use crate::session::Session;
use crate::value::SessionValue;
use crate::sweeper::SweeperHandle;
use crate::transport::{append_token, removal_cookie, session_cookie, TransportContext};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

const LOCK_STRIPES: usize = 64;

/// Orchestrates session creation, lookup, destruction, and expiry
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    config: ManagerConfig,
    ids: IdGenerator,

    /// Per-token locks, selected by hashing the token
    token_locks: Vec<Mutex<()>>,
    hasher: RandomState,

    /// Shared by start/destroy, exclusive for sweeps
    sweep_guard: RwLock<()>,
}

impl SessionManager {
    /// Create a manager for the provider named in `config`
    ///
    /// Fails with `NotFound` if the provider is not registered.
    pub fn new(registry: &ProviderRegistry, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let provider = registry.lookup(&config.provider)?;
        Ok(Self::build(provider, config))
    }

    /// Create a manager around an already resolved provider
    pub fn with_provider(provider: Arc<dyn SessionProvider>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(provider, config))
    }

    fn build(provider: Arc<dyn SessionProvider>, config: ManagerConfig) -> Self {
        tracing::info!(
            provider = %config.provider,
            backend = provider.name(),
            cookie = %config.cookie_name,
            max_lifetime_secs = config.max_lifetime_secs,
            "Session manager created"
        );

        Self {
            provider,
            config,
            ids: IdGenerator::new(),
            token_locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
            sweep_guard: RwLock::new(()),
        }
    }

    /// Replace the token generator
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Get a reference to the underlying provider
    pub fn provider(&self) -> &dyn SessionProvider {
        self.provider.as_ref()
    }

    fn lock_for(&self, token: &str) -> &Mutex<()> {
        let idx = self.hasher.hash_one(token) as usize % self.token_locks.len();
        &self.token_locks[idx]
    }

    /// Well-formed token carried by the request, if any
    fn extract_token(&self, ctx: &TransportContext) -> Option<String> {
        let token = ctx.token(&self.config.cookie_name, self.config.accept_url_token)?;
        if !is_well_formed(token) {
            tracing::debug!(token = %redact(token), "Ignoring malformed session token");
            return None;
        }
        Some(token.to_string())
    }

    /// Resolve the request's session, creating one on first contact
    ///
    /// A missing or malformed token yields a fresh session whose token is
    /// staged as a cookie on `ctx`. A well-formed token is read from the
    /// provider; if it names no live session it is adopted as a new empty
    /// session, or replaced when `strict_tokens` is set.
    pub async fn start(&self, ctx: &mut TransportContext) -> Result<Arc<dyn Session>> {
        let _sweep = self.sweep_guard.read().await;

        if let Some(token) = self.extract_token(ctx) {
            let _lock = self.lock_for(&token).lock().await;

            if self.provider.exists(&token).await? {
                tracing::debug!(token = %redact(&token), "Session resumed");
                return self.provider.read(&token).await;
            }

            if !self.config.strict_tokens {
                tracing::warn!(
                    token = %redact(&token),
                    "Unknown session token adopted as a new empty session"
                );
                return self.provider.read(&token).await;
            }

            tracing::warn!(
                token = %redact(&token),
                "Unknown session token rejected, issuing a new one"
            );
        }

        self.create(ctx).await
    }

    /// Create a session under a new token and stage its cookie
    async fn create(&self, ctx: &mut TransportContext) -> Result<Arc<dyn Session>> {
        let session = self.init_fresh().await?;
        ctx.stage(session_cookie(&self.config, session.id()));
        tracing::debug!(token = %redact(session.id()), "Session created");
        Ok(session)
    }

    /// Initialize a session under a newly generated token
    async fn init_fresh(&self) -> Result<Arc<dyn Session>> {
        let token = self.ids.generate()?;
        let _lock = self.lock_for(&token).lock().await;
        let session = self.provider.init(&token).await?;
        Ok(session)
    }

    /// Destroy the request's session and expire the client cookie
    ///
    /// No-op when the request carries no token.
    pub async fn destroy(&self, ctx: &mut TransportContext) -> Result<()> {
        let Some(token) = self.extract_token(ctx) else {
            return Ok(());
        };

        let _sweep = self.sweep_guard.read().await;
        {
            let _lock = self.lock_for(&token).lock().await;
            self.provider.destroy(&token).await?;
        }

        ctx.stage(removal_cookie(&self.config));
        tracing::info!(token = %redact(&token), "Session destroyed");
        Ok(())
    }

    /// Move the request's session data to a new token
    ///
    /// The old token is destroyed. Use after privilege changes such as
    /// login so a token planted before authentication becomes worthless.
    ///
    /// If copying fails the new session is discarded, nothing is staged, and
    /// the old session is left untouched.
    pub async fn regenerate(&self, ctx: &mut TransportContext) -> Result<Arc<dyn Session>> {
        let _sweep = self.sweep_guard.read().await;

        let old = self.extract_token(ctx);
        let entries = match &old {
            Some(token) => {
                let _lock = self.lock_for(token).lock().await;
                if self.provider.exists(token).await? {
                    self.provider.read(token).await?.entries().await?
                } else {
                    Default::default()
                }
            }
            None => Default::default(),
        };

        let session = self.init_fresh().await?;
        if let Err(e) = copy_entries(session.as_ref(), entries).await {
            let _lock = self.lock_for(session.id()).lock().await;
            if let Err(cleanup) = self.provider.destroy(session.id()).await {
                tracing::warn!(
                    token = %redact(session.id()),
                    error = %cleanup,
                    "Failed to discard partially regenerated session"
                );
            }
            return Err(e);
        }
        ctx.stage(session_cookie(&self.config, session.id()));

        if let Some(token) = old {
            let _lock = self.lock_for(&token).lock().await;
            self.provider.destroy(&token).await?;
            tracing::info!(
                old = %redact(&token),
                new = %redact(session.id()),
                "Session token regenerated"
            );
        }

        Ok(session)
    }

    /// Remove every session idle longer than the configured lifetime
    pub async fn run_sweep(&self) -> Result<usize> {
        let _sweep = self.sweep_guard.write().await;
        let removed = self.provider.sweep(self.config.max_lifetime()).await?;
        if removed > 0 {
            tracing::info!(removed, provider = self.provider.name(), "Expired sessions swept");
        } else {
            tracing::debug!(provider = self.provider.name(), "Sweep found no expired sessions");
        }
        Ok(removed)
    }

    /// Start the periodic sweep at the configured interval
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        self.spawn_sweeper_every(self.config.gc_interval())
    }

    /// Start the periodic sweep at a custom interval
    pub fn spawn_sweeper_every(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        SweeperHandle::spawn(self.clone(), interval)
    }

    /// Number of live sessions in the provider
    pub async fn session_count(&self) -> Result<usize> {
        Ok(self.provider.info().await?.sessions)
    }

    /// Add the session token to a link for the URL-rewrite transport
    pub fn rewrite_url(&self, url: &str, session: &dyn Session) -> String {
        append_token(url, &self.config.cookie_name, session.id())
    }
}

async fn copy_entries(session: &dyn Session, entries: HashMap<String, SessionValue>) -> Result<()> {
    for (key, value) in entries {
        session.set(&key, value).await?;
    }
    Ok(())
}
