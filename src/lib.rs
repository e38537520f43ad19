//! # a3s-session
//!
//! Pluggable server-side session management for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-session` correlates otherwise-stateless requests from one client to
//! a single server-side key/value bag, using an unguessable token carried in
//! a cookie or URL parameter. Swap storage backends (in-memory, filesystem,
//! database, etc.) without changing application code.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_session::{ManagerConfig, MemoryProvider, ProviderRegistry, SessionManager, TransportContext};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> a3s_session::Result<()> {
//! let registry = ProviderRegistry::builder()
//!     .register("memory", Arc::new(MemoryProvider::default()))?
//!     .build();
//!
//! let config = ManagerConfig::new("memory", "sessionid", Duration::from_secs(3600));
//! let manager = Arc::new(SessionManager::new(&registry, config)?);
//! let sweeper = manager.spawn_sweeper();
//!
//! // Per request: build a context from the Cookie header and URL
//! let mut ctx = TransportContext::new().with_cookie_header("theme=dark");
//! let session = manager.start(&mut ctx).await?;
//! session.set("countnum", 1.into()).await?;
//!
//! // Send these back as Set-Cookie headers
//! for header in ctx.set_cookie_headers() {
//!     println!("Set-Cookie: {}", header);
//! }
//!
//! sweeper.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **memory** — In-memory provider for single-process use and tests
//! - **file** — One JSON record per session on disk, optionally sealed
//!   with AES-256-GCM
//!
//! ## Architecture
//!
//! - **SessionProvider** trait — core abstraction all backends implement
//! - **Session** trait — per-client key/value handle produced by a provider
//! - **ProviderRegistry** — name → provider bindings frozen at startup
//! - **SessionManager** — token resolution, creation, destruction, sweeping
//! - **SweeperHandle** — cancellable periodic expiry task

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod session;
pub mod sweeper;
pub mod transport;
pub mod value;

// Re-export core types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ManagerConfig;
pub use crypto::{Aes256GcmEncryptor, RecordEncryptor, SealedRecord};
pub use error::{Result, SessionError};
pub use id::{EntropySource, IdGenerator, OsEntropy};
pub use manager::SessionManager;
pub use provider::{ProviderInfo, SessionProvider};
pub use registry::{ProviderRegistry, RegistryBuilder};
pub use session::Session;
pub use sweeper::SweeperHandle;
pub use transport::{is_removal, removal_cookie, session_cookie, TransportContext};
pub use value::SessionValue;

// Cookie types used in staged responses
pub use cookie::{Cookie, SameSite};

// Re-export providers for convenience
pub use provider::file::{FileProvider, FileSession};
pub use provider::memory::{MemoryProvider, MemorySession};
