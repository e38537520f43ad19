//! Session manager configuration

use crate::error::{SessionError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use cookie::SameSite;

/// Serde form of the `SameSite` attribute (`"strict"`, `"lax"`, `"none"`)
mod same_site_serde {
    use cookie::SameSite;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<SameSite>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(SameSite::Strict) => ser.serialize_some("strict"),
            Some(SameSite::Lax) => ser.serialize_some("lax"),
            Some(SameSite::None) => ser.serialize_some("none"),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<SameSite>, D::Error> {
        let raw: Option<String> = Option::deserialize(de)?;
        match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None => Ok(None),
            Some("strict") => Ok(Some(SameSite::Strict)),
            Some("lax") => Ok(Some(SameSite::Lax)),
            Some("none") => Ok(Some(SameSite::None)),
            Some(other) => Err(de::Error::unknown_variant(other, &["strict", "lax", "none"])),
        }
    }
}

/// Configuration for a `SessionManager`
///
/// Durations are expressed in seconds so the struct loads cleanly from
/// JSON/TOML config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Registered provider name to resolve at construction
    pub provider: String,

    /// Cookie name, also used as the URL parameter name
    pub cookie_name: String,

    /// Maximum idle lifetime in seconds before a session may be swept
    pub max_lifetime_secs: u64,

    /// Seconds between sweeps; defaults to `max_lifetime_secs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc_interval_secs: Option<u64>,

    /// Cookie Max-Age in seconds; defaults to `max_lifetime_secs`.
    /// `0` issues a browser-session cookie with no Max-Age.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_lifetime_secs: Option<u64>,

    /// Cookie path scope
    pub cookie_path: String,

    /// Add the `Secure` attribute
    pub secure: bool,

    /// `SameSite` attribute; omitted when `None`
    #[serde(with = "same_site_serde", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,

    /// Replace tokens that name no live session instead of adopting them
    pub strict_tokens: bool,

    /// Accept tokens carried as URL parameters
    pub accept_url_token: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            cookie_name: "sessionid".to_string(),
            max_lifetime_secs: 3600,
            gc_interval_secs: None,
            cookie_lifetime_secs: None,
            cookie_path: "/".to_string(),
            secure: false,
            same_site: Some(SameSite::Lax),
            strict_tokens: false,
            accept_url_token: true,
        }
    }
}

impl ManagerConfig {
    /// Create a config for a provider, cookie name, and idle lifetime
    pub fn new(
        provider: impl Into<String>,
        cookie_name: impl Into<String>,
        max_lifetime: Duration,
    ) -> Self {
        Self {
            provider: provider.into(),
            cookie_name: cookie_name.into(),
            max_lifetime_secs: max_lifetime.as_secs(),
            ..Default::default()
        }
    }

    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval_secs = Some(interval.as_secs());
        self
    }

    pub fn with_cookie_lifetime(mut self, lifetime: Duration) -> Self {
        self.cookie_lifetime_secs = Some(lifetime.as_secs());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn with_strict_tokens(mut self, strict: bool) -> Self {
        self.strict_tokens = strict;
        self
    }

    pub fn with_url_tokens(mut self, accept: bool) -> Self {
        self.accept_url_token = accept;
        self
    }

    /// Maximum idle lifetime
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Interval between sweeps
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs.unwrap_or(self.max_lifetime_secs))
    }

    /// Cookie Max-Age in seconds (`0` for a browser-session cookie)
    pub fn cookie_max_age(&self) -> u64 {
        self.cookie_lifetime_secs.unwrap_or(self.max_lifetime_secs)
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(SessionError::Config("Provider name cannot be empty".to_string()));
        }
        if self.cookie_name.is_empty() {
            return Err(SessionError::Config("Cookie name cannot be empty".to_string()));
        }
        let bad_char = |c: char| {
            c.is_ascii_control() || c.is_whitespace() || "()<>@,;:\\\"/[]?={}".contains(c)
        };
        if self.cookie_name.chars().any(bad_char) {
            return Err(SessionError::Config(format!(
                "Cookie name '{}' contains characters not allowed in a cookie name",
                self.cookie_name
            )));
        }
        if !self.cookie_path.is_empty()
            && (!self.cookie_path.starts_with('/')
                || self.cookie_path.chars().any(|c| c == ';' || c.is_control()))
        {
            return Err(SessionError::Config(format!(
                "Cookie path '{}' must start with '/' and cannot contain ';' or control characters",
                self.cookie_path.escape_debug()
            )));
        }
        if self.max_lifetime_secs == 0 {
            return Err(SessionError::Config(
                "Maximum session lifetime must be at least one second".to_string(),
            ));
        }
        if self.gc_interval_secs == Some(0) {
            return Err(SessionError::Config(
                "Sweep interval must be at least one second".to_string(),
            ));
        }
        if self.same_site == Some(SameSite::None) && !self.secure {
            return Err(SessionError::Config(
                "SameSite=None requires the Secure attribute".to_string(),
            ));
        }
        Ok(())
    }
}
