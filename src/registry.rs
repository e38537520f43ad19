//! Provider registry — name → backend bindings fixed at startup
//!
//! Bindings are collected with a `RegistryBuilder` and frozen into an
//! immutable `ProviderRegistry`. A frozen registry has no way to add,
//! replace, or remove bindings, so every registration happens before the
//! first lookup.

use crate::error::{SessionError, Result};
use crate::provider::SessionProvider;
use std::collections::HashMap;
use std::sync::Arc;

/// Collects provider bindings during startup
#[derive(Default)]
pub struct RegistryBuilder {
    providers: HashMap<String, Arc<dyn SessionProvider>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a provider
    ///
    /// Errors here mean a broken startup and should abort the process
    /// before it serves any request.
    #[must_use = "a failed registration must abort startup"]
    pub fn register(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn SessionProvider>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SessionError::InvalidProvider {
                name,
                reason: "binding name is blank".to_string(),
            });
        }
        if provider.name().is_empty() {
            return Err(SessionError::InvalidProvider {
                name,
                reason: "provider reports no backend name".to_string(),
            });
        }
        if self.providers.contains_key(&name) {
            return Err(SessionError::DuplicateRegistration(name));
        }

        tracing::debug!(binding = %name, backend = provider.name(), "Provider registered");
        self.providers.insert(name, provider);
        Ok(self)
    }

    /// Freeze the bindings
    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: Arc::new(self.providers),
        }
    }
}

/// Immutable provider bindings, cheap to clone and share
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Arc<HashMap<String, Arc<dyn SessionProvider>>>,
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolve a binding
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn SessionProvider>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            SessionError::NotFound(format!("Session provider not registered: {}", name))
        })
    }

    /// Binding names, sorted; only surfaced through `Debug`
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
