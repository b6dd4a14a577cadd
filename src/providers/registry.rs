//! Runtime provider registry.
//!
//! Holds one client per configured provider entry plus the name of the
//! active one. `/api <name>` switches the active provider without a restart;
//! only names present in the config can be selected.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::info;

use crate::config::ProvidersConfig;
use crate::error::{BotError, Result};

use super::{CompletionProvider, OpenAIProvider};

/// Requested provider is not configured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider '{requested}' (available: {})", .available.join(", "))]
pub struct UnknownProvider {
    pub requested: String,
    pub available: Vec<String>,
}

/// Named providers and the active selection.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn CompletionProvider>>,
    active: RwLock<String>,
}

impl ProviderRegistry {
    /// Empty registry with `active` preselected. Add providers with [`insert`](Self::insert).
    pub fn new(active: &str) -> Self {
        Self {
            providers: BTreeMap::new(),
            active: RwLock::new(normalize(active)),
        }
    }

    /// Build an HTTP provider for every configured entry.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let mut registry = Self::new(&config.active);
        for (name, entry) in &config.entries {
            let provider = OpenAIProvider::from_config(name, entry)?;
            registry.insert(name, Arc::new(provider));
        }
        if registry.active().is_none() {
            return Err(BotError::Config(
                UnknownProvider {
                    requested: config.active.clone(),
                    available: registry.names(),
                }
                .to_string(),
            ));
        }
        Ok(registry)
    }

    /// Register (or replace) a provider under `name`.
    pub fn insert(&mut self, name: &str, provider: Arc<dyn CompletionProvider>) {
        self.providers.insert(normalize(name), provider);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Name of the active provider.
    pub fn active_name(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The active provider, if its name is registered.
    pub fn active(&self) -> Option<Arc<dyn CompletionProvider>> {
        let name = self.active_name();
        self.providers.get(&name).cloned()
    }

    /// Make `name` the active provider.
    pub fn switch(&self, name: &str) -> std::result::Result<(), UnknownProvider> {
        let name = normalize(name);
        if !self.providers.contains_key(&name) {
            return Err(UnknownProvider {
                requested: name,
                available: self.names(),
            });
        }
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        if *active != name {
            info!(from = %active.as_str(), to = %name, "active provider switched");
            *active = name;
        }
        Ok(())
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
