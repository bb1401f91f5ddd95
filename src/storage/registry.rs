//! Store registry
//!
//! Maps each file provider to the store that serves it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{GsutilStore, LocalStore, ObjectStore};
use crate::config::StorageSettings;
use crate::error::{Error, Result};
use crate::types::{FileProvider, Location};

/// Registry of object stores keyed by provider
pub struct StoreRegistry {
    stores: RwLock<HashMap<FileProvider, Arc<dyn ObjectStore>>>,
}

impl StoreRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with a store for every enabled provider
    pub fn from_settings(settings: &StorageSettings) -> Result<Self> {
        let registry = Self::new();
        for provider in settings.enabled_providers()? {
            match provider {
                FileProvider::Local => registry.register(Arc::new(LocalStore::new())),
                FileProvider::Gcs => registry.register(Arc::new(GsutilStore::new(&settings.gsutil_path))),
            }
        }
        Ok(registry)
    }

    /// Register a store under its provider, replacing any previous one
    pub fn register(&self, store: Arc<dyn ObjectStore>) {
        let provider = store.provider();
        tracing::info!(
            provider = %provider,
            store = store.name(),
            "Store registered"
        );
        self.stores.write().insert(provider, store);
    }

    /// Get the store for a provider
    pub fn get(&self, provider: FileProvider) -> Result<Arc<dyn ObjectStore>> {
        self.stores
            .read()
            .get(&provider)
            .cloned()
            .ok_or_else(|| Error::UnsupportedProvider {
                provider: provider.to_string(),
            })
    }

    /// Get the store holding a location
    pub fn for_location(&self, location: &Location) -> Result<Arc<dyn ObjectStore>> {
        self.get(location.provider())
    }

    /// Registered providers, sorted
    pub fn providers(&self) -> Vec<FileProvider> {
        let mut providers: Vec<_> = self.stores.read().keys().copied().collect();
        providers.sort();
        providers
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
