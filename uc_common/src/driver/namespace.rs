//! Cross-driver shared namespaces.
//!
//! A namespace is a small thread-safe key/value store, created on first
//! request and shared by every driver allowed to ask for it.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A named key/value store shared between drivers.
#[derive(Debug, Default)]
pub struct SharedNamespace {
    values: RwLock<HashMap<String, Value>>,
}

impl SharedNamespace {
    /// Read a value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Store a value, returning the previous one.
    pub fn set(&self, key: &str, value: Value) -> Option<Value> {
        self.values.write().insert(key.to_string(), value)
    }

    /// Remove a value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    /// Whether the namespace holds `key`.
    pub fn has(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }
}

/// Registry of shared namespaces, keyed by name.
#[derive(Debug, Default)]
pub struct SharedNamespaces {
    namespaces: RwLock<HashMap<String, Arc<SharedNamespace>>>,
}

impl SharedNamespaces {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a namespace, creating it on first request.
    pub fn get_or_create(&self, name: &str) -> Arc<SharedNamespace> {
        if let Some(ns) = self.namespaces.read().get(name) {
            return Arc::clone(ns);
        }
        let mut namespaces = self.namespaces.write();
        Arc::clone(namespaces.entry(name.to_string()).or_insert_with(|| {
            debug!("shared namespace {name} created");
            Arc::new(SharedNamespace::default())
        }))
    }

    /// Names of the namespaces created so far.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }
}
