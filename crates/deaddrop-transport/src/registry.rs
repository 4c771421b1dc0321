//! Registry of live links, keyed by link id.

use std::sync::Arc;

use dashmap::DashMap;
use deaddrop_link::Link;

/// Concurrent map of the transport's links.
#[derive(Default)]
pub struct LinkRegistry {
    links: DashMap<String, Arc<Link>>,
}

impl LinkRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link under its id, replacing any previous entry.
    pub fn add(&self, link: Arc<Link>) {
        self.links.insert(link.id().to_string(), link);
    }

    /// Look up a link by id.
    pub fn get(&self, link_id: &str) -> Option<Arc<Link>> {
        self.links.get(link_id).map(|entry| entry.value().clone())
    }

    /// Remove and return a link.
    pub fn remove(&self, link_id: &str) -> Option<Arc<Link>> {
        self.links.remove(link_id).map(|(_, link)| link)
    }

    /// Number of registered links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Ids of all registered links.
    pub fn ids(&self) -> Vec<String> {
        self.links.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove and return every link.
    pub fn drain(&self) -> Vec<Arc<Link>> {
        let ids = self.ids();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }
}
