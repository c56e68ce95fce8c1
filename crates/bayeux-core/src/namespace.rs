//! Client id allocation.

use std::collections::HashSet;
use uuid::Uuid;

/// A client identifier.
pub type ClientId = String;

/// Allocates collision-free client ids and tracks which are live.
#[derive(Debug, Default)]
pub struct Namespace {
    used: HashSet<ClientId>,
}

impl Namespace {
    /// Create an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an id is currently live.
    #[must_use]
    pub fn exists(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    /// Allocate a new, unused id and mark it live.
    pub fn generate(&mut self) -> ClientId {
        let mut id = Uuid::now_v7().simple().to_string();
        while self.used.contains(&id) {
            id = Uuid::now_v7().simple().to_string();
        }
        self.used.insert(id.clone());
        id
    }

    /// Release an id. Returns `true` if it was live.
    pub fn release(&mut self, id: &str) -> bool {
        self.used.remove(id)
    }

    /// Number of live ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Whether no ids are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
