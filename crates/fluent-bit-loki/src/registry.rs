// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Instance registry.
//!
//! Maps a plugin instance id to its running state. An id is written once, at
//! init, and only read afterwards; there is no removal. fluent-bit serializes
//! init calls, so the write lock is never contended by a flush in practice.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("instance '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Debug)]
pub struct Registry<T> {
    instances: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Registry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `state` under `id`. An existing entry is never overwritten.
    pub fn register(&self, id: &str, state: T) -> Result<Arc<T>, RegistryError> {
        let mut instances = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if instances.contains_key(id) {
            return Err(RegistryError::AlreadyRegistered(id.to_string()));
        }
        let state = Arc::new(state);
        instances.insert(id.to_string(), Arc::clone(&state));
        Ok(state)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Arc<T>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Calls `f` for every registered instance.
    ///
    /// The entries are collected first so `f` runs without holding the lock.
    pub fn for_each(&self, mut f: impl FnMut(&str, &T)) {
        let instances: Vec<(String, Arc<T>)> = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, state)| (id.clone(), Arc::clone(state)))
            .collect();
        for (id, state) in &instances {
            f(id, state);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
