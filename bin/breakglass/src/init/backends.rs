//! Index backends configuration and initialisation logic.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use breakglass_index::IndexFactory;

/// Index backend implementation not recognised.
#[derive(Debug, thiserror::Error)]
#[error("index backend '{0}' not recognised")]
pub struct BackendNotFound(String);

/// Register of index backend factories supported by the process/build.
#[derive(Clone, Default)]
pub struct Backends {
    index: HashMap<String, Arc<dyn IndexFactory>>,
}

impl Backends {
    /// Lookup an [`IndexFactory`] by ID.
    pub fn index(&self, id: &str) -> Result<&dyn IndexFactory> {
        let factory = self
            .index
            .get(id)
            .ok_or_else(|| BackendNotFound(id.to_string()))?;
        Ok(factory.as_ref())
    }

    /// Register a new factory for an index implementation.
    ///
    /// # Panics
    ///
    /// This method panics if the identifier of the new index backend is already in use.
    pub fn register_index<B, S>(&mut self, id: S, backend: B) -> &mut Self
    where
        B: IndexFactory + 'static,
        S: Into<String>,
    {
        match self.index.entry(id.into()) {
            Entry::Occupied(entry) => {
                panic!(
                    "an IndexBackend with id '{}' is already registered",
                    entry.key()
                )
            }
            Entry::Vacant(entry) => entry.insert(Arc::new(backend)),
        };
        self
    }
}
