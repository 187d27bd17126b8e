//! Concrete datasets and name-based dataset lookup

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::nested::Nested;
use super::Dataset;
use crate::error::{Error, Result};

/// Dataset backed by a vector of examples
#[derive(Debug, Clone)]
pub struct InMemoryDataset<T> {
    name: String,
    samples: Vec<T>,
}

impl<T> InMemoryDataset<T> {
    /// Create a named in-memory dataset
    pub fn new(name: impl Into<String>, samples: Vec<T>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }
}

impl<T: Clone + Send + Sync> Dataset for InMemoryDataset<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<T> {
        self.samples.get(index).cloned().ok_or(Error::InvalidIndex {
            index,
            dataset_size: self.samples.len(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Dataset whose examples are their own indices.
///
/// Useful for planning and inspecting shard layouts without touching data.
#[derive(Debug, Clone)]
pub struct IndexDataset {
    name: String,
    len: usize,
}

impl IndexDataset {
    /// Create a named index dataset of `len` samples
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
        }
    }
}

impl Dataset for IndexDataset {
    type Item = usize;

    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<usize> {
        if index >= self.len {
            return Err(Error::InvalidIndex {
                index,
                dataset_size: self.len,
            });
        }
        Ok(index)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Datasets known by name, used to resolve dataset references from configuration
pub struct DatasetRegistry<D: ?Sized> {
    datasets: BTreeMap<String, Arc<D>>,
}

impl<D: Dataset + ?Sized> DatasetRegistry<D> {
    pub fn new() -> Self {
        Self {
            datasets: BTreeMap::new(),
        }
    }

    /// Register a dataset under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, dataset: Arc<D>) -> &mut Self {
        let name = name.into();
        debug!("Registering dataset '{}' ({} samples)", name, dataset.len());
        self.datasets.insert(name, dataset);
        self
    }

    /// Get a dataset by name
    pub fn get(&self, name: &str) -> Option<Arc<D>> {
        self.datasets.get(name).cloned()
    }

    /// Check if a dataset is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Get the number of registered datasets
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Look up a single dataset, reporting unknown names as configuration errors
    pub fn require(&self, name: &str) -> Result<Arc<D>> {
        self.get(name).ok_or_else(|| {
            Error::config(format!(
                "Unknown dataset '{}' (registered: {:?})",
                name,
                self.names().collect::<Vec<_>>()
            ))
        })
    }

    /// Replace every name in a nested structure with its dataset.
    ///
    /// Unknown names are structural errors reported at their position.
    pub fn resolve(&self, names: &Nested<String>) -> Result<Nested<Arc<D>>> {
        let resolved = names.try_map_ref(|path, name| {
            self.get(name).ok_or_else(|| {
                Error::structural(path, format!("'{}' does not name a registered dataset", name))
            })
        })?;
        info!("Resolved {} validation datasets", resolved.num_leaves());
        Ok(resolved)
    }
}

impl<D: Dataset + ?Sized> Default for DatasetRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}
