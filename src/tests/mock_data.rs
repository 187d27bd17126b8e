//! Mock datasets for testing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::data::{Dataset, InMemoryDataset};
use crate::error::{Error, Result};
use crate::world::WorldContext;

/// Dataset of `sample_{i}` strings
pub fn create_mock_dataset(num_samples: usize) -> Arc<InMemoryDataset<String>> {
    let samples = (0..num_samples).map(|i| format!("sample_{}", i)).collect();
    Arc::new(InMemoryDataset::new("mock", samples))
}

/// Every rank of a world, in rank order
pub fn all_ranks(world_size: usize, accumulation_steps: usize) -> Vec<WorldContext> {
    (0..world_size)
        .map(|rank| WorldContext::new(world_size, rank, accumulation_steps).unwrap())
        .collect()
}

/// Dataset that fails on one index and counts fetches
pub struct FailingDataset {
    len: usize,
    fail_at: usize,
    fetches: AtomicUsize,
}

impl FailingDataset {
    pub fn new(len: usize, fail_at: usize) -> Self {
        Self {
            len,
            fail_at,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Dataset for FailingDataset {
    type Item = usize;

    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<usize> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if index == self.fail_at {
            return Err(Error::dataset("failing", format!("corrupt record {}", index)));
        }
        Ok(index)
    }

    fn name(&self) -> &str {
        "failing"
    }
}
