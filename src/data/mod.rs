//! Data loading infrastructure for distributed training
//!
//! This module turns datasets into per-worker batch streams: it splits the
//! global batch size across workers, schedules epoch lengths, shards indices
//! deterministically across ranks and maps the whole machinery over nested
//! validation datasets.

use crate::error::Result;

pub mod batching;
pub mod datasets;
pub mod loaders;
pub mod module;
pub mod nested;
pub mod prefetch;
pub mod sampler;

// Re-exports
pub use batching::{local_batch_size, micro_batches_per_epoch, Batch};
pub use datasets::{DatasetRegistry, InMemoryDataset, IndexDataset};
pub use loaders::{BatchStream, DataLoader, DataLoaderBuilder, LoaderOptions};
pub use module::{map_validation, DataModule};
pub use nested::{Nested, TreePath};
pub use prefetch::{prefetch, PrefetchStream};
pub use sampler::{shard_sampler, DistributedSampler, ShardAssignment};

/// Common trait for all datasets the core can stream from.
///
/// Datasets are owned outside the core, shared through `Arc` and only ever
/// read, so any number of streams may pull from the same instance.
pub trait Dataset: Send + Sync {
    /// Type of a single example
    type Item;

    /// Get the number of samples in the dataset
    fn len(&self) -> usize;

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a sample by index
    fn get(&self, index: usize) -> Result<Self::Item>;

    /// Name used in logs and errors
    fn name(&self) -> &str {
        "dataset"
    }
}
