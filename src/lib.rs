//! Batchflow - deterministic per-worker batch streams for distributed training
//!
//! This crate turns datasets into the batch streams each worker of a
//! data-parallel training run consumes. Workers never talk to each other:
//! they agree on a non-overlapping, equally sized partition of the data purely
//! through the seed, the epoch, their rank and the world size.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use batchflow::{DataModule, DataModuleConfig, DatasetRegistry, IndexDataset, WorldContext};
//! use std::sync::Arc;
//!
//! let config = DataModuleConfig::from_file("data.yaml")?;
//! let mut registry = DatasetRegistry::new();
//! registry.register("train", Arc::new(IndexDataset::new("train", 10_000)));
//!
//! let data = DataModule::from_registry(config, &registry)?;
//! let world = WorldContext::new(8, rank, 2)?;
//!
//! for epoch in 0..num_epochs {
//!     for batch in data.train_stream(&world, epoch)? {
//!         let batch = batch?;
//!         // forward / backward on batch.samples
//!     }
//! }
//! ```

#![warn(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod data;
pub mod error;
pub mod world;

#[cfg(test)]
mod tests;

// Re-exports
pub use crate::config::{BatchSpec, DataModuleConfig};
pub use data::{
    local_batch_size, map_validation, micro_batches_per_epoch, prefetch, shard_sampler, Batch,
    BatchStream, DataLoader, DataLoaderBuilder, DataModule, Dataset, DatasetRegistry,
    DistributedSampler, InMemoryDataset, IndexDataset, LoaderOptions, Nested, PrefetchStream,
    ShardAssignment, TreePath,
};
pub use error::{Error, Result};
pub use world::WorldContext;
