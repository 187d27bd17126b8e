//! Data loaders binding a dataset, a shard sampler and a batch size into
//! per-epoch batch streams

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::batching::Batch;
use super::sampler::DistributedSampler;
use super::Dataset;
use crate::error::{Error, Result};

/// Per-worker loading options, already resolved against the world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderOptions {
    /// Local (per-worker, per-micro-step) batch size
    pub batch_size: usize,
    /// Whether to shuffle data
    pub shuffle: bool,
    /// Seed for shuffling
    pub seed: u64,
    /// Fixed number of batches per epoch; `None` means one full pass
    pub num_batches_per_epoch: Option<usize>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            seed: 0,
            num_batches_per_epoch: None,
        }
    }
}

/// Builds restartable batch streams over one dataset for one worker
pub struct DataLoader<D: Dataset + ?Sized> {
    /// Dataset reference
    dataset: Arc<D>,
    /// Shard sampler, absent for a single worker
    sampler: Option<DistributedSampler>,
    /// DataLoader options
    options: LoaderOptions,
}

impl<D: Dataset + ?Sized> DataLoader<D> {
    /// Create a new DataLoader
    pub fn new(
        dataset: Arc<D>,
        sampler: Option<DistributedSampler>,
        options: LoaderOptions,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(Error::config("Batch size must be greater than 0"));
        }
        if options.num_batches_per_epoch == Some(0) {
            return Err(Error::config(
                "Number of batches per epoch must be greater than 0",
            ));
        }
        if let Some(sampler) = &sampler {
            if sampler.dataset_len() != dataset.len() {
                return Err(Error::config(format!(
                    "Sampler covers {} samples but dataset '{}' has {}",
                    sampler.dataset_len(),
                    dataset.name(),
                    dataset.len()
                )));
            }
        }

        info!(
            "Creating DataLoader for '{}' with batch_size={}, shuffle={}, sharded={}",
            dataset.name(),
            options.batch_size,
            options.shuffle,
            sampler.is_some()
        );

        Ok(Self {
            dataset,
            sampler,
            options,
        })
    }

    /// Number of indices this worker reads in one pass
    pub fn shard_len(&self) -> usize {
        match &self.sampler {
            Some(sampler) => sampler.num_samples(),
            None => self.dataset.len(),
        }
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        self.options
            .num_batches_per_epoch
            .unwrap_or_else(|| self.shard_len() / self.options.batch_size)
    }

    /// Get dataset size
    pub fn dataset_size(&self) -> usize {
        self.dataset.len()
    }

    /// Get the local batch size
    pub fn batch_size(&self) -> usize {
        self.options.batch_size
    }

    /// Get the loader options
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Get the shard sampler, if the loader is sharded
    pub fn sampler(&self) -> Option<&DistributedSampler> {
        self.sampler.as_ref()
    }

    /// Get the dataset reference
    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    /// Create a fresh stream of batches for `epoch`.
    ///
    /// Shard and shuffle state are derived from scratch, so an exhausted or
    /// abandoned stream never affects the next one.
    #[instrument(skip(self), fields(dataset = %self.dataset.name()))]
    pub fn epoch_stream(&self, epoch: usize) -> Result<BatchStream<D>> {
        let (order, rank, rng) = match &self.sampler {
            Some(sampler) => {
                let shard = sampler.assign(epoch)?;
                (shard.indices, sampler.rank(), None)
            }
            None => {
                let mut order: Vec<usize> = (0..self.dataset.len()).collect();
                let rng = if self.options.shuffle {
                    let mut rng =
                        StdRng::seed_from_u64(self.options.seed.wrapping_add(epoch as u64));
                    order.shuffle(&mut rng);
                    Some(rng)
                } else {
                    None
                };
                (order, 0, rng)
            }
        };

        let stream = BatchStream::new(
            self.dataset.clone(),
            order,
            self.options.batch_size,
            self.options.num_batches_per_epoch,
            rng,
            epoch,
            rank,
        )?;

        let expected = self.num_batches();
        if stream.total_batches() != expected {
            return Err(Error::exhaustion(rank, expected, stream.total_batches()));
        }

        info!(
            "Starting epoch {} with {} batches of {} on rank {}",
            epoch, expected, self.options.batch_size, rank
        );
        Ok(stream)
    }
}

/// Lazy iterator of fixed-size batches for one worker and one epoch.
///
/// Without a cap it makes exactly one pass over the shard and drops the
/// trailing partial batch. With a cap it yields exactly `cap` batches,
/// cycling the shard as often as needed.
pub struct BatchStream<D: Dataset + ?Sized> {
    dataset: Arc<D>,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    /// Whether the shard may be restarted when it runs out
    cycle: bool,
    /// Present only when the stream shuffles on its own; reshuffles each new pass
    rng: Option<StdRng>,
    passes: usize,
    batches_emitted: usize,
    total_batches: usize,
    epoch: usize,
    rank: usize,
}

impl<D: Dataset + ?Sized> BatchStream<D> {
    fn new(
        dataset: Arc<D>,
        order: Vec<usize>,
        batch_size: usize,
        cap: Option<usize>,
        rng: Option<StdRng>,
        epoch: usize,
        rank: usize,
    ) -> Result<Self> {
        let total_batches = match cap {
            Some(cap) => {
                if order.is_empty() {
                    return Err(Error::dataset(
                        dataset.name(),
                        format!("cannot draw {} batches from an empty shard", cap),
                    ));
                }
                cap
            }
            None => order.len() / batch_size,
        };

        let dropped = if cap.is_none() { order.len() % batch_size } else { 0 };
        if dropped > 0 {
            debug!(
                "Dropping {} trailing samples that do not fill a batch of {}",
                dropped, batch_size
            );
        }

        Ok(Self {
            dataset,
            order,
            batch_size,
            cursor: 0,
            cycle: cap.is_some(),
            rng,
            passes: 0,
            batches_emitted: 0,
            total_batches,
            epoch,
            rank,
        })
    }

    /// Total number of batches this stream yields
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// Get the number of batches emitted so far
    pub fn batches_emitted(&self) -> usize {
        self.batches_emitted
    }

    /// Get the epoch this stream was built for
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Get the rank reading this stream
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Get the batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Completed passes over the shard
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Get progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        if self.total_batches == 0 {
            1.0
        } else {
            self.batches_emitted as f32 / self.total_batches as f32
        }
    }

    fn next_indices(&mut self) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(self.batch_size);

        while indices.len() < self.batch_size {
            if self.cursor == self.order.len() {
                if !self.cycle || self.order.is_empty() {
                    let expected = self.total_batches * self.batch_size;
                    let actual = self.batches_emitted * self.batch_size + indices.len();
                    return Err(Error::exhaustion(self.rank, expected, actual));
                }
                self.cursor = 0;
                self.passes += 1;
                if let Some(rng) = self.rng.as_mut() {
                    self.order.shuffle(rng);
                }
                debug!("Shard exhausted, starting pass {}", self.passes);
            }
            indices.push(self.order[self.cursor]);
            self.cursor += 1;
        }

        Ok(indices)
    }
}

impl<D: Dataset + ?Sized> Iterator for BatchStream<D> {
    type Item = Result<Batch<D::Item>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batches_emitted >= self.total_batches {
            return None;
        }

        let batch = self.next_indices().and_then(|indices| {
            let samples = indices
                .iter()
                .map(|&index| self.dataset.get(index))
                .collect::<Result<Vec<_>>>()?;
            Ok(Batch { indices, samples })
        });

        match batch {
            Ok(batch) => {
                self.batches_emitted += 1;
                if self.batches_emitted == self.total_batches {
                    debug!(
                        "Epoch {} completed on rank {}: {} batches",
                        self.epoch, self.rank, self.batches_emitted
                    );
                }
                Some(Ok(batch))
            }
            Err(e) => {
                warn!("Batch stream for epoch {} failed: {}", self.epoch, e);
                self.batches_emitted = self.total_batches;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_batches.saturating_sub(self.batches_emitted);
        (remaining, Some(remaining))
    }
}

impl<D: Dataset + ?Sized> ExactSizeIterator for BatchStream<D> {}

/// Builder for creating DataLoaders with fluent API
pub struct DataLoaderBuilder<D: Dataset + ?Sized> {
    dataset: Arc<D>,
    sampler: Option<DistributedSampler>,
    options: LoaderOptions,
}

impl<D: Dataset + ?Sized> DataLoaderBuilder<D> {
    /// Create a new DataLoaderBuilder
    pub fn new(dataset: Arc<D>) -> Self {
        Self {
            dataset,
            sampler: None,
            options: LoaderOptions::default(),
        }
    }

    /// Set batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.options.batch_size = batch_size;
        self
    }

    /// Set shuffle
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.options.shuffle = shuffle;
        self
    }

    /// Set seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    /// Cap the number of batches per epoch
    pub fn num_batches_per_epoch(mut self, num_batches: Option<usize>) -> Self {
        self.options.num_batches_per_epoch = num_batches;
        self
    }

    /// Set shard sampler
    pub fn sampler(mut self, sampler: Option<DistributedSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Build the DataLoader
    pub fn build(self) -> Result<DataLoader<D>> {
        DataLoader::new(self.dataset, self.sampler, self.options)
    }
}
