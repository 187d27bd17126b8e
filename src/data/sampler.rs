//! Deterministic shard assignment across workers
//!
//! Every rank computes the same epoch order from `(seed, epoch)` on its own and
//! takes its contiguous slice of it. No coordination message is exchanged.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{Error, Result};
use crate::world::WorldContext;

/// Dataset indices one rank reads during one epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardAssignment {
    /// Epoch the assignment was derived for
    pub epoch: usize,
    /// Rank the shard belongs to
    pub rank: usize,
    /// World size at derivation time
    pub world_size: usize,
    /// Dataset indices in read order
    pub indices: Vec<usize>,
}

impl ShardAssignment {
    /// Get the number of indices in the shard
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether `index` is read by this shard
    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }
}

/// Splits `[0, dataset_len)` into equal contiguous shards, one per rank.
///
/// When the length does not divide by the world size, the epoch order is
/// padded by cycling from its start so that every rank gets `num_samples()`
/// indices. Nothing is ever dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedSampler {
    dataset_len: usize,
    world_size: usize,
    rank: usize,
    shuffle: bool,
    seed: u64,
}

/// Build the sampler for a dataset, or `None` when there is only one worker.
///
/// A single worker reads the full range and shuffles inside its batch stream.
pub fn shard_sampler(
    dataset_len: usize,
    world: &WorldContext,
    shuffle: bool,
    seed: u64,
) -> Option<DistributedSampler> {
    if world.is_distributed() {
        Some(DistributedSampler::new(dataset_len, world, shuffle, seed))
    } else {
        None
    }
}

impl DistributedSampler {
    /// Create a sampler for the rank described by `world`
    pub fn new(dataset_len: usize, world: &WorldContext, shuffle: bool, seed: u64) -> Self {
        Self {
            dataset_len,
            world_size: world.world_size(),
            rank: world.rank(),
            shuffle,
            seed,
        }
    }

    /// Get the length of the sharded dataset
    pub fn dataset_len(&self) -> usize {
        self.dataset_len
    }

    /// Get the number of ranks sharing the dataset
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Get the rank this sampler assigns for
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Whether each epoch order is permuted
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Get the base shuffle seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Shard length shared by every rank
    pub fn num_samples(&self) -> usize {
        self.dataset_len.div_ceil(self.world_size)
    }

    /// Length of the padded epoch order
    pub fn total_size(&self) -> usize {
        self.num_samples() * self.world_size
    }

    /// Number of padded positions appended to the epoch order
    pub fn padding(&self) -> usize {
        self.total_size() - self.dataset_len
    }

    /// Shard of this sampler's rank for `epoch`
    pub fn assign(&self, epoch: usize) -> Result<ShardAssignment> {
        self.assign_rank(epoch, self.rank)
    }

    /// Shard of an arbitrary rank for `epoch`
    pub fn assign_rank(&self, epoch: usize, rank: usize) -> Result<ShardAssignment> {
        if rank >= self.world_size {
            return Err(Error::config(format!(
                "Rank {} is outside a world of size {}",
                rank, self.world_size
            )));
        }

        let order = self.epoch_order(epoch);
        self.slice(&order, epoch, rank)
    }

    /// Shards of every rank for `epoch`, ordered by rank
    pub fn assign_all(&self, epoch: usize) -> Result<Vec<ShardAssignment>> {
        let order = self.epoch_order(epoch);
        (0..self.world_size)
            .map(|rank| self.slice(&order, epoch, rank))
            .collect()
    }

    fn slice(&self, order: &[usize], epoch: usize, rank: usize) -> Result<ShardAssignment> {
        let per_rank = self.num_samples();
        let start = (rank * per_rank).min(order.len());
        let end = (start + per_rank).min(order.len());
        let indices = order[start..end].to_vec();

        if indices.len() != per_rank {
            return Err(Error::exhaustion(rank, per_rank, indices.len()));
        }

        Ok(ShardAssignment {
            epoch,
            rank,
            world_size: self.world_size,
            indices,
        })
    }

    /// Permuted (when shuffling) and padded index order for `epoch`
    fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset_len).collect();

        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }

        let padding = self.padding();
        if padding > 0 && !order.is_empty() {
            let pad: Vec<usize> = order.iter().copied().cycle().take(padding).collect();
            order.extend(pad);
        }

        debug!(
            "Epoch {} order: {} indices ({} padded) over {} ranks",
            epoch,
            order.len(),
            padding,
            self.world_size
        );

        order
    }
}
