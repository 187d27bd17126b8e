//! Batch sizing and the batch container yielded by streams

use tracing::debug;

use crate::error::{Error, Result};
use crate::world::WorldContext;

/// Per-worker micro-batch size for a global batch size.
///
/// `global_batch_size` must split exactly into `world_size * accumulation_steps`
/// pieces. An inexact split is rejected rather than rounded, otherwise the
/// effective global batch would drift with the worker count.
pub fn local_batch_size(global_batch_size: usize, world: &WorldContext) -> Result<usize> {
    let divisor = world.micro_batch_divisor();

    if global_batch_size == 0 {
        return Err(Error::config("Global batch size must be greater than 0"));
    }
    if global_batch_size % divisor != 0 {
        return Err(Error::config(format!(
            "Global batch size {} is not divisible by world_size ({}) * accumulation_steps ({}) = {}",
            global_batch_size,
            world.world_size(),
            world.accumulation_steps(),
            divisor
        )));
    }

    let local = global_batch_size / divisor;
    debug!(
        "Global batch size {} -> local batch size {} (divisor {})",
        global_batch_size, local, divisor
    );
    Ok(local)
}

/// Micro-batches a worker draws before one optimizer-visible epoch completes.
///
/// One optimizer step consumes `accumulation_steps` micro-batches. Only
/// training streams are scheduled this way; validation runs to exhaustion.
pub fn micro_batches_per_epoch(
    num_batches_per_epoch: usize,
    world: &WorldContext,
) -> Result<usize> {
    num_batches_per_epoch
        .checked_mul(world.accumulation_steps())
        .ok_or_else(|| {
            Error::config(format!(
                "num_batches_per_epoch ({}) * accumulation_steps ({}) overflows",
                num_batches_per_epoch,
                world.accumulation_steps()
            ))
        })
}

/// A fixed-size group of examples together with the dataset indices they came from
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    /// Dataset indices, in draw order
    pub indices: Vec<usize>,
    /// Examples fetched for `indices`
    pub samples: Vec<T>,
}

impl<T> Batch<T> {
    /// Number of examples in the batch
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate over `(index, sample)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.indices.iter().copied().zip(self.samples.iter())
    }

    /// Consume the batch, keeping only the samples
    pub fn into_samples(self) -> Vec<T> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(64, 4, 2 => 8 ; "four workers two accumulation steps")]
    #[test_case(64, 1, 1 => 64 ; "single worker")]
    #[test_case(96, 3, 4 => 8 ; "three workers")]
    #[test_case(8, 8, 1 => 1 ; "one example per worker")]
    fn test_local_batch_size(global: usize, world_size: usize, accumulation: usize) -> usize {
        let world = WorldContext::new(world_size, 0, accumulation).unwrap();
        local_batch_size(global, &world).unwrap()
    }

    #[test_case(65, 4, 2 ; "odd global batch")]
    #[test_case(4, 8, 1 ; "fewer examples than workers")]
    #[test_case(0, 1, 1 ; "zero global batch")]
    fn test_local_batch_size_rejects(global: usize, world_size: usize, accumulation: usize) {
        let world = WorldContext::new(world_size, 0, accumulation).unwrap();
        let err = local_batch_size(global, &world).unwrap_err();
        assert!(err.is_config(), "unexpected error: {}", err);
    }

    #[test]
    fn test_micro_batches_per_epoch() {
        let world = WorldContext::new(4, 1, 3).unwrap();
        assert_eq!(micro_batches_per_epoch(100, &world).unwrap(), 300);
        assert_eq!(
            micro_batches_per_epoch(100, &WorldContext::single()).unwrap(),
            100
        );
    }

    #[test]
    fn test_micro_batches_per_epoch_overflow() {
        let world = WorldContext::new(1, 0, 2).unwrap();
        let err = micro_batches_per_epoch(usize::MAX / 2 + 1, &world).unwrap_err();
        assert!(err.is_config(), "unexpected error: {}", err);
        assert_eq!(
            micro_batches_per_epoch(usize::MAX, &WorldContext::single()).unwrap(),
            usize::MAX
        );
    }

    #[test]
    fn test_batch_accessors() {
        let batch = Batch {
            indices: vec![4, 7],
            samples: vec!["a", "b"],
        };
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        let pairs: Vec<_> = batch.iter().collect();
        assert_eq!(pairs, vec![(4, &"a"), (7, &"b")]);
        assert_eq!(batch.into_samples(), vec!["a", "b"]);
    }
}
