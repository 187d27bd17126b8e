//! Property tests for batch sizing, sharding and streaming

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use crate::data::{
    local_batch_size, shard_sampler, DataLoaderBuilder, Dataset, DistributedSampler, IndexDataset,
};
use crate::error::Error;
use crate::world::WorldContext;

use super::mock_data::{create_mock_dataset, FailingDataset};

proptest! {
    #[test]
    fn prop_local_batch_size_divides_exactly(
        world_size in 1usize..=8,
        accumulation in 1usize..=8,
        per_worker in 1usize..=16,
    ) {
        let world = WorldContext::new(world_size, 0, accumulation).unwrap();
        let global = world_size * accumulation * per_worker;
        prop_assert_eq!(local_batch_size(global, &world).unwrap(), per_worker);

        if world.micro_batch_divisor() > 1 {
            prop_assert!(local_batch_size(global + 1, &world).unwrap_err().is_config());
        }
    }

    #[test]
    fn prop_shards_cover_dataset_with_equal_lengths(
        len in 0usize..300,
        world_size in 2usize..=8,
        seed in any::<u64>(),
        epoch in 0usize..50,
        shuffle in any::<bool>(),
    ) {
        let world = WorldContext::new(world_size, 0, 1).unwrap();
        let sampler = DistributedSampler::new(len, &world, shuffle, seed);
        let shards = sampler.assign_all(epoch).unwrap();

        prop_assert_eq!(shards.len(), world_size);
        for shard in &shards {
            prop_assert_eq!(shard.len(), sampler.num_samples());
            prop_assert!(shard.indices.iter().all(|&i| i < len));
        }

        let covered: HashSet<usize> =
            shards.iter().flat_map(|s| s.indices.iter().copied()).collect();
        prop_assert_eq!(covered.len(), len);

        if len % world_size == 0 {
            let total: usize = shards.iter().map(|s| s.len()).sum();
            prop_assert_eq!(total, len);
        }
    }

    #[test]
    fn prop_assignment_is_reproducible(
        len in 1usize..500,
        world_size in 2usize..=8,
        seed in any::<u64>(),
        epoch in 0usize..1000,
    ) {
        let world = WorldContext::new(world_size, world_size - 1, 1).unwrap();
        let first = DistributedSampler::new(len, &world, true, seed).assign(epoch).unwrap();
        let second = DistributedSampler::new(len, &world, true, seed).assign(epoch).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_single_pass_yields_full_batches(
        len in 0usize..200,
        batch_size in 1usize..=32,
        shuffle in any::<bool>(),
    ) {
        let dataset = Arc::new(IndexDataset::new("idx", len));
        let loader = DataLoaderBuilder::new(dataset)
            .batch_size(batch_size)
            .shuffle(shuffle)
            .build()
            .unwrap();

        let batches: Vec<_> = loader.epoch_stream(0).unwrap().map(|b| b.unwrap()).collect();
        prop_assert_eq!(batches.len(), len / batch_size);
        prop_assert!(batches.iter().all(|b| b.len() == batch_size));
    }
}

#[test]
fn test_single_worker_never_pads() {
    let world = WorldContext::single();
    assert!(shard_sampler(7, &world, true, 0).is_none());

    let loader = DataLoaderBuilder::new(create_mock_dataset(7))
        .batch_size(2)
        .shuffle(false)
        .build()
        .unwrap();
    let indices: Vec<usize> = loader
        .epoch_stream(0)
        .unwrap()
        .flat_map(|b| b.unwrap().indices)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_samples_match_indices() {
    let loader = DataLoaderBuilder::new(create_mock_dataset(12))
        .batch_size(4)
        .shuffle(true)
        .seed(11)
        .build()
        .unwrap();

    for batch in loader.epoch_stream(3).unwrap() {
        let batch = batch.unwrap();
        for (index, sample) in batch.iter() {
            assert_eq!(sample, &format!("sample_{}", index));
        }
    }
}

#[test]
fn test_fetch_failure_ends_stream() {
    let dataset = Arc::new(FailingDataset::new(20, 6));
    let loader = DataLoaderBuilder::new(dataset.clone())
        .batch_size(4)
        .shuffle(false)
        .build()
        .unwrap();

    let results: Vec<_> = loader.epoch_stream(0).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::Dataset { .. })));
    // indices 4, 5 and 6 of the second batch were fetched before the failure
    assert_eq!(dataset.fetches(), 7);
    assert_eq!(dataset.len(), 20);
}
