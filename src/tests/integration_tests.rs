//! End-to-end behavior of the data module across ranks and epochs

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use crate::config::{BatchSpec, DataModuleConfig};
use crate::data::{
    shard_sampler, DataLoader, DataModule, Dataset, DatasetRegistry, IndexDataset,
    InMemoryDataset, LoaderOptions, Nested,
};
use crate::world::WorldContext;

use super::mock_data::all_ranks;

fn batch_spec(batch_size: usize, shuffle: bool, cap: Option<usize>) -> BatchSpec {
    BatchSpec {
        batch_size,
        shuffle,
        seed: 0,
        num_batches_per_epoch: cap,
    }
}

#[test]
fn test_two_ranks_split_ten_examples() {
    let dataset = Arc::new(IndexDataset::new("ten", 10));
    let expected = [vec![0, 1, 2, 3, 4], vec![5, 6, 7, 8, 9]];

    for world in all_ranks(2, 1) {
        let options = LoaderOptions {
            batch_size: 2,
            shuffle: false,
            seed: 0,
            num_batches_per_epoch: None,
        };
        let sampler = shard_sampler(dataset.len(), &world, false, 0);
        let shard = sampler.as_ref().unwrap().assign(0).unwrap();
        assert_eq!(shard.indices, expected[world.rank()]);

        let loader = DataLoader::new(dataset.clone(), sampler, options).unwrap();
        let batches: Vec<Vec<usize>> = loader
            .epoch_stream(0)
            .unwrap()
            .map(|b| b.unwrap().indices)
            .collect();

        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 2));
        let seen: HashSet<usize> = batches.into_iter().flatten().collect();
        assert!(seen.is_subset(&expected[world.rank()].iter().copied().collect()));
    }
}

#[test]
fn test_ranks_agree_on_batch_counts() {
    let mut registry = DatasetRegistry::new();
    registry.register("train", Arc::new(IndexDataset::new("train", 1001)));
    registry.register("val", Arc::new(IndexDataset::new("val", 97)));

    let config = DataModuleConfig {
        train_data: "train".to_string(),
        train: batch_spec(48, true, None),
        val_data: Some(json!("val")),
        val: Some(batch_spec(12, false, None)),
    };
    let data = DataModule::from_registry(config, &registry).unwrap();

    for epoch in 0..3 {
        let mut train_counts = HashSet::new();
        let mut val_counts = HashSet::new();
        for world in all_ranks(3, 2) {
            train_counts.insert(data.train_stream(&world, epoch).unwrap().count());
            let val = data.val_streams(&world, epoch).unwrap().unwrap();
            let stream = val.into_leaf().unwrap();
            val_counts.insert(stream.count());
        }
        // 1001 samples over 3 ranks pad to 334 each; local batch 48 / 6 = 8
        assert_eq!(train_counts, HashSet::from([41]));
        // 97 samples pad to 33 each; local batch 12 / 6 = 2
        assert_eq!(val_counts, HashSet::from([16]));
    }
}

#[test]
fn test_shuffled_epochs_partition_data() {
    let dataset = Arc::new(IndexDataset::new("train", 64));
    let mut previous: Option<Vec<usize>> = None;

    for epoch in 0..4 {
        let mut union = Vec::new();
        for world in all_ranks(4, 1) {
            let sampler = shard_sampler(dataset.len(), &world, true, 1234);
            let shard = sampler.unwrap().assign(epoch).unwrap();
            union.extend(shard.indices);
        }

        let mut sorted = union.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..64).collect::<Vec<_>>(), "overlap in epoch {}", epoch);

        if let Some(prev) = &previous {
            assert_ne!(prev, &union, "epoch {} repeated the previous order", epoch);
        }
        previous = Some(union);
    }
}

#[test]
fn test_nested_validation_streams() {
    let train: Arc<dyn Dataset<Item = String>> = Arc::new(InMemoryDataset::new(
        "train",
        (0..40).map(|i| format!("t{}", i)).collect::<Vec<String>>(),
    ));
    let leaf = |name: &str, len: usize| -> Nested<Arc<dyn Dataset<Item = String>>> {
        Nested::Leaf(Arc::new(InMemoryDataset::new(
            name,
            (0..len).map(|i| format!("{}{}", name, i)).collect::<Vec<_>>(),
        )))
    };
    let val = Nested::Node(vec![
        leaf("a", 12),
        Nested::Node(vec![leaf("b", 20), leaf("c", 4)]),
    ]);

    let config = DataModuleConfig {
        train_data: "train".to_string(),
        train: batch_spec(8, true, Some(3)),
        val_data: None,
        val: Some(batch_spec(4, false, None)),
    };
    let data = DataModule::new(config, train, Some(val)).unwrap();

    let world = WorldContext::new(2, 1, 1).unwrap();
    let streams = data.val_streams(&world, 0).unwrap().unwrap();
    assert!(streams.same_shape(data.val_dataset().unwrap()));

    let collected = streams.map(|stream| {
        stream
            .map(|b| b.unwrap().into_samples())
            .collect::<Vec<_>>()
    });
    let expected = Nested::Node(vec![
        Nested::Leaf(vec![
            vec!["a6".to_string(), "a7".to_string()],
            vec!["a8".to_string(), "a9".to_string()],
            vec!["a10".to_string(), "a11".to_string()],
        ]),
        Nested::Node(vec![
            Nested::Leaf(
                (10..20)
                    .collect::<Vec<_>>()
                    .chunks(2)
                    .map(|c| c.iter().map(|i| format!("b{}", i)).collect::<Vec<String>>())
                    .collect(),
            ),
            Nested::Leaf(vec![vec!["c2".to_string(), "c3".to_string()]]),
        ]),
    ]);
    assert_eq!(collected, expected);

    let train_batches: Vec<_> = data.train_stream(&world, 0).unwrap().collect();
    assert_eq!(train_batches.len(), 3);
}
