//! Orchestrator-facing data module
//!
//! [`DataModule`] owns the configuration and the datasets of a run and hands
//! out a training stream and optional validation streams on request. Sizes are
//! recomputed from the [`WorldContext`] on every call, since world size and
//! accumulation are only final once the distributed environment is up.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::batching::{local_batch_size, micro_batches_per_epoch};
use super::datasets::DatasetRegistry;
use super::loaders::{BatchStream, DataLoader, LoaderOptions};
use super::nested::{Nested, TreePath};
use super::sampler::shard_sampler;
use super::Dataset;
use crate::config::{BatchSpec, DataModuleConfig};
use crate::error::{Error, Result};
use crate::world::WorldContext;

/// Apply `build` to every leaf of a validation structure, mirroring its shape.
///
/// Each leaf is handled on its own; leaves need not agree on size or batch
/// settings. The first failure is returned wrapped in [`Error::Validation`]
/// with the leaf's position, unless it already carries one.
pub fn map_validation<T, U, F>(structure: &Nested<T>, mut build: F) -> Result<Nested<U>>
where
    F: FnMut(&TreePath, &T) -> Result<U>,
{
    structure.try_map_ref(|path, leaf| {
        build(path, leaf).map_err(|e| match e {
            Error::Structural { .. } | Error::Validation { .. } => e,
            other => Error::validation(path, other),
        })
    })
}

/// Training and validation datasets plus the batch settings to stream them with
pub struct DataModule<D: Dataset + ?Sized> {
    config: DataModuleConfig,
    train_dataset: Arc<D>,
    val_dataset: Option<Nested<Arc<D>>>,
}

impl<D: Dataset + ?Sized> DataModule<D> {
    /// Create a data module from already constructed datasets
    pub fn new(
        config: DataModuleConfig,
        train_dataset: Arc<D>,
        val_dataset: Option<Nested<Arc<D>>>,
    ) -> Result<Self> {
        config.train.validate("Training")?;
        if val_dataset.is_some() && config.val.is_none() {
            return Err(Error::config(
                "Validation datasets given without a `val` batch spec",
            ));
        }
        if let Some(val) = &config.val {
            val.validate("Validation")?;
        }

        info!(
            "DataModule: train '{}' ({} samples), {} validation datasets",
            train_dataset.name(),
            train_dataset.len(),
            val_dataset.as_ref().map_or(0, Nested::num_leaves)
        );

        Ok(Self {
            config,
            train_dataset,
            val_dataset,
        })
    }

    /// Resolve the configured dataset names through `registry`
    pub fn from_registry(config: DataModuleConfig, registry: &DatasetRegistry<D>) -> Result<Self> {
        config.validate()?;
        let train_dataset = registry.require(&config.train_data)?;
        let val_dataset = config
            .validation_structure()?
            .map(|names| registry.resolve(&names))
            .transpose()?;
        Self::new(config, train_dataset, val_dataset)
    }

    /// Get the configuration
    pub fn config(&self) -> &DataModuleConfig {
        &self.config
    }

    /// Get the training dataset
    pub fn train_dataset(&self) -> &Arc<D> {
        &self.train_dataset
    }

    /// Get the validation datasets, if any
    pub fn val_dataset(&self) -> Option<&Nested<Arc<D>>> {
        self.val_dataset.as_ref()
    }

    /// Whether validation streams will be produced
    pub fn has_validation(&self) -> bool {
        self.val_dataset.is_some()
    }

    /// Local training batch size for `world`
    pub fn train_batch_size(&self, world: &WorldContext) -> Result<usize> {
        local_batch_size(self.config.train.batch_size, world)
    }

    /// Local validation batch size for `world`
    pub fn val_batch_size(&self, world: &WorldContext) -> Result<usize> {
        let val = self.val_spec()?;
        local_batch_size(val.batch_size, world)
    }

    /// Micro-batches per training epoch for `world`, `None` for one full pass
    pub fn train_num_batches_per_epoch(&self, world: &WorldContext) -> Result<Option<usize>> {
        self.config
            .train
            .num_batches_per_epoch
            .map(|n| micro_batches_per_epoch(n, world))
            .transpose()
    }

    /// Training loader for `world`
    pub fn train_loader(&self, world: &WorldContext) -> Result<DataLoader<D>> {
        let options = LoaderOptions {
            batch_size: self.train_batch_size(world)?,
            shuffle: self.config.train.shuffle,
            seed: self.config.train.seed,
            num_batches_per_epoch: self.train_num_batches_per_epoch(world)?,
        };
        build_loader(self.train_dataset.clone(), world, options)
    }

    /// Training stream for `epoch`
    #[instrument(skip(self, world), fields(rank = world.rank(), world_size = world.world_size()))]
    pub fn train_stream(&self, world: &WorldContext, epoch: usize) -> Result<BatchStream<D>> {
        self.train_loader(world)?.epoch_stream(epoch)
    }

    /// Validation loaders for `world`, shaped like the validation datasets
    pub fn val_loaders(&self, world: &WorldContext) -> Result<Option<Nested<DataLoader<D>>>> {
        let Some(structure) = &self.val_dataset else {
            return Ok(None);
        };

        let val = self.val_spec()?;
        let batch_size = local_batch_size(val.batch_size, world)?;

        map_validation(structure, |path, dataset| {
            debug!("Building validation loader {} for '{}'", path, dataset.name());
            let options = LoaderOptions {
                batch_size,
                shuffle: val.shuffle,
                seed: val.seed,
                // Validation always covers the whole shard
                num_batches_per_epoch: None,
            };
            build_loader(dataset.clone(), world, options)
        })
        .map(Some)
    }

    /// Validation streams for `epoch`, or `None` when no validation data is configured
    #[instrument(skip(self, world), fields(rank = world.rank(), world_size = world.world_size()))]
    pub fn val_streams(
        &self,
        world: &WorldContext,
        epoch: usize,
    ) -> Result<Option<Nested<BatchStream<D>>>> {
        let Some(loaders) = self.val_loaders(world)? else {
            return Ok(None);
        };
        map_validation(&loaders, |_, loader| loader.epoch_stream(epoch)).map(Some)
    }

    fn val_spec(&self) -> Result<&BatchSpec> {
        self.config
            .val
            .as_ref()
            .ok_or_else(|| Error::config("No validation batch spec configured"))
    }
}

fn build_loader<D: Dataset + ?Sized>(
    dataset: Arc<D>,
    world: &WorldContext,
    options: LoaderOptions,
) -> Result<DataLoader<D>> {
    let sampler = shard_sampler(dataset.len(), world, options.shuffle, options.seed);
    DataLoader::new(dataset, sampler, options)
}
