//! Configuration structures for batch planning
//!
//! A run configuration names the training dataset, optionally a nested
//! structure of validation datasets, and one [`BatchSpec`] per split. Files
//! are JSON or YAML; [`DataModuleConfig::load`] additionally layers
//! environment overrides on top through the `config` crate.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::data::nested::Nested;
use crate::error::{Error, Result};

/// Batch settings for one split, expressed globally (before splitting across workers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// Global batch size across all workers and accumulation steps
    pub batch_size: usize,

    /// Shuffle the data each epoch
    #[serde(default)]
    pub shuffle: bool,

    /// Seed for the per-epoch permutation
    #[serde(default)]
    pub seed: u64,

    /// Batches one worker sees per optimizer-visible epoch; `None` runs one full pass
    #[serde(default)]
    pub num_batches_per_epoch: Option<usize>,
}

impl BatchSpec {
    /// Validate the batch specification
    pub fn validate(&self, split: &str) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config(format!(
                "{} batch size must be greater than 0",
                split
            )));
        }
        if self.num_batches_per_epoch == Some(0) {
            return Err(Error::config(format!(
                "{} number of batches per epoch must be greater than 0",
                split
            )));
        }
        Ok(())
    }
}

impl Default for BatchSpec {
    fn default() -> Self {
        Self {
            batch_size: 256,
            shuffle: true,
            seed: 0,
            num_batches_per_epoch: Some(100),
        }
    }
}

/// Main data configuration for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModuleConfig {
    /// Name of the training dataset
    pub train_data: String,

    /// Training batch settings
    pub train: BatchSpec,

    /// Validation dataset names: a single name or arbitrarily nested lists of names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_data: Option<Value>,

    /// Validation batch settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<BatchSpec>,
}

impl DataModuleConfig {
    /// Load configuration from a file, JSON when the extension is `json`, YAML otherwise
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load a file and apply `PREFIX__SECTION__KEY` environment overrides.
    ///
    /// For example `BATCHFLOW__TRAIN__BATCH_SIZE=128` replaces
    /// `train.batch_size`.
    pub fn load(path: impl AsRef<Path>, env_prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {:?} (env prefix {})", path, env_prefix);

        let config: Self = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file using the same format rule as [`Self::from_file`]
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.train_data.trim().is_empty() {
            return Err(Error::config("Training dataset name must not be empty"));
        }
        self.train.validate("Training")?;

        if let Some(val) = &self.val {
            val.validate("Validation")?;
        }
        if let Some(structure) = self.validation_structure()? {
            if self.val.is_none() {
                return Err(Error::config(format!(
                    "{} validation datasets configured without a `val` batch spec",
                    structure.num_leaves()
                )));
            }
        }

        Ok(())
    }

    /// Parsed validation dataset names, if any are configured
    pub fn validation_structure(&self) -> Result<Option<Nested<String>>> {
        self.val_data
            .as_ref()
            .map(Nested::<String>::from_value)
            .transpose()
    }
}

impl Default for DataModuleConfig {
    fn default() -> Self {
        Self {
            train_data: "train".to_string(),
            train: BatchSpec::default(),
            val_data: None,
            val: None,
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}
