//! Description of the distributed run a worker belongs to

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// World size, rank and gradient accumulation for one training run.
///
/// Supplied by the orchestrator once the process group exists and never
/// mutated afterwards. Every stream-constructing call takes it explicitly.
/// Deserialization goes through [`WorldContext::new`], so a decoded context
/// is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WorldFields")]
pub struct WorldContext {
    world_size: usize,
    rank: usize,
    accumulation_steps: usize,
}

/// Unchecked wire form of [`WorldContext`]
#[derive(Deserialize)]
struct WorldFields {
    world_size: usize,
    rank: usize,
    accumulation_steps: usize,
}

impl TryFrom<WorldFields> for WorldContext {
    type Error = Error;

    fn try_from(fields: WorldFields) -> Result<Self> {
        Self::new(fields.world_size, fields.rank, fields.accumulation_steps)
    }
}

impl WorldContext {
    /// Create a validated world context
    pub fn new(world_size: usize, rank: usize, accumulation_steps: usize) -> Result<Self> {
        if world_size == 0 {
            return Err(Error::config("World size must be greater than 0"));
        }
        if rank >= world_size {
            return Err(Error::config(format!(
                "Rank {} is outside a world of size {}",
                rank, world_size
            )));
        }
        if accumulation_steps == 0 {
            return Err(Error::config(
                "Gradient accumulation steps must be greater than 0",
            ));
        }
        if world_size.checked_mul(accumulation_steps).is_none() {
            return Err(Error::config(format!(
                "world_size ({}) * accumulation_steps ({}) overflows",
                world_size, accumulation_steps
            )));
        }

        Ok(Self {
            world_size,
            rank,
            accumulation_steps,
        })
    }

    /// Single worker, no accumulation
    pub fn single() -> Self {
        Self {
            world_size: 1,
            rank: 0,
            accumulation_steps: 1,
        }
    }

    /// Same world seen from another rank
    pub fn with_rank(&self, rank: usize) -> Result<Self> {
        Self::new(self.world_size, rank, self.accumulation_steps)
    }

    /// Get the number of workers
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Get this worker's rank
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Get the gradient accumulation steps
    pub fn accumulation_steps(&self) -> usize {
        self.accumulation_steps
    }

    /// Whether the run spans more than one worker
    pub fn is_distributed(&self) -> bool {
        self.world_size > 1
    }

    /// Number of micro-batches folded into one optimizer step across the world.
    ///
    /// Never overflows: [`WorldContext::new`] rejects worlds where it would.
    pub fn micro_batch_divisor(&self) -> usize {
        self.world_size * self.accumulation_steps
    }
}

impl Default for WorldContext {
    fn default() -> Self {
        Self::single()
    }
}
