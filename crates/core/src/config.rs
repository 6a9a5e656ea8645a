//! Job-wide parallelism configuration.
//!
//! [`ParallelConfig`] is the immutable snapshot every process builds at job
//! start. Because each rank derives replica membership locally, all ranks
//! must hold an identical `ParallelConfig`; nothing here reads per-rank state
//! except [`RankIdentity`].
//!
//! # Environment Variables
//!
//! Follows the standard distributed launcher convention:
//! - `WORLD_SIZE`: total number of processes
//! - `LOCAL_WORLD_SIZE`: processes per host, used for host-feasibility checks
//! - `RANK`: global rank of this process
//! - `LOCAL_RANK`: rank on this host

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Degradation, Result};

/// Parallelism degrees plus the requested replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Total number of processes in the job.
    pub world_size: usize,
    /// Tensor-parallel degree.
    pub tensor_parallel_size: usize,
    /// Pipeline-parallel degree.
    pub pipeline_parallel_size: usize,
    /// Context-parallel degree.
    pub context_parallel_size: usize,
    /// Expert-parallel degree. Must divide the per-stage data-parallel span.
    pub expert_parallel_size: usize,
    /// Processes per host.
    pub local_world_size: usize,
    /// Requested number of redundant replicas per data-parallel group.
    pub replica_count: usize,
}

impl ParallelConfig {
    /// One process, no parallelism, one replica.
    pub fn single_process() -> Self {
        Self {
            world_size: 1,
            tensor_parallel_size: 1,
            pipeline_parallel_size: 1,
            context_parallel_size: 1,
            expert_parallel_size: 1,
            local_world_size: 1,
            replica_count: 1,
        }
    }

    /// Pure data parallelism over `world_size` ranks on a single host.
    pub fn data_parallel(world_size: usize) -> Self {
        Self {
            world_size,
            local_world_size: world_size,
            ..Self::single_process()
        }
    }

    /// Create a validated configuration with tensor and pipeline parallelism.
    ///
    /// Remaining fields default to 1, with every rank on a single host.
    pub fn new(
        world_size: usize,
        tensor_parallel_size: usize,
        pipeline_parallel_size: usize,
    ) -> Result<Self> {
        let cfg = Self {
            world_size,
            tensor_parallel_size,
            pipeline_parallel_size,
            local_world_size: world_size,
            ..Self::single_process()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_context_parallel(mut self, size: usize) -> Self {
        self.context_parallel_size = size;
        self
    }

    pub fn with_expert_parallel(mut self, size: usize) -> Self {
        self.expert_parallel_size = size;
        self
    }

    pub fn with_local_world_size(mut self, size: usize) -> Self {
        self.local_world_size = size;
        self
    }

    pub fn with_replica_count(mut self, count: usize) -> Self {
        self.replica_count = count;
        self
    }

    /// Check every size is positive and the sizes tile `world_size`.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("world_size", self.world_size),
            ("tensor_parallel_size", self.tensor_parallel_size),
            ("pipeline_parallel_size", self.pipeline_parallel_size),
            ("context_parallel_size", self.context_parallel_size),
            ("expert_parallel_size", self.expert_parallel_size),
            ("local_world_size", self.local_world_size),
            ("replica_count", self.replica_count),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(invalid(format!("{name} must be > 0")));
            }
        }

        let model_parallel = self.model_parallel_size();
        if self.world_size % model_parallel != 0 {
            return Err(invalid(format!(
                "world_size {} is not divisible by tp*pp*cp = {model_parallel}",
                self.world_size
            )));
        }

        let stage_span = self.ranks_per_pipeline_stage() / self.tensor_parallel_size;
        if stage_span % self.expert_parallel_size != 0 {
            return Err(invalid(format!(
                "expert_parallel_size {} does not divide dp*cp = {stage_span}",
                self.expert_parallel_size
            )));
        }
        Ok(())
    }

    /// `tp * pp * cp`.
    pub fn model_parallel_size(&self) -> usize {
        self.tensor_parallel_size * self.pipeline_parallel_size * self.context_parallel_size
    }

    /// Number of data-parallel replicas of the model.
    pub fn data_parallel_size(&self) -> usize {
        self.world_size / self.model_parallel_size()
    }

    /// Size of one pipeline stage's block of consecutive ranks.
    pub fn ranks_per_pipeline_stage(&self) -> usize {
        self.world_size / self.pipeline_parallel_size
    }

    /// Number of hosts, never less than one.
    pub fn num_hosts(&self) -> usize {
        (self.world_size / self.local_world_size.max(1)).max(1)
    }

    /// Replica count after the host-feasibility check.
    ///
    /// Each replica needs at least one host of its own. When that cannot be
    /// satisfied the count is coerced to 1 and the reason is returned.
    pub fn effective_replica_count(&self) -> (usize, Option<Degradation>) {
        let requested = self.replica_count.max(1);
        if requested == 1 {
            return (1, None);
        }
        let hosts = self.num_hosts();
        if hosts / requested < 1 {
            let degradation = Degradation::InsufficientHosts { requested, hosts };
            tracing::warn!(requested, hosts, "{degradation}");
            return (1, Some(degradation));
        }
        (requested, None)
    }

    /// Overlay `WORLD_SIZE` and `LOCAL_WORLD_SIZE` from the environment.
    ///
    /// Unset or unparsable variables leave the corresponding field untouched.
    pub fn from_env(base: Self) -> Self {
        let mut cfg = base;
        if let Some(world_size) = env_usize("WORLD_SIZE") {
            cfg.world_size = world_size;
        }
        if let Some(local_world_size) = env_usize("LOCAL_WORLD_SIZE") {
            cfg.local_world_size = local_world_size;
        }
        cfg
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self::single_process()
    }
}

/// This process's position in the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankIdentity {
    /// Global rank.
    pub rank: usize,
    /// Rank on this host.
    pub local_rank: usize,
}

impl RankIdentity {
    /// Read `RANK` and `LOCAL_RANK`, defaulting to rank 0.
    pub fn from_env() -> Self {
        let rank = env_usize("RANK").unwrap_or(0);
        let local_rank = env_usize("LOCAL_RANK").unwrap_or(rank);
        Self { rank, local_rank }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::InvalidParallelism { reason }
}
