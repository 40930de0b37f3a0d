//! Command line option parsing.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use meshstream::math::FreeSize;
use meshstream::{LevelOfDetail, MeshSettings, StreamConfig};

use crate::logging::LoggingArgs;
use crate::scanner::Churn;

#[derive(Clone, Debug, Parser)]
#[command(about, version)]
pub(crate) struct SimArgs {
    /// Number of ticks to run for.
    #[arg(long, default_value_t = 200)]
    pub ticks: usize,

    /// Wall-clock time between ticks, in milliseconds.
    #[arg(long = "tick-length", value_name = "MS", default_value_t = 16)]
    pub tick_length_ms: u64,

    /// Radius of the circle the viewer walks around, in meters.
    #[arg(long, default_value_t = 8.0)]
    pub radius: f64,

    /// Edge length of the cubical discovery volume around the viewer, in meters.
    #[arg(long, default_value_t = 10.0)]
    pub extent: f64,

    /// Edge length of each block, in meters.
    #[arg(long = "block-size", default_value_t = 2.0)]
    pub block_size: f64,

    /// Maximum number of generation requests outstanding at once.
    #[arg(long = "max-batches", default_value_t = 2)]
    pub max_concurrent_batches: usize,

    /// Maximum number of blocks in one generation request.
    #[arg(long = "max-blocks", default_value_t = 16)]
    pub max_blocks_per_batch: usize,

    /// Level of detail to mesh at.
    #[arg(long = "lod", value_enum, default_value_t = LodArg::Medium)]
    pub level_of_detail: LodArg,

    /// Time between queries of the scanning service, in milliseconds.
    #[arg(long = "poll-interval", value_name = "MS", default_value_t = 250)]
    pub poll_interval_ms: u64,

    /// Time the simulated generator takes per request, in milliseconds.
    #[arg(long = "latency", value_name = "MS", default_value_t = 30)]
    pub latency_ms: u64,

    /// Probability, per poll, that a known block is reported as updated.
    #[arg(long = "update-rate", default_value_t = 0.02)]
    pub update_rate: f64,

    /// Probability, per poll, that a known block is reported as deleted.
    #[arg(long = "delete-rate", default_value_t = 0.005)]
    pub delete_rate: f64,

    /// Seed for the simulated scanning service's random changes.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Tick at which to switch to the next level of detail, invalidating all meshes.
    #[arg(long = "change-settings-at", value_name = "TICK")]
    pub change_settings_at: Option<usize>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

impl SimArgs {
    pub fn tick_length(&self) -> Duration {
        Duration::from_millis(self.tick_length_ms)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn churn(&self) -> Result<Churn, anyhow::Error> {
        for (name, p) in [
            ("--update-rate", self.update_rate),
            ("--delete-rate", self.delete_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("{name} must be between 0 and 1, not {p}");
            }
        }
        Ok(Churn {
            update: self.update_rate,
            delete: self.delete_rate,
        })
    }

    pub fn stream_config(&self) -> StreamConfig {
        let mut config = StreamConfig::default();
        config.poll_interval = Duration::from_millis(self.poll_interval_ms);
        config.max_concurrent_batches = self.max_concurrent_batches;
        config.max_blocks_per_batch = self.max_blocks_per_batch;
        config.bounds_extents = FreeSize::splat(self.extent);
        config.repair()
    }

    pub fn mesh_settings(&self) -> MeshSettings {
        let mut settings = MeshSettings::default();
        settings.level_of_detail = self.level_of_detail.into();
        settings
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum LodArg {
    Minimum,
    Medium,
    Maximum,
}

impl From<LodArg> for LevelOfDetail {
    fn from(value: LodArg) -> Self {
        match value {
            LodArg::Minimum => LevelOfDetail::Minimum,
            LodArg::Medium => LevelOfDetail::Medium,
            LodArg::Maximum => LevelOfDetail::Maximum,
        }
    }
}

/// Returns the level of detail the `--change-settings-at` option switches to.
pub(crate) fn next_level_of_detail(lod: LevelOfDetail) -> LevelOfDetail {
    match lod {
        LevelOfDetail::Minimum => LevelOfDetail::Medium,
        LevelOfDetail::Medium => LevelOfDetail::Maximum,
        LevelOfDetail::Maximum => LevelOfDetail::Minimum,
    }
}
