//! Observation generation: noisy, subsampled measurements of simulated
//! trajectories, and synthetic dataset persistence.

pub mod dataset;

mod observations;

pub use dataset::{generate, sample_initial_state, DatasetConfig, IcConfig};
pub use observations::{observe, observed_count, ObsConfig, Observations};
