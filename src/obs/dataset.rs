//! Synthetic dataset generation.
//!
//! Draws independent initial conditions, simulates their trajectories,
//! extracts noisy partial observations, and persists the per-sample
//! artifacts as numbered files. Each sample derives its own random
//! stream from the dataset seed, so the dataset is bit-identical for a
//! fixed seed regardless of sequential or parallel generation.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::tensor_from_vec;
use crate::error::AssimError;
use crate::io::{write_stack_file, write_state_file, FieldFileError};
use crate::metrics::Method;
use crate::model::{SweModel, SweState};
use crate::obs::{observe, ObsConfig};
use crate::operators::{grad_x, grad_y};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Initial-condition distribution: random Gaussian height bumps with a
/// rotational flow derived from the height field.
#[derive(Clone, Copy, Debug)]
pub struct IcConfig {
    /// Number of superposed height bumps
    pub n_bumps: usize,
    /// Maximum bump amplitude (m)
    pub amplitude: f64,
    /// Base bump radius in grid cells
    pub width: f64,
    /// Streamfunction coefficient linking height to velocity
    pub flow_scale: f64,
}

impl IcConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), AssimError> {
        if self.n_bumps == 0 {
            return Err(AssimError::invalid_config(
                "initial condition needs at least one bump",
            ));
        }
        if !(self.amplitude.is_finite() && self.amplitude > 0.0) {
            return Err(AssimError::invalid_config(format!(
                "bump amplitude must be positive, got {}",
                self.amplitude
            )));
        }
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(AssimError::invalid_config(format!(
                "bump width must be positive, got {}",
                self.width
            )));
        }
        if !(self.flow_scale.is_finite() && self.flow_scale >= 0.0) {
            return Err(AssimError::invalid_config(format!(
                "flow scale must be non-negative, got {}",
                self.flow_scale
            )));
        }
        Ok(())
    }
}

impl Default for IcConfig {
    fn default() -> Self {
        Self {
            n_bumps: 3,
            amplitude: 0.05,
            width: 4.0,
            flow_scale: 10.0,
        }
    }
}

/// Draw a random initial state.
///
/// Height is a superposition of Gaussian bumps with random centers,
/// signs, and radii; the velocity field is the rotational
/// (divergence-free) flow with streamfunction `flow_scale · η`,
/// i.e. u = -s ∂η/∂y, v = s ∂η/∂x. With `flow_scale = 0` the fluid
/// starts at rest.
pub fn sample_initial_state<B: Backend>(
    model: &SweModel<B>,
    config: &IcConfig,
    rng: &mut StdRng,
) -> Result<SweState<B>, AssimError>
where
    B::FloatElem: From<f64>,
{
    config.validate()?;
    let grid = model.grid();

    let mut eta = vec![0.0; grid.n_points()];
    for _ in 0..config.n_bumps {
        let cx = rng.gen::<f64>() * grid.nx as f64;
        let cy = rng.gen::<f64>() * grid.ny as f64;
        let sign = if rng.gen::<f64>() < 0.5 { -1.0 } else { 1.0 };
        let amplitude = sign * config.amplitude * (0.5 + 0.5 * rng.gen::<f64>());
        let radius = config.width * (0.75 + 0.5 * rng.gen::<f64>());

        for j in 0..grid.ny {
            for i in 0..grid.nx {
                let dx = i as f64 - cx;
                let dy = j as f64 - cy;
                eta[j * grid.nx + i] +=
                    amplitude * (-(dx * dx + dy * dy) / (2.0 * radius * radius)).exp();
            }
        }
    }

    let eta = tensor_from_vec::<B, 2>(eta, grid.field_shape(), model.device());

    let u = grad_y(&eta, grid.dy).mul_scalar(-config.flow_scale);
    let v = grad_x(&eta, grid.dx).mul_scalar(config.flow_scale);

    SweState::from_fields(eta, u, v)
}

/// Configuration of a dataset generation run.
#[derive(Clone, Copy, Debug)]
pub struct DatasetConfig {
    /// Number of independent samples
    pub n_samples: usize,
    /// Assimilation window length T (simulator steps)
    pub window: usize,
    /// Observation operator settings
    pub obs: ObsConfig,
    /// Initial-condition distribution
    pub ic: IcConfig,
    /// Seed of the dataset; sample `i` uses the stream `seed + i`
    pub seed: u64,
}

impl DatasetConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), AssimError> {
        if self.n_samples == 0 {
            return Err(AssimError::invalid_config("dataset needs at least one sample"));
        }
        if self.window == 0 {
            return Err(AssimError::invalid_config(
                "assimilation window must cover at least one step",
            ));
        }
        self.obs.validate()?;
        self.ic.validate()
    }
}

/// Path of a sample's true initial condition.
pub fn truth_path(dir: &Path, sample: usize) -> PathBuf {
    dir.join(format!("sample_{sample:04}_truth.dat"))
}

/// Path of a sample's true trajectory.
pub fn trajectory_path(dir: &Path, sample: usize) -> PathBuf {
    dir.join(format!("sample_{sample:04}_traj.dat"))
}

/// Path of a sample's observation values.
pub fn obs_path(dir: &Path, sample: usize) -> PathBuf {
    dir.join(format!("sample_{sample:04}_obs.dat"))
}

/// Path of a sample's observation mask.
pub fn mask_path(dir: &Path, sample: usize) -> PathBuf {
    dir.join(format!("sample_{sample:04}_mask.dat"))
}

/// Path of a sample's recovered initial-state estimate for one method.
pub fn estimate_path(dir: &Path, sample: usize, method: Method) -> PathBuf {
    dir.join(format!("sample_{sample:04}_{}.dat", method.name()))
}

fn generate_sample<B: Backend>(
    model: &SweModel<B>,
    config: &DatasetConfig,
    out_dir: &Path,
    sample: usize,
) -> Result<(), AssimError>
where
    B::FloatElem: From<f64>,
    f64: From<B::FloatElem>,
{
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(sample as u64));

    let truth = sample_initial_state(model, &config.ic, &mut rng)?;
    let (trajectory, obs) = observe(model, &truth, config.window, &config.obs, &mut rng)?;

    let stacked: Tensor<B, 4> =
        Tensor::stack(trajectory.iter().map(|s| s.to_channels()).collect(), 0);

    write_state_file(&truth_path(out_dir, sample), &truth)?;
    write_stack_file(&trajectory_path(out_dir, sample), &stacked)?;
    write_stack_file(&obs_path(out_dir, sample), &obs.values)?;
    write_stack_file(&mask_path(out_dir, sample), &obs.mask)?;
    Ok(())
}

/// Generate `config.n_samples` independent samples into `out_dir`.
///
/// Persists `(initial condition, observation, mask)` per sample as
/// numbered artifacts. Deterministic: the same seed produces a
/// bit-identical dataset.
pub fn generate<B: Backend>(
    model: &SweModel<B>,
    config: &DatasetConfig,
    out_dir: &Path,
) -> Result<(), AssimError>
where
    B::FloatElem: From<f64>,
    f64: From<B::FloatElem>,
{
    config.validate()?;
    fs::create_dir_all(out_dir).map_err(FieldFileError::Io)?;

    #[cfg(feature = "parallel")]
    {
        (0..config.n_samples)
            .into_par_iter()
            .try_for_each(|sample| generate_sample(model, config, out_dir, sample))?;
    }

    #[cfg(not(feature = "parallel"))]
    {
        for sample in 0..config.n_samples {
            generate_sample(model, config, out_dir, sample)?;
        }
    }

    info!(
        "dataset: wrote {} samples to {}",
        config.n_samples,
        out_dir.display()
    );
    Ok(())
}

#[cfg(test)]
#[cfg(feature = "burn-ndarray")]
mod tests {
    use super::*;
    use crate::grid::{Grid, SwePhysics};
    use std::path::PathBuf;

    type B = burn_ndarray::NdArray<f64>;

    fn device() -> burn_ndarray::NdArrayDevice {
        burn_ndarray::NdArrayDevice::Cpu
    }

    fn model() -> SweModel<B> {
        let grid = Grid::new(8, 8, 1.0, 1.0).unwrap();
        SweModel::new(grid, SwePhysics::default(), 0.1, &device()).unwrap()
    }

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("swevar_dataset_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_initial_state_is_smooth_and_balanced() {
        let model = model();
        let mut rng = StdRng::seed_from_u64(9);
        let state = sample_initial_state(&model, &IcConfig::default(), &mut rng).unwrap();

        assert!(state.is_valid());
        // The streamfunction flow is non-trivial for the default config
        let speed: f64 = crate::backend::tensor_to_vec(&state.u)
            .iter()
            .map(|x| x.abs())
            .sum();
        assert!(speed > 0.0);

        // Streamfunction flow is divergence-free away from the boundary
        let div = crate::metrics::divergence_norm(&state, model.grid());
        let grad = crate::metrics::gradient_norm(&state, model.grid());
        assert!(div < grad, "flow should be nearly divergence-free");
    }

    #[test]
    fn test_sample_determinism() {
        let model = model();
        let mut rng_a = StdRng::seed_from_u64(4);
        let mut rng_b = StdRng::seed_from_u64(4);

        let a = sample_initial_state(&model, &IcConfig::default(), &mut rng_a).unwrap();
        let b = sample_initial_state(&model, &IcConfig::default(), &mut rng_b).unwrap();
        assert_eq!(a.to_flat_vec(), b.to_flat_vec());
    }

    #[test]
    fn test_generate_writes_numbered_artifacts() {
        let model = model();
        let dir = temp_dir("artifacts");
        let config = DatasetConfig {
            n_samples: 2,
            window: 4,
            obs: ObsConfig::default(),
            ic: IcConfig::default(),
            seed: 17,
        };

        generate(&model, &config, &dir).unwrap();
        for sample in 0..2 {
            assert!(truth_path(&dir, sample).exists());
            assert!(trajectory_path(&dir, sample).exists());
            assert!(obs_path(&dir, sample).exists());
            assert!(mask_path(&dir, sample).exists());
        }
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_generate_bit_identical_under_seed() {
        let model = model();
        let config = DatasetConfig {
            n_samples: 2,
            window: 3,
            obs: ObsConfig {
                subsample: 2,
                sigma: 0.05,
                density: 0.8,
                ..Default::default()
            },
            ic: IcConfig::default(),
            seed: 23,
        };

        let dir_a = temp_dir("seed_a");
        let dir_b = temp_dir("seed_b");
        generate(&model, &config, &dir_a).unwrap();
        generate(&model, &config, &dir_b).unwrap();

        for sample in 0..config.n_samples {
            for (a, b) in [
                (truth_path(&dir_a, sample), truth_path(&dir_b, sample)),
                (obs_path(&dir_a, sample), obs_path(&dir_b, sample)),
                (mask_path(&dir_a, sample), mask_path(&dir_b, sample)),
            ] {
                let bytes_a = fs::read(&a).unwrap();
                let bytes_b = fs::read(&b).unwrap();
                assert_eq!(bytes_a, bytes_b, "artifact differs: {a:?}");
            }
        }

        fs::remove_dir_all(&dir_a).ok();
        fs::remove_dir_all(&dir_b).ok();
    }

    #[test]
    fn test_config_validation() {
        let config = DatasetConfig {
            n_samples: 0,
            window: 4,
            obs: ObsConfig::default(),
            ic: IcConfig::default(),
            seed: 0,
        };
        assert!(config.validate().is_err());
    }
}
