//! Noisy, subsampled observations of a trajectory.

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::backend::{tensor_from_vec, tensor_to_vec};
use crate::error::AssimError;
use crate::grid::Grid;
use crate::model::{SweModel, SweState};

/// Configuration of the observation operator.
#[derive(Clone, Copy, Debug)]
pub struct ObsConfig {
    /// Temporal subsampling stride: every `subsample`-th step is observed
    pub subsample: usize,
    /// Standard deviation of the injected Gaussian noise
    pub sigma: f64,
    /// Fraction of grid points observed at each retained step (spatial subsample)
    pub density: f64,
    /// Which of the (η, u, v) channels are observed
    pub channels: [bool; 3],
}

impl ObsConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), AssimError> {
        if self.subsample == 0 {
            return Err(AssimError::invalid_config(
                "observation subsample stride must be at least 1",
            ));
        }
        if !(self.sigma.is_finite() && self.sigma >= 0.0) {
            return Err(AssimError::invalid_config(format!(
                "observation noise sigma must be non-negative, got {}",
                self.sigma
            )));
        }
        if !(self.density > 0.0 && self.density <= 1.0) {
            return Err(AssimError::invalid_config(format!(
                "observation density must be in (0, 1], got {}",
                self.density
            )));
        }
        if !self.channels.iter().any(|&c| c) {
            return Err(AssimError::invalid_config(
                "at least one state channel must be observed",
            ));
        }
        Ok(())
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            subsample: 3,
            sigma: 0.05,
            density: 1.0,
            channels: [true, true, true],
        }
    }
}

/// An observation sequence aligned with a simulated trajectory.
///
/// `values` holds the noisy measurements and is zero wherever `mask` is
/// zero; `mask` is 1.0 exactly at the entries where synthetic noise was
/// injected — timesteps that are multiples of the subsample stride, grid
/// points retained by the density draw, channels selected for observation.
/// Both tensors have shape `[window + 1, 3, ny, nx]`.
#[derive(Clone, Debug)]
pub struct Observations<B: Backend> {
    /// Noisy measurements: [window + 1, 3, ny, nx]
    pub values: Tensor<B, 4>,

    /// Validity mask (1.0 observed, 0.0 missing): same shape as `values`
    pub mask: Tensor<B, 4>,
}

impl<B: Backend> Observations<B> {
    /// Build an observation sequence, checking shape consistency.
    pub fn new(values: Tensor<B, 4>, mask: Tensor<B, 4>, grid: &Grid) -> Result<Self, AssimError> {
        let dims = values.dims();
        if mask.dims() != dims {
            return Err(AssimError::dimension_mismatch(
                format!("{:?}", dims),
                format!("{:?}", mask.dims()),
            ));
        }
        let [steps, channels, ny, nx] = dims;
        if steps == 0 {
            return Err(AssimError::invalid_config(
                "observation sequence must cover at least one timestep",
            ));
        }
        if channels != 3 || ny != grid.ny || nx != grid.nx {
            return Err(AssimError::dimension_mismatch(
                format!("[_, 3, {}, {}]", grid.ny, grid.nx),
                format!("{:?}", dims),
            ));
        }
        Ok(Self { values, mask })
    }

    /// Length T of the assimilation window (number of simulator steps).
    pub fn window(&self) -> usize {
        self.values.dims()[0] - 1
    }
}

/// Simulate a trajectory from `truth_w0` and extract noisy partial
/// observations of it.
///
/// Rolls the true initial state forward `window` steps, retains every
/// `subsample`-th step, and injects Gaussian noise of standard deviation
/// `sigma` at the observed entries. Deterministic given the random source:
/// the same seed produces a bit-identical observation sequence.
pub fn observe<B: Backend>(
    model: &SweModel<B>,
    truth_w0: &SweState<B>,
    window: usize,
    config: &ObsConfig,
    rng: &mut StdRng,
) -> Result<(Vec<SweState<B>>, Observations<B>), AssimError>
where
    B::FloatElem: From<f64>,
    f64: From<B::FloatElem>,
{
    config.validate()?;
    if window == 0 {
        return Err(AssimError::invalid_config(
            "assimilation window must cover at least one step",
        ));
    }
    let grid = *model.grid();
    let (ny, nx) = truth_w0.dims();
    if (ny, nx) != (grid.ny, grid.nx) {
        return Err(AssimError::dimension_mismatch(
            format!("[{}, {}]", grid.ny, grid.nx),
            format!("[{}, {}]", ny, nx),
        ));
    }

    let noise = Normal::new(0.0, config.sigma)
        .map_err(|e| AssimError::invalid_config(format!("invalid noise distribution: {e}")))?;

    let trajectory = model.rollout(truth_w0.clone(), window);

    let n_points = grid.n_points();
    let frame = 3 * n_points;
    let mut values = vec![0.0; (window + 1) * frame];
    let mut mask = vec![0.0; (window + 1) * frame];

    for (t, state) in trajectory.iter().enumerate() {
        if t % config.subsample != 0 {
            continue;
        }
        let truth = state.to_flat_vec();
        for p in 0..n_points {
            if config.density < 1.0 && rng.gen::<f64>() >= config.density {
                continue;
            }
            for c in 0..3 {
                if !config.channels[c] {
                    continue;
                }
                let idx = t * frame + c * n_points + p;
                values[idx] = truth[c * n_points + p] + noise.sample(rng);
                mask[idx] = 1.0;
            }
        }
    }

    let shape = [window + 1, 3, grid.ny, grid.nx];
    let values = tensor_from_vec::<B, 4>(values, shape, model.device());
    let mask = tensor_from_vec::<B, 4>(mask, shape, model.device());
    let obs = Observations::new(values, mask, &grid)?;

    Ok((trajectory, obs))
}

/// Count of observed entries in a mask (diagnostic).
pub fn observed_count<B: Backend>(obs: &Observations<B>) -> usize
where
    f64: From<B::FloatElem>,
{
    tensor_to_vec(&obs.mask).iter().filter(|&&m| m > 0.5).count()
}
