//! Strong-constraint 4D-Var over the initial state directly.
//!
//! The unknown initial state is a free tensor. Each iteration rolls the
//! current estimate forward through the assimilation window, evaluates
//! misfit (plus the optional smoothness contributor), backpropagates
//! through the rollout to get the gradient with respect to the initial
//! state, and takes a quasi-Newton line-search step.

use log::info;

use crate::assim::cost::{CostContributor, CostFunction};
use crate::assim::lbfgs::{self, LbfgsConfig};
use crate::assim::FitOutcome;
use crate::backend::{tensor_from_vec_1d, tensor_to_scalar, tensor_to_vec, AssimBackend};
use crate::error::AssimError;
use crate::model::{SweModel, SweState};
use crate::obs::Observations;

/// State-space 4D-Var optimizer.
///
/// Covers both the plain and the regularized variants: the only
/// difference is the presence of a cost contributor.
#[derive(Debug)]
pub struct Var4d<B: AssimBackend> {
    model: SweModel<B>,
    config: LbfgsConfig,
    contributor: Option<Box<dyn CostContributor<B>>>,
    first_guess: Option<SweState<B>>,
}

impl<B: AssimBackend> Var4d<B>
where
    B::FloatElem: From<f64>,
    f64: From<B::FloatElem>,
{
    /// Plain 4D-Var: data misfit only.
    pub fn new(model: SweModel<B>, config: LbfgsConfig) -> Result<Self, AssimError> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            contributor: None,
            first_guess: None,
        })
    }

    /// Regularized 4D-Var: misfit plus one additive cost contributor.
    pub fn with_penalty(
        model: SweModel<B>,
        contributor: impl CostContributor<B> + 'static,
        config: LbfgsConfig,
    ) -> Result<Self, AssimError> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            contributor: Some(Box::new(contributor)),
            first_guess: None,
        })
    }

    /// Replace the zero initialization with a prior guess.
    pub fn with_first_guess(mut self, guess: SweState<B>) -> Result<Self, AssimError> {
        let grid = self.model.grid();
        if guess.dims() != (grid.ny, grid.nx) {
            return Err(AssimError::dimension_mismatch(
                format!("[{}, {}]", grid.ny, grid.nx),
                format!("{:?}", guess.dims()),
            ));
        }
        self.first_guess = Some(guess);
        Ok(self)
    }

    /// The simulator this optimizer fits against.
    pub fn model(&self) -> &SweModel<B> {
        &self.model
    }

    /// Estimate the initial state that best explains the observations.
    ///
    /// Non-convergence within the iteration budget is not an error; the
    /// best iterate is returned. A NaN cost aborts with
    /// `AssimError::Diverged`.
    pub fn fit(&self, obs: &Observations<B>) -> Result<FitOutcome<B>, AssimError> {
        let grid = *self.model.grid();
        let dims = obs.values.dims();
        if dims[1] != 3 || dims[2] != grid.ny || dims[3] != grid.nx {
            return Err(AssimError::dimension_mismatch(
                format!("[_, 3, {}, {}]", grid.ny, grid.nx),
                format!("{:?}", dims),
            ));
        }

        let device = self.model.device().clone();
        let cost = CostFunction::new(&self.model, obs, self.contributor.as_deref());

        let x0 = match &self.first_guess {
            Some(guess) => guess.to_flat_vec(),
            None => vec![0.0; 3 * grid.n_points()],
        };

        let objective = |x: &[f64]| -> Result<(f64, Vec<f64>), AssimError> {
            let flat = tensor_from_vec_1d::<B>(x.to_vec(), &device).require_grad();
            let w0 = SweState::from_flat(flat.clone(), &grid)?;

            let total = cost.evaluate(&w0);
            let value = tensor_to_scalar(&total);

            let grads = total.backward();
            let grad = flat.grad(&grads).ok_or(AssimError::MissingGradient)?;

            Ok((value, tensor_to_vec(&grad)))
        };

        let outcome = lbfgs::minimize(&self.config, objective, x0)?;
        info!(
            "4d-var fit: {} iterations, cost {:.6e}, converged = {}",
            outcome.iterations, outcome.cost, outcome.converged
        );

        let initial_condition = SweState::from_flat_vec(&outcome.x, &grid, &device)?;
        Ok(FitOutcome {
            initial_condition,
            final_cost: outcome.cost,
            iterations: outcome.iterations,
            converged: outcome.converged,
        })
    }
}

#[cfg(test)]
#[cfg(feature = "burn-ndarray")]
mod tests {
    use super::*;
    use crate::grid::{Grid, SwePhysics};
    use crate::obs::{observe, ObsConfig};
    use burn::backend::Autodiff;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type B = Autodiff<burn_ndarray::NdArray<f64>>;

    fn device() -> burn_ndarray::NdArrayDevice {
        burn_ndarray::NdArrayDevice::Cpu
    }

    fn model() -> SweModel<B> {
        let grid = Grid::new(8, 8, 1.0, 1.0).unwrap();
        SweModel::new(grid, SwePhysics::default(), 0.1, &device()).unwrap()
    }

    fn truth_state(model: &SweModel<B>) -> SweState<B> {
        let grid = model.grid();
        let mut data = vec![0.0; 3 * grid.n_points()];
        for j in 0..grid.ny {
            for i in 0..grid.nx {
                let dx = i as f64 - 3.5;
                let dy = j as f64 - 3.5;
                data[j * grid.nx + i] = 0.05 * (-(dx * dx + dy * dy) / 6.0).exp();
            }
        }
        SweState::from_flat_vec(&data, grid, &device()).unwrap()
    }

    #[test]
    fn test_fit_reduces_cost_from_zero_guess() {
        let model = model();
        let truth = truth_state(&model);
        let config = ObsConfig {
            subsample: 1,
            sigma: 0.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let (_, obs) = observe(&model, &truth, 4, &config, &mut rng).unwrap();

        // Cost of the zero guess, for comparison
        let zero = SweState::zeros(model.grid(), &device());
        let cost = CostFunction::new(&model, &obs, None);
        let f_zero = tensor_to_scalar(&cost.evaluate(&zero));

        let var = Var4d::new(
            model,
            LbfgsConfig {
                max_iters: 60,
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = var.fit(&obs).unwrap();

        assert!(outcome.iterations > 0);
        assert!(
            outcome.final_cost < f_zero * 0.1,
            "cost barely improved: {} vs {}",
            outcome.final_cost,
            f_zero
        );
        assert!(outcome.initial_condition.is_valid());
    }

    #[test]
    fn test_fit_rejects_mismatched_observations() {
        let model = model();

        // Observations built on a different grid
        let other_grid = Grid::new(6, 6, 1.0, 1.0).unwrap();
        let other_model =
            SweModel::<B>::new(other_grid, SwePhysics::default(), 0.1, &device()).unwrap();
        let truth = SweState::zeros(&other_grid, &device());
        let mut rng = StdRng::seed_from_u64(0);
        let (_, obs) = observe(
            &other_model,
            &truth,
            3,
            &ObsConfig::default(),
            &mut rng,
        )
        .unwrap();

        let var = Var4d::new(model, LbfgsConfig::default()).unwrap();
        assert!(matches!(
            var.fit(&obs),
            Err(AssimError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_first_guess_shape_checked() {
        let model = model();
        let other_grid = Grid::new(5, 5, 1.0, 1.0).unwrap();
        let guess = SweState::zeros(&other_grid, &device());

        let var = Var4d::new(model, LbfgsConfig::default()).unwrap();
        assert!(var.with_first_guess(guess).is_err());
    }
}
