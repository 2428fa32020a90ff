//! Cost functional for strong-constraint 4D-Var.
//!
//! The data-misfit term compares a simulated trajectory against the
//! observation sequence; mask-weighting makes unobserved entries
//! contribute exactly zero. An optional additive cost contributor (the
//! smoothness regularizer) is summed into the total objective.

use std::fmt;

use burn::prelude::*;

use crate::error::AssimError;
use crate::grid::Grid;
use crate::model::{SweModel, SweState};
use crate::obs::Observations;
use crate::operators::{divergence, grad_x, grad_y};

/// Sum of squared, mask-weighted residuals between a simulated trajectory
/// and the observations.
///
/// `trajectory` is the `[T + 1, 3, ny, nx]` stack produced by
/// `SweModel::rollout_stacked`. Entries where the mask is zero contribute
/// nothing, so an all-zero mask yields an exactly zero misfit.
pub fn misfit<B: Backend>(trajectory: &Tensor<B, 4>, obs: &Observations<B>) -> Tensor<B, 1> {
    debug_assert_eq!(trajectory.dims(), obs.values.dims());

    trajectory
        .clone()
        .sub(obs.values.clone())
        .mul(obs.mask.clone())
        .powf_scalar(2.0)
        .sum()
}

/// An additive term of the total cost, evaluated on the initial-state
/// estimate.
///
/// The optimizer accepts zero or one contributor and sums it into the
/// objective alongside the data misfit.
pub trait CostContributor<B: Backend>: fmt::Debug {
    /// Penalty value for the given initial-state estimate.
    fn penalty(&self, w0: &SweState<B>) -> Tensor<B, 1>;
}

/// Smoothness penalty `alpha·‖∇w₀‖² + beta·‖∇·w₀‖²` on the velocity field
/// of the estimated initial state.
///
/// Uses the same finite-difference stencils as the dynamics and the
/// evaluation metrics.
#[derive(Clone, Copy, Debug)]
pub struct SmoothnessPenalty {
    alpha: f64,
    beta: f64,
    grid: Grid,
}

impl SmoothnessPenalty {
    /// Create a smoothness penalty with the given coefficients.
    ///
    /// # Errors
    /// Fails if either coefficient is negative or non-finite.
    pub fn new(alpha: f64, beta: f64, grid: Grid) -> Result<Self, AssimError> {
        if !(alpha.is_finite() && alpha >= 0.0) || !(beta.is_finite() && beta >= 0.0) {
            return Err(AssimError::invalid_config(format!(
                "regularizer coefficients must be non-negative, got alpha={alpha}, beta={beta}"
            )));
        }
        Ok(Self { alpha, beta, grid })
    }

    /// Gradient-penalty coefficient.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Divergence-penalty coefficient.
    pub fn beta(&self) -> f64 {
        self.beta
    }
}

impl<B: Backend> CostContributor<B> for SmoothnessPenalty {
    fn penalty(&self, w0: &SweState<B>) -> Tensor<B, 1> {
        let (dx, dy) = (self.grid.dx, self.grid.dy);

        let grad_sq = grad_x(&w0.u, dx)
            .powf_scalar(2.0)
            .add(grad_y(&w0.u, dy).powf_scalar(2.0))
            .add(grad_x(&w0.v, dx).powf_scalar(2.0))
            .add(grad_y(&w0.v, dy).powf_scalar(2.0))
            .sum();
        let div_sq = divergence(&w0.u, &w0.v, dx, dy).powf_scalar(2.0).sum();

        grad_sq.mul_scalar(self.alpha).add(div_sq.mul_scalar(self.beta))
    }
}

/// Total objective of one assimilation fit.
///
/// Strong constraint: every evaluation re-simulates the full trajectory
/// from the current initial-state estimate before measuring the misfit.
pub struct CostFunction<'a, B: Backend> {
    model: &'a SweModel<B>,
    obs: &'a Observations<B>,
    contributor: Option<&'a dyn CostContributor<B>>,
}

impl<'a, B: Backend> CostFunction<'a, B> {
    /// Create the objective over the given model and observations.
    pub fn new(
        model: &'a SweModel<B>,
        obs: &'a Observations<B>,
        contributor: Option<&'a dyn CostContributor<B>>,
    ) -> Self {
        Self {
            model,
            obs,
            contributor,
        }
    }

    /// Evaluate the total cost for an initial-state estimate.
    ///
    /// Returns the scalar cost tensor; the caller backpropagates through
    /// it to reach the estimate's parameterization.
    pub fn evaluate(&self, w0: &SweState<B>) -> Tensor<B, 1> {
        let trajectory = self
            .model
            .rollout_stacked(w0.clone(), self.obs.window());
        let data_term = misfit(&trajectory, self.obs);

        match self.contributor {
            Some(contributor) => data_term.add(contributor.penalty(w0)),
            None => data_term,
        }
    }
}

impl<B: Backend> fmt::Debug for CostFunction<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostFunction")
            .field("window", &self.obs.window())
            .field("contributor", &self.contributor)
            .finish()
    }
}
