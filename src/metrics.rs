//! Evaluation metrics for recovered initial states.
//!
//! Endpoint error and angular error follow the optical-flow conventions,
//! computed on the velocity channels against ground truth. The smoothness
//! norms reuse the finite-difference operators shared with the dynamics
//! and the regularizer.

use burn::prelude::*;

use crate::backend::{tensor_to_scalar, tensor_to_vec};
use crate::error::AssimError;
use crate::grid::Grid;
use crate::model::SweState;
use crate::operators::{divergence, grad_x, grad_y, laplacian};

/// Method slots of the aggregate results table.
///
/// Index 0 is the ground-truth reference (zero-error row); 1–3 are the
/// assimilation variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// Ground truth (zero-error reference)
    Truth,
    /// Plain 4D-Var
    Plain,
    /// 4D-Var with smoothness regularization
    SmoothRegularized,
    /// Deep-prior 4D-Var
    DeepPrior,
}

impl Method {
    /// All methods in table order.
    pub const ALL: [Method; 4] = [
        Method::Truth,
        Method::Plain,
        Method::SmoothRegularized,
        Method::DeepPrior,
    ];

    /// Row index in the results table.
    pub fn index(self) -> usize {
        match self {
            Method::Truth => 0,
            Method::Plain => 1,
            Method::SmoothRegularized => 2,
            Method::DeepPrior => 3,
        }
    }

    /// Short name used in artifact file names.
    pub fn name(self) -> &'static str {
        match self {
            Method::Truth => "truth",
            Method::Plain => "plain",
            Method::SmoothRegularized => "regularized",
            Method::DeepPrior => "deep_prior",
        }
    }
}

/// The five evaluation metrics, in the fixed table order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metrics {
    /// Mean endpoint error of the velocity field
    pub epe: f64,
    /// Mean angular error of the velocity field (radians)
    pub angular: f64,
    /// L2 norm of the velocity gradient
    pub grad_norm: f64,
    /// L2 norm of the velocity divergence
    pub div_norm: f64,
    /// L2 norm of the velocity Laplacian
    pub lap_norm: f64,
}

impl Metrics {
    /// Number of metrics per (sample, method) cell.
    pub const COUNT: usize = 5;

    /// Score an estimate against ground truth.
    ///
    /// The error metrics compare the estimate's velocity field to the
    /// truth's; the smoothness norms describe the estimate alone.
    pub fn evaluate<B: Backend>(
        estimate: &SweState<B>,
        truth: &SweState<B>,
        grid: &Grid,
    ) -> Result<Self, AssimError>
    where
        f64: From<B::FloatElem>,
    {
        if estimate.dims() != truth.dims() {
            return Err(AssimError::dimension_mismatch(
                format!("{:?}", truth.dims()),
                format!("{:?}", estimate.dims()),
            ));
        }
        if estimate.dims() != (grid.ny, grid.nx) {
            return Err(AssimError::dimension_mismatch(
                format!("[{}, {}]", grid.ny, grid.nx),
                format!("{:?}", estimate.dims()),
            ));
        }
        Ok(Self {
            epe: endpoint_error(estimate, truth),
            angular: angular_error(estimate, truth),
            grad_norm: gradient_norm(estimate, grid),
            div_norm: divergence_norm(estimate, grid),
            lap_norm: laplacian_norm(estimate, grid),
        })
    }

    /// Metrics in the fixed order (EPE, angular, gradient, divergence,
    /// Laplacian).
    pub fn to_array(&self) -> [f64; Self::COUNT] {
        [
            self.epe,
            self.angular,
            self.grad_norm,
            self.div_norm,
            self.lap_norm,
        ]
    }

    /// Rebuild from the fixed array order.
    pub fn from_array(values: [f64; Self::COUNT]) -> Self {
        Self {
            epe: values[0],
            angular: values[1],
            grad_norm: values[2],
            div_norm: values[3],
            lap_norm: values[4],
        }
    }
}

/// Mean endpoint error between two velocity fields.
pub fn endpoint_error<B: Backend>(estimate: &SweState<B>, truth: &SweState<B>) -> f64
where
    f64: From<B::FloatElem>,
{
    let du = estimate.u.clone().sub(truth.u.clone());
    let dv = estimate.v.clone().sub(truth.v.clone());
    let epe = du
        .powf_scalar(2.0)
        .add(dv.powf_scalar(2.0))
        .sqrt()
        .mean();
    tensor_to_scalar(&epe)
}

/// Mean angular error (radians) between two velocity fields.
///
/// Uses the homogeneous (u, v, 1) convention from the optical-flow
/// literature, so the error is well-defined where the flow vanishes.
pub fn angular_error<B: Backend>(estimate: &SweState<B>, truth: &SweState<B>) -> f64
where
    f64: From<B::FloatElem>,
{
    let ue = tensor_to_vec(&estimate.u);
    let ve = tensor_to_vec(&estimate.v);
    let ut = tensor_to_vec(&truth.u);
    let vt = tensor_to_vec(&truth.v);

    let mut total = 0.0;
    for i in 0..ue.len() {
        let dot = 1.0 + ue[i] * ut[i] + ve[i] * vt[i];
        let norm = ((1.0 + ue[i] * ue[i] + ve[i] * ve[i])
            * (1.0 + ut[i] * ut[i] + vt[i] * vt[i]))
            .sqrt();
        total += (dot / norm).clamp(-1.0, 1.0).acos();
    }
    total / ue.len() as f64
}

/// L2 norm of the spatial gradient of the velocity field.
pub fn gradient_norm<B: Backend>(state: &SweState<B>, grid: &Grid) -> f64
where
    f64: From<B::FloatElem>,
{
    let sum = grad_x(&state.u, grid.dx)
        .powf_scalar(2.0)
        .add(grad_y(&state.u, grid.dy).powf_scalar(2.0))
        .add(grad_x(&state.v, grid.dx).powf_scalar(2.0))
        .add(grad_y(&state.v, grid.dy).powf_scalar(2.0))
        .sum();
    tensor_to_scalar(&sum).sqrt()
}

/// L2 norm of the divergence of the velocity field.
pub fn divergence_norm<B: Backend>(state: &SweState<B>, grid: &Grid) -> f64
where
    f64: From<B::FloatElem>,
{
    let sum = divergence(&state.u, &state.v, grid.dx, grid.dy)
        .powf_scalar(2.0)
        .sum();
    tensor_to_scalar(&sum).sqrt()
}

/// L2 norm of the Laplacian of the velocity field.
pub fn laplacian_norm<B: Backend>(state: &SweState<B>, grid: &Grid) -> f64
where
    f64: From<B::FloatElem>,
{
    let sum = laplacian(&state.u, grid.dx, grid.dy)
        .powf_scalar(2.0)
        .add(laplacian(&state.v, grid.dx, grid.dy).powf_scalar(2.0))
        .sum();
    tensor_to_scalar(&sum).sqrt()
}

/// Aggregate results array of shape `(n_samples, 4 methods, 5 metrics)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultsTable {
    n_samples: usize,
    data: Vec<f64>,
}

impl ResultsTable {
    /// Create a zero-filled table for `n_samples` samples.
    pub fn new(n_samples: usize) -> Self {
        Self {
            n_samples,
            data: vec![0.0; n_samples * Method::ALL.len() * Metrics::COUNT],
        }
    }

    /// Rebuild a table from its flat row-major data.
    pub fn from_flat(n_samples: usize, data: Vec<f64>) -> Result<Self, AssimError> {
        let expected = n_samples * Method::ALL.len() * Metrics::COUNT;
        if data.len() != expected {
            return Err(AssimError::dimension_mismatch(
                format!("{expected}"),
                format!("{}", data.len()),
            ));
        }
        Ok(Self { n_samples, data })
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Flat row-major view of the table.
    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }

    fn offset(&self, sample: usize, method: Method) -> usize {
        (sample * Method::ALL.len() + method.index()) * Metrics::COUNT
    }

    /// Store the metrics for one (sample, method) cell.
    pub fn set(&mut self, sample: usize, method: Method, metrics: &Metrics) {
        let at = self.offset(sample, method);
        self.data[at..at + Metrics::COUNT].copy_from_slice(&metrics.to_array());
    }

    /// Read back the metrics for one (sample, method) cell.
    pub fn get(&self, sample: usize, method: Method) -> Metrics {
        let at = self.offset(sample, method);
        let mut values = [0.0; Metrics::COUNT];
        values.copy_from_slice(&self.data[at..at + Metrics::COUNT]);
        Metrics::from_array(values)
    }

    /// Mean of each metric over all samples for one method.
    pub fn mean(&self, method: Method) -> Metrics {
        let mut acc = [0.0; Metrics::COUNT];
        for sample in 0..self.n_samples {
            let values = self.get(sample, method).to_array();
            for (a, v) in acc.iter_mut().zip(values.iter()) {
                *a += v;
            }
        }
        for a in acc.iter_mut() {
            *a /= self.n_samples.max(1) as f64;
        }
        Metrics::from_array(acc)
    }
}
