//! Shallow-water state storage.
//!
//! A state is one time instant of the physical system: a 3-channel 2D
//! field (height deviation η, velocity u, velocity v) over the fixed grid.
//! States are immutable once produced; the simulator creates a new state
//! from a previous one.

use burn::prelude::*;

use crate::backend::{tensor_from_vec, tensor_to_vec};
use crate::error::AssimError;
use crate::grid::Grid;

/// One time instant of the shallow-water system.
///
/// Stores the three channels as separate `[ny, nx]` tensors. The packed
/// `[3, ny, nx]` representation (see [`SweState::to_channels`]) is used
/// for trajectory stacking and as the generator output layout.
#[derive(Clone, Debug)]
pub struct SweState<B: Backend> {
    /// Height deviation from the mean surface: [ny, nx]
    pub eta: Tensor<B, 2>,

    /// x-velocity: [ny, nx]
    pub u: Tensor<B, 2>,

    /// y-velocity: [ny, nx]
    pub v: Tensor<B, 2>,
}

impl<B: Backend> SweState<B> {
    /// Create a state at rest (all channels zero).
    pub fn zeros(grid: &Grid, device: &B::Device) -> Self {
        let shape = grid.field_shape();
        Self {
            eta: Tensor::zeros(shape, device),
            u: Tensor::zeros(shape, device),
            v: Tensor::zeros(shape, device),
        }
    }

    /// Build a state from three channel tensors, checking shape consistency.
    pub fn from_fields(
        eta: Tensor<B, 2>,
        u: Tensor<B, 2>,
        v: Tensor<B, 2>,
    ) -> Result<Self, AssimError> {
        let shape = eta.dims();
        if u.dims() != shape || v.dims() != shape {
            return Err(AssimError::dimension_mismatch(
                format!("{:?} for all channels", shape),
                format!("u {:?}, v {:?}", u.dims(), v.dims()),
            ));
        }
        Ok(Self { eta, u, v })
    }

    /// Pack the channels into a single `[3, ny, nx]` tensor.
    pub fn to_channels(&self) -> Tensor<B, 3> {
        let stacked: Tensor<B, 3> = Tensor::stack(
            vec![self.eta.clone(), self.u.clone(), self.v.clone()],
            0,
        );
        stacked
    }

    /// Unpack a `[3, ny, nx]` tensor into a state.
    pub fn from_channels(channels: Tensor<B, 3>, grid: &Grid) -> Result<Self, AssimError> {
        let dims = channels.dims();
        if dims != grid.state_shape() {
            return Err(AssimError::dimension_mismatch(
                format!("{:?}", grid.state_shape()),
                format!("{:?}", dims),
            ));
        }
        let [_, ny, nx] = dims;
        let eta: Tensor<B, 2> = channels.clone().slice([0..1, 0..ny, 0..nx]).squeeze::<2>(0);
        let u: Tensor<B, 2> = channels.clone().slice([1..2, 0..ny, 0..nx]).squeeze::<2>(0);
        let v: Tensor<B, 2> = channels.slice([2..3, 0..ny, 0..nx]).squeeze::<2>(0);
        Ok(Self { eta, u, v })
    }

    /// View a flat `[3 * ny * nx]` parameter tensor as a state.
    ///
    /// Used by the state-space optimizer: the flat tensor is the leaf the
    /// gradient is taken against, and this reshape/slice view keeps the
    /// autodiff graph connected.
    pub fn from_flat(flat: Tensor<B, 1>, grid: &Grid) -> Result<Self, AssimError> {
        let n = flat.dims()[0];
        if n != 3 * grid.n_points() {
            return Err(AssimError::dimension_mismatch(
                format!("{}", 3 * grid.n_points()),
                format!("{}", n),
            ));
        }
        let channels: Tensor<B, 3> = flat.reshape(grid.state_shape());
        Self::from_channels(channels, grid)
    }

    /// Grid dimensions `(ny, nx)` of this state.
    pub fn dims(&self) -> (usize, usize) {
        let [ny, nx] = self.eta.dims();
        (ny, nx)
    }

    /// Detach all channels from the autodiff graph.
    pub fn detach(self) -> Self {
        Self {
            eta: self.eta.detach(),
            u: self.u.detach(),
            v: self.v.detach(),
        }
    }

    /// Check that no channel contains NaN values.
    pub fn is_valid(&self) -> bool {
        let eta_ok = self.eta.clone().is_nan().bool_not().all();
        let u_ok = self.u.clone().is_nan().bool_not().all();
        let v_ok = self.v.clone().is_nan().bool_not().all();

        eta_ok.to_data().to_vec::<bool>().unwrap()[0]
            && u_ok.to_data().to_vec::<bool>().unwrap()[0]
            && v_ok.to_data().to_vec::<bool>().unwrap()[0]
    }
}

impl<B: Backend> SweState<B>
where
    B::FloatElem: From<f64>,
    f64: From<B::FloatElem>,
{
    /// Download the state as a flat Vec<f64> in channel order (η, u, v).
    pub fn to_flat_vec(&self) -> Vec<f64> {
        let mut out = tensor_to_vec(&self.eta);
        out.extend(tensor_to_vec(&self.u));
        out.extend(tensor_to_vec(&self.v));
        out
    }

    /// Upload a flat Vec<f64> in channel order (η, u, v) as a state.
    pub fn from_flat_vec(
        data: &[f64],
        grid: &Grid,
        device: &B::Device,
    ) -> Result<Self, AssimError> {
        if data.len() != 3 * grid.n_points() {
            return Err(AssimError::dimension_mismatch(
                format!("{}", 3 * grid.n_points()),
                format!("{}", data.len()),
            ));
        }
        let channels = tensor_from_vec::<B, 3>(data.to_vec(), grid.state_shape(), device);
        Self::from_channels(channels, grid)
    }
}

#[cfg(test)]
#[cfg(feature = "burn-ndarray")]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f64>;

    fn device() -> burn_ndarray::NdArrayDevice {
        burn_ndarray::NdArrayDevice::Cpu
    }

    fn grid() -> Grid {
        Grid::new(4, 3, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_channels_roundtrip() {
        let grid = grid();
        let data: Vec<f64> = (0..3 * grid.n_points()).map(|i| i as f64).collect();
        let state = SweState::<B>::from_flat_vec(&data, &grid, &device()).unwrap();

        let packed = state.to_channels();
        assert_eq!(packed.dims(), grid.state_shape());

        let back = SweState::from_channels(packed, &grid).unwrap();
        assert_eq!(back.to_flat_vec(), data);
    }

    #[test]
    fn test_flat_vec_rejects_wrong_length() {
        let grid = grid();
        let result = SweState::<B>::from_flat_vec(&[1.0, 2.0], &grid, &device());
        assert!(result.is_err());
    }

    #[test]
    fn test_from_fields_rejects_mismatched_shapes() {
        let eta = Tensor::<B, 2>::zeros([3, 4], &device());
        let u = Tensor::<B, 2>::zeros([3, 4], &device());
        let v = Tensor::<B, 2>::zeros([4, 3], &device());
        assert!(SweState::from_fields(eta, u, v).is_err());
    }

    #[test]
    fn test_is_valid_detects_nan() {
        let grid = grid();
        let state = SweState::<B>::zeros(&grid, &device());
        assert!(state.is_valid());

        let mut data = vec![0.0; 3 * grid.n_points()];
        data[5] = f64::NAN;
        let bad = SweState::<B>::from_flat_vec(&data, &grid, &device()).unwrap();
        assert!(!bad.is_valid());
    }
}
