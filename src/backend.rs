//! Backend abstraction for differentiable assimilation.
//!
//! Both optimizers backpropagate through the full forward rollout, so the
//! backend must support reverse-mode autodiff. This module provides the
//! `AssimBackend` trait that bounds Burn autodiff backends
//! (NdArray, WGPU, CUDA) and a few tensor transfer helpers.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Trait for backends suitable for variational assimilation.
///
/// This trait bounds Burn backends to ensure they support:
/// - Reverse-mode autodiff through repeated simulator application
/// - All necessary tensor operations
pub trait AssimBackend: AutodiffBackend {
    /// Get the default device for this backend.
    fn default_device() -> Self::Device;
}

// Implement AssimBackend for the standard Burn autodiff backends

#[cfg(feature = "burn-ndarray")]
impl AssimBackend for burn::backend::Autodiff<burn_ndarray::NdArray<f64>> {
    fn default_device() -> Self::Device {
        burn_ndarray::NdArrayDevice::Cpu
    }
}

#[cfg(feature = "burn-wgpu")]
impl AssimBackend for burn::backend::Autodiff<burn_wgpu::Wgpu> {
    fn default_device() -> Self::Device {
        burn_wgpu::WgpuDevice::default()
    }
}

#[cfg(feature = "burn-cuda")]
impl AssimBackend for burn::backend::Autodiff<burn_cuda::Cuda> {
    fn default_device() -> Self::Device {
        burn_cuda::CudaDevice::default()
    }
}

/// Helper to create a 1D tensor from a Vec<f64> on the specified device.
#[inline]
pub fn tensor_from_vec_1d<B: Backend>(data: Vec<f64>, device: &B::Device) -> Tensor<B, 1>
where
    B::FloatElem: From<f64>,
{
    let len = data.len();
    let data_converted: Vec<B::FloatElem> = data.into_iter().map(|x| B::FloatElem::from(x)).collect();
    Tensor::from_data(
        burn::tensor::TensorData::new(data_converted, vec![len]),
        device,
    )
}

/// Helper to create a tensor from a Vec<f64> on the specified device.
#[inline]
pub fn tensor_from_vec<B: Backend, const D: usize>(
    data: Vec<f64>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D>
where
    B::FloatElem: From<f64>,
{
    let data_converted: Vec<B::FloatElem> = data.into_iter().map(|x| B::FloatElem::from(x)).collect();
    Tensor::from_data(
        burn::tensor::TensorData::new(data_converted, shape.to_vec()),
        device,
    )
}

/// Helper to download a tensor to a Vec<f64>.
#[inline]
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Vec<f64>
where
    f64: From<B::FloatElem>,
{
    tensor
        .to_data()
        .to_vec::<B::FloatElem>()
        .unwrap()
        .into_iter()
        .map(|x| f64::from(x))
        .collect()
}

/// Helper to download a single-element tensor as an f64 scalar.
#[inline]
pub fn tensor_to_scalar<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> f64
where
    f64: From<B::FloatElem>,
{
    f64::from(tensor.to_data().to_vec::<B::FloatElem>().unwrap()[0])
}
