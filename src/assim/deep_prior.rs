//! Deep-prior 4D-Var: weight-space optimization of a generative network.
//!
//! The unknown initial state is reparameterized as the output of a
//! randomly-initialized convolutional generator applied to a fixed latent
//! noise tensor. Only the network weights are optimized, with Adam;
//! regularization is implicit in the architecture and capacity of the
//! generator rather than an explicit penalty term (though one is still
//! accepted).

use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::relu;
use log::{debug, info};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::assim::cost::{CostContributor, CostFunction};
use crate::assim::FitOutcome;
use crate::backend::{tensor_from_vec, tensor_to_scalar, AssimBackend};
use crate::error::AssimError;
use crate::grid::Grid;
use crate::model::{SweModel, SweState};
use crate::obs::Observations;

/// Architecture of the deep-prior generator.
#[derive(Clone, Copy, Debug)]
pub struct GeneratorConfig {
    /// Channels of the latent noise tensor
    pub latent_channels: usize,
    /// Channel width of the last upsampling stage (doubled at each earlier stage)
    pub base_channels: usize,
    /// Standard deviation of the N(0, std²) weight initialization
    pub init_std: f64,
}

impl GeneratorConfig {
    /// Total spatial upsampling applied by the three transposed-conv stages.
    pub const UPSAMPLE: usize = 8;

    /// Validate the architecture against the target grid.
    pub fn validate(&self, grid: &Grid) -> Result<(), AssimError> {
        if self.latent_channels == 0 || self.base_channels == 0 {
            return Err(AssimError::invalid_config(
                "generator channel counts must be positive",
            ));
        }
        if !(self.init_std.is_finite() && self.init_std > 0.0) {
            return Err(AssimError::invalid_config(format!(
                "weight init std must be positive, got {}",
                self.init_std
            )));
        }
        if grid.nx % Self::UPSAMPLE != 0 || grid.ny % Self::UPSAMPLE != 0 {
            return Err(AssimError::invalid_config(format!(
                "grid dimensions must be divisible by the upsampling factor {}, got {}x{}",
                Self::UPSAMPLE,
                grid.nx,
                grid.ny
            )));
        }
        Ok(())
    }

    /// Shape of the latent noise tensor for the given grid.
    pub fn latent_shape(&self, grid: &Grid) -> [usize; 4] {
        [
            1,
            self.latent_channels,
            grid.ny / Self::UPSAMPLE,
            grid.nx / Self::UPSAMPLE,
        ]
    }

    /// Build a generator for the grid, drawing all weights from `rng`.
    ///
    /// The same fixed scheme is applied to every layer: conv weights from
    /// N(0, std²) with zero biases, batch-norm scale from N(1, std²) with
    /// zero offset. The same seed therefore reproduces the generator
    /// exactly.
    pub fn init<B: Backend>(
        &self,
        grid: &Grid,
        rng: &mut StdRng,
        device: &B::Device,
    ) -> Result<Generator<B>, AssimError>
    where
        B::FloatElem: From<f64>,
    {
        self.validate(grid)?;

        let c = self.base_channels;
        let up1 = ConvTranspose2dConfig::new([self.latent_channels, 4 * c], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        let bn1 = BatchNormConfig::new(4 * c).init(device);
        let up2 = ConvTranspose2dConfig::new([4 * c, 2 * c], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        let bn2 = BatchNormConfig::new(2 * c).init(device);
        let up3 = ConvTranspose2dConfig::new([2 * c, c], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        let bn3 = BatchNormConfig::new(c).init(device);
        let head = Conv2dConfig::new([c, 3], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let weights = Normal::new(0.0, self.init_std)
            .map_err(|e| AssimError::invalid_config(format!("invalid init distribution: {e}")))?;

        let generator = Generator {
            up1: reinit_transposed(up1, &weights, rng),
            bn1: reinit_norm(bn1, &weights, rng),
            up2: reinit_transposed(up2, &weights, rng),
            bn2: reinit_norm(bn2, &weights, rng),
            up3: reinit_transposed(up3, &weights, rng),
            bn3: reinit_norm(bn3, &weights, rng),
            head: reinit_conv(head, &weights, rng),
        };
        Ok(generator)
    }

    /// Draw the fixed latent noise tensor for the given grid.
    pub fn sample_latent<B: Backend>(
        &self,
        grid: &Grid,
        rng: &mut StdRng,
        device: &B::Device,
    ) -> Tensor<B, 4>
    where
        B::FloatElem: From<f64>,
    {
        let shape = self.latent_shape(grid);
        let n = shape.iter().product::<usize>();
        let data: Vec<f64> = (0..n).map(|_| StandardNormal.sample(rng)).collect();
        tensor_from_vec::<B, 4>(data, shape, device)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            latent_channels: 32,
            base_channels: 16,
            init_std: 0.02,
        }
    }
}

/// Replace a tensor's values with fresh N(mean, std²) draws.
fn resample<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    mean: f64,
    weights: &Normal<f64>,
    rng: &mut StdRng,
) -> Tensor<B, D>
where
    B::FloatElem: From<f64>,
{
    let dims = tensor.dims();
    let n: usize = dims.iter().product();
    let data: Vec<f64> = (0..n).map(|_| mean + weights.sample(rng)).collect();
    tensor_from_vec::<B, D>(data, dims, &tensor.device())
}

fn reinit_transposed<B: Backend>(
    mut conv: ConvTranspose2d<B>,
    weights: &Normal<f64>,
    rng: &mut StdRng,
) -> ConvTranspose2d<B>
where
    B::FloatElem: From<f64>,
{
    conv.weight = Param::from_tensor(resample(conv.weight.val(), 0.0, weights, rng));
    conv.bias = conv
        .bias
        .map(|b| Param::from_tensor(b.val().zeros_like()));
    conv
}

fn reinit_conv<B: Backend>(
    mut conv: Conv2d<B>,
    weights: &Normal<f64>,
    rng: &mut StdRng,
) -> Conv2d<B>
where
    B::FloatElem: From<f64>,
{
    conv.weight = Param::from_tensor(resample(conv.weight.val(), 0.0, weights, rng));
    conv.bias = conv
        .bias
        .map(|b| Param::from_tensor(b.val().zeros_like()));
    conv
}

fn reinit_norm<B: Backend>(
    mut norm: BatchNorm<B, 2>,
    weights: &Normal<f64>,
    rng: &mut StdRng,
) -> BatchNorm<B, 2>
where
    B::FloatElem: From<f64>,
{
    norm.gamma = Param::from_tensor(resample(norm.gamma.val(), 1.0, weights, rng));
    norm.beta = Param::from_tensor(norm.beta.val().zeros_like());
    norm
}

/// Convolutional upsampling generator mapping a fixed latent tensor to a
/// candidate initial state.
///
/// Owns its weights exclusively; stateless with respect to the
/// optimization loop apart from weight updates.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    up1: ConvTranspose2d<B>,
    bn1: BatchNorm<B, 2>,
    up2: ConvTranspose2d<B>,
    bn2: BatchNorm<B, 2>,
    up3: ConvTranspose2d<B>,
    bn3: BatchNorm<B, 2>,
    head: Conv2d<B>,
}

impl<B: Backend> Generator<B> {
    /// Map the latent tensor to a `[1, 3, ny, nx]` candidate state.
    pub fn forward(&self, latent: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.bn1.forward(self.up1.forward(latent)));
        let x = relu(self.bn2.forward(self.up2.forward(x)));
        let x = relu(self.bn3.forward(self.up3.forward(x)));
        self.head.forward(x)
    }
}

/// Configuration of the weight-space optimizer.
#[derive(Clone, Copy, Debug)]
pub struct DeepPriorConfig {
    /// Number of Adam epochs
    pub epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Adam first-moment coefficient β₁
    pub momentum: f64,
}

impl DeepPriorConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), AssimError> {
        if self.epochs == 0 {
            return Err(AssimError::invalid_config("epoch budget must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(AssimError::invalid_config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(AssimError::invalid_config(format!(
                "momentum coefficient must lie in [0, 1), got {}",
                self.momentum
            )));
        }
        Ok(())
    }
}

impl Default for DeepPriorConfig {
    fn default() -> Self {
        Self {
            epochs: 2000,
            learning_rate: 0.01,
            momentum: 0.9,
        }
    }
}

/// Deep-prior 4D-Var optimizer.
///
/// Generator weights and the latent tensor are drawn once at construction
/// from the caller's random source; `fit` then optimizes a copy of the
/// weights against the observations. The latent never changes.
#[derive(Debug)]
pub struct DeepPriorVar<B: AssimBackend> {
    model: SweModel<B>,
    generator: Generator<B>,
    latent: Tensor<B, 4>,
    config: DeepPriorConfig,
    contributor: Option<Box<dyn CostContributor<B>>>,
}

impl<B: AssimBackend> DeepPriorVar<B>
where
    B::FloatElem: From<f64>,
    f64: From<B::FloatElem>,
{
    /// Construct the optimizer, drawing generator weights and the latent
    /// noise from `rng`.
    pub fn new(
        model: SweModel<B>,
        generator: &GeneratorConfig,
        config: DeepPriorConfig,
        rng: &mut StdRng,
    ) -> Result<Self, AssimError> {
        config.validate()?;
        let grid = *model.grid();
        let device = model.device().clone();
        let net = generator.init::<B>(&grid, rng, &device)?;
        let latent = generator.sample_latent::<B>(&grid, rng, &device);
        Ok(Self {
            model,
            generator: net,
            latent,
            config,
            contributor: None,
        })
    }

    /// Add an explicit cost contributor on top of the implicit prior.
    ///
    /// The reference configuration uses none, but the variant does not
    /// preclude one.
    pub fn with_penalty(mut self, contributor: impl CostContributor<B> + 'static) -> Self {
        self.contributor = Some(Box::new(contributor));
        self
    }

    /// The simulator this optimizer fits against.
    pub fn model(&self) -> &SweModel<B> {
        &self.model
    }

    /// Realize the candidate initial state for the current weights.
    pub fn realize(&self) -> Result<SweState<B>, AssimError> {
        realize(&self.generator, &self.latent, self.model.grid())
    }

    /// Optimize the generator weights against the observations and return
    /// the realized initial-state estimate.
    pub fn fit(&self, obs: &Observations<B>) -> Result<FitOutcome<B>, AssimError> {
        let grid = *self.model.grid();
        let dims = obs.values.dims();
        if dims[1] != 3 || dims[2] != grid.ny || dims[3] != grid.nx {
            return Err(AssimError::dimension_mismatch(
                format!("[_, 3, {}, {}]", grid.ny, grid.nx),
                format!("{:?}", dims),
            ));
        }

        let cost = CostFunction::new(&self.model, obs, self.contributor.as_deref());
        let mut generator = self.generator.clone();
        let mut optim = AdamConfig::new()
            .with_beta_1(self.config.momentum as f32)
            .init();

        for epoch in 0..self.config.epochs {
            let w0 = realize(&generator, &self.latent, &grid)?;
            let total = cost.evaluate(&w0);
            let value = tensor_to_scalar(&total);
            if !value.is_finite() {
                return Err(AssimError::Diverged {
                    iteration: epoch,
                    cost: value,
                });
            }

            let grads = total.backward();
            let grads = GradientsParams::from_grads(grads, &generator);
            generator = optim.step(self.config.learning_rate, generator, grads);

            if epoch % 100 == 0 {
                debug!("deep prior: epoch {epoch}, cost {value:.6e}");
            }
        }

        // Realize the recovered state with the final weights
        let initial_condition = realize(&generator, &self.latent, &grid)?.detach();
        let final_cost = tensor_to_scalar(&cost.evaluate(&initial_condition));
        if !final_cost.is_finite() {
            return Err(AssimError::Diverged {
                iteration: self.config.epochs,
                cost: final_cost,
            });
        }
        info!(
            "deep prior fit: {} epochs, cost {:.6e}",
            self.config.epochs, final_cost
        );

        Ok(FitOutcome {
            initial_condition,
            final_cost,
            iterations: self.config.epochs,
            converged: false,
        })
    }
}

fn realize<B: Backend>(
    generator: &Generator<B>,
    latent: &Tensor<B, 4>,
    grid: &Grid,
) -> Result<SweState<B>, AssimError> {
    let output = generator.forward(latent.clone());
    let channels: Tensor<B, 3> = output.squeeze::<3>(0);
    SweState::from_channels(channels, grid)
}

#[cfg(test)]
#[cfg(feature = "burn-ndarray")]
mod tests {
    use super::*;
    use crate::grid::SwePhysics;
    use crate::obs::{observe, ObsConfig};
    use burn::backend::Autodiff;
    use rand::SeedableRng;

    type B = Autodiff<burn_ndarray::NdArray<f64>>;

    fn device() -> burn_ndarray::NdArrayDevice {
        burn_ndarray::NdArrayDevice::Cpu
    }

    fn model() -> SweModel<B> {
        let grid = Grid::new(16, 16, 1.0, 1.0).unwrap();
        SweModel::new(grid, SwePhysics::default(), 0.1, &device()).unwrap()
    }

    #[test]
    fn test_generator_output_shape() {
        let grid = Grid::new(16, 8, 1.0, 1.0).unwrap();
        let config = GeneratorConfig::default();
        let mut rng = StdRng::seed_from_u64(0);

        let generator = config.init::<B>(&grid, &mut rng, &device()).unwrap();
        let latent = config.sample_latent::<B>(&grid, &mut rng, &device());
        assert_eq!(latent.dims(), [1, 32, 1, 2]);

        let out = generator.forward(latent);
        assert_eq!(out.dims(), [1, 3, 8, 16]);
    }

    #[test]
    fn test_generator_init_deterministic() {
        let grid = Grid::new(8, 8, 1.0, 1.0).unwrap();
        let config = GeneratorConfig::default();

        let mut rng_a = StdRng::seed_from_u64(123);
        let mut rng_b = StdRng::seed_from_u64(123);
        let gen_a = config.init::<B>(&grid, &mut rng_a, &device()).unwrap();
        let gen_b = config.init::<B>(&grid, &mut rng_b, &device()).unwrap();
        let latent_a = config.sample_latent::<B>(&grid, &mut rng_a, &device());
        let latent_b = config.sample_latent::<B>(&grid, &mut rng_b, &device());

        let out_a = gen_a.forward(latent_a);
        let out_b = gen_b.forward(latent_b);
        let diff = tensor_to_scalar(&out_a.sub(out_b).abs().sum());
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_generator_rejects_indivisible_grid() {
        let grid = Grid::new(10, 16, 1.0, 1.0).unwrap();
        let config = GeneratorConfig::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(config.init::<B>(&grid, &mut rng, &device()).is_err());
    }

    #[test]
    fn test_deep_prior_smoke_fit() {
        let model = model();
        let grid = *model.grid();
        let mut rng = StdRng::seed_from_u64(7);

        // Small truth bump, dense noiseless observations
        let mut data = vec![0.0; 3 * grid.n_points()];
        for j in 0..grid.ny {
            for i in 0..grid.nx {
                let dx = i as f64 - 7.5;
                let dy = j as f64 - 7.5;
                data[j * grid.nx + i] = 0.05 * (-(dx * dx + dy * dy) / 8.0).exp();
            }
        }
        let truth = SweState::from_flat_vec(&data, &grid, &device()).unwrap();
        let (_, obs) = observe(
            &model,
            &truth,
            3,
            &ObsConfig {
                subsample: 1,
                sigma: 0.0,
                ..Default::default()
            },
            &mut rng,
        )
        .unwrap();

        let var = DeepPriorVar::new(
            model,
            &GeneratorConfig {
                latent_channels: 8,
                base_channels: 4,
                ..Default::default()
            },
            DeepPriorConfig {
                epochs: 10,
                ..Default::default()
            },
            &mut rng,
        )
        .unwrap();

        let outcome = var.fit(&obs).unwrap();
        assert_eq!(outcome.iterations, 10);
        assert!(outcome.final_cost.is_finite());
        assert!(outcome.initial_condition.is_valid());
    }

    #[test]
    fn test_config_validation() {
        assert!(DeepPriorConfig {
            epochs: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(DeepPriorConfig {
            learning_rate: -0.1,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(DeepPriorConfig {
            momentum: 1.0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
