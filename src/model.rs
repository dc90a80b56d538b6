use std::path::{Path, PathBuf};

use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};
use tracing::{debug, info, warn};

use crate::checkpoint::{self, CheckpointMeta};
use crate::discriminator::Discriminator;
use crate::error::{MaganError, Result};
use crate::feedforward::Activation;
use crate::graph::{Layer, Networks};
use crate::losses::{self, CorrespondenceLoss, LossKind, LossRegistry};

/// Generator rate = base rate * 10.
pub const GENERATOR_LR_SCALE: f64 = 10.0;
/// Discriminator rate = base rate * 0.0001.
pub const DISCRIMINATOR_LR_SCALE: f64 = 0.0001;
const ADAM_BETA1: f64 = 0.5;
const ADAM_BETA2: f64 = 0.99;

/// Where the model runs. Has no effect on what it computes.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub no_gpu: bool,
    /// Share of GPU memory the process may claim, in `(0, 1]`.
    pub gpu_fraction: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            no_gpu: false,
            gpu_fraction: 1.0,
        }
    }
}

impl DeviceConfig {
    pub fn cpu() -> Self {
        Self {
            no_gpu: true,
            ..Default::default()
        }
    }

    pub fn device(&self) -> Device {
        if self.no_gpu {
            return Device::Cpu;
        }
        let device = Device::cuda_if_available();
        if device.is_cuda() && self.gpu_fraction < 1.0 {
            // libtorch has no per-process cap reachable from tch
            warn!(
                gpu_fraction = self.gpu_fraction,
                "GPU memory fraction is recorded but not enforced"
            );
        }
        device
    }
}

#[derive(Debug, Clone)]
pub struct MaganConfig {
    pub dim_b1: i64,
    pub dim_b2: i64,
    pub learning_rate: f64,
    /// Restore from this checkpoint folder instead of building fresh weights.
    pub restore_folder: Option<PathBuf>,
    pub device: DeviceConfig,
    pub activation: Activation,
    /// Also report the cycle and correspondence subtotals.
    pub report_components: bool,
}

impl MaganConfig {
    pub fn new(dim_b1: i64, dim_b2: i64) -> Self {
        Self {
            dim_b1,
            dim_b2,
            learning_rate: 0.001,
            restore_folder: None,
            device: DeviceConfig::default(),
            activation: Activation::default(),
            report_components: false,
        }
    }

    /// Config for restoring a checkpoint whose dimensions are read from disk.
    pub fn restore<P: Into<PathBuf>>(folder: P) -> Self {
        Self::new(0, 0).with_restore_folder(folder)
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_restore_folder<P: Into<PathBuf>>(mut self, folder: P) -> Self {
        self.restore_folder = Some(folder.into());
        self
    }

    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_report_components(mut self, report_components: bool) -> Self {
        self.report_components = report_components;
        self
    }

    /// Dimensions may be left at 0 when restoring; they then come from
    /// the checkpoint.
    pub fn validate(&self) -> Result<()> {
        let min_dim = if self.restore_folder.is_some() { 0 } else { 1 };
        if self.dim_b1 < min_dim || self.dim_b2 < min_dim {
            return Err(MaganError::InvalidConfig(format!(
                "domain dimensions must be positive, got dim_b1={} dim_b2={}",
                self.dim_b1, self.dim_b2
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(MaganError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        let fraction = self.device.gpu_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(MaganError::InvalidConfig(format!(
                "gpu fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        Ok(())
    }
}

/// Names of the trainable variables in each optimizer's group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterGroups {
    pub generator: Vec<String>,
    pub discriminator: Vec<String>,
}

fn sorted_names(vs: &nn::VarStore) -> Vec<String> {
    let mut names: Vec<String> = vs.variables().into_keys().collect();
    names.sort();
    names
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Realness {
    pub d1_real: f64,
    pub d1_fake: f64,
    pub d2_real: f64,
    pub d2_fake: f64,
}

/// Cross-domain GAN with a correspondence penalty between each sample and
/// its translation.
pub struct Magan {
    config: MaganConfig,
    device: Device,
    g_vs: nn::VarStore,
    d_vs: nn::VarStore,
    networks: Networks,
    optimizer_g: nn::Optimizer,
    optimizer_d: nn::Optimizer,
    losses: LossRegistry,
    correspondence: Box<dyn CorrespondenceLoss>,
    iteration: u64,
}

impl Magan {
    /// Build a fresh model, or restore one when `config.restore_folder` is set.
    pub fn new<C>(config: MaganConfig, correspondence: C) -> Result<Magan>
    where
        C: CorrespondenceLoss + 'static,
    {
        config.validate()?;
        if config.restore_folder.is_some() {
            return Self::restore(config, correspondence);
        }
        let model = Self::build(config, Box::new(correspondence))?;
        info!(
            dim_b1 = model.config.dim_b1,
            dim_b2 = model.config.dim_b2,
            device = ?model.device,
            generator_lr = model.generator_lr(),
            discriminator_lr = model.discriminator_lr(),
            "Built MAGAN"
        );
        Ok(model)
    }

    /// Rebuild the networks described by the checkpoint in
    /// `config.restore_folder` and load their weights.
    pub fn restore<C>(config: MaganConfig, correspondence: C) -> Result<Magan>
    where
        C: CorrespondenceLoss + 'static,
    {
        config.validate()?;
        let folder = config
            .restore_folder
            .clone()
            .ok_or_else(|| MaganError::InvalidConfig("no restore folder given".to_string()))?;
        let meta = CheckpointMeta::read(&folder)?;
        for (field, found, configured) in [
            ("dim_b1", meta.dim_b1, config.dim_b1),
            ("dim_b2", meta.dim_b2, config.dim_b2),
        ] {
            if configured != 0 && configured != found {
                return Err(MaganError::CheckpointMismatch {
                    folder,
                    field,
                    found,
                    configured,
                });
            }
        }

        let config = MaganConfig {
            dim_b1: meta.dim_b1,
            dim_b2: meta.dim_b2,
            activation: meta.activation,
            ..config
        };
        let mut model = Self::build(config, Box::new(correspondence))?;
        checkpoint::load(&folder, &meta, &mut model.g_vs, &mut model.d_vs)?;
        model.iteration = meta.iteration;
        info!("Model restored from {}", folder.display());
        Ok(model)
    }

    fn build(config: MaganConfig, correspondence: Box<dyn CorrespondenceLoss>) -> Result<Magan> {
        correspondence.check_dims(config.dim_b1, config.dim_b2)?;
        correspondence.check_dims(config.dim_b2, config.dim_b1)?;
        let device = config.device.device();

        let g_vs = nn::VarStore::new(device);
        let d_vs = nn::VarStore::new(device);
        let networks = Networks::new(&g_vs, &d_vs, config.dim_b1, config.dim_b2, config.activation);

        let optimizer_g = nn::adam(ADAM_BETA1, ADAM_BETA2, 0.)
            .build(&g_vs, config.learning_rate * GENERATOR_LR_SCALE)?;
        let optimizer_d = nn::adam(ADAM_BETA1, ADAM_BETA2, 0.)
            .build(&d_vs, config.learning_rate * DISCRIMINATOR_LR_SCALE)?;

        let losses = LossRegistry::new(config.report_components);
        Ok(Magan {
            config,
            device,
            g_vs,
            d_vs,
            networks,
            optimizer_g,
            optimizer_d,
            losses,
            correspondence,
            iteration: 0,
        })
    }

    pub fn config(&self) -> &MaganConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn dim_b1(&self) -> i64 {
        self.config.dim_b1
    }

    pub fn dim_b2(&self) -> i64 {
        self.config.dim_b2
    }

    /// Number of training steps taken, including those before a restore.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn generator_lr(&self) -> f64 {
        self.config.learning_rate * GENERATOR_LR_SCALE
    }

    pub fn discriminator_lr(&self) -> f64 {
        self.config.learning_rate * DISCRIMINATOR_LR_SCALE
    }

    pub fn networks(&self) -> &Networks {
        &self.networks
    }

    pub fn parameter_groups(&self) -> ParameterGroups {
        ParameterGroups {
            generator: sorted_names(&self.g_vs),
            discriminator: sorted_names(&self.d_vs),
        }
    }

    pub fn trainable_parameter_count(&self) -> usize {
        self.g_vs.trainable_variables().len() + self.d_vs.trainable_variables().len()
    }

    fn check_batch(&self, xs: &Tensor, domain: &'static str, dim: i64) -> Result<Tensor> {
        let shape = xs.size();
        if shape.len() != 2 {
            return Err(MaganError::BatchRank { domain, shape });
        }
        if shape[1] != dim {
            return Err(MaganError::DimensionMismatch {
                domain,
                expected: dim,
                actual: shape[1],
            });
        }
        if shape[0] == 0 {
            return Err(MaganError::EmptyBatch(domain));
        }
        Ok(xs.to_device(self.device).to_kind(Kind::Float))
    }

    fn prepare(&self, xb1: &Tensor, xb2: &Tensor) -> Result<(Tensor, Tensor)> {
        let xb1 = self.check_batch(xb1, "b1", self.config.dim_b1)?;
        let xb2 = self.check_batch(xb2, "b2", self.config.dim_b2)?;
        Ok((xb1, xb2))
    }

    /// One generator step followed by one discriminator step. The
    /// discriminator step sees the generators as just updated.
    pub fn train(&mut self, xb1: &Tensor, xb2: &Tensor) -> Result<()> {
        let (xb1, xb2) = self.prepare(xb1, xb2)?;
        self.iteration += 1;

        let loss_g = self.generator_step(&xb1, &xb2)?;
        let loss_d = self.discriminator_step(&xb1, &xb2);

        if let (Ok(loss_g), Ok(loss_d)) = (loss_g.f_double_value(&[]), loss_d.f_double_value(&[])) {
            debug!(iteration = self.iteration, loss_g, loss_d, "train step");
        }
        Ok(())
    }

    /// Update G12 and G21 on `loss_G`; the discriminator store is frozen.
    fn generator_step(&mut self, xb1: &Tensor, xb2: &Tensor) -> Result<Tensor> {
        self.d_vs.freeze();
        let translations = self.networks.forward(xb1, xb2);
        let loss_g = losses::generator_loss(&translations, xb1, xb2, self.correspondence.as_ref());
        if let Ok(loss_g) = &loss_g {
            self.optimizer_g.backward_step(&loss_g.total);
        }
        self.d_vs.unfreeze();
        Ok(loss_g?.total)
    }

    /// Update D1 and D2 on `loss_D` from a fresh forward pass; the generator
    /// store is frozen.
    fn discriminator_step(&mut self, xb1: &Tensor, xb2: &Tensor) -> Tensor {
        self.g_vs.freeze();
        let translations = self.networks.forward(xb1, xb2);
        let loss_d = losses::discriminator_loss(&translations);
        self.optimizer_d.backward_step(&loss_d);
        self.g_vs.unfreeze();
        loss_d
    }

    /// Value of a named intermediate (`Gb2`, `Gb1`, `xb1_reconstructed`,
    /// `xb2_reconstructed`) for the given batches.
    pub fn get_layer(&self, xb1: &Tensor, xb2: &Tensor, name: &str) -> Result<Tensor> {
        self.layer(xb1, xb2, name.parse()?)
    }

    pub fn layer(&self, xb1: &Tensor, xb2: &Tensor, layer: Layer) -> Result<Tensor> {
        let (xb1, xb2) = self.prepare(xb1, xb2)?;
        let value = tch::no_grad(|| {
            let translations = self.networks.forward(&xb1, &xb2);
            layer.select(&translations).shallow_clone()
        });
        Ok(value)
    }

    /// Translate a B1 batch into B2.
    pub fn generate_b2(&self, xb1: &Tensor) -> Result<Tensor> {
        let xb1 = self.check_batch(xb1, "b1", self.config.dim_b1)?;
        Ok(tch::no_grad(|| self.networks.g12.generate(&xb1)))
    }

    /// Translate a B2 batch into B1.
    pub fn generate_b1(&self, xb2: &Tensor) -> Result<Tensor> {
        let xb2 = self.check_batch(xb2, "b2", self.config.dim_b2)?;
        Ok(tch::no_grad(|| self.networks.g21.generate(&xb2)))
    }

    /// Mean discriminator probabilities of "real" for real and translated
    /// samples in each domain.
    pub fn realness(&self, xb1: &Tensor, xb2: &Tensor) -> Result<Realness> {
        let (xb1, xb2) = self.prepare(xb1, xb2)?;
        tch::no_grad(|| {
            let gb1 = self.networks.g21.generate(&xb2);
            let gb2 = self.networks.g12.generate(&xb1);
            let mean = |d: &Discriminator, xs: &Tensor| -> Result<f64> {
                Ok(d.probability(xs).mean(Kind::Float).f_double_value(&[])?)
            };
            Ok(Realness {
                d1_real: mean(&self.networks.d1, &xb1)?,
                d1_fake: mean(&self.networks.d1, &gb1)?,
                d2_real: mean(&self.networks.d2, &xb2)?,
                d2_fake: mean(&self.networks.d2, &gb2)?,
            })
        })
    }

    pub fn get_loss_names(&self) -> String {
        self.losses.describe()
    }

    pub fn loss_values(&self, xb1: &Tensor, xb2: &Tensor) -> Result<Vec<(LossKind, f64)>> {
        let (xb1, xb2) = self.prepare(xb1, xb2)?;
        tch::no_grad(|| {
            let translations = self.networks.forward(&xb1, &xb2);
            let loss_d = losses::discriminator_loss(&translations);
            let loss_g =
                losses::generator_loss(&translations, &xb1, &xb2, self.correspondence.as_ref())?;
            self.losses.collect(&loss_d, &loss_g)
        })
    }

    /// Registered losses for the given batches, formatted like `1.23E-01`.
    pub fn get_loss(&self, xb1: &Tensor, xb2: &Tensor) -> Result<String> {
        Ok(losses::format_values(&self.loss_values(xb1, xb2)?))
    }

    /// Write weights and network description into `folder`. `iteration`
    /// defaults to the model's step counter.
    pub fn save<P: AsRef<Path>>(&self, iteration: Option<u64>, folder: P) -> Result<PathBuf> {
        let folder = folder.as_ref();
        let meta = CheckpointMeta::new(
            self.config.dim_b1,
            self.config.dim_b2,
            self.config.activation,
            iteration.unwrap_or(self.iteration),
        );
        checkpoint::save(folder, &meta, &self.g_vs, &self.d_vs)?;
        info!("Model saved to {}", folder.display());
        Ok(folder.to_path_buf())
    }
}
