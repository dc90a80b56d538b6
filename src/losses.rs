//! Loss composition for MAGAN.
//!
//! Both aggregate losses are the arithmetic mean of their per-term means:
//! four adversarial terms for the discriminators, six terms (adversarial,
//! cycle reconstruction, correspondence) for the generators.

use std::fmt;

use tch::{Kind, Reduction, Tensor};

use crate::error::{MaganError, Result};
use crate::graph::Translations;

/// Penalty tying a source batch to its translation into the other domain.
///
/// Must return one value per sample (shape `(batch,)` or `(batch, 1)`);
/// a 0-dim tensor is accepted as an already reduced penalty.
pub trait CorrespondenceLoss {
    fn penalty(&self, batch: &Tensor, translated: &Tensor) -> Result<Tensor>;

    /// Reject domain widths this penalty cannot compare. Checked for both
    /// directions when a model is built.
    fn check_dims(&self, _source_dim: i64, _target_dim: i64) -> Result<()> {
        Ok(())
    }
}

impl<F> CorrespondenceLoss for F
where
    F: Fn(&Tensor, &Tensor) -> Tensor,
{
    fn penalty(&self, batch: &Tensor, translated: &Tensor) -> Result<Tensor> {
        Ok(self(batch, translated))
    }
}

/// No correspondence constraint at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroCorrespondence;

impl CorrespondenceLoss for ZeroCorrespondence {
    fn penalty(&self, batch: &Tensor, _translated: &Tensor) -> Result<Tensor> {
        Ok(Tensor::zeros([batch.size()[0]], (Kind::Float, batch.device())))
    }
}

fn width(xs: &Tensor) -> i64 {
    xs.size().last().copied().unwrap_or(0)
}

/// Per-sample mean squared difference between a sample and its
/// translation. Only meaningful when both domains share a dimensionality.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCorrespondence;

impl CorrespondenceLoss for IdentityCorrespondence {
    fn penalty(&self, batch: &Tensor, translated: &Tensor) -> Result<Tensor> {
        self.check_dims(width(batch), width(translated))?;
        Ok(batch
            .f_sub(translated)?
            .square()
            .f_mean_dim(&[1i64][..], false, Kind::Float)?)
    }

    fn check_dims(&self, source_dim: i64, target_dim: i64) -> Result<()> {
        if source_dim != target_dim {
            return Err(MaganError::CorrespondenceDims {
                source_dim,
                target_dim,
                reason: "identity correspondence needs equal widths".to_string(),
            });
        }
        Ok(())
    }
}

/// Known feature correspondences: column `i` of one domain should match
/// column `j` of the other. Each pair is `(source column, target column)`.
#[derive(Debug, Clone)]
pub struct FeatureCorrespondence {
    source: Vec<i64>,
    target: Vec<i64>,
}

impl FeatureCorrespondence {
    pub fn new(pairs: &[(i64, i64)]) -> FeatureCorrespondence {
        let (source, target) = pairs.iter().copied().unzip();
        FeatureCorrespondence { source, target }
    }
}

fn out_of_range(columns: &[i64], dim: i64) -> Option<i64> {
    columns.iter().copied().find(|&c| c < 0 || c >= dim)
}

impl CorrespondenceLoss for FeatureCorrespondence {
    fn penalty(&self, batch: &Tensor, translated: &Tensor) -> Result<Tensor> {
        self.check_dims(width(batch), width(translated))?;
        let device = batch.device();
        let source = Tensor::from_slice(&self.source).to_device(device);
        let target = Tensor::from_slice(&self.target).to_device(device);
        Ok(batch
            .f_index_select(1, &source)?
            .f_sub(&translated.f_index_select(1, &target)?)?
            .square()
            .f_mean_dim(&[1i64][..], false, Kind::Float)?)
    }

    fn check_dims(&self, source_dim: i64, target_dim: i64) -> Result<()> {
        let bad = out_of_range(&self.source, source_dim)
            .map(|c| (c, source_dim))
            .or_else(|| out_of_range(&self.target, target_dim).map(|c| (c, target_dim)));
        if let Some((column, dim)) = bad {
            return Err(MaganError::CorrespondenceDims {
                source_dim,
                target_dim,
                reason: format!("column {} is out of range for width {}", column, dim),
            });
        }
        Ok(())
    }
}

/// Sigmoid cross-entropy on logits, as libtorch's
/// `binary_cross_entropy_with_logits`.
pub fn sigmoid_cross_entropy_with_logits(logits: &Tensor, labels: &Tensor, reduction: Reduction) -> Tensor {
    logits.binary_cross_entropy_with_logits::<Tensor>(labels, None, None, reduction)
}

fn bce_mean(logits: &Tensor, real: bool) -> Tensor {
    let labels = if real {
        logits.ones_like()
    } else {
        logits.zeros_like()
    };
    sigmoid_cross_entropy_with_logits(logits, &labels, Reduction::Mean)
}

pub fn mean_squared_error(xs: &Tensor, ys: &Tensor) -> Tensor {
    xs.mse_loss(ys, Reduction::Mean)
}

fn mean_of(terms: &[Tensor]) -> Tensor {
    Tensor::stack(terms, 0).mean(Kind::Float)
}

/// Reduce a correspondence penalty to its mean after checking it holds one
/// finite value per sample.
pub fn reduce_penalty(penalty: &Tensor, batch_size: i64) -> Result<Tensor> {
    let shape = penalty.size();
    let per_sample = !shape.is_empty() && shape[0] == batch_size && penalty.numel() as i64 == batch_size;
    if !(shape.is_empty() || per_sample) {
        return Err(MaganError::CorrespondenceShape {
            expected: batch_size,
            actual: shape,
        });
    }
    let non_finite = penalty
        .isfinite()
        .logical_not()
        .sum(Kind::Int64)
        .f_int64_value(&[])?;
    if non_finite > 0 {
        return Err(MaganError::NonFiniteCorrespondence);
    }
    Ok(penalty.mean(Kind::Float))
}

/// Discriminators should call real batches real and translations fake.
pub fn discriminator_loss(t: &Translations) -> Tensor {
    mean_of(&[
        bce_mean(&t.d1_real, true),
        bce_mean(&t.d2_real, true),
        bce_mean(&t.d1_fake, false),
        bce_mean(&t.d2_fake, false),
    ])
}

/// The generator objective and the subtotals worth reporting on their own.
#[derive(Debug)]
pub struct GeneratorLoss {
    pub total: Tensor,
    /// Sum of both reconstruction errors.
    pub cycle: Tensor,
    /// Sum of both mean correspondence penalties.
    pub correspondence: Tensor,
}

pub fn generator_loss(
    t: &Translations,
    xb1: &Tensor,
    xb2: &Tensor,
    correspondence: &dyn CorrespondenceLoss,
) -> Result<GeneratorLoss> {
    let fool_d1 = bce_mean(&t.d1_fake, true);
    let fool_d2 = bce_mean(&t.d2_fake, true);

    let cycle_b1 = mean_squared_error(xb1, &t.xb1_reconstructed);
    let cycle_b2 = mean_squared_error(xb2, &t.xb2_reconstructed);

    let corr_b1 = reduce_penalty(&correspondence.penalty(xb1, &t.gb2)?, xb1.size()[0])?;
    let corr_b2 = reduce_penalty(&correspondence.penalty(xb2, &t.gb1)?, xb2.size()[0])?;

    let cycle = &cycle_b1 + &cycle_b2;
    let corr = &corr_b1 + &corr_b2;
    let total = mean_of(&[fool_d1, fool_d2, cycle_b1, cycle_b2, corr_b1, corr_b2]);
    Ok(GeneratorLoss {
        total,
        cycle,
        correspondence: corr,
    })
}

/// Identifiers of the losses a model reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    Discriminator,
    Generator,
    Cycle,
    Correspondence,
}

impl LossKind {
    pub fn name(self) -> &'static str {
        match self {
            LossKind::Discriminator => "D",
            LossKind::Generator => "G",
            LossKind::Cycle => "cycle",
            LossKind::Correspondence => "corr",
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered set of losses owned by one model instance.
#[derive(Debug, Clone)]
pub struct LossRegistry {
    kinds: Vec<LossKind>,
}

impl LossRegistry {
    pub fn new(report_components: bool) -> LossRegistry {
        let mut kinds = vec![LossKind::Discriminator, LossKind::Generator];
        if report_components {
            kinds.push(LossKind::Cycle);
            kinds.push(LossKind::Correspondence);
        }
        LossRegistry { kinds }
    }

    pub fn kinds(&self) -> &[LossKind] {
        &self.kinds
    }

    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.kinds.iter().map(|k| k.name()).collect();
        format!("Losses: {}", names.join(" "))
    }

    /// Pick the registered scalars out of a composed loss, in order.
    pub fn collect(&self, loss_d: &Tensor, loss_g: &GeneratorLoss) -> Result<Vec<(LossKind, f64)>> {
        self.kinds
            .iter()
            .map(|&kind| {
                let tensor = match kind {
                    LossKind::Discriminator => loss_d,
                    LossKind::Generator => &loss_g.total,
                    LossKind::Cycle => &loss_g.cycle,
                    LossKind::Correspondence => &loss_g.correspondence,
                };
                Ok((kind, tensor.f_double_value(&[])?))
            })
            .collect()
    }
}

/// Scientific notation with two decimals and a signed two-digit exponent,
/// e.g. `1.23E-01`.
pub fn format_scientific(value: f64) -> String {
    if value.is_nan() {
        return "NAN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    let raw = format!("{:.2E}", value);
    match raw.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}E{}{:02}", mantissa, sign, exponent.abs())
        }
        None => raw,
    }
}

pub fn format_values(values: &[(LossKind, f64)]) -> String {
    let parts: Vec<String> = values.iter().map(|(_, v)| format_scientific(*v)).collect();
    parts.join(" ")
}
