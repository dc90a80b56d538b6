use std::fmt;
use std::str::FromStr;

use tch::{nn, Tensor};

use crate::discriminator::Discriminator;
use crate::error::MaganError;
use crate::feedforward::Activation;
use crate::generator::Generator;

/// The four sub-networks of a MAGAN. Generators are created under the
/// generator store (`G12`, `G21`), discriminators under the discriminator
/// store (`D1`, `D2`).
#[derive(Debug)]
pub struct Networks {
    pub g12: Generator,
    pub g21: Generator,
    pub d1: Discriminator,
    pub d2: Discriminator,
}

/// Everything one forward pass over a pair of batches produces.
#[derive(Debug)]
pub struct Translations {
    /// G12(xb1)
    pub gb2: Tensor,
    /// G21(xb2)
    pub gb1: Tensor,
    /// G21(G12(xb1))
    pub xb1_reconstructed: Tensor,
    /// G12(G21(xb2))
    pub xb2_reconstructed: Tensor,
    pub d1_real: Tensor,
    pub d1_fake: Tensor,
    pub d2_real: Tensor,
    pub d2_fake: Tensor,
}

impl Networks {
    pub fn new(
        g_vs: &nn::VarStore,
        d_vs: &nn::VarStore,
        dim_b1: i64,
        dim_b2: i64,
        activation: Activation,
    ) -> Networks {
        let g_root = g_vs.root();
        let d_root = d_vs.root();
        Networks {
            g12: Generator::new(&g_root / "G12", dim_b1, dim_b2, activation),
            g21: Generator::new(&g_root / "G21", dim_b2, dim_b1, activation),
            d1: Discriminator::new(&d_root / "D1", dim_b1, activation),
            d2: Discriminator::new(&d_root / "D2", dim_b2, activation),
        }
    }

    /// Translate both batches, reconstruct them through the reverse
    /// generator and score real and translated samples in each domain.
    pub fn forward(&self, xb1: &Tensor, xb2: &Tensor) -> Translations {
        let gb2 = self.g12.generate(xb1);
        let gb1 = self.g21.generate(xb2);

        let xb2_reconstructed = self.g12.generate(&gb1);
        let xb1_reconstructed = self.g21.generate(&gb2);

        let d1_real = self.d1.score(xb1);
        let d1_fake = self.d1.score(&gb1);
        let d2_real = self.d2.score(xb2);
        let d2_fake = self.d2.score(&gb2);

        Translations {
            gb2,
            gb1,
            xb1_reconstructed,
            xb2_reconstructed,
            d1_real,
            d1_fake,
            d2_real,
            d2_fake,
        }
    }
}

/// Intermediate tensors callers may ask for by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Gb2,
    Gb1,
    Xb1Reconstructed,
    Xb2Reconstructed,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Gb2,
        Layer::Gb1,
        Layer::Xb1Reconstructed,
        Layer::Xb2Reconstructed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Layer::Gb2 => "Gb2",
            Layer::Gb1 => "Gb1",
            Layer::Xb1Reconstructed => "xb1_reconstructed",
            Layer::Xb2Reconstructed => "xb2_reconstructed",
        }
    }

    pub fn select(self, translations: &Translations) -> &Tensor {
        match self {
            Layer::Gb2 => &translations.gb2,
            Layer::Gb1 => &translations.gb1,
            Layer::Xb1Reconstructed => &translations.xb1_reconstructed,
            Layer::Xb2Reconstructed => &translations.xb2_reconstructed,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layer {
    type Err = MaganError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // tolerate graph-style names such as "Gb2:0"
        let name = s.strip_suffix(":0").unwrap_or(s);
        Layer::ALL
            .into_iter()
            .find(|layer| layer.name() == name)
            .ok_or_else(|| MaganError::UnknownLayer(s.to_string()))
    }
}
