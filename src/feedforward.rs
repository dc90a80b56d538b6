use serde::{Deserialize, Serialize};
use tch::{nn, Tensor};

/// Element-wise nonlinearity applied after every hidden layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    LeakyRelu,
    Relu,
    Identity,
}

impl Activation {
    pub fn apply(self, xs: &Tensor) -> Tensor {
        match self {
            Activation::LeakyRelu => xs.leaky_relu(),
            Activation::Relu => xs.relu(),
            Activation::Identity => xs.shallow_clone(),
        }
    }
}

/// Stack of fully-connected layers: `h1..hN` with the chosen activation,
/// then a linear `out` layer.
///
/// All variables are created once, under `path`, when the block is built.
/// Every later forward pass reads the same variables.
#[derive(Debug)]
pub struct FeedForward {
    net: nn::SequentialT,
    input_dim: i64,
    output_dim: i64,
}

impl FeedForward {
    pub fn new(
        path: nn::Path,
        input_dim: i64,
        hidden: &[i64],
        output_dim: i64,
        activation: Activation,
    ) -> FeedForward {
        let mut net = nn::seq_t();
        let mut dim_in = input_dim;
        for (i, &width) in hidden.iter().enumerate() {
            net = net
                .add(nn::linear(&path / format!("h{}", i + 1), dim_in, width, Default::default()))
                .add_fn(move |x| activation.apply(x));
            dim_in = width;
        }
        let net = net.add(nn::linear(&path / "out", dim_in, output_dim, Default::default()));
        FeedForward {
            net,
            input_dim,
            output_dim,
        }
    }

    pub fn input_dim(&self) -> i64 {
        self.input_dim
    }

    pub fn output_dim(&self) -> i64 {
        self.output_dim
    }
}

impl nn::ModuleT for FeedForward {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.net.forward_t(xs, train)
    }
}
