use tch::{nn, nn::ModuleT, Tensor};

use crate::feedforward::{Activation, FeedForward};

const HIDDEN: [i64; 5] = [800, 400, 200, 100, 50];

#[derive(Debug)]
pub struct Discriminator {
    net: FeedForward,
}

impl Discriminator {
    pub fn new(path: nn::Path, input_dim: i64, activation: Activation) -> Discriminator {
        let net = FeedForward::new(path, input_dim, &HIDDEN, 1, activation);
        Discriminator { net }
    }

    /// Realness logits of shape `(batch, 1)`, before any sigmoid.
    pub fn score(&self, xs: &Tensor) -> Tensor {
        self.net.forward_t(xs, false)
    }

    pub fn probability(&self, xs: &Tensor) -> Tensor {
        self.score(xs).sigmoid()
    }

    pub fn input_dim(&self) -> i64 {
        self.net.input_dim()
    }
}

impl nn::ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.net.forward_t(xs, train)
    }
}
