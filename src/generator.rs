use tch::{nn, nn::ModuleT, Tensor};

use crate::feedforward::{Activation, FeedForward};

const HIDDEN: [i64; 3] = [200, 100, 50];

/// Deterministic domain translator: no noise input, the output depends
/// only on the input batch and the current weights.
#[derive(Debug)]
pub struct Generator {
    net: FeedForward,
}

impl Generator {
    pub fn new(path: nn::Path, input_dim: i64, output_dim: i64, activation: Activation) -> Generator {
        let net = FeedForward::new(path, input_dim, &HIDDEN, output_dim, activation);
        Generator { net }
    }

    /// Translate `xs` of shape `(batch, input_dim)` into `(batch, output_dim)`.
    pub fn generate(&self, xs: &Tensor) -> Tensor {
        self.net.forward_t(xs, false)
    }

    pub fn input_dim(&self) -> i64 {
        self.net.input_dim()
    }

    pub fn output_dim(&self) -> i64 {
        self.net.output_dim()
    }
}

impl nn::ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.net.forward_t(xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_generator_output_shape() {
        let vs = nn::VarStore::new(Device::Cpu);
        let generator = Generator::new(vs.root() / "G12", 3, 5, Activation::default());
        let xs = Tensor::randn([10, 3], (Kind::Float, Device::Cpu));
        assert_eq!(generator.generate(&xs).size(), vec![10, 5]);
        // 4 linear layers, weight + bias each
        assert_eq!(vs.len(), 8);
    }

    #[test]
    fn test_generate_is_deterministic() {
        let vs = nn::VarStore::new(Device::Cpu);
        let generator = Generator::new(vs.root(), 2, 2, Activation::default());
        let xs = Tensor::randn([7, 2], (Kind::Float, Device::Cpu));
        let first = generator.generate(&xs);
        let second = generator.generate(&xs);
        assert!(first.equal(&second));
    }
}
