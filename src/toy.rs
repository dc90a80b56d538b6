//! Synthetic two-domain problem for demos and tests.
//!
//! Domain B1 is a noisy unit ring in 2-D. Domain B2 is an independent draw
//! of the same ring, rotated, scaled and shifted, so coordinate `i` of B1
//! loosely corresponds to coordinate `i` of B2.

use std::f64::consts::PI;

use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::{Device, Kind, Tensor};

pub const TOY_DIM: i64 = 2;
const ROTATION: f64 = PI / 6.0;
const SCALE: f64 = 1.5;
const SHIFT: [f64; 2] = [0.5, -0.5];
const NOISE: f64 = 0.05;

pub struct ToyDomains {
    pub b1: Tensor,
    pub b2: Tensor,
    rng: StdRng,
}

fn ring(rng: &mut StdRng, samples: usize) -> Vec<[f64; 2]> {
    let angle = Uniform::new(0.0, 2.0 * PI);
    let noise = Uniform::new(-NOISE, NOISE);
    (0..samples)
        .map(|_| {
            let theta = rng.sample(angle);
            let radius = 1.0 + rng.sample(noise);
            [radius * theta.cos(), radius * theta.sin()]
        })
        .collect()
}

fn to_tensor(points: &[[f64; 2]]) -> Tensor {
    let flat: Vec<f32> = points.iter().flat_map(|p| p.map(|v| v as f32)).collect();
    Tensor::from_slice(&flat).view([points.len() as i64, TOY_DIM])
}

impl ToyDomains {
    pub fn new(samples: usize, seed: u64) -> ToyDomains {
        let mut rng = StdRng::seed_from_u64(seed);
        let b1 = ring(&mut rng, samples);
        let (sin, cos) = ROTATION.sin_cos();
        let b2: Vec<[f64; 2]> = ring(&mut rng, samples)
            .into_iter()
            .map(|[x, y]| {
                [
                    SCALE * (cos * x - sin * y) + SHIFT[0],
                    SCALE * (sin * x + cos * y) + SHIFT[1],
                ]
            })
            .collect();
        ToyDomains {
            b1: to_tensor(&b1),
            b2: to_tensor(&b2),
            rng,
        }
    }

    pub fn len(&self) -> i64 {
        self.b1.size()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Independent random minibatches from each domain (no pairing).
    pub fn minibatch(&mut self, batch_size: i64, device: Device) -> (Tensor, Tensor) {
        let xb1 = draw(&mut self.rng, &self.b1, batch_size);
        let xb2 = draw(&mut self.rng, &self.b2, batch_size);
        (xb1.to_device(device), xb2.to_device(device))
    }
}

fn draw(rng: &mut StdRng, data: &Tensor, batch_size: i64) -> Tensor {
    let size = data.size()[0];
    let index: Vec<i64> = (0..batch_size).map(|_| rng.gen_range(0..size)).collect();
    data.index_select(0, &Tensor::from_slice(&index)).to_kind(Kind::Float)
}
