//! MAGAN: a cross-domain GAN that learns a two-way mapping between unpaired
//! domains B1 and B2 while penalising disagreement between each sample and
//! its translation.

pub mod checkpoint;
pub mod discriminator;
pub mod error;
pub mod feedforward;
pub mod generator;
pub mod graph;
pub mod losses;
pub mod model;
pub mod toy;

pub use discriminator::Discriminator;
pub use error::{MaganError, Result};
pub use feedforward::{Activation, FeedForward};
pub use generator::Generator;
pub use graph::{Layer, Networks, Translations};
pub use losses::{
    CorrespondenceLoss, FeatureCorrespondence, IdentityCorrespondence, LossKind, ZeroCorrespondence,
};
pub use model::{DeviceConfig, Magan, MaganConfig, ParameterGroups, Realness};
