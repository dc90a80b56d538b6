use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tch::nn;

use crate::error::{MaganError, Result};
use crate::feedforward::Activation;

pub const GENERATOR_FILE: &str = "MAGAN_G.ot";
pub const DISCRIMINATOR_FILE: &str = "MAGAN_D.ot";
pub const META_FILE: &str = "checkpoint.json";
pub const FORMAT_VERSION: u32 = 1;

/// What is needed to rebuild the networks a checkpoint's weights belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub version: u32,
    pub dim_b1: i64,
    pub dim_b2: i64,
    pub activation: Activation,
    pub iteration: u64,
    pub generator_file: String,
    pub discriminator_file: String,
}

impl CheckpointMeta {
    pub fn new(dim_b1: i64, dim_b2: i64, activation: Activation, iteration: u64) -> CheckpointMeta {
        CheckpointMeta {
            version: FORMAT_VERSION,
            dim_b1,
            dim_b2,
            activation,
            iteration,
            generator_file: GENERATOR_FILE.to_string(),
            discriminator_file: DISCRIMINATOR_FILE.to_string(),
        }
    }

    pub fn read(folder: &Path) -> Result<CheckpointMeta> {
        let path = existing(folder.join(META_FILE))?;
        let meta: CheckpointMeta = serde_json::from_str(&fs::read_to_string(path)?)?;
        if meta.version != FORMAT_VERSION {
            return Err(MaganError::UnsupportedCheckpoint {
                found: meta.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(meta)
    }
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(MaganError::CheckpointMissing(path))
    }
}

/// Write both variable stores and the metadata into `folder`.
pub fn save(folder: &Path, meta: &CheckpointMeta, g_vs: &nn::VarStore, d_vs: &nn::VarStore) -> Result<()> {
    if !folder.is_dir() {
        fs::create_dir_all(folder)?;
    }
    g_vs.save(folder.join(&meta.generator_file))?;
    d_vs.save(folder.join(&meta.discriminator_file))?;
    fs::write(folder.join(META_FILE), serde_json::to_string_pretty(meta)?)?;
    Ok(())
}

/// Load weights into stores whose networks were built from `meta`.
pub fn load(folder: &Path, meta: &CheckpointMeta, g_vs: &mut nn::VarStore, d_vs: &mut nn::VarStore) -> Result<()> {
    g_vs.load(existing(folder.join(&meta.generator_file))?)?;
    d_vs.load(existing(folder.join(&meta.discriminator_file))?)?;
    Ok(())
}
