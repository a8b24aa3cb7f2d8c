//! Model variants recorded in training checkpoints.
//!
//! Checkpoints carry string tags selecting the generator, imputer and masking
//! scheme. Tags are resolved once into a [`ModelSpec`]; scoring only ever sees
//! the [`Sampler`] / [`Imputer`] capabilities built from it.

use std::collections::HashMap;

use ndarray::{Array4, ArrayView2, ArrayView4};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{FidError, Result};

/// Maps a batch of latent noise vectors to a batch of images.
pub trait Sampler {
    fn sample(&self, noise: ArrayView2<'_, f32>) -> Result<Array4<f32>>;
}

/// Completes partially observed images.
pub trait Imputer {
    /// `images`, `masks` and `noise` all share the `batch x c x h x w` shape.
    fn impute(
        &self,
        images: ArrayView4<'_, f32>,
        masks: ArrayView4<'_, f32>,
        noise: ArrayView4<'_, f32>,
    ) -> Result<Array4<f32>>;
}

impl<F> Sampler for F
where
    F: Fn(ArrayView2<'_, f32>) -> Result<Array4<f32>>,
{
    fn sample(&self, noise: ArrayView2<'_, f32>) -> Result<Array4<f32>> {
        self(noise)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    Conv,
    Fc,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImputerKind {
    Complement,
    Mask,
    FixedNoise,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MaskScheme {
    /// Each pixel observed independently; the probability may be drawn from
    /// `[obs_prob, obs_prob_high]` per image when the upper bound is set.
    Independent {
        obs_prob: f64,
        obs_prob_high: Option<f64>,
    },
    /// A square block is hidden. `None` lets the dataset pick the block size.
    Block { block_len: Option<usize> },
}

pub static GENERATOR_TAGS: Lazy<HashMap<&'static str, GeneratorKind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("conv", GeneratorKind::Conv);
    m.insert("fc", GeneratorKind::Fc);
    m
});

pub static IMPUTER_TAGS: Lazy<HashMap<&'static str, ImputerKind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("comp", ImputerKind::Complement);
    m.insert("mask", ImputerKind::Mask);
    m.insert("fix", ImputerKind::FixedNoise);
    m
});

/// Training arguments stored alongside the checkpoint weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointArgs {
    pub generator: String,
    #[serde(default)]
    pub imputer: Option<String>,
    #[serde(default = "default_mask")]
    pub mask: String,
    /// Hidden layer sizes as `"a-b-c"`.
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub block_len: usize,
    #[serde(default = "default_obs_prob")]
    pub obs_prob: f64,
    #[serde(default)]
    pub obs_prob_high: Option<f64>,
}

fn default_mask() -> String {
    "block".to_string()
}

fn default_obs_prob() -> f64 {
    0.2
}

impl CheckpointArgs {
    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

/// Imputer variant plus its hidden layer sizes.
#[derive(Clone, Debug, PartialEq)]
pub struct ImputerSpec {
    pub kind: ImputerKind,
    pub hidden: Vec<usize>,
}

/// Fully resolved model configuration of one checkpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSpec {
    pub generator: GeneratorKind,
    pub imputer: Option<ImputerSpec>,
    pub mask: MaskScheme,
}

impl ModelSpec {
    pub fn resolve(args: &CheckpointArgs) -> Result<Self> {
        let generator = *GENERATOR_TAGS
            .get(args.generator.as_str())
            .ok_or_else(|| unknown("generator", &args.generator))?;

        let imputer = match &args.imputer {
            None => None,
            Some(tag) => {
                let kind = *IMPUTER_TAGS
                    .get(tag.as_str())
                    .ok_or_else(|| unknown("imputer", tag))?;
                let hidden = match &args.arch {
                    Some(arch) => parse_arch(arch)?,
                    None => Vec::new(),
                };
                Some(ImputerSpec { kind, hidden })
            }
        };

        let mask = match args.mask.as_str() {
            "indep" => MaskScheme::Independent {
                obs_prob: args.obs_prob,
                obs_prob_high: args.obs_prob_high,
            },
            "block" => MaskScheme::Block {
                block_len: (args.block_len != 0).then_some(args.block_len),
            },
            other => return Err(unknown("mask", other)),
        };

        Ok(Self {
            generator,
            imputer,
            mask,
        })
    }
}

fn unknown(field: &'static str, tag: &str) -> FidError {
    FidError::UnknownVariant {
        field,
        tag: tag.to_string(),
    }
}

/// Parse `"784-784"` into `[784, 784]`.
pub fn parse_arch(arch: &str) -> Result<Vec<usize>> {
    arch.split('-')
        .map(|part| {
            part.trim()
                .parse()
                .map_err(|_| unknown("arch", arch))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_all_tags() {
        assert_eq!(GENERATOR_TAGS.len(), 2);
        assert_eq!(IMPUTER_TAGS.len(), 3);
        assert_eq!(GENERATOR_TAGS["fc"], GeneratorKind::Fc);
        assert_eq!(IMPUTER_TAGS["fix"], ImputerKind::FixedNoise);
    }

    #[test]
    fn test_resolve_block_checkpoint() {
        let args = CheckpointArgs::from_json_str(
            r#"{"generator": "conv", "imputer": "comp", "mask": "block",
                "arch": "784-784", "block_len": 0}"#,
        )
        .unwrap();
        let spec = ModelSpec::resolve(&args).unwrap();
        assert_eq!(spec.generator, GeneratorKind::Conv);
        assert_eq!(
            spec.imputer,
            Some(ImputerSpec {
                kind: ImputerKind::Complement,
                hidden: vec![784, 784]
            })
        );
        assert_eq!(spec.mask, MaskScheme::Block { block_len: None });
    }

    #[test]
    fn test_resolve_indep_without_imputer() {
        let args = CheckpointArgs::from_json_str(
            r#"{"generator": "fc", "mask": "indep", "obs_prob": 0.3, "obs_prob_high": 0.9}"#,
        )
        .unwrap();
        let spec = ModelSpec::resolve(&args).unwrap();
        assert!(spec.imputer.is_none());
        assert_eq!(
            spec.mask,
            MaskScheme::Independent {
                obs_prob: 0.3,
                obs_prob_high: Some(0.9)
            }
        );
    }

    #[test]
    fn test_unknown_tags() {
        let mut args = CheckpointArgs::from_json_str(r#"{"generator": "rnn"}"#).unwrap();
        assert!(matches!(
            ModelSpec::resolve(&args),
            Err(FidError::UnknownVariant {
                field: "generator",
                ..
            })
        ));

        args.generator = "conv".into();
        args.mask = "stripes".into();
        assert!(matches!(
            ModelSpec::resolve(&args),
            Err(FidError::UnknownVariant { field: "mask", .. })
        ));
    }

    #[test]
    fn test_parse_arch() {
        assert_eq!(parse_arch("512-256-128").unwrap(), vec![512, 256, 128]);
        assert!(parse_arch("512-x").is_err());
    }

    #[test]
    fn test_closure_sampler() {
        let sampler = |noise: ArrayView2<'_, f32>| -> Result<Array4<f32>> {
            Ok(Array4::zeros((noise.nrows(), 1, 2, 2)))
        };
        let out = sampler.sample(ndarray::Array2::zeros((3, 4)).view()).unwrap();
        assert_eq!(out.shape(), &[3, 1, 2, 2]);
    }
}
