//! Fréchet Inception-style distance between image populations.
//!
//! Images are streamed through a frozen feature extractor, the activations are
//! summarised as Gaussian moments, and two moment pairs are compared with the
//! closed-form Fréchet distance.

pub mod activations;
pub mod batch;
pub mod config;
pub mod error;
pub mod frechet;
pub mod moments;
pub mod reference;
pub mod scoring;
pub mod sqrtm;
pub mod sweep;
pub mod variants;
pub mod welford;

#[cfg(feature = "python")]
mod python;

pub use activations::{collect_activations, ActivationBuffer, FeatureExtractor};
pub use batch::{
    with_prefetch, BatchStream, ImageBatch, ImageDataset, InMemoryDataset, InMemoryMaskedDataset,
    MaskedBatch, MaskedDataset,
};
pub use config::FidConfig;
pub use error::{FidError, Result};
pub use frechet::{
    frechet_between, frechet_distance, frechet_distance_with, FrechetOptions, FrechetReport,
};
pub use moments::{estimate, MomentPair};
pub use reference::{ReferenceCache, ReferenceKey};
pub use scoring::FidContext;
pub use sweep::{evaluate_results_dir, latest_checkpoint, CheckpointLoader, SweepReport};
pub use variants::{
    CheckpointArgs, GeneratorKind, Imputer, ImputerKind, ImputerSpec, MaskScheme, ModelSpec,
    Sampler,
};
pub use welford::StreamingMoments;
