//! Scoring entry points.
//!
//! [`FidContext`] bundles the frozen feature extractor, the reference population
//! and the reference statistics cache. It is built once and passed by reference
//! to every scoring call.

use std::sync::Arc;

use ndarray::{Array2, Array4, ArrayView2};
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::info;

use crate::activations::{collect_activations, FeatureExtractor};
use crate::batch::{with_prefetch, ImageBatch, ImageDataset, MaskedDataset};
use crate::config::FidConfig;
use crate::error::{FidError, Result};
use crate::frechet::{frechet_between, FrechetOptions, FrechetReport};
use crate::moments::{estimate, MomentPair};
use crate::reference::{ReferenceCache, ReferenceKey};
use crate::variants::{Imputer, Sampler};

pub struct FidContext {
    extractor: Box<dyn FeatureExtractor>,
    reference: Box<dyn ImageDataset>,
    cache: Arc<ReferenceCache>,
    config: FidConfig,
}

impl FidContext {
    /// The cache is persistent when `config.stats_dir` is set, in-memory otherwise.
    pub fn new(
        extractor: Box<dyn FeatureExtractor>,
        reference: Box<dyn ImageDataset>,
        config: FidConfig,
    ) -> Result<Self> {
        config.validate()?;
        let cache = match &config.stats_dir {
            Some(dir) => ReferenceCache::persistent(dir, config.stats_prefix.clone()),
            None => ReferenceCache::in_memory(),
        };
        Ok(Self {
            extractor,
            reference,
            cache: Arc::new(cache),
            config,
        })
    }

    /// Share a cache with other contexts.
    pub fn with_cache(mut self, cache: Arc<ReferenceCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &FidConfig {
        &self.config
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    pub fn cache(&self) -> &Arc<ReferenceCache> {
        &self.cache
    }

    fn options(&self) -> FrechetOptions {
        FrechetOptions {
            eps: self.config.eps,
            imag_tolerance: self.config.imag_tolerance,
        }
    }

    fn progress(&self, label: &'static str) -> impl FnMut(usize) {
        let verbose = self.config.verbose;
        move |processed| {
            if verbose {
                info!(stage = label, processed, "progress");
            }
        }
    }

    /// Moments of the reference population, computed on first use.
    pub fn reference_stats(&self) -> Result<Arc<MomentPair>> {
        let key = ReferenceKey::of(self.extractor.as_ref());
        self.cache.get_or_compute(&key, || {
            let total = self.reference.len();
            let batches = self.reference.batches(self.config.batch_size);
            let features = with_prefetch(batches, self.config.prefetch_depth, |it| {
                collect_activations(it, total, self.extractor.as_ref(), self.progress("reference"))
            })?;
            estimate(features.view(), None)
        })
    }

    /// Activation matrix for an arbitrary batch source of exactly `total` images.
    pub fn activations<I>(&self, batches: I, total: usize) -> Result<Array2<f64>>
    where
        I: Iterator<Item = Result<ImageBatch>> + Send,
    {
        with_prefetch(batches, self.config.prefetch_depth, |it| {
            collect_activations(it, total, self.extractor.as_ref(), self.progress("images"))
        })
    }

    /// Compare a feature matrix against the reference statistics.
    pub fn score_features(
        &self,
        features: ArrayView2<'_, f64>,
        weights: Option<&[f64]>,
    ) -> Result<FrechetReport> {
        let reference = self.reference_stats()?;
        let candidate = estimate(features, weights)?;
        let report = frechet_between(&candidate, &reference, self.options())?;
        info!(
            fid = report.distance,
            regularized = report.regularized,
            "scored population"
        );
        Ok(report)
    }

    /// Draw `n_samples` images from `sampler` and score them.
    ///
    /// Latent noise is i.i.d. standard normal of width `latent_dim`; the last
    /// batch is shortened to the remaining budget.
    pub fn generator_fid<S, R>(&self, sampler: &S, rng: &mut R) -> Result<FrechetReport>
    where
        S: Sampler + ?Sized,
        R: Rng + ?Sized,
    {
        let total = self.config.n_samples;
        let batch_size = self.config.batch_size;
        let latent_dim = self.config.latent_dim;

        let mut produced = 0;
        let batches = std::iter::from_fn(|| {
            if produced >= total {
                return None;
            }
            let n = batch_size.min(total - produced);
            produced += n;
            let noise = Array2::from_shape_simple_fn((n, latent_dim), || {
                rng.sample::<f32, _>(StandardNormal)
            });
            Some(sampler.sample(noise.view()))
        });

        let features = collect_activations(
            batches,
            total,
            self.extractor.as_ref(),
            self.progress("generate"),
        )?;
        self.score_features(features.view(), None)
    }

    /// Impute every full batch of `data` and score the completed images.
    ///
    /// An incomplete final batch is dropped, so `⌊len / batch_size⌋ · batch_size`
    /// images are scored. Imputation noise is i.i.d. uniform on `[0, 1)`.
    pub fn imputer_fid<I, R>(
        &self,
        imputer: &I,
        data: &dyn MaskedDataset,
        rng: &mut R,
    ) -> Result<FrechetReport>
    where
        I: Imputer + ?Sized,
        R: Rng + ?Sized,
    {
        let batch_size = self.config.batch_size;
        let full_batches = data.len() / batch_size;
        let total = full_batches * batch_size;
        let [c, h, w] = data.image_shape();

        let batches = data.batches(batch_size).take(full_batches).map(|batch| {
            let batch = batch?;
            if batch.len() != batch_size {
                return Err(FidError::RowCountMismatch {
                    expected: batch_size,
                    actual: batch.len(),
                });
            }
            let noise = Array4::from_shape_simple_fn((batch_size, c, h, w), || rng.gen::<f32>());
            imputer.impute(batch.images.view(), batch.masks.view(), noise.view())
        });

        let features = collect_activations(
            batches,
            total,
            self.extractor.as_ref(),
            self.progress("impute"),
        )?;
        self.score_features(features.view(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::InMemoryDataset;
    use ndarray::{Array, ArrayView4, Axis};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    /// Mean of each channel half: two features per image.
    struct HalfMeans;

    impl FeatureExtractor for HalfMeans {
        fn name(&self) -> &str {
            "half-means"
        }

        fn extract(&self, images: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
            let n = images.len_of(Axis(0));
            let flat = images.to_shape((n, 4)).map_err(|e| FidError::Extractor(e.to_string()))?;
            Ok(Array2::from_shape_fn((n, 2), |(i, j)| {
                (flat[[i, 2 * j]] + flat[[i, 2 * j + 1]]) / 2.0
            }))
        }
    }

    fn reference_images() -> Array4<f32> {
        Array::from_shape_fn((40, 1, 2, 2), |(i, _, y, x)| {
            ((i * 13 + y * 7 + x * 3) % 11) as f32 / 11.0
        })
    }

    fn context(n_samples: usize) -> FidContext {
        let cfg = FidConfig {
            batch_size: 8,
            n_samples,
            latent_dim: 4,
            ..FidConfig::default()
        };
        FidContext::new(
            Box::new(HalfMeans),
            Box::new(InMemoryDataset::new(reference_images())),
            cfg,
        )
        .unwrap()
    }

    #[test]
    fn test_reference_scores_zero_against_itself() {
        let ctx = context(40);
        let feats = ctx
            .activations(
                InMemoryDataset::new(reference_images()).batches(16),
                40,
            )
            .unwrap();
        let report = ctx.score_features(feats.view(), None).unwrap();
        assert!(report.distance < 1e-6);
    }

    #[test]
    fn test_generator_uses_full_budget() {
        let ctx = context(21);
        let seen = std::cell::Cell::new(0usize);
        let sampler = |noise: ArrayView2<'_, f32>| -> Result<Array4<f32>> {
            seen.set(seen.get() + noise.nrows());
            assert_eq!(noise.ncols(), 4);
            Ok(Array4::from_shape_fn((noise.nrows(), 1, 2, 2), |(i, _, y, x)| {
                noise[[i, y * 2 + x]]
            }))
        };
        let mut rng = Pcg64::seed_from_u64(7);
        let report = ctx.generator_fid(&sampler, &mut rng).unwrap();
        assert_eq!(seen.get(), 21);
        assert!(report.distance.is_finite());
        assert!(report.distance > 0.0);
    }
}
