//! Property tests for the moment estimator, the collector and the Fréchet distance.
//!
//! - distance of a population to itself is ~0
//! - distance is symmetric
//! - distance is unchanged when both populations are rotated by the same matrix
//! - uniform weights reproduce the unweighted moments
//! - batch chunking never changes the collected matrix

use fidcore::{
    collect_activations, estimate, frechet_between, FeatureExtractor, FrechetOptions, ImageBatch,
    Result,
};
use ndarray::{Array2, Array4, ArrayView4, Axis};
use proptest::collection::vec;
use proptest::prelude::*;
use std::f64::consts::TAU;

// =============================================================================
// Strategy Helpers
// =============================================================================

const DIM: usize = 3;

/// A `rows x DIM` feature matrix with entries in [-5, 5].
fn features(rows: std::ops::Range<usize>) -> impl Strategy<Value = Array2<f64>> {
    rows.prop_flat_map(|n| {
        vec(-5.0f64..5.0, n * DIM)
            .prop_map(move |v| Array2::from_shape_vec((n, DIM), v).expect("shape"))
    })
}

fn rotation(a: f64, b: f64, c: f64) -> Array2<f64> {
    let rz = ndarray::array![[a.cos(), -a.sin(), 0.0], [a.sin(), a.cos(), 0.0], [0.0, 0.0, 1.0]];
    let ry = ndarray::array![[b.cos(), 0.0, b.sin()], [0.0, 1.0, 0.0], [-b.sin(), 0.0, b.cos()]];
    let rx = ndarray::array![[1.0, 0.0, 0.0], [0.0, c.cos(), -c.sin()], [0.0, c.sin(), c.cos()]];
    rz.dot(&ry).dot(&rx)
}

fn tolerance(d: f64) -> f64 {
    1e-6 * (1.0 + d.abs())
}

/// Treats every pixel of a `n x 1 x 1 x w` image as one feature.
struct Flatten;

impl FeatureExtractor for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn extract(&self, images: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        let n = images.len_of(Axis(0));
        let w = images.len_of(Axis(3));
        Ok(Array2::from_shape_fn((n, w), |(i, j)| images[[i, 0, 0, j]]))
    }
}

// =============================================================================
// Fréchet Distance Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_self_distance_is_zero(f in features(6..30)) {
        let m = estimate(f.view(), None).unwrap();
        let d = frechet_between(&m, &m, FrechetOptions::default())
            .unwrap()
            .distance;
        prop_assert!(d < 1e-6, "self distance {}", d);
    }

    #[test]
    fn prop_distance_is_symmetric(a in features(6..30), b in features(6..30)) {
        let ma = estimate(a.view(), None).unwrap();
        let mb = estimate(b.view(), None).unwrap();
        let ab = frechet_between(&ma, &mb, FrechetOptions::default())
            .unwrap()
            .distance;
        let ba = frechet_between(&mb, &ma, FrechetOptions::default())
            .unwrap()
            .distance;
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() <= tolerance(ab), "{} vs {}", ab, ba);
    }

    #[test]
    fn prop_rotation_invariant(
        a in features(6..30),
        b in features(6..30),
        angles in (0.0f64..TAU, 0.0f64..TAU, 0.0f64..TAU),
    ) {
        let q = rotation(angles.0, angles.1, angles.2);
        let ma = estimate(a.view(), None).unwrap();
        let mb = estimate(b.view(), None).unwrap();
        let ra = estimate(a.dot(&q.t()).view(), None).unwrap();
        let rb = estimate(b.dot(&q.t()).view(), None).unwrap();

        let p = frechet_between(&ma, &mb, FrechetOptions::default())
            .unwrap()
            .distance;
        let r = frechet_between(&ra, &rb, FrechetOptions::default())
            .unwrap()
            .distance;
        prop_assert!((p - r).abs() <= tolerance(p), "{} vs {}", p, r);
    }

    #[test]
    fn prop_uniform_weights_match_unweighted(f in features(2..30), w in 0.1f64..10.0) {
        let plain = estimate(f.view(), None).unwrap();
        let weights = vec![w; f.nrows()];
        let weighted = estimate(f.view(), Some(&weights)).unwrap();
        for (x, y) in plain.mean.iter().zip(weighted.mean.iter()) {
            prop_assert!((x - y).abs() < 1e-9);
        }
        for (x, y) in plain.cov.iter().zip(weighted.cov.iter()) {
            prop_assert!((x - y).abs() < 1e-9);
        }
    }
}

// =============================================================================
// Collector Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_chunking_invariant(
        values in vec(-1.0f32..1.0, 4 * 25),
        first in 1usize..25,
        second in 1usize..25,
    ) {
        let images = Array4::from_shape_vec((25, 1, 1, 4), values).unwrap();
        let chunked = |size: usize| -> Vec<Result<ImageBatch>> {
            images
                .axis_chunks_iter(Axis(0), size)
                .map(|c| Ok(c.to_owned()))
                .collect()
        };
        let a = collect_activations(chunked(first), 25, &Flatten, |_| {}).unwrap();
        let b = collect_activations(chunked(second), 25, &Flatten, |_| {}).unwrap();
        prop_assert_eq!(a.nrows(), 25);
        prop_assert_eq!(&a, &b);
        for i in 0..25 {
            for j in 0..4 {
                prop_assert_eq!(a[[i, j]], f64::from(images[[i, 0, 0, j]]));
            }
        }
    }
}
