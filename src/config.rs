//! Runtime configuration for scoring runs.
//!
//! Values come from defaults, a JSON document, or `FID_*` environment variables
//! layered over the defaults.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FidError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FidConfig {
    /// Index of the extractor layer whose activations are scored.
    pub feature_layer: usize,
    pub batch_size: usize,
    /// Number of synthetic samples drawn for generator scoring.
    pub n_samples: usize,
    pub latent_dim: usize,
    /// Diagonal offset used when the covariance product is singular.
    pub eps: f64,
    /// Largest tolerated imaginary part on the diagonal of `sqrtm`.
    pub imag_tolerance: f64,
    /// Directory for persisted reference statistics. `None` keeps them in memory.
    pub stats_dir: Option<PathBuf>,
    pub stats_prefix: String,
    /// Bounded queue depth for a producer thread; 0 runs the source inline.
    pub prefetch_depth: usize,
    pub verbose: bool,
}

impl Default for FidConfig {
    fn default() -> Self {
        Self {
            feature_layer: 0,
            batch_size: 64,
            n_samples: 60_000,
            latent_dim: 128,
            eps: 1e-6,
            imag_tolerance: 1e-3,
            stats_dir: None,
            stats_prefix: "mnist".to_string(),
            prefetch_depth: 0,
            verbose: false,
        }
    }
}

impl FidConfig {
    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json_str(source: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(source)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by any `FID_*` variables present in the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
            match raw {
                None => Ok(None),
                Some(v) => v
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| FidError::InvalidConfig(format!("{key}={v}"))),
            }
        }

        let mut cfg = Self::default();
        if let Some(v) = parsed("FID_FEATURE_LAYER", lookup("FID_FEATURE_LAYER"))? {
            cfg.feature_layer = v;
        }
        if let Some(v) = parsed("FID_BATCH_SIZE", lookup("FID_BATCH_SIZE"))? {
            cfg.batch_size = v;
        }
        if let Some(v) = parsed("FID_N_SAMPLES", lookup("FID_N_SAMPLES"))? {
            cfg.n_samples = v;
        }
        if let Some(v) = parsed("FID_LATENT_DIM", lookup("FID_LATENT_DIM"))? {
            cfg.latent_dim = v;
        }
        if let Some(v) = parsed("FID_EPS", lookup("FID_EPS"))? {
            cfg.eps = v;
        }
        if let Some(v) = parsed("FID_PREFETCH", lookup("FID_PREFETCH"))? {
            cfg.prefetch_depth = v;
        }
        if let Some(v) = parsed("FID_VERBOSE", lookup("FID_VERBOSE"))? {
            cfg.verbose = v;
        }
        if let Some(dir) = lookup("FID_STATS_DIR") {
            cfg.stats_dir = Some(PathBuf::from(dir));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FidError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.latent_dim == 0 {
            return Err(FidError::InvalidConfig("latent_dim must be positive".into()));
        }
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(FidError::InvalidConfig(format!("eps={}", self.eps)));
        }
        if !(self.imag_tolerance.is_finite() && self.imag_tolerance >= 0.0) {
            return Err(FidError::InvalidConfig(format!(
                "imag_tolerance={}",
                self.imag_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference_setup() {
        let cfg = FidConfig::default();
        assert_eq!(cfg.feature_layer, 0);
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.n_samples, 60_000);
        assert_eq!(cfg.latent_dim, 128);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_json_partial_override() {
        let cfg = FidConfig::from_json_str(r#"{"batch_size": 16, "stats_dir": "/tmp/stats"}"#)
            .unwrap();
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.stats_dir, Some(PathBuf::from("/tmp/stats")));
        assert_eq!(cfg.eps, 1e-6);
    }

    #[test]
    fn test_json_rejects_zero_batch() {
        let err = FidConfig::from_json_str(r#"{"batch_size": 0}"#).unwrap_err();
        assert!(matches!(err, FidError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_lookup() {
        let vars: HashMap<&str, &str> = [
            ("FID_FEATURE_LAYER", "2"),
            ("FID_EPS", "1e-4"),
            ("FID_VERBOSE", "true"),
        ]
        .into_iter()
        .collect();
        let cfg = FidConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.feature_layer, 2);
        assert_eq!(cfg.eps, 1e-4);
        assert!(cfg.verbose);
        assert_eq!(cfg.batch_size, 64);
    }

    #[test]
    fn test_env_bad_value() {
        let err = FidConfig::from_lookup(|k| (k == "FID_BATCH_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(format!("{err}").contains("FID_BATCH_SIZE"));
    }
}
