//! Evaluation of a training results directory.
//!
//! Layout: `<root>/model/*.pth` checkpoints; scores are written next to them as
//! `<root>/fid-<layer>.txt` and `<root>/impute-fid-<layer>.txt`. Evaluation is
//! best-effort per directory: missing checkpoints or imputers are skipped.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rand::Rng;
use tracing::info;

use crate::batch::MaskedDataset;
use crate::error::Result;
use crate::scoring::FidContext;
use crate::variants::{
    CheckpointArgs, GeneratorKind, Imputer, ImputerSpec, MaskScheme, ModelSpec, Sampler,
};

/// Builds the external models stored in a checkpoint.
pub trait CheckpointLoader {
    fn load_args(&self, checkpoint: &Path) -> Result<CheckpointArgs>;

    fn generator(&self, checkpoint: &Path, kind: GeneratorKind) -> Result<Box<dyn Sampler>>;

    /// `None` when the checkpoint holds no imputer weights.
    fn imputer(&self, checkpoint: &Path, spec: &ImputerSpec) -> Result<Option<Box<dyn Imputer>>>;

    fn masked_data(&self, mask: &MaskScheme) -> Result<Box<dyn MaskedDataset>>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SweepReport {
    pub checkpoint: Option<PathBuf>,
    pub generator_fid: Option<f64>,
    pub imputer_fid: Option<f64>,
}

impl SweepReport {
    pub fn skipped(&self) -> bool {
        self.generator_fid.is_none()
    }
}

/// Most recently modified `*.pth` under `<root>/model`.
pub fn latest_checkpoint(root: &Path) -> Result<Option<PathBuf>> {
    let entries = match fs::read_dir(root.join("model")) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pth") {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        let newer = match &best {
            None => true,
            Some((t, p)) => (modified, &path) > (*t, p),
        };
        if newer {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

pub fn score_file(root: &Path, layer: usize) -> PathBuf {
    root.join(format!("fid-{layer}.txt"))
}

pub fn imputer_score_file(root: &Path, layer: usize) -> PathBuf {
    root.join(format!("impute-fid-{layer}.txt"))
}

fn write_score(path: &Path, score: f64) -> Result<()> {
    fs::write(path, format!("{score}\n"))?;
    Ok(())
}

/// Score the newest checkpoint in `root` and write the score files.
pub fn evaluate_results_dir<R>(
    ctx: &FidContext,
    root: &Path,
    skip_existing: bool,
    loader: &dyn CheckpointLoader,
    rng: &mut R,
) -> Result<SweepReport>
where
    R: Rng + ?Sized,
{
    let layer = ctx.extractor().feature_layer();
    let fid_file = score_file(root, layer);
    if skip_existing && fid_file.exists() {
        return Ok(SweepReport::default());
    }
    let Some(checkpoint) = latest_checkpoint(root)? else {
        return Ok(SweepReport::default());
    };

    let spec = ModelSpec::resolve(&loader.load_args(&checkpoint)?)?;
    let generator = loader.generator(&checkpoint, spec.generator)?;
    let fid = ctx.generator_fid(generator.as_ref(), rng)?.distance;
    let name = root.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    info!(run = %name, fid, "generator scored");
    write_score(&fid_file, fid)?;

    let mut report = SweepReport {
        checkpoint: Some(checkpoint.clone()),
        generator_fid: Some(fid),
        imputer_fid: None,
    };

    let Some(imputer_spec) = &spec.imputer else {
        return Ok(report);
    };
    let Some(imputer) = loader.imputer(&checkpoint, imputer_spec)? else {
        return Ok(report);
    };
    let data = loader.masked_data(&spec.mask)?;
    let fid = ctx.imputer_fid(imputer.as_ref(), data.as_ref(), rng)?.distance;
    info!(run = %name, fid, "imputer scored");
    write_score(&imputer_score_file(root, layer), fid)?;
    report.imputer_fid = Some(fid);
    Ok(report)
}
