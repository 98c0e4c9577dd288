//! Discovery, splitting and loading of fixed/moving volume pairs.
//!
//! A data directory holds either explicit pairs named `<stem>_fixed.nii[.gz]` and
//! `<stem>_moving.nii[.gz]`, or plain volumes. Plain volumes are registered to
//! themselves: the moving image is a synthetically perturbed copy of the fixed one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use affreg_core::filter::{IntensityNormalization, ResizeFilter};
use affreg_core::image::Image;
use anyhow::{bail, Context, Result};
use burn::config::Config;
use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::nifti_io::{read_nifti_volume, NiftiVolume};

const FIXED_SUFFIX: &str = "_fixed";
const MOVING_SUFFIX: &str = "_moving";

/// Paths of one fixed/moving pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePair {
    pub name: String,
    pub fixed: PathBuf,
    pub moving: PathBuf,
}

impl VolumePair {
    pub fn is_self_pair(&self) -> bool {
        self.fixed == self.moving
    }
}

/// File name without `.nii` / `.nii.gz`, or `None` for non-NIfTI files.
fn nifti_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(".nii.gz").or_else(|| name.strip_suffix(".nii"))
}

/// Find registration pairs below `dir`.
///
/// Explicit `_fixed`/`_moving` pairs take precedence; when there are none, every volume
/// is paired with itself. Pairs are sorted by name.
pub fn discover_pairs<P: AsRef<Path>>(dir: P) -> Result<Vec<VolumePair>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        bail!("Data directory {} does not exist", dir.display());
    }

    let mut volumes: BTreeMap<String, PathBuf> = BTreeMap::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(stem) = nifti_stem(path) {
            let relative = path
                .parent()
                .and_then(|p| p.strip_prefix(dir).ok())
                .map(|p| p.join(stem))
                .unwrap_or_else(|| PathBuf::from(stem));
            let key = relative.to_string_lossy().replace('\\', "/");
            match volumes.get(&key) {
                Some(kept) => warn!(
                    "Ignoring {}: {} has the same name",
                    path.display(),
                    kept.display()
                ),
                None => {
                    volumes.insert(key, path.to_path_buf());
                }
            }
        }
    }
    if volumes.is_empty() {
        bail!("No NIfTI volumes found in {}", dir.display());
    }

    let mut pairs: Vec<VolumePair> = volumes
        .iter()
        .filter_map(|(key, fixed)| {
            let base = key.strip_suffix(FIXED_SUFFIX)?;
            let moving = volumes.get(&format!("{base}{MOVING_SUFFIX}"))?;
            Some(VolumePair {
                name: base.to_string(),
                fixed: fixed.clone(),
                moving: moving.clone(),
            })
        })
        .collect();

    if pairs.is_empty() {
        debug!("No _fixed/_moving pairs in {}, pairing volumes with themselves", dir.display());
        pairs = volumes
            .into_iter()
            .map(|(name, path)| VolumePair {
                name,
                fixed: path.clone(),
                moving: path,
            })
            .collect();
    }

    pairs.sort_by(|a, b| a.name.cmp(&b.name));
    info!("Found {} volume pairs in {}", pairs.len(), dir.display());
    Ok(pairs)
}

/// Deterministically split pairs into `(training, validation)`.
///
/// `validation_fraction` must lie in `[0, 1)`; at least one pair always stays in the
/// training set.
pub fn split_pairs(
    pairs: &[VolumePair],
    validation_fraction: f64,
    seed: u64,
) -> Result<(Vec<VolumePair>, Vec<VolumePair>)> {
    if !(0.0..1.0).contains(&validation_fraction) {
        bail!("Validation fraction must be in [0, 1), got {validation_fraction}");
    }
    if pairs.is_empty() {
        bail!("Cannot split an empty set of pairs");
    }

    let requested = (pairs.len() as f64 * validation_fraction).round() as usize;
    let n_validation = requested.min(pairs.len() - 1);

    let mut order: Vec<usize> = (0..pairs.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let mut validation: Vec<VolumePair> = order[..n_validation].iter().map(|&i| pairs[i].clone()).collect();
    let mut training: Vec<VolumePair> = order[n_validation..].iter().map(|&i| pairs[i].clone()).collect();
    validation.sort_by(|a, b| a.name.cmp(&b.name));
    training.sort_by(|a, b| a.name.cmp(&b.name));

    Ok((training, validation))
}

/// How volumes are prepared before entering the network.
#[derive(Config, Debug)]
pub struct Preprocessing {
    /// Tensor shape `[z, y, x]` every volume is resized to.
    #[config(default = "[64, 64, 64]")]
    pub target_shape: [usize; 3],
    #[config(default = "IntensityNormalization::MinMax")]
    pub intensity: IntensityNormalization,
}

impl Preprocessing {
    /// Normalise intensities at native resolution, then resize.
    pub fn apply<B: Backend>(&self, image: &Image<B, 3>) -> Result<Image<B, 3>> {
        let normalised = self.intensity.apply(image).context("Intensity normalisation failed")?;
        ResizeFilter::new(self.target_shape)
            .apply(&normalised)
            .context("Resizing failed")
    }
}

/// A pair read from disk and prepared on a device.
#[derive(Debug, Clone)]
pub struct LoadedPair<B: Backend> {
    pub name: String,
    pub fixed: Image<B, 3>,
    pub moving: Image<B, 3>,
}

/// Read all pairs (in parallel) and prepare them with `preprocessing`.
pub fn load_pairs<B: Backend>(
    pairs: &[VolumePair],
    preprocessing: &Preprocessing,
    device: &B::Device,
) -> Result<Vec<LoadedPair<B>>> {
    // Self-pairs read and prepare their volume once.
    let volumes: Vec<(String, NiftiVolume, Option<NiftiVolume>)> = pairs
        .par_iter()
        .map(|pair| -> Result<(String, NiftiVolume, Option<NiftiVolume>)> {
            let fixed = read_nifti_volume(&pair.fixed)?;
            let moving = if pair.is_self_pair() {
                None
            } else {
                Some(read_nifti_volume(&pair.moving)?)
            };
            Ok((pair.name.clone(), fixed, moving))
        })
        .collect::<Result<_>>()?;

    let loaded = volumes
        .into_iter()
        .map(|(name, fixed, moving)| -> Result<LoadedPair<B>> {
            let fixed = preprocessing.apply(&fixed.into_image::<B>(device)?)?;
            let moving = match moving {
                Some(moving) => preprocessing.apply(&moving.into_image::<B>(device)?)?,
                None => fixed.clone(),
            };
            debug!("Prepared pair {name}: {:?}", fixed.shape());
            Ok(LoadedPair { name, fixed, moving })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Loaded {} pairs at shape {:?}",
        loaded.len(),
        preprocessing.target_shape
    );
    Ok(loaded)
}
