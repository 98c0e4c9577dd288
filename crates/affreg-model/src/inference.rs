//! Loading a trained network and predicting affine transforms for new pairs.

use std::path::Path;

use affreg_core::image::{Image, VolumeGeometry};
use affreg_core::spatial::Point;
use affreg_core::transform::convention::{theta_from_row_major, theta_to_world, world_to_theta};
use affreg_core::transform::AffineParameters;
use affreg_io::Preprocessing;
use anyhow::{anyhow, Context, Result};
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use nalgebra::{Matrix3x4, Matrix4};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::affine::{AffineNetwork, AffineSpatialTransformer};
use crate::interpolation::PaddingMode;
use crate::io::{image_to_tensor, pair_input};
use crate::training::{TrainingConfig, MODEL_FILE};

/// Affine predicted for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Grid theta between the preprocessed volumes, as output by the network.
    pub theta: Matrix3x4<f64>,
    /// World matrix mapping fixed points (mm) to moving points (mm).
    pub world: Matrix4<f64>,
}

impl Prediction {
    /// Decompose the world matrix about `center`.
    pub fn parameters(&self, center: &Point<3>) -> Result<AffineParameters> {
        AffineParameters::from_matrix(&self.world, center).context("Predicted matrix cannot be decomposed")
    }
}

/// A trained [`AffineNetwork`] together with the preprocessing it was trained with.
pub struct AffinePredictor<B: Backend> {
    model: AffineNetwork<B>,
    preprocessing: Preprocessing,
    padding: PaddingMode,
}

impl<B: Backend> AffinePredictor<B> {
    pub fn new(model: AffineNetwork<B>, preprocessing: Preprocessing, padding: PaddingMode) -> Self {
        Self {
            model,
            preprocessing,
            padding,
        }
    }

    /// Load `config.json` and the checkpoint written by the trainer.
    pub fn load(artifact_dir: &Path, device: &B::Device) -> Result<Self> {
        let config = TrainingConfig::load_from_dir(artifact_dir)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .network
            .init::<B>(device)
            .load_file(artifact_dir.join(MODEL_FILE), &recorder, device)
            .map_err(|e| anyhow!("Failed to load checkpoint from {}: {e:?}", artifact_dir.display()))?;

        info!("Loaded model from {}", artifact_dir.display());
        Ok(Self::new(model, config.preprocessing, config.padding))
    }

    pub fn preprocessing(&self) -> &Preprocessing {
        &self.preprocessing
    }

    pub fn model(&self) -> &AffineNetwork<B> {
        &self.model
    }

    /// Preprocess a raw pair and predict the transform from fixed to moving.
    pub fn predict(&self, fixed: &Image<B, 3>, moving: &Image<B, 3>) -> Result<Prediction> {
        let fixed = self.preprocessing.apply(fixed)?;
        let moving = self.preprocessing.apply(moving)?;
        self.predict_prepared(&fixed, &moving)
    }

    /// Predict for volumes that are already at the network resolution.
    pub fn predict_prepared(&self, fixed: &Image<B, 3>, moving: &Image<B, 3>) -> Result<Prediction> {
        let input = pair_input(image_to_tensor(moving), image_to_tensor(fixed))?;
        let output = self.model.forward(input);
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Unexpected network output: {e:?}"))?;
        let theta = theta_from_row_major(&values)?;

        // resizing keeps the world extent, so the matrix is valid for the originals too
        let world = theta_to_world(&theta, &fixed.geometry(), &moving.geometry())?;
        debug!("Predicted theta {theta}");
        Ok(Prediction { theta, world })
    }

    /// Resample `moving` onto `fixed` through a prediction.
    pub fn warp(&self, moving: &Image<B, 3>, fixed: &VolumeGeometry, prediction: &Prediction) -> Result<Image<B, 3>> {
        let theta = world_to_theta(&prediction.world, fixed, &moving.geometry())?;
        AffineSpatialTransformer::new(self.padding).warp_image(moving, &theta, fixed)
    }
}
