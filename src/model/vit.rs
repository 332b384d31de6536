use std::path::PathBuf;

use candle_core::{DType, Device, IndexOp, Module, Tensor, Var};
use candle_nn::{layer_norm, LayerNorm, VarBuilder};
use candle_transformers::models::vit::{Config, Embeddings, Encoder};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use log::{debug, info};

use crate::data_setup::transform::TransformPipeline;

use super::device::DevicePlacement;
use super::error::ModelError;
use super::head::{LinearHead, WeightInit, EMBEDDING_DIM};

/// Commit of `google/vit-base-patch16-224` the default weights are pinned to.
pub const VIT_B16_REVISION: &str = "3f49326eb077187dfe1c2a2bb15fbd74e6ab91e3";

/// Pretrained ViT-B/16 (ImageNet-1k, 224x224) weights on the Hugging Face hub.
///
/// `revision` should be a commit hash; a branch name lets the weights change
/// underneath the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VitWeights {
    pub repo: String,
    pub revision: String,
    pub filename: String,
}

impl Default for VitWeights {
    fn default() -> Self {
        Self {
            repo: "google/vit-base-patch16-224".to_string(),
            revision: VIT_B16_REVISION.to_string(),
            filename: "model.safetensors".to_string(),
        }
    }
}

impl VitWeights {
    /// Preprocessing the weights were trained with.
    pub fn transforms(&self) -> TransformPipeline {
        TransformPipeline::new()
            .resize(224)
            .center_crop(224)
            .normalize([0.5, 0.5, 0.5], [0.5, 0.5, 0.5])
    }

    pub fn config(&self) -> Config {
        Config::vit_base_patch16_224()
    }

    fn fetch(&self) -> Result<PathBuf, ModelError> {
        info!("Fetching {} from {}@{}", self.filename, self.repo, self.revision);
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            self.repo.clone(),
            RepoType::Model,
            self.revision.clone(),
        ));
        Ok(repo.get(&self.filename)?)
    }
}

#[derive(Clone, Debug)]
pub enum WeightsSource {
    Hub(VitWeights),
    /// Safetensors files already on disk, same tensor names as the hub checkpoint.
    Local(Vec<PathBuf>),
}

impl Default for WeightsSource {
    fn default() -> Self {
        WeightsSource::Hub(VitWeights::default())
    }
}

impl WeightsSource {
    pub fn files(&self) -> Result<Vec<PathBuf>, ModelError> {
        match self {
            WeightsSource::Hub(weights) => Ok(vec![weights.fetch()?]),
            WeightsSource::Local(paths) => Ok(paths.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub weights: WeightsSource,
    pub device: DevicePlacement,
    pub seed: u64,
    pub head_init: WeightInit,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: WeightsSource::default(),
            device: DevicePlacement::Default,
            seed: 42,
            head_init: WeightInit::LinearDefault,
        }
    }
}

/// ViT backbone with frozen weights and a trainable linear head.
///
/// Backbone tensors are plain constants, so backpropagation never reaches them.
/// Only [`VitClassifier::trainable_vars`] should be handed to an optimizer.
pub struct VitClassifier {
    embeddings: Embeddings,
    encoder: Encoder,
    layernorm: LayerNorm,
    head: LinearHead,
    device: Device,
}

impl VitClassifier {
    /// Builds the backbone from `vb` (tensor names under `vit.`) and attaches a
    /// fresh `Linear(768 -> out_feats)` seeded with `seed`.
    pub fn from_backbone(
        cfg: &Config,
        vb: VarBuilder,
        out_feats: usize,
        seed: u64,
        head_init: WeightInit,
    ) -> Result<Self, ModelError> {
        let device = vb.device().clone();
        let vb = vb.pp("vit");

        let embeddings = Embeddings::new(cfg, false, vb.pp("embeddings"))?;
        let encoder = Encoder::new(cfg, vb.pp("encoder"))?;
        let layernorm = layer_norm(cfg.hidden_size, cfg.layer_norm_eps, vb.pp("layernorm"))?;

        let head = LinearHead::new(EMBEDDING_DIM, out_feats, seed, head_init, &device)?;

        debug!(
            "ViT backbone: {} layers, hidden size {}; head {} -> {} (seed {})",
            cfg.num_hidden_layers, cfg.hidden_size, EMBEDDING_DIM, out_feats, seed
        );

        Ok(VitClassifier {
            embeddings,
            encoder,
            layernorm,
            head,
            device,
        })
    }

    /// Class-token embedding after the final layer norm, `(N, 768)`.
    pub fn features(&self, pixel_values: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.embeddings.forward(pixel_values, None, false)?;
        let hidden = self.encoder.forward(&hidden)?;
        hidden.i((.., 0, ..))?.apply(&self.layernorm)
    }

    pub fn trainable_vars(&self) -> Vec<Var> {
        self.head.vars()
    }

    pub fn head(&self) -> &LinearHead {
        &self.head
    }

    pub fn in_features(&self) -> usize {
        self.head.in_features()
    }

    pub fn out_features(&self) -> usize {
        self.head.out_features()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl Module for VitClassifier {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.features(xs)?.apply(&self.head)
    }
}

/// Loads pretrained ViT-B/16, freezes it and replaces its head with a
/// `Linear(768 -> out_feats)` on the same device.
///
/// Neither `out_feats` nor the device is checked beforehand; candle reports
/// whatever goes wrong.
pub fn create_model_baseline_vit(out_feats: usize, config: &ModelConfig) -> Result<VitClassifier, ModelError> {
    let device = config.device.resolve()?;
    let files = config.weights.files()?;

    // SAFETY: the weight files are not modified while they are mapped
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files, DType::F32, &device)? };

    let cfg = Config::vit_base_patch16_224();
    VitClassifier::from_backbone(&cfg, vb, out_feats, config.seed, config.head_init)
}
