//! Document classifier backed by a safetensors artifact evaluated with Candle.

use std::cmp::Ordering;
use std::path::Path;

use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{ClassConfidence, LabelPrediction, ModelInput};

/// The two inference entry points exposed to the request pipeline.
pub trait Classifier: Send + Sync {
    /// Highest-scoring class.
    fn classify(&self, input: &ModelInput) -> AppResult<LabelPrediction>;

    /// Every class with its probability, most likely first.
    fn classify_proba(&self, input: &ModelInput) -> AppResult<Vec<ClassConfidence>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub num_classes: usize,
    pub hidden_channels: usize,
    pub embedding_dim: usize,
}

impl ClassifierConfig {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            ..Self::default()
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            num_classes: 4,
            hidden_channels: 16,
            embedding_dim: 32,
        }
    }
}

/// Convolutional page encoder: two stride-2 convolutions followed by global
/// average pooling, yielding one embedding per page.
struct PageEncoder {
    conv1: Conv2d,
    conv2: Conv2d,
}

impl PageEncoder {
    fn new(config: &ClassifierConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_config = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        let conv1 = conv2d(3, config.hidden_channels, 3, conv_config, vb.pp("conv1"))?;
        let conv2 = conv2d(
            config.hidden_channels,
            config.embedding_dim,
            3,
            conv_config,
            vb.pp("conv2"),
        )?;
        Ok(Self { conv1, conv2 })
    }
}

impl Module for PageEncoder {
    fn forward(&self, pages: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.conv1.forward(pages)?.relu()?;
        let features = self.conv2.forward(&hidden)?.relu()?;
        features.mean((2, 3))
    }
}

/// Immutable classifier handle, shared by every in-flight request.
pub struct DocumentClassifier {
    encoder: PageEncoder,
    head: Linear,
    device: Device,
}

impl DocumentClassifier {
    /// Loads weights from a safetensors file. Uses the first CUDA device when
    /// one is available.
    pub fn from_path(path: impl AsRef<Path>, config: ClassifierConfig) -> AppResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading document classifier from model state path");

        if !path.exists() {
            return Err(AppError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        let device = Device::cuda_if_available(0)?;
        let tensors = candle_core::safetensors::load(path, &device)?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let classifier = Self::from_var_builder(vb, config, device)?;

        info!(num_classes = config.num_classes, "Document classifier loaded");
        Ok(classifier)
    }

    pub fn from_var_builder(vb: VarBuilder, config: ClassifierConfig, device: Device) -> AppResult<Self> {
        let encoder = PageEncoder::new(&config, vb.pp("encoder"))?;
        let head = linear(config.embedding_dim, config.num_classes, vb.pp("head"))?;
        Ok(Self {
            encoder,
            head,
            device,
        })
    }

    /// Class scores for one document: page embeddings are averaged before
    /// the classification head.
    fn logits(&self, input: &ModelInput) -> AppResult<Tensor> {
        if input.is_empty() || input.pages.len() != input.length {
            return Err(AppError::inference(format!(
                "Model input holds {} page tensors for length {}",
                input.pages.len(),
                input.length
            )));
        }

        let pages = Tensor::stack(&input.pages, 0)?.to_device(&self.device)?;
        let embeddings = self.encoder.forward(&pages)?;
        let document = embeddings.mean_keepdim(0)?;
        let logits = self.head.forward(&document)?.squeeze(0)?;
        debug!(pages = input.length, "Computed document logits");
        Ok(logits)
    }
}

impl Classifier for DocumentClassifier {
    fn classify(&self, input: &ModelInput) -> AppResult<LabelPrediction> {
        let scores = self.logits(input)?.to_vec1::<f32>()?;
        let label = scores
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .map(|(index, _)| index as u32)
            .ok_or_else(|| AppError::inference("Model produced no class scores"))?;
        Ok(LabelPrediction { label })
    }

    fn classify_proba(&self, input: &ModelInput) -> AppResult<Vec<ClassConfidence>> {
        let logits = self.logits(input)?;
        let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)?.to_vec1::<f32>()?;
        Ok(rank_by_confidence(&probabilities))
    }
}

/// Pairs each class with its probability and sorts most likely first.
pub fn rank_by_confidence(probabilities: &[f32]) -> Vec<ClassConfidence> {
    let mut ranked: Vec<ClassConfidence> = probabilities
        .iter()
        .enumerate()
        .map(|(label, &confidence)| ClassConfidence {
            label: label as u32,
            confidence,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then(a.label.cmp(&b.label))
    });
    ranked
}
