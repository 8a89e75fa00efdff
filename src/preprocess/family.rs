//! Per-model-family channel preprocessing.

use serde::{Deserialize, Serialize};

/// `ImageNet` channel means on the unit scale.
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// `ImageNet` channel standard deviations on the unit scale.
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Channel-wise transform a classifier expects on its 0–255 RGB input.
///
/// This must match the training-time preprocessing exactly; the variant is
/// declared per model in the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preprocessing {
    /// EfficientNetV2: the network rescales internally, pixels stay 0–255.
    #[default]
    #[serde(rename = "efficientnet_v2", alias = "raw", alias = "none")]
    EfficientNetV2,
    /// Scale to 0–1.
    #[serde(rename = "unit")]
    Unit,
    /// Scale to -1–1 (MobileNet/Inception convention).
    #[serde(rename = "symmetric", alias = "tf")]
    Symmetric,
    /// Unit scale followed by `ImageNet` mean/std standardization.
    #[serde(rename = "imagenet", alias = "torch")]
    ImageNet,
}

impl Preprocessing {
    /// Transform interleaved RGB values in place.
    ///
    /// `data.len()` must be a multiple of 3.
    pub fn apply(self, data: &mut [f32]) {
        match self {
            Self::EfficientNetV2 => {}
            Self::Unit => data.iter_mut().for_each(|v| *v /= 255.0),
            Self::Symmetric => data.iter_mut().for_each(|v| *v = *v / 127.5 - 1.0),
            Self::ImageNet => {
                for pixel in data.chunks_exact_mut(3) {
                    for (c, v) in pixel.iter_mut().enumerate() {
                        *v = (*v / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                    }
                }
            }
        }
    }
}

impl std::fmt::Display for Preprocessing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EfficientNetV2 => write!(f, "efficientnet_v2"),
            Self::Unit => write!(f, "unit"),
            Self::Symmetric => write!(f, "symmetric"),
            Self::ImageNet => write!(f, "imagenet"),
        }
    }
}
