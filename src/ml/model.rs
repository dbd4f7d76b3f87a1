// ============================================================
// Layer 5 — Image Classifier (Burn)
// ============================================================
// A small convolutional network for single-channel images:
//
//   [batch, 1, H, W]
//     → Conv2d 3×3 (1 → c)      + ReLU
//     → MaxPool 2×2
//     → Conv2d 3×3 (c → 2c)     + ReLU
//     → AdaptiveAvgPool → [batch, 2c, 4, 4]
//     → flatten → Linear (32c → hidden) + ReLU + Dropout
//     → Linear (hidden → num_classes)
//   = logits [batch, num_classes]
//
// The adaptive pool fixes the classifier head's input size, so
// one configuration works for any image resolution.
//
// Reference: Burn Book §3 (Building Blocks)
//            LeCun et al. (1998) Gradient-Based Learning

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Spatial size after the adaptive pool
const POOLED: usize = 4;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub num_classes: usize,

    /// Filters in the first convolution; the second has twice as many
    #[config(default = 16)]
    pub channels: usize,

    #[config(default = 128)]
    pub hidden_size: usize,

    #[config(default = 0.25)]
    pub dropout: f64,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageClassifier<B> {
        let wide = self.channels * 2;

        ImageClassifier {
            conv1: Conv2dConfig::new([1, self.channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([self.channels, wide], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool:    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            squeeze: AdaptiveAvgPool2dConfig::new([POOLED, POOLED]).init(),
            fc1:     LinearConfig::new(wide * POOLED * POOLED, self.hidden_size).init(device),
            fc2:     LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            relu:    Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    pub conv1:   Conv2d<B>,
    pub conv2:   Conv2d<B>,
    pub pool:    MaxPool2d,
    pub squeeze: AdaptiveAvgPool2d,
    pub fc1:     Linear<B>,
    pub fc2:     Linear<B>,
    pub dropout: Dropout,
    pub relu:    Relu,
}

impl<B: Backend> ImageClassifier<B> {
    /// images: [batch, 1, height, width] → logits: [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.conv1.forward(images));
        let x = self.pool.forward(x);
        let x = self.relu.forward(self.conv2.forward(x));
        let x = self.squeeze.forward(x); // [batch, 2c, 4, 4]

        let x = x.flatten::<2>(1, 3);
        let x = self.dropout.forward(self.relu.forward(self.fc1.forward(x)));
        self.fc2.forward(x)
    }

    /// Mean cross-entropy over the batch, plus the logits it came from
    pub fn forward_loss(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets);
        (loss, logits)
    }
}
