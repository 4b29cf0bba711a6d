use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

/// (kernel, stride) of each strided convolution in the feature encoder.
/// Total stride 20: one frame per 1.25 ms of 16 kHz audio.
const CONV_LAYERS: [(usize, usize); 3] = [(10, 5), (3, 2), (3, 2)];

/// Frames produced by the feature encoder for `len` input samples.
pub fn output_length(len: usize) -> usize {
    CONV_LAYERS.iter().fold(len, |l, &(kernel, stride)| {
        if l < kernel { 0 } else { (l - kernel) / stride + 1 }
    })
}

/// Shortest input that yields one frame (the encoder's receptive field).
pub fn min_input_len() -> usize {
    CONV_LAYERS.iter().rev().fold(1, |l, &(kernel, stride)| (l - 1) * stride + kernel)
}

/// Which parameters stay fixed during fine-tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezePolicy {
    Nothing,
    /// Convolutional feature encoder only
    FeatureEncoder,
    /// Feature encoder and feature projection; only the head trains
    BaseModel,
}

impl FreezePolicy {
    /// Base-model freezing takes precedence when both flags are set.
    pub fn from_flags(freeze_encoder: bool, freeze_base_model: bool) -> Self {
        if freeze_encoder && freeze_base_model {
            tracing::warn!("Both freeze flags set; freezing the whole base model");
        }
        match (freeze_encoder, freeze_base_model) {
            (_, true)     => FreezePolicy::BaseModel,
            (true, false) => FreezePolicy::FeatureEncoder,
            _             => FreezePolicy::Nothing,
        }
    }
}

#[derive(Config, Debug)]
pub struct SpeechClassifierConfig {
    pub num_labels: usize,
    #[config(default = 128)]
    pub conv_dim: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
    #[config(default = 256)]
    pub classifier_proj_size: usize,
    #[config(default = 0.0)]
    pub feat_proj_dropout: f64,
    #[config(default = 0.1)]
    pub hidden_dropout: f64,
}

impl SpeechClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpeechClassifier<B> {
        let mut channels_in = 1;
        let convs = CONV_LAYERS
            .iter()
            .map(|&(kernel, stride)| {
                let conv = Conv1dConfig::new(channels_in, self.conv_dim, kernel)
                    .with_stride(stride)
                    .init(device);
                channels_in = self.conv_dim;
                conv
            })
            .collect();

        SpeechClassifier {
            feature_encoder:    FeatureEncoder { convs },
            feature_projection: LinearConfig::new(self.conv_dim, self.hidden_size).init(device),
            feat_proj_dropout:  DropoutConfig::new(self.feat_proj_dropout).init(),
            projector:          LinearConfig::new(self.hidden_size, self.classifier_proj_size).init(device),
            hidden_dropout:     DropoutConfig::new(self.hidden_dropout).init(),
            classifier:         LinearConfig::new(self.classifier_proj_size, self.num_labels).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct FeatureEncoder<B: Backend> {
    pub convs: Vec<Conv1d<B>>,
}

impl<B: Backend> FeatureEncoder<B> {
    /// [batch, samples] → [batch, frames, conv_dim]
    pub fn forward(&self, input_values: Tensor<B, 2>) -> Tensor<B, 3> {
        let mut x = input_values.unsqueeze_dim::<3>(1);
        for conv in &self.convs {
            x = burn::tensor::activation::gelu(conv.forward(x));
        }
        x.swap_dims(1, 2)
    }
}

/// Audio classifier: strided conv encoder, frame projection,
/// masked mean pooling over real frames, linear head.
#[derive(Module, Debug)]
pub struct SpeechClassifier<B: Backend> {
    pub feature_encoder:    FeatureEncoder<B>,
    pub feature_projection: Linear<B>,
    pub feat_proj_dropout:  Dropout,
    pub projector:          Linear<B>,
    pub hidden_dropout:     Dropout,
    pub classifier:         Linear<B>,
}

impl<B: Backend> SpeechClassifier<B> {
    /// Stop gradient updates for the parameters named by `policy`.
    pub fn freeze(mut self, policy: FreezePolicy) -> Self {
        match policy {
            FreezePolicy::Nothing => {}
            FreezePolicy::FeatureEncoder => {
                self.feature_encoder = self.feature_encoder.no_grad();
            }
            FreezePolicy::BaseModel => {
                self.feature_encoder    = self.feature_encoder.no_grad();
                self.feature_projection = self.feature_projection.no_grad();
            }
        }
        self
    }

    /// input_values: [batch, samples], attention_mask: [batch, samples]
    /// → logits: [batch, num_labels]
    pub fn forward(
        &self,
        input_values:   Tensor<B, 2>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let device = input_values.device();
        let [batch_size, seq_len] = input_values.dims();

        let lengths: Vec<usize> = attention_mask
            .sum_dim(1)
            .into_data()
            .iter::<i64>()
            .map(|l| l.max(0) as usize)
            .collect();

        // Inputs shorter than the receptive field are padded with silence.
        let min_len = min_input_len();
        let input_values = if seq_len < min_len {
            let pad = Tensor::zeros([batch_size, min_len - seq_len], &device);
            Tensor::cat(vec![input_values, pad], 1)
        } else {
            input_values
        };

        let hidden = self.feature_encoder.forward(input_values);
        let hidden = self.feat_proj_dropout.forward(self.feature_projection.forward(hidden));
        let hidden = self.projector.forward(hidden);
        let [_, frames, proj] = hidden.dims();

        let mask   = frame_mask::<B>(&lengths, frames, &device);
        let counts = mask
            .clone()
            .sum_dim(1)
            .clamp_min(1.0)
            .unsqueeze_dim::<3>(2)
            .expand([batch_size, 1, proj]);
        let mask = mask.unsqueeze_dim::<3>(2).expand([batch_size, frames, proj]);

        let pooled = ((hidden * mask).sum_dim(1) / counts).squeeze::<2>(1);
        self.classifier.forward(self.hidden_dropout.forward(pooled))
    }

    pub fn forward_loss(
        &self,
        input_values:   Tensor<B, 2>,
        attention_mask: Tensor<B, 2, Int>,
        labels:         Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(input_values, attention_mask);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), labels);
        (loss, logits)
    }

    pub fn num_labels(&self) -> usize {
        self.classifier.weight.val().dims()[1]
    }
}

/// 1.0 for frames computed from real audio, 0.0 for padding frames.
/// Every row keeps at least one frame.
fn frame_mask<B: Backend>(lengths: &[usize], frames: usize, device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f32> = lengths
        .iter()
        .flat_map(|&len| {
            let valid = output_length(len.max(min_input_len())).min(frames);
            (0..frames).map(move |f| if f < valid { 1.0 } else { 0.0 })
        })
        .collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([lengths.len(), frames])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_receptive_field() {
        assert_eq!(min_input_len(), 40);
        assert_eq!(output_length(39), 0);
        assert_eq!(output_length(40), 1);
        assert_eq!(output_length(16_000), 799);
    }

    #[test]
    fn test_freeze_policy_precedence() {
        assert_eq!(FreezePolicy::from_flags(true, true), FreezePolicy::BaseModel);
        assert_eq!(FreezePolicy::from_flags(true, false), FreezePolicy::FeatureEncoder);
        assert_eq!(FreezePolicy::from_flags(false, true), FreezePolicy::BaseModel);
        assert_eq!(FreezePolicy::from_flags(false, false), FreezePolicy::Nothing);
    }

    #[test]
    fn test_logits_shape() {
        let device = Default::default();
        let model: SpeechClassifier<TestBackend> = SpeechClassifierConfig::new(2)
            .with_conv_dim(8)
            .with_hidden_size(16)
            .with_classifier_proj_size(8)
            .init(&device);
        assert_eq!(model.num_labels(), 2);

        let input = Tensor::<TestBackend, 2>::zeros([3, 400], &device);
        let mask  = Tensor::<TestBackend, 2, Int>::ones([3, 400], &device);
        let logits = model.forward(input, mask);
        assert_eq!(logits.dims(), [3, 2]);
    }

    #[test]
    fn test_short_input_is_padded() {
        let device = Default::default();
        let model: SpeechClassifier<TestBackend> = SpeechClassifierConfig::new(3)
            .with_conv_dim(4)
            .with_hidden_size(4)
            .with_classifier_proj_size(4)
            .init(&device);
        let input = Tensor::<TestBackend, 2>::ones([2, 10], &device);
        let mask  = Tensor::<TestBackend, 2, Int>::ones([2, 10], &device);
        assert_eq!(model.forward(input, mask).dims(), [2, 3]);
    }

    #[test]
    fn test_padding_does_not_change_logits() {
        let device = Default::default();
        let model: SpeechClassifier<TestBackend> = SpeechClassifierConfig::new(2)
            .with_conv_dim(4)
            .with_hidden_size(8)
            .with_classifier_proj_size(4)
            .with_hidden_dropout(0.0)
            .init(&device);

        let audio: Vec<f32> = (0..200).map(|i| (i as f32 * 0.1).sin()).collect();
        let alone = model.forward(
            Tensor::<TestBackend, 1>::from_floats(audio.as_slice(), &device).reshape([1, 200]),
            Tensor::<TestBackend, 2, Int>::ones([1, 200], &device),
        );

        let mut padded = audio.clone();
        padded.extend(std::iter::repeat(0.0).take(300));
        let mut mask = vec![1i32; 200];
        mask.extend(std::iter::repeat(0).take(300));
        let with_pad = model.forward(
            Tensor::<TestBackend, 1>::from_floats(padded.as_slice(), &device).reshape([1, 500]),
            Tensor::<TestBackend, 1, Int>::from_ints(mask.as_slice(), &device).reshape([1, 500]),
        );

        let a: Vec<f32> = alone.into_data().iter::<f32>().collect();
        let b: Vec<f32> = with_pad.into_data().iter::<f32>().collect();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4, "{a:?} vs {b:?}");
        }
    }
}
