use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv3d, Conv3dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig3d, Relu,
};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use affreg_core::transform::convention::{identity_theta, theta_to_row_major, THETA_LEN};

/// Localisation network: stride-2 convolution blocks, global average pooling and a
/// regressor producing the 12 row-major entries of a grid theta.
#[derive(Config, Debug)]
pub struct AffineNetworkConfig {
    /// Moving and fixed volume stacked along the channel axis.
    #[config(default = 2)]
    pub in_channels: usize,
    /// Output channels of each stride-2 block.
    #[config(default = "vec![16, 32, 64, 128]")]
    pub channels: Vec<usize>,
    /// Width of the hidden regressor layer.
    #[config(default = 128)]
    pub hidden: usize,
    #[config(default = 0.2)]
    pub dropout: f64,
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv3d<B>,
    norm: BatchNorm<B, 3>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv3dConfig::new([in_channels, out_channels], [3, 3, 3])
                .with_stride([2, 2, 2])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
            activation: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.activation.forward(self.norm.forward(self.conv.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct AffineNetwork<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    hidden: Linear<B>,
    activation: Relu,
    dropout: Dropout,
    output: Linear<B>,
}

impl AffineNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AffineNetwork<B> {
        let mut blocks = Vec::with_capacity(self.channels.len());
        let mut in_channels = self.in_channels;
        for &out_channels in &self.channels {
            blocks.push(ConvBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }

        // zero weights and bias: an untrained network predicts the identity offset only
        let output = LinearConfig::new(self.hidden, THETA_LEN)
            .with_initializer(Initializer::Zeros)
            .init(device);

        AffineNetwork {
            blocks,
            hidden: LinearConfig::new(in_channels, self.hidden).init(device),
            activation: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            output,
        }
    }
}

impl<B: Backend> AffineNetwork<B> {
    /// `[B, 2, D, H, W]` → `[B, 12]` row-major grid theta.
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));

        // global average pooling: [B, C, D, H, W] -> [B, C]
        let x = x.flatten::<3>(2, 4).mean_dim(2).squeeze::<2>(2);

        let x = self.activation.forward(self.hidden.forward(x));
        let x = self.output.forward(self.dropout.forward(x));

        let batch_size = x.dims()[0];
        let identity = Tensor::<B, 1>::from_floats(theta_to_row_major(&identity_theta()), &x.device())
            .reshape([1, THETA_LEN]);
        x + identity.repeat(&[batch_size, 1])
    }
}
