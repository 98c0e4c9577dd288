use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer as BurnOptimizer};
use burn::tensor::backend::AutodiffBackend;

use crate::optimizer::Optimizer;

/// Adam, backed by burn's implementation.
pub struct AdamOptimizer<M: AutodiffModule<B>, B: AutodiffBackend> {
    optimizer: OptimizerAdaptor<Adam, M, B>,
    learning_rate: f64,
}

impl<M: AutodiffModule<B>, B: AutodiffBackend> AdamOptimizer<M, B> {
    pub fn new(learning_rate: f64) -> Self {
        Self::from_config(&AdamConfig::new(), learning_rate)
    }

    /// Use a prepared burn config (betas, epsilon, weight decay).
    pub fn from_config(config: &AdamConfig, learning_rate: f64) -> Self {
        Self {
            optimizer: config.init(),
            learning_rate,
        }
    }
}

impl<M, B> Optimizer<M, B> for AdamOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        self.optimizer.step(self.learning_rate, module, gradients)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
