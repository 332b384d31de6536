use candle_core::{Device, Module, Tensor, Var};
use candle_nn::Linear;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Width of the ViT-B/16 class-token embedding fed to the head.
pub const EMBEDDING_DIM: usize = 768;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum WeightInit {
    /// Uniform in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`, what `torch.nn.Linear` does.
    #[default]
    LinearDefault,
    Xavier,
    Constant(f32),
}

impl WeightInit {
    pub fn init(&self, len: usize, fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Vec<f32> {
        let limit = match self {
            WeightInit::LinearDefault => 1.0 / (fan_in.max(1) as f32).sqrt(),
            WeightInit::Xavier => (6.0 / (fan_in + fan_out).max(1) as f32).sqrt(),
            WeightInit::Constant(value) => return vec![*value; len],
        };

        let dist = Uniform::new_inclusive(-limit, limit);
        (0..len).map(|_| dist.sample(rng)).collect()
    }
}

/// Trainable `Linear(in_features -> out_features)` whose parameters are `Var`s.
#[derive(Debug)]
pub struct LinearHead {
    weight: Var,
    bias: Var,
    linear: Linear,
    in_features: usize,
    out_features: usize,
}

impl LinearHead {
    /// The RNG is seeded right before drawing, so the same seed always gives
    /// the same head.
    pub fn new(
        in_features: usize,
        out_features: usize,
        seed: u64,
        init: WeightInit,
        device: &Device,
    ) -> candle_core::Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);

        let weight_data = init.init(out_features * in_features, in_features, out_features, &mut rng);
        let bias_data = init.init(out_features, in_features, out_features, &mut rng);

        let weight = Var::from_tensor(&Tensor::from_vec(weight_data, (out_features, in_features), device)?)?;
        let bias = Var::from_tensor(&Tensor::from_vec(bias_data, out_features, device)?)?;
        let linear = Linear::new(weight.as_tensor().clone(), Some(bias.as_tensor().clone()));

        Ok(LinearHead {
            weight,
            bias,
            linear,
            in_features,
            out_features,
        })
    }

    pub fn vars(&self) -> Vec<Var> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    pub fn weight(&self) -> &Var {
        &self.weight
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Module for LinearHead {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.linear.forward(xs)
    }
}
