//! Discrete Gaussian sampling
//!
//! Provides a sampler for discrete Gaussian distributions over Z, used for
//! error terms and for Gaussian secrets.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default Gaussian standard deviation
pub const DEFAULT_SIGMA: f64 = 3.19;

/// Discrete Gaussian sampler over Z using rejection sampling
#[derive(Clone)]
pub struct GaussianSampler {
    /// Standard deviation σ
    sigma: f64,
    /// Tailcut: reject samples beyond this many standard deviations
    tailcut: usize,
    rng: ChaCha20Rng,
}

impl GaussianSampler {
    /// Create a sampler seeded from OS entropy
    pub fn new(sigma: f64) -> Self {
        Self::from_rng(sigma, ChaCha20Rng::from_entropy())
    }

    /// Create a new Gaussian sampler with given seed for deterministic sampling
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self::from_rng(sigma, ChaCha20Rng::seed_from_u64(seed))
    }

    fn from_rng(sigma: f64, rng: ChaCha20Rng) -> Self {
        let tailcut = (sigma * 6.0).ceil() as usize;
        Self {
            sigma,
            tailcut,
            rng,
        }
    }

    /// Get the standard deviation
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Sample a single value from the discrete Gaussian D_σ
    pub fn sample(&mut self) -> i64 {
        if self.sigma == 0.0 {
            return 0;
        }
        let sigma_sq_2 = 2.0 * self.sigma * self.sigma;
        let bound = self.tailcut.max(1) as i64;

        loop {
            let x = self.rng.gen_range(-bound..=bound);

            // Accept with probability proportional to exp(-x²/(2σ²))
            let prob = (-((x * x) as f64) / sigma_sq_2).exp();
            let u: f64 = self.rng.gen();
            if u < prob {
                return x;
            }
        }
    }

    /// Sample a vector of Gaussian values
    pub fn sample_vec(&mut self, len: usize) -> Vec<i64> {
        (0..len).map(|_| self.sample()).collect()
    }
}

impl std::fmt::Debug for GaussianSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaussianSampler")
            .field("sigma", &self.sigma)
            .field("tailcut", &self.tailcut)
            .finish()
    }
}
