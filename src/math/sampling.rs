//! Randomness for key generation and encryption.
//!
//! [`RandomSource`] bundles the uniform ChaCha20 stream with the discrete
//! Gaussian sampler. Small distributions (Gaussian, ternary, sparse ternary)
//! produce signed integer vectors that the ring layer then reduces into each
//! CRT tower, so every tower carries the same small polynomial.

use rand::seq::index::sample as sample_indices;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use super::gaussian::GaussianSampler;

/// Uniform and Gaussian randomness shared by one scheme instance.
#[derive(Clone, Debug)]
pub struct RandomSource {
    rng: ChaCha20Rng,
    gaussian: GaussianSampler,
}

impl RandomSource {
    /// Seeded from OS entropy.
    pub fn new(sigma: f64) -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
            gaussian: GaussianSampler::new(sigma),
        }
    }

    /// Deterministic source for tests and reproducible runs.
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            gaussian: GaussianSampler::with_seed(sigma, seed.wrapping_add(0x9e37_79b9_7f4a_7c15)),
        }
    }

    pub fn sigma(&self) -> f64 {
        self.gaussian.sigma()
    }

    /// Uniform stream, for values drawn directly modulo each tower's prime.
    pub fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }

    pub fn gaussian_vec(&mut self, len: usize) -> Vec<i64> {
        self.gaussian.sample_vec(len)
    }

    /// Coefficients uniform over {-1, 0, 1}.
    pub fn ternary_vec(&mut self, len: usize) -> Vec<i64> {
        (0..len).map(|_| self.rng.gen_range(-1i64..=1)).collect()
    }

    /// Exactly `hamming_weight` nonzero coefficients, each ±1.
    pub fn sparse_ternary_vec(&mut self, len: usize, hamming_weight: usize) -> Vec<i64> {
        let weight = hamming_weight.min(len);
        let mut out = vec![0i64; len];
        for idx in sample_indices(&mut self.rng, len, weight).into_iter() {
            out[idx] = if self.rng.gen::<bool>() { 1 } else { -1 };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ternary_range() {
        let mut src = RandomSource::with_seed(3.19, 5);
        let v = src.ternary_vec(4096);
        assert!(v.iter().all(|&x| (-1..=1).contains(&x)));
        // all three values should appear
        for target in [-1, 0, 1] {
            assert!(v.contains(&target));
        }
    }

    #[test]
    fn test_sparse_ternary_weight() {
        let mut src = RandomSource::with_seed(3.19, 6);
        let v = src.sparse_ternary_vec(1024, 192);
        assert_eq!(v.iter().filter(|&&x| x != 0).count(), 192);
        assert!(v.iter().all(|&x| (-1..=1).contains(&x)));
    }

    #[test]
    fn test_seeded_sources_agree() {
        let mut a = RandomSource::with_seed(3.19, 11);
        let mut b = RandomSource::with_seed(3.19, 11);
        assert_eq!(a.gaussian_vec(64), b.gaussian_vec(64));
        assert_eq!(a.ternary_vec(64), b.ternary_vec(64));
        assert_eq!(a.rng().gen::<u64>(), b.rng().gen::<u64>());
    }
}
