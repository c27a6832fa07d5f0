//! Number-Theoretic Transform (NTT) for fast polynomial multiplication.
//!
//! Implements Cooley-Tukey radix-2 NTT for negacyclic convolution over
//! R_q = Z_q[X]/(X^n + 1). Each CRT tower of a double-CRT element owns one
//! context for its prime.
//!
//! # Theory
//!
//! For negacyclic convolution (multiplication modulo X^n + 1), we use a
//! primitive 2n-th root of unity ψ where ψ^n = -1. The NTT evaluates a
//! polynomial at the odd powers of ψ, enabling pointwise multiplication in
//! the evaluation domain.
//!
//! Values in the evaluation domain are kept in Montgomery form. Multiplying
//! an evaluation vector by a plain (non-Montgomery) scalar with ordinary
//! modular multiplication therefore still yields the correctly scaled
//! evaluation vector, which the ring layer relies on for CRT scalar products.
//!
//! # Example
//!
//! ```
//! use modckks::math::ntt::NttContext;
//!
//! let q = modckks::math::primes::first_prime(40, 512).unwrap();
//! let ctx = NttContext::new(256, q).unwrap();
//!
//! let mut coeffs = vec![1u64; 256];
//! ctx.forward(&mut coeffs);
//! ctx.inverse(&mut coeffs);
//! assert_eq!(coeffs[0], 1);
//! ```

use super::modular::ModQ;
use super::primes::root_of_unity;
use crate::error::{modckks_err, Result};

/// Precomputed NTT context with twiddle factors for one prime.
///
/// # Fields
///
/// * `n` - Ring dimension (must be a power of two)
/// * `q` - Modulus (must satisfy q ≡ 1 mod 2n)
/// * `psi` - The primitive 2n-th root of unity the tables were built from
/// * `psi_powers` - Forward twiddle factors (bit-reversed powers of ψ)
/// * `psi_inv_powers` - Inverse twiddle factors (bit-reversed powers of ψ^(-1))
/// * `n_inv` - n^(-1) mod q in Montgomery form
#[derive(Clone)]
pub struct NttContext {
    n: usize,
    q: u64,
    psi: u64,
    q_inv_neg: u64,
    r_squared: u64,
    psi_powers: Vec<u64>,
    psi_inv_powers: Vec<u64>,
    n_inv: u64,
}

impl NttContext {
    /// Creates an NTT context, searching for a primitive 2n-th root of unity.
    pub fn new(n: usize, q: u64) -> Result<Self> {
        let psi = root_of_unity(2 * n as u64, q)?;
        Self::with_root(n, q, psi)
    }

    /// Creates an NTT context from a known primitive 2n-th root of unity.
    ///
    /// Fails with `InvalidParameters` if `n` is not a power of two, if
    /// `q ≢ 1 (mod 2n)`, if `q` does not fit Montgomery arithmetic, or if
    /// `psi` does not have order exactly 2n.
    pub fn with_root(n: usize, q: u64, psi: u64) -> Result<Self> {
        if !n.is_power_of_two() || n < 2 {
            return Err(modckks_err!(
                InvalidParameters,
                "ring dimension {} must be a power of two",
                n
            ));
        }
        if q >= 1 << 62 || q % (2 * n as u64) != 1 {
            return Err(modckks_err!(
                InvalidParameters,
                "modulus {} must be below 2^62 and ≡ 1 (mod {})",
                q,
                2 * n
            ));
        }
        if ModQ::pow(psi, n as u64, q) != q - 1 {
            return Err(modckks_err!(
                InvalidParameters,
                "{} is not a primitive {}-th root of unity mod {}",
                psi,
                2 * n,
                q
            ));
        }

        let q_inv_neg = Self::compute_q_inv_neg(q);
        let r_squared = Self::compute_r_squared(q);

        let psi_mont = Self::to_montgomery(psi, q, r_squared, q_inv_neg);
        let psi_powers = Self::compute_twiddle_factors(n, psi_mont, q, q_inv_neg, r_squared);

        let psi_inv = ModQ::pow(psi, q - 2, q);
        let psi_inv_mont = Self::to_montgomery(psi_inv, q, r_squared, q_inv_neg);
        let psi_inv_powers =
            Self::compute_twiddle_factors(n, psi_inv_mont, q, q_inv_neg, r_squared);

        let n_inv_val = ModQ::pow(n as u64, q - 2, q);
        let n_inv = Self::to_montgomery(n_inv_val, q, r_squared, q_inv_neg);

        Ok(Self {
            n,
            q,
            psi,
            q_inv_neg,
            r_squared,
            psi_powers,
            psi_inv_powers,
            n_inv,
        })
    }

    /// Returns the ring dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Returns the modulus q.
    pub fn modulus(&self) -> u64 {
        self.q
    }

    /// Returns the primitive 2n-th root of unity.
    pub fn root(&self) -> u64 {
        self.psi
    }

    /// Performs forward NTT in-place using Cooley-Tukey decimation-in-time.
    ///
    /// Input coefficients are converted to Montgomery form first.
    ///
    /// # Panics
    ///
    /// Panics if `coeffs.len() != n`.
    pub fn forward(&self, coeffs: &mut [u64]) {
        assert_eq!(coeffs.len(), self.n, "Input length must match dimension");
        for c in coeffs.iter_mut() {
            *c = Self::to_montgomery(*c, self.q, self.r_squared, self.q_inv_neg);
        }
        self.forward_inplace(coeffs);
    }

    fn forward_inplace(&self, coeffs: &mut [u64]) {
        let n = self.n;
        let q = self.q;

        let mut t = n;
        let mut m = 1;

        while m < n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let j2 = j1 + t;
                let w = self.psi_powers[m + i];

                for j in j1..j2 {
                    let u = coeffs[j];
                    let v = self.montgomery_mul(coeffs[j + t], w);

                    coeffs[j] = if u + v >= q { u + v - q } else { u + v };
                    coeffs[j + t] = if u >= v { u - v } else { q - v + u };
                }
            }
            m <<= 1;
        }
    }

    /// Performs inverse NTT in-place using Gentleman-Sande decimation-in-frequency.
    ///
    /// Output is converted back from Montgomery form.
    ///
    /// # Panics
    ///
    /// Panics if `coeffs.len() != n`.
    pub fn inverse(&self, coeffs: &mut [u64]) {
        assert_eq!(coeffs.len(), self.n, "Input length must match dimension");
        self.inverse_inplace(coeffs);
        for c in coeffs.iter_mut() {
            *c = self.montgomery_mul(*c, 1);
        }
    }

    fn inverse_inplace(&self, coeffs: &mut [u64]) {
        let n = self.n;
        let q = self.q;

        let mut t = 1;
        let mut m = n;

        while m > 1 {
            m >>= 1;
            for i in 0..m {
                let j2 = i * 2 * t;
                let w = self.psi_inv_powers[m + i];

                for j in j2..(j2 + t) {
                    let u = coeffs[j];
                    let v = coeffs[j + t];

                    coeffs[j] = if u + v >= q { u + v - q } else { u + v };
                    let diff = if u >= v { u - v } else { q - v + u };
                    coeffs[j + t] = self.montgomery_mul(diff, w);
                }
            }
            t <<= 1;
        }

        for c in coeffs.iter_mut() {
            *c = self.montgomery_mul(*c, self.n_inv);
        }
    }

    /// Performs pointwise multiplication in NTT domain.
    ///
    /// Both inputs must be in Montgomery form (as produced by `forward`).
    pub fn pointwise_mul(&self, a: &[u64], b: &[u64], result: &mut [u64]) {
        assert_eq!(a.len(), self.n, "Input length must match dimension");
        assert_eq!(b.len(), self.n, "Input length must match dimension");
        assert_eq!(result.len(), self.n, "Output length must match dimension");
        for ((r, &x), &y) in result.iter_mut().zip(a).zip(b) {
            *r = self.montgomery_mul(x, y);
        }
    }

    /// Converts a value to Montgomery form.
    pub fn to_mont(&self, a: u64) -> u64 {
        Self::to_montgomery(a, self.q, self.r_squared, self.q_inv_neg)
    }

    /// Converts a value from Montgomery form.
    pub fn from_mont(&self, a: u64) -> u64 {
        self.montgomery_mul(a, 1)
    }

    #[inline]
    fn montgomery_mul(&self, a: u64, b: u64) -> u64 {
        let q = self.q;
        let ab = (a as u128) * (b as u128);
        let m = ((ab as u64).wrapping_mul(self.q_inv_neg)) as u128;
        let t = ((ab + m * (q as u128)) >> 64) as u64;
        if t >= q {
            t - q
        } else {
            t
        }
    }

    fn to_montgomery(a: u64, q: u64, r_squared: u64, q_inv_neg: u64) -> u64 {
        let ab = (a as u128) * (r_squared as u128);
        let m = ((ab as u64).wrapping_mul(q_inv_neg)) as u128;
        let t = ((ab + m * (q as u128)) >> 64) as u64;
        if t >= q {
            t - q
        } else {
            t
        }
    }

    fn compute_q_inv_neg(q: u64) -> u64 {
        let mut y: u64 = 1;
        for i in 1..64 {
            let yi = y.wrapping_mul(q) & (1u64 << i);
            y |= yi;
        }
        y.wrapping_neg()
    }

    fn compute_r_squared(q: u64) -> u64 {
        let r_mod_q = (1u128 << 64) % (q as u128);
        ((r_mod_q * r_mod_q) % (q as u128)) as u64
    }

    /// Twiddle factors in bit-reversed order, Montgomery form.
    fn compute_twiddle_factors(
        n: usize,
        psi: u64,
        q: u64,
        q_inv_neg: u64,
        r_squared: u64,
    ) -> Vec<u64> {
        let mont_mul = |a: u64, b: u64| -> u64 {
            let ab = (a as u128) * (b as u128);
            let mm = ((ab as u64).wrapping_mul(q_inv_neg)) as u128;
            let t = ((ab + mm * (q as u128)) >> 64) as u64;
            if t >= q {
                t - q
            } else {
                t
            }
        };

        let mut factors = vec![0u64; n];
        factors[1] = Self::to_montgomery(1, q, r_squared, q_inv_neg);

        for m in 1..n {
            if m.is_power_of_two() {
                // ψ^(n/(2m))
                let exp = n / (2 * m);
                let mut pow = Self::to_montgomery(1, q, r_squared, q_inv_neg);
                for _ in 0..exp {
                    pow = mont_mul(pow, psi);
                }
                factors[m] = pow;
            } else {
                let prev_idx = m & (m - 1);
                let step_idx = m & (!m + 1);
                factors[m] = mont_mul(factors[prev_idx], factors[step_idx]);
            }
        }

        factors
    }
}

impl std::fmt::Debug for NttContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NttContext")
            .field("n", &self.n)
            .field("q", &self.q)
            .field("psi", &self.psi)
            .finish()
    }
}
