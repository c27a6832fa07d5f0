//! Single-tower polynomial over R_q = Z_q[X]/(X^n + 1).
//!
//! A [`Poly`] is one CRT residue of a double-CRT ring element. Its values
//! live either in the coefficient domain or in the NTT (evaluation) domain,
//! where they are stored in Montgomery form by [`NttContext`].
//!
//! # Example
//!
//! ```
//! use modckks::math::{NttContext, Poly};
//!
//! let q = modckks::math::primes::first_prime(50, 512).unwrap();
//! let ctx = NttContext::new(256, q).unwrap();
//!
//! let mut a = Poly::constant(3, 256, q);
//! let mut b = Poly::constant(5, 256, q);
//! a.to_ntt(&ctx);
//! b.to_ntt(&ctx);
//!
//! let mut product = a.mul_ntt_domain(&b, &ctx);
//! product.from_ntt(&ctx);
//! assert_eq!(product.coeff(0), 15);
//! ```

use super::modular::ModQ;
use super::ntt::NttContext;
use rand::Rng;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Polynomial in R_q = Z_q[X]/(X^n + 1) for a single prime q.
///
/// # Fields
///
/// * `coeffs` - Coefficients, or NTT values in Montgomery form
/// * `q` - Modulus q
/// * `is_ntt` - Whether values are in the NTT domain
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Poly {
    coeffs: Vec<u64>,
    q: u64,
    is_ntt: bool,
}

impl Poly {
    /// Create zero polynomial with given dimension and modulus
    pub fn zero(dim: usize, q: u64) -> Self {
        Self {
            coeffs: vec![0; dim],
            q,
            is_ntt: false,
        }
    }

    /// Zero polynomial already flagged for the NTT domain
    pub fn zero_ntt(dim: usize, q: u64) -> Self {
        Self {
            coeffs: vec![0; dim],
            q,
            is_ntt: true,
        }
    }

    /// Create polynomial from coefficient vector
    pub fn from_coeffs(coeffs: Vec<u64>, q: u64) -> Self {
        let mut p = Self {
            coeffs,
            q,
            is_ntt: false,
        };
        p.reduce();
        p
    }

    /// Wrap raw values without reduction; `is_ntt` selects the domain flag.
    pub(crate) fn from_raw(coeffs: Vec<u64>, q: u64, is_ntt: bool) -> Self {
        Self { coeffs, q, is_ntt }
    }

    /// Create polynomial from signed coefficients
    pub fn from_signed(coeffs: &[i64], q: u64) -> Self {
        Self {
            coeffs: coeffs.iter().map(|&c| ModQ::from_signed(c, q)).collect(),
            q,
            is_ntt: false,
        }
    }

    /// Create polynomial from signed 128-bit coefficients
    pub fn from_i128(coeffs: &[i128], q: u64) -> Self {
        Self {
            coeffs: coeffs.iter().map(|&c| ModQ::from_i128(c, q)).collect(),
            q,
            is_ntt: false,
        }
    }

    /// Create polynomial with a single coefficient (constant polynomial)
    pub fn constant(value: u64, dim: usize, q: u64) -> Self {
        let mut coeffs = vec![0; dim];
        coeffs[0] = value % q;
        Self {
            coeffs,
            q,
            is_ntt: false,
        }
    }

    /// Generate a uniformly random polynomial with given RNG.
    ///
    /// Uniform values are uniform in either domain, so the caller picks the
    /// domain flag.
    pub fn random_with_rng<R: Rng>(dim: usize, q: u64, is_ntt: bool, rng: &mut R) -> Self {
        let coeffs: Vec<u64> = (0..dim).map(|_| rng.gen_range(0..q)).collect();
        Self { coeffs, q, is_ntt }
    }

    /// Get polynomial dimension
    pub fn dimension(&self) -> usize {
        self.coeffs.len()
    }

    /// Get modulus
    pub fn modulus(&self) -> u64 {
        self.q
    }

    /// Check if in NTT domain
    pub fn is_ntt(&self) -> bool {
        self.is_ntt
    }

    /// Get coefficient at index (only valid if not in NTT domain)
    pub fn coeff(&self, i: usize) -> u64 {
        assert!(!self.is_ntt, "Cannot access coefficients in NTT domain");
        self.coeffs[i]
    }

    /// Get reference to coefficient/NTT vector
    pub fn coeffs(&self) -> &[u64] {
        &self.coeffs
    }

    /// Get mutable reference to coefficient/NTT vector
    pub fn coeffs_mut(&mut self) -> &mut [u64] {
        &mut self.coeffs
    }

    fn reduce(&mut self) {
        for c in &mut self.coeffs {
            *c %= self.q;
        }
    }

    /// Convert to NTT domain
    pub fn to_ntt(&mut self, ctx: &NttContext) {
        debug_assert_eq!(ctx.modulus(), self.q, "NTT context modulus mismatch");
        if !self.is_ntt {
            ctx.forward(&mut self.coeffs);
            self.is_ntt = true;
        }
    }

    /// Convert from NTT domain to coefficient domain
    pub fn from_ntt(&mut self, ctx: &NttContext) {
        debug_assert_eq!(ctx.modulus(), self.q, "NTT context modulus mismatch");
        if self.is_ntt {
            ctx.inverse(&mut self.coeffs);
            self.is_ntt = false;
        }
    }

    /// Scalar multiplication (valid in both domains)
    pub fn scalar_mul(&self, scalar: u64) -> Self {
        let mut result = self.clone();
        result.scalar_mul_assign(scalar);
        result
    }

    /// In-place scalar multiplication
    pub fn scalar_mul_assign(&mut self, scalar: u64) {
        let scalar = scalar % self.q;
        for c in &mut self.coeffs {
            *c = ModQ::mul(*c, scalar, self.q);
        }
    }

    /// Add the constant polynomial `value`.
    ///
    /// In the coefficient domain only coefficient 0 changes; in the NTT
    /// domain every evaluation shifts by `value` (converted to Montgomery form).
    pub fn add_constant(&mut self, value: u64, ctx: &NttContext) {
        let value = value % self.q;
        if self.is_ntt {
            let v = ctx.to_mont(value);
            for c in &mut self.coeffs {
                *c = ModQ::add(*c, v, self.q);
            }
        } else if let Some(c0) = self.coeffs.first_mut() {
            *c0 = ModQ::add(*c0, value, self.q);
        }
    }

    /// Polynomial multiplication when both are already in NTT domain
    pub fn mul_ntt_domain(&self, other: &Self, ctx: &NttContext) -> Self {
        assert!(
            self.is_ntt && other.is_ntt,
            "Both polynomials must be in NTT domain"
        );
        assert_eq!(self.q, other.q, "Moduli must match");

        let mut result = vec![0u64; self.coeffs.len()];
        ctx.pointwise_mul(&self.coeffs, &other.coeffs, &mut result);

        Self {
            coeffs: result,
            q: self.q,
            is_ntt: true,
        }
    }

    /// In-place multiply-accumulate in NTT domain: self += a * b
    pub fn mul_acc_ntt_domain(&mut self, a: &Self, b: &Self, ctx: &NttContext) {
        assert!(
            self.is_ntt && a.is_ntt && b.is_ntt,
            "All polynomials must be in NTT domain"
        );
        assert_eq!(self.q, a.q, "Moduli must match");
        assert_eq!(self.q, b.q, "Moduli must match");

        let mut prod = vec![0u64; self.coeffs.len()];
        ctx.pointwise_mul(&a.coeffs, &b.coeffs, &mut prod);
        let q = self.q;
        for (s, p) in self.coeffs.iter_mut().zip(prod) {
            let sum = *s + p;
            *s = if sum >= q { sum - q } else { sum };
        }
    }

    /// Re-express a coefficient-domain polynomial modulo `new_q`, lifting each
    /// coefficient to `(-q/2, q/2]` first.
    pub fn switch_modulus_centered(&self, new_q: u64) -> Self {
        assert!(!self.is_ntt, "Modulus switching requires coefficient domain");
        let coeffs = self
            .coeffs
            .iter()
            .map(|&c| ModQ::switch_centered(c, self.q, new_q))
            .collect();
        Self {
            coeffs,
            q: new_q,
            is_ntt: false,
        }
    }

    /// Check if polynomial is zero
    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }

    /// L-infinity norm in centered representation
    pub fn linf_norm(&self) -> u64 {
        assert!(!self.is_ntt, "Cannot compute norm in NTT domain");
        self.coeffs
            .iter()
            .map(|&c| if c <= self.q / 2 { c } else { self.q - c })
            .max()
            .unwrap_or(0)
    }
}

impl PartialEq for Poly {
    fn eq(&self, other: &Self) -> bool {
        self.q == other.q && self.is_ntt == other.is_ntt && self.coeffs == other.coeffs
    }
}

impl Eq for Poly {}

impl Add for &Poly {
    type Output = Poly;

    fn add(self, rhs: Self) -> Self::Output {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl AddAssign<&Poly> for Poly {
    fn add_assign(&mut self, rhs: &Self) {
        assert_eq!(self.q, rhs.q, "Moduli must match");
        assert_eq!(self.is_ntt, rhs.is_ntt, "NTT domains must match");
        let q = self.q;
        for (a, &b) in self.coeffs.iter_mut().zip(rhs.coeffs.iter()) {
            let sum = *a + b;
            *a = if sum >= q { sum - q } else { sum };
        }
    }
}

impl Sub for &Poly {
    type Output = Poly;

    fn sub(self, rhs: Self) -> Self::Output {
        let mut out = self.clone();
        out -= rhs;
        out
    }
}

impl SubAssign<&Poly> for Poly {
    fn sub_assign(&mut self, rhs: &Self) {
        assert_eq!(self.q, rhs.q, "Moduli must match");
        assert_eq!(self.is_ntt, rhs.is_ntt, "NTT domains must match");
        let q = self.q;
        for (a, &b) in self.coeffs.iter_mut().zip(rhs.coeffs.iter()) {
            *a = if *a >= b { *a - b } else { q - b + *a };
        }
    }
}

impl Neg for &Poly {
    type Output = Poly;

    fn neg(self) -> Self::Output {
        let coeffs = self
            .coeffs
            .iter()
            .map(|&c| ModQ::negate(c, self.q))
            .collect();
        Poly {
            coeffs,
            q: self.q,
            is_ntt: self.is_ntt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::primes::first_prime;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn make_ctx(n: usize) -> NttContext {
        let q = first_prime(50, 2 * n as u64).unwrap();
        NttContext::new(n, q).unwrap()
    }

    #[test]
    fn test_add_sub_neg() {
        let ctx = make_ctx(16);
        let q = ctx.modulus();
        let a = Poly::from_signed(&[1, -2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5], q);
        let b = Poly::from_signed(&[-1, 2, -3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, -5], q);
        assert!((&a + &b).is_zero());
        assert_eq!(&a - &b, &a + &a);
        assert_eq!(-&a, b);
    }

    #[test]
    fn test_mul_ntt_domain_negacyclic() {
        let n = 32;
        let ctx = make_ctx(n);
        let q = ctx.modulus();

        // (1 + X) * X^(n-1) = X^(n-1) - 1
        let mut a = Poly::zero(n, q);
        a.coeffs_mut()[0] = 1;
        a.coeffs_mut()[1] = 1;
        let mut b = Poly::zero(n, q);
        b.coeffs_mut()[n - 1] = 1;

        a.to_ntt(&ctx);
        b.to_ntt(&ctx);
        let mut c = a.mul_ntt_domain(&b, &ctx);
        c.from_ntt(&ctx);

        assert_eq!(c.coeff(0), q - 1);
        assert_eq!(c.coeff(n - 1), 1);
        assert!(c.coeffs()[1..n - 1].iter().all(|&x| x == 0));
    }

    #[test]
    fn test_add_constant_matches_across_domains() {
        let n = 16;
        let ctx = make_ctx(n);
        let q = ctx.modulus();
        let mut rng = ChaCha20Rng::seed_from_u64(7);

        let base = Poly::random_with_rng(n, q, false, &mut rng);
        let mut coeff_side = base.clone();
        coeff_side.add_constant(99, &ctx);

        let mut ntt_side = base.clone();
        ntt_side.to_ntt(&ctx);
        ntt_side.add_constant(99, &ctx);
        ntt_side.from_ntt(&ctx);

        assert_eq!(coeff_side, ntt_side);
    }

    #[test]
    fn test_mul_acc() {
        let n = 16;
        let ctx = make_ctx(n);
        let q = ctx.modulus();
        let mut acc = Poly::constant(1, n, q);
        let mut a = Poly::constant(2, n, q);
        let mut b = Poly::constant(3, n, q);
        acc.to_ntt(&ctx);
        a.to_ntt(&ctx);
        b.to_ntt(&ctx);
        acc.mul_acc_ntt_domain(&a, &b, &ctx);
        acc.from_ntt(&ctx);
        assert_eq!(acc.coeff(0), 7);
    }

    #[test]
    fn test_switch_modulus_centered() {
        let q = first_prime(40, 32).unwrap();
        let p = first_prime(30, 32).unwrap();
        let a = Poly::from_signed(&[-7, 7, 0, -1], q);
        let b = a.switch_modulus_centered(p);
        assert_eq!(b, Poly::from_signed(&[-7, 7, 0, -1], p));
    }
}
