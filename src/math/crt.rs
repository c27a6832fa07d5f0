//! CRT (Chinese Remainder Theorem) helpers.
//!
//! Inverses over word-sized primes plus big-integer reconstruction used by
//! decryption and by the basis-conversion table builders.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::{modckks_err, Result};

/// Compute a modular inverse using extended Euclidean algorithm.
///
/// Returns `x` such that `(a * x) % modulus == 1`, or `InvalidParameters`
/// when `a` shares a factor with the modulus.
pub fn mod_inverse(a: u64, modulus: u64) -> Result<u64> {
    let mut t: i128 = 0;
    let mut new_t: i128 = 1;
    let mut r: i128 = modulus as i128;
    let mut new_r: i128 = (a % modulus) as i128;

    while new_r != 0 {
        let quotient = r / new_r;
        let tmp_t = t - quotient * new_t;
        t = new_t;
        new_t = tmp_t;

        let tmp_r = r - quotient * new_r;
        r = new_r;
        new_r = tmp_r;
    }

    if r != 1 {
        return Err(modckks_err!(
            InvalidParameters,
            "{} is not invertible modulo {}",
            a,
            modulus
        ));
    }

    if t < 0 {
        t += modulus as i128;
    }
    Ok(t as u64)
}

/// Product of moduli as a big integer.
pub fn crt_product(moduli: &[u64]) -> BigUint {
    moduli
        .iter()
        .fold(BigUint::one(), |acc, &m| acc * BigUint::from(m))
}

/// Reduce a big integer modulo a word-sized prime.
pub fn big_mod(value: &BigUint, q: u64) -> u64 {
    (value % BigUint::from(q)).to_u64().unwrap_or(0)
}

/// Reduce a signed big integer into Z_q.
pub fn big_signed_mod(value: &BigInt, q: u64) -> u64 {
    let qb = BigInt::from(q);
    let mut r = value % &qb;
    if r.is_negative() {
        r += &qb;
    }
    r.to_u64().unwrap_or(0)
}

/// Precomputed CRT reconstruction for a fixed list of moduli.
///
/// `x = Σ_i [x_i · (Q/q_i)^{-1}]_{q_i} · (Q/q_i) mod Q`, returned in the
/// centered range `(-Q/2, Q/2]`.
#[derive(Clone, Debug)]
pub struct CrtReconstructor {
    modulus: BigUint,
    half: BigUint,
    q_hat: Vec<BigUint>,
    q_hat_inv: Vec<u64>,
    moduli: Vec<u64>,
}

impl CrtReconstructor {
    pub fn new(moduli: &[u64]) -> Result<Self> {
        let modulus = crt_product(moduli);
        let mut q_hat = Vec::with_capacity(moduli.len());
        let mut q_hat_inv = Vec::with_capacity(moduli.len());
        for &q in moduli {
            let hat = &modulus / BigUint::from(q);
            q_hat_inv.push(mod_inverse(big_mod(&hat, q), q)?);
            q_hat.push(hat);
        }
        let half = &modulus >> 1;
        Ok(Self {
            modulus,
            half,
            q_hat,
            q_hat_inv,
            moduli: moduli.to_vec(),
        })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Reconstruct one centered value from its residues.
    pub fn reconstruct(&self, residues: &[u64]) -> BigInt {
        debug_assert_eq!(residues.len(), self.moduli.len());
        let mut acc = BigUint::zero();
        for (i, &x) in residues.iter().enumerate() {
            let q = self.moduli[i];
            let y = ((x as u128 * self.q_hat_inv[i] as u128) % q as u128) as u64;
            acc += &self.q_hat[i] * BigUint::from(y);
        }
        acc %= &self.modulus;
        if acc > self.half {
            BigInt::from(acc) - BigInt::from(self.modulus.clone())
        } else {
            BigInt::from(acc)
        }
    }
}

/// Convert a centered big integer to f64 without overflowing the mantissa path.
pub fn big_to_f64(value: &BigInt) -> f64 {
    value.to_f64().unwrap_or_else(|| {
        if value.is_negative() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    })
}
