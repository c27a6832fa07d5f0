//! RNS basis conversion tables.
//!
//! Fast (approximate) base conversion maps residues of `x` modulo the primes
//! `q_0..q_{k-1}` to residues modulo target primes `p_j`:
//!
//! ```text
//! y_i   = [x_i · q̂_i^{-1}]_{q_i}
//! x'_j  = Σ_i y_i · [q̂_i]_{p_j}   (mod p_j)
//! ```
//!
//! The result equals `x + u·Q` for some small `0 ≤ u < k`, which hybrid key
//! switching absorbs into the noise.

use crate::error::Result;
use crate::math::crt::{big_mod, crt_product, mod_inverse};
use crate::math::modular::ModQ;

/// Precomputed `q̂_i^{-1} mod q_i` and `q̂_i mod p_j` for one source/target pair.
#[derive(Clone, Debug)]
pub struct BasisConversion {
    source: Vec<u64>,
    target: Vec<u64>,
    q_hat_inv_mod_q: Vec<u64>,
    /// Indexed `[i][j]`: source tower `i`, target tower `j`.
    q_hat_mod_p: Vec<Vec<u64>>,
}

impl BasisConversion {
    pub fn new(source: &[u64], target: &[u64]) -> Result<Self> {
        let big_q = crt_product(source);
        let mut q_hat_inv_mod_q = Vec::with_capacity(source.len());
        let mut q_hat_mod_p = Vec::with_capacity(source.len());
        for &q in source {
            let hat = &big_q / num_bigint::BigUint::from(q);
            q_hat_inv_mod_q.push(mod_inverse(big_mod(&hat, q), q)?);
            q_hat_mod_p.push(target.iter().map(|&p| big_mod(&hat, p)).collect());
        }
        Ok(Self {
            source: source.to_vec(),
            target: target.to_vec(),
            q_hat_inv_mod_q,
            q_hat_mod_p,
        })
    }

    pub fn source(&self) -> &[u64] {
        &self.source
    }

    pub fn target(&self) -> &[u64] {
        &self.target
    }

    /// Convert coefficient-domain residues into the first `target_count`
    /// target primes.
    ///
    /// `inputs[i]` holds the residues modulo `source[i]`.
    pub fn convert(&self, inputs: &[&[u64]], target_count: usize) -> Vec<Vec<u64>> {
        debug_assert_eq!(inputs.len(), self.source.len());
        debug_assert!(target_count <= self.target.len());
        let n = inputs.first().map_or(0, |x| x.len());
        let mut out = vec![vec![0u64; n]; target_count];
        let mut y = vec![0u64; self.source.len()];

        for c in 0..n {
            for (i, input) in inputs.iter().enumerate() {
                y[i] = ModQ::mul(input[c], self.q_hat_inv_mod_q[i], self.source[i]);
            }
            for (j, out_j) in out.iter_mut().enumerate() {
                let p = self.target[j] as u128;
                let mut acc = 0u128;
                for (i, &yi) in y.iter().enumerate() {
                    acc = (acc + yi as u128 * self.q_hat_mod_p[i][j] as u128) % p;
                }
                out_j[c] = acc as u64;
            }
        }
        out
    }
}

/// Tables for dividing an element of `Q_l ∪ P` by `P` with rounding.
#[derive(Clone, Debug)]
pub struct ModDownTables {
    /// Conversion from the `P` towers into the full `Q` chain; a level uses
    /// a prefix of the targets.
    pub p_to_q: BasisConversion,
    /// `P^{-1} mod q_i`
    pub p_inv_mod_q: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::primes::first_prime;
    use quickcheck_macros::quickcheck;

    fn small_primes() -> (Vec<u64>, Vec<u64>) {
        let a = first_prime(30, 64).unwrap();
        let b = first_prime(31, 64).unwrap();
        let p = first_prime(40, 64).unwrap();
        (vec![a, b], vec![p])
    }

    #[test]
    fn test_conversion_error_is_multiple_of_q() {
        let (source, target) = small_primes();
        let conv = BasisConversion::new(&source, &target).unwrap();
        let big_q = source[0] as u128 * source[1] as u128;
        let p = target[0];

        for x in [0u128, 1, 12345, big_q / 2, big_q - 1] {
            let r0 = [(x % source[0] as u128) as u64];
            let r1 = [(x % source[1] as u128) as u64];
            let out = conv.convert(&[&r0, &r1], 1);

            let got = out[0][0];
            // got ≡ x + u·Q (mod p) for u ∈ {0, 1}
            let ok = (0..2u128).any(|u| ((x + u * big_q) % p as u128) as u64 == got);
            assert!(ok, "x = {} converted to {}", x, got);
        }
    }

    #[quickcheck]
    fn prop_conversion_within_one_q(x: u64) -> bool {
        let (source, target) = small_primes();
        let conv = BasisConversion::new(&source, &target).unwrap();
        let big_q = source[0] as u128 * source[1] as u128;
        let x = x as u128 % big_q;
        let r0 = [(x % source[0] as u128) as u64];
        let r1 = [(x % source[1] as u128) as u64];
        let got = conv.convert(&[&r0, &r1], 1)[0][0];
        (0..2u128).any(|u| ((x + u * big_q) % target[0] as u128) as u64 == got)
    }
}
