//! Real scalars as per-tower residues.
//!
//! Multiplying a ciphertext by a real `x` means multiplying every tower by
//! `round(x · Δ) mod q_i` for the level's scaling factor `Δ`. The integer
//! can exceed 64 bits, so two strategies exist:
//!
//! * [`Native64`] rounds in `i128` up to 125 bits and recovers any remaining
//!   power of two by modular multiplications of at most `2^60` each.
//! * [`Wide128`] splits `x` and `Δ` into 53-bit mantissas and exponents and
//!   forms the product exactly in `i128` before shifting.

use crate::error::{modckks_err, Result};
use crate::math::ModQ;
use crate::params::ScalarEncoding;

const MAX_BITS_IN_WORD: i32 = 125;
const MAX_LOG_STEP: i32 = 60;

/// Encodes `value · scaling_factor` as residues modulo each of `moduli`.
pub trait ScalarToCrt: Send + Sync {
    fn residues(&self, value: f64, scaling_factor: f64, moduli: &[u64]) -> Result<Vec<u64>>;
}

/// Strategy object for a configured encoding
pub fn strategy(encoding: ScalarEncoding) -> &'static dyn ScalarToCrt {
    match encoding {
        ScalarEncoding::Native64 => &Native64,
        ScalarEncoding::Wide128 => &Wide128,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Native64;

impl ScalarToCrt for Native64 {
    fn residues(&self, value: f64, scaling_factor: f64, moduli: &[u64]) -> Result<Vec<u64>> {
        check_finite(value, scaling_factor)?;
        let magnitude = (value * scaling_factor).abs();
        let mut log_approx = 0;
        if magnitude > 0.0 {
            let log_sf = magnitude.log2().ceil() as i32;
            log_approx = (log_sf - MAX_BITS_IN_WORD).max(0);
        }
        let approx_factor = 2f64.powi(log_approx);
        let large = (value / approx_factor * scaling_factor).round() as i128;
        let mut residues: Vec<u64> = moduli.iter().map(|&q| ModQ::from_i128(large, q)).collect();

        // scale back up by 2^log_approx inside the CRT
        while log_approx > 0 {
            let step = log_approx.min(MAX_LOG_STEP);
            for (r, &q) in residues.iter_mut().zip(moduli) {
                *r = ModQ::mul(*r, (1u64 << step) % q, q);
            }
            log_approx -= step;
        }
        Ok(residues)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Wide128;

impl ScalarToCrt for Wide128 {
    fn residues(&self, value: f64, scaling_factor: f64, moduli: &[u64]) -> Result<Vec<u64>> {
        check_finite(value, scaling_factor)?;
        let (m1, e1) = decompose(value);
        let (m2, e2) = decompose(scaling_factor);
        // |m1·m2| < 2^106
        let product = m1 as i128 * m2 as i128;
        let shift = e1 + e2;

        let scaled = if shift >= 0 {
            let bits = 128 - product.unsigned_abs().leading_zeros() as i32;
            if bits + shift > 126 {
                return Err(modckks_err!(
                    InvalidParameters,
                    "scalar {} at scale {} does not fit 127 bits",
                    value,
                    scaling_factor
                ));
            }
            product << shift
        } else if -shift >= 127 {
            0
        } else {
            // round half away from zero
            let half = 1i128 << (-shift - 1);
            let rounded = (product.unsigned_abs() + half as u128) >> -shift;
            if product < 0 {
                -(rounded as i128)
            } else {
                rounded as i128
            }
        };
        Ok(moduli.iter().map(|&q| ModQ::from_i128(scaled, q)).collect())
    }
}

fn check_finite(value: f64, scaling_factor: f64) -> Result<()> {
    if !value.is_finite() || !scaling_factor.is_finite() {
        return Err(modckks_err!(
            InvalidParameters,
            "cannot encode scalar {} at scale {}",
            value,
            scaling_factor
        ));
    }
    Ok(())
}

/// Exact split `x = mantissa · 2^exponent` with `|mantissa| < 2^53`.
fn decompose(x: f64) -> (i64, i32) {
    if x == 0.0 {
        return (0, 0);
    }
    let bits = x.to_bits();
    let sign = if bits >> 63 == 1 { -1 } else { 1 };
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let fraction = (bits & ((1u64 << 52) - 1)) as i64;
    if biased == 0 {
        // subnormal
        (sign * fraction, -1074)
    } else {
        (sign * (fraction | (1i64 << 52)), biased - 1075)
    }
}
