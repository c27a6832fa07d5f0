//! Ciphertexts and plaintexts with their CKKS bookkeeping.

use serde::{Deserialize, Serialize};

use crate::error::{modckks_err, ModckksError, Result};
use crate::math::DcrtPoly;
use crate::module::ModuleElement;

/// Encrypted vector of reals
///
/// `elements` holds `c0` (`1×1`) and `c1` (`1×r`) for a linear ciphertext,
/// plus `c2` (`1×r`) and, at rank > 1, `c3` (`1×C(r,2)`) before
/// relinearization. A single element is a plaintext lifted into a
/// ciphertext for additions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CiphertextRepr")]
pub struct Ciphertext {
    pub(crate) elements: Vec<ModuleElement>,
    /// Primes dropped from the top of the chain
    pub(crate) level: usize,
    /// 1 when fresh or just rescaled, 2 with a pending rescale
    pub(crate) noise_scale_deg: usize,
    pub(crate) scaling_factor: f64,
    pub(crate) slots: usize,
}

#[derive(Deserialize)]
struct CiphertextRepr {
    elements: Vec<ModuleElement>,
    level: usize,
    noise_scale_deg: usize,
    scaling_factor: f64,
    slots: usize,
}

impl TryFrom<CiphertextRepr> for Ciphertext {
    type Error = ModckksError;

    fn try_from(repr: CiphertextRepr) -> Result<Self> {
        let c0 = repr
            .elements
            .first()
            .ok_or_else(|| modckks_err!(DimensionMismatch, "ciphertext without elements"))?;
        if c0.shape() != (1, 1) {
            return Err(modckks_err!(
                DimensionMismatch,
                "c0 must be 1x1, got {}x{}",
                c0.rows(),
                c0.cols()
            ));
        }
        for (j, element) in repr.elements.iter().enumerate().skip(1) {
            if element.rows() != 1 || **element.params() != **c0.params() {
                return Err(modckks_err!(
                    DimensionMismatch,
                    "element {} is {}x{} over {} towers, c0 has {} towers",
                    j,
                    element.rows(),
                    element.cols(),
                    element.num_towers(),
                    c0.num_towers()
                ));
            }
        }
        Ok(Self {
            elements: repr.elements,
            level: repr.level,
            noise_scale_deg: repr.noise_scale_deg,
            scaling_factor: repr.scaling_factor,
            slots: repr.slots,
        })
    }
}

impl Ciphertext {
    pub fn elements(&self) -> &[ModuleElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn noise_scale_deg(&self) -> usize {
        self.noise_scale_deg
    }

    pub fn scaling_factor(&self) -> f64 {
        self.scaling_factor
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Towers left in every element
    pub fn num_towers(&self) -> usize {
        self.elements.first().map_or(0, |e| e.num_towers())
    }

    /// Module rank carried by `c1`, or 0 for a lifted plaintext
    pub fn rank(&self) -> usize {
        self.elements.get(1).map_or(0, |c1| c1.cols())
    }

    pub(crate) fn c0_c1(&self, op: &str) -> Result<(&ModuleElement, &ModuleElement)> {
        match self.elements.as_slice() {
            [c0, c1] => Ok((c0, c1)),
            other => Err(modckks_err!(
                DimensionMismatch,
                "{}: only possible for ciphertexts of size 2, got {}",
                op,
                other.len()
            )),
        }
    }
}

/// Encoded (not encrypted) vector of reals
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plaintext {
    pub(crate) element: DcrtPoly,
    pub(crate) level: usize,
    pub(crate) noise_scale_deg: usize,
    pub(crate) scaling_factor: f64,
    pub(crate) slots: usize,
}

impl Plaintext {
    pub fn element(&self) -> &DcrtPoly {
        &self.element
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn noise_scale_deg(&self) -> usize {
        self.noise_scale_deg
    }

    pub fn scaling_factor(&self) -> f64 {
        self.scaling_factor
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// One-element ciphertext carrying this plaintext, for mixed add/sub
    pub fn to_ciphertext(&self) -> Ciphertext {
        let mut element = self.element.clone();
        element.set_format(crate::math::Format::Evaluation);
        Ciphertext {
            elements: vec![ModuleElement::from_poly(element)],
            level: self.level,
            noise_scale_deg: self.noise_scale_deg,
            scaling_factor: self.scaling_factor,
            slots: self.slots,
        }
    }
}

/// Decoded slot values
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedValues {
    pub values: Vec<f64>,
    /// RMS of the imaginary parts, an estimate of the decryption noise
    pub approx_error: f64,
}

impl DecodedValues {
    /// Bits of precision implied by the imaginary-part noise
    pub fn log_precision(&self) -> f64 {
        if self.approx_error > 0.0 {
            -self.approx_error.log2()
        } else {
            f64::INFINITY
        }
    }

    /// `|log2(‖got − expected‖₂ / n)|` over the first `expected.len()` slots
    pub fn log_error(&self, expected: &[f64]) -> f64 {
        let n = expected.len().min(self.values.len());
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = self.values[..n]
            .iter()
            .zip(&expected[..n])
            .map(|(g, e)| (g - e).powi(2))
            .sum();
        (sum.sqrt() / n as f64).log2().abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_error_uses_euclidean_mean() {
        let decoded = DecodedValues {
            values: vec![1.0 + 1.0 / 1024.0, 2.0, 3.0, 4.0],
            approx_error: 0.0,
        };
        // sqrt(2^-20) / 4 = 2^-12
        assert_eq!(decoded.log_error(&[1.0, 2.0, 3.0, 4.0]), 12.0);
        assert!(decoded.log_precision().is_infinite());
    }
}
