//! CKKS packing of real vectors
//!
//! Slots are the values of the plaintext polynomial at the primitive `M`-th
//! roots of unity `ζ^{5^j}`, `M = 2N`. The special FFT below evaluates (and
//! inverts) that embedding in `O(n log n)` over the `n = slots` positions, and
//! a sparse packing spreads the `2n` real coordinates over the ring with gap
//! `N / (2n)`.

use std::f64::consts::PI;

use num_bigint::BigInt;
use num_complex::Complex64;
use num_traits::FromPrimitive;
use tracing::trace;

use crate::error::{modckks_err, Result};
use crate::math::crt::big_to_f64;
use crate::math::{DcrtPoly, Format};
use crate::scheme::{CryptoParameters, DecodedValues, Plaintext};

/// Coefficients of `2^120` or more are carried as big integers
const MAX_I128_BITS: i32 = 120;

/// Precomputed rotation group and roots for a ring dimension
#[derive(Clone, Debug)]
pub struct CkksEncoder {
    ring_dim: usize,
    slots: usize,
    /// `5^j mod M` for `j < N/2`
    rot_group: Vec<usize>,
    /// `exp(2πi·j/M)` for `j ≤ M`
    ksi_pows: Vec<Complex64>,
}

impl CkksEncoder {
    pub fn new(ring_dim: usize, slots: usize) -> Result<Self> {
        let half = ring_dim / 2;
        if !ring_dim.is_power_of_two() || ring_dim < 2 {
            return Err(modckks_err!(InvalidParameters, "ring_dim {} is not a power of two", ring_dim));
        }
        if slots == 0 || !slots.is_power_of_two() || slots > half {
            return Err(modckks_err!(
                InvalidParameters,
                "slot count {} must be a power of two at most {}",
                slots,
                half
            ));
        }
        let m = 2 * ring_dim;
        let mut rot_group = Vec::with_capacity(half);
        let mut five_pows = 1usize;
        for _ in 0..half {
            rot_group.push(five_pows);
            five_pows = five_pows * 5 % m;
        }
        let ksi_pows = (0..=m)
            .map(|j| Complex64::from_polar(1.0, 2.0 * PI * j as f64 / m as f64))
            .collect();
        Ok(Self {
            ring_dim,
            slots,
            rot_group,
            ksi_pows,
        })
    }

    pub fn ring_dim(&self) -> usize {
        self.ring_dim
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Encode `values` on the towers alive at `level`
    ///
    /// The scale is `sf[level]` at depth 1 and `sf_big[level]` at depth 2.
    /// Missing slots are zero.
    pub fn encode(
        &self,
        params: &CryptoParameters,
        values: &[f64],
        level: usize,
        depth: usize,
    ) -> Result<Plaintext> {
        if values.len() > self.slots {
            return Err(modckks_err!(
                InvalidParameters,
                "{} values do not fit {} slots",
                values.len(),
                self.slots
            ));
        }
        let scaling_factor = match depth {
            1 => params.scaling_factor_real(level),
            2 => params.scaling_factor_real_big(level),
            other => {
                return Err(modckks_err!(
                    InvalidParameters,
                    "plaintexts are encoded at depth 1 or 2, not {}",
                    other
                ))
            }
        };
        let level_params = params.params_at_level(level)?;

        let mut vals: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        vals.resize(self.slots, Complex64::new(0.0, 0.0));
        self.fft_special_inv(&mut vals);

        let half = self.ring_dim / 2;
        let gap = half / self.slots;
        let mut scaled = vec![0.0f64; self.ring_dim];
        for (i, v) in vals.iter().enumerate() {
            scaled[i * gap] = (v.re * scaling_factor).round();
            scaled[i * gap + half] = (v.im * scaling_factor).round();
        }

        let max = scaled.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
        if !max.is_finite() {
            return Err(modckks_err!(InvalidParameters, "encoded coefficients overflow"));
        }
        let mut element = if max < 2f64.powi(MAX_I128_BITS) {
            let coeffs: Vec<i128> = scaled.iter().map(|&x| x as i128).collect();
            DcrtPoly::from_i128(level_params, &coeffs, Format::Coefficient)
        } else {
            let coeffs = scaled
                .iter()
                .map(|&x| BigInt::from_f64(x).ok_or_else(|| modckks_err!(InvalidParameters, "coefficient {}", x)))
                .collect::<Result<Vec<_>>>()?;
            DcrtPoly::from_bigint(level_params, &coeffs, Format::Coefficient)
        };
        element.set_format(Format::Evaluation);
        trace!(level, depth, scaling_factor, towers = element.num_towers(), "encoded plaintext");

        Ok(Plaintext {
            element,
            level,
            noise_scale_deg: depth,
            scaling_factor,
            slots: self.slots,
        })
    }

    /// Decode the first `slots` real values of a plaintext
    pub fn decode(&self, plaintext: &Plaintext) -> Result<DecodedValues> {
        let slots = plaintext.slots.min(self.slots).max(1);
        let coeffs = plaintext.element.crt_interpolate()?;
        let half = self.ring_dim / 2;
        let gap = half / slots;
        let delta = plaintext.scaling_factor;

        let mut vals: Vec<Complex64> = (0..slots)
            .map(|i| {
                let idx = i * gap;
                Complex64::new(big_to_f64(&coeffs[idx]) / delta, big_to_f64(&coeffs[idx + half]) / delta)
            })
            .collect();
        self.fft_special(&mut vals);

        let imag_sq: f64 = vals.iter().map(|v| v.im * v.im).sum();
        Ok(DecodedValues {
            values: vals.iter().map(|v| v.re).collect(),
            approx_error: (imag_sq / slots as f64).sqrt(),
        })
    }

    /// Evaluate the embedding at the slot roots
    fn fft_special(&self, vals: &mut [Complex64]) {
        let size = vals.len();
        let m = 2 * self.ring_dim;
        bit_reverse(vals);
        let mut len = 2;
        while len <= size {
            let lenh = len >> 1;
            let lenq = len << 2;
            for i in (0..size).step_by(len) {
                for j in 0..lenh {
                    let idx = (self.rot_group[j] % lenq) * m / lenq;
                    let u = vals[i + j];
                    let v = vals[i + j + lenh] * self.ksi_pows[idx];
                    vals[i + j] = u + v;
                    vals[i + j + lenh] = u - v;
                }
            }
            len <<= 1;
        }
    }

    fn fft_special_inv(&self, vals: &mut [Complex64]) {
        let size = vals.len();
        let m = 2 * self.ring_dim;
        let mut len = size;
        while len >= 1 {
            let lenh = len >> 1;
            let lenq = len << 2;
            for i in (0..size).step_by(len) {
                for j in 0..lenh {
                    let idx = (lenq - self.rot_group[j] % lenq) * m / lenq;
                    let u = vals[i + j] + vals[i + j + lenh];
                    let v = (vals[i + j] - vals[i + j + lenh]) * self.ksi_pows[idx];
                    vals[i + j] = u;
                    vals[i + j + lenh] = v;
                }
            }
            len >>= 1;
        }
        bit_reverse(vals);
        let inv = 1.0 / size as f64;
        for v in vals.iter_mut() {
            *v *= inv;
        }
    }
}

fn bit_reverse(vals: &mut [Complex64]) {
    let n = vals.len();
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j >= bit {
            j -= bit;
            bit >>= 1;
        }
        j += bit;
        if i < j {
            vals.swap(i, j);
        }
    }
}
