//! Crypto parameters: the moduli chain and every CRT table derived from it.
//!
//! Built once per context from a [`CkksModConfig`] and shared through `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{modckks_err, Result};
use crate::math::crt::{big_mod, crt_product};
use crate::math::primes::{first_prime, last_prime_below, next_prime, previous_prime};
use crate::math::{mod_inverse, BasisConversion, CrtParams, ModDownTables, ModQ};
use crate::params::{CkksModConfig, ScalingTechnique};

/// Base extension of one key-switching digit into its complement basis.
#[derive(Clone, Debug)]
pub struct DigitConversion {
    /// The digit's towers at this level
    pub digit_params: Arc<CrtParams>,
    /// `Q_l` without the digit's towers, followed by `P`
    pub compl_params: Arc<CrtParams>,
    pub conv: BasisConversion,
}

/// Immutable per-context parameters
///
/// Index conventions:
/// - `level` counts primes dropped from the top of `Q`, so a ciphertext at
///   level `l` carries `size_q - l` towers
/// - tables keyed by tower count use `size_ql - 1`
#[derive(Debug)]
pub struct CryptoParameters {
    config: CkksModConfig,
    element_params: Arc<CrtParams>,
    /// `element_params.truncated(k + 1)` at index `k`
    level_params: Vec<Arc<CrtParams>>,
    params_p: Arc<CrtParams>,
    params_qp: Arc<CrtParams>,
    num_per_part_q: usize,
    num_part_q: usize,
    p_mod_q: Vec<u64>,
    mod_down: ModDownTables,
    /// `[size_ql - 1][part]`
    digit_conversions: Vec<Vec<DigitConversion>>,
    /// `[t][i] = q_t^{-1} mod q_i` for `i < t`
    ql_inv_mod_q: Vec<Vec<u64>>,
    scaling_factors: Vec<f64>,
    scaling_factors_big: Vec<f64>,
    mod_reduce_factors: Vec<f64>,
}

impl CryptoParameters {
    /// Generate the moduli chain and precompute all tables
    pub fn new(config: CkksModConfig) -> Result<Self> {
        config.validate()?;
        let ring_dim = config.ring_dim;

        let moduli_q = generate_moduli_q(&config)?;
        let size_q = moduli_q.len();
        let element_params = Arc::new(CrtParams::new(ring_dim, &moduli_q)?);

        let num_part_q_requested = config.effective_num_large_digits().min(size_q);
        let alpha = size_q.div_ceil(num_part_q_requested);
        if size_q <= alpha * (num_part_q_requested - 1) {
            return Err(modckks_err!(
                InvalidParameters,
                "{} digits cannot partition {} primes; use fewer digits",
                num_part_q_requested,
                size_q
            ));
        }
        let num_part_q = size_q.div_ceil(alpha);

        let max_part_bits = (0..num_part_q)
            .map(|part| {
                let end = (alpha * (part + 1)).min(size_q);
                moduli_q[alpha * part..end]
                    .iter()
                    .map(|&q| (q as f64).log2())
                    .sum::<f64>()
            })
            .fold(0.0, f64::max);
        let size_p = (max_part_bits / config.aux_mod_size as f64).ceil().max(1.0) as usize;
        let moduli_p = generate_moduli_p(&config, &moduli_q, size_p)?;
        let params_p = Arc::new(CrtParams::new(ring_dim, &moduli_p)?);
        let params_qp = Arc::new(element_params.concat(&params_p));

        debug!(
            size_q,
            size_p,
            alpha,
            num_part_q,
            technique = %config.scaling_technique,
            "generated moduli chain"
        );

        let big_p = crt_product(&moduli_p);
        let p_mod_q: Vec<u64> = moduli_q.iter().map(|&q| big_mod(&big_p, q)).collect();
        let p_inv_mod_q = moduli_q
            .iter()
            .zip(&p_mod_q)
            .map(|(&q, &p)| mod_inverse(p, q))
            .collect::<Result<Vec<_>>>()?;
        let mod_down = ModDownTables {
            p_to_q: BasisConversion::new(&moduli_p, &moduli_q)?,
            p_inv_mod_q,
        };

        let ql_inv_mod_q = (0..size_q)
            .map(|t| {
                (0..t)
                    .map(|i| mod_inverse(ModQ::reduce(moduli_q[t], moduli_q[i]), moduli_q[i]))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let level_params: Vec<Arc<CrtParams>> = (1..=size_q)
            .map(|count| Arc::new(element_params.truncated(count)))
            .collect();

        let digit_conversions = (1..=size_q)
            .map(|size_ql| {
                let parts = size_ql.div_ceil(alpha).min(num_part_q);
                (0..parts)
                    .map(|part| digit_conversion(&element_params, &params_p, size_ql, alpha, part))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let (scaling_factors, scaling_factors_big) = scaling_factors(&config, &moduli_q);
        let mod_reduce_factors = moduli_q
            .iter()
            .map(|&q| {
                if config.scaling_technique.is_flexible() {
                    q as f64
                } else {
                    (config.scaling_mod_size as f64).exp2()
                }
            })
            .collect();

        Ok(Self {
            config,
            element_params,
            level_params,
            params_p,
            params_qp,
            num_per_part_q: alpha,
            num_part_q,
            p_mod_q,
            mod_down,
            digit_conversions,
            ql_inv_mod_q,
            scaling_factors,
            scaling_factors_big,
            mod_reduce_factors,
        })
    }

    pub fn config(&self) -> &CkksModConfig {
        &self.config
    }

    pub fn rank(&self) -> usize {
        self.config.rank()
    }

    pub fn ring_dim(&self) -> usize {
        self.config.ring_dim
    }

    pub fn scaling_technique(&self) -> ScalingTechnique {
        self.config.scaling_technique
    }

    /// The full chain `Q`
    pub fn element_params(&self) -> &Arc<CrtParams> {
        &self.element_params
    }

    pub fn size_q(&self) -> usize {
        self.element_params.len()
    }

    /// `Q` restricted to the towers alive at `level`
    pub fn params_at_level(&self, level: usize) -> Result<&Arc<CrtParams>> {
        let size_q = self.size_q();
        if level >= size_q {
            return Err(modckks_err!(
                PrecisionExhausted,
                "level {} leaves no towers of {}; consider increasing the depth",
                level,
                size_q
            ));
        }
        Ok(&self.level_params[size_q - 1 - level])
    }

    pub fn params_p(&self) -> &Arc<CrtParams> {
        &self.params_p
    }

    pub fn params_qp(&self) -> &Arc<CrtParams> {
        &self.params_qp
    }

    /// Primes per digit (alpha)
    pub fn num_per_part_q(&self) -> usize {
        self.num_per_part_q
    }

    /// Digit count at the top level
    pub fn num_part_q(&self) -> usize {
        self.num_part_q
    }

    /// `P mod q_i`
    pub fn p_mod_q(&self) -> &[u64] {
        &self.p_mod_q
    }

    pub fn mod_down_tables(&self) -> &ModDownTables {
        &self.mod_down
    }

    /// Conversion tables of digit `part` for a ciphertext with `size_ql`
    /// towers
    pub fn digit_conversion(&self, size_ql: usize, part: usize) -> Result<&DigitConversion> {
        size_ql
            .checked_sub(1)
            .and_then(|idx| self.digit_conversions.get(idx))
            .and_then(|parts| parts.get(part))
            .ok_or_else(|| {
                modckks_err!(
                    DimensionMismatch,
                    "no digit {} for a ciphertext with {} towers",
                    part,
                    size_ql
                )
            })
    }

    /// `q_t^{-1} mod q_i` for every tower `i` below `t`
    pub fn ql_inv_mod_q(&self, t: usize) -> &[u64] {
        &self.ql_inv_mod_q[t]
    }

    /// Scaling factor of a depth-1 ciphertext at `level`
    pub fn scaling_factor_real(&self, level: usize) -> f64 {
        self.scaling_factors[level.min(self.scaling_factors.len() - 1)]
    }

    /// Scaling factor of a depth-2 ciphertext at `level`
    pub fn scaling_factor_real_big(&self, level: usize) -> f64 {
        self.scaling_factors_big[level.min(self.scaling_factors_big.len() - 1)]
    }

    /// Real value divided out when tower `i` is rescaled away
    pub fn mod_reduce_factor(&self, i: usize) -> f64 {
        self.mod_reduce_factors[i]
    }

    /// Level of a freshly encrypted ciphertext
    pub fn fresh_level(&self) -> usize {
        if self.config.scaling_technique.is_ext() {
            1
        } else {
            0
        }
    }
}

fn digit_conversion(
    element_params: &CrtParams,
    params_p: &CrtParams,
    size_ql: usize,
    alpha: usize,
    part: usize,
) -> Result<DigitConversion> {
    let start = alpha * part;
    let end = (start + alpha).min(size_ql);
    let digit_params = Arc::new(element_params.sub_basis(start, end));

    let mut towers = element_params.towers()[..start].to_vec();
    towers.extend_from_slice(&element_params.towers()[end..size_ql]);
    towers.extend_from_slice(params_p.towers());
    let compl_params = Arc::new(CrtParams::from_towers(element_params.cyclotomic_order(), towers));

    let conv = BasisConversion::new(&digit_params.moduli(), &compl_params.moduli())?;
    Ok(DigitConversion {
        digit_params,
        compl_params,
        conv,
    })
}

/// Moduli chain `q_0, q_1, ..., q_{L}` with `q_0` the decryption prime and the
/// scaling primes above it.
fn generate_moduli_q(config: &CkksModConfig) -> Result<Vec<u64>> {
    let m = 2 * config.ring_dim as u64;
    let num_scaling = config.mult_depth;
    let technique = config.scaling_technique;

    let mut scaling = Vec::with_capacity(num_scaling);
    if num_scaling > 0 {
        let first = first_prime(config.scaling_mod_size, m)?;
        scaling.push(first);
        let (mut below, mut above) = (first, first);
        for step in 1..num_scaling {
            let q = if technique.is_flexible() && step % 2 == 0 {
                above = next_prime(above, m)?;
                above
            } else {
                below = previous_prime(below, m)?;
                below
            };
            scaling.push(q);
        }
    }
    // the first prime found sits at the top of the chain
    scaling.reverse();

    let mut used: HashSet<u64> = scaling.iter().copied().collect();
    let mut q0 = last_prime_below(config.first_mod_size, m)?;
    while used.contains(&q0) {
        q0 = previous_prime(q0, m)?;
    }
    used.insert(q0);

    let mut moduli = Vec::with_capacity(num_scaling + 2);
    moduli.push(q0);
    moduli.extend(scaling);

    if technique.is_ext() {
        let min_bits = 64 - m.leading_zeros();
        let mut extra = first_prime(config.extra_mod_size.max(min_bits), m)?;
        while used.contains(&extra) {
            extra = next_prime(extra, m)?;
        }
        moduli.push(extra);
    }
    Ok(moduli)
}

/// `size_p` auxiliary primes stepping down from `2^aux_mod_size`, distinct
/// from `Q`.
fn generate_moduli_p(config: &CkksModConfig, moduli_q: &[u64], size_p: usize) -> Result<Vec<u64>> {
    let m = 2 * config.ring_dim as u64;
    let used: HashSet<u64> = moduli_q.iter().copied().collect();
    let mut moduli = Vec::with_capacity(size_p);
    let mut p = first_prime(config.aux_mod_size, m)?;
    while moduli.len() < size_p {
        p = previous_prime(p, m)?;
        if !used.contains(&p) {
            moduli.push(p);
        }
    }
    Ok(moduli)
}

/// Per-level scaling factors `(sf, sf_big)`.
fn scaling_factors(config: &CkksModConfig, moduli_q: &[u64]) -> (Vec<f64>, Vec<f64>) {
    let size_q = moduli_q.len();
    let technique = config.scaling_technique;

    if !technique.is_flexible() {
        let sf = (config.scaling_mod_size as f64).exp2();
        return (vec![sf; size_q], vec![sf * sf; size_q]);
    }

    let mut sf = vec![0.0; size_q];
    sf[0] = moduli_q[size_q - 1] as f64;
    let start = if technique.is_ext() && size_q > 1 {
        sf[1] = moduli_q[size_q - 2] as f64;
        2
    } else {
        1
    };
    for k in start..size_q {
        let prev = sf[k - 1];
        sf[k] = prev * prev / moduli_q[size_q - k] as f64;
    }

    let nominal = config.scaling_mod_size as f64;
    // the EXT top factor is the small extra prime
    for (k, &value) in sf.iter().enumerate().skip(start - 1) {
        let bits = value.log2();
        if (bits - nominal).abs() > 1.0 {
            warn!(level = k, bits, nominal, "scaling factor drifted from 2^scaling_mod_size");
        }
    }

    let mut big: Vec<f64> = sf.iter().map(|v| v * v).collect();
    if technique.is_ext() && size_q > 1 {
        big[0] = sf[0] * sf[1];
    }
    (sf, big)
}
