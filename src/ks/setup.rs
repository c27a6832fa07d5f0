//! Hybrid key-switching key generation

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{modckks_err, ModckksError, Result};
use crate::math::{DcrtPoly, Format, RandomSource};
use crate::module::ModuleElement;
use crate::scheme::CryptoParameters;

/// Key-switching key from `s_old` (`r_old × 1`) to `s_new` (`r_new × 1`)
///
/// One pair per digit part of `Q`, all in the extended basis `Q ∪ P`:
/// ```text
/// A[part] : r_old × r_new   (uniform)
/// b[part] : r_old × 1       = −A·s_new + e + P·s_old on the towers of `part`
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EvalKeyRepr")]
pub struct EvalKey {
    a: Vec<ModuleElement>,
    b: Vec<ModuleElement>,
}

#[derive(Deserialize)]
struct EvalKeyRepr {
    a: Vec<ModuleElement>,
    b: Vec<ModuleElement>,
}

impl TryFrom<EvalKeyRepr> for EvalKey {
    type Error = ModckksError;

    fn try_from(repr: EvalKeyRepr) -> Result<Self> {
        Self::from_parts(repr.a, repr.b)
    }
}

impl EvalKey {
    /// Assemble from per-part components
    pub fn from_parts(a: Vec<ModuleElement>, b: Vec<ModuleElement>) -> Result<Self> {
        if a.is_empty() || a.len() != b.len() {
            return Err(modckks_err!(
                DimensionMismatch,
                "eval key needs matching non-empty parts, got {} A and {} b",
                a.len(),
                b.len()
            ));
        }
        let (rows_old, rows_new) = a[0].shape();
        for (ai, bi) in a.iter().zip(&b) {
            if ai.shape() != (rows_old, rows_new) || bi.shape() != (rows_old, 1) {
                return Err(modckks_err!(
                    DimensionMismatch,
                    "eval key part shapes {:?} and {:?} do not match {}x{}",
                    ai.shape(),
                    bi.shape(),
                    rows_old,
                    rows_new
                ));
            }
            if **ai.params() != **a[0].params() || **bi.params() != **a[0].params() {
                return Err(modckks_err!(
                    DimensionMismatch,
                    "eval key parts over different CRT bases ({}, {} and {} towers)",
                    ai.num_towers(),
                    bi.num_towers(),
                    a[0].num_towers()
                ));
            }
        }
        Ok(Self { a, b })
    }

    pub fn a(&self) -> &[ModuleElement] {
        &self.a
    }

    pub fn b(&self) -> &[ModuleElement] {
        &self.b
    }

    /// Number of digit parts
    pub fn num_parts(&self) -> usize {
        self.a.len()
    }

    /// Rank of the key being switched away from
    pub fn rows_old(&self) -> usize {
        self.a[0].rows()
    }

    /// Rank of the key being switched to
    pub fn rows_new(&self) -> usize {
        self.a[0].cols()
    }
}

/// Check that a secret is a column over the full chain `Q`.
fn check_secret(params: &CryptoParameters, s: &ModuleElement, which: &str) -> Result<()> {
    if s.cols() != 1 {
        return Err(modckks_err!(
            DimensionMismatch,
            "{} secret must be a column, got {}x{}",
            which,
            s.rows(),
            s.cols()
        ));
    }
    if **s.params() != **params.element_params() {
        return Err(modckks_err!(
            DimensionMismatch,
            "{} secret carries {} towers, expected the full chain of {}",
            which,
            s.num_towers(),
            params.size_q()
        ));
    }
    Ok(())
}

/// Extend a secret from `Q` to `Q ∪ P`.
///
/// The `Q` towers are copied; every `P` tower is tower 0 lifted to `p_j`,
/// which is exact because secret coefficients are small.
pub(crate) fn extend_secret(params: &CryptoParameters, s: &ModuleElement) -> Result<ModuleElement> {
    let params_qp = params.params_qp();
    let params_p = params.params_p();
    let mut entries = Vec::with_capacity(s.len());
    for entry in s.entries() {
        let mut coeff = entry.clone();
        coeff.set_format(Format::Coefficient);
        let mut towers = coeff.towers().to_vec();
        for tower in params_p.towers() {
            towers.push(coeff.switch_tower_modulus(0, tower)?);
        }
        let mut ext = DcrtPoly::from_towers(params_qp, Format::Coefficient, towers)?;
        ext.switch_format();
        entries.push(ext);
    }
    ModuleElement::from_entries(s.rows(), s.cols(), entries)
}

/// Generate a key that switches ciphertexts under `old` to `new`
///
/// # Arguments
/// * `params` - Crypto parameters (digit partition and `P mod q_i`)
/// * `old` - Source secret, `r_old × 1` over `Q`
/// * `new` - Target secret, `r_new × 1` over `Q`
/// * `src` - Randomness for `A` and `e`
///
/// # Returns
/// One `(A, b)` pair per digit part of `Q`
pub fn key_switch_gen(
    params: &CryptoParameters,
    old: &ModuleElement,
    new: &ModuleElement,
    src: &mut RandomSource,
) -> Result<EvalKey> {
    key_switch_gen_inner(params, old, new, None, src)
}

/// Same as [`key_switch_gen`] but reusing caller-provided `A` matrices,
/// one per digit part.
pub fn key_switch_gen_with_a(
    params: &CryptoParameters,
    old: &ModuleElement,
    new: &ModuleElement,
    a: &[ModuleElement],
    src: &mut RandomSource,
) -> Result<EvalKey> {
    key_switch_gen_inner(params, old, new, Some(a), src)
}

fn key_switch_gen_inner(
    params: &CryptoParameters,
    old: &ModuleElement,
    new: &ModuleElement,
    given_a: Option<&[ModuleElement]>,
    src: &mut RandomSource,
) -> Result<EvalKey> {
    check_secret(params, old, "source")?;
    check_secret(params, new, "target")?;

    let rows_old = old.rows();
    let rows_new = new.rows();
    let size_q = params.size_q();
    let alpha = params.num_per_part_q();
    let num_part_q = params.num_part_q();
    let params_qp = params.params_qp();

    if let Some(a) = given_a {
        if a.len() != num_part_q {
            return Err(modckks_err!(
                DimensionMismatch,
                "{} A matrices supplied for {} digit parts",
                a.len(),
                num_part_q
            ));
        }
    }

    let mut s_old = old.clone();
    s_old.set_format(Format::Evaluation);
    let s_new_ext = extend_secret(params, new)?;

    debug!(rows_old, rows_new, num_part_q, "generating key-switching key");

    let mut av = Vec::with_capacity(num_part_q);
    let mut bv = Vec::with_capacity(num_part_q);
    for part in 0..num_part_q {
        let a = match given_a {
            Some(given) => {
                let a = &given[part];
                if a.shape() != (rows_old, rows_new) || **a.params() != **params_qp {
                    return Err(modckks_err!(
                        DimensionMismatch,
                        "supplied A of part {} is {}x{} over {} towers",
                        part,
                        a.rows(),
                        a.cols(),
                        a.num_towers()
                    ));
                }
                let mut a = a.clone();
                a.set_format(Format::Evaluation);
                a
            }
            None => ModuleElement::uniform(params_qp, Format::Evaluation, rows_old, rows_new, src)?,
        };
        let e = ModuleElement::gaussian(params_qp, Format::Evaluation, rows_old, 1, src)?;
        let mut b = e.minus(&a.times(&s_new_ext)?)?;

        let start = alpha * part;
        let end = (start + alpha).min(size_q);
        for row in 0..rows_old {
            for i in start..end {
                let p_s = s_old.element_at_index(row, 0, i).scalar_mul(params.p_mod_q()[i]);
                let updated = b.element_at_index(row, 0, i) + &p_s;
                b.set_element_at_index(row, 0, i, updated)?;
            }
        }
        av.push(a);
        bv.push(b);
    }
    EvalKey::from_parts(av, bv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CkksModConfig, SchemeKind, ScalingTechnique};
    use num_bigint::BigInt;
    use num_traits::Signed;

    fn test_params() -> CryptoParameters {
        let config = CkksModConfig {
            ring_dim: 64,
            mult_depth: 3,
            scheme: SchemeKind::Module { rank: 2 },
            scaling_technique: ScalingTechnique::FlexibleAuto,
            num_large_digits: 2,
            ..CkksModConfig::default()
        };
        CryptoParameters::new(config).unwrap()
    }

    fn secret(params: &CryptoParameters, rows: usize, src: &mut RandomSource) -> ModuleElement {
        ModuleElement::ternary(params.element_params(), Format::Evaluation, rows, 1, src, None).unwrap()
    }

    #[test]
    fn test_key_shapes() {
        let params = test_params();
        let mut src = RandomSource::with_seed(3.19, 1);
        let old = secret(&params, 3, &mut src);
        let new = secret(&params, 2, &mut src);
        let key = key_switch_gen(&params, &old, &new, &mut src).unwrap();

        assert_eq!(key.num_parts(), params.num_part_q());
        assert_eq!(key.rows_old(), 3);
        assert_eq!(key.rows_new(), 2);
        assert_eq!(key.b()[0].shape(), (3, 1));
        assert_eq!(key.a()[0].num_towers(), params.params_qp().len());
    }

    #[test]
    fn test_extended_secret_matches_on_every_tower() {
        let params = test_params();
        let mut src = RandomSource::with_seed(3.19, 2);
        let s = secret(&params, 2, &mut src);
        let ext = extend_secret(&params, &s).unwrap();

        let mut coeff = ext.entry(1, 0).clone();
        coeff.set_format(Format::Coefficient);
        let values = coeff.crt_interpolate().unwrap();
        assert!(values.iter().all(|v| v.abs() <= BigInt::from(1)));
    }

    #[test]
    fn test_key_decrypts_to_p_times_old_on_its_part() {
        // b + A·s_new = e + P·s_old on the towers of each part
        let params = test_params();
        let mut src = RandomSource::with_seed(3.19, 3);
        let old = secret(&params, 2, &mut src);
        let new = secret(&params, 2, &mut src);
        let key = key_switch_gen(&params, &old, &new, &mut src).unwrap();
        let s_new_ext = extend_secret(&params, &new).unwrap();
        let alpha = params.num_per_part_q();

        for part in 0..key.num_parts() {
            let phase = key.b()[part].plus(&key.a()[part].times(&s_new_ext).unwrap()).unwrap();
            for i in 0..params.params_qp().len() {
                let in_part = i >= alpha * part && i < alpha * (part + 1) && i < params.size_q();
                let mut residual = phase.element_at_index(0, 0, i).clone();
                if in_part {
                    residual -= &old.element_at_index(0, 0, i).scalar_mul(params.p_mod_q()[i]);
                }
                residual.from_ntt(params.params_qp().tower(i).ntt());
                let noise = residual.linf_norm();
                assert!(noise < 64, "part {} tower {} noise {}", part, i, noise);
            }
        }
    }

    #[test]
    fn test_supplied_a_is_reused() {
        let params = test_params();
        let mut src = RandomSource::with_seed(3.19, 4);
        let old = secret(&params, 2, &mut src);
        let new = secret(&params, 2, &mut src);
        let first = key_switch_gen(&params, &old, &new, &mut src).unwrap();
        let second = key_switch_gen_with_a(&params, &old, &new, first.a(), &mut src).unwrap();
        assert_eq!(first.a(), second.a());
        assert_ne!(first.b(), second.b());

        assert!(key_switch_gen_with_a(&params, &old, &new, &first.a()[..1], &mut src).is_err());
    }

    #[test]
    fn test_rejects_row_secret() {
        let params = test_params();
        let mut src = RandomSource::with_seed(3.19, 5);
        let row = ModuleElement::ternary(params.element_params(), Format::Evaluation, 1, 2, &mut src, None).unwrap();
        let col = secret(&params, 2, &mut src);
        assert!(key_switch_gen(&params, &row, &col, &mut src).is_err());
    }

    #[test]
    fn test_deserialize_rejects_empty_key() {
        let err = serde_json::from_str::<EvalKey>(r#"{"a":[],"b":[]}"#).unwrap_err();
        assert!(err.to_string().contains("DimensionMismatch"), "{}", err);
    }
}
