//! Hybrid key switching: digit decomposition, basis extension and mod-down

use std::sync::Arc;

use rayon::prelude::*;
use tracing::trace;

use super::setup::EvalKey;
use crate::error::{modckks_err, Result};
use crate::math::{CrtParams, DcrtPoly, Format, Poly};
use crate::module::ModuleElement;
use crate::scheme::{Ciphertext, CryptoParameters};

/// Split a row vector into its digits and extend each digit to `Q_l ∪ P`
///
/// The number of active digits is `ceil(size_ql / alpha)`, capped at the
/// digit count fixed at setup; the last digit may hold fewer than `alpha`
/// towers.
///
/// # Returns
/// One `1 × cols` module per digit over `Q_l ∪ P`, in evaluation format
pub fn precompute_digits(params: &CryptoParameters, c: &ModuleElement) -> Result<Vec<ModuleElement>> {
    if c.rows() != 1 {
        return Err(modckks_err!(
            DimensionMismatch,
            "key switching expects a row vector, got {}x{}",
            c.rows(),
            c.cols()
        ));
    }
    let size_ql = c.num_towers();
    if size_ql == 0 || size_ql > params.size_q() || **c.params() != params.element_params().truncated(size_ql) {
        return Err(modckks_err!(
            DimensionMismatch,
            "key switching input over {} towers is not a prefix of the {}-tower chain",
            size_ql,
            params.size_q()
        ));
    }
    let alpha = params.num_per_part_q();
    let num_part_ql = size_ql.div_ceil(alpha).min(params.num_part_q());
    let params_qlp = Arc::new(c.params().concat(params.params_p()));

    let mut c_eval = c.clone();
    c_eval.set_format(Format::Evaluation);

    trace!(size_ql, num_part_ql, cols = c.cols(), "precomputing key-switch digits");

    (0..num_part_ql)
        .into_par_iter()
        .map(|part| {
            let conv = params.digit_conversion(size_ql, part)?;
            let start = alpha * part;
            let end = start + conv.digit_params.len();

            let entries = c_eval
                .entries()
                .iter()
                .map(|entry| {
                    DcrtPoly::from_towers(
                        &conv.digit_params,
                        Format::Evaluation,
                        entry.towers()[start..end].to_vec(),
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            let mut digit = ModuleElement::from_entries(1, c.cols(), entries)?;
            digit.set_format(Format::Coefficient);
            let mut compl = digit.approx_switch_crt_basis(&conv.compl_params, &conv.conv)?;
            compl.set_format(Format::Evaluation);

            let entries = c_eval
                .entries()
                .iter()
                .zip(compl.entries())
                .map(|(own, ext)| assemble_digit(&params_qlp, own, ext, start, end))
                .collect::<Result<Vec<_>>>()?;
            ModuleElement::from_entries(1, c.cols(), entries)
        })
        .collect()
}

/// Interleave a digit's own towers with its base-extended complement in
/// `Q_l ∪ P` order.
fn assemble_digit(
    params_qlp: &Arc<CrtParams>,
    own: &DcrtPoly,
    compl: &DcrtPoly,
    start: usize,
    end: usize,
) -> Result<DcrtPoly> {
    let size_part = end - start;
    let towers = (0..params_qlp.len())
        .map(|i| {
            if i < start {
                compl.tower(i).clone()
            } else if i < end {
                own.tower(i).clone()
            } else {
                compl.tower(i - size_part).clone()
            }
        })
        .collect();
    DcrtPoly::from_towers(params_qlp, Format::Evaluation, towers)
}

/// Inner products of the digits with the key, still over `Q_l ∪ P`
///
/// ```text
/// c̃0 (1×1)      = Σ_d Σ_k digit_d[k] · b_d[k]
/// c̃1 (1×r_new)  = Σ_d Σ_k digit_d[k] · A_d[k, ·]
/// ```
///
/// Towers `i ≥ size_ql` read the key's `P` tower `size_q + (i - size_ql)`.
pub fn fast_key_switch_core_ext(
    params: &CryptoParameters,
    digits: &[ModuleElement],
    key: &EvalKey,
) -> Result<(ModuleElement, ModuleElement)> {
    let first = digits
        .first()
        .ok_or_else(|| modckks_err!(DimensionMismatch, "no digits to key switch"))?;
    if digits.len() > key.num_parts() {
        return Err(modckks_err!(
            DimensionMismatch,
            "{} digits for a key of {} parts",
            digits.len(),
            key.num_parts()
        ));
    }
    let cols = first.cols();
    if cols != key.rows_old() {
        return Err(modckks_err!(
            DimensionMismatch,
            "ciphertext part of {} columns for a key from rank {}",
            cols,
            key.rows_old()
        ));
    }

    let key_params = key.a()[0].params();
    if **key_params != **params.params_qp() {
        return Err(modckks_err!(
            DimensionMismatch,
            "key over {} towers, expected the {}-tower extended basis",
            key_params.len(),
            params.params_qp().len()
        ));
    }

    let params_qlp = Arc::clone(first.params());
    let size_p = params.params_p().len();
    let size_q = params.size_q();
    if params_qlp.len() <= size_p || params_qlp.len() > size_q + size_p {
        return Err(modckks_err!(
            DimensionMismatch,
            "digits over {} towers for {} auxiliary primes",
            params_qlp.len(),
            size_p
        ));
    }
    let size_ql = params_qlp.len() - size_p;
    for digit in digits {
        if digit.rows() != 1 || digit.cols() != cols || **digit.params() != *params_qlp {
            return Err(modckks_err!(
                DimensionMismatch,
                "digit of shape {}x{} over {} towers does not match the first digit",
                digit.rows(),
                digit.cols(),
                digit.num_towers()
            ));
        }
    }
    let rows_new = key.rows_new();
    let n = params_qlp.ring_dim();

    let per_tower: Vec<(Poly, Vec<Poly>)> = (0..params_qlp.len())
        .into_par_iter()
        .map(|i| {
            let ctx = params_qlp.tower(i).ntt();
            let q = ctx.modulus();
            let key_idx = if i < size_ql { i } else { size_q + (i - size_ql) };
            let mut acc0 = Poly::zero_ntt(n, q);
            let mut acc1 = vec![Poly::zero_ntt(n, q); rows_new];
            for (d, digit) in digits.iter().enumerate() {
                let (a, b) = (&key.a()[d], &key.b()[d]);
                for k in 0..cols {
                    let x = digit.element_at_index(0, k, i);
                    acc0.mul_acc_ntt_domain(x, b.element_at_index(k, 0, key_idx), ctx);
                    for (j, acc) in acc1.iter_mut().enumerate() {
                        acc.mul_acc_ntt_domain(x, a.element_at_index(k, j, key_idx), ctx);
                    }
                }
            }
            (acc0, acc1)
        })
        .collect();

    let mut towers0 = Vec::with_capacity(per_tower.len());
    let mut towers1: Vec<Vec<Poly>> = vec![Vec::with_capacity(per_tower.len()); rows_new];
    for (t0, t1) in per_tower {
        towers0.push(t0);
        for (dst, t) in towers1.iter_mut().zip(t1) {
            dst.push(t);
        }
    }
    let c0 = DcrtPoly::from_towers(&params_qlp, Format::Evaluation, towers0)?;
    let c1 = towers1
        .into_iter()
        .map(|towers| DcrtPoly::from_towers(&params_qlp, Format::Evaluation, towers))
        .collect::<Result<Vec<_>>>()?;
    Ok((
        ModuleElement::from_poly(c0),
        ModuleElement::from_entries(1, rows_new, c1)?,
    ))
}

/// Switch the row vector `c` to the key's target secret
///
/// # Returns
/// `(ab0, ab1)` over the towers of `c`, with
/// `ab0 + ab1·s_new ≈ c·s_old`
pub fn key_switch_core(
    params: &CryptoParameters,
    c: &ModuleElement,
    key: &EvalKey,
) -> Result<(ModuleElement, ModuleElement)> {
    let digits = precompute_digits(params, c)?;
    let (ext0, ext1) = fast_key_switch_core_ext(params, &digits, key)?;
    let params_ql = c.params();
    let tables = params.mod_down_tables();
    Ok((
        ext0.approx_mod_down(params_ql, tables)?,
        ext1.approx_mod_down(params_ql, tables)?,
    ))
}

/// Key-switch a ciphertext in place
///
/// The component switched is `c1` for a two-element ciphertext and `c2`
/// otherwise. A two-element ciphertext gets `c1` replaced by the switched
/// mask; a three-element one has it accumulated. The ciphertext is left with
/// two elements.
pub fn key_switch_in_place(params: &CryptoParameters, ct: &mut Ciphertext, key: &EvalKey) -> Result<()> {
    let len = ct.elements.len();
    if !(2..=3).contains(&len) {
        return Err(modckks_err!(
            DimensionMismatch,
            "key switching needs 2 or 3 ciphertext elements, got {}",
            len
        ));
    }
    let source = if len == 2 { &ct.elements[1] } else { &ct.elements[2] };
    let (ab0, ab1) = key_switch_core(params, source, key)?;

    ct.elements[0].plus_assign(&ab0)?;
    if len == 2 {
        ct.elements[1] = ab1;
    } else {
        ct.elements[1].plus_assign(&ab1)?;
    }
    ct.elements.truncate(2);
    Ok(())
}
