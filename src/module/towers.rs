//! Shape surgery, CRT tower operations and basis conversion for module
//! elements, plus the ring-element surface that modules do not support.

use std::sync::Arc;

use rayon::prelude::*;

use super::element::ModuleElement;
use crate::error::{modckks_err, Result};
use crate::math::{BasisConversion, CrtParams, DcrtPoly, Format, ModDownTables, RingElement};

fn unsupported<T>(op: &str) -> Result<T> {
    Err(modckks_err!(
        UnsupportedOperation,
        "{} is not defined for module elements",
        op
    ))
}

impl ModuleElement {
    /// Keep the first `rows - k` rows and return the last `k` rows.
    pub fn drop_rows(&mut self, k: usize) -> Result<ModuleElement> {
        if k == 0 || k >= self.rows {
            return Err(modckks_err!(
                DimensionMismatch,
                "cannot drop {} of {} rows",
                k,
                self.rows
            ));
        }
        let keep = self.rows - k;
        let removed = self.entries.split_off(keep * self.cols);
        self.rows = keep;
        Ok(Self {
            params: Arc::clone(&self.params),
            format: self.format,
            rows: k,
            cols: self.cols,
            entries: removed,
        })
    }

    /// Keep the first `cols - k` columns and return the last `k` columns as
    /// a `rows × k` module.
    pub fn drop_columns(&mut self, k: usize) -> Result<ModuleElement> {
        if k == 0 || k >= self.cols {
            return Err(modckks_err!(
                DimensionMismatch,
                "cannot drop {} of {} columns",
                k,
                self.cols
            ));
        }
        let keep = self.cols - k;
        let mut kept = Vec::with_capacity(self.rows * keep);
        let mut removed = Vec::with_capacity(self.rows * k);
        for (idx, entry) in std::mem::take(&mut self.entries).into_iter().enumerate() {
            if idx % self.cols < keep {
                kept.push(entry);
            } else {
                removed.push(entry);
            }
        }
        self.entries = kept;
        self.cols = keep;
        Ok(Self {
            params: Arc::clone(&self.params),
            format: self.format,
            rows: self.rows,
            cols: k,
            entries: removed,
        })
    }

    pub fn switch_format(&mut self) {
        self.entries.par_iter_mut().for_each(|e| e.switch_format());
        self.format = match self.format {
            Format::Coefficient => Format::Evaluation,
            Format::Evaluation => Format::Coefficient,
        };
    }

    pub fn set_format(&mut self, format: Format) {
        if self.format != format {
            self.switch_format();
        }
    }

    pub fn drop_last_element(&mut self) -> Result<()> {
        self.drop_last_elements(1)
    }

    /// Drop the top `count` towers of every entry.
    pub fn drop_last_elements(&mut self, count: usize) -> Result<()> {
        let towers = self.params.len();
        if count >= towers {
            return Err(modckks_err!(
                DimensionMismatch,
                "cannot drop {} of {} towers",
                count,
                towers
            ));
        }
        self.entries
            .par_iter_mut()
            .try_for_each(|e| e.drop_last_elements(count))?;
        self.params = Arc::new(self.params.truncated(towers - count));
        Ok(())
    }

    /// Rescale every entry by its top prime; see
    /// [`DcrtPoly::drop_last_element_and_scale`].
    pub fn drop_last_element_and_scale(&mut self, ql_inv_mod_q: &[u64]) -> Result<()> {
        let towers = self.params.len();
        if towers < 2 || ql_inv_mod_q.len() < towers - 1 {
            return Err(modckks_err!(
                DimensionMismatch,
                "rescale of {} towers with {} inverses",
                towers,
                ql_inv_mod_q.len()
            ));
        }
        self.entries
            .par_iter_mut()
            .try_for_each(|e| e.drop_last_element_and_scale(ql_inv_mod_q))?;
        self.params = Arc::new(self.params.truncated(towers - 1));
        Ok(())
    }

    /// Fast base conversion of every entry into `target`; coefficient
    /// format only.
    pub fn approx_switch_crt_basis(
        &self,
        target: &Arc<CrtParams>,
        conv: &BasisConversion,
    ) -> Result<Self> {
        let entries = self
            .entries
            .par_iter()
            .map(|e| e.approx_switch_crt_basis(target, conv))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            params: Arc::clone(target),
            format: Format::Coefficient,
            rows: self.rows,
            cols: self.cols,
            entries,
        })
    }

    /// Divide every entry of a `Q_l ∪ P` module by `P`, landing in `params_q`.
    pub fn approx_mod_down(&self, params_q: &Arc<CrtParams>, tables: &ModDownTables) -> Result<Self> {
        let entries = self
            .entries
            .par_iter()
            .map(|e| e.approx_mod_down(params_q, tables))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            params: Arc::clone(params_q),
            format: self.format,
            rows: self.rows,
            cols: self.cols,
            entries,
        })
    }

    pub fn clone_with_noise(&self) -> Result<Self> {
        unsupported("clone_with_noise")
    }

    pub fn automorphism_transform(&self, _index: u32) -> Result<Self> {
        unsupported("automorphism_transform")
    }

    pub fn transpose(&self) -> Result<Self> {
        unsupported("transpose")
    }

    pub fn base_decompose(&self, _base_bits: u32) -> Result<Vec<Self>> {
        unsupported("base_decompose")
    }

    pub fn powers_of_base(&self, _base_bits: u32) -> Result<Vec<Self>> {
        unsupported("powers_of_base")
    }

    pub fn switch_modulus(&mut self, _modulus: u64) -> Result<()> {
        unsupported("switch_modulus")
    }

    pub fn make_sparse(&mut self, _ratio: u32) -> Result<()> {
        unsupported("make_sparse")
    }

    pub fn norm(&self) -> Result<f64> {
        unsupported("norm")
    }

    pub fn inverse_exists(&self) -> Result<bool> {
        unsupported("inverse_exists")
    }

    pub fn multiplicative_inverse(&self) -> Result<Self> {
        unsupported("multiplicative_inverse")
    }

    pub fn mod_by_two(&self) -> Result<Self> {
        unsupported("mod_by_two")
    }
}

impl RingElement for ModuleElement {
    fn params(&self) -> &Arc<CrtParams> {
        ModuleElement::params(self)
    }

    fn format(&self) -> Format {
        ModuleElement::format(self)
    }

    fn plus(&self, other: &Self) -> Result<Self> {
        ModuleElement::plus(self, other)
    }

    fn minus(&self, other: &Self) -> Result<Self> {
        ModuleElement::minus(self, other)
    }

    fn times(&self, other: &Self) -> Result<Self> {
        ModuleElement::times(self, other)
    }

    fn negate(&self) -> Self {
        -self
    }

    fn times_crt(&self, residues: &[u64]) -> Result<Self> {
        ModuleElement::times_crt(self, residues)
    }

    fn switch_format(&mut self) {
        ModuleElement::switch_format(self)
    }

    fn drop_last_element(&mut self) -> Result<()> {
        ModuleElement::drop_last_element(self)
    }

    fn drop_last_elements(&mut self, count: usize) -> Result<()> {
        ModuleElement::drop_last_elements(self, count)
    }

    fn drop_last_element_and_scale(&mut self, ql_inv_mod_q: &[u64]) -> Result<()> {
        ModuleElement::drop_last_element_and_scale(self, ql_inv_mod_q)
    }

    fn approx_switch_crt_basis(
        &self,
        target: &Arc<CrtParams>,
        conv: &BasisConversion,
    ) -> Result<Self> {
        ModuleElement::approx_switch_crt_basis(self, target, conv)
    }

    fn approx_mod_down(&self, params_q: &Arc<CrtParams>, tables: &ModDownTables) -> Result<Self> {
        ModuleElement::approx_mod_down(self, params_q, tables)
    }
}

/// `1×1` view of a single ring element, for scheme code that mixes
/// plaintext polynomials with module ciphertext components.
impl From<DcrtPoly> for ModuleElement {
    fn from(poly: DcrtPoly) -> Self {
        ModuleElement::from_poly(poly)
    }
}
