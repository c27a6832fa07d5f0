//! Module arithmetic: elementwise operations, matrix product, Hadamard and
//! lower-triangle products.
//!
//! Entry loops are independent and write disjoint outputs, so they run on
//! the rayon pool.

use std::ops::Neg;
use std::sync::Arc;

use rayon::prelude::*;

use super::element::ModuleElement;
use crate::error::{modckks_err, Result};
use crate::math::{DcrtPoly, Format};

impl ModuleElement {
    pub(crate) fn check_basis(&self, other: &Self, op: &str) -> Result<()> {
        if self.format != other.format {
            return Err(modckks_err!(
                DimensionMismatch,
                "{}: format {:?} vs {:?}",
                op,
                self.format,
                other.format
            ));
        }
        if *self.params != *other.params {
            return Err(modckks_err!(
                DimensionMismatch,
                "{}: {} towers vs {} towers",
                op,
                self.params.len(),
                other.params.len()
            ));
        }
        Ok(())
    }

    fn check_same_shape(&self, other: &Self, op: &str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(modckks_err!(
                DimensionMismatch,
                "{}: shape {}x{} vs {}x{}",
                op,
                self.rows,
                self.cols,
                other.rows,
                other.cols
            ));
        }
        self.check_basis(other, op)
    }

    fn require_evaluation(&self, op: &str) -> Result<()> {
        if self.format != Format::Evaluation {
            return Err(modckks_err!(
                DimensionMismatch,
                "{} requires evaluation format",
                op
            ));
        }
        Ok(())
    }

    fn with_entries(&self, rows: usize, cols: usize, entries: Vec<DcrtPoly>) -> Self {
        Self {
            params: Arc::clone(&self.params),
            format: self.format,
            rows,
            cols,
            entries,
        }
    }

    fn map_entries<F>(&self, f: F) -> Self
    where
        F: Fn(&DcrtPoly) -> DcrtPoly + Sync + Send,
    {
        let entries = self.entries.par_iter().map(f).collect();
        self.with_entries(self.rows, self.cols, entries)
    }

    fn is_scalar_module(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    /// Elementwise sum; shapes must match exactly.
    pub fn plus(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other, "plus")?;
        let entries = self
            .entries
            .par_iter()
            .zip(other.entries.par_iter())
            .map(|(a, b)| a.plus(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_entries(self.rows, self.cols, entries))
    }

    pub fn plus_assign(&mut self, other: &Self) -> Result<()> {
        self.check_same_shape(other, "plus")?;
        self.entries
            .par_iter_mut()
            .zip(other.entries.par_iter())
            .try_for_each(|(a, b)| a.plus_assign(b))
    }

    /// Elementwise difference; shapes must match exactly.
    pub fn minus(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other, "minus")?;
        let entries = self
            .entries
            .par_iter()
            .zip(other.entries.par_iter())
            .map(|(a, b)| a.minus(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_entries(self.rows, self.cols, entries))
    }

    pub fn minus_assign(&mut self, other: &Self) -> Result<()> {
        self.check_same_shape(other, "minus")?;
        self.entries
            .par_iter_mut()
            .zip(other.entries.par_iter())
            .try_for_each(|(a, b)| a.minus_assign(b))
    }

    /// Matrix product `C[i,j] = Σ_k A[i,k]·B[k,j]`.
    ///
    /// A `1×1` operand on either side multiplies every entry of the other.
    /// Both operands must be in evaluation format.
    pub fn times(&self, other: &Self) -> Result<Self> {
        self.check_basis(other, "times")?;
        self.require_evaluation("times")?;

        if self.is_scalar_module() {
            let scalar = &self.entries[0];
            let entries = other
                .entries
                .par_iter()
                .map(|e| scalar.times(e))
                .collect::<Result<Vec<_>>>()?;
            return Ok(self.with_entries(other.rows, other.cols, entries));
        }
        if other.is_scalar_module() {
            let scalar = &other.entries[0];
            let entries = self
                .entries
                .par_iter()
                .map(|e| e.times(scalar))
                .collect::<Result<Vec<_>>>()?;
            return Ok(self.with_entries(self.rows, self.cols, entries));
        }
        if self.cols != other.rows {
            return Err(modckks_err!(
                DimensionMismatch,
                "times: {}x{} by {}x{}",
                self.rows,
                self.cols,
                other.rows,
                other.cols
            ));
        }

        let (rows, cols, inner) = (self.rows, other.cols, self.cols);
        let entries = (0..rows * cols)
            .into_par_iter()
            .map(|idx| {
                let (i, j) = (idx / cols, idx % cols);
                let mut acc = DcrtPoly::zero(&self.params, Format::Evaluation);
                for k in 0..inner {
                    acc.mul_acc(self.entry(i, k), other.entry(k, j))?;
                }
                Ok(acc)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_entries(rows, cols, entries))
    }

    /// Elementwise product of equally shaped modules.
    pub fn hadamard_product(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other, "hadamard_product")?;
        self.require_evaluation("hadamard_product")?;
        let entries = self
            .entries
            .par_iter()
            .zip(other.entries.par_iter())
            .map(|(a, b)| a.times(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_entries(self.rows, self.cols, entries))
    }

    /// Products `self[i]·other[j]` for all `i < j`, ordered by `i` then `j`.
    ///
    /// Both operands must be `1×n` or both `n×1` with `n ≥ 2`; the output is
    /// `1×C(n,2)` or `C(n,2)×1` accordingly.
    pub fn lower_triangle_product(&self, other: &Self) -> Result<Self> {
        let is_vector = self.rows == 1 || self.cols == 1;
        if !is_vector || self.shape() != other.shape() {
            return Err(modckks_err!(
                DimensionMismatch,
                "lower_triangle_product needs matching 1xn or nx1 operands, got {}x{} and {}x{}",
                self.rows,
                self.cols,
                other.rows,
                other.cols
            ));
        }
        let n = self.entries.len();
        if n < 2 {
            return Err(modckks_err!(
                DimensionMismatch,
                "lower_triangle_product of length {} has no pairs",
                n
            ));
        }
        self.check_basis(other, "lower_triangle_product")?;
        self.require_evaluation("lower_triangle_product")?;

        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect();
        let entries = pairs
            .par_iter()
            .map(|&(i, j)| self.entries[i].times(&other.entries[j]))
            .collect::<Result<Vec<_>>>()?;

        let count = pairs.len();
        let (rows, cols) = if self.rows == 1 { (1, count) } else { (count, 1) };
        Ok(self.with_entries(rows, cols, entries))
    }

    pub fn times_scalar(&self, scalar: u64) -> Self {
        self.map_entries(|e| e.times_scalar(scalar))
    }

    pub fn times_signed(&self, scalar: i64) -> Self {
        self.map_entries(|e| e.times_signed(scalar))
    }

    /// Multiply every entry by an integer given as per-tower residues.
    pub fn times_crt(&self, residues: &[u64]) -> Result<Self> {
        let entries = self
            .entries
            .par_iter()
            .map(|e| e.times_crt(residues))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_entries(self.rows, self.cols, entries))
    }

    pub fn plus_scalar(&self, scalar: u64) -> Self {
        self.map_entries(|e| e.plus_scalar(scalar))
    }

    pub fn minus_scalar(&self, scalar: u64) -> Self {
        self.map_entries(|e| e.minus_scalar(scalar))
    }
}

impl Neg for &ModuleElement {
    type Output = ModuleElement;

    fn neg(self) -> ModuleElement {
        self.map_entries(|e| -e)
    }
}
