//! The module element type: a `rows × cols` matrix of double-CRT ring elements.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{modckks_err, ModckksError, Result};
use crate::math::{CrtParams, DcrtPoly, Format, Poly, RandomSource};

/// Matrix of ring elements sharing one CRT basis and one format.
///
/// Entries are stored row-major: entry `(r, c)` lives at `r * cols + c`.
///
/// # Invariants
///
/// * `rows ≥ 1` and `cols ≥ 1`
/// * every entry uses `params` and `format`
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use modckks::math::{CrtParams, Format};
/// use modckks::module::ModuleElement;
///
/// let q = modckks::math::primes::first_prime(50, 128).unwrap();
/// let params = Arc::new(CrtParams::new(64, &[q]).unwrap());
/// let m = ModuleElement::zero(&params, Format::Evaluation, 2, 3).unwrap();
/// assert_eq!(m.shape(), (2, 3));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModuleElementRepr")]
pub struct ModuleElement {
    pub(crate) params: Arc<CrtParams>,
    pub(crate) format: Format,
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) entries: Vec<DcrtPoly>,
}

#[derive(Deserialize)]
struct ModuleElementRepr {
    params: Arc<CrtParams>,
    format: Format,
    rows: usize,
    cols: usize,
    entries: Vec<DcrtPoly>,
}

impl TryFrom<ModuleElementRepr> for ModuleElement {
    type Error = ModckksError;

    fn try_from(repr: ModuleElementRepr) -> Result<Self> {
        let element = Self::from_entries(repr.rows, repr.cols, repr.entries)?;
        if element.format != repr.format || *element.params != *repr.params {
            return Err(modckks_err!(
                DimensionMismatch,
                "module header ({} towers, {:?}) disagrees with its entries ({} towers, {:?})",
                repr.params.len(),
                repr.format,
                element.params.len(),
                element.format
            ));
        }
        Ok(element)
    }
}

impl ModuleElement {
    fn check_shape(rows: usize, cols: usize) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(modckks_err!(
                DimensionMismatch,
                "module shape {}x{} must be at least 1x1",
                rows,
                cols
            ));
        }
        Ok(())
    }

    pub fn zero(params: &Arc<CrtParams>, format: Format, rows: usize, cols: usize) -> Result<Self> {
        Self::check_shape(rows, cols)?;
        let entry = DcrtPoly::zero(params, format);
        Ok(Self {
            params: Arc::clone(params),
            format,
            rows,
            cols,
            entries: vec![entry; rows * cols],
        })
    }

    /// Wrap a single ring element as a `1×1` module.
    pub fn from_poly(poly: DcrtPoly) -> Self {
        Self {
            params: Arc::clone(poly.params()),
            format: poly.format(),
            rows: 1,
            cols: 1,
            entries: vec![poly],
        }
    }

    /// Build from row-major entries; all entries must share params and format.
    pub fn from_entries(rows: usize, cols: usize, entries: Vec<DcrtPoly>) -> Result<Self> {
        Self::check_shape(rows, cols)?;
        if entries.len() != rows * cols {
            return Err(modckks_err!(
                DimensionMismatch,
                "{} entries for a {}x{} module",
                entries.len(),
                rows,
                cols
            ));
        }
        let first = &entries[0];
        for e in &entries[1..] {
            first.check_compatible(e, "from_entries")?;
        }
        Ok(Self {
            params: Arc::clone(first.params()),
            format: first.format(),
            rows,
            cols,
            entries,
        })
    }

    fn filled<F>(params: &Arc<CrtParams>, rows: usize, cols: usize, format: Format, mut fill: F) -> Result<Self>
    where
        F: FnMut() -> DcrtPoly,
    {
        Self::check_shape(rows, cols)?;
        let entries = (0..rows * cols).map(|_| fill()).collect();
        Ok(Self {
            params: Arc::clone(params),
            format,
            rows,
            cols,
            entries,
        })
    }

    pub fn uniform(
        params: &Arc<CrtParams>,
        format: Format,
        rows: usize,
        cols: usize,
        src: &mut RandomSource,
    ) -> Result<Self> {
        Self::filled(params, rows, cols, format, || DcrtPoly::uniform(params, format, src))
    }

    pub fn gaussian(
        params: &Arc<CrtParams>,
        format: Format,
        rows: usize,
        cols: usize,
        src: &mut RandomSource,
    ) -> Result<Self> {
        Self::filled(params, rows, cols, format, || DcrtPoly::gaussian(params, format, src))
    }

    /// Ternary entries; `hamming_weight` of `Some(h)` makes each entry sparse
    /// with exactly `h` nonzero coefficients.
    pub fn ternary(
        params: &Arc<CrtParams>,
        format: Format,
        rows: usize,
        cols: usize,
        src: &mut RandomSource,
        hamming_weight: Option<usize>,
    ) -> Result<Self> {
        Self::filled(params, rows, cols, format, || match hamming_weight {
            Some(h) => DcrtPoly::sparse_ternary(params, format, src, h),
            None => DcrtPoly::ternary(params, format, src),
        })
    }

    pub fn params(&self) -> &Arc<CrtParams> {
        &self.params
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn num_towers(&self) -> usize {
        self.params.len()
    }

    pub fn ring_dim(&self) -> usize {
        self.params.ring_dim()
    }

    pub fn entries(&self) -> &[DcrtPoly] {
        &self.entries
    }

    pub fn entry(&self, row: usize, col: usize) -> &DcrtPoly {
        &self.entries[row * self.cols + col]
    }

    /// Entry at a flat row-major index.
    pub fn entry_at(&self, index: usize) -> &DcrtPoly {
        &self.entries[index]
    }

    /// Replace one entry; it must match this module's basis and format.
    pub fn set_entry(&mut self, row: usize, col: usize, value: DcrtPoly) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(modckks_err!(
                DimensionMismatch,
                "entry ({}, {}) outside {}x{} module",
                row,
                col,
                self.rows,
                self.cols
            ));
        }
        let idx = row * self.cols + col;
        self.entries[idx].check_compatible(&value, "set_entry")?;
        self.entries[idx] = value;
        Ok(())
    }

    /// Tower `tower` of entry `(row, col)`.
    pub fn element_at_index(&self, row: usize, col: usize, tower: usize) -> &Poly {
        self.entry(row, col).tower(tower)
    }

    pub fn set_element_at_index(&mut self, row: usize, col: usize, tower: usize, poly: Poly) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(modckks_err!(
                DimensionMismatch,
                "entry ({}, {}) outside {}x{} module",
                row,
                col,
                self.rows,
                self.cols
            ));
        }
        let idx = row * self.cols + col;
        self.entries[idx].set_tower(tower, poly)
    }

    pub fn into_entries(self) -> Vec<DcrtPoly> {
        self.entries
    }

    /// Same shape, basis and format, all entries zero.
    pub fn zero_like(&self) -> Self {
        Self {
            params: Arc::clone(&self.params),
            format: self.format,
            rows: self.rows,
            cols: self.cols,
            entries: vec![DcrtPoly::zero(&self.params, self.format); self.entries.len()],
        }
    }

    /// `Q ∪ P`: this module's basis followed by `params_p`.
    pub fn extended_crt_basis(&self, params_p: &CrtParams) -> Arc<CrtParams> {
        Arc::new(self.params.concat(params_p))
    }
}
