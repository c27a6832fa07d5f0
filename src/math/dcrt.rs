//! Double-CRT ring elements.
//!
//! A [`DcrtPoly`] represents an element of `Z_Q[X]/(X^N + 1)` with
//! `Q = q_0 · q_1 · … · q_{k-1}` as one [`Poly`] per prime ("tower"). The
//! basis is described by an immutable, shared [`CrtParams`]; operations that
//! drop towers swap in a new, shorter snapshot instead of editing the shared
//! one.

use std::ops::Neg;
use std::sync::Arc;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::crt::{big_signed_mod, crt_product, CrtReconstructor};
use super::modular::ModQ;
use super::ntt::NttContext;
use super::poly::Poly;
use super::rns::{BasisConversion, ModDownTables};
use super::sampling::RandomSource;
use crate::error::{modckks_err, ModckksError, Result};

/// Representation of ring-element values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    /// Polynomial coefficients.
    Coefficient,
    /// NTT evaluations (Montgomery form).
    Evaluation,
}

/// One CRT prime with its root of unity and NTT tables.
#[derive(Debug)]
pub struct TowerParams {
    modulus: u64,
    root_of_unity: u64,
    ntt: NttContext,
}

impl TowerParams {
    pub fn new(ring_dim: usize, modulus: u64) -> Result<Self> {
        let ntt = NttContext::new(ring_dim, modulus)?;
        Ok(Self {
            modulus,
            root_of_unity: ntt.root(),
            ntt,
        })
    }

    pub fn with_root(ring_dim: usize, modulus: u64, root_of_unity: u64) -> Result<Self> {
        let ntt = NttContext::with_root(ring_dim, modulus, root_of_unity)?;
        Ok(Self {
            modulus,
            root_of_unity,
            ntt,
        })
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn root_of_unity(&self) -> u64 {
        self.root_of_unity
    }

    pub fn ntt(&self) -> &NttContext {
        &self.ntt
    }
}

/// Ordered CRT basis: cyclotomic order plus the list of towers.
///
/// Serialized as moduli and roots; NTT tables are rebuilt on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "CrtParamsRepr", into = "CrtParamsRepr")]
pub struct CrtParams {
    cyclotomic_order: usize,
    towers: Vec<Arc<TowerParams>>,
}

#[derive(Serialize, Deserialize)]
struct CrtParamsRepr {
    cyclotomic_order: usize,
    moduli: Vec<u64>,
    roots: Vec<u64>,
}

impl TryFrom<CrtParamsRepr> for CrtParams {
    type Error = ModckksError;

    fn try_from(repr: CrtParamsRepr) -> Result<Self> {
        if repr.moduli.len() != repr.roots.len() {
            return Err(modckks_err!(
                DimensionMismatch,
                "{} moduli but {} roots",
                repr.moduli.len(),
                repr.roots.len()
            ));
        }
        let ring_dim = repr.cyclotomic_order / 2;
        let towers = repr
            .moduli
            .iter()
            .zip(&repr.roots)
            .map(|(&q, &root)| TowerParams::with_root(ring_dim, q, root).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            cyclotomic_order: repr.cyclotomic_order,
            towers,
        })
    }
}

impl From<CrtParams> for CrtParamsRepr {
    fn from(params: CrtParams) -> Self {
        Self {
            cyclotomic_order: params.cyclotomic_order,
            moduli: params.moduli(),
            roots: params.towers.iter().map(|t| t.root_of_unity).collect(),
        }
    }
}

impl PartialEq for CrtParams {
    fn eq(&self, other: &Self) -> bool {
        self.cyclotomic_order == other.cyclotomic_order
            && self.towers.len() == other.towers.len()
            && self
                .towers
                .iter()
                .zip(&other.towers)
                .all(|(a, b)| a.modulus == b.modulus)
    }
}

impl Eq for CrtParams {}

impl CrtParams {
    /// Build a basis for `X^ring_dim + 1`, searching a root for each prime.
    pub fn new(ring_dim: usize, moduli: &[u64]) -> Result<Self> {
        let towers = moduli
            .iter()
            .map(|&q| TowerParams::new(ring_dim, q).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            cyclotomic_order: 2 * ring_dim,
            towers,
        })
    }

    pub fn from_towers(cyclotomic_order: usize, towers: Vec<Arc<TowerParams>>) -> Self {
        Self {
            cyclotomic_order,
            towers,
        }
    }

    pub fn cyclotomic_order(&self) -> usize {
        self.cyclotomic_order
    }

    pub fn ring_dim(&self) -> usize {
        self.cyclotomic_order / 2
    }

    pub fn len(&self) -> usize {
        self.towers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towers.is_empty()
    }

    pub fn towers(&self) -> &[Arc<TowerParams>] {
        &self.towers
    }

    pub fn tower(&self, i: usize) -> &Arc<TowerParams> {
        &self.towers[i]
    }

    pub fn modulus(&self, i: usize) -> u64 {
        self.towers[i].modulus
    }

    pub fn moduli(&self) -> Vec<u64> {
        self.towers.iter().map(|t| t.modulus).collect()
    }

    /// Product of all moduli.
    pub fn big_modulus(&self) -> num_bigint::BigUint {
        crt_product(&self.moduli())
    }

    /// The first `count` towers.
    pub fn truncated(&self, count: usize) -> Self {
        self.sub_basis(0, count)
    }

    /// Towers `start..end`.
    pub fn sub_basis(&self, start: usize, end: usize) -> Self {
        Self {
            cyclotomic_order: self.cyclotomic_order,
            towers: self.towers[start..end].to_vec(),
        }
    }

    /// Concatenation `self ∪ other`, in that order.
    pub fn concat(&self, other: &CrtParams) -> Self {
        let mut towers = self.towers.clone();
        towers.extend(other.towers.iter().cloned());
        Self {
            cyclotomic_order: self.cyclotomic_order,
            towers,
        }
    }
}

/// Element of `R_Q` in double-CRT form.
///
/// Deserialization checks every tower against `params` and `format`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "DcrtPolyRepr")]
pub struct DcrtPoly {
    params: Arc<CrtParams>,
    format: Format,
    towers: Vec<Poly>,
}

#[derive(Deserialize)]
struct DcrtPolyRepr {
    params: Arc<CrtParams>,
    format: Format,
    towers: Vec<Poly>,
}

impl TryFrom<DcrtPolyRepr> for DcrtPoly {
    type Error = ModckksError;

    fn try_from(repr: DcrtPolyRepr) -> Result<Self> {
        for (i, tower) in repr.towers.iter().enumerate() {
            let q = tower.modulus();
            if tower.coeffs().iter().any(|&c| c >= q) {
                return Err(modckks_err!(
                    DimensionMismatch,
                    "tower {} holds values outside [0, {})",
                    i,
                    q
                ));
            }
        }
        Self::from_towers(&repr.params, repr.format, repr.towers)
    }
}

impl PartialEq for DcrtPoly {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format && *self.params == *other.params && self.towers == other.towers
    }
}

impl DcrtPoly {
    pub fn zero(params: &Arc<CrtParams>, format: Format) -> Self {
        let n = params.ring_dim();
        let is_ntt = format == Format::Evaluation;
        let towers = params
            .towers()
            .iter()
            .map(|t| Poly::from_raw(vec![0; n], t.modulus(), is_ntt))
            .collect();
        Self {
            params: Arc::clone(params),
            format,
            towers,
        }
    }

    /// Assemble from per-tower polynomials, checking moduli and domain flags.
    pub fn from_towers(params: &Arc<CrtParams>, format: Format, towers: Vec<Poly>) -> Result<Self> {
        if towers.len() != params.len() {
            return Err(modckks_err!(
                DimensionMismatch,
                "{} towers supplied for a basis of {}",
                towers.len(),
                params.len()
            ));
        }
        let is_ntt = format == Format::Evaluation;
        for (i, poly) in towers.iter().enumerate() {
            if poly.modulus() != params.modulus(i)
                || poly.is_ntt() != is_ntt
                || poly.dimension() != params.ring_dim()
            {
                return Err(modckks_err!(
                    DimensionMismatch,
                    "tower {} does not match modulus {} in {:?} format",
                    i,
                    params.modulus(i),
                    format
                ));
            }
        }
        Ok(Self {
            params: Arc::clone(params),
            format,
            towers,
        })
    }

    /// Uniformly random element.
    pub fn uniform(params: &Arc<CrtParams>, format: Format, src: &mut RandomSource) -> Self {
        let n = params.ring_dim();
        let is_ntt = format == Format::Evaluation;
        let towers = params
            .towers()
            .iter()
            .map(|t| Poly::random_with_rng(n, t.modulus(), is_ntt, src.rng()))
            .collect();
        Self {
            params: Arc::clone(params),
            format,
            towers,
        }
    }

    /// Reduce one small signed polynomial into every tower.
    ///
    /// Missing coefficients are zero; coefficients past the ring dimension
    /// are ignored.
    pub fn from_signed(params: &Arc<CrtParams>, coeffs: &[i64], format: Format) -> Self {
        let coeffs = padded(coeffs, params.ring_dim());
        let towers = params
            .towers()
            .iter()
            .map(|t| Poly::from_signed(&coeffs, t.modulus()))
            .collect();
        Self::coefficient_towers(params, towers, format)
    }

    pub fn from_i128(params: &Arc<CrtParams>, coeffs: &[i128], format: Format) -> Self {
        let coeffs = padded(coeffs, params.ring_dim());
        let towers = params
            .towers()
            .iter()
            .map(|t| Poly::from_i128(&coeffs, t.modulus()))
            .collect();
        Self::coefficient_towers(params, towers, format)
    }

    pub fn from_bigint(params: &Arc<CrtParams>, coeffs: &[BigInt], format: Format) -> Self {
        let coeffs = padded(coeffs, params.ring_dim());
        let towers = params
            .towers()
            .iter()
            .map(|t| {
                let q = t.modulus();
                Poly::from_raw(coeffs.iter().map(|c| big_signed_mod(c, q)).collect(), q, false)
            })
            .collect();
        Self::coefficient_towers(params, towers, format)
    }

    fn coefficient_towers(params: &Arc<CrtParams>, towers: Vec<Poly>, format: Format) -> Self {
        let mut out = Self {
            params: Arc::clone(params),
            format: Format::Coefficient,
            towers,
        };
        out.set_format(format);
        out
    }

    pub fn gaussian(params: &Arc<CrtParams>, format: Format, src: &mut RandomSource) -> Self {
        let coeffs = src.gaussian_vec(params.ring_dim());
        Self::from_signed(params, &coeffs, format)
    }

    pub fn ternary(params: &Arc<CrtParams>, format: Format, src: &mut RandomSource) -> Self {
        let coeffs = src.ternary_vec(params.ring_dim());
        Self::from_signed(params, &coeffs, format)
    }

    pub fn sparse_ternary(
        params: &Arc<CrtParams>,
        format: Format,
        src: &mut RandomSource,
        hamming_weight: usize,
    ) -> Self {
        let coeffs = src.sparse_ternary_vec(params.ring_dim(), hamming_weight);
        Self::from_signed(params, &coeffs, format)
    }

    pub fn params(&self) -> &Arc<CrtParams> {
        &self.params
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn ring_dim(&self) -> usize {
        self.params.ring_dim()
    }

    pub fn num_towers(&self) -> usize {
        self.towers.len()
    }

    pub fn tower(&self, i: usize) -> &Poly {
        &self.towers[i]
    }

    pub fn towers(&self) -> &[Poly] {
        &self.towers
    }

    /// Replace one tower; the replacement must match the tower's modulus and domain.
    pub fn set_tower(&mut self, i: usize, poly: Poly) -> Result<()> {
        if i >= self.towers.len()
            || poly.modulus() != self.params.modulus(i)
            || poly.is_ntt() != (self.format == Format::Evaluation)
        {
            return Err(modckks_err!(
                DimensionMismatch,
                "cannot place a tower modulo {} at index {}",
                poly.modulus(),
                i
            ));
        }
        self.towers[i] = poly;
        Ok(())
    }

    fn ntt(&self, i: usize) -> &NttContext {
        self.params.tower(i).ntt()
    }

    pub(crate) fn check_compatible(&self, other: &Self, op: &str) -> Result<()> {
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
                "{}: CRT basis of {} towers vs {} towers",
                op,
                self.towers.len(),
                other.towers.len()
            ));
        }
        Ok(())
    }

    pub fn switch_format(&mut self) {
        let to_eval = self.format == Format::Coefficient;
        for (i, tower) in self.towers.iter_mut().enumerate() {
            let ctx = self.params.tower(i).ntt();
            if to_eval {
                tower.to_ntt(ctx);
            } else {
                tower.from_ntt(ctx);
            }
        }
        self.format = if to_eval {
            Format::Evaluation
        } else {
            Format::Coefficient
        };
    }

    pub fn set_format(&mut self, format: Format) {
        if self.format != format {
            self.switch_format();
        }
    }

    pub fn plus(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        out.plus_assign(other)?;
        Ok(out)
    }

    pub fn plus_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other, "plus")?;
        for (a, b) in self.towers.iter_mut().zip(&other.towers) {
            *a += b;
        }
        Ok(())
    }

    pub fn minus(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        out.minus_assign(other)?;
        Ok(out)
    }

    pub fn minus_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other, "minus")?;
        for (a, b) in self.towers.iter_mut().zip(&other.towers) {
            *a -= b;
        }
        Ok(())
    }

    /// Ring product; both operands must be in evaluation format.
    pub fn times(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other, "times")?;
        self.require_evaluation("times")?;
        let towers = self
            .towers
            .iter()
            .zip(&other.towers)
            .enumerate()
            .map(|(i, (a, b))| a.mul_ntt_domain(b, self.ntt(i)))
            .collect();
        Ok(Self {
            params: Arc::clone(&self.params),
            format: self.format,
            towers,
        })
    }

    /// `self += a · b` in evaluation format.
    pub fn mul_acc(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.check_compatible(a, "mul_acc")?;
        self.check_compatible(b, "mul_acc")?;
        self.require_evaluation("mul_acc")?;
        for (i, tower) in self.towers.iter_mut().enumerate() {
            tower.mul_acc_ntt_domain(&a.towers[i], &b.towers[i], self.params.tower(i).ntt());
        }
        Ok(())
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

    /// Multiply by an integer given through its residues, one per tower
    /// (extra residues are ignored).
    pub fn times_crt(&self, residues: &[u64]) -> Result<Self> {
        if residues.len() < self.towers.len() {
            return Err(modckks_err!(
                DimensionMismatch,
                "{} residues for {} towers",
                residues.len(),
                self.towers.len()
            ));
        }
        let mut out = self.clone();
        for (tower, &r) in out.towers.iter_mut().zip(residues) {
            tower.scalar_mul_assign(r);
        }
        Ok(out)
    }

    pub fn times_scalar(&self, scalar: u64) -> Self {
        let mut out = self.clone();
        for tower in out.towers.iter_mut() {
            tower.scalar_mul_assign(scalar);
        }
        out
    }

    pub fn times_signed(&self, scalar: i64) -> Self {
        let mut out = self.clone();
        for tower in out.towers.iter_mut() {
            let q = tower.modulus();
            tower.scalar_mul_assign(ModQ::from_signed(scalar, q));
        }
        out
    }

    /// Add the constant polynomial `scalar`.
    pub fn plus_scalar(&self, scalar: u64) -> Self {
        let mut out = self.clone();
        for (i, tower) in out.towers.iter_mut().enumerate() {
            tower.add_constant(scalar, self.params.tower(i).ntt());
        }
        out
    }

    pub fn minus_scalar(&self, scalar: u64) -> Self {
        let mut out = self.clone();
        for (i, tower) in out.towers.iter_mut().enumerate() {
            let q = tower.modulus();
            tower.add_constant(ModQ::negate(scalar % q, q), self.params.tower(i).ntt());
        }
        out
    }

    pub fn drop_last_element(&mut self) -> Result<()> {
        self.drop_last_elements(1)
    }

    /// Drop the top `count` towers; at least one tower must remain.
    pub fn drop_last_elements(&mut self, count: usize) -> Result<()> {
        if count >= self.towers.len() {
            return Err(modckks_err!(
                DimensionMismatch,
                "cannot drop {} of {} towers",
                count,
                self.towers.len()
            ));
        }
        let keep = self.towers.len() - count;
        self.towers.truncate(keep);
        self.params = Arc::new(self.params.truncated(keep));
        Ok(())
    }

    /// Drop the top tower `q_t` and divide by it with rounding:
    /// `x_i ← (x_i − [x_t]_centered) · q_t^{-1} mod q_i`.
    ///
    /// `ql_inv_mod_q[i]` must hold `q_t^{-1} mod q_i`.
    pub fn drop_last_element_and_scale(&mut self, ql_inv_mod_q: &[u64]) -> Result<()> {
        let count = self.towers.len();
        if count < 2 || ql_inv_mod_q.len() < count - 1 {
            return Err(modckks_err!(
                DimensionMismatch,
                "rescale needs at least two towers and {} inverses (have {} towers, {} inverses)",
                count.saturating_sub(1),
                count,
                ql_inv_mod_q.len()
            ));
        }
        let t = count - 1;
        let is_ntt = self.format == Format::Evaluation;
        let mut last = self.towers[t].clone();
        if is_ntt {
            last.from_ntt(self.ntt(t));
        }

        for i in 0..t {
            let ctx = self.params.tower(i).ntt();
            let mut shifted = last.switch_modulus_centered(ctx.modulus());
            if is_ntt {
                shifted.to_ntt(ctx);
            }
            let tower = &mut self.towers[i];
            *tower -= &shifted;
            tower.scalar_mul_assign(ql_inv_mod_q[i]);
        }

        self.towers.truncate(t);
        self.params = Arc::new(self.params.truncated(t));
        Ok(())
    }

    /// Re-express tower `i` (a small polynomial) modulo another prime.
    pub fn switch_tower_modulus(&self, i: usize, target: &TowerParams) -> Result<Poly> {
        if self.format != Format::Coefficient {
            return Err(modckks_err!(
                DimensionMismatch,
                "modulus switching requires coefficient format"
            ));
        }
        Ok(self.towers[i].switch_modulus_centered(target.modulus()))
    }

    /// Fast base conversion of a coefficient-format element into `target`.
    pub fn approx_switch_crt_basis(
        &self,
        target: &Arc<CrtParams>,
        conv: &BasisConversion,
    ) -> Result<Self> {
        if self.format != Format::Coefficient {
            return Err(modckks_err!(
                DimensionMismatch,
                "basis conversion requires coefficient format"
            ));
        }
        if conv.source() != self.params.moduli().as_slice()
            || conv.target().len() < target.len()
            || conv.target()[..target.len()] != target.moduli()[..]
        {
            return Err(modckks_err!(
                DimensionMismatch,
                "conversion tables do not match a {}-tower source and {}-tower target",
                self.towers.len(),
                target.len()
            ));
        }
        let inputs: Vec<&[u64]> = self.towers.iter().map(|t| t.coeffs()).collect();
        let converted = conv.convert(&inputs, target.len());
        let towers = converted
            .into_iter()
            .enumerate()
            .map(|(j, coeffs)| Poly::from_raw(coeffs, target.modulus(j), false))
            .collect();
        Ok(Self {
            params: Arc::clone(target),
            format: Format::Coefficient,
            towers,
        })
    }

    /// Divide an element of `Q_l ∪ P` by `P` with rounding, returning an
    /// element of `Q_l` in the same format.
    pub fn approx_mod_down(&self, params_q: &Arc<CrtParams>, tables: &ModDownTables) -> Result<Self> {
        let size_ql = params_q.len();
        let size_p = tables.p_to_q.source().len();
        if self.towers.len() != size_ql + size_p
            || tables.p_inv_mod_q.len() < size_ql
            || (0..size_ql).any(|i| params_q.modulus(i) != self.params.modulus(i))
        {
            return Err(modckks_err!(
                DimensionMismatch,
                "mod-down of {} towers to {} + {} towers",
                self.towers.len(),
                size_ql,
                size_p
            ));
        }
        let is_ntt = self.format == Format::Evaluation;

        let mut part_p: Vec<Poly> = self.towers[size_ql..].to_vec();
        if is_ntt {
            for (j, poly) in part_p.iter_mut().enumerate() {
                poly.from_ntt(self.ntt(size_ql + j));
            }
        }
        let inputs: Vec<&[u64]> = part_p.iter().map(|p| p.coeffs()).collect();
        let converted = tables.p_to_q.convert(&inputs, size_ql);

        let mut towers = Vec::with_capacity(size_ql);
        for (i, coeffs) in converted.into_iter().enumerate() {
            let ctx = params_q.tower(i).ntt();
            let mut shifted = Poly::from_raw(coeffs, ctx.modulus(), false);
            if is_ntt {
                shifted.to_ntt(ctx);
            }
            let mut tower = &self.towers[i] - &shifted;
            tower.scalar_mul_assign(tables.p_inv_mod_q[i]);
            towers.push(tower);
        }
        Ok(Self {
            params: Arc::clone(params_q),
            format: self.format,
            towers,
        })
    }

    /// Centered big-integer coefficients of the element.
    pub fn crt_interpolate(&self) -> Result<Vec<BigInt>> {
        let mut coeff = self.clone();
        coeff.set_format(Format::Coefficient);
        let rec = CrtReconstructor::new(&self.params.moduli())?;
        let n = self.ring_dim();
        let mut residues = vec![0u64; coeff.towers.len()];
        Ok((0..n)
            .map(|c| {
                for (slot, tower) in residues.iter_mut().zip(&coeff.towers) {
                    *slot = tower.coeffs()[c];
                }
                rec.reconstruct(&residues)
            })
            .collect())
    }
}

fn padded<T: Clone + Default>(coeffs: &[T], n: usize) -> Vec<T> {
    let mut out: Vec<T> = coeffs.iter().take(n).cloned().collect();
    out.resize(n, T::default());
    out
}

impl Neg for &DcrtPoly {
    type Output = DcrtPoly;

    fn neg(self) -> DcrtPoly {
        DcrtPoly {
            params: Arc::clone(&self.params),
            format: self.format,
            towers: self.towers.iter().map(|t| -t).collect(),
        }
    }
}
