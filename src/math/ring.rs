//! Capability interface shared by ring elements and module elements.
//!
//! Scheme code that only needs these operations (rescaling, format changes,
//! tower drops) is written once against [`RingElement`] and runs on both
//! [`DcrtPoly`] and [`ModuleElement`](crate::module::ModuleElement).

use std::sync::Arc;

use super::dcrt::{CrtParams, DcrtPoly, Format};
use super::rns::{BasisConversion, ModDownTables};
use crate::error::Result;

pub trait RingElement: Clone + Send + Sync + Sized {
    fn params(&self) -> &Arc<CrtParams>;

    fn format(&self) -> Format;

    fn num_towers(&self) -> usize {
        self.params().len()
    }

    fn plus(&self, other: &Self) -> Result<Self>;

    fn minus(&self, other: &Self) -> Result<Self>;

    /// Ring product (matrix product for module elements).
    fn times(&self, other: &Self) -> Result<Self>;

    fn negate(&self) -> Self;

    /// Multiply by an integer given through its per-tower residues.
    fn times_crt(&self, residues: &[u64]) -> Result<Self>;

    fn switch_format(&mut self);

    fn set_format(&mut self, format: Format) {
        if self.format() != format {
            self.switch_format();
        }
    }

    fn drop_last_element(&mut self) -> Result<()>;

    fn drop_last_elements(&mut self, count: usize) -> Result<()>;

    fn drop_last_element_and_scale(&mut self, ql_inv_mod_q: &[u64]) -> Result<()>;

    fn approx_switch_crt_basis(
        &self,
        target: &Arc<CrtParams>,
        conv: &BasisConversion,
    ) -> Result<Self>;

    fn approx_mod_down(&self, params_q: &Arc<CrtParams>, tables: &ModDownTables) -> Result<Self>;
}

impl RingElement for DcrtPoly {
    fn params(&self) -> &Arc<CrtParams> {
        DcrtPoly::params(self)
    }

    fn format(&self) -> Format {
        DcrtPoly::format(self)
    }

    fn plus(&self, other: &Self) -> Result<Self> {
        DcrtPoly::plus(self, other)
    }

    fn minus(&self, other: &Self) -> Result<Self> {
        DcrtPoly::minus(self, other)
    }

    fn times(&self, other: &Self) -> Result<Self> {
        DcrtPoly::times(self, other)
    }

    fn negate(&self) -> Self {
        -self
    }

    fn times_crt(&self, residues: &[u64]) -> Result<Self> {
        DcrtPoly::times_crt(self, residues)
    }

    fn switch_format(&mut self) {
        DcrtPoly::switch_format(self)
    }

    fn drop_last_element(&mut self) -> Result<()> {
        DcrtPoly::drop_last_element(self)
    }

    fn drop_last_elements(&mut self, count: usize) -> Result<()> {
        DcrtPoly::drop_last_elements(self, count)
    }

    fn drop_last_element_and_scale(&mut self, ql_inv_mod_q: &[u64]) -> Result<()> {
        DcrtPoly::drop_last_element_and_scale(self, ql_inv_mod_q)
    }

    fn approx_switch_crt_basis(
        &self,
        target: &Arc<CrtParams>,
        conv: &BasisConversion,
    ) -> Result<Self> {
        DcrtPoly::approx_switch_crt_basis(self, target, conv)
    }

    fn approx_mod_down(&self, params_q: &Arc<CrtParams>, tables: &ModDownTables) -> Result<Self> {
        DcrtPoly::approx_mod_down(self, params_q, tables)
    }
}

/// Drop the top `count` towers of every element
///
/// Elements of one ciphertext share a tower count, so a failing count is
/// rejected before any element changes.
pub fn level_reduce_all<E: RingElement>(elements: &mut [E], count: usize) -> Result<()> {
    for element in elements.iter_mut() {
        element.drop_last_elements(count)?;
    }
    Ok(())
}

/// Divide every element by its top prime, rounding
pub fn rescale_all<E: RingElement>(elements: &mut [E], ql_inv_mod_q: &[u64]) -> Result<()> {
    for element in elements.iter_mut() {
        element.drop_last_element_and_scale(ql_inv_mod_q)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::*;
    use crate::math::{mod_inverse, primes};
    use crate::module::ModuleElement;

    fn make_params() -> Arc<CrtParams> {
        let q0 = primes::first_prime(40, 64).unwrap();
        let q1 = primes::next_prime(q0, 64).unwrap();
        Arc::new(CrtParams::new(32, &[q0, q1]).unwrap())
    }

    fn rescale_seven<E: RingElement>(mut elements: Vec<E>, top: u64, q0: u64) -> Vec<E> {
        let inv = mod_inverse(top % q0, q0).unwrap();
        rescale_all(&mut elements, &[inv]).unwrap();
        elements
    }

    #[test]
    fn test_rescale_all_on_rings_and_modules() {
        let params = make_params();
        let (q0, q1) = (params.modulus(0), params.modulus(1));
        let value = BigInt::from(q1) * 7;
        let poly = DcrtPoly::from_bigint(&params, &[value], Format::Coefficient);

        let polys = rescale_seven(vec![poly.clone(), poly.clone()], q1, q0);
        for p in &polys {
            assert_eq!(RingElement::num_towers(p), 1);
            assert_eq!(p.crt_interpolate().unwrap()[0], BigInt::from(7));
        }

        let module = ModuleElement::from_entries(1, 2, vec![poly.clone(), poly]).unwrap();
        let modules = rescale_seven(vec![module], q1, q0);
        assert_eq!(modules[0].num_towers(), 1);
        assert_eq!(modules[0].entry(0, 1).crt_interpolate().unwrap()[0], BigInt::from(7));
    }

    #[test]
    fn test_level_reduce_all_rejects_dropping_everything() {
        let params = make_params();
        let mut polys = vec![DcrtPoly::zero(&params, Format::Evaluation); 3];
        assert!(level_reduce_all(&mut polys, 2).is_err());
        assert!(polys.iter().all(|p| p.num_towers() == 2));
        level_reduce_all(&mut polys, 1).unwrap();
        assert!(polys.iter().all(|p| p.num_towers() == 1));
    }
}
