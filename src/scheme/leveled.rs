//! Leveled homomorphic operations
//!
//! Binary operations first bring both operands to a common level, depth and
//! scale according to the configured [`ScalingTechnique`]; see
//! [`plan_levels_and_depth`] for the automatic modes.

use tracing::trace;

use super::adjust::{plan_levels_and_depth, AdjustAction, AdjustPlan, Operand, OperandState};
use super::scalar::strategy;
use super::{Ciphertext, EvalMultKeys, Feature, ModuleCkks, Plaintext, PrivateKey, RankReductionKey};
use crate::error::{modckks_err, Result};
use crate::ks;
use crate::math::ring::{level_reduce_all, rescale_all};
use crate::math::{Format, ModQ};
use crate::module::ModuleElement;
use crate::params::ScalingTechnique;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AddOp {
    Add,
    Sub,
}

impl OperandState {
    fn of(ct: &Ciphertext) -> Self {
        Self {
            level: ct.level,
            depth: ct.noise_scale_deg,
            num_towers: ct.num_towers(),
            scaling_factor: ct.scaling_factor,
        }
    }
}

impl ModuleCkks {
    fn technique(&self) -> ScalingTechnique {
        self.params.scaling_technique()
    }

    pub fn eval_add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut result = a.clone();
        self.eval_add_in_place(&mut result, b)?;
        Ok(result)
    }

    pub fn eval_add_in_place(&self, a: &mut Ciphertext, b: &Ciphertext) -> Result<()> {
        self.require(Feature::LeveledShe, "eval_add")?;
        self.combine_in_place(a, b, AddOp::Add)
    }

    pub fn eval_sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut result = a.clone();
        self.eval_sub_in_place(&mut result, b)?;
        Ok(result)
    }

    pub fn eval_sub_in_place(&self, a: &mut Ciphertext, b: &Ciphertext) -> Result<()> {
        self.require(Feature::LeveledShe, "eval_sub")?;
        self.combine_in_place(a, b, AddOp::Sub)
    }

    pub fn eval_add_plaintext(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        let mut result = ct.clone();
        self.eval_add_plaintext_in_place(&mut result, pt)?;
        Ok(result)
    }

    pub fn eval_add_plaintext_in_place(&self, ct: &mut Ciphertext, pt: &Plaintext) -> Result<()> {
        self.require(Feature::LeveledShe, "eval_add_plaintext")?;
        self.combine_in_place(ct, &pt.to_ciphertext(), AddOp::Add)
    }

    pub fn eval_sub_plaintext(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
        let mut result = ct.clone();
        self.eval_sub_plaintext_in_place(&mut result, pt)?;
        Ok(result)
    }

    pub fn eval_sub_plaintext_in_place(&self, ct: &mut Ciphertext, pt: &Plaintext) -> Result<()> {
        self.require(Feature::LeveledShe, "eval_sub_plaintext")?;
        self.combine_in_place(ct, &pt.to_ciphertext(), AddOp::Sub)
    }

    pub fn eval_negate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.require(Feature::LeveledShe, "eval_negate")?;
        let mut result = ct.clone();
        result.elements = ct.elements.iter().map(|e| -e).collect();
        Ok(result)
    }

    fn combine_in_place(&self, a: &mut Ciphertext, b: &Ciphertext, op: AddOp) -> Result<()> {
        if self.technique() == ScalingTechnique::NoRescale {
            return add_core_in_place(a, b, op);
        }
        let mut b = b.clone();
        self.adjust_for_add_or_sub_in_place(a, &mut b)?;
        add_core_in_place(a, &b, op)
    }

    /// Multiply without relinearization
    ///
    /// The result has three elements at rank 1 and four at higher rank.
    pub fn eval_mult(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.require(Feature::LeveledShe, "eval_mult")?;
        if self.technique() == ScalingTechnique::NoRescale {
            return self.eval_mult_core(a, b);
        }
        let mut a = a.clone();
        let mut b = b.clone();
        self.adjust_for_mult_in_place(&mut a, &mut b)?;
        self.eval_mult_core(&a, &b)
    }

    /// Quadratic expansion of two linear ciphertexts on the same towers
    ///
    /// ```text
    /// cv0 = a0·b0
    /// cv1 = a1·b0 + a0·b1
    /// cv2 = a1 ⊙ b1
    /// cv3 = ltp(a1, b1) + ltp(b1, a1)      (rank > 1)
    /// ```
    pub fn eval_mult_core(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        verify_num_towers(a, b)?;
        let (a0, a1) = a.c0_c1("eval_mult_core")?;
        let (b0, b1) = b.c0_c1("eval_mult_core")?;

        let (linear, quadratic) = rayon::join(
            || -> Result<(ModuleElement, ModuleElement)> {
                let cv0 = a0.times(b0)?;
                let mut cv1 = a1.times(b0)?;
                cv1.plus_assign(&a0.times(b1)?)?;
                Ok((cv0, cv1))
            },
            || -> Result<(ModuleElement, Option<ModuleElement>)> {
                let cv2 = a1.hadamard_product(b1)?;
                let cv3 = if self.rank() > 1 {
                    let mut cross = a1.lower_triangle_product(b1)?;
                    cross.plus_assign(&b1.lower_triangle_product(a1)?)?;
                    Some(cross)
                } else {
                    None
                };
                Ok((cv2, cv3))
            },
        );
        let (cv0, cv1) = linear?;
        let (cv2, cv3) = quadratic?;

        let mut elements = vec![cv0, cv1, cv2];
        elements.extend(cv3);
        let result = Ciphertext {
            elements,
            level: a.level,
            noise_scale_deg: a.noise_scale_deg + b.noise_scale_deg,
            scaling_factor: a.scaling_factor * b.scaling_factor,
            slots: a.slots,
        };
        trace!(
            level = result.level,
            depth = result.noise_scale_deg,
            elements = result.len(),
            "multiplied ciphertexts"
        );
        Ok(result)
    }

    /// Relinearization keys: `s⊙s → s`, plus `ltp(s, s) → s` above rank 1
    pub fn eval_mult_mod_key_gen(&mut self, private_key: &PrivateKey) -> Result<EvalMultKeys> {
        self.require(Feature::LeveledShe, "eval_mult_mod_key_gen")?;
        let s = &private_key.s;
        let s_squared = s.hadamard_product(s)?;
        let hadamard = ks::key_switch_gen(&self.params, &s_squared, s, &mut self.src)?;
        let cross = if self.rank() > 1 {
            let s_cross = s.lower_triangle_product(s)?;
            Some(ks::key_switch_gen(&self.params, &s_cross, s, &mut self.src)?)
        } else {
            None
        };
        Ok(EvalMultKeys { hadamard, cross })
    }

    pub fn relinearize(&self, ct: &Ciphertext, keys: &EvalMultKeys) -> Result<Ciphertext> {
        let mut result = ct.clone();
        self.relinearize_in_place(&mut result, keys)?;
        Ok(result)
    }

    /// Fold `cv2` (and `cv3`) back into `(c0, c1)`
    pub fn relinearize_in_place(&self, ct: &mut Ciphertext, keys: &EvalMultKeys) -> Result<()> {
        self.require(Feature::LeveledShe, "relinearize")?;
        let len = ct.len();
        if !(2..=4).contains(&len) {
            return Err(modckks_err!(
                DimensionMismatch,
                "relinearize expects 2 to 4 ciphertext elements, got {}",
                len
            ));
        }
        if len == 4 && keys.cross.is_none() {
            return Err(modckks_err!(
                MissingKey,
                "relinearize of a rank {} product needs the cross-term key",
                ct.rank()
            ));
        }

        let mut switched = Vec::with_capacity(len - 2);
        for (j, component) in ct.elements.iter().enumerate().skip(2) {
            let key = if j == 2 { Some(&keys.hadamard) } else { keys.cross.as_ref() };
            if let Some(key) = key {
                switched.push(ks::key_switch_core(&self.params, component, key)?);
            }
        }
        for (ab0, ab1) in switched {
            ct.elements[0].plus_assign(&ab0)?;
            ct.elements[1].plus_assign(&ab1)?;
        }
        ct.elements.truncate(2);
        Ok(())
    }

    pub fn eval_mult_and_relinearize(
        &self,
        a: &Ciphertext,
        b: &Ciphertext,
        keys: &EvalMultKeys,
    ) -> Result<Ciphertext> {
        let mut result = self.eval_mult(a, b)?;
        self.relinearize_in_place(&mut result, keys)?;
        Ok(result)
    }

    /// Multiply by a real constant
    ///
    /// In the automatic modes a depth-2 input is rescaled first.
    pub fn eval_mult_scalar(&self, ct: &Ciphertext, value: f64) -> Result<Ciphertext> {
        self.require(Feature::LeveledShe, "eval_mult_scalar")?;
        let mut result = ct.clone();
        let technique = self.technique();
        if technique != ScalingTechnique::FixedManual
            && technique != ScalingTechnique::NoRescale
            && result.noise_scale_deg == 2
        {
            self.mod_reduce_internal_in_place(&mut result, 1)?;
        }
        self.eval_mult_core_scalar_in_place(&mut result, value)?;
        Ok(result)
    }

    /// Multiply every element by `round(value · sf[level])`
    pub fn eval_mult_core_scalar_in_place(&self, ct: &mut Ciphertext, value: f64) -> Result<()> {
        let sf = self.params.scaling_factor_real(ct.level);
        let moduli = ct
            .elements
            .first()
            .map(|e| e.params().moduli())
            .ok_or_else(|| modckks_err!(DimensionMismatch, "empty ciphertext"))?;
        let residues = strategy(self.params.config().scalar_encoding).residues(value, sf, &moduli)?;
        for element in ct.elements.iter_mut() {
            *element = element.times_crt(&residues)?;
        }
        ct.noise_scale_deg += 1;
        ct.scaling_factor *= sf;
        Ok(())
    }

    /// Split `s` into the first `new_rank` rows and the rest
    ///
    /// # Returns
    /// The reduced private key and the key switching the dropped rows onto it
    pub fn eval_rank_red_key_gen(
        &mut self,
        private_key: &PrivateKey,
        new_rank: usize,
    ) -> Result<(PrivateKey, RankReductionKey)> {
        self.require(Feature::LeveledShe, "eval_rank_red_key_gen")?;
        let rows = private_key.rank();
        if new_rank < 1 || new_rank >= rows {
            return Err(modckks_err!(
                InvalidParameters,
                "Invalid new rank for EvalRankRedKeyGen: {} (current rank {})",
                new_rank,
                rows
            ));
        }
        let mut s_reduced = private_key.s.clone();
        let s_removed = s_reduced.drop_rows(rows - new_rank)?;
        let key = ks::key_switch_gen(&self.params, &s_removed, &s_reduced, &mut self.src)?;
        Ok((PrivateKey { s: s_reduced }, RankReductionKey { key, new_rank }))
    }

    /// Move a ciphertext to the reduced secret
    pub fn eval_rank_reduce(&self, ct: &Ciphertext, key: &RankReductionKey) -> Result<Ciphertext> {
        self.require(Feature::LeveledShe, "eval_rank_reduce")?;
        let (_, c1) = ct.c0_c1("eval_rank_reduce")?;
        let a = key
            .key
            .a()
            .first()
            .ok_or_else(|| modckks_err!(MissingKey, "rank reduction key has no parts"))?;
        if c1.cols() != a.rows() + a.cols() {
            return Err(modckks_err!(
                DimensionMismatch,
                "EvalRankRedKeyGen reduceKey does not match ciphertext rank: c1 has {} columns, key {}x{}",
                c1.cols(),
                a.rows(),
                a.cols()
            ));
        }

        let mut result = ct.clone();
        for element in result.elements.iter_mut() {
            element.set_format(Format::Evaluation);
        }
        let removed = result.elements[1].drop_columns(a.rows())?;
        let (ab0, ab1) = ks::key_switch_core(&self.params, &removed, &key.key)?;
        result.elements[0].plus_assign(&ab0)?;
        result.elements[1].plus_assign(&ab1)?;
        trace!(rank = result.rank(), "reduced ciphertext rank");
        Ok(result)
    }

    pub fn mod_reduce(&self, ct: &Ciphertext, levels: usize) -> Result<Ciphertext> {
        let mut result = ct.clone();
        self.mod_reduce_in_place(&mut result, levels)?;
        Ok(result)
    }

    /// Rescale by `levels` primes; acts only under `FixedManual`, the other
    /// modes rescale automatically
    pub fn mod_reduce_in_place(&self, ct: &mut Ciphertext, levels: usize) -> Result<()> {
        self.require(Feature::LeveledShe, "mod_reduce")?;
        if self.technique() == ScalingTechnique::FixedManual {
            self.mod_reduce_internal_in_place(ct, levels)?;
        }
        Ok(())
    }

    pub fn level_reduce(&self, ct: &Ciphertext, levels: usize) -> Result<Ciphertext> {
        let mut result = ct.clone();
        self.level_reduce_in_place(&mut result, levels)?;
        Ok(result)
    }

    /// Drop `levels` primes without scaling
    ///
    /// Rejected under the flexible modes, where the scale is tied to the
    /// level.
    pub fn level_reduce_in_place(&self, ct: &mut Ciphertext, levels: usize) -> Result<()> {
        self.require(Feature::LeveledShe, "level_reduce")?;
        if self.technique().is_flexible() {
            return Err(modckks_err!(
                UnsupportedOperation,
                "level_reduce is not supported under {}",
                self.technique()
            ));
        }
        self.level_reduce_internal_in_place(ct, levels)
    }

    /// Rescale by `levels` primes regardless of the technique
    pub fn mod_reduce_internal_in_place(&self, ct: &mut Ciphertext, levels: usize) -> Result<()> {
        if levels == 0 {
            return Ok(());
        }
        let size_ql = ct.num_towers();
        if levels >= size_ql {
            return Err(modckks_err!(
                DimensionMismatch,
                "cannot rescale {} of {} towers",
                levels,
                size_ql
            ));
        }
        if levels > ct.noise_scale_deg {
            return Err(modckks_err!(
                DepthMismatch,
                "cannot rescale depth {} by {} levels",
                ct.noise_scale_deg,
                levels
            ));
        }

        for l in 0..levels {
            rescale_all(&mut ct.elements, self.params.ql_inv_mod_q(size_ql - 1 - l))?;
        }
        ct.noise_scale_deg -= levels;
        ct.level += levels;
        for i in 0..levels {
            ct.scaling_factor /= self.params.mod_reduce_factor(size_ql - 1 - i);
        }
        trace!(
            level = ct.level,
            depth = ct.noise_scale_deg,
            towers = ct.num_towers(),
            "rescaled"
        );
        Ok(())
    }

    pub fn level_reduce_internal_in_place(&self, ct: &mut Ciphertext, levels: usize) -> Result<()> {
        if levels == 0 {
            return Ok(());
        }
        level_reduce_all(&mut ct.elements, levels)?;
        ct.level += levels;
        Ok(())
    }

    /// Align the tower counts by dropping primes from the larger operand
    fn adjust_levels_in_place(&self, a: &mut Ciphertext, b: &mut Ciphertext) -> Result<()> {
        let (size_a, size_b) = (a.num_towers(), b.num_towers());
        if size_a < size_b {
            self.level_reduce_internal_in_place(b, size_b - size_a)
        } else if size_a > size_b {
            self.level_reduce_internal_in_place(a, size_a - size_b)
        } else {
            Ok(())
        }
    }

    /// Bring both operands to the same level, depth and scale
    pub fn adjust_levels_and_depth_in_place(&self, a: &mut Ciphertext, b: &mut Ciphertext) -> Result<()> {
        let plan = plan_levels_and_depth(self.params.as_ref(), &OperandState::of(a), &OperandState::of(b));
        if let Some(plan) = plan {
            let target = match plan.operand {
                Operand::First => a,
                Operand::Second => b,
            };
            self.apply_plan(target, &plan)?;
        }
        Ok(())
    }

    fn apply_plan(&self, ct: &mut Ciphertext, plan: &AdjustPlan) -> Result<()> {
        for action in &plan.actions {
            match *action {
                AdjustAction::ScaleMultiplyBy(value) => self.eval_mult_core_scalar_in_place(ct, value)?,
                AdjustAction::RescaleBy(levels) => self.mod_reduce_internal_in_place(ct, levels)?,
                AdjustAction::LevelReduceBy(levels) => self.level_reduce_internal_in_place(ct, levels)?,
            }
        }
        if let Some(sf) = plan.final_scaling_factor {
            ct.scaling_factor = sf;
        }
        Ok(())
    }

    /// As [`adjust_levels_and_depth_in_place`](Self::adjust_levels_and_depth_in_place),
    /// then rescale both operands if they are at depth 2
    pub fn adjust_levels_and_depth_to_one_in_place(&self, a: &mut Ciphertext, b: &mut Ciphertext) -> Result<()> {
        self.adjust_levels_and_depth_in_place(a, b)?;
        if a.noise_scale_deg == 2 {
            self.mod_reduce_internal_in_place(a, 1)?;
            self.mod_reduce_internal_in_place(b, 1)?;
        }
        Ok(())
    }

    fn adjust_for_add_or_sub_in_place(&self, a: &mut Ciphertext, b: &mut Ciphertext) -> Result<()> {
        match self.technique() {
            ScalingTechnique::FixedManual => self.adjust_fixed_manual_for_add(a, b),
            ScalingTechnique::NoRescale => Ok(()),
            _ => self.adjust_levels_and_depth_in_place(a, b),
        }
    }

    fn adjust_fixed_manual_for_add(&self, a: &mut Ciphertext, b: &mut Ciphertext) -> Result<()> {
        self.adjust_levels_in_place(a, b)?;

        let (ptxt, ctxt) = if a.len() == 1 {
            (a, &*b)
        } else if b.len() == 1 {
            (b, &*a)
        } else {
            if a.noise_scale_deg != b.noise_scale_deg {
                return Err(modckks_err!(
                    DepthMismatch,
                    "ciphertexts at depths {} and {} need mod_reduce before adding",
                    a.noise_scale_deg,
                    b.noise_scale_deg
                ));
            }
            return Ok(());
        };

        if ptxt.noise_scale_deg < ctxt.noise_scale_deg {
            let diff = (ctxt.noise_scale_deg - ptxt.noise_scale_deg) as u64;
            let int_sf = (self.params.scaling_factor_real(0) + 0.5) as u64;
            let moduli = ctxt
                .elements
                .first()
                .map(|e| e.params().moduli())
                .ok_or_else(|| modckks_err!(DimensionMismatch, "empty ciphertext"))?;
            let pow_sf: Vec<u64> = moduli.iter().map(|&q| ModQ::pow(int_sf % q, diff, q)).collect();
            ptxt.elements[0] = ptxt.elements[0].times_crt(&pow_sf)?;
            ptxt.noise_scale_deg = ctxt.noise_scale_deg;
            ptxt.scaling_factor = ctxt.scaling_factor;
        } else if ptxt.noise_scale_deg > ctxt.noise_scale_deg {
            return Err(modckks_err!(
                DepthMismatch,
                "plaintext cannot be encoded at a larger depth than that of the ciphertext"
            ));
        }
        Ok(())
    }

    fn adjust_for_mult_in_place(&self, a: &mut Ciphertext, b: &mut Ciphertext) -> Result<()> {
        match self.technique() {
            ScalingTechnique::FixedManual => self.adjust_levels_in_place(a, b),
            ScalingTechnique::NoRescale => Ok(()),
            _ => self.adjust_levels_and_depth_to_one_in_place(a, b),
        }
    }
}

fn verify_num_towers(a: &Ciphertext, b: &Ciphertext) -> Result<()> {
    if a.num_towers() != b.num_towers() {
        return Err(modckks_err!(
            DimensionMismatch,
            "operands carry {} and {} towers",
            a.num_towers(),
            b.num_towers()
        ));
    }
    Ok(())
}

/// Elementwise add/sub; extra elements of `b` are appended
fn add_core_in_place(a: &mut Ciphertext, b: &Ciphertext, op: AddOp) -> Result<()> {
    verify_num_towers(a, b)?;
    let common = a.len().min(b.len());
    for (x, y) in a.elements.iter_mut().zip(&b.elements[..common]) {
        match op {
            AddOp::Add => x.plus_assign(y)?,
            AddOp::Sub => x.minus_assign(y)?,
        }
    }
    for extra in &b.elements[common..] {
        a.elements.push(match op {
            AddOp::Add => extra.clone(),
            AddOp::Sub => -extra,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModckksError;
    use crate::params::{CkksModConfig, SchemeKind};
    use crate::scheme::KeyPair;

    const X1: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 2.0, 3.0, 4.0, 5.0];
    const X2: [f64; 8] = [5.0, 4.0, 3.0, 2.0, 1.0, 0.75, 0.5, 0.25];

    fn make_context(technique: ScalingTechnique, rank: usize) -> ModuleCkks {
        let mut cc = ModuleCkks::new(CkksModConfig {
            ring_dim: 256,
            mult_depth: 3,
            scheme: if rank == 1 {
                SchemeKind::Standard
            } else {
                SchemeKind::Module { rank }
            },
            scaling_technique: technique,
            seed: Some(2024),
            ..CkksModConfig::default()
        })
        .unwrap();
        for feature in [Feature::Pke, Feature::KeySwitch, Feature::LeveledShe] {
            cc.enable(feature).unwrap();
        }
        cc
    }

    fn encrypt(cc: &mut ModuleCkks, keys: &KeyPair, values: &[f64]) -> Ciphertext {
        let pt = cc.make_ckks_packed_plaintext(values).unwrap();
        cc.encrypt(&keys.public_key, &pt).unwrap()
    }

    fn assert_decrypts(cc: &ModuleCkks, keys: &KeyPair, ct: &Ciphertext, want: &[f64], tol: f64) {
        let out = cc.decrypt(&keys.secret_key, ct).unwrap();
        for (i, (g, w)) in out.values.iter().zip(want).enumerate() {
            assert!((g - w).abs() < tol, "slot {}: {} vs {}", i, g, w);
        }
    }

    fn elementwise(f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        X1.iter().zip(&X2).map(|(a, b)| f(*a, *b)).collect()
    }

    #[test]
    fn test_add_sub_negate() {
        for technique in [
            ScalingTechnique::FixedManual,
            ScalingTechnique::FixedAuto,
            ScalingTechnique::FlexibleAuto,
            ScalingTechnique::FlexibleAutoExt,
            ScalingTechnique::NoRescale,
        ] {
            let mut cc = make_context(technique, 2);
            let keys = cc.key_gen().unwrap();
            let c1 = encrypt(&mut cc, &keys, &X1);
            let c2 = encrypt(&mut cc, &keys, &X2);

            let sum = cc.eval_add(&c1, &c2).unwrap();
            assert_decrypts(&cc, &keys, &sum, &elementwise(|a, b| a + b), 1e-7);
            let diff = cc.eval_sub(&c1, &c2).unwrap();
            assert_decrypts(&cc, &keys, &diff, &elementwise(|a, b| a - b), 1e-7);
            let neg = cc.eval_negate(&c1).unwrap();
            let want: Vec<f64> = X1.iter().map(|x| -x).collect();
            assert_decrypts(&cc, &keys, &neg, &want, 1e-7);
        }
    }

    #[test]
    fn test_plaintext_operands() {
        for technique in [ScalingTechnique::FlexibleAuto, ScalingTechnique::FlexibleAutoExt] {
            let mut cc = make_context(technique, 2);
            let keys = cc.key_gen().unwrap();
            let c1 = encrypt(&mut cc, &keys, &X1);
            let p2 = cc.make_ckks_packed_plaintext(&X2).unwrap();

            let sum = cc.eval_add_plaintext(&c1, &p2).unwrap();
            assert_decrypts(&cc, &keys, &sum, &elementwise(|a, b| a + b), 1e-6);
            let diff = cc.eval_sub_plaintext(&c1, &p2).unwrap();
            assert_decrypts(&cc, &keys, &diff, &elementwise(|a, b| a - b), 1e-6);
        }
    }

    #[test]
    fn test_mult_and_relinearize() {
        for technique in [
            ScalingTechnique::FixedAuto,
            ScalingTechnique::FlexibleAuto,
            ScalingTechnique::FlexibleAutoExt,
        ] {
            for rank in [1, 2, 3] {
                let mut cc = make_context(technique, rank);
                let keys = cc.key_gen().unwrap();
                let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();
                assert_eq!(mult_keys.cross().is_some(), rank > 1);

                let c1 = encrypt(&mut cc, &keys, &X1);
                let c2 = encrypt(&mut cc, &keys, &X2);
                let raw = cc.eval_mult(&c1, &c2).unwrap();
                assert_eq!(raw.len(), if rank > 1 { 4 } else { 3 });
                assert_eq!(raw.noise_scale_deg(), 2);

                let prod = cc.relinearize(&raw, &mult_keys).unwrap();
                assert_eq!(prod.len(), 2);
                assert_decrypts(&cc, &keys, &prod, &elementwise(|a, b| a * b), 1e-4);
            }
        }
    }

    #[test]
    fn test_mixed_level_operands_are_reconciled() {
        let mut cc = make_context(ScalingTechnique::FlexibleAuto, 2);
        let keys = cc.key_gen().unwrap();
        let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();
        let c1 = encrypt(&mut cc, &keys, &X1);
        let c2 = encrypt(&mut cc, &keys, &X2);

        // depth 2 at level 0
        let prod = cc.eval_mult_and_relinearize(&c1, &c2, &mult_keys).unwrap();
        let sum = cc.eval_add(&prod, &c1).unwrap();
        assert_decrypts(&cc, &keys, &sum, &elementwise(|a, b| a * b + a), 1e-4);

        // rescaled to level 1, then multiplied by a fresh level 0 operand
        let cube = cc.eval_mult_and_relinearize(&prod, &c1, &mult_keys).unwrap();
        assert!(cube.level() >= 1);
        assert_decrypts(&cc, &keys, &cube, &elementwise(|a, b| a * b * a), 1e-3);

        let mixed = cc.eval_add(&c2, &cube).unwrap();
        assert_decrypts(&cc, &keys, &mixed, &elementwise(|a, b| a * b * a + b), 1e-3);
    }

    #[test]
    fn test_mult_scalar() {
        for technique in [ScalingTechnique::FlexibleAuto, ScalingTechnique::FixedManual] {
            let mut cc = make_context(technique, 2);
            let keys = cc.key_gen().unwrap();
            let c1 = encrypt(&mut cc, &keys, &X1);
            let scaled = cc.eval_mult_scalar(&c1, -1.25).unwrap();
            assert_eq!(scaled.noise_scale_deg(), c1.noise_scale_deg() + 1);
            let want: Vec<f64> = X1.iter().map(|x| x * -1.25).collect();
            assert_decrypts(&cc, &keys, &scaled, &want, 1e-5);
        }
    }

    #[test]
    fn test_fixed_manual_requires_mod_reduce() {
        let mut cc = make_context(ScalingTechnique::FixedManual, 2);
        let keys = cc.key_gen().unwrap();
        let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();
        let c1 = encrypt(&mut cc, &keys, &X1);
        let c2 = encrypt(&mut cc, &keys, &X2);

        let prod = cc.eval_mult_and_relinearize(&c1, &c2, &mult_keys).unwrap();
        assert!(matches!(cc.eval_add(&prod, &c1), Err(ModckksError::DepthMismatch(_))));

        let rescaled = cc.mod_reduce(&prod, 1).unwrap();
        assert_eq!(rescaled.level(), 1);
        let sum = cc.eval_add(&rescaled, &c1).unwrap();
        assert_decrypts(&cc, &keys, &sum, &elementwise(|a, b| a * b + a), 1e-4);

        // a depth-1 plaintext is lifted to the product's depth
        let p1 = cc.make_ckks_packed_plaintext(&X1).unwrap();
        let with_pt = cc.eval_add_plaintext(&prod, &p1).unwrap();
        assert_decrypts(&cc, &keys, &with_pt, &elementwise(|a, b| a * b + a), 1e-4);
    }

    #[test]
    fn test_mod_reduce_is_noop_in_auto_modes() {
        let mut cc = make_context(ScalingTechnique::FlexibleAuto, 2);
        let keys = cc.key_gen().unwrap();
        let c1 = encrypt(&mut cc, &keys, &X1);
        let same = cc.mod_reduce(&c1, 1).unwrap();
        assert_eq!(same, c1);
        assert!(matches!(
            cc.level_reduce(&c1, 1),
            Err(ModckksError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_mod_reduce_towers_monotone() {
        let mut cc = make_context(ScalingTechnique::FixedManual, 2);
        let keys = cc.key_gen().unwrap();
        let c1 = encrypt(&mut cc, &keys, &X1);
        let mut ct = cc.eval_mult_scalar(&c1, 1.0).unwrap();
        let before = ct.num_towers();
        cc.mod_reduce_internal_in_place(&mut ct, 1).unwrap();
        assert_eq!(ct.num_towers(), before - 1);
        assert_eq!(ct.level(), 1);
        assert_eq!(ct.noise_scale_deg(), 1);
        assert!(ct.elements().iter().all(|e| e.num_towers() == before - 1));

        // too many towers: rejected without touching the ciphertext
        let snapshot = ct.clone();
        let towers = ct.num_towers();
        let err = cc.mod_reduce_internal_in_place(&mut ct, towers);
        assert!(matches!(err, Err(ModckksError::DimensionMismatch(_))));
        assert_eq!(ct, snapshot);
    }

    #[test]
    fn test_level_reduce_fixed() {
        let mut cc = make_context(ScalingTechnique::FixedAuto, 2);
        let keys = cc.key_gen().unwrap();
        let c1 = encrypt(&mut cc, &keys, &X1);
        let lowered = cc.level_reduce(&c1, 2).unwrap();
        assert_eq!(lowered.level(), 2);
        assert_eq!(lowered.num_towers(), c1.num_towers() - 2);
        assert_decrypts(&cc, &keys, &lowered, &X1, 1e-6);
    }

    #[test]
    fn test_mult_core_rejects_unequal_towers() {
        let mut cc = make_context(ScalingTechnique::FixedAuto, 2);
        let keys = cc.key_gen().unwrap();
        let c1 = encrypt(&mut cc, &keys, &X1);
        let c2 = cc.level_reduce(&c1, 1).unwrap();
        assert!(matches!(
            cc.eval_mult_core(&c1, &c2),
            Err(ModckksError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_relinearize_needs_cross_key() {
        let mut cc = make_context(ScalingTechnique::FlexibleAuto, 2);
        let keys = cc.key_gen().unwrap();
        let mut mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();
        mult_keys.cross = None;
        let c1 = encrypt(&mut cc, &keys, &X1);
        let raw = cc.eval_mult(&c1, &c1).unwrap();
        assert!(matches!(
            cc.relinearize(&raw, &mult_keys),
            Err(ModckksError::MissingKey(_))
        ));
    }

    #[test]
    fn test_rank_reduce() {
        let mut cc = make_context(ScalingTechnique::FlexibleAuto, 3);
        let keys = cc.key_gen().unwrap();
        let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();
        let (reduced_sk, red_key) = cc.eval_rank_red_key_gen(&keys.secret_key, 1).unwrap();
        assert_eq!(reduced_sk.rank(), 1);
        assert_eq!(red_key.new_rank(), 1);

        let c1 = encrypt(&mut cc, &keys, &X1);
        let c2 = encrypt(&mut cc, &keys, &X2);
        let prod = cc.eval_mult_and_relinearize(&c1, &c2, &mult_keys).unwrap();
        let reduced = cc.eval_rank_reduce(&prod, &red_key).unwrap();
        assert_eq!(reduced.rank(), 1);

        let out = cc.decrypt(&reduced_sk, &reduced).unwrap();
        for (g, w) in out.values.iter().zip(elementwise(|a, b| a * b)) {
            assert!((g - w).abs() < 1e-4, "{} vs {}", g, w);
        }

        assert!(matches!(
            cc.eval_rank_red_key_gen(&keys.secret_key, 3),
            Err(ModckksError::InvalidParameters(_))
        ));
        assert!(matches!(
            cc.eval_rank_reduce(&reduced, &red_key),
            Err(ModckksError::DimensionMismatch(_))
        ));
    }
}
