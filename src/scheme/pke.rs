//! Key generation, encryption and decryption

use tracing::debug;

use super::{Ciphertext, DecodedValues, Feature, KeyPair, ModuleCkks, Plaintext, PrivateKey, PublicKey};
use crate::error::{modckks_err, Result};
use crate::ks::{self, EvalKey};
use crate::math::Format;
use crate::module::ModuleElement;
use crate::params::{SecretKeyDist, SPARSE_HAMMING_WEIGHT};

impl ModuleCkks {
    /// Sample `s` (`r × 1`) and the public key `(b, A)` with `b = e − A·s`
    pub fn key_gen(&mut self) -> Result<KeyPair> {
        self.require(Feature::Pke, "key_gen")?;
        let rank = self.rank();
        let params_q = self.params.element_params();
        let src = &mut self.src;

        let s = match self.params.config().secret_key_dist {
            SecretKeyDist::Gaussian => ModuleElement::gaussian(params_q, Format::Evaluation, rank, 1, src)?,
            SecretKeyDist::UniformTernary => {
                ModuleElement::ternary(params_q, Format::Evaluation, rank, 1, src, None)?
            }
            SecretKeyDist::SparseTernary => ModuleElement::ternary(
                params_q,
                Format::Evaluation,
                rank,
                1,
                src,
                Some(SPARSE_HAMMING_WEIGHT),
            )?,
        };
        let a = ModuleElement::uniform(params_q, Format::Evaluation, rank, rank, src)?;
        let e = ModuleElement::gaussian(params_q, Format::Evaluation, rank, 1, src)?;
        let b = e.minus(&a.times(&s)?)?;
        debug!(rank, towers = s.num_towers(), "generated key pair");

        Ok(KeyPair {
            public_key: PublicKey { b, a },
            secret_key: PrivateKey { s },
        })
    }

    /// Encrypt under the public key on the plaintext's towers
    ///
    /// Under `FlexibleAutoExt` the depth-2 encoding is rescaled once, so the
    /// ciphertext leaves at level 1 with scale `sf[1]`.
    pub fn encrypt(&mut self, public_key: &PublicKey, plaintext: &Plaintext) -> Result<Ciphertext> {
        self.require(Feature::Pke, "encrypt")?;
        let rank = self.rank();
        if public_key.rank() != rank {
            return Err(modckks_err!(
                DimensionMismatch,
                "public key of rank {} in a rank {} context",
                public_key.rank(),
                rank
            ));
        }
        let params_ql = plaintext.element.params();
        let size_q = self.params.size_q();
        let size_ql = params_ql.len();
        let src = &mut self.src;

        let v = match self.params.config().secret_key_dist {
            SecretKeyDist::Gaussian => ModuleElement::gaussian(params_ql, Format::Evaluation, 1, rank, src)?,
            _ => ModuleElement::ternary(params_ql, Format::Evaluation, 1, rank, src, None)?,
        };
        let e0 = ModuleElement::gaussian(params_ql, Format::Evaluation, 1, 1, src)?;
        let e1 = ModuleElement::gaussian(params_ql, Format::Evaluation, 1, rank, src)?;

        let (mut c0, mut c1) = if size_ql == size_q {
            (v.times(&public_key.b)?, v.times(&public_key.a)?)
        } else {
            let mut b = public_key.b.clone();
            let mut a = public_key.a.clone();
            b.drop_last_elements(size_q - size_ql)?;
            a.drop_last_elements(size_q - size_ql)?;
            (v.times(&b)?, v.times(&a)?)
        };
        c0.plus_assign(&e0)?;
        c1.plus_assign(&e1)?;

        let mut m = plaintext.element.clone();
        m.set_format(Format::Evaluation);
        c0.plus_assign(&ModuleElement::from_poly(m))?;

        let mut ct = Ciphertext {
            elements: vec![c0, c1],
            level: plaintext.level,
            noise_scale_deg: plaintext.noise_scale_deg,
            scaling_factor: plaintext.scaling_factor,
            slots: plaintext.slots,
        };
        if self.params.scaling_technique().is_ext() && ct.noise_scale_deg == 2 {
            self.mod_reduce_internal_in_place(&mut ct, 1)?;
        }
        Ok(ct)
    }

    /// Secret-key encryption is not available for modules.
    pub fn encrypt_with_private_key(&mut self, _private_key: &PrivateKey, _plaintext: &Plaintext) -> Result<Ciphertext> {
        Err(modckks_err!(UnsupportedOperation, "Encrypt not supported for modules"))
    }

    /// `c0 + c1·s` on the ciphertext's towers, decoded
    pub fn decrypt(&self, private_key: &PrivateKey, ct: &Ciphertext) -> Result<DecodedValues> {
        self.require(Feature::Pke, "decrypt")?;
        let (c0, c1) = ct.c0_c1("decrypt")?;
        let size_ql = c0.num_towers();
        if size_ql == 0 {
            return Err(modckks_err!(
                PrecisionExhausted,
                "Decryption failure: No towers left; consider increasing the depth"
            ));
        }

        let mut s = private_key.s.clone();
        let diff = s.num_towers().saturating_sub(size_ql);
        if diff > 0 {
            s.drop_last_elements(diff)?;
        }
        let b = c0.plus(&c1.times(&s)?)?;
        let element = b.into_entries().swap_remove(0);

        self.encoder.decode(&Plaintext {
            element,
            level: ct.level,
            noise_scale_deg: ct.noise_scale_deg,
            scaling_factor: ct.scaling_factor,
            slots: ct.slots,
        })
    }

    /// Key switching `old → new`
    pub fn key_switch_gen(&mut self, old: &PrivateKey, new: &PrivateKey) -> Result<EvalKey> {
        self.require(Feature::KeySwitch, "key_switch_gen")?;
        ks::key_switch_gen(&self.params, &old.s, &new.s, &mut self.src)
    }

    pub fn key_switch_in_place(&self, ct: &mut Ciphertext, key: &EvalKey) -> Result<()> {
        self.require(Feature::KeySwitch, "key_switch_in_place")?;
        ks::key_switch_in_place(&self.params, ct, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModckksError;
    use crate::params::{CkksModConfig, ScalingTechnique, SchemeKind};

    fn make_context(technique: ScalingTechnique, dist: SecretKeyDist) -> ModuleCkks {
        let mut cc = ModuleCkks::new(CkksModConfig {
            ring_dim: 256,
            mult_depth: 2,
            scheme: SchemeKind::Module { rank: 2 },
            scaling_technique: technique,
            secret_key_dist: dist,
            seed: Some(11),
            ..CkksModConfig::default()
        })
        .unwrap();
        cc.enable(Feature::Pke).unwrap();
        cc.enable(Feature::KeySwitch).unwrap();
        cc
    }

    fn assert_close(got: &[f64], want: &[f64], tol: f64) {
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < tol, "{} vs {}", g, w);
        }
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let values = [0.25, 0.5, 0.75, 1.0, 2.0, 3.0, 4.0, 5.0];
        for technique in [
            ScalingTechnique::FixedManual,
            ScalingTechnique::FlexibleAuto,
            ScalingTechnique::FlexibleAutoExt,
        ] {
            let mut cc = make_context(technique, SecretKeyDist::UniformTernary);
            let keys = cc.key_gen().unwrap();
            let pt = cc.make_ckks_packed_plaintext(&values).unwrap();
            let ct = cc.encrypt(&keys.public_key, &pt).unwrap();
            assert_eq!(ct.level(), cc.params().fresh_level(), "{}", technique);
            assert_eq!(ct.noise_scale_deg(), 1);
            assert_eq!(ct.rank(), 2);
            let out = cc.decrypt(&keys.secret_key, &ct).unwrap();
            assert_close(&out.values, &values, 1e-6);
        }
    }

    #[test]
    fn test_secret_distributions() {
        for dist in [SecretKeyDist::Gaussian, SecretKeyDist::SparseTernary] {
            let mut cc = make_context(ScalingTechnique::FlexibleAuto, dist);
            let keys = cc.key_gen().unwrap();
            let pt = cc.make_ckks_packed_plaintext(&[1.5, -2.0]).unwrap();
            let ct = cc.encrypt(&keys.public_key, &pt).unwrap();
            let out = cc.decrypt(&keys.secret_key, &ct).unwrap();
            assert_close(&out.values, &[1.5, -2.0], 1e-5);
        }
    }

    #[test]
    fn test_encrypt_at_lower_level() {
        let mut cc = make_context(ScalingTechnique::FixedAuto, SecretKeyDist::UniformTernary);
        let keys = cc.key_gen().unwrap();
        let pt = cc.make_ckks_packed_plaintext_at(&[3.0, 4.0], 1, 1).unwrap();
        let ct = cc.encrypt(&keys.public_key, &pt).unwrap();
        assert_eq!(ct.num_towers(), cc.params().size_q() - 1);
        let out = cc.decrypt(&keys.secret_key, &ct).unwrap();
        assert_close(&out.values, &[3.0, 4.0], 1e-6);
    }

    #[test]
    fn test_private_key_encryption_unsupported() {
        let mut cc = make_context(ScalingTechnique::FlexibleAuto, SecretKeyDist::UniformTernary);
        let keys = cc.key_gen().unwrap();
        let pt = cc.make_ckks_packed_plaintext(&[1.0]).unwrap();
        assert!(matches!(
            cc.encrypt_with_private_key(&keys.secret_key, &pt),
            Err(ModckksError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_key_switch_moves_ciphertext_to_new_secret() {
        let mut cc = make_context(ScalingTechnique::FlexibleAuto, SecretKeyDist::UniformTernary);
        let old = cc.key_gen().unwrap();
        let new = cc.key_gen().unwrap();
        let key = cc.key_switch_gen(&old.secret_key, &new.secret_key).unwrap();

        let pt = cc.make_ckks_packed_plaintext(&[0.5, 1.5]).unwrap();
        let mut ct = cc.encrypt(&old.public_key, &pt).unwrap();
        cc.key_switch_in_place(&mut ct, &key).unwrap();
        assert_eq!(ct.len(), 2);
        let out = cc.decrypt(&new.secret_key, &ct).unwrap();
        assert_close(&out.values, &[0.5, 1.5], 1e-5);
    }

    #[test]
    fn test_decrypt_rejects_expanded_ciphertext() {
        let mut cc = make_context(ScalingTechnique::FlexibleAuto, SecretKeyDist::UniformTernary);
        let keys = cc.key_gen().unwrap();
        let pt = cc.make_ckks_packed_plaintext(&[1.0]).unwrap();
        let mut ct = cc.encrypt(&keys.public_key, &pt).unwrap();
        ct.elements.push(ct.elements[1].clone());
        assert!(matches!(
            cc.decrypt(&keys.secret_key, &ct),
            Err(ModckksError::DimensionMismatch(_))
        ));
    }
}
