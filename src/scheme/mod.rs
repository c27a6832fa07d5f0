//! Leveled module CKKS
//!
//! [`ModuleCkks`] is the scheme object: it owns the crypto parameters, the
//! encoder and the random stream, and exposes key generation, encryption and
//! the leveled homomorphic operations.
//!
//! # Lifecycle of a ciphertext
//!
//! 1. **Encode**: values are packed at scale `sf[level]` (or `sf_big[0]`
//!    under `FlexibleAutoExt`)
//! 2. **Encrypt**: `(c0, c1) = (v·b + e0 + m, v·A + e1)` under the public key
//! 3. **Evaluate**: additions reconcile level, depth and scale first;
//!    multiplication expands to up to four elements
//! 4. **Relinearize / rank-reduce**: key switching folds the quadratic terms
//!    back into `(c0, c1)`, or moves a ciphertext to a smaller module rank
//! 5. **Decrypt**: `c0 + c1·s` on the remaining towers, then decode
//!
//! # Example
//!
//! ```ignore
//! use modckks::params::CkksModConfig;
//! use modckks::scheme::{Feature, ModuleCkks};
//!
//! let mut cc = ModuleCkks::new(CkksModConfig::demo())?;
//! cc.enable(Feature::Pke)?;
//! cc.enable(Feature::KeySwitch)?;
//! cc.enable(Feature::LeveledShe)?;
//!
//! let keys = cc.key_gen()?;
//! let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key)?;
//!
//! let pt = cc.make_ckks_packed_plaintext(&[0.5, 1.0, 2.0])?;
//! let ct = cc.encrypt(&keys.public_key, &pt)?;
//! let sq = cc.eval_mult_and_relinearize(&ct, &ct, &mult_keys)?;
//! let out = cc.decrypt(&keys.secret_key, &sq)?;
//! ```

mod adjust;
mod ciphertext;
mod crypto_params;
mod keys;
mod leveled;
mod pke;
mod scalar;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

pub use adjust::{plan_levels_and_depth, AdjustAction, AdjustPlan, Operand, OperandState, ScalingTable};
pub use ciphertext::{Ciphertext, DecodedValues, Plaintext};
pub use crypto_params::{CryptoParameters, DigitConversion};
pub use keys::{EvalMultKeys, KeyPair, PrivateKey, PublicKey, RankReductionKey};
pub use scalar::{strategy, Native64, ScalarToCrt, Wide128};

use crate::encoding::CkksEncoder;
use crate::error::{modckks_err, Result};
use crate::math::RandomSource;
use crate::params::CkksModConfig;

/// Capability groups of a crypto context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Pke,
    KeySwitch,
    LeveledShe,
    Multiparty,
    Fhe,
    Pre,
    AdvancedShe,
    SchemeSwitch,
}

impl Feature {
    /// Features this scheme implements
    pub fn is_supported(&self) -> bool {
        matches!(self, Feature::Pke | Feature::KeySwitch | Feature::LeveledShe)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::Pke => "PKE",
            Feature::KeySwitch => "KEYSWITCH",
            Feature::LeveledShe => "LEVELEDSHE",
            Feature::Multiparty => "MULTIPARTY",
            Feature::Fhe => "FHE",
            Feature::Pre => "PRE",
            Feature::AdvancedShe => "ADVANCEDSHE",
            Feature::SchemeSwitch => "SCHEMESWITCH",
        };
        f.write_str(name)
    }
}

/// Module CKKS crypto context
pub struct ModuleCkks {
    params: Arc<CryptoParameters>,
    encoder: CkksEncoder,
    enabled: HashSet<Feature>,
    src: RandomSource,
}

impl ModuleCkks {
    /// Build the moduli chain and tables for `config`
    pub fn new(config: CkksModConfig) -> Result<Self> {
        let src = match config.seed {
            Some(seed) => RandomSource::with_seed(config.sigma, seed),
            None => RandomSource::new(config.sigma),
        };
        let encoder = CkksEncoder::new(config.ring_dim, config.slots())?;
        let params = Arc::new(CryptoParameters::new(config)?);
        debug!(
            rank = params.rank(),
            ring_dim = params.ring_dim(),
            size_q = params.size_q(),
            technique = %params.scaling_technique(),
            "module CKKS context ready"
        );
        Ok(Self {
            params,
            encoder,
            enabled: HashSet::new(),
            src,
        })
    }

    pub fn params(&self) -> &Arc<CryptoParameters> {
        &self.params
    }

    pub fn encoder(&self) -> &CkksEncoder {
        &self.encoder
    }

    pub fn rank(&self) -> usize {
        self.params.rank()
    }

    pub fn enable(&mut self, feature: Feature) -> Result<()> {
        if !feature.is_supported() {
            return Err(modckks_err!(
                UnsupportedOperation,
                "This feature [{}] is not supported for CKKSMod scheme",
                feature
            ));
        }
        self.enabled.insert(feature);
        Ok(())
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.enabled.contains(&feature)
    }

    pub(crate) fn require(&self, feature: Feature, op: &str) -> Result<()> {
        if self.is_enabled(feature) {
            Ok(())
        } else {
            Err(modckks_err!(
                FeatureNotEnabled,
                "{} requires feature {} to be enabled",
                op,
                feature
            ))
        }
    }

    /// Encode values for encryption
    ///
    /// Under `FlexibleAutoExt` the plaintext sits at level 0 with depth 2 and
    /// scale `sf_big[0]`; otherwise at level 0 with depth 1.
    pub fn make_ckks_packed_plaintext(&self, values: &[f64]) -> Result<Plaintext> {
        let depth = if self.params.scaling_technique().is_ext() { 2 } else { 1 };
        self.encoder.encode(&self.params, values, 0, depth)
    }

    /// Encode values directly at `level` and `depth`
    pub fn make_ckks_packed_plaintext_at(&self, values: &[f64], level: usize, depth: usize) -> Result<Plaintext> {
        self.encoder.encode(&self.params, values, level, depth)
    }

    pub fn decode(&self, plaintext: &Plaintext) -> Result<DecodedValues> {
        self.encoder.decode(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModckksError;
    use crate::params::SchemeKind;

    fn test_config() -> CkksModConfig {
        CkksModConfig {
            ring_dim: 64,
            scheme: SchemeKind::Module { rank: 2 },
            seed: Some(7),
            ..CkksModConfig::default()
        }
    }

    #[test]
    fn test_unsupported_features_rejected() {
        let mut cc = ModuleCkks::new(test_config()).unwrap();
        for feature in [
            Feature::Multiparty,
            Feature::Fhe,
            Feature::Pre,
            Feature::AdvancedShe,
            Feature::SchemeSwitch,
        ] {
            match cc.enable(feature) {
                Err(ModckksError::UnsupportedOperation(msg)) => {
                    assert!(msg.contains(&format!("[{}]", feature)), "{}", msg);
                    assert!(msg.contains("CKKSMod"));
                }
                other => panic!("{} accepted: {:?}", feature, other.err()),
            }
        }
        assert!(cc.enable(Feature::Pke).is_ok());
        assert!(cc.is_enabled(Feature::Pke));
        assert!(!cc.is_enabled(Feature::LeveledShe));
    }

    #[test]
    fn test_guarded_operation_needs_feature() {
        let mut cc = ModuleCkks::new(test_config()).unwrap();
        assert!(matches!(cc.key_gen(), Err(ModckksError::FeatureNotEnabled(_))));
        cc.enable(Feature::Pke).unwrap();
        let keys = cc.key_gen().unwrap();
        assert_eq!(keys.secret_key.rank(), 2);
        assert!(matches!(
            cc.eval_mult_mod_key_gen(&keys.secret_key),
            Err(ModckksError::FeatureNotEnabled(_))
        ));
    }

    #[test]
    fn test_ext_plaintext_is_encoded_at_depth_two() {
        let config = CkksModConfig {
            scaling_technique: crate::params::ScalingTechnique::FlexibleAutoExt,
            ..test_config()
        };
        let cc = ModuleCkks::new(config).unwrap();
        let pt = cc.make_ckks_packed_plaintext(&[1.0, 2.0]).unwrap();
        assert_eq!(pt.level(), 0);
        assert_eq!(pt.noise_scale_deg(), 2);
        assert_eq!(pt.scaling_factor(), cc.params().scaling_factor_real_big(0));
    }
}
