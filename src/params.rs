//! Parameter sets for module CKKS
//!
//! [`CkksModConfig`] is the user-facing description of a context: ring
//! dimension, multiplicative depth, prime sizes, module rank and the
//! rescaling policy. The moduli chain and all CRT tables derived from it live
//! in [`CryptoParameters`](crate::scheme::CryptoParameters).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{modckks_err, ModckksError, Result};
use crate::math::DEFAULT_SIGMA;

/// Nonzero coefficients of a sparse ternary secret.
pub const SPARSE_HAMMING_WEIGHT: usize = 192;

/// Prime sizes outside this range are rejected.
pub const MIN_MOD_SIZE: u32 = 14;
pub const MAX_MOD_SIZE: u32 = 60;

/// Scheme variant, fixed at context construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemeKind {
    /// Plain ring CKKS, i.e. module rank 1
    Standard,
    /// Module-LWE CKKS over rank-`rank` modules
    Module { rank: usize },
}

impl SchemeKind {
    pub fn rank(&self) -> usize {
        match *self {
            SchemeKind::Standard => 1,
            SchemeKind::Module { rank } => rank,
        }
    }
}

impl Default for SchemeKind {
    fn default() -> Self {
        SchemeKind::Module { rank: 2 }
    }
}

/// Rescaling policy
///
/// - `FixedManual`: the caller rescales with `mod_reduce`
/// - `FixedAuto`: automatic rescaling, all scaling factors `2^scaling_mod_size`
/// - `FlexibleAuto`: automatic rescaling with per-level scaling factors
///   tracking the actual primes
/// - `FlexibleAutoExt`: as `FlexibleAuto`, with one extra prime so fresh
///   ciphertexts are encoded at a larger scale
/// - `NoRescale`: scales are never reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalingTechnique {
    FixedManual,
    FixedAuto,
    FlexibleAuto,
    #[default]
    FlexibleAutoExt,
    NoRescale,
}

impl ScalingTechnique {
    pub fn is_flexible(&self) -> bool {
        matches!(self, ScalingTechnique::FlexibleAuto | ScalingTechnique::FlexibleAutoExt)
    }

    pub fn is_ext(&self) -> bool {
        *self == ScalingTechnique::FlexibleAutoExt
    }
}

impl fmt::Display for ScalingTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalingTechnique::FixedManual => "fixed-manual",
            ScalingTechnique::FixedAuto => "fixed-auto",
            ScalingTechnique::FlexibleAuto => "flexible-auto",
            ScalingTechnique::FlexibleAutoExt => "flexible-auto-ext",
            ScalingTechnique::NoRescale => "no-rescale",
        };
        f.write_str(name)
    }
}

impl FromStr for ScalingTechnique {
    type Err = ModckksError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "fixed-manual" | "fixedmanual" => Ok(ScalingTechnique::FixedManual),
            "fixed-auto" | "fixedauto" => Ok(ScalingTechnique::FixedAuto),
            "flexible-auto" | "flexibleauto" => Ok(ScalingTechnique::FlexibleAuto),
            "flexible-auto-ext" | "flexibleautoext" => Ok(ScalingTechnique::FlexibleAutoExt),
            "no-rescale" | "norescale" => Ok(ScalingTechnique::NoRescale),
            other => Err(modckks_err!(InvalidParameters, "unknown scaling technique '{}'", other)),
        }
    }
}

/// Distribution of the secret key coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecretKeyDist {
    Gaussian,
    #[default]
    UniformTernary,
    /// Ternary with [`SPARSE_HAMMING_WEIGHT`] nonzero coefficients
    SparseTernary,
}

/// How a real scalar is turned into per-prime residues for
/// `eval_mult_scalar` and scale adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalarEncoding {
    /// Round `x·Δ` to an integer, splitting off a power of two when it does
    /// not fit 125 bits
    #[default]
    Native64,
    /// Keep the 52-bit mantissa and shift it into a 128-bit integer
    Wide128,
}

/// Configuration of a module CKKS context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CkksModConfig {
    /// Ring dimension N (power of two)
    pub ring_dim: usize,

    /// Number of multiplications supported before decryption fails
    pub mult_depth: usize,

    /// Bit size of the scaling primes
    pub scaling_mod_size: u32,

    /// Bit size of the first prime q0
    pub first_mod_size: u32,

    pub scheme: SchemeKind,

    pub scaling_technique: ScalingTechnique,

    /// Digits used by hybrid key switching; 0 picks a value from the depth
    pub num_large_digits: usize,

    /// Bit size of the auxiliary primes P
    pub aux_mod_size: u32,

    /// Bit size of the extra prime under `FlexibleAutoExt`
    pub extra_mod_size: u32,

    /// Standard deviation of the error distribution
    pub sigma: f64,

    pub secret_key_dist: SecretKeyDist,

    pub scalar_encoding: ScalarEncoding,

    /// Number of slots decoded; 0 means N/2
    pub batch_size: usize,

    /// Seed for a reproducible random stream; `None` draws from the OS
    pub seed: Option<u64>,
}

impl Default for CkksModConfig {
    fn default() -> Self {
        Self {
            ring_dim: 16384,
            mult_depth: 2,
            scaling_mod_size: 50,
            first_mod_size: 60,
            scheme: SchemeKind::default(),
            scaling_technique: ScalingTechnique::default(),
            num_large_digits: 0,
            aux_mod_size: 60,
            extra_mod_size: 20,
            sigma: DEFAULT_SIGMA,
            secret_key_dist: SecretKeyDist::default(),
            scalar_encoding: ScalarEncoding::default(),
            batch_size: 8,
            seed: None,
        }
    }
}

impl CkksModConfig {
    /// Default parameters over modules of the given rank
    pub fn module_rank(rank: usize) -> Self {
        Self {
            scheme: if rank == 1 {
                SchemeKind::Standard
            } else {
                SchemeKind::Module { rank }
            },
            ..Self::default()
        }
    }

    /// Small, fast and insecure parameters for demos and tests
    pub fn demo() -> Self {
        Self {
            ring_dim: 1024,
            scheme: SchemeKind::Module { rank: 4 },
            ..Self::default()
        }
    }

    pub fn rank(&self) -> usize {
        self.scheme.rank()
    }

    /// Slots decoded by default
    pub fn slots(&self) -> usize {
        if self.batch_size == 0 {
            self.ring_dim / 2
        } else {
            self.batch_size
        }
    }

    /// Digit count for hybrid key switching
    pub fn effective_num_large_digits(&self) -> usize {
        if self.num_large_digits > 0 {
            self.num_large_digits
        } else if self.mult_depth > 3 {
            3
        } else if self.mult_depth > 0 {
            2
        } else {
            1
        }
    }

    /// Check if parameters are valid
    pub fn validate(&self) -> Result<()> {
        if !self.ring_dim.is_power_of_two() || self.ring_dim < 8 || self.ring_dim > (1 << 17) {
            return Err(modckks_err!(
                InvalidParameters,
                "ring_dim {} must be a power of two in [8, 2^17]",
                self.ring_dim
            ));
        }
        if self.rank() == 0 {
            return Err(modckks_err!(InvalidParameters, "module rank must be at least 1"));
        }
        for (name, bits) in [
            ("scaling_mod_size", self.scaling_mod_size),
            ("first_mod_size", self.first_mod_size),
            ("aux_mod_size", self.aux_mod_size),
        ] {
            if !(MIN_MOD_SIZE..=MAX_MOD_SIZE).contains(&bits) {
                return Err(modckks_err!(
                    InvalidParameters,
                    "{} = {} outside [{}, {}]",
                    name,
                    bits,
                    MIN_MOD_SIZE,
                    MAX_MOD_SIZE
                ));
            }
        }
        if self.first_mod_size < self.scaling_mod_size {
            return Err(modckks_err!(
                InvalidParameters,
                "first_mod_size {} is smaller than scaling_mod_size {}",
                self.first_mod_size,
                self.scaling_mod_size
            ));
        }
        if self.scaling_technique.is_ext() && !(1..=MAX_MOD_SIZE).contains(&self.extra_mod_size) {
            return Err(modckks_err!(
                InvalidParameters,
                "extra_mod_size {} outside [1, {}]",
                self.extra_mod_size,
                MAX_MOD_SIZE
            ));
        }
        if !(self.sigma > 0.0 && self.sigma.is_finite()) {
            return Err(modckks_err!(InvalidParameters, "sigma must be positive"));
        }
        if self.batch_size > self.ring_dim / 2 {
            return Err(modckks_err!(
                InvalidParameters,
                "batch_size {} exceeds N/2 = {}",
                self.batch_size,
                self.ring_dim / 2
            ));
        }
        if self.batch_size != 0 && !self.batch_size.is_power_of_two() {
            return Err(modckks_err!(
                InvalidParameters,
                "batch_size {} must be a power of two",
                self.batch_size
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON config
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(CkksModConfig::default().validate().is_ok());
        assert!(CkksModConfig::demo().validate().is_ok());
        assert!(CkksModConfig::module_rank(1).validate().is_ok());
    }

    #[test]
    fn test_rank_from_scheme() {
        assert_eq!(CkksModConfig::module_rank(1).scheme, SchemeKind::Standard);
        assert_eq!(CkksModConfig::module_rank(3).rank(), 3);
        assert_eq!(SchemeKind::Standard.rank(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            CkksModConfig { ring_dim: 1000, ..CkksModConfig::demo() },
            CkksModConfig { scheme: SchemeKind::Module { rank: 0 }, ..CkksModConfig::demo() },
            CkksModConfig { scaling_mod_size: 61, ..CkksModConfig::demo() },
            CkksModConfig { first_mod_size: 40, ..CkksModConfig::demo() },
            CkksModConfig { batch_size: 6, ..CkksModConfig::demo() },
            CkksModConfig { sigma: 0.0, ..CkksModConfig::demo() },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(ModckksError::InvalidParameters(_))),
                "{:?} accepted",
                config
            );
        }
    }

    #[test]
    fn test_num_large_digits_default() {
        let mut config = CkksModConfig::demo();
        config.mult_depth = 5;
        assert_eq!(config.effective_num_large_digits(), 3);
        config.mult_depth = 2;
        assert_eq!(config.effective_num_large_digits(), 2);
        config.num_large_digits = 4;
        assert_eq!(config.effective_num_large_digits(), 4);
    }

    #[test]
    fn test_json_partial_config() {
        let config: CkksModConfig =
            serde_json::from_str(r#"{"ring_dim": 2048, "scaling_technique": "FixedManual"}"#).unwrap();
        assert_eq!(config.ring_dim, 2048);
        assert_eq!(config.scaling_technique, ScalingTechnique::FixedManual);
        assert_eq!(config.scaling_mod_size, 50);

        let text = config.to_json_string().unwrap();
        let back: CkksModConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_technique_parsing() {
        for technique in [
            ScalingTechnique::FixedManual,
            ScalingTechnique::FixedAuto,
            ScalingTechnique::FlexibleAuto,
            ScalingTechnique::FlexibleAutoExt,
            ScalingTechnique::NoRescale,
        ] {
            assert_eq!(technique.to_string().parse::<ScalingTechnique>().unwrap(), technique);
        }
        assert_eq!("FLEXIBLE_AUTO".parse::<ScalingTechnique>().unwrap(), ScalingTechnique::FlexibleAuto);
        assert!("fast".parse::<ScalingTechnique>().is_err());
    }
}
