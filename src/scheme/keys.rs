//! Key types

use serde::{Deserialize, Serialize};

use crate::error::{modckks_err, ModckksError, Result};
use crate::ks::EvalKey;
use crate::module::ModuleElement;

/// Secret `s`, an `r × 1` column over the full chain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PrivateKeyRepr")]
pub struct PrivateKey {
    pub(crate) s: ModuleElement,
}

#[derive(Deserialize)]
struct PrivateKeyRepr {
    s: ModuleElement,
}

impl TryFrom<PrivateKeyRepr> for PrivateKey {
    type Error = ModckksError;

    fn try_from(repr: PrivateKeyRepr) -> Result<Self> {
        if repr.s.cols() != 1 {
            return Err(modckks_err!(
                DimensionMismatch,
                "secret must be a column, got {}x{}",
                repr.s.rows(),
                repr.s.cols()
            ));
        }
        Ok(Self { s: repr.s })
    }
}

impl PrivateKey {
    pub fn s(&self) -> &ModuleElement {
        &self.s
    }

    pub fn rank(&self) -> usize {
        self.s.rows()
    }
}

/// Public key `(b, A)` with `b = e − A·s`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyRepr")]
pub struct PublicKey {
    /// `r × 1`
    pub(crate) b: ModuleElement,
    /// `r × r`
    pub(crate) a: ModuleElement,
}

impl PublicKey {
    pub fn b(&self) -> &ModuleElement {
        &self.b
    }

    pub fn a(&self) -> &ModuleElement {
        &self.a
    }

    pub fn rank(&self) -> usize {
        self.a.rows()
    }
}

#[derive(Deserialize)]
struct PublicKeyRepr {
    b: ModuleElement,
    a: ModuleElement,
}

impl TryFrom<PublicKeyRepr> for PublicKey {
    type Error = ModckksError;

    fn try_from(repr: PublicKeyRepr) -> Result<Self> {
        let rank = repr.a.rows();
        if repr.a.cols() != rank || repr.b.shape() != (rank, 1) || **repr.a.params() != **repr.b.params() {
            return Err(modckks_err!(
                DimensionMismatch,
                "public key with A {}x{} and b {}x{}",
                repr.a.rows(),
                repr.a.cols(),
                repr.b.rows(),
                repr.b.cols()
            ));
        }
        Ok(Self { b: repr.b, a: repr.a })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub secret_key: PrivateKey,
}

/// Relinearization keys
///
/// `hadamard` switches `s⊙s → s`; `cross` switches `ltp(s, s) → s` and is
/// absent at rank 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalMultKeys {
    pub(crate) hadamard: EvalKey,
    pub(crate) cross: Option<EvalKey>,
}

impl EvalMultKeys {
    pub fn hadamard(&self) -> &EvalKey {
        &self.hadamard
    }

    pub fn cross(&self) -> Option<&EvalKey> {
        self.cross.as_ref()
    }
}

/// Key switching the dropped rows of `s` onto the kept ones
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RankReductionKeyRepr")]
pub struct RankReductionKey {
    pub(crate) key: EvalKey,
    pub(crate) new_rank: usize,
}

#[derive(Deserialize)]
struct RankReductionKeyRepr {
    key: EvalKey,
    new_rank: usize,
}

impl TryFrom<RankReductionKeyRepr> for RankReductionKey {
    type Error = ModckksError;

    fn try_from(repr: RankReductionKeyRepr) -> Result<Self> {
        if repr.key.rows_new() != repr.new_rank {
            return Err(modckks_err!(
                DimensionMismatch,
                "rank reduction key targets rank {} but is labelled {}",
                repr.key.rows_new(),
                repr.new_rank
            ));
        }
        Ok(Self {
            key: repr.key,
            new_rank: repr.new_rank,
        })
    }
}

impl RankReductionKey {
    pub fn key(&self) -> &EvalKey {
        &self.key
    }

    pub fn new_rank(&self) -> usize {
        self.new_rank
    }
}
