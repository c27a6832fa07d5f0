//! modckks: module-lattice CKKS
//!
//! A leveled homomorphic encryption scheme for vectors of real numbers over
//! rank-`r` modules of double-CRT ring elements (a module-LWE generalization
//! of CKKS).
//!
//! Key components:
//! - Module algebra: matrices of ring elements with matrix, Hadamard and
//!   lower-triangle products, tower drops and basis extension
//! - Hybrid key switching for matrix-valued keys (relinearization and rank
//!   reduction)
//! - The leveled scheme: encryption, add/sub/mult with automatic level, depth
//!   and scale reconciliation, rescaling and rank reduction

pub mod encoding;
pub mod error;
pub mod ks;
pub mod math;
pub mod module;
pub mod params;
pub mod scheme;

pub use encoding::CkksEncoder;
pub use error::{ModckksError, Result};
pub use module::ModuleElement;
pub use params::{CkksModConfig, ScalarEncoding, ScalingTechnique, SchemeKind, SecretKeyDist};
pub use scheme::{
    Ciphertext, CryptoParameters, DecodedValues, EvalMultKeys, Feature, KeyPair, ModuleCkks, Plaintext, PrivateKey,
    PublicKey, RankReductionKey,
};
