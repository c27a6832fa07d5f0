//! Mathematical primitives for module CKKS.
//!
//! - **Modular arithmetic** and NTT-friendly prime search
//! - **Number-Theoretic Transform (NTT)** with Montgomery twiddles
//! - **Single-tower polynomials** over R_q = Z_q[X]/(X^n + 1)
//! - **Double-CRT ring elements** and RNS basis conversion
//! - **Sampling**: discrete Gaussian, ternary, sparse ternary, uniform
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use modckks::math::{CrtParams, DcrtPoly, Format};
//!
//! let q = modckks::math::primes::first_prime(50, 512).unwrap();
//! let params = Arc::new(CrtParams::new(256, &[q]).unwrap());
//! let mut x = DcrtPoly::from_signed(&params, &[1, 2, 3], Format::Coefficient);
//! x.switch_format();
//! let y = x.times(&x).unwrap();
//! assert_eq!(y.format(), Format::Evaluation);
//! ```

pub mod crt;
pub mod dcrt;
pub mod gaussian;
pub mod modular;
pub mod ntt;
pub mod poly;
pub mod primes;
pub mod ring;
pub mod rns;
pub mod sampling;

pub use crt::{mod_inverse, CrtReconstructor};
pub use dcrt::{CrtParams, DcrtPoly, Format, TowerParams};
pub use gaussian::{GaussianSampler, DEFAULT_SIGMA};
pub use modular::ModQ;
pub use ntt::NttContext;
pub use poly::Poly;
pub use ring::RingElement;
pub use rns::{BasisConversion, ModDownTables};
pub use sampling::RandomSource;
