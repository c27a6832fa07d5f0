//! Hybrid key switching over module elements
//!
//! A key-switching key turns a ciphertext component valid under a secret
//! `s_old` (`r_old × 1`) into one valid under `s_new` (`r_new × 1`). It is
//! used for relinearization (`s⊙s → s`, `ltp(s, s) → s`) and for rank
//! reduction (`s_removed → s_reduced`).
//!
//! # Algorithm
//!
//! To switch a row vector `c` (`1 × r_old`) at `size_ql` towers:
//! 1. Split `c` into digits of `alpha` towers each
//! 2. Extend every digit to `Q_l ∪ P` with fast base conversion
//! 3. Accumulate `Σ digit·b` and `Σ digit·A` over `Q_l ∪ P`
//! 4. Divide both accumulators by `P` (approximate mod-down)
//!
//! The result `(ab0, ab1)` satisfies `ab0 + ab1·s_new ≈ c·s_old`.
//!
//! # Example
//!
//! ```ignore
//! use modckks::ks::{key_switch_core, key_switch_gen};
//!
//! let key = key_switch_gen(&params, &s_old, &s_new, &mut src)?;
//! let (ab0, ab1) = key_switch_core(&params, &c, &key)?;
//! ```

mod setup;
mod switch;

pub use setup::{key_switch_gen, key_switch_gen_with_a, EvalKey};
pub use switch::{fast_key_switch_core_ext, key_switch_core, key_switch_in_place, precompute_digits};
