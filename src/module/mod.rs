//! Module elements: matrices of double-CRT ring elements
//!
//! A [`ModuleElement`] is the algebraic carrier of module CKKS. Secrets are
//! `r×1` columns, ciphertext masks are `1×r` rows and key-switching keys are
//! `r_old × r_new` matrices, all over one shared CRT basis.

mod arith;
mod element;
mod towers;

pub use element::ModuleElement;
