//! NTT-friendly prime search.
//!
//! Every CRT prime used by the scheme satisfies `q ≡ 1 (mod 2N)` so that a
//! primitive 2N-th root of unity exists for the negacyclic NTT.

use super::modular::ModQ;
use crate::error::{modckks_err, Result};

const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Deterministic Miller-Rabin primality test for 64-bit integers.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in MILLER_RABIN_BASES.iter() {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0u32;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in MILLER_RABIN_BASES.iter() {
        let mut x = ModQ::pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = ModQ::mul(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest prime `q > 2^bits` with `q ≡ 1 (mod m)`.
pub fn first_prime(bits: u32, m: u64) -> Result<u64> {
    if bits == 0 || bits > 62 {
        return Err(modckks_err!(
            InvalidParameters,
            "prime size of {} bits is out of range (1..=62)",
            bits
        ));
    }
    let base = 1u64 << bits;
    let r = base % m;
    let mut q = base - r + 1;
    if q <= base {
        q += m;
    }
    if is_prime(q) {
        Ok(q)
    } else {
        next_prime(q, m)
    }
}

/// Next prime above `q` in the residue class `1 (mod m)`.
pub fn next_prime(q: u64, m: u64) -> Result<u64> {
    let mut candidate = q;
    loop {
        candidate = candidate.checked_add(m).ok_or_else(|| {
            modckks_err!(InvalidParameters, "no NTT prime above {} (m = {})", q, m)
        })?;
        if is_prime(candidate) {
            return Ok(candidate);
        }
    }
}

/// Previous prime below `q` in the residue class `1 (mod m)`.
pub fn previous_prime(q: u64, m: u64) -> Result<u64> {
    let mut candidate = q;
    loop {
        if candidate <= m {
            return Err(modckks_err!(
                InvalidParameters,
                "no NTT prime below {} (m = {})",
                q,
                m
            ));
        }
        candidate -= m;
        if is_prime(candidate) {
            return Ok(candidate);
        }
    }
}

/// Largest prime `q < 2^bits` with `q ≡ 1 (mod m)`.
pub fn last_prime_below(bits: u32, m: u64) -> Result<u64> {
    let above = first_prime(bits, m)?;
    previous_prime(above, m)
}

/// Find a primitive `m`-th root of unity modulo prime `q` (`m` a power of two).
pub fn root_of_unity(m: u64, q: u64) -> Result<u64> {
    if !m.is_power_of_two() || (q - 1) % m != 0 {
        return Err(modckks_err!(
            InvalidParameters,
            "{} has no primitive {}-th root of unity",
            q,
            m
        ));
    }
    let exp = (q - 1) / m;
    for g in 2..q.min(1 << 20) {
        let candidate = ModQ::pow(g, exp, q);
        if ModQ::pow(candidate, m / 2, q) != 1 {
            return Ok(candidate);
        }
    }
    Err(modckks_err!(
        InvalidParameters,
        "no primitive {}-th root of unity found modulo {}",
        m,
        q
    ))
}
