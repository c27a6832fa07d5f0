//! Modular arithmetic operations

/// Modular arithmetic operations over Z_q
pub struct ModQ;

impl ModQ {
    /// Add two values modulo q
    #[inline]
    pub fn add(a: u64, b: u64, q: u64) -> u64 {
        let sum = (a as u128) + (b as u128);
        (sum % (q as u128)) as u64
    }

    /// Subtract two values modulo q (inputs already reduced)
    #[inline]
    pub fn sub(a: u64, b: u64, q: u64) -> u64 {
        if a >= b {
            a - b
        } else {
            q - (b - a)
        }
    }

    /// Multiply two values modulo q
    #[inline]
    pub fn mul(a: u64, b: u64, q: u64) -> u64 {
        let prod = (a as u128) * (b as u128);
        (prod % (q as u128)) as u64
    }

    /// Negate a value modulo q
    #[inline]
    pub fn negate(a: u64, q: u64) -> u64 {
        if a == 0 {
            0
        } else {
            q - a
        }
    }

    /// Modular exponentiation by squaring
    pub fn pow(mut base: u64, mut exp: u64, q: u64) -> u64 {
        let mut result = 1u64 % q;
        base %= q;
        while exp > 0 {
            if exp & 1 == 1 {
                result = Self::mul(result, base, q);
            }
            exp >>= 1;
            base = Self::mul(base, base, q);
        }
        result
    }

    /// Convert a signed integer to its representation in Z_q
    #[inline]
    pub fn from_signed(val: i64, q: u64) -> u64 {
        let r = (val as i128).rem_euclid(q as i128);
        r as u64
    }

    /// Convert a signed 128-bit integer to its representation in Z_q
    #[inline]
    pub fn from_i128(val: i128, q: u64) -> u64 {
        val.rem_euclid(q as i128) as u64
    }

    /// Convert from Z_q to signed representation in [-q/2, q/2)
    #[inline]
    pub fn to_signed(val: u64, q: u64) -> i64 {
        if val <= q / 2 {
            val as i64
        } else {
            -((q - val) as i64)
        }
    }

    /// Reduce a value modulo q
    #[inline]
    pub fn reduce(a: u64, q: u64) -> u64 {
        a % q
    }

    /// Re-reduce a residue mod `q_from` into Z_`q_to` through its centered lift.
    ///
    /// This is the per-coefficient step of switching a small polynomial to
    /// a new prime: values above `q_from / 2` are treated as negative.
    #[inline]
    pub fn switch_centered(val: u64, q_from: u64, q_to: u64) -> u64 {
        if val > q_from / 2 {
            let neg = (q_from - val) % q_to;
            Self::negate(neg, q_to)
        } else {
            val % q_to
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: u64 = 1152921504606830593;

    #[test]
    fn test_add() {
        assert_eq!(ModQ::add(5, 7, Q), 12);
        assert_eq!(ModQ::add(Q - 1, 2, Q), 1);
    }

    #[test]
    fn test_sub() {
        assert_eq!(ModQ::sub(10, 3, Q), 7);
        assert_eq!(ModQ::sub(3, 10, Q), Q - 7);
    }

    #[test]
    fn test_pow() {
        assert_eq!(ModQ::pow(3, 4, 1000), 81);
        assert_eq!(ModQ::pow(2, Q - 1, Q), 1);
        assert_eq!(ModQ::pow(7, 0, Q), 1);
    }

    #[test]
    fn test_signed_round_trip() {
        assert_eq!(ModQ::from_signed(-5, Q), Q - 5);
        assert_eq!(ModQ::from_signed(-(Q as i64), Q), 0);
        assert_eq!(ModQ::to_signed(Q - 5, Q), -5);
        assert_eq!(ModQ::from_i128(-(1i128 << 100), 17), ((17 - (1u128 << 100) % 17) % 17) as u64);
    }

    #[test]
    fn test_switch_centered() {
        let small = 97u64;
        let big = 1_000_003u64;
        // -3 mod 97 lands on -3 mod big
        assert_eq!(ModQ::switch_centered(small - 3, small, big), big - 3);
        assert_eq!(ModQ::switch_centered(3, small, big), 3);
        // 1_000_000 mod big is "negative" (-3) and lands on 94 mod 97
        assert_eq!(ModQ::switch_centered(big - 3, big, small), small - 3);
    }
}
