//! Number-theoretic helpers over `curv::BigInt`.
//!
//! BQF coefficients live over the signed integers while CL exponents live
//! modulo `a`, `p` or the curve order; everything sign-sensitive in the
//! crate goes through the floor-division helpers here instead of the
//! truncating `%` operator.

use curv::arithmetic::{BitManipulation, Modulo, Samplable, Zero};
use curv::BigInt;

use crate::errors::{Error, Result};

/// Retry cap shared by every rejection-sampling loop in the crate.
pub const MAX_RETRY: usize = 100;

/// Floor remainder: the unique `r` in `[0, m)` with `a ≡ r (mod m)`.
/// `m` must be positive.
pub fn fmod(a: &BigInt, m: &BigInt) -> BigInt {
    debug_assert!(*m > BigInt::zero());
    let r = a % m;
    if r < BigInt::zero() {
        r + m
    } else {
        r
    }
}

/// Floor quotient matching [`fmod`]: `a = fdiv(a,m)·m + fmod(a,m)`.
pub fn fdiv(a: &BigInt, m: &BigInt) -> BigInt {
    (a - fmod(a, m)) / m
}

/// Quotient of an exact division. Debug-asserts divisibility.
pub fn exact_div(a: &BigInt, b: &BigInt) -> BigInt {
    debug_assert!(!b.is_zero());
    debug_assert!((a % b).is_zero(), "non-exact division");
    a / b
}

/// Extended Euclid: returns `(g, x, y)` with `a·x + b·y = g` and `g >= 0`.
pub fn xgcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    let (mut old_r, mut r) = (a.clone(), b.clone());
    let (mut old_s, mut s) = (BigInt::from(1), BigInt::zero());
    let (mut old_t, mut t) = (BigInt::zero(), BigInt::from(1));

    while !r.is_zero() {
        let q = &old_r / &r;
        let next_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, next_s);
        let next_t = &old_t - &q * &t;
        old_t = std::mem::replace(&mut t, next_t);
    }
    if old_r < BigInt::zero() {
        old_r = -old_r;
        old_s = -old_s;
        old_t = -old_t;
    }
    (old_r, old_s, old_t)
}

/// gcd only, non-negative.
pub fn gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let (mut x, mut y) = (a.clone(), b.clone());
    while !y.is_zero() {
        let r = &x % &y;
        x = std::mem::replace(&mut y, r);
    }
    if x < BigInt::zero() {
        -x
    } else {
        x
    }
}

/// Floor square root of a non-negative integer (Newton iteration).
pub fn isqrt(n: &BigInt) -> BigInt {
    debug_assert!(*n >= BigInt::zero());
    if *n <= BigInt::from(1) {
        return n.clone();
    }
    // start above the root so the sequence is strictly decreasing
    let mut x = BigInt::from(1) << (n.bit_length() / 2 + 1);
    loop {
        let y = (&x + n / &x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Jacobi symbol `(a | n)` for odd positive `n`. Returns -1, 0 or 1.
pub fn jacobi(a: &BigInt, n: &BigInt) -> i32 {
    debug_assert!(*n > BigInt::zero());
    debug_assert!(n % BigInt::from(2) == BigInt::from(1));

    let mut a = fmod(a, n);
    let mut n = n.clone();
    let mut result = 1i32;
    let eight = BigInt::from(8);
    let four = BigInt::from(4);
    let three = BigInt::from(3);
    let five = BigInt::from(5);

    while !a.is_zero() {
        while (&a % BigInt::from(2)).is_zero() {
            a = a >> 1;
            let n8 = &n % &eight;
            if n8 == three || n8 == five {
                result = -result;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if &a % &four == three && &n % &four == three {
            result = -result;
        }
        a = fmod(&a, &n);
    }
    if n == BigInt::from(1) {
        result
    } else {
        0
    }
}

const SMALL_PRIMES: [u32; 25] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Miller–Rabin probable-prime test with `rounds` random bases.
pub fn is_probable_prime(n: &BigInt, rounds: usize) -> bool {
    if *n < BigInt::from(2) {
        return false;
    }
    for p in SMALL_PRIMES {
        let p = BigInt::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    let one = BigInt::from(1);
    let n_minus_1 = n - &one;
    let mut d = n_minus_1.clone();
    let mut s = 0usize;
    while (&d % BigInt::from(2)).is_zero() {
        d = d >> 1;
        s += 1;
    }

    'witness: for _ in 0..rounds {
        // base in [2, n-2]
        let a = BigInt::sample_below(&(n - BigInt::from(4))) + BigInt::from(2);
        let mut x = BigInt::mod_pow(&a, &d, n);
        if x == one || x == n_minus_1 {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = BigInt::mod_pow(&x, &BigInt::from(2), n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Inverse modulo a prime, via Fermat. Fails on multiples of `p`.
pub fn mod_inv_prime(a: &BigInt, p: &BigInt) -> Result<BigInt> {
    let reduced = fmod(a, p);
    if reduced.is_zero() {
        return Err(Error::NotInRange);
    }
    Ok(BigInt::mod_pow(&reduced, &(p - BigInt::from(2)), p))
}

/// Uniform sample from `[-2^bits, 2^bits]`.
pub fn sample_symmetric(bits: usize) -> BigInt {
    let bound = BigInt::from(1) << bits;
    let width = (bound.clone() << 1) + BigInt::from(1);
    BigInt::sample_below(&width) - bound
}

/// Uniform sample from `[1, upper)`, rejection-capped.
pub fn sample_positive_below(upper: &BigInt) -> Result<BigInt> {
    if *upper <= BigInt::from(1) {
        return Err(Error::NotInRange);
    }
    for _ in 0..MAX_RETRY {
        let x = BigInt::sample_below(upper);
        if !x.is_zero() {
            return Ok(x);
        }
    }
    Err(Error::ExceedMaxRetry)
}

/// Smallest `k` with `2^k >= n`, for `n >= 1`.
pub fn ceil_log2(n: usize) -> usize {
    debug_assert!(n >= 1);
    let mut k = 0;
    while (1usize << k) < n {
        k += 1;
    }
    k
}
