//! Ideal class groups of imaginary quadratic orders, represented as
//! positive-definite binary quadratic forms `a x^2 + b x y + c y^2`.
//!
//! Forms are immutable value objects: every operation returns a new,
//! already-reduced form. Two reduced forms are equal iff they represent
//! the same class, so `PartialEq` on the coefficient triple is class
//! equality.

mod cache;
mod exp;

pub use cache::CacheExp;

use curv::arithmetic::{BitManipulation, Converter, Zero};
use curv::BigInt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Error, Result};
use crate::math::{exact_div, fdiv, fmod, isqrt, xgcd};

#[derive(Clone, Debug)]
pub struct BQuadraticForm {
    a: BigInt,
    b: BigInt,
    c: BigInt,
    discriminant: BigInt,
    // floor(|discriminant/4|^(1/4)), the NUCOMP partial-reduction cutoff
    shanks_bound: BigInt,
}

impl PartialEq for BQuadraticForm {
    fn eq(&self, other: &Self) -> bool {
        self.a == other.a && self.b == other.b && self.c == other.c
    }
}

impl Eq for BQuadraticForm {}

impl BQuadraticForm {
    /// Builds the reduced form with the given coefficients. Fails unless
    /// `b^2 - 4ac < 0` and `a > 0`.
    pub fn new(a: BigInt, b: BigInt, c: BigInt) -> Result<Self> {
        let discriminant = &b * &b - BigInt::from(4) * &a * &c;
        if discriminant >= BigInt::zero() {
            return Err(Error::PositiveDiscriminant);
        }
        if a <= BigInt::zero() {
            return Err(Error::WrongInput("leading coefficient must be positive".into()));
        }
        Ok(Self::reduced_parts(a, b, c, discriminant))
    }

    /// Builds the reduced form `(a, b, (b^2 - d)/(4a))` over discriminant
    /// `d < 0`.
    pub fn new_with_discriminant(a: BigInt, b: BigInt, d: &BigInt) -> Result<Self> {
        if *d >= BigInt::zero() {
            return Err(Error::PositiveDiscriminant);
        }
        if a <= BigInt::zero() {
            return Err(Error::WrongInput("leading coefficient must be positive".into()));
        }
        let num = &b * &b - d;
        let four_a = BigInt::from(4) * &a;
        if !(&num % &four_a).is_zero() {
            return Err(Error::WrongInput("coefficients do not match the discriminant".into()));
        }
        let c = num / four_a;
        Ok(Self::reduced_parts(a, b, c, d.clone()))
    }

    fn reduced_parts(a: BigInt, b: BigInt, c: BigInt, discriminant: BigInt) -> Self {
        debug_assert_eq!(&b * &b - BigInt::from(4) * &a * &c, discriminant);
        let abs_quarter = (BigInt::zero() - &discriminant) >> 2;
        let shanks_bound = isqrt(&isqrt(&abs_quarter));
        let (a, b, c) = reduce(a, b, c);
        Self {
            a,
            b,
            c,
            discriminant,
            shanks_bound,
        }
    }

    pub fn a(&self) -> &BigInt {
        &self.a
    }

    pub fn b(&self) -> &BigInt {
        &self.b
    }

    pub fn c(&self) -> &BigInt {
        &self.c
    }

    pub fn discriminant(&self) -> &BigInt {
        &self.discriminant
    }

    /// The unique reduced identity (principal form) of this discriminant.
    pub fn identity(&self) -> Self {
        let d = &self.discriminant;
        let (b, c) = if fmod(d, &BigInt::from(4)).is_zero() {
            (BigInt::zero(), (BigInt::zero() - d) >> 2)
        } else {
            (BigInt::from(1), (BigInt::from(1) - d) >> 2)
        };
        Self::reduced_parts(BigInt::from(1), b, c, d.clone())
    }

    pub fn is_identity(&self) -> bool {
        self.a == BigInt::from(1)
    }

    /// `(a, -b, c)` reduced: the group inverse.
    pub fn inverse(&self) -> Self {
        Self::reduced_parts(
            self.a.clone(),
            -self.b.clone(),
            self.c.clone(),
            self.discriminant.clone(),
        )
    }

    /// Group law: NUCOMP composition of two forms of equal discriminant.
    pub fn compose(&self, other: &Self) -> Result<Self> {
        if self.discriminant != other.discriminant {
            return Err(Error::DifferentDiscriminant);
        }
        // orient so the first operand carries the larger leading coefficient
        let (f1, f2) = if self.a >= other.a {
            (self, other)
        } else {
            (other, self)
        };

        let two = BigInt::from(2);
        let s = exact_div(&(&f1.b + &f2.b), &two);
        let m = exact_div(&(&f1.b - &f2.b), &two);

        let (d, y1, _) = xgcd(&f2.a, &f1.a);
        let (d1, x2, y2) = if fmod(&s, &d).is_zero() {
            (d.clone(), BigInt::zero(), BigInt::from(-1))
        } else {
            let (d1, u2, v2) = xgcd(&s, &d);
            (d1, u2, -v2)
        };
        let v1 = exact_div(&f1.a, &d1);
        let v2 = exact_div(&f2.a, &d1);
        // k solves v2·k ≡ m (mod v1) together with the c2 congruence
        let k = fmod(&(-(&y1 * &y2 * &m) - &x2 * &f2.c), &v1);

        self.assemble(&v1, &v2, &k, &s, &m, &f2.b, &f2.c, &d1, &f1.a)
    }

    /// NUDUPL-style squaring: the single-operand specialisation needs one
    /// extended gcd instead of two.
    pub fn square(&self) -> Result<Self> {
        let (d1, u, _) = xgcd(&self.b, &self.a);
        let v1 = exact_div(&self.a, &d1);
        let v2 = v1.clone();
        let k = fmod(&(-(&u * &self.c)), &v1);
        let s = self.b.clone();
        let m = BigInt::zero();
        let b2 = self.b.clone();
        let c2 = self.c.clone();
        let a1 = self.a.clone();
        self.assemble(&v1, &v2, &k, &s, &m, &b2, &c2, &d1, &a1)
    }

    /// Cubing: one squaring plus one composition, both NUCOMP-shaped.
    pub fn cube(&self) -> Result<Self> {
        self.square()?.compose(self)
    }

    /// Shared tail of `compose`/`square`: either the plain Dirichlet
    /// composite or the partial-gcd shortcut, then reduction.
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        v1: &BigInt,
        v2: &BigInt,
        k: &BigInt,
        s: &BigInt,
        m: &BigInt,
        b2: &BigInt,
        c2: &BigInt,
        d1: &BigInt,
        a1: &BigInt,
    ) -> Result<Self> {
        let disc = self.discriminant.clone();
        let a0 = v1 * v2;
        let b0 = b2 + BigInt::from(2) * v2 * k;
        let c0 = exact_div(&(c2 * d1 + k * (b2 + v2 * k)), v1);

        if *a1 <= self.shanks_bound {
            return Ok(Self::reduced_parts(a0, b0, c0, disc));
        }

        // partial euclidean reduction of (v1, k), cofactors start (0, -1)
        let (r2, r1, cof2, cof1) = partial_gcd(v1.clone(), k.clone(), &self.shanks_bound);

        // invariant: r = v1·s - cof·k exactly
        let s1 = exact_div(&(&r1 + &cof1 * k), v1);
        let s2 = exact_div(&(&r2 + &cof2 * k), v1);

        let m1 = exact_div(&(v2 * &r1 + m * &cof1), v1);
        let m2 = exact_div(&(s * &r1 - c2 * d1 * &cof1), v1);
        let a3 = &r1 * &m1 - &cof1 * &m2;

        let m1b = exact_div(&(v2 * &r2 + m * &cof2), v1);
        let m2b = exact_div(&(s * &r2 - c2 * d1 * &cof2), v1);
        let c3 = &r2 * &m1b - &cof2 * &m2b;

        // determinant of [[s1, s2], [-cof1, -cof2]] is ±1; flip the second
        // column when needed so the transform stays in SL2(Z)
        let det = &cof1 * &s2 - &cof2 * &s1;
        debug_assert!(det == BigInt::from(1) || det == BigInt::from(-1));
        let mut b3 = BigInt::from(2) * &a0 * &s1 * &s2 - &b0 * (&s1 * &cof2 + &s2 * &cof1)
            + BigInt::from(2) * &c0 * &cof1 * &cof2;
        if det == BigInt::from(-1) {
            b3 = -b3;
        }

        Ok(Self::reduced_parts(a3, b3, c3, disc))
    }
}

/// Reduction: normalise `b` into `(-a, a]`, swap while `a > c`, and apply
/// the `a = c` tie-break.
fn reduce(mut a: BigInt, mut b: BigInt, mut c: BigInt) -> (BigInt, BigInt, BigInt) {
    loop {
        if b > a || b <= -a.clone() {
            let two_a = a.clone() << 1;
            let mut r = fmod(&b, &two_a);
            let mut q = fdiv(&b, &two_a);
            if r > a {
                r = r - &two_a;
                q = q + BigInt::from(1);
            }
            c = c - &q * exact_div(&(&b + &r), &BigInt::from(2));
            b = r;
        }
        if a > c {
            std::mem::swap(&mut a, &mut c);
            b = -b;
            continue;
        }
        break;
    }
    if a == c && b < BigInt::zero() {
        b = -b;
    }
    (a, b, c)
}

/// Partial extended gcd of `(r2, r1)` bounded below by `bound`; returns
/// `(r2, r1, c2, c1)`. Runs limb-sized batches once the remainders fit a
/// machine word, one big division per step otherwise.
fn partial_gcd(
    mut r2: BigInt,
    mut r1: BigInt,
    bound: &BigInt,
) -> (BigInt, BigInt, BigInt, BigInt) {
    let mut c2 = BigInt::zero();
    let mut c1 = BigInt::from(-1);

    while !r1.is_zero() && r1 > *bound {
        if r2.bit_length() <= 62 {
            // whole remaining tail in machine words; the step matrix is
            // applied to the big cofactors once at the end
            let mut x2 = big_to_i128(&r2);
            let mut x1 = big_to_i128(&r1);
            let bound_i = big_to_i128(bound);
            let (mut m11, mut m12, mut m21, mut m22) = (1i128, 0i128, 0i128, 1i128);
            while x1 != 0 && x1 > bound_i {
                let q = x2 / x1;
                let r = x2 - q * x1;
                x2 = x1;
                x1 = r;
                let (n21, n22) = (m11 - q * m21, m12 - q * m22);
                m11 = m21;
                m12 = m22;
                m21 = n21;
                m22 = n22;
            }
            let new_c2 = i128_to_bigint(m11) * &c2 + i128_to_bigint(m12) * &c1;
            let new_c1 = i128_to_bigint(m21) * &c2 + i128_to_bigint(m22) * &c1;
            c2 = new_c2;
            c1 = new_c1;
            r2 = i128_to_bigint(x2);
            r1 = i128_to_bigint(x1);
            break;
        }
        let q = &r2 / &r1;
        let r = &r2 - &q * &r1;
        r2 = std::mem::replace(&mut r1, r);
        let next_c = &c2 - &q * &c1;
        c2 = std::mem::replace(&mut c1, next_c);
    }
    (r2, r1, c2, c1)
}

pub(crate) fn i128_to_bigint(v: i128) -> BigInt {
    if v < 0 {
        -BigInt::from_bytes(&(v.unsigned_abs()).to_be_bytes())
    } else {
        BigInt::from_bytes(&(v as u128).to_be_bytes())
    }
}

fn big_to_i128(x: &BigInt) -> i128 {
    debug_assert!(*x >= BigInt::zero() && x.bit_length() <= 62);
    let bytes = x.to_bytes();
    let mut v: i128 = 0;
    for byte in bytes {
        v = (v << 8) | byte as i128;
    }
    v
}

// wire rule: forms travel as base-10 coefficient strings
#[derive(Serialize, Deserialize)]
struct FormWire {
    a: String,
    b: String,
    c: String,
}

impl Serialize for BQuadraticForm {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        FormWire {
            a: format!("{}", self.a),
            b: format!("{}", self.b),
            c: format!("{}", self.c),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BQuadraticForm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;
        let wire = FormWire::deserialize(deserializer)?;
        let parse = |s: &str| {
            BigInt::from_str_radix(s, 10).map_err(|_| D::Error::custom("invalid big integer"))
        };
        BQuadraticForm::new(parse(&wire.a)?, parse(&wire.b)?, parse(&wire.c)?)
            .map_err(|e| D::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(a: i64, b: i64, c: i64) -> BQuadraticForm {
        BQuadraticForm::new(
            i128_to_bigint(a as i128),
            i128_to_bigint(b as i128),
            i128_to_bigint(c as i128),
        )
        .unwrap()
    }

    fn coeffs(f: &BQuadraticForm) -> (BigInt, BigInt, BigInt) {
        (f.a().clone(), f.b().clone(), f.c().clone())
    }

    #[test]
    fn rejects_non_negative_discriminant() {
        assert_eq!(
            BQuadraticForm::new(BigInt::from(1), BigInt::from(3), BigInt::from(1)).unwrap_err(),
            Error::PositiveDiscriminant
        );
        assert_eq!(
            BQuadraticForm::new_with_discriminant(BigInt::from(1), BigInt::from(1), &BigInt::from(5))
                .unwrap_err(),
            Error::PositiveDiscriminant
        );
    }

    #[test]
    fn reduction_vectors() {
        let f = form(33, 11, 5);
        assert_eq!(coeffs(&f), (BigInt::from(5), BigInt::from(-1), BigInt::from(27)));

        let f = form(15, 0, 15);
        assert_eq!(coeffs(&f), (BigInt::from(15), BigInt::from(0), BigInt::from(15)));

        let f = form(6, 3, 1);
        assert_eq!(coeffs(&f), (BigInt::from(1), BigInt::from(1), BigInt::from(4)));
    }

    #[test]
    fn compose_identity_and_small_classes() {
        let id = form(1, 1, 6);
        assert_eq!(id.compose(&id).unwrap(), id);

        let g = form(2, -1, 3);
        let g2 = g.compose(&g).unwrap();
        assert_eq!(coeffs(&g2), (BigInt::from(2), BigInt::from(1), BigInt::from(3)));
        let g3 = g2.compose(&form(2, 1, 3)).unwrap();
        assert_eq!(coeffs(&g3), (BigInt::from(1), BigInt::from(1), BigInt::from(6)));
    }

    #[test]
    fn compose_large_class() {
        let f = form(31, 24, 15951);
        let f2 = f.compose(&f).unwrap();
        assert_eq!(
            coeffs(&f2),
            (BigInt::from(517), BigInt::from(100), BigInt::from(961))
        );
        // square agrees with compose-with-self
        assert_eq!(f.square().unwrap(), f2);
        // cube agrees with square-then-compose by definition, and with
        // three compositions
        let f3 = f2.compose(&f).unwrap();
        assert_eq!(f.cube().unwrap(), f3);
    }

    #[test]
    fn compose_rejects_discriminant_mismatch() {
        let f = form(2, -1, 3); // disc -23
        let g = form(1, 1, 6); // disc -23
        assert!(f.compose(&g).is_ok());
        let h = form(1, 0, 1); // disc -4
        assert_eq!(f.compose(&h).unwrap_err(), Error::DifferentDiscriminant);
    }

    #[test]
    fn inverse_involution_and_identity_law() {
        for f in [form(2, -1, 3), form(31, 24, 15951), form(101, 38, 4898)] {
            assert_eq!(f.inverse().inverse(), f);
            assert_eq!(f.compose(&f.inverse()).unwrap(), f.identity());
            assert_eq!(f.compose(&f.identity()).unwrap(), f);
        }
    }

    #[test]
    fn compose_commutes() {
        let f = form(2, -1, 3);
        let g = form(2, 1, 3);
        assert_eq!(f.compose(&g).unwrap(), g.compose(&f).unwrap());

        let f = form(31, 24, 15951);
        let g = form(517, 100, 961);
        assert_eq!(f.compose(&g).unwrap(), g.compose(&f).unwrap());
    }

    #[test]
    fn serde_base10_round_trip() {
        let f = form(31, -24, 15951);
        let json = serde_json::to_string(&f).unwrap();
        assert!(json.contains("\"-24\""));
        let back: BQuadraticForm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn serde_rejects_bad_discriminant() {
        let json = r#"{"a":"1","b":"3","c":"1"}"#;
        assert!(serde_json::from_str::<BQuadraticForm>(json).is_err());
    }
}
