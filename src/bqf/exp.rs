//! Signed (2,3) double-base exponentiation.
//!
//! Cubing a form is cheaper than three compositions, so the exponent is
//! peeled into a signed chain of halvings, thirdings and ±1 corrections;
//! the ±1 direction is picked by a bounded smoothness lookahead.

use curv::arithmetic::Zero;
use curv::BigInt;

use super::BQuadraticForm;
use crate::errors::Result;

// lookahead horizon of the expansion
const EXPANSION_DEPTH: usize = 7;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Step {
    Square,
    Cube,
    MulBase,
    MulBaseInv,
}

impl BQuadraticForm {
    /// `self^n` for a signed exponent. `n = 0` yields the identity and a
    /// negative exponent the inverse power.
    pub fn exp(&self, n: &BigInt) -> Result<Self> {
        if n.is_zero() {
            return Ok(self.identity());
        }
        let negative = *n < BigInt::zero();
        let magnitude = if negative { -n.clone() } else { n.clone() };

        let chain = double_base_chain(&magnitude);
        let base_inv = self.inverse();
        let mut acc = self.clone();
        for step in chain.iter().rev() {
            acc = match step {
                Step::Square => acc.square()?,
                Step::Cube => acc.cube()?,
                Step::MulBase => acc.compose(self)?,
                Step::MulBaseInv => acc.compose(&base_inv)?,
            };
        }
        Ok(if negative { acc.inverse() } else { acc })
    }
}

/// Peels `n > 0` down to 1; replaying the steps in reverse order from the
/// base rebuilds `base^n`.
fn double_base_chain(n: &BigInt) -> Vec<Step> {
    let one = BigInt::from(1);
    let two = BigInt::from(2);
    let three = BigInt::from(3);
    let mut steps = Vec::new();
    let mut n = n.clone();

    while n > one {
        if (&n % &two).is_zero() {
            steps.push(Step::Square);
            n = n >> 1;
        } else if (&n % &three).is_zero() {
            steps.push(Step::Cube);
            n = &n / &three;
        } else {
            let down = smooth_weight(&(&n - &one), EXPANSION_DEPTH);
            let up = smooth_weight(&(&n + &one), EXPANSION_DEPTH);
            if down >= up {
                steps.push(Step::MulBase);
                n = &n - &one;
            } else {
                steps.push(Step::MulBaseInv);
                n = &n + &one;
            }
        }
    }
    steps
}

/// Number of 2/3 divisions available within `depth` steps.
fn smooth_weight(n: &BigInt, depth: usize) -> usize {
    let two = BigInt::from(2);
    let three = BigInt::from(3);
    let mut n = n.clone();
    let mut weight = 0;
    for _ in 0..depth {
        if (&n % &two).is_zero() {
            n = n >> 1;
        } else if (&n % &three).is_zero() {
            n = &n / &three;
        } else {
            break;
        }
        weight += 1;
    }
    weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(a: i64, b: i64, c: i64) -> BQuadraticForm {
        BQuadraticForm::new(
            crate::bqf::i128_to_bigint(a as i128),
            crate::bqf::i128_to_bigint(b as i128),
            crate::bqf::i128_to_bigint(c as i128),
        )
        .unwrap()
    }

    fn chain_value(n: u64) -> BigInt {
        // replay the chain over the integers to check the expansion alone
        let steps = double_base_chain(&BigInt::from(n));
        let mut acc = BigInt::from(1);
        for step in steps.iter().rev() {
            acc = match step {
                Step::Square => acc * BigInt::from(2),
                Step::Cube => acc * BigInt::from(3),
                Step::MulBase => acc + BigInt::from(1),
                Step::MulBaseInv => acc - BigInt::from(1),
            };
        }
        acc
    }

    #[test]
    fn chain_reproduces_exponent() {
        for n in [1u64, 2, 3, 4, 5, 6, 17, 100, 200, 997, 22999971, 987654321] {
            assert_eq!(chain_value(n), BigInt::from(n), "chain broken for {}", n);
        }
    }

    #[test]
    fn exp_zero_one_and_small_powers() {
        let f = form(2, 1, 3);
        assert_eq!(f.exp(&BigInt::zero()).unwrap(), f.identity());
        assert_eq!(f.exp(&BigInt::from(1)).unwrap(), f);
        assert_eq!(f.exp(&BigInt::from(2)).unwrap(), f.square().unwrap());
        assert_eq!(f.exp(&BigInt::from(3)).unwrap(), f.cube().unwrap());
        // (2,1,3)^6 is the principal form of discriminant -23
        assert_eq!(f.exp(&BigInt::from(6)).unwrap(), form(1, 1, 6));
    }

    #[test]
    fn exp_matches_square_halving() {
        let f = form(31, 24, 15951);
        let e10 = f.exp(&BigInt::from(10)).unwrap();
        assert_eq!(e10, f.exp(&BigInt::from(5)).unwrap().square().unwrap());
    }

    #[test]
    fn exp_vectors() {
        let f = form(31, 24, 15951);
        let e = f.exp(&BigInt::from(200)).unwrap();
        assert_eq!(e.a(), &BigInt::from(517));
        assert_eq!(e.b(), &BigInt::from(-276));
        assert_eq!(e.c(), &BigInt::from(993));

        // element order divides 22999970
        let g = form(101, 38, 4898);
        assert_eq!(g.exp(&BigInt::from(22999971u64)).unwrap(), g);
    }

    #[test]
    fn exp_is_a_homomorphism() {
        let f = form(31, 24, 15951);
        let lhs = f.exp(&BigInt::from(100)).unwrap();
        let rhs = f
            .exp(&BigInt::from(17))
            .unwrap()
            .compose(&f.exp(&BigInt::from(83)).unwrap())
            .unwrap();
        assert_eq!(lhs, rhs);

        let iterated = f.exp(&BigInt::from(5)).unwrap().exp(&BigInt::from(7)).unwrap();
        assert_eq!(iterated, f.exp(&BigInt::from(35)).unwrap());
    }

    #[test]
    fn negative_exponent_inverts() {
        let f = form(31, 24, 15951);
        let pos = f.exp(&BigInt::from(200)).unwrap();
        let neg = f.exp(&BigInt::from(-200)).unwrap();
        assert_eq!(pos.compose(&neg).unwrap(), f.identity());
        assert_eq!(neg, pos.inverse());
    }
}
