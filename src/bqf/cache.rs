//! Power-of-two cache for repeated exponentiations with a fixed base.

use std::sync::Mutex;

use curv::arithmetic::{BitManipulation, Zero};
use curv::BigInt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::BQuadraticForm;
use crate::errors::Result;

/// A form paired with a lazily grown `cache[i] = base^(2^i)` table.
/// Exponentiation walks the bit decomposition of the exponent; the cache
/// grows monotonically and is shared read-mostly across sessions.
#[derive(Debug)]
pub struct CacheExp {
    base: BQuadraticForm,
    cache: Mutex<Vec<BQuadraticForm>>,
}

impl CacheExp {
    pub fn new(base: BQuadraticForm) -> Self {
        let cache = Mutex::new(vec![base.clone()]);
        Self { base, cache }
    }

    pub fn base(&self) -> &BQuadraticForm {
        &self.base
    }

    /// `base^n` for a signed exponent, reusing and extending the cached
    /// squarings.
    pub fn exp(&self, n: &BigInt) -> Result<BQuadraticForm> {
        if n.is_zero() {
            return Ok(self.base.identity());
        }
        let negative = *n < BigInt::zero();
        let magnitude = if negative { -n.clone() } else { n.clone() };
        let bits = magnitude.bit_length();

        let powers = {
            let mut cache = self.cache.lock().expect("power cache poisoned");
            while cache.len() < bits {
                let next = cache.last().expect("cache holds the base").square()?;
                cache.push(next);
            }
            cache[..bits].to_vec()
        };

        let mut acc: Option<BQuadraticForm> = None;
        for (i, power) in powers.iter().enumerate() {
            if magnitude.test_bit(i) {
                acc = Some(match acc {
                    None => power.clone(),
                    Some(prev) => prev.compose(power)?,
                });
            }
        }
        let result = acc.expect("non-zero exponent has a set bit");
        Ok(if negative { result.inverse() } else { result })
    }
}

impl Clone for CacheExp {
    fn clone(&self) -> Self {
        let cached = self.cache.lock().expect("power cache poisoned").clone();
        Self {
            base: self.base.clone(),
            cache: Mutex::new(cached),
        }
    }
}

impl PartialEq for CacheExp {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl Serialize for CacheExp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.base.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CacheExp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self::new(BQuadraticForm::deserialize(deserializer)?))
    }
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

    #[test]
    fn agrees_with_direct_exponentiation() {
        let f = form(31, 24, 15951);
        let cached = CacheExp::new(f.clone());
        for n in [0i64, 1, 2, 3, 5, 17, 200, 1000] {
            assert_eq!(
                cached.exp(&crate::bqf::i128_to_bigint(n as i128)).unwrap(),
                f.exp(&crate::bqf::i128_to_bigint(n as i128)).unwrap(),
                "mismatch at {}",
                n
            );
        }
    }

    #[test]
    fn negative_exponents() {
        let f = form(2, 1, 3);
        let cached = CacheExp::new(f.clone());
        let e = cached.exp(&BigInt::from(-5)).unwrap();
        assert_eq!(e, f.exp(&BigInt::from(5)).unwrap().inverse());
    }

    #[test]
    fn serde_keeps_base() {
        let cached = CacheExp::new(form(2, 1, 3));
        let json = serde_json::to_string(&cached).unwrap();
        let back: CacheExp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cached);
    }
}
