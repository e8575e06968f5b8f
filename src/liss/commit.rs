//! Salted hash commitments over forms. Opening checks are constant-time.

use blake2::Digest;
use subtle::ConstantTimeEq;

use crate::bqf::BQuadraticForm;
use crate::cl::Blake2b256;

/// `Blake2b-256(a,b,c || salt)` over the base-10 coefficient encoding.
pub fn commit(form: &BQuadraticForm, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b256::new();
    hasher.update(format!("{},{},{}", form.a(), form.b(), form.c()).into_bytes());
    hasher.update(salt);
    hasher.finalize().as_slice().to_vec()
}

pub fn verify_commitment(form: &BQuadraticForm, salt: &[u8], digest: &[u8]) -> bool {
    let expected = commit(form, salt);
    if expected.len() != digest.len() {
        return false;
    }
    expected.ct_eq(digest).into()
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
    fn commitment_opens_with_matching_salt() {
        let f = form(2, 1, 3);
        let salt = vec![5u8; 32];
        let digest = commit(&f, &salt);
        assert!(verify_commitment(&f, &salt, &digest));
        assert!(!verify_commitment(&f, &[6u8; 32], &digest));
        assert!(!verify_commitment(&form(1, 1, 6), &salt, &digest));
        assert!(!verify_commitment(&f, &salt, &digest[1..]));
    }
}
