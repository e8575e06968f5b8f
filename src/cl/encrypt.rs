//! Encryption, decryption and the homomorphic layer, with the ZK proof of
//! well-formed ciphertext.

use blake2::Digest;
use curv::arithmetic::{Converter, Samplable, Zero};
use curv::BigInt;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{form_bytes, Blake2b256, ClBase, PublicKey, CL};
use crate::bqf::BQuadraticForm;
use crate::errors::{Error, Result};
use crate::math::{exact_div, fmod, mod_inv_prime};

pub const SALT_SIZE: usize = 32;

/// Proof of knowledge of `(m, r)` with `c1 = g^r`, `c2 = f^m h^r`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncProof {
    pub salt: Vec<u8>,
    pub u1: BigInt,
    pub u2: BigInt,
    pub t1: BQuadraticForm,
    pub t2: BQuadraticForm,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub c1: BQuadraticForm,
    pub c2: BQuadraticForm,
    pub proof: Option<EncProof>,
}

pub(crate) fn random_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

impl PublicKey {
    /// Encrypts `m ∈ [0, p)` and attaches the well-formedness proof.
    pub fn encrypt(&self, m: &BigInt) -> Result<Ciphertext> {
        let base = self.base();
        if *m < BigInt::zero() || m >= base.p() {
            return Err(Error::NotInRange);
        }
        let r = BigInt::sample_below(base.a());
        let c1 = base.g().exp(&r)?;
        let c2 = base.f().exp(m)?.compose(&self.h().exp(&r)?)?;

        // commit
        let r1_bound = (base.a() * base.challenge_bound()) << base.distribution_parameter();
        let r1 = BigInt::sample_below(&r1_bound);
        let r2 = BigInt::sample_below(base.p());
        let t1 = base.g().exp(&r1)?;
        let t2 = self.h().exp(&r1)?.compose(&base.f().exp(&r2)?)?;
        let salt = random_salt();

        let k = self.enc_challenge(&salt, &t1, &t2);
        let u1 = &r1 + &k * &r;
        let u2 = fmod(&(&r2 + &k * m), base.p());

        Ok(Ciphertext {
            c1,
            c2,
            proof: Some(EncProof { salt, u1, u2, t1, t2 }),
        })
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Ciphertext> {
        self.encrypt(&BigInt::from_bytes(plaintext))
    }

    /// Checks the attached proof of well-formed ciphertext.
    pub fn verify_enc(&self, ciphertext: &Ciphertext) -> Result<()> {
        let base = self.base();
        let proof = ciphertext.proof.as_ref().ok_or(Error::InvalidMessage)?;
        if ciphertext.c1.discriminant() != base.discriminant_order_p()
            || ciphertext.c2.discriminant() != base.discriminant_order_p()
        {
            return Err(Error::DifferentBQForms);
        }

        let u1_bound = (base.a() * base.challenge_bound())
            * ((BigInt::from(1) << base.distribution_parameter()) + BigInt::from(1));
        if proof.u1 < BigInt::zero() || proof.u1 > u1_bound {
            return Err(Error::InvalidMessage);
        }
        if proof.u2 < BigInt::zero() || proof.u2 >= *base.p() {
            return Err(Error::InvalidMessage);
        }

        let k = self.enc_challenge(&proof.salt, &proof.t1, &proof.t2);
        let lhs1 = base.g().exp(&proof.u1)?;
        let rhs1 = proof.t1.compose(&ciphertext.c1.exp(&k)?)?;
        if lhs1 != rhs1 {
            warn!("ciphertext proof: first equation failed");
            return Err(Error::DifferentBQForms);
        }
        let lhs2 = self.h().exp(&proof.u1)?.compose(&base.f().exp(&proof.u2)?)?;
        let rhs2 = proof.t2.compose(&ciphertext.c2.exp(&k)?)?;
        if lhs2 != rhs2 {
            warn!("ciphertext proof: second equation failed");
            return Err(Error::DifferentBQForms);
        }
        Ok(())
    }

    /// Homomorphic addition with re-randomisation. The inputs' proofs do
    /// not carry over.
    pub fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        let base = self.base();
        let r = BigInt::sample_below(base.a());
        let c1 = lhs
            .c1
            .compose(&rhs.c1)?
            .compose(&base.g().exp(&r)?)?;
        let c2 = lhs
            .c2
            .compose(&rhs.c2)?
            .compose(&self.h().exp(&r)?)?;
        Ok(Ciphertext { c1, c2, proof: None })
    }

    /// Homomorphic scalar multiplication by `k mod p`, re-randomised.
    pub fn mul_const(&self, ciphertext: &Ciphertext, k: &BigInt) -> Result<Ciphertext> {
        let base = self.base();
        let k = fmod(k, base.p());
        let r = BigInt::sample_below(base.a());
        let c1 = ciphertext.c1.exp(&k)?.compose(&base.g().exp(&r)?)?;
        let c2 = ciphertext.c2.exp(&k)?.compose(&self.h().exp(&r)?)?;
        Ok(Ciphertext { c1, c2, proof: None })
    }

    fn enc_challenge(&self, salt: &[u8], t1: &BQuadraticForm, t2: &BQuadraticForm) -> BigInt {
        let base = self.base();
        let mut hasher = Blake2b256::new();
        hasher.update(salt);
        hasher.update(form_bytes(t1));
        hasher.update(form_bytes(t2));
        hasher.update(form_bytes(base.g().base()));
        hasher.update(form_bytes(base.f().base()));
        hasher.update(form_bytes(self.h().base()));
        hasher.update(base.p().to_bytes());
        hasher.update(base.q().to_bytes());
        hasher.update(base.a().to_bytes());
        hasher.update(base.challenge_bound().to_bytes());
        fmod(
            &BigInt::from_bytes(hasher.finalize().as_slice()),
            base.challenge_bound(),
        )
    }
}

impl ClBase {
    /// Recovers the plaintext from `f^m`: the reduced form is
    /// `(p^2, L·p, ·)` with `L ≡ m^{-1} (mod p)`.
    pub(crate) fn solve(&self, message_form: &BQuadraticForm) -> Result<BigInt> {
        if message_form.is_identity() {
            return Ok(BigInt::zero());
        }
        let p = self.p();
        if message_form.a() != &(p * p) || !fmod(message_form.b(), p).is_zero() {
            return Err(Error::DifferentBQForms);
        }
        let l = exact_div(message_form.b(), p);
        mod_inv_prime(&fmod(&l, p), p)
    }
}

impl CL {
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<BigInt> {
        let base = self.public_key().base();
        let x = self.secret_exponent();
        let masked = ciphertext
            .c2
            .compose(&ciphertext.c1.exp(&(-x.clone()))?)?;
        base.solve(&masked)
    }

    pub fn decrypt_bytes(&self, ciphertext: &Ciphertext) -> Result<Vec<u8>> {
        Ok(self.decrypt(ciphertext)?.to_bytes())
    }
}
