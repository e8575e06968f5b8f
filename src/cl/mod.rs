//! Castagnos–Laguillaumie linearly homomorphic encryption over class
//! groups of imaginary quadratic orders.
//!
//! The message space is the easy-discrete-log subgroup of order `p`
//! generated by `f = (p^2, p)` inside the class group of discriminant
//! `delta_p = p^2 * delta_k`, `delta_k = -p*q`.

pub(crate) mod encrypt;
mod consistency;

pub use consistency::ConsistencyProofMessage;
pub use encrypt::{Ciphertext, EncProof, SALT_SIZE};

pub(crate) use encrypt::random_salt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use curv::arithmetic::{BitManipulation, Converter, Samplable, Zero};
use curv::BigInt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bqf::{BQuadraticForm, CacheExp};
use crate::errors::{Error, Result};
use crate::math::{
    fmod, is_probable_prime, jacobi, sample_positive_below, MAX_RETRY,
};

pub(crate) type Blake2b256 = Blake2b<U32>;

const MILLER_RABIN_ROUNDS: usize = 40;
const MIN_MESSAGE_PRIME_BITS: usize = 80;
const MIN_SAFE_PARAMETER: usize = 1348;
const MIN_CHALLENGE: u64 = 1024;
// candidate walk inside one prime-generation attempt
const PRIME_SCAN: usize = 20_000;

/// Public parameters requested by the caller of [`CL::new`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// challenge-space size, at least 1024
    pub c: BigInt,
    /// distribution parameter of the ZK proofs
    pub d: usize,
    /// prime order of the message space
    pub p: BigInt,
    /// bit size of `|delta_k| = p*q`
    pub safe_parameter: usize,
    /// bit-shift widening the exponent distribution
    pub distribution_distance: usize,
}

/// Key-independent part of a CL instance: everything both parties can
/// rebuild from `(p, q, g)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClBase {
    p: BigInt,
    q: BigInt,
    a: BigInt,
    c: BigInt,
    d: usize,
    distribution_distance: usize,
    g: CacheExp,
    f: CacheExp,
    discriminant_order_p: BigInt,
}

/// Proof of knowledge of `x` with `h = g^x`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PubKeyProof {
    pub t: BQuadraticForm,
    pub u: BigInt,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKey {
    base: ClBase,
    h: CacheExp,
    proof: Option<PubKeyProof>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretKey(BigInt);

/// A full CL instance: public key plus the decryption exponent.
#[derive(Clone, Debug)]
pub struct CL {
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.c < BigInt::from(MIN_CHALLENGE) {
            return Err(Error::WrongInput("challenge space below 1024".into()));
        }
        if self.p.bit_length() < MIN_MESSAGE_PRIME_BITS
            || !is_probable_prime(&self.p, MILLER_RABIN_ROUNDS)
        {
            return Err(Error::NotBigPrime(MIN_MESSAGE_PRIME_BITS));
        }
        if self.safe_parameter < MIN_SAFE_PARAMETER {
            return Err(Error::SmallSafeParameter);
        }
        if self.safe_parameter / 2 < self.p.bit_length() + 2 {
            return Err(Error::SmallSafeParameter);
        }
        // the proof windows assume the standard distribution parameters
        if self.d == 0 || self.distribution_distance < 40 {
            return Err(Error::WrongInput(
                "distribution parameters below the supported minimum".into(),
            ));
        }
        Ok(())
    }
}

impl CL {
    /// Full parameter and key generation, steps 1-10 of the scheme setup.
    pub fn new(config: Config) -> Result<Self> {
        let base = ClBase::setup(config)?;

        let x = BigInt::sample_below(base.a());
        let h_form = base.g().exp(&x)?;
        if h_form.is_identity() {
            return Err(Error::TrivialKey);
        }

        let proof = base.prove_public_key(&h_form, &x)?;
        let public_key = PublicKey {
            base,
            h: CacheExp::new(h_form),
            proof: Some(proof),
        };
        public_key.verify()?;

        Ok(Self {
            public_key,
            secret_key: SecretKey(x),
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub(crate) fn secret_exponent(&self) -> &BigInt {
        &self.secret_key.0
    }
}

impl ClBase {
    /// Parameter generation without a key pair: the class-group setting,
    /// the subgroup generator `f` and a non-trivial generator `g`.
    pub fn setup(config: Config) -> Result<Self> {
        config.validate()?;
        let p = config.p.clone();

        let q = generate_prime_q(&p, config.safe_parameter)?;
        let delta_k = -(&p * &q);
        let delta_p = &p * &p * &delta_k;

        let f = BQuadraticForm::new_with_discriminant(&p * &p, p.clone(), &delta_p)?;
        let o = lifted_splitting_form(&p, &delta_k, &delta_p)?;
        let a = sampling_bound(&delta_k, config.distribution_distance);

        // g = o^b for random b, retried until non-trivial
        let mut g_form = None;
        for _ in 0..MAX_RETRY {
            let b = sample_positive_below(&a)?;
            let candidate = o.exp(&b)?;
            if !candidate.is_identity() {
                g_form = Some(candidate);
                break;
            }
        }
        let g_form = g_form.ok_or(Error::FailedGenerateG)?;

        Ok(Self {
            p,
            q,
            a,
            c: config.c,
            d: config.d,
            distribution_distance: config.distribution_distance,
            g: CacheExp::new(g_form),
            f: CacheExp::new(f),
            discriminant_order_p: delta_p,
        })
    }

    /// Rebuilds the algebraic setting from the peer's `(p, q, g)` and the
    /// session constants, re-deriving and re-checking the discriminants.
    pub fn from_parameters(
        p: BigInt,
        q: BigInt,
        g: BQuadraticForm,
        c: BigInt,
        d: usize,
        distribution_distance: usize,
    ) -> Result<Self> {
        if !is_probable_prime(&p, MILLER_RABIN_ROUNDS) || !is_probable_prime(&q, MILLER_RABIN_ROUNDS)
        {
            return Err(Error::NotBigPrime(MIN_MESSAGE_PRIME_BITS));
        }
        let pq = &p * &q;
        if fmod(&pq, &BigInt::from(4)) != BigInt::from(3) || jacobi(&p, &q) != -1 {
            return Err(Error::InvalidSeed);
        }
        let delta_k = -pq;
        let delta_p = &p * &p * &delta_k;
        if g.discriminant() != &delta_p || g.is_identity() {
            return Err(Error::DifferentDiscriminant);
        }
        let f = BQuadraticForm::new_with_discriminant(&p * &p, p.clone(), &delta_p)?;
        let a = sampling_bound(&delta_k, distribution_distance);
        Ok(Self {
            p,
            q,
            a,
            c,
            d,
            distribution_distance,
            g: CacheExp::new(g),
            f: CacheExp::new(f),
            discriminant_order_p: delta_p,
        })
    }

    /// Wraps an externally composed `h` (e.g. the LISS joint generator)
    /// as a public key. No knowledge proof exists for such a key.
    pub fn generate_public_key(&self, h: BQuadraticForm) -> Result<PublicKey> {
        if h.is_identity() {
            return Err(Error::TrivialKey);
        }
        if h.discriminant() != &self.discriminant_order_p {
            return Err(Error::DifferentDiscriminant);
        }
        Ok(PublicKey {
            base: self.clone(),
            h: CacheExp::new(h),
            proof: None,
        })
    }

    fn prove_public_key(&self, h: &BQuadraticForm, x: &BigInt) -> Result<PubKeyProof> {
        // a = s_tilde << distribution_distance
        let s_tilde = self.a.clone() >> self.distribution_distance;
        // nonce in [1, 2^90 * s_tilde)
        let bound = s_tilde << 90;
        let r = sample_positive_below(&bound)?;
        let t = self.g.exp(&r)?;
        let k = self.public_key_challenge(&t, h);
        let u = &r + &k * x;
        Ok(PubKeyProof { t, u })
    }

    fn public_key_challenge(&self, t: &BQuadraticForm, h: &BQuadraticForm) -> BigInt {
        let mut hasher = Blake2b256::new();
        hasher.update(form_bytes(t));
        hasher.update(form_bytes(self.g.base()));
        hasher.update(form_bytes(self.f.base()));
        hasher.update(form_bytes(h));
        hasher.update(self.p.to_bytes());
        hasher.update(self.q.to_bytes());
        hasher.update(self.a.to_bytes());
        hasher.update(self.c.to_bytes());
        fmod(
            &BigInt::from_bytes(hasher.finalize().as_slice()),
            &BigInt::from(MIN_CHALLENGE),
        )
    }

    pub fn p(&self) -> &BigInt {
        &self.p
    }

    pub fn q(&self) -> &BigInt {
        &self.q
    }

    pub fn a(&self) -> &BigInt {
        &self.a
    }

    pub fn challenge_bound(&self) -> &BigInt {
        &self.c
    }

    pub fn distribution_parameter(&self) -> usize {
        self.d
    }

    pub fn distribution_distance(&self) -> usize {
        self.distribution_distance
    }

    pub fn g(&self) -> &CacheExp {
        &self.g
    }

    pub fn f(&self) -> &CacheExp {
        &self.f
    }

    pub fn discriminant_order_p(&self) -> &BigInt {
        &self.discriminant_order_p
    }
}

impl PublicKey {
    pub fn base(&self) -> &ClBase {
        &self.base
    }

    pub fn h(&self) -> &CacheExp {
        &self.h
    }

    /// Re-checks the stored knowledge proof of `log_g h`.
    pub fn verify(&self) -> Result<()> {
        if self.h.base().is_identity() {
            return Err(Error::TrivialKey);
        }
        let proof = self.proof.as_ref().ok_or(Error::FailedVerify)?;
        // u must stay inside the honest-prover window
        let bound = (&self.base.a) * ((BigInt::from(1) << 50) + (BigInt::from(1) << 10));
        if proof.u < BigInt::zero() || proof.u > bound {
            warn!("public key proof response out of range");
            return Err(Error::FailedVerify);
        }
        let k = self.base.public_key_challenge(&proof.t, self.h.base());
        let lhs = self.base.g.exp(&proof.u)?;
        let rhs = proof.t.compose(&self.h.exp(&k)?)?;
        if lhs != rhs {
            warn!("public key proof equation failed");
            return Err(Error::FailedVerify);
        }
        Ok(())
    }
}

/// `ceil(ln|delta_k|/pi) * (isqrt(|delta_k|) + 1) << distribution_distance`
fn sampling_bound(delta_k: &BigInt, distribution_distance: usize) -> BigInt {
    let abs = BigInt::zero() - delta_k;
    let ln_estimate = (abs.bit_length() as f64) * std::f64::consts::LN_2;
    let factor = BigInt::from((ln_estimate / std::f64::consts::PI).ceil() as u64);
    let s_tilde = factor * (crate::math::isqrt(&abs) + BigInt::from(1));
    s_tilde << distribution_distance
}

/// Probable prime `q` with `p*q ≡ 3 (mod 4)` and `Jacobi(p, q) = -1`.
fn generate_prime_q(p: &BigInt, safe_parameter: usize) -> Result<BigInt> {
    let q_bits = safe_parameter - p.bit_length();
    let four = BigInt::from(4);
    // p*q ≡ 3 (mod 4) pins q's residue class
    let target = if fmod(p, &four) == BigInt::from(1) {
        BigInt::from(3)
    } else {
        BigInt::from(1)
    };

    for _ in 0..MAX_RETRY {
        let mut q = BigInt::sample(q_bits);
        q.set_bit(q_bits - 1, true);
        q.set_bit(0, true);
        let r = fmod(&q, &four);
        if r != target {
            // both residues are odd, so the fix keeps q odd
            q = q + fmod(&(&target - &r), &four);
        }
        let mut found = None;
        for _ in 0..PRIME_SCAN {
            if is_probable_prime(&q, MILLER_RABIN_ROUNDS) {
                found = Some(q.clone());
                break;
            }
            q = q + &four;
        }
        let q = match found {
            Some(q) => q,
            None => continue,
        };
        if jacobi(p, &q) == -1 {
            return Ok(q);
        }
    }
    Err(Error::ExceedMaxRetry)
}

/// A prime form above a small split prime `r`, lifted from the maximal
/// order to the order of conductor `p`.
fn lifted_splitting_form(
    p: &BigInt,
    delta_k: &BigInt,
    delta_p: &BigInt,
) -> Result<BQuadraticForm> {
    let mut split = None;
    let mut r = 3u64;
    while r <= 107 {
        let rb = BigInt::from(r);
        if is_probable_prime(&rb, MILLER_RABIN_ROUNDS) && jacobi(delta_k, &rb) == 1 {
            split = Some(rb);
            break;
        }
        r += 2;
    }
    let r = split.ok_or(Error::NoSplittingPrime)?;

    // square root of delta_k mod r by exhaustion (r < 108)
    let residue = fmod(delta_k, &r);
    let mut root = None;
    let mut x = BigInt::zero();
    while x < r {
        if fmod(&(&x * &x), &r) == residue {
            root = Some(x.clone());
            break;
        }
        x = x + BigInt::from(1);
    }
    // jacobi == 1 guarantees a root
    let mut b = root.ok_or(Error::NoSplittingPrime)?;
    // delta_k ≡ 1 (mod 4): any odd b already squares to delta_k mod 4
    if fmod(&b, &BigInt::from(2)).is_zero() {
        b = b + &r;
    }
    let form_k = BQuadraticForm::new_with_discriminant(r.clone(), b, delta_k)?;

    // lift: (a, b) over delta_k -> (a, b*p mod 2a) over delta_p;
    // a is odd and b, p are odd, so the reduced b stays odd
    let two_a = form_k.a().clone() << 1;
    let lifted_b = fmod(&(form_k.b() * p), &two_a);
    BQuadraticForm::new_with_discriminant(form_k.a().clone(), lifted_b, delta_p)
}

pub(crate) fn form_bytes(form: &BQuadraticForm) -> Vec<u8> {
    format!("{},{},{}", form.a(), form.b(), form.c()).into_bytes()
}
