//! Proof that a CL ciphertext encrypts the same scalar that links two EC
//! points: given `R` and `Q = m·R`, the ciphertext decrypts to `m`.

use blake2::Digest;
use curv::arithmetic::{Converter, Samplable, Zero};
use curv::elliptic::curves::{Curve, Point, Scalar};
use curv::BigInt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{form_bytes, random_salt, Blake2b256, Ciphertext, PublicKey};
use crate::bqf::BQuadraticForm;
use crate::errors::{Error, Result};
use crate::math::fmod;

/// Everything a verifier needs: the ciphertext, the CL-side transcript and
/// the EC-side binding points.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ConsistencyProofMessage<C: Curve> {
    pub ciphertext: Ciphertext,
    pub salt: Vec<u8>,
    pub u1: BigInt,
    pub u2: BigInt,
    pub t1: BQuadraticForm,
    pub t2: BQuadraticForm,
    /// `r2·R`
    pub t_point: Point<C>,
    /// `m·R`
    pub q_point: Point<C>,
    /// the nonce point the scalar binds to
    pub r_point: Point<C>,
}

impl PublicKey {
    /// Encrypts `m` and proves that the ciphertext and `Q = m·R` carry the
    /// same scalar.
    pub fn build_consistency_proof<C: Curve>(
        &self,
        m: &BigInt,
        r_point: &Point<C>,
    ) -> Result<ConsistencyProofMessage<C>> {
        let base = self.base();
        if base.p() != Scalar::<C>::group_order() {
            return Err(Error::WrongInput(
                "message space differs from the curve order".into(),
            ));
        }
        if *m < BigInt::zero() || m >= base.p() {
            return Err(Error::NotInRange);
        }
        if r_point.is_zero() {
            return Err(Error::WrongInput("nonce point is the identity".into()));
        }

        let r = BigInt::sample_below(base.a());
        let c1 = base.g().exp(&r)?;
        let c2 = base.f().exp(m)?.compose(&self.h().exp(&r)?)?;
        let q_point = r_point * &Scalar::<C>::from_bigint(m);

        let r1_bound = (base.a() * base.challenge_bound()) << base.distribution_parameter();
        let r1 = BigInt::sample_below(&r1_bound);
        let r2 = BigInt::sample_below(base.p());
        let t1 = base.g().exp(&r1)?;
        let t2 = self.h().exp(&r1)?.compose(&base.f().exp(&r2)?)?;
        let t_point = r_point * &Scalar::<C>::from_bigint(&r2);
        let salt = random_salt();

        let k = self.consistency_challenge(&salt, &t1, &t2, &t_point, &q_point, r_point);
        let u1 = &r1 + &k * &r;
        let u2 = fmod(&(&r2 + &k * m), base.p());

        Ok(ConsistencyProofMessage {
            ciphertext: Ciphertext { c1, c2, proof: None },
            salt,
            u1,
            u2,
            t1,
            t2,
            t_point,
            q_point,
            r_point: r_point.clone(),
        })
    }

    pub fn verify_consistency_proof<C: Curve>(
        &self,
        msg: &ConsistencyProofMessage<C>,
    ) -> Result<()> {
        let base = self.base();
        if base.p() != Scalar::<C>::group_order() {
            return Err(Error::WrongInput(
                "message space differs from the curve order".into(),
            ));
        }
        if msg.r_point.is_zero() {
            return Err(Error::FailedVerify);
        }
        let u1_bound = (base.a() * base.challenge_bound())
            * ((BigInt::from(1) << base.distribution_parameter()) + BigInt::from(1));
        if msg.u1 < BigInt::zero() || msg.u1 > u1_bound {
            return Err(Error::InvalidMessage);
        }
        if msg.u2 < BigInt::zero() || msg.u2 >= *base.p() {
            return Err(Error::InvalidMessage);
        }

        let k = self.consistency_challenge(
            &msg.salt,
            &msg.t1,
            &msg.t2,
            &msg.t_point,
            &msg.q_point,
            &msg.r_point,
        );

        let lhs1 = base.g().exp(&msg.u1)?;
        let rhs1 = msg.t1.compose(&msg.ciphertext.c1.exp(&k)?)?;
        if lhs1 != rhs1 {
            warn!("consistency proof: randomness equation failed");
            return Err(Error::DifferentBQForms);
        }
        let lhs2 = self
            .h()
            .exp(&msg.u1)?
            .compose(&base.f().exp(&msg.u2)?)?;
        let rhs2 = msg.t2.compose(&msg.ciphertext.c2.exp(&k)?)?;
        if lhs2 != rhs2 {
            warn!("consistency proof: message equation failed");
            return Err(Error::DifferentBQForms);
        }

        // EC side: T + k·Q = u2·R
        let k_scalar = Scalar::<C>::from_bigint(&k);
        let lhs = &msg.t_point + &(&msg.q_point * &k_scalar);
        let rhs = &msg.r_point * &Scalar::<C>::from_bigint(&msg.u2);
        if lhs != rhs {
            warn!("consistency proof: curve equation failed");
            return Err(Error::FailedVerify);
        }
        Ok(())
    }

    fn consistency_challenge<C: Curve>(
        &self,
        salt: &[u8],
        t1: &BQuadraticForm,
        t2: &BQuadraticForm,
        t_point: &Point<C>,
        q_point: &Point<C>,
        r_point: &Point<C>,
    ) -> BigInt {
        let base = self.base();
        let mut hasher = Blake2b256::new();
        hasher.update(salt);
        hasher.update(form_bytes(t1));
        hasher.update(form_bytes(t2));
        hasher.update(form_bytes(base.g().base()));
        hasher.update(form_bytes(base.f().base()));
        hasher.update(form_bytes(self.h().base()));
        hasher.update(base.p().to_bytes());
        hasher.update(t_point.to_bytes(true));
        hasher.update(q_point.to_bytes(true));
        hasher.update(r_point.to_bytes(true));
        hasher.update(base.a().to_bytes());
        hasher.update(base.challenge_bound().to_bytes());
        fmod(
            &BigInt::from_bytes(hasher.finalize().as_slice()),
            base.challenge_bound(),
        )
    }
}
