//! Combining LISS approvals and partial-signature ciphertexts into a
//! single ECDSA `s`.
//!
//! Each signing party contributes a consistency proof whose ciphertext
//! encrypts its partial `s_i` against the shared nonce point `R`. Each
//! approving user raises the composed `c1` to its share; the access
//! structure makes the share combination reconstruct the joint CL secret
//! in the exponent, so the masked `c2` product decrypts to `sum s_i`.

use std::collections::BTreeMap;

use curv::elliptic::curves::{Curve, Point, Scalar};
use curv::BigInt;
use tracing::info;

use crate::bqf::BQuadraticForm;
use crate::cl::{ConsistencyProofMessage, PublicKey};
use crate::errors::{Error, Result};
use crate::liss::{share_key, AccessStructure, GroupConfig};

fn verify_proof_set<C: Curve>(
    public_key: &PublicKey,
    r: &BigInt,
    proofs: &[ConsistencyProofMessage<C>],
) -> Result<()> {
    if proofs.is_empty() {
        return Err(Error::EmptySlice);
    }
    for proof in proofs {
        public_key.verify_consistency_proof(proof)?;
        if proof.r_point.is_zero() {
            return Err(Error::FailedVerify);
        }
        let x = proof.r_point.x_coord().ok_or(Error::FailedVerify)?;
        if &x != r {
            return Err(Error::FailedVerify);
        }
    }
    Ok(())
}

/// `s·R = m·G + r·Q`, the verification equation for `(r, s)` on message
/// `m` under public key `Q` with nonce point `R`.
fn ecdsa_equation_holds<C: Curve>(
    r_point: &Point<C>,
    ec_pubkey: &Point<C>,
    message: &BigInt,
    r: &BigInt,
    s: &BigInt,
) -> bool {
    let lhs = r_point * &Scalar::<C>::from_bigint(s);
    let rhs = &(Point::<C>::generator() * &Scalar::<C>::from_bigint(message))
        + &(ec_pubkey * &Scalar::<C>::from_bigint(r));
    lhs == rhs
}

/// An approving user: verifies the signing parties' proofs, then raises
/// the composed randomness to each of its shares.
pub struct User<C: Curve> {
    public_key: PublicKey,
    ec_pubkey: Point<C>,
    r: BigInt,
    message: BigInt,
    proofs: Vec<ConsistencyProofMessage<C>>,
    shares: BTreeMap<String, BigInt>,
}

impl<C: Curve> User<C> {
    pub fn new(
        public_key: PublicKey,
        ec_pubkey: Point<C>,
        r: BigInt,
        message: BigInt,
        proofs: Vec<ConsistencyProofMessage<C>>,
        shares: BTreeMap<String, BigInt>,
    ) -> Result<Self> {
        verify_proof_set(&public_key, &r, &proofs)?;
        if shares.is_empty() {
            return Err(Error::EmptySlice);
        }
        Ok(Self {
            public_key,
            ec_pubkey,
            r,
            message,
            proofs,
            shares,
        })
    }

    /// `combination-key -> c1^share` over the composed `c1`.
    pub fn approve(&self) -> Result<BTreeMap<String, BQuadraticForm>> {
        let mut c1: Option<BQuadraticForm> = None;
        for proof in &self.proofs {
            c1 = Some(match c1 {
                None => proof.ciphertext.c1.clone(),
                Some(acc) => acc.compose(&proof.ciphertext.c1)?,
            });
        }
        let c1 = c1.ok_or(Error::EmptySlice)?;
        self.shares
            .iter()
            .map(|(key, share)| Ok((key.clone(), c1.exp(share)?)))
            .collect()
    }

    pub fn message(&self) -> &BigInt {
        &self.message
    }

    pub fn ec_public_key(&self) -> &Point<C> {
        &self.ec_pubkey
    }

    pub fn cl_public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

/// Collects per-user approvals until every group clears its threshold,
/// then reconstructs `s`.
pub struct Aggregator<C: Curve> {
    configs: Vec<GroupConfig>,
    structure: AccessStructure,
    ec_pubkey: Point<C>,
    cl_pubkey: PublicKey,
    r: BigInt,
    message: BigInt,
    proofs: Vec<ConsistencyProofMessage<C>>,
    approvals: Vec<Vec<Option<BTreeMap<String, BQuadraticForm>>>>,
}

impl<C: Curve> Aggregator<C> {
    pub fn new(
        configs: &[GroupConfig],
        ec_pubkey: Point<C>,
        cl_pubkey: PublicKey,
        r: BigInt,
        message: BigInt,
        proofs: Vec<ConsistencyProofMessage<C>>,
    ) -> Result<Self> {
        let structure = AccessStructure::build(configs)?;
        verify_proof_set(&cl_pubkey, &r, &proofs)?;
        let approvals = configs.iter().map(|c| vec![None; c.users]).collect();
        Ok(Self {
            configs: configs.to_vec(),
            structure,
            ec_pubkey,
            cl_pubkey,
            r,
            message,
            proofs,
            approvals,
        })
    }

    /// Stores one user's approval map. Rejects double approvals and maps
    /// missing any combination key the user participates in.
    pub fn add(
        &mut self,
        group: usize,
        user: usize,
        approval: BTreeMap<String, BQuadraticForm>,
    ) -> Result<()> {
        let config = self
            .configs
            .get(group)
            .ok_or_else(|| Error::WrongInput(format!("no group {}", group)))?;
        if user >= config.users {
            return Err(Error::WrongInput(format!(
                "no user {} in group {}",
                user, group
            )));
        }
        if self.approvals[group][user].is_some() {
            return Err(Error::DupMessage(format!("{}/{}", group, user)));
        }
        for key in self.structure.keys_for_user(group, user) {
            if !approval.contains_key(&key) {
                return Err(Error::WrongInput(format!("approval misses key {}", key)));
            }
        }
        self.approvals[group][user] = Some(approval);
        Ok(())
    }

    /// True once every group has at least `threshold` approvals.
    pub fn is_enough(&self) -> bool {
        self.configs.iter().enumerate().all(|(g, config)| {
            let have = self.approvals[g].iter().filter(|a| a.is_some()).count();
            have >= config.threshold
        })
    }

    /// Reconstructs the ECDSA `s` from the first `threshold` approvers of
    /// each group.
    pub fn get_s(&self) -> Result<BigInt> {
        if !self.is_enough() {
            return Err(Error::NotReady);
        }

        let mut c1: Option<BQuadraticForm> = None;
        for (g, config) in self.configs.iter().enumerate() {
            let approvers: Vec<usize> = self.approvals[g]
                .iter()
                .enumerate()
                .filter_map(|(u, a)| a.as_ref().map(|_| u))
                .take(config.threshold)
                .collect();
            let key = share_key(&approvers);

            // within the group: first approver positive, the rest inverted
            let mut group_c1: Option<BQuadraticForm> = None;
            for &user in &approvers {
                let approval = self.approvals[g][user]
                    .as_ref()
                    .ok_or(Error::NotReady)?;
                let part = approval
                    .get(&key)
                    .ok_or_else(|| Error::WrongInput(format!("approval misses key {}", key)))?;
                group_c1 = Some(match group_c1 {
                    None => part.clone(),
                    Some(acc) => acc.compose(&part.inverse())?,
                });
            }
            let group_c1 = group_c1.ok_or(Error::EmptySlice)?;

            // across groups: group 0 positive, the rest inverted
            c1 = Some(match c1 {
                None => group_c1,
                Some(acc) => acc.compose(&group_c1.inverse())?,
            });
        }
        let c1 = c1.ok_or(Error::EmptySlice)?;

        let mut c2: Option<BQuadraticForm> = None;
        for proof in &self.proofs {
            c2 = Some(match c2 {
                None => proof.ciphertext.c2.clone(),
                Some(acc) => acc.compose(&proof.ciphertext.c2)?,
            });
        }
        let c2 = c2.ok_or(Error::EmptySlice)?;

        let masked = c2.compose(&c1.inverse())?;
        let s = self.cl_pubkey.base().solve(&masked)?;
        info!("signature share reconstruction complete");
        Ok(s)
    }

    /// Checks `(r, s)` against the stored message and EC public key.
    pub fn verify_signature(&self, s: &BigInt) -> Result<()> {
        let r_point = &self.proofs[0].r_point;
        if ecdsa_equation_holds(r_point, &self.ec_pubkey, &self.message, &self.r, s) {
            Ok(())
        } else {
            Err(Error::InconsistentResults)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cl::encrypt::tests::secp256k1_order;
    use crate::liss::tests::{run_session, two_groups};
    use crate::math::{fmod, mod_inv_prime};
    use curv::arithmetic::Converter;
    use curv::elliptic::curves::Secp256k1;

    fn scalar(n: &BigInt) -> Scalar<Secp256k1> {
        Scalar::from_bigint(n)
    }

    #[test]
    fn ecdsa_equation() {
        let n = secp256k1_order();
        let k = BigInt::from(7);
        let priv_key = BigInt::from(101);
        let message = BigInt::from(11231);
        let r_point: Point<Secp256k1> = Point::generator() * &scalar(&k);
        let r = fmod(&r_point.x_coord().unwrap(), &n);
        let ec_pubkey: Point<Secp256k1> = Point::generator() * &scalar(&priv_key);
        let s = fmod(
            &(mod_inv_prime(&k, &n).unwrap() * (&message + &r * &priv_key)),
            &n,
        );
        assert!(ecdsa_equation_holds(&r_point, &ec_pubkey, &message, &r, &s));
        assert!(!ecdsa_equation_holds(
            &r_point,
            &ec_pubkey,
            &message,
            &r,
            &(&s + BigInt::from(1))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn aggregator_round_trip() {
        let (server_result, user_result) = run_session().await;
        let pk = server_result.public_key.clone();
        let n = secp256k1_order();

        let k = BigInt::from(1100019879798798u64);
        let priv_key = BigInt::from(101);
        let message = BigInt::from(11231);
        let r_point: Point<Secp256k1> = Point::generator() * &scalar(&k);
        let r = r_point.x_coord().unwrap();
        let ec_pubkey: Point<Secp256k1> = Point::generator() * &scalar(&priv_key);

        let s1 = BigInt::from(298374927u64);
        let s2 = BigInt::from_str_radix(
            "19648591900156574905646002538671153035796200247616928483347707833477501056209",
            10,
        )
        .unwrap();
        let proofs = vec![
            pk.build_consistency_proof(&s1, &r_point).unwrap(),
            pk.build_consistency_proof(&s2, &r_point).unwrap(),
        ];

        let mut aggregator = Aggregator::new(
            &two_groups(),
            ec_pubkey.clone(),
            pk.clone(),
            r.clone(),
            message.clone(),
            proofs.clone(),
        )
        .unwrap();
        assert!(!aggregator.is_enough());
        assert_eq!(aggregator.get_s().unwrap_err(), Error::NotReady);

        for group in 0..2 {
            for user_idx in 0..3 {
                // the approving user holds the sum of both parties' shares
                let mut total = BTreeMap::new();
                for (key, server_share) in &server_result.users[group][user_idx] {
                    let user_share = &user_result.users[group][user_idx][key];
                    total.insert(key.clone(), &server_share.share + &user_share.share);
                }
                let user = User::new(
                    pk.clone(),
                    ec_pubkey.clone(),
                    r.clone(),
                    message.clone(),
                    proofs.clone(),
                    total,
                )
                .unwrap();
                let approval = user.approve().unwrap();
                aggregator.add(group, user_idx, approval.clone()).unwrap();

                // double approval is rejected
                assert_eq!(
                    aggregator.add(group, user_idx, approval).unwrap_err(),
                    Error::DupMessage(format!("{}/{}", group, user_idx))
                );
            }
        }

        assert!(aggregator.is_enough());
        let s = aggregator.get_s().unwrap();
        assert_eq!(s, fmod(&(&s1 + &s2), &n));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn incomplete_approval_rejected() {
        let (server_result, user_result) = run_session().await;
        let pk = server_result.public_key.clone();

        let k = BigInt::from(31337);
        let r_point: Point<Secp256k1> = Point::generator() * &scalar(&k);
        let r = r_point.x_coord().unwrap();
        let ec_pubkey: Point<Secp256k1> = Point::generator() * &scalar(&BigInt::from(101));
        let proofs = vec![pk.build_consistency_proof(&BigInt::from(5), &r_point).unwrap()];

        let mut aggregator = Aggregator::new(
            &two_groups(),
            ec_pubkey.clone(),
            pk.clone(),
            r.clone(),
            BigInt::from(1),
            proofs.clone(),
        )
        .unwrap();

        let mut total = BTreeMap::new();
        for (key, server_share) in &server_result.users[0][0] {
            let user_share = &user_result.users[0][0][key];
            total.insert(key.clone(), &server_share.share + &user_share.share);
        }
        let user = User::new(
            pk.clone(),
            ec_pubkey,
            r,
            BigInt::from(1),
            proofs,
            total,
        )
        .unwrap();
        let mut approval = user.approve().unwrap();
        approval.remove("0,1");
        assert!(matches!(
            aggregator.add(0, 0, approval).unwrap_err(),
            Error::WrongInput(_)
        ));
    }
}
