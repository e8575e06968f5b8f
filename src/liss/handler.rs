//! The two protocol rounds: exchange salted commitments to the exponent
//! columns, then decommit, cross-check the matrix relation in the
//! exponent and assemble the joint key and share maps.

use std::sync::{Arc, Mutex};

use curv::arithmetic::BitManipulation;
use curv::BigInt;
use rayon::prelude::*;
use tracing::info;

use super::commit::{commit, verify_commitment};
use super::matrix::AccessStructure;
use super::share::{route_rows, sample_coefficients};
use super::{LissResult, UserShare};
use crate::bqf::BQuadraticForm;
use crate::cl::{random_salt, ClBase, Config};
use crate::errors::{Error, Result};
use crate::mpc::{
    BqCommitmentBody, BqDecommitmentBody, ClParams, Decommitment, Handler, Message, MessageBody,
    MessageType, PeerId, Transport,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Role {
    Server,
    User,
}

/// Everything a party derives from its own coefficient column.
pub(super) struct Round0 {
    pub base: ClBase,
    pub exponential: Vec<BQuadraticForm>,
    pub exponential_m: Vec<BQuadraticForm>,
    pub share_values: Vec<BigInt>,
    pub salts: Vec<Vec<u8>>,
}

impl Round0 {
    pub fn generate(base: ClBase, structure: &AccessStructure) -> Result<Self> {
        let bigrange = base.a().bit_length();
        let distance = base.distribution_distance();
        let cols = structure.matrix().num_cols();
        let coefficients = sample_coefficients(cols, bigrange, distance);

        let g = base.g();
        let exponential: Vec<BQuadraticForm> = coefficients
            .par_iter()
            .map(|v| g.exp(v))
            .collect::<Result<_>>()?;
        let share_values = structure.matrix().mul_vector(&coefficients)?;
        let exponential_m: Vec<BQuadraticForm> = share_values
            .par_iter()
            .map(|v| g.exp(v))
            .collect::<Result<_>>()?;
        let salts: Vec<Vec<u8>> = (0..cols).map(|_| random_salt()).collect();

        Ok(Self {
            base,
            exponential,
            exponential_m,
            share_values,
            salts,
        })
    }

    pub fn commitment_body(&self, with_params: bool) -> BqCommitmentBody {
        let cl_params = with_params.then(|| ClParams {
            p: self.base.p().clone(),
            q: self.base.q().clone(),
            g: self.base.g().base().clone(),
        });
        let commitments = self
            .exponential
            .iter()
            .zip(&self.salts)
            .map(|(form, salt)| commit(form, salt))
            .collect();
        BqCommitmentBody {
            cl_params,
            commitments,
        }
    }

    pub fn decommitment_body(&self) -> BqDecommitmentBody {
        BqDecommitmentBody {
            exp_m: self.exponential_m.clone(),
            decommitments: self
                .exponential
                .iter()
                .zip(&self.salts)
                .map(|(form, salt)| Decommitment {
                    salt: salt.clone(),
                    bqform: form.clone(),
                })
                .collect(),
        }
    }
}

pub(super) struct CommitmentHandler {
    pub role: Role,
    pub self_id: PeerId,
    pub peer_id: PeerId,
    pub transport: Arc<dyn Transport>,
    pub structure: AccessStructure,
    pub cl_config: Config,
    /// the server fills this up front, the user on the peer's message
    pub round0: Option<Round0>,
    pub peer_commitments: Option<Vec<Vec<u8>>>,
    pub result: Arc<Mutex<Option<LissResult>>>,
}

impl Handler for CommitmentHandler {
    fn message_type(&self) -> MessageType {
        MessageType::BqCommitment
    }

    fn required_message_count(&self) -> u32 {
        1
    }

    fn is_handled(&self, _id: &PeerId) -> bool {
        self.peer_commitments.is_some()
    }

    fn handle_message(&mut self, msg: Message) -> Result<()> {
        let body = match msg.body {
            MessageBody::BqCommitment(body) => body,
            _ => return Err(Error::InvalidMessage),
        };

        if self.role == Role::User {
            // rebuild the server's algebraic setting before answering
            let params = body.cl_params.as_ref().ok_or(Error::InvalidMessage)?;
            if params.p != self.cl_config.p {
                return Err(Error::InvalidSeed);
            }
            let base = ClBase::from_parameters(
                params.p.clone(),
                params.q.clone(),
                params.g.clone(),
                self.cl_config.c.clone(),
                self.cl_config.d,
                self.cl_config.distribution_distance,
            )?;
            let round0 = Round0::generate(base, &self.structure)?;
            self.transport.must_send(
                &self.peer_id,
                &Message::bq_commitment(self.self_id.clone(), round0.commitment_body(false)),
            );
            self.round0 = Some(round0);
        }

        if body.commitments.len() != self.structure.matrix().num_cols() {
            return Err(Error::DifferentLength);
        }
        self.peer_commitments = Some(body.commitments);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Option<Box<dyn Handler>>> {
        let round0 = self.round0.ok_or(Error::NotReady)?;
        let peer_commitments = self.peer_commitments.ok_or(Error::NotReady)?;

        self.transport.must_send(
            &self.peer_id,
            &Message::bq_decommitment(self.self_id.clone(), round0.decommitment_body()),
        );
        info!(role = ?self.role, "commitments exchanged, decommitment sent");

        Ok(Some(Box::new(DecommitmentHandler {
            self_id: self.self_id,
            peer_id: self.peer_id,
            structure: self.structure,
            round0,
            peer_commitments,
            result: self.result,
            done: false,
        })))
    }
}

pub(super) struct DecommitmentHandler {
    #[allow(dead_code)]
    self_id: PeerId,
    #[allow(dead_code)]
    peer_id: PeerId,
    structure: AccessStructure,
    round0: Round0,
    peer_commitments: Vec<Vec<u8>>,
    result: Arc<Mutex<Option<LissResult>>>,
    done: bool,
}

impl Handler for DecommitmentHandler {
    fn message_type(&self) -> MessageType {
        MessageType::BqDecommitment
    }

    fn required_message_count(&self) -> u32 {
        1
    }

    fn is_handled(&self, _id: &PeerId) -> bool {
        self.done
    }

    fn handle_message(&mut self, msg: Message) -> Result<()> {
        let body = match msg.body {
            MessageBody::BqDecommitment(body) => body,
            _ => return Err(Error::InvalidMessage),
        };
        let num_cols = self.structure.matrix().num_cols();
        let num_rows = self.structure.matrix().num_rows();
        if body.decommitments.len() != num_cols || body.exp_m.len() != num_rows {
            return Err(Error::DifferentLength);
        }

        for (decommitment, digest) in body.decommitments.iter().zip(&self.peer_commitments) {
            if !verify_commitment(&decommitment.bqform, &decommitment.salt, digest) {
                return Err(Error::DifferentDigest);
            }
        }

        // column-wise and row-wise joint exponentials
        let sum_exponential: Vec<BQuadraticForm> = self
            .round0
            .exponential
            .iter()
            .zip(&body.decommitments)
            .map(|(own, peer)| own.compose(&peer.bqform))
            .collect::<Result<_>>()?;
        let sum_exponential_m: Vec<BQuadraticForm> = self
            .round0
            .exponential_m
            .iter()
            .zip(&body.exp_m)
            .map(|(own, peer)| own.compose(peer))
            .collect::<Result<_>>()?;

        // the claimed rows must equal the matrix applied to the columns
        let computed: Vec<BQuadraticForm> = (0..num_rows)
            .into_par_iter()
            .map(|k| {
                let mut acc: Option<BQuadraticForm> = None;
                for (col, entry) in self.structure.matrix().row(k) {
                    let term = sum_exponential[col].exp(entry)?;
                    acc = Some(match acc {
                        None => term,
                        Some(prev) => prev.compose(&term)?,
                    });
                }
                acc.ok_or(Error::EmptySlice)
            })
            .collect::<Result<_>>()?;
        for (lhs, rhs) in computed.iter().zip(&sum_exponential_m) {
            if lhs != rhs {
                return Err(Error::FailedVerify);
            }
        }

        let public_key = self
            .round0
            .base
            .generate_public_key(sum_exponential[0].clone())?;

        let user_shares: Vec<UserShare> = sum_exponential_m
            .iter()
            .zip(&self.round0.share_values)
            .map(|(bq, share)| UserShare {
                bq: bq.clone(),
                share: share.clone(),
            })
            .collect();
        let users = route_rows(&self.structure, &user_shares);

        *self.result.lock().expect("result slot poisoned") = Some(LissResult {
            public_key,
            users,
        });
        self.done = true;
        info!("joint key established, shares routed");
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Option<Box<dyn Handler>>> {
        if !self.done {
            return Err(Error::NotReady);
        }
        Ok(None)
    }
}
