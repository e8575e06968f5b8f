//! Wire envelope shared by this crate's LISS rounds and the collaborator
//! protocols that ride the same session loop.

use curv::BigInt;
use serde::{Deserialize, Serialize};

use crate::bqf::BQuadraticForm;

pub type PeerId = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    BqCommitment,
    BqDecommitment,
    // collaborator (ECDSA keygen/signing) tags, routed but never built here
    Initial,
    Pubkey,
    EncK,
    Mta,
    Delta,
    ProofAi,
    CommitViAi,
    DecommitViAi,
    CommitUiTi,
    DecommitUiTi,
    Si,
}

/// CL base parameters the server ships with its commitment so the user
/// can rebuild the discriminant before replying.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClParams {
    pub p: BigInt,
    pub q: BigInt,
    pub g: BQuadraticForm,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BqCommitmentBody {
    pub cl_params: Option<ClParams>,
    pub commitments: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decommitment {
    pub salt: Vec<u8>,
    pub bqform: BQuadraticForm,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BqDecommitmentBody {
    pub exp_m: Vec<BQuadraticForm>,
    pub decommitments: Vec<Decommitment>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MessageBody {
    BqCommitment(BqCommitmentBody),
    BqDecommitment(BqDecommitmentBody),
    /// opaque payload of a collaborator protocol message
    External(Vec<u8>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: PeerId,
    pub msg_type: MessageType,
    pub body: MessageBody,
}

impl Message {
    pub fn bq_commitment(id: PeerId, body: BqCommitmentBody) -> Self {
        Self {
            id,
            msg_type: MessageType::BqCommitment,
            body: MessageBody::BqCommitment(body),
        }
    }

    pub fn bq_decommitment(id: PeerId, body: BqDecommitmentBody) -> Self {
        Self {
            id,
            msg_type: MessageType::BqDecommitment,
            body: MessageBody::BqDecommitment(body),
        }
    }

    pub fn external(id: PeerId, msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            id,
            msg_type,
            body: MessageBody::External(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serde_round_trip() {
        let form = BQuadraticForm::new(BigInt::from(2), BigInt::from(1), BigInt::from(3)).unwrap();
        let msg = Message::bq_decommitment(
            "server".into(),
            BqDecommitmentBody {
                exp_m: vec![form.clone()],
                decommitments: vec![Decommitment {
                    salt: vec![7; 32],
                    bqform: form,
                }],
            },
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "server");
        assert_eq!(back.msg_type, MessageType::BqDecommitment);
        match back.body {
            MessageBody::BqDecommitment(body) => {
                assert_eq!(body.exp_m.len(), 1);
                assert_eq!(body.decommitments[0].salt, vec![7; 32]);
            }
            _ => panic!("wrong body"),
        }
    }
}
