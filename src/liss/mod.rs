//! Linear Integer Secret Sharing over the class group: two parties jointly
//! derive a CL public key whose secret is additively shared, together with
//! per-user share maps routed through an access-structure matrix.

mod commit;
mod handler;
pub mod matrix;
mod share;

pub use matrix::{share_key, AccessStructure, GroupConfig, SparseMatrix};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use curv::BigInt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::bqf::BQuadraticForm;
use crate::cl::{ClBase, Config, PublicKey};
use crate::errors::{Error, Result};
use crate::mpc::{Handler, Message, MsgMain, PeerId, StateChangedListener, Transport};

use handler::{CommitmentHandler, Role, Round0};

/// One user's slice of the protocol output for one combination: the joint
/// commitment `bq = g^(share_server + share_user)` and this party's own
/// additive share of the exponent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserShare {
    pub bq: BQuadraticForm,
    pub share: BigInt,
}

/// Session output: the joint CL public key and, per group and user, the
/// combination-keyed share map.
#[derive(Clone, Debug)]
pub struct LissResult {
    pub public_key: PublicKey,
    pub users: Vec<Vec<BTreeMap<String, UserShare>>>,
}

/// A two-party share-generation session bound to a transport.
pub struct Liss {
    transport: Arc<dyn Transport>,
    peer_id: PeerId,
    pending: Option<(MsgMain, Box<dyn Handler>, Option<Message>)>,
    result: Arc<Mutex<Option<LissResult>>>,
}

impl Liss {
    /// The server generates the CL parameters and opens the session with
    /// its commitment message.
    pub fn new_server(
        transport: Arc<dyn Transport>,
        receiver: UnboundedReceiver<Message>,
        configs: &[GroupConfig],
        cl_config: Config,
        listener: Box<dyn StateChangedListener>,
    ) -> Result<Self> {
        let structure = AccessStructure::build(configs)?;
        let base = ClBase::setup(cl_config.clone())?;
        let round0 = Round0::generate(base, &structure)?;
        let initial = Message::bq_commitment(transport.self_id(), round0.commitment_body(true));
        Self::assemble(
            transport,
            receiver,
            structure,
            cl_config,
            Role::Server,
            Some(round0),
            Some(initial),
            listener,
        )
    }

    /// The user waits for the server's parameters and answers in kind.
    pub fn new_user(
        transport: Arc<dyn Transport>,
        receiver: UnboundedReceiver<Message>,
        configs: &[GroupConfig],
        cl_config: Config,
        listener: Box<dyn StateChangedListener>,
    ) -> Result<Self> {
        let structure = AccessStructure::build(configs)?;
        Self::assemble(
            transport,
            receiver,
            structure,
            cl_config,
            Role::User,
            None,
            None,
            listener,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        transport: Arc<dyn Transport>,
        receiver: UnboundedReceiver<Message>,
        structure: AccessStructure,
        cl_config: Config,
        role: Role,
        round0: Option<Round0>,
        initial: Option<Message>,
        listener: Box<dyn StateChangedListener>,
    ) -> Result<Self> {
        let peer_id = transport.peer_ids().into_iter().next().ok_or(Error::EmptySlice)?;
        let result = Arc::new(Mutex::new(None));
        let first: Box<dyn Handler> = Box::new(CommitmentHandler {
            role,
            self_id: transport.self_id(),
            peer_id: peer_id.clone(),
            transport: transport.clone(),
            structure,
            cl_config,
            round0,
            peer_commitments: None,
            result: result.clone(),
        });
        let main = MsgMain::new(transport.peer_ids(), receiver, listener);
        Ok(Self {
            transport,
            peer_id,
            pending: Some((main, first, initial)),
            result,
        })
    }

    /// Runs the session to a terminal state. Consuming the prepared state
    /// twice is `NotReady`.
    pub async fn start(&mut self) -> Result<()> {
        let (main, first, initial) = self.pending.take().ok_or(Error::NotReady)?;
        if let Some(msg) = initial {
            self.transport.must_send(&self.peer_id, &msg);
        }
        main.run(first).await
    }

    pub fn get_result(&self) -> Result<LissResult> {
        self.result
            .lock()
            .expect("result slot poisoned")
            .clone()
            .ok_or(Error::NotReady)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cl::encrypt::tests::secp256k1_order;
    use crate::mpc::{ChannelTransport, State};
    use std::sync::atomic::{AtomicU32, Ordering};

    pub(crate) fn test_cl_config() -> Config {
        Config {
            c: BigInt::from(1024),
            d: 40,
            p: secp256k1_order(),
            safe_parameter: 1348,
            distribution_distance: 40,
        }
    }

    pub(crate) fn two_groups() -> Vec<GroupConfig> {
        vec![
            GroupConfig { users: 3, threshold: 2 },
            GroupConfig { users: 3, threshold: 2 },
        ]
    }

    /// Runs a full server+user session and returns both results.
    pub(crate) async fn run_session() -> (LissResult, LissResult) {
        let ((server_transport, server_rx), (user_transport, user_rx)) =
            ChannelTransport::pair("server", "user");
        let done = Arc::new(AtomicU32::new(0));
        let done_server = done.clone();
        let done_user = done.clone();

        let mut server = Liss::new_server(
            Arc::new(server_transport),
            server_rx,
            &two_groups(),
            test_cl_config(),
            Box::new(move |_: State, new: State| {
                if new == State::Done {
                    done_server.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .unwrap();
        let mut user = Liss::new_user(
            Arc::new(user_transport),
            user_rx,
            &two_groups(),
            test_cl_config(),
            Box::new(move |_: State, new: State| {
                if new == State::Done {
                    done_user.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .unwrap();

        let (server_out, user_out) = tokio::join!(server.start(), user.start());
        server_out.unwrap();
        user_out.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 2);

        (server.get_result().unwrap(), user.get_result().unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_to_end_two_of_three_squared() {
        let (server_result, user_result) = run_session().await;

        // both parties agree on the joint public key
        assert_eq!(
            server_result.public_key.h().base(),
            user_result.public_key.h().base()
        );

        let g = server_result.public_key.base().g().clone();
        for group in 0..2 {
            for user in 0..3 {
                let server_map = &server_result.users[group][user];
                let user_map = &user_result.users[group][user];
                assert_eq!(server_map.len(), 2);
                assert_eq!(
                    server_map.keys().collect::<Vec<_>>(),
                    user_map.keys().collect::<Vec<_>>()
                );
                for (key, server_share) in server_map {
                    let user_share = &user_map[key];
                    // joint commitment matches on both sides
                    assert_eq!(server_share.bq, user_share.bq);
                    // g^(share_server + share_user) = shared bq
                    let sum = &server_share.share + &user_share.share;
                    assert_eq!(g.exp(&sum).unwrap(), server_share.bq);
                }
            }
        }
    }

    #[tokio::test]
    async fn get_result_before_done_is_not_ready() {
        let ((server_transport, server_rx), _user_side) = ChannelTransport::pair("server", "user");
        let server = Liss::new_server(
            Arc::new(server_transport),
            server_rx,
            &two_groups(),
            test_cl_config(),
            Box::new(|_: State, _: State| {}),
        )
        .unwrap();
        assert_eq!(server.get_result().unwrap_err(), Error::NotReady);
    }
}
