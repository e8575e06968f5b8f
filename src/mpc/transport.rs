use std::collections::BTreeMap;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::error;

use super::message::{Message, PeerId};

/// Peer-facing side of the session. `must_send` queues and never blocks
/// the calling handler; implementations are internally thread-safe.
pub trait Transport: Send + Sync {
    fn self_id(&self) -> PeerId;
    fn peer_ids(&self) -> Vec<PeerId>;
    fn num_peers(&self) -> u32;
    fn must_send(&self, id: &PeerId, msg: &Message);
}

/// In-memory transport wiring sessions together through unbounded
/// channels; the test and demo counterpart of a network transport.
pub struct ChannelTransport {
    self_id: PeerId,
    peers: BTreeMap<PeerId, UnboundedSender<Message>>,
}

impl ChannelTransport {
    /// Builds the two endpoints of a two-party session, returning each
    /// side's transport and inbound receiver.
    #[allow(clippy::type_complexity)]
    pub fn pair(
        a: &str,
        b: &str,
    ) -> (
        (Self, UnboundedReceiver<Message>),
        (Self, UnboundedReceiver<Message>),
    ) {
        let (to_a, from_peers_a) = unbounded_channel();
        let (to_b, from_peers_b) = unbounded_channel();
        let transport_a = Self {
            self_id: a.to_string(),
            peers: BTreeMap::from([(b.to_string(), to_b)]),
        };
        let transport_b = Self {
            self_id: b.to_string(),
            peers: BTreeMap::from([(a.to_string(), to_a)]),
        };
        ((transport_a, from_peers_a), (transport_b, from_peers_b))
    }
}

impl Transport for ChannelTransport {
    fn self_id(&self) -> PeerId {
        self.self_id.clone()
    }

    fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    fn num_peers(&self) -> u32 {
        self.peers.len() as u32
    }

    fn must_send(&self, id: &PeerId, msg: &Message) {
        match self.peers.get(id) {
            Some(sender) => {
                if sender.send(msg.clone()).is_err() {
                    error!(peer = %id, "peer channel closed, message dropped");
                }
            }
            None => error!(peer = %id, "unknown peer, message dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::message::MessageType;

    #[tokio::test]
    async fn pair_delivers_both_ways() {
        let ((ta, mut ra), (tb, mut rb)) = ChannelTransport::pair("server", "user");
        assert_eq!(ta.self_id(), "server");
        assert_eq!(ta.peer_ids(), vec!["user".to_string()]);
        assert_eq!(tb.num_peers(), 1);

        ta.must_send(
            &"user".to_string(),
            &Message::external("server".into(), MessageType::Initial, vec![1]),
        );
        tb.must_send(
            &"server".to_string(),
            &Message::external("user".into(), MessageType::Initial, vec![2]),
        );

        let got = rb.recv().await.unwrap();
        assert_eq!(got.id, "server");
        let got = ra.recv().await.unwrap();
        assert_eq!(got.id, "user");
    }
}
