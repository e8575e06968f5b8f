//! The session driver: routes inbound messages by `(peer, type)`, feeds
//! the current handler, advances on completion and reports the single
//! terminal state transition.

use std::collections::HashSet;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use super::message::{Message, MessageType, PeerId};
use super::{State, StateChangedListener};
use crate::errors::{Error, Result};

/// One protocol round. A handler consumes exactly
/// `required_message_count` messages of its type, then yields the next
/// round or terminates the session.
pub trait Handler: Send {
    fn message_type(&self) -> MessageType;
    fn required_message_count(&self) -> u32;
    fn is_handled(&self, id: &PeerId) -> bool;
    fn handle_message(&mut self, msg: Message) -> Result<()>;
    fn finalize(self: Box<Self>) -> Result<Option<Box<dyn Handler>>>;
}

pub struct MsgMain {
    peers: HashSet<PeerId>,
    receiver: UnboundedReceiver<Message>,
    listener: Box<dyn StateChangedListener>,
}

impl MsgMain {
    pub fn new(
        peers: Vec<PeerId>,
        receiver: UnboundedReceiver<Message>,
        listener: Box<dyn StateChangedListener>,
    ) -> Self {
        Self {
            peers: peers.into_iter().collect(),
            receiver,
            listener,
        }
    }

    /// Drives handlers until the chain completes or a handler fails; the
    /// listener observes exactly one state change.
    pub async fn run(mut self, first: Box<dyn Handler>) -> Result<()> {
        match self.process(first).await {
            Ok(()) => {
                info!("session finished");
                self.listener.on_state_changed(State::Init, State::Done);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "session failed");
                self.listener.on_state_changed(State::Init, State::Failed);
                Err(e)
            }
        }
    }

    async fn process(&mut self, first: Box<dyn Handler>) -> Result<()> {
        let mut handler = first;
        let mut handled: u32 = 0;
        // each (peer, type) is accepted exactly once per session
        let mut seen: HashSet<(PeerId, MessageType)> = HashSet::new();
        // messages for rounds not yet reached
        let mut pending: Vec<Message> = Vec::new();

        loop {
            // replay buffered messages addressed to the current round
            let mut replays = Vec::new();
            let mut rest = Vec::new();
            for msg in pending.drain(..) {
                if msg.msg_type == handler.message_type() {
                    replays.push(msg);
                } else {
                    rest.push(msg);
                }
            }
            pending = rest;

            let mut advanced = false;
            for msg in replays {
                if self.deliver(handler.as_mut(), msg, &mut handled)? {
                    match handler.finalize()? {
                        Some(next) => {
                            handler = next;
                            handled = 0;
                            advanced = true;
                            break;
                        }
                        None => return Ok(()),
                    }
                }
            }
            if advanced {
                continue;
            }

            let msg = match self.receiver.recv().await {
                Some(msg) => msg,
                // transport torn down before the protocol concluded
                None => return Err(Error::NotReady),
            };
            if !self.peers.contains(&msg.id) {
                return Err(Error::PeerNotFound(msg.id));
            }
            if !seen.insert((msg.id.clone(), msg.msg_type)) {
                return Err(Error::DupMessage(msg.id));
            }

            if msg.msg_type != handler.message_type() {
                pending.push(msg);
                continue;
            }
            if self.deliver(handler.as_mut(), msg, &mut handled)? {
                match handler.finalize()? {
                    Some(next) => {
                        handler = next;
                        handled = 0;
                    }
                    None => return Ok(()),
                }
            }
        }
    }

    /// Feeds one message; true when the round has everything it needs.
    fn deliver(
        &self,
        handler: &mut dyn Handler,
        msg: Message,
        handled: &mut u32,
    ) -> Result<bool> {
        if handler.is_handled(&msg.id) {
            return Err(Error::DupMessage(msg.id));
        }
        handler.handle_message(msg)?;
        *handled += 1;
        Ok(*handled >= handler.required_message_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::message::MessageBody;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::unbounded_channel;

    /// Collects one external payload per peer, then chains into `next`.
    struct Collect {
        msg_type: MessageType,
        want: u32,
        got: Vec<PeerId>,
        sink: Arc<Mutex<Vec<u8>>>,
        next: Option<MessageType>,
    }

    impl Collect {
        fn boxed(
            msg_type: MessageType,
            want: u32,
            sink: Arc<Mutex<Vec<u8>>>,
            next: Option<MessageType>,
        ) -> Box<dyn Handler> {
            Box::new(Self {
                msg_type,
                want,
                got: Vec::new(),
                sink,
                next,
            })
        }
    }

    impl Handler for Collect {
        fn message_type(&self) -> MessageType {
            self.msg_type
        }

        fn required_message_count(&self) -> u32 {
            self.want
        }

        fn is_handled(&self, id: &PeerId) -> bool {
            self.got.iter().any(|p| p == id)
        }

        fn handle_message(&mut self, msg: Message) -> Result<()> {
            if let MessageBody::External(payload) = &msg.body {
                self.sink.lock().unwrap().extend_from_slice(payload);
            }
            self.got.push(msg.id);
            Ok(())
        }

        fn finalize(self: Box<Self>) -> Result<Option<Box<dyn Handler>>> {
            Ok(self
                .next
                .map(|t| Collect::boxed(t, self.want, self.sink.clone(), None)))
        }
    }

    fn listener(done: Arc<AtomicU32>, failed: Arc<AtomicU32>) -> Box<dyn StateChangedListener> {
        Box::new(move |_old: State, new: State| {
            match new {
                State::Done => done.fetch_add(1, Ordering::SeqCst),
                State::Failed => failed.fetch_add(1, Ordering::SeqCst),
                State::Init => 0,
            };
        })
    }

    #[tokio::test]
    async fn two_round_session_completes() {
        let (tx, rx) = unbounded_channel();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicU32::new(0));
        let failed = Arc::new(AtomicU32::new(0));
        let main = MsgMain::new(
            vec!["peer".into()],
            rx,
            listener(done.clone(), failed.clone()),
        );

        // second-round message arrives first and is buffered
        tx.send(Message::external("peer".into(), MessageType::Pubkey, vec![2]))
            .unwrap();
        tx.send(Message::external("peer".into(), MessageType::Initial, vec![1]))
            .unwrap();

        let first = Collect::boxed(
            MessageType::Initial,
            1,
            sink.clone(),
            Some(MessageType::Pubkey),
        );
        main.run(first).await.unwrap();

        assert_eq!(*sink.lock().unwrap(), vec![1, 2]);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_message_fails_session() {
        let (tx, rx) = unbounded_channel();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicU32::new(0));
        let failed = Arc::new(AtomicU32::new(0));
        let main = MsgMain::new(
            vec!["peer".into()],
            rx,
            listener(done.clone(), failed.clone()),
        );

        tx.send(Message::external("peer".into(), MessageType::Pubkey, vec![1]))
            .unwrap();
        tx.send(Message::external("peer".into(), MessageType::Pubkey, vec![1]))
            .unwrap();

        let first = Collect::boxed(MessageType::Initial, 2, sink, None);
        let err = main.run(first).await.unwrap_err();
        assert_eq!(err, Error::DupMessage("peer".into()));
        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_peer_fails_session() {
        let (tx, rx) = unbounded_channel();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicU32::new(0));
        let failed = Arc::new(AtomicU32::new(0));
        let main = MsgMain::new(
            vec!["peer".into()],
            rx,
            listener(done.clone(), failed.clone()),
        );

        tx.send(Message::external(
            "stranger".into(),
            MessageType::Initial,
            vec![],
        ))
        .unwrap();

        let first = Collect::boxed(MessageType::Initial, 1, sink, None);
        let err = main.run(first).await.unwrap_err();
        assert_eq!(err, Error::PeerNotFound("stranger".into()));
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }
}
