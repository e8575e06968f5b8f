//! Session plumbing: typed message envelope, peer transport and the
//! state-driven message main loop that feeds handlers.

mod main_loop;
mod message;
mod transport;

pub use main_loop::{Handler, MsgMain};
pub use message::{
    BqCommitmentBody, BqDecommitmentBody, ClParams, Decommitment, Message, MessageBody,
    MessageType, PeerId,
};
pub use transport::{ChannelTransport, Transport};

/// Session lifecycle. `Init` moves to exactly one of the terminal states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Init,
    Done,
    Failed,
}

/// Observer for the single `Init -> Done | Failed` transition.
pub trait StateChangedListener: Send {
    fn on_state_changed(&self, old: State, new: State);
}

impl<F> StateChangedListener for F
where
    F: Fn(State, State) + Send,
{
    fn on_state_changed(&self, old: State, new: State) {
        self(old, new)
    }
}
