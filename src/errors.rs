use thiserror::Error;

/// Crate-wide error taxonomy. Every session-level failure eventually
/// surfaces through one of these; none of them is retryable inside the
/// same session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // input-shape errors
    #[error("wrong input: {0}")]
    WrongInput(String),
    #[error("invalid message")]
    InvalidMessage,
    #[error("empty slice")]
    EmptySlice,
    #[error("value not in the expected range")]
    NotInRange,
    #[error("inputs have different lengths")]
    DifferentLength,

    // cryptographic setup errors
    #[error("expected a probable prime of at least {0} bits")]
    NotBigPrime(usize),
    #[error("safe parameter too small")]
    SmallSafeParameter,
    #[error("no splitting prime found below 108")]
    NoSplittingPrime,
    #[error("failed to generate a non-trivial generator g")]
    FailedGenerateG,
    #[error("trivial public key")]
    TrivialKey,
    #[error("value is less than or equal to 2")]
    LessOrEqualBig2,

    // algebraic errors
    #[error("discriminant is not negative")]
    PositiveDiscriminant,
    #[error("forms have different discriminants")]
    DifferentDiscriminant,
    #[error("matrix is not invertible")]
    NotInvertableMatrix,

    // verification failures
    #[error("verification failed")]
    FailedVerify,
    #[error("binary quadratic forms differ")]
    DifferentBQForms,
    #[error("commitment digest mismatch")]
    DifferentDigest,
    #[error("parties computed inconsistent results")]
    InconsistentResults,
    #[error("exceeded the maximum number of retries")]
    ExceedMaxRetry,

    // mpc session errors
    #[error("peer {0} not found")]
    PeerNotFound(String),
    #[error("duplicate message from peer {0}")]
    DupMessage(String),
    #[error("message is not addressed to this party")]
    NotYours,
    #[error("result is not ready")]
    NotReady,
    #[error("invalid seed")]
    InvalidSeed,
    #[error("peer count does not match the Birkhoff parameters")]
    InconsistentPeerNumAndBks,
    #[error("own Birkhoff parameter not found")]
    SelfBKNotFound,
}

pub type Result<T> = std::result::Result<T, Error>;
