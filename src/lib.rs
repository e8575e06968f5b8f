//! Threshold-cryptography toolkit built around Linear Integer Secret
//! Sharing over ideal class groups.
//!
//! The layers, leaves first: arbitrary-precision number theory
//! ([`math`]), binary quadratic forms with NUCOMP composition ([`bqf`]),
//! the Castagnos–Laguillaumie linearly homomorphic scheme ([`cl`]), the
//! message-passing session machinery ([`mpc`]), the two-party LISS
//! share-generation protocol ([`liss`]) and the approval/aggregation
//! layer reconstructing an ECDSA `s` ([`aggregator`]).

pub mod aggregator;
pub mod bqf;
pub mod cl;
pub mod errors;
pub mod field;
pub mod liss;
pub mod math;
pub mod mpc;

pub use errors::{Error, Result};
