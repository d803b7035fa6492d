//! subscope_session
//!
//! The orchestration layer: a [`Session`] owns the control-plane pieces from
//! `subscope_core`, wires broker traffic into the message store through the
//! bounded ingestion pipeline, and executes commands produced by the
//! single-line interpreter in [`command`].

pub mod command;
mod ingest;
pub mod session;

pub use command::{Command, CommandError, parse};
pub use session::{ConnectionProfile, Session};

#[cfg(test)]
mod tests;
