//! Bus message model for mediabridge.
//!
//! This crate provides:
//! - Typed [`Value`]s and the incoming/outgoing message shapes exchanged with
//!   the bus daemon
//! - An argument reader that turns positional call arguments into Rust types
//! - The byte encoding of metadata maps embedded in messages
//! - The [`BusConnection`] seam plus an in-memory [`RecordingBus`]
//!
//! Wire-level (de)serialization is left to the connection implementation;
//! everything here works on already-demarshalled messages.

mod codec;
mod connection;
pub mod message;

pub use codec::{decode_metadata, encode_metadata};
pub use connection::{
    BusConnection, MatchRule, NameOwnerChanged, RecordingBus, BUS_DAEMON_INTERFACE,
    BUS_DAEMON_NAME, BUS_DAEMON_PATH, NAME_OWNER_CHANGED,
};
pub use message::{
    Args, ErrorReply, FromValue, IncomingMessage, MethodCall, OutgoingMessage, ReplyAddress,
    SignalMessage, Value,
};

use thiserror::Error;

/// Errors from bus-level operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BusError {
    #[error("bus connection is closed")]
    Disconnected,
    #[error("argument {position} of {member} must be {expected}")]
    InvalidArgs {
        member: String,
        position: usize,
        expected: &'static str,
    },
    #[error("failed to encode metadata: {0}")]
    Encode(String),
    #[error("failed to decode metadata: {0}")]
    Decode(String),
    #[error("bus name request for {name} failed: {reason}")]
    NameRequest { name: String, reason: String },
}

pub type BusResult<T> = Result<T, BusError>;
