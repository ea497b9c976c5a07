//! Message shapes exchanged with the bus.

use crate::{BusError, BusResult};
use mediabridge_core::{ExtError, Variant};
use serde::{Deserialize, Serialize};

/// A typed bus value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Struct(Vec<Value>),
    Variant(Box<Value>),
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn string_array<S: AsRef<str>>(values: &[S]) -> Self {
        Value::Array(
            values
                .iter()
                .map(|value| Value::Str(value.as_ref().to_owned()))
                .collect(),
        )
    }

    /// Wraps a property value in a bus variant.
    pub fn variant(value: &Variant) -> Self {
        let inner = match value {
            Variant::Bool(v) => Value::Bool(*v),
            Variant::Int(v) => Value::I32(*v),
            Variant::UInt(v) => Value::U32(*v),
            Variant::Int64(v) => Value::I64(*v),
            Variant::UInt64(v) => Value::U64(*v),
            Variant::Double(v) => Value::F64(*v),
            Variant::Str(v) => Value::Str(v.clone()),
        };
        Value::Variant(Box::new(inner))
    }

    /// Interprets a (possibly variant-wrapped) scalar as a property value.
    pub fn to_variant(&self) -> Option<Variant> {
        match self {
            Value::Variant(inner) => inner.to_variant(),
            Value::Bool(v) => Some(Variant::Bool(*v)),
            Value::I32(v) => Some(Variant::Int(*v)),
            Value::U32(v) => Some(Variant::UInt(*v)),
            Value::I64(v) => Some(Variant::Int64(*v)),
            Value::U64(v) => Some(Variant::UInt64(*v)),
            Value::F64(v) => Some(Variant::Double(*v)),
            Value::Str(v) => Some(Variant::Str(v.clone())),
            Value::Bytes(_) | Value::Array(_) | Value::Struct(_) => None,
        }
    }
}

/// Where a reply to a method call has to go.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyAddress {
    /// Unique bus name of the caller.
    pub sender: String,
    /// Serial of the call being answered.
    pub serial: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub serial: u32,
    pub sender: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

impl MethodCall {
    pub fn reply_address(&self) -> ReplyAddress {
        ReplyAddress {
            sender: self.sender.clone(),
            serial: self.serial,
        }
    }

    pub fn args(&self) -> Args<'_> {
        Args {
            member: &self.member,
            values: &self.args,
            position: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalMessage {
    pub sender: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    MethodCall(MethodCall),
    Signal(SignalMessage),
}

/// Reasons a call is answered with an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorReply {
    /// An error produced by the extension.
    Extension(ExtError),
    UnknownMethod { interface: String, member: String },
    InvalidArgs(String),
}

impl ErrorReply {
    /// Bus error name; extension errors are named
    /// `<prefix>.<domain>.<code>` so clients can rebuild the triple.
    pub fn name(&self, prefix: &str) -> String {
        match self {
            ErrorReply::Extension(err) => {
                format!("{prefix}.{}.{}", sanitize_element(&err.domain), err.code)
            }
            ErrorReply::UnknownMethod { .. } => "org.freedesktop.DBus.Error.UnknownMethod".into(),
            ErrorReply::InvalidArgs(_) => "org.freedesktop.DBus.Error.InvalidArgs".into(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ErrorReply::Extension(err) => err.message.clone(),
            ErrorReply::UnknownMethod { interface, member } => {
                format!("no method {member} on interface {interface}")
            }
            ErrorReply::InvalidArgs(message) => message.clone(),
        }
    }
}

impl From<ExtError> for ErrorReply {
    fn from(err: ExtError) -> Self {
        ErrorReply::Extension(err)
    }
}

impl From<BusError> for ErrorReply {
    fn from(err: BusError) -> Self {
        ErrorReply::InvalidArgs(err.to_string())
    }
}

fn sanitize_element(element: &str) -> String {
    element
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// A message produced by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    Reply {
        to: ReplyAddress,
        args: Vec<Value>,
    },
    Error {
        to: ReplyAddress,
        error: ErrorReply,
    },
    Signal {
        /// `None` broadcasts; `Some` unicasts to one peer.
        destination: Option<String>,
        path: String,
        interface: String,
        member: String,
        args: Vec<Value>,
    },
}

impl OutgoingMessage {
    pub fn reply(to: ReplyAddress, args: Vec<Value>) -> Self {
        OutgoingMessage::Reply { to, args }
    }

    pub fn error(to: ReplyAddress, error: impl Into<ErrorReply>) -> Self {
        OutgoingMessage::Error {
            to,
            error: error.into(),
        }
    }

    pub fn signal(path: &str, interface: &str, member: &str, args: Vec<Value>) -> Self {
        OutgoingMessage::Signal {
            destination: None,
            path: path.to_owned(),
            interface: interface.to_owned(),
            member: member.to_owned(),
            args,
        }
    }

    /// Serial of the call this message answers, if it is a reply.
    pub fn reply_serial(&self) -> Option<u32> {
        match self {
            OutgoingMessage::Reply { to, .. } | OutgoingMessage::Error { to, .. } => {
                Some(to.serial)
            }
            OutgoingMessage::Signal { .. } => None,
        }
    }
}

/// Conversion from a positional call argument.
pub trait FromValue: Sized {
    /// Human-readable type name used in argument errors.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! scalar_from_value {
    ($ty:ty, $variant:ident, $expected:literal) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    Value::Variant(inner) => Self::from_value(inner),
                    _ => None,
                }
            }
        }
    };
}

scalar_from_value!(bool, Bool, "a boolean");
scalar_from_value!(i32, I32, "an int32");
scalar_from_value!(u32, U32, "a uint32");
scalar_from_value!(i64, I64, "an int64");
scalar_from_value!(u64, U64, "a uint64");
scalar_from_value!(f64, F64, "a double");
scalar_from_value!(String, Str, "a string");
scalar_from_value!(Vec<u8>, Bytes, "a byte array");

impl FromValue for Vec<String> {
    const EXPECTED: &'static str = "an array of strings";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(String::from_value).collect(),
            _ => None,
        }
    }
}

impl FromValue for Variant {
    const EXPECTED: &'static str = "a variant";

    fn from_value(value: &Value) -> Option<Self> {
        value.to_variant()
    }
}

/// Sequential reader over the arguments of a method call.
#[derive(Debug)]
pub struct Args<'a> {
    member: &'a str,
    values: &'a [Value],
    position: usize,
}

impl Args<'_> {
    pub fn next<T: FromValue>(&mut self) -> BusResult<T> {
        let position = self.position;
        self.position += 1;
        self.values
            .get(position)
            .and_then(T::from_value)
            .ok_or_else(|| BusError::InvalidArgs {
                member: self.member.to_owned(),
                position,
                expected: T::EXPECTED,
            })
    }

    /// Reads a string argument where the empty string means "absent".
    pub fn next_optional_string(&mut self) -> BusResult<Option<String>> {
        let value: String = self.next()?;
        Ok(Some(value).filter(|value| !value.is_empty()))
    }
}
