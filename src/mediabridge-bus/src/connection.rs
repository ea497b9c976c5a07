//! Connection seam between the gateway and the bus daemon.

use crate::message::{OutgoingMessage, SignalMessage, Value};
use crate::{BusError, BusResult};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

pub const BUS_DAEMON_NAME: &str = "org.freedesktop.DBus";
pub const BUS_DAEMON_PATH: &str = "/org/freedesktop/DBus";
pub const BUS_DAEMON_INTERFACE: &str = "org.freedesktop.DBus";
pub const NAME_OWNER_CHANGED: &str = "NameOwnerChanged";

/// An open connection to the message bus.
///
/// Implementations are used from the single event-loop thread only, hence
/// `&self` methods and no `Send` bound.
pub trait BusConnection {
    /// Unique name the daemon assigned to this connection.
    fn unique_name(&self) -> &str;

    fn send(&self, message: OutgoingMessage) -> BusResult<()>;

    /// Subscribes to signals matching `rule`.
    fn add_match(&self, rule: &MatchRule) -> BusResult<()>;

    fn remove_match(&self, rule: &MatchRule) -> BusResult<()>;

    /// Requests ownership of a well-known service name.
    fn request_name(&self, name: &str) -> BusResult<()>;

    fn release_name(&self, name: &str) -> BusResult<()>;
}

/// A signal subscription filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchRule {
    pub sender: Option<String>,
    pub path: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub arg0: Option<String>,
}

impl MatchRule {
    /// Ownership changes of `name`; used to notice a peer going away.
    pub fn name_owner_changed(name: &str) -> Self {
        Self {
            sender: Some(BUS_DAEMON_NAME.to_owned()),
            path: Some(BUS_DAEMON_PATH.to_owned()),
            interface: Some(BUS_DAEMON_INTERFACE.to_owned()),
            member: Some(NAME_OWNER_CHANGED.to_owned()),
            arg0: Some(name.to_owned()),
        }
    }

    /// Textual form understood by the bus daemon.
    pub fn to_rule_string(&self) -> String {
        let mut parts = vec!["type='signal'".to_string()];
        for (key, value) in [
            ("sender", &self.sender),
            ("path", &self.path),
            ("interface", &self.interface),
            ("member", &self.member),
            ("arg0", &self.arg0),
        ] {
            if let Some(value) = value {
                parts.push(format!("{key}='{value}'"));
            }
        }
        parts.join(",")
    }

    pub fn matches(&self, signal: &SignalMessage) -> bool {
        let field_ok = |rule: &Option<String>, actual: &str| {
            rule.as_deref().map_or(true, |expected| expected == actual)
        };
        let arg0_ok = match (&self.arg0, signal.args.first()) {
            (None, _) => true,
            (Some(expected), Some(Value::Str(actual))) => expected == actual,
            (Some(_), _) => false,
        };
        field_ok(&self.sender, &signal.sender)
            && field_ok(&self.path, &signal.path)
            && field_ok(&self.interface, &signal.interface)
            && field_ok(&self.member, &signal.member)
            && arg0_ok
    }
}

/// Parsed `NameOwnerChanged(name, old_owner, new_owner)` signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameOwnerChanged {
    pub name: String,
    pub old_owner: String,
    pub new_owner: String,
}

impl NameOwnerChanged {
    pub fn parse(signal: &SignalMessage) -> Option<Self> {
        if signal.interface != BUS_DAEMON_INTERFACE || signal.member != NAME_OWNER_CHANGED {
            return None;
        }
        match signal.args.as_slice() {
            [Value::Str(name), Value::Str(old_owner), Value::Str(new_owner)] => Some(Self {
                name: name.clone(),
                old_owner: old_owner.clone(),
                new_owner: new_owner.clone(),
            }),
            _ => None,
        }
    }

    /// The name lost its owner and nobody took it over.
    pub fn is_disappearance(&self) -> bool {
        self.new_owner.is_empty() && !self.old_owner.is_empty()
    }

    /// Builds the signal the daemon emits when `name` disappears.
    pub fn disappeared(name: &str) -> SignalMessage {
        SignalMessage {
            sender: BUS_DAEMON_NAME.to_owned(),
            path: BUS_DAEMON_PATH.to_owned(),
            interface: BUS_DAEMON_INTERFACE.to_owned(),
            member: NAME_OWNER_CHANGED.to_owned(),
            args: vec![Value::str(name), Value::str(name), Value::str("")],
        }
    }
}

/// In-memory connection that records everything sent through it.
///
/// Used by tests and headless runs where no bus daemon is available.
#[derive(Debug)]
pub struct RecordingBus {
    unique_name: String,
    sent: RefCell<Vec<OutgoingMessage>>,
    matches: RefCell<Vec<MatchRule>>,
    names: RefCell<BTreeSet<String>>,
    closed: Cell<bool>,
}

impl Default for RecordingBus {
    fn default() -> Self {
        Self::new(":1.1")
    }
}

impl RecordingBus {
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            sent: RefCell::new(Vec::new()),
            matches: RefCell::new(Vec::new()),
            names: RefCell::new(BTreeSet::new()),
            closed: Cell::new(false),
        }
    }

    /// Removes and returns everything sent so far.
    pub fn take_sent(&self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn active_matches(&self) -> Vec<MatchRule> {
        self.matches.borrow().clone()
    }

    pub fn owned_names(&self) -> Vec<String> {
        self.names.borrow().iter().cloned().collect()
    }

    /// Makes every further operation fail with [`BusError::Disconnected`].
    pub fn close(&self) {
        self.closed.set(true);
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.closed.get() {
            Err(BusError::Disconnected)
        } else {
            Ok(())
        }
    }
}

impl BusConnection for RecordingBus {
    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn send(&self, message: OutgoingMessage) -> BusResult<()> {
        self.ensure_open()?;
        tracing::trace!(?message, "recording outgoing message");
        self.sent.borrow_mut().push(message);
        Ok(())
    }

    fn add_match(&self, rule: &MatchRule) -> BusResult<()> {
        self.ensure_open()?;
        self.matches.borrow_mut().push(rule.clone());
        Ok(())
    }

    fn remove_match(&self, rule: &MatchRule) -> BusResult<()> {
        self.ensure_open()?;
        let mut matches = self.matches.borrow_mut();
        if let Some(position) = matches.iter().position(|existing| existing == rule) {
            matches.remove(position);
        }
        Ok(())
    }

    fn request_name(&self, name: &str) -> BusResult<()> {
        self.ensure_open()?;
        tracing::debug!(%name, "requesting name");
        if !self.names.borrow_mut().insert(name.to_owned()) {
            return Err(BusError::NameRequest {
                name: name.to_owned(),
                reason: "already owned by this connection".into(),
            });
        }
        Ok(())
    }

    fn release_name(&self, name: &str) -> BusResult<()> {
        self.ensure_open()?;
        self.names.borrow_mut().remove(name);
        Ok(())
    }
}
