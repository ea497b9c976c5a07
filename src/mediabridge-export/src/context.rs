use crate::mainloop::Scheduler;
use mediabridge_bus::{BusConnection, ErrorReply, OutgoingMessage, ReplyAddress, Value};
use mediabridge_core::{BrowseConfig, BusConfig, ExtResult, PlaylistDirectory, RendererConfig};
use std::rc::Rc;

/// Collaborators shared by every dispatcher and native callback.
///
/// Cloning is cheap; completion closures carry their own copy.
#[derive(Clone)]
pub(crate) struct Context {
    pub bus: Rc<dyn BusConnection>,
    pub scheduler: Rc<dyn Scheduler>,
    pub playlists: Rc<dyn PlaylistDirectory>,
    pub settings: Rc<Settings>,
}

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub bus: BusConfig,
    pub browse: BrowseConfig,
    pub renderer: RendererConfig,
}

impl Context {
    pub fn send(&self, message: OutgoingMessage) {
        if let Err(err) = self.bus.send(message) {
            tracing::warn!(error = %err, "failed to send bus message");
        }
    }

    pub fn reply(&self, to: ReplyAddress, args: Vec<Value>) {
        self.send(OutgoingMessage::reply(to, args));
    }

    pub fn reply_error(&self, to: ReplyAddress, error: impl Into<ErrorReply>) {
        let error = error.into();
        tracing::debug!(
            peer = %to.sender,
            serial = to.serial,
            name = %error.name(&self.settings.bus.error_prefix),
            "replying with error"
        );
        self.send(OutgoingMessage::error(to, error));
    }

    /// Replies with `args(value)` on success or with the extension error.
    pub fn reply_result<T>(
        &self,
        to: ReplyAddress,
        result: ExtResult<T>,
        args: impl FnOnce(T) -> Vec<Value>,
    ) {
        match result {
            Ok(value) => self.reply(to, args(value)),
            Err(err) => self.reply_error(to, err),
        }
    }

    pub fn emit(&self, path: &str, interface: &str, member: &str, args: Vec<Value>) {
        self.send(OutgoingMessage::signal(path, interface, member, args));
    }
}
