use crate::activation::ActivationTracker;
use crate::base;
use crate::context::{Context, Settings};
use crate::error::{ExportError, ExportResult};
use crate::interface;
use crate::mainloop::Scheduler;
use crate::registry::{object_path, service_name, ExportId, ExportedObject, ObjectKind, Registry};
use crate::renderer::{self, BufferingThrottle};
use crate::source::{self, BrowseStreamer};
use mediabridge_bus::{
    BusConnection, ErrorReply, IncomingMessage, MatchRule, MethodCall, NameOwnerChanged,
    SignalMessage,
};
use mediabridge_core::{Config, PlaylistDirectory, Renderer, Source};
use std::rc::Rc;

/// Whether a message was consumed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    NotHandled,
}

/// Publishes local extensions on a message bus and routes calls to them.
///
/// Everything runs on one event loop; the gateway is neither `Send` nor
/// `Sync`. Feed every incoming message to [`Gateway::handle_message`].
pub struct Gateway {
    ctx: Context,
    registry: Registry,
    activation: ActivationTracker,
}

impl Gateway {
    pub fn new(
        bus: Rc<dyn BusConnection>,
        scheduler: Rc<dyn Scheduler>,
        playlists: Rc<dyn PlaylistDirectory>,
        config: &Config,
    ) -> Self {
        let settings = Settings {
            bus: config.bus.clone(),
            browse: config.browse,
            renderer: config.renderer,
        };
        Self {
            activation: ActivationTracker::new(Rc::clone(&bus)),
            ctx: Context {
                bus,
                scheduler,
                playlists,
                settings: Rc::new(settings),
            },
            registry: Registry::default(),
        }
    }

    /// Exports a source and returns its object path.
    pub fn export_source(&self, source: Rc<dyn Source>) -> ExportResult<String> {
        let path = self.reserve_path(source.uuid(), "source")?;
        let browse = BrowseStreamer::new(self.ctx.clone(), path.clone());
        self.export(path, ObjectKind::Source { source, browse })
    }

    /// Exports a renderer and returns its object path.
    pub fn export_renderer(&self, renderer: Rc<dyn Renderer>) -> ExportResult<String> {
        let path = self.reserve_path(renderer.uuid(), "renderer")?;
        let buffering = BufferingThrottle::new(self.ctx.clone(), path.clone());
        self.export(
            path,
            ObjectKind::Renderer {
                renderer,
                buffering,
            },
        )
    }

    fn reserve_path(&self, uuid: &str, kind: &str) -> ExportResult<String> {
        let path = object_path(&self.ctx.settings.bus.path_prefix, kind, uuid);
        match self.registry.conflict(uuid, &path) {
            Some(existing) => Err(ExportError::AlreadyExported {
                uuid: uuid.to_owned(),
                path: existing,
            }),
            None => Ok(path),
        }
    }

    fn export(&self, path: String, kind: ObjectKind) -> ExportResult<String> {
        let extension = kind.extension();
        let uuid = extension.uuid().to_owned();
        let name = extension.name();
        let service = service_name(&self.ctx.settings.bus.service_prefix, extension.plugin());

        if self.registry.acquire_service(&service) {
            if let Err(err) = self.ctx.bus.request_name(&service) {
                self.registry.release_service(&service);
                return Err(err.into());
            }
            tracing::info!(%service, "acquired service name");
        }

        let mut handlers = vec![base::connect(&self.ctx, extension, &path)];
        handlers.push(match &kind {
            ObjectKind::Source { source, .. } => source::connect(&self.ctx, source.as_ref(), &path),
            ObjectKind::Renderer {
                renderer,
                buffering,
            } => renderer::connect(&self.ctx, renderer.as_ref(), &path, buffering),
        });

        let object = self.registry.insert(ExportedObject {
            id: self.registry.next_id(),
            uuid,
            name,
            service_name: service,
            path,
            kind,
            handlers,
        });
        tracing::info!(
            uuid = %object.uuid,
            name = %object.name,
            kind = object.kind.label(),
            path = %object.path,
            "extension exported"
        );
        Ok(object.path.clone())
    }

    /// Withdraws an extension from the bus. In-flight browses are cancelled,
    /// pending timers dropped and activation references discarded without
    /// touching the native `activate` property.
    pub fn unexport(&self, uuid: &str) -> ExportResult<()> {
        let object = self
            .registry
            .remove(uuid)
            .ok_or_else(|| ExportError::NotExported {
                uuid: uuid.to_owned(),
            })?;

        object.teardown();
        self.activation.purge_object(object.id);

        if self.registry.release_service(&object.service_name) {
            if let Err(err) = self.ctx.bus.release_name(&object.service_name) {
                tracing::warn!(service = %object.service_name, error = %err, "failed to release service name");
            }
        }
        tracing::info!(uuid = %object.uuid, path = %object.path, "extension unexported");
        Ok(())
    }

    pub fn object_path(&self, uuid: &str) -> Option<String> {
        self.registry.by_uuid(uuid).map(|object| object.path.clone())
    }

    /// Number of peers currently holding `uuid` activated.
    pub fn activation_count(&self, uuid: &str) -> usize {
        self.registry
            .by_uuid(uuid)
            .map_or(0, |object| self.activation.count(object.id))
    }

    /// Number of browse sessions still streaming for a source.
    pub fn active_browses(&self, uuid: &str) -> usize {
        match self.registry.by_uuid(uuid).as_deref() {
            Some(ExportedObject {
                kind: ObjectKind::Source { browse, .. },
                ..
            }) => browse.active(),
            _ => 0,
        }
    }

    pub fn exported(&self) -> usize {
        self.registry.len()
    }

    /// Routes a message to the exported object it targets.
    ///
    /// Returns [`Dispatch::NotHandled`] for anything the gateway does not
    /// serve so the host can pass the message on.
    pub fn dispatch(&self, message: &IncomingMessage) -> Dispatch {
        match message {
            IncomingMessage::MethodCall(call) => self.dispatch_call(call),
            IncomingMessage::Signal(signal) => self.dispatch_signal(signal),
        }
    }

    /// Like [`Gateway::dispatch`], but answers unknown methods on exported
    /// paths with an error instead of leaving them unhandled.
    pub fn handle_message(&self, message: &IncomingMessage) -> Dispatch {
        let dispatch = self.dispatch(message);
        if let (Dispatch::NotHandled, IncomingMessage::MethodCall(call)) = (dispatch, message) {
            if self.registry.by_path(&call.path).is_some() {
                self.ctx.reply_error(
                    call.reply_address(),
                    ErrorReply::UnknownMethod {
                        interface: call.interface.clone(),
                        member: call.member.clone(),
                    },
                );
                return Dispatch::Handled;
            }
        }
        dispatch
    }

    fn dispatch_call(&self, call: &MethodCall) -> Dispatch {
        let Some(object) = self.registry.by_path(&call.path) else {
            return Dispatch::NotHandled;
        };
        tracing::trace!(
            path = %call.path,
            interface = %call.interface,
            member = %call.member,
            peer = %call.sender,
            "dispatching call"
        );

        let routed = match (&object.kind, call.interface.as_str()) {
            (_, interface::extension::INTERFACE) => {
                base::dispatch(&self.ctx, &self.activation, &object, call)
            }
            (ObjectKind::Source { source, browse }, interface::source::INTERFACE) => {
                source::dispatch(&self.ctx, source, browse, call)
            }
            (ObjectKind::Renderer { renderer, .. }, interface::renderer::INTERFACE) => {
                renderer::dispatch(&self.ctx, renderer, call)
            }
            _ => Ok(Dispatch::NotHandled),
        };

        routed.unwrap_or_else(|err| {
            tracing::debug!(member = %call.member, error = %err, "rejecting malformed call");
            self.ctx.reply_error(call.reply_address(), err);
            Dispatch::Handled
        })
    }

    fn dispatch_signal(&self, signal: &SignalMessage) -> Dispatch {
        let Some(change) = NameOwnerChanged::parse(signal) else {
            return Dispatch::NotHandled;
        };
        if !MatchRule::name_owner_changed(&change.name).matches(signal) {
            tracing::debug!(
                sender = %signal.sender,
                name = %change.name,
                "ignoring owner change not sent by the bus"
            );
            return Dispatch::NotHandled;
        }
        if !change.is_disappearance() {
            return Dispatch::NotHandled;
        }
        let Some(released) = self.activation.peer_vanished(&change.name) else {
            return Dispatch::NotHandled;
        };
        for id in released {
            self.force_deactivate(id);
        }
        Dispatch::Handled
    }

    fn force_deactivate(&self, id: ExportId) {
        let Some(object) = self.registry.get(id) else {
            return;
        };
        tracing::info!(uuid = %object.uuid, "deactivating extension after its last holder left");
        if let Err(err) = base::deactivate_natively(object.extension()) {
            tracing::warn!(uuid = %object.uuid, error = %err, "failed to deactivate extension");
        }
    }
}
