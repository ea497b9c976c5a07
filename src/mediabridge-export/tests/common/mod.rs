#![allow(dead_code)]

use mediabridge_bus::{
    ErrorReply, IncomingMessage, MethodCall, OutgoingMessage, RecordingBus, Value,
};
use mediabridge_core::models::{codes, SOURCE_ERROR_DOMAIN};
use mediabridge_core::{
    BrowseCallback, BrowseEvent, BrowseId, BrowseRequest, Completion, Config, EventHandler,
    ExtError, ExtResult, Extension, ExtensionEvent, Metadata, MetadatasCallback, PlayState,
    Playlist, PlaylistDirectory, PlaylistId, PropertySpec, Renderer, RendererEvent,
    RendererStatus, SeekMode, SetMetadataCallback, SetMetadataOutcome, SignalHandlerId, Source,
    SourceEvent, Variant, ACTIVATE_PROPERTY,
};
use mediabridge_export::{Gateway, ManualScheduler};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

pub const CLIENT: &str = ":1.10";
pub const OTHER_CLIENT: &str = ":1.11";

/// Connected handlers of one event type.
pub struct Handlers<E> {
    list: RefCell<Vec<(SignalHandlerId, Rc<dyn Fn(&E)>)>>,
}

impl<E> Default for Handlers<E> {
    fn default() -> Self {
        Self {
            list: RefCell::new(Vec::new()),
        }
    }
}

impl<E> Handlers<E> {
    fn connect(&self, id: SignalHandlerId, handler: EventHandler<E>) -> SignalHandlerId {
        self.list.borrow_mut().push((id, Rc::from(handler)));
        id
    }

    fn disconnect(&self, id: SignalHandlerId) {
        self.list.borrow_mut().retain(|(existing, _)| *existing != id);
    }

    pub fn fire(&self, event: &E) {
        let handlers: Vec<_> = self
            .list
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }
}

/// Property store and handler bookkeeping shared by the fakes.
pub struct FakeBase {
    pub uuid: String,
    pub plugin: String,
    pub name: RefCell<String>,
    pub properties: RefCell<BTreeMap<String, Variant>>,
    /// Every value the gateway wrote to `activate`.
    pub activations: RefCell<Vec<bool>>,
    pub reject_activation: RefCell<Option<ExtError>>,
    pub events: Handlers<ExtensionEvent>,
    next_handler: Cell<u64>,
}

impl FakeBase {
    fn new(uuid: &str, plugin: &str) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("volume".to_string(), Variant::Int(50));
        Self {
            uuid: uuid.to_owned(),
            plugin: plugin.to_owned(),
            name: RefCell::new(format!("{plugin} extension")),
            properties: RefCell::new(properties),
            activations: RefCell::new(Vec::new()),
            reject_activation: RefCell::new(None),
            events: Handlers::default(),
            next_handler: Cell::new(0),
        }
    }

    fn handler_id(&self) -> SignalHandlerId {
        let id = self.next_handler.get() + 1;
        self.next_handler.set(id);
        SignalHandlerId(id)
    }

    fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_owned();
        self.events.fire(&ExtensionEvent::NameChanged {
            name: name.to_owned(),
        });
    }

    fn list_properties(&self) -> Vec<PropertySpec> {
        self.properties
            .borrow()
            .iter()
            .map(|(name, value)| PropertySpec::new(name.clone(), value.value_type()))
            .collect()
    }

    fn get_property(&self, name: &str, done: Completion<Variant>) {
        let value = self.properties.borrow().get(name).cloned();
        done(value.ok_or_else(|| ExtError::property_not_found(name)));
    }

    fn set_property(&self, name: &str, value: Variant) -> ExtResult<()> {
        if name == ACTIVATE_PROPERTY {
            if let Some(err) = self.reject_activation.borrow().clone() {
                return Err(err);
            }
            self.activations
                .borrow_mut()
                .push(value.as_bool().unwrap_or_default());
            return Ok(());
        }
        {
            let mut properties = self.properties.borrow_mut();
            let Some(current) = properties.get_mut(name) else {
                return Err(ExtError::property_not_found(name));
            };
            if current.value_type() != value.value_type() {
                return Err(ExtError::new(
                    mediabridge_core::models::EXTENSION_ERROR_DOMAIN,
                    codes::INVALID_PROPERTY_VALUE,
                    format!("wrong type for {name}"),
                ));
            }
            *current = value.clone();
        }
        self.events.fire(&ExtensionEvent::PropertyChanged {
            name: name.to_owned(),
            value,
        });
        Ok(())
    }
}

macro_rules! delegate_extension {
    ($ty:ty) => {
        impl Extension for $ty {
            fn uuid(&self) -> &str {
                &self.base.uuid
            }

            fn plugin(&self) -> &str {
                &self.base.plugin
            }

            fn name(&self) -> String {
                self.base.name.borrow().clone()
            }

            fn set_name(&self, name: &str) {
                self.base.set_name(name)
            }

            fn list_properties(&self) -> Vec<PropertySpec> {
                self.base.list_properties()
            }

            fn get_property(&self, name: &str, done: Completion<Variant>) {
                self.base.get_property(name, done)
            }

            fn set_property(&self, name: &str, value: Variant) -> ExtResult<()> {
                self.base.set_property(name, value)
            }

            fn connect_extension_events(
                &self,
                handler: EventHandler<ExtensionEvent>,
            ) -> SignalHandlerId {
                self.base.events.connect(self.base.handler_id(), handler)
            }

            fn disconnect(&self, id: SignalHandlerId) {
                self.base.events.disconnect(id);
                self.disconnect_own(id);
            }
        }
    };
}

/// Source whose browse results are pushed by the test.
pub struct FakeSource {
    pub base: FakeBase,
    pub objects: RefCell<BTreeMap<String, Metadata>>,
    pub events: Handlers<SourceEvent>,
    pub browses: RefCell<HashMap<BrowseId, BrowseCallback>>,
    pub requests: RefCell<Vec<BrowseRequest>>,
    pub cancelled: RefCell<Vec<BrowseId>>,
    /// Keys `set_metadata` refuses to write.
    pub read_only: RefCell<Vec<String>>,
    /// Rejects the next browse request.
    pub reject_browse: RefCell<Option<ExtError>>,
    /// Items delivered from inside `browse` before it returns.
    pub synchronous_items: Cell<Option<u32>>,
    next_browse: Cell<u32>,
}

delegate_extension!(FakeSource);

impl FakeSource {
    pub fn new(uuid: &str) -> Rc<Self> {
        let mut objects = BTreeMap::new();
        objects.insert(
            "track-1".to_string(),
            Metadata::new()
                .with("title", "First")
                .with("artist", "Someone"),
        );
        objects.insert("track-2".to_string(), Metadata::new().with("title", "Second"));
        Rc::new(Self {
            base: FakeBase::new(uuid, "fake-source"),
            objects: RefCell::new(objects),
            events: Handlers::default(),
            browses: RefCell::new(HashMap::new()),
            requests: RefCell::new(Vec::new()),
            cancelled: RefCell::new(Vec::new()),
            read_only: RefCell::new(vec!["duration".to_string()]),
            reject_browse: RefCell::new(None),
            synchronous_items: Cell::new(None),
            next_browse: Cell::new(0),
        })
    }

    fn disconnect_own(&self, id: SignalHandlerId) {
        self.events.disconnect(id);
    }

    pub fn connected_handlers(&self) -> usize {
        self.base.events.len() + self.events.len()
    }

    /// Feeds one result into the callback registered for `id`.
    pub fn deliver(&self, event: BrowseEvent) {
        let callback = self.browses.borrow_mut().remove(&event.browse_id);
        let Some(mut callback) = callback else {
            panic!("no browse {:?}", event.browse_id);
        };
        let id = event.browse_id;
        callback(event);
        self.browses.borrow_mut().insert(id, callback);
    }

    /// Delivers `count` items followed by nothing else.
    pub fn deliver_items(&self, id: BrowseId, count: u32, total: u32) {
        for index in 0..count {
            self.deliver(item(id, index, (total - index - 1) as i32));
        }
    }
}

impl Source for FakeSource {
    fn as_extension(&self) -> &dyn Extension {
        self
    }

    fn browse(&self, request: BrowseRequest, mut results: BrowseCallback) -> ExtResult<BrowseId> {
        if let Some(err) = self.reject_browse.borrow_mut().take() {
            return Err(err);
        }
        self.requests.borrow_mut().push(request);
        let id = BrowseId(self.next_browse.get() + 1);
        self.next_browse.set(id.0);

        if let Some(count) = self.synchronous_items.get() {
            for index in 0..count {
                results(item(id, index, (count - index - 1) as i32));
            }
        }
        self.browses.borrow_mut().insert(id, results);
        Ok(id)
    }

    /// Keeps the callback so tests can model results that race the cancel.
    fn cancel_browse(&self, browse_id: BrowseId) -> ExtResult<()> {
        let known = self.browses.borrow().contains_key(&browse_id);
        if !known || self.cancelled.borrow().contains(&browse_id) {
            return Err(ExtError::invalid_browse_id(browse_id));
        }
        self.cancelled.borrow_mut().push(browse_id);
        Ok(())
    }

    fn get_metadata(&self, object_id: &str, keys: &[String], done: Completion<Metadata>) {
        let found = self.objects.borrow().get(object_id).cloned();
        done(
            found
                .map(|metadata| select(metadata, keys))
                .ok_or_else(|| unknown_object(object_id)),
        );
    }

    fn get_metadatas(&self, object_ids: &[String], keys: &[String], done: MetadatasCallback) {
        let objects = self.objects.borrow().clone();
        let mut found = BTreeMap::new();
        let mut error = None;
        for id in object_ids {
            match objects.get(id) {
                Some(metadata) => {
                    found.insert(id.clone(), select(metadata.clone(), keys));
                }
                None => error = Some(unknown_object(id)),
            }
        }
        done(found, error);
    }

    fn set_metadata(&self, object_id: &str, metadata: Metadata, done: SetMetadataCallback) {
        if !self.objects.borrow().contains_key(object_id) {
            done(SetMetadataOutcome {
                object_id: object_id.to_owned(),
                failed_keys: metadata.keys().map(str::to_owned).collect(),
                error: Some(unknown_object(object_id)),
            });
            return;
        }

        let mut failed_keys = Vec::new();
        {
            let read_only = self.read_only.borrow();
            let mut objects = self.objects.borrow_mut();
            let stored = objects.entry(object_id.to_owned()).or_default();
            for (key, values) in metadata.iter() {
                if read_only.iter().any(|locked| locked == key) {
                    failed_keys.push(key.to_owned());
                } else {
                    stored.set(key, values.to_vec());
                }
            }
        }

        let error = (!failed_keys.is_empty()).then(|| {
            ExtError::new(
                SOURCE_ERROR_DOMAIN,
                codes::FAILED,
                format!("read-only keys: {}", failed_keys.join(", ")),
            )
        });
        done(SetMetadataOutcome {
            object_id: object_id.to_owned(),
            failed_keys,
            error,
        });
    }

    fn connect_source_events(&self, handler: EventHandler<SourceEvent>) -> SignalHandlerId {
        self.events.connect(self.base.handler_id(), handler)
    }
}

fn select(metadata: Metadata, keys: &[String]) -> Metadata {
    if keys.is_empty() {
        return metadata;
    }
    let mut selected = Metadata::new();
    for (key, values) in metadata.iter() {
        if keys.iter().any(|wanted| wanted == key) {
            selected.set(key, values.to_vec());
        }
    }
    selected
}

fn unknown_object(id: &str) -> ExtError {
    ExtError::new(
        SOURCE_ERROR_DOMAIN,
        codes::INVALID_OBJECT_ID,
        format!("unknown object {id}"),
    )
}

pub fn item(browse_id: BrowseId, index: u32, remaining: i32) -> BrowseEvent {
    BrowseEvent {
        browse_id,
        remaining,
        index,
        object_id: Some(format!("item-{index}")),
        metadata: Some(Metadata::new().with("title", format!("Item {index}"))),
        error: None,
    }
}

pub fn terminal(browse_id: BrowseId, index: u32, error: Option<ExtError>) -> BrowseEvent {
    BrowseEvent {
        browse_id,
        remaining: 0,
        index,
        object_id: None,
        metadata: None,
        error,
    }
}

#[derive(Debug)]
pub struct FakePlaylist {
    pub id: Option<PlaylistId>,
}

impl Playlist for FakePlaylist {
    fn shared_id(&self) -> Option<PlaylistId> {
        self.id
    }
}

#[derive(Default)]
pub struct FakePlaylists {
    pub known: RefCell<HashMap<u32, Rc<dyn Playlist>>>,
}

impl FakePlaylists {
    pub fn add(&self, id: u32) -> Rc<dyn Playlist> {
        let playlist: Rc<dyn Playlist> = Rc::new(FakePlaylist {
            id: Some(PlaylistId(id)),
        });
        self.known.borrow_mut().insert(id, Rc::clone(&playlist));
        playlist
    }
}

impl PlaylistDirectory for FakePlaylists {
    fn lookup(&self, id: PlaylistId) -> Option<Rc<dyn Playlist>> {
        self.known.borrow().get(&id.0).cloned()
    }
}

/// Renderer that completes every operation synchronously.
pub struct FakeRenderer {
    pub base: FakeBase,
    pub events: Handlers<RendererEvent>,
    /// Transport operations in call order.
    pub calls: RefCell<Vec<String>>,
    /// Error returned by the next transport operation.
    pub fail_next: RefCell<Option<ExtError>>,
    pub position: Cell<i32>,
    pub state: Cell<PlayState>,
    pub index: Cell<u32>,
    pub playlist: RefCell<Option<Rc<dyn Playlist>>>,
}

delegate_extension!(FakeRenderer);

impl FakeRenderer {
    pub fn new(uuid: &str) -> Rc<Self> {
        Rc::new(Self {
            base: FakeBase::new(uuid, "fake-renderer"),
            events: Handlers::default(),
            calls: RefCell::new(Vec::new()),
            fail_next: RefCell::new(None),
            position: Cell::new(0),
            state: Cell::new(PlayState::Stopped),
            index: Cell::new(0),
            playlist: RefCell::new(None),
        })
    }

    fn disconnect_own(&self, id: SignalHandlerId) {
        self.events.disconnect(id);
    }

    pub fn connected_handlers(&self) -> usize {
        self.base.events.len() + self.events.len()
    }

    fn transport(&self, call: String, done: Completion<()>) {
        self.calls.borrow_mut().push(call);
        let failure = self.fail_next.borrow_mut().take();
        done(failure.map_or(Ok(()), Err));
    }
}

impl Renderer for FakeRenderer {
    fn as_extension(&self) -> &dyn Extension {
        self
    }

    fn play(&self, done: Completion<()>) {
        self.state.set(PlayState::Playing);
        self.transport("play".into(), done);
    }

    fn play_object(&self, object_id: &str, done: Completion<()>) {
        self.transport(format!("play_object {object_id}"), done);
    }

    fn play_uri(&self, uri: &str, done: Completion<()>) {
        self.transport(format!("play_uri {uri}"), done);
    }

    fn stop(&self, done: Completion<()>) {
        self.state.set(PlayState::Stopped);
        self.transport("stop".into(), done);
    }

    fn pause(&self, done: Completion<()>) {
        self.state.set(PlayState::Paused);
        self.transport("pause".into(), done);
    }

    fn resume(&self, done: Completion<()>) {
        self.state.set(PlayState::Playing);
        self.transport("resume".into(), done);
    }

    fn next(&self, done: Completion<()>) {
        self.transport("next".into(), done);
    }

    fn previous(&self, done: Completion<()>) {
        self.transport("previous".into(), done);
    }

    fn goto_index(&self, index: u32, done: Completion<()>) {
        self.index.set(index);
        self.transport(format!("goto_index {index}"), done);
    }

    fn assign_playlist(&self, playlist: Option<Rc<dyn Playlist>>) -> ExtResult<()> {
        *self.playlist.borrow_mut() = playlist;
        Ok(())
    }

    fn set_position(&self, mode: SeekMode, seconds: i32, done: Completion<i32>) {
        let position = match mode {
            SeekMode::Absolute => seconds,
            SeekMode::Relative => self.position.get() + seconds,
        };
        self.position.set(position.max(0));
        done(Ok(self.position.get()));
    }

    fn get_position(&self, done: Completion<i32>) {
        done(Ok(self.position.get()));
    }

    fn get_status(&self, done: Completion<RendererStatus>) {
        done(Ok(RendererStatus {
            playlist: self.playlist.borrow().clone(),
            index: self.index.get(),
            state: self.state.get(),
            object_id: Some("track-1".into()),
        }));
    }

    fn connect_renderer_events(&self, handler: EventHandler<RendererEvent>) -> SignalHandlerId {
        self.events.connect(self.base.handler_id(), handler)
    }
}

/// A gateway on a recording bus with a manually driven clock.
pub struct Harness {
    pub bus: Rc<RecordingBus>,
    pub scheduler: Rc<ManualScheduler>,
    pub playlists: Rc<FakePlaylists>,
    pub gateway: Gateway,
    serial: Cell<u32>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        let bus = Rc::new(RecordingBus::default());
        let scheduler = Rc::new(ManualScheduler::new());
        let playlists = Rc::new(FakePlaylists::default());
        let gateway = Gateway::new(
            bus.clone(),
            scheduler.clone(),
            playlists.clone(),
            config,
        );
        Self {
            bus,
            scheduler,
            playlists,
            gateway,
            serial: Cell::new(0),
        }
    }

    pub fn method_call(
        &self,
        sender: &str,
        path: &str,
        interface: &str,
        member: &str,
        args: Vec<Value>,
    ) -> MethodCall {
        let serial = self.serial.get() + 1;
        self.serial.set(serial);
        MethodCall {
            serial,
            sender: sender.to_owned(),
            path: path.to_owned(),
            interface: interface.to_owned(),
            member: member.to_owned(),
            args,
        }
    }

    /// Sends a call through the gateway and returns its serial.
    pub fn call(
        &self,
        sender: &str,
        path: &str,
        interface: &str,
        member: &str,
        args: Vec<Value>,
    ) -> u32 {
        let call = self.method_call(sender, path, interface, member, args);
        let serial = call.serial;
        self.gateway
            .handle_message(&IncomingMessage::MethodCall(call));
        serial
    }

    pub fn take_sent(&self) -> Vec<OutgoingMessage> {
        self.bus.take_sent()
    }
}

fn answers(sent: &[OutgoingMessage], serial: u32) -> impl Iterator<Item = &OutgoingMessage> {
    sent.iter()
        .filter(move |message| message.reply_serial() == Some(serial))
}

pub fn reply_args(sent: &[OutgoingMessage], serial: u32) -> Option<Vec<Value>> {
    answers(sent, serial).find_map(|message| match message {
        OutgoingMessage::Reply { args, .. } => Some(args.clone()),
        _ => None,
    })
}

pub fn error_reply(sent: &[OutgoingMessage], serial: u32) -> Option<ErrorReply> {
    answers(sent, serial).find_map(|message| match message {
        OutgoingMessage::Error { error, .. } => Some(error.clone()),
        _ => None,
    })
}

/// `(member, args)` of every signal, in order.
pub fn signals(sent: &[OutgoingMessage]) -> Vec<(String, Vec<Value>)> {
    sent.iter()
        .filter_map(|message| match message {
            OutgoingMessage::Signal { member, args, .. } => Some((member.clone(), args.clone())),
            _ => None,
        })
        .collect()
}

pub fn signal_args(sent: &[OutgoingMessage], wanted: &str) -> Vec<Vec<Value>> {
    signals(sent)
        .into_iter()
        .filter(|(member, _)| member == wanted)
        .map(|(_, args)| args)
        .collect()
}

/// A flushed batch of browse results.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub destination: Option<String>,
    pub handle: u32,
    pub records: Vec<Value>,
}

pub fn batches(sent: &[OutgoingMessage]) -> Vec<Batch> {
    sent.iter()
        .filter_map(|message| match message {
            OutgoingMessage::Signal {
                destination,
                member,
                args,
                ..
            } if member == "browse_result" => match args.as_slice() {
                [Value::U32(handle), Value::Array(records)] => Some(Batch {
                    destination: destination.clone(),
                    handle: *handle,
                    records: records.clone(),
                }),
                _ => panic!("malformed browse_result {args:?}"),
            },
            _ => None,
        })
        .collect()
}

pub fn batch_sizes(sent: &[OutgoingMessage]) -> Vec<usize> {
    batches(sent).iter().map(|batch| batch.records.len()).collect()
}

/// `index` field of a browse record.
pub fn index_of(record: &Value) -> u32 {
    match record {
        Value::Struct(fields) => match fields.get(1) {
            Some(Value::U32(index)) => *index,
            other => panic!("unexpected index field {other:?}"),
        },
        other => panic!("unexpected record {other:?}"),
    }
}

/// `remaining` field of a browse record.
pub fn remaining_of(record: &Value) -> i32 {
    match record {
        Value::Struct(fields) => match fields.first() {
            Some(Value::I32(remaining)) => *remaining,
            other => panic!("unexpected remaining field {other:?}"),
        },
        other => panic!("unexpected record {other:?}"),
    }
}
