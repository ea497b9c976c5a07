//! Native extension interfaces.
//!
//! Extensions live on the same single-threaded event loop as the bus
//! gateway. Operations take a completion callback and return immediately;
//! an implementation may invoke the callback before returning or from a
//! later loop iteration, and callers must cope with both.

use crate::models::{
    BrowseEvent, BrowseId, BrowseRequest, ExtError, ExtResult, Metadata, PlayState, PlaylistId,
    PropertySpec, SeekMode, SetMetadataOutcome, Variant,
};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Identifies a connected event handler so it can be disconnected later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandlerId(pub u64);

pub type EventHandler<E> = Box<dyn Fn(&E)>;

/// Single-shot completion of an asynchronous operation.
pub type Completion<T> = Box<dyn FnOnce(ExtResult<T>)>;

/// Invoked once per browse result and once more for the terminal record.
pub type BrowseCallback = Box<dyn FnMut(BrowseEvent)>;

/// Partial results plus an optional trailing error.
pub type MetadatasCallback = Box<dyn FnOnce(BTreeMap<String, Metadata>, Option<ExtError>)>;

pub type SetMetadataCallback = Box<dyn FnOnce(SetMetadataOutcome)>;

/// Events common to every extension kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionEvent {
    PropertyChanged { name: String, value: Variant },
    NameChanged { name: String },
    Error { error: ExtError },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    ContainerChanged { object_id: String },
    MetadataChanged { object_id: String, metadata: Metadata },
}

#[derive(Debug, Clone)]
pub enum RendererEvent {
    StateChanged(PlayState),
    PlaylistChanged(Option<Rc<dyn Playlist>>),
    MediaChanged {
        index: i32,
        object_id: Option<String>,
    },
    MetadataChanged {
        name: String,
        values: Vec<Variant>,
    },
    /// Buffering progress as a fraction; `1.0` means done.
    BufferingInfo(f32),
}

/// Base interface shared by sources and renderers.
pub trait Extension {
    /// Stable, unique identifier of this extension instance.
    fn uuid(&self) -> &str;

    /// Name of the plugin that provides this extension.
    fn plugin(&self) -> &str;

    /// Human-friendly display name.
    fn name(&self) -> String;

    fn set_name(&self, name: &str);

    fn list_properties(&self) -> Vec<PropertySpec>;

    fn get_property(&self, name: &str, done: Completion<Variant>);

    fn set_property(&self, name: &str, value: Variant) -> ExtResult<()>;

    fn connect_extension_events(&self, handler: EventHandler<ExtensionEvent>) -> SignalHandlerId;

    /// Disconnects a handler returned by any of the `connect_*` methods.
    fn disconnect(&self, id: SignalHandlerId);
}

/// A browsable, hierarchical object namespace with metadata operations.
pub trait Source: Extension {
    fn as_extension(&self) -> &dyn Extension;

    /// Starts an enumeration. Returns the handle under which results are
    /// reported, or the reason the request was rejected.
    fn browse(&self, request: BrowseRequest, results: BrowseCallback) -> ExtResult<BrowseId>;

    fn cancel_browse(&self, browse_id: BrowseId) -> ExtResult<()>;

    fn get_metadata(&self, object_id: &str, keys: &[String], done: Completion<Metadata>);

    fn get_metadatas(&self, object_ids: &[String], keys: &[String], done: MetadatasCallback);

    fn set_metadata(&self, object_id: &str, _metadata: Metadata, done: SetMetadataCallback) {
        done(SetMetadataOutcome {
            object_id: object_id.to_owned(),
            failed_keys: Vec::new(),
            error: Some(ExtError::not_supported("set_metadata")),
        });
    }

    fn create_object(&self, _parent: &str, _metadata: Metadata, done: Completion<String>) {
        done(Err(ExtError::not_supported("create_object")));
    }

    fn destroy_object(&self, _object_id: &str, done: Completion<String>) {
        done(Err(ExtError::not_supported("destroy_object")));
    }

    fn connect_source_events(&self, handler: EventHandler<SourceEvent>) -> SignalHandlerId;
}

/// Snapshot returned by [`Renderer::get_status`].
#[derive(Debug, Clone)]
pub struct RendererStatus {
    pub playlist: Option<Rc<dyn Playlist>>,
    pub index: u32,
    pub state: PlayState,
    pub object_id: Option<String>,
}

/// Media playback transport control.
pub trait Renderer: Extension {
    fn as_extension(&self) -> &dyn Extension;

    fn play(&self, done: Completion<()>);

    fn play_object(&self, object_id: &str, done: Completion<()>);

    fn play_uri(&self, uri: &str, done: Completion<()>);

    fn stop(&self, done: Completion<()>);

    fn pause(&self, done: Completion<()>);

    fn resume(&self, done: Completion<()>);

    fn next(&self, done: Completion<()>);

    fn previous(&self, done: Completion<()>);

    fn goto_index(&self, index: u32, done: Completion<()>);

    /// `None` unassigns the current playlist.
    fn assign_playlist(&self, playlist: Option<Rc<dyn Playlist>>) -> ExtResult<()>;

    /// Completes with the resulting position in seconds.
    fn set_position(&self, mode: SeekMode, seconds: i32, done: Completion<i32>);

    fn get_position(&self, done: Completion<i32>);

    fn get_status(&self, done: Completion<RendererStatus>);

    fn connect_renderer_events(&self, handler: EventHandler<RendererEvent>) -> SignalHandlerId;
}

/// A playlist handed to or reported by a renderer.
pub trait Playlist: fmt::Debug {
    /// Bus id of a shared playlist; `None` for private playlists.
    fn shared_id(&self) -> Option<PlaylistId>;
}

/// Resolves bus playlist ids to playlist objects.
pub trait PlaylistDirectory {
    fn lookup(&self, id: PlaylistId) -> Option<Rc<dyn Playlist>>;

    fn id_of(&self, playlist: Option<&Rc<dyn Playlist>>) -> PlaylistId {
        playlist
            .and_then(|playlist| playlist.shared_id())
            .unwrap_or(PlaylistId::INVALID)
    }
}
