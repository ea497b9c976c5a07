pub mod config;
pub mod extension;
pub mod logging;
pub mod models;
pub mod paths;

pub use config::{
    BrowseConfig, BusConfig, Config, ConfigError, LogLevel, LoggingConfig, RendererConfig,
    ValidationError,
};
pub use extension::{
    BrowseCallback, Completion, EventHandler, Extension, ExtensionEvent, MetadatasCallback,
    Playlist, PlaylistDirectory, Renderer, RendererEvent, RendererStatus, SetMetadataCallback,
    SignalHandlerId, Source, SourceEvent,
};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use models::{
    BrowseEvent, BrowseId, BrowseRequest, ExtError, ExtResult, Metadata, PlayState, PlaylistId,
    PropertySpec, SeekMode, SetMetadataOutcome, ValueType, Variant,
};
pub use paths::{AppDirs, DirsError};

pub const APP_NAME: &str = "mediabridge";
pub const APP_AUTHOR: &str = "Mediabridge";
pub const APP_QUALIFIER: &str = "io";

/// Name of the boolean property that clients set to (de)activate an extension.
pub const ACTIVATE_PROPERTY: &str = "activate";
