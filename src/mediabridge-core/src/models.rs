use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const EXTENSION_ERROR_DOMAIN: &str = "io.mediabridge.Extension";
pub const SOURCE_ERROR_DOMAIN: &str = "io.mediabridge.Source";
pub const RENDERER_ERROR_DOMAIN: &str = "io.mediabridge.Renderer";

/// Error codes used by the well-known error domains.
pub mod codes {
    pub const FAILED: i32 = 0;
    pub const PROPERTY_NOT_FOUND: i32 = 1;
    pub const INVALID_PROPERTY_VALUE: i32 = 2;
    pub const NOT_SUPPORTED: i32 = 3;
    pub const INVALID_BROWSE_ID: i32 = 4;
    pub const INVALID_OBJECT_ID: i32 = 5;
    pub const PLAYLIST_NOT_FOUND: i32 = 6;
    pub const CANNOT_PLAY: i32 = 7;
}

/// Error reported by an extension, carried over the bus as a
/// (domain, code, message) triple.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{domain} ({code}): {message}")]
pub struct ExtError {
    pub domain: String,
    pub code: i32,
    pub message: String,
}

impl ExtError {
    pub fn new(domain: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            message: message.into(),
        }
    }

    pub fn property_not_found(name: &str) -> Self {
        Self::new(
            EXTENSION_ERROR_DOMAIN,
            codes::PROPERTY_NOT_FOUND,
            format!("no such property: {name}"),
        )
    }

    pub fn not_supported(operation: &str) -> Self {
        Self::new(
            EXTENSION_ERROR_DOMAIN,
            codes::NOT_SUPPORTED,
            format!("operation not supported: {operation}"),
        )
    }

    pub fn invalid_browse_id(id: BrowseId) -> Self {
        Self::new(
            SOURCE_ERROR_DOMAIN,
            codes::INVALID_BROWSE_ID,
            format!("invalid browse id {}", id.0),
        )
    }
}

pub type ExtResult<T> = Result<T, ExtError>;

/// Type tag of a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int,
    UInt,
    Int64,
    UInt64,
    Double,
    Str,
}

impl ValueType {
    /// Single-character bus type signature.
    pub fn signature(&self) -> &'static str {
        match self {
            ValueType::Bool => "b",
            ValueType::Int => "i",
            ValueType::UInt => "u",
            ValueType::Int64 => "x",
            ValueType::UInt64 => "t",
            ValueType::Double => "d",
            ValueType::Str => "s",
        }
    }

    pub fn from_signature(signature: &str) -> Option<Self> {
        let ty = match signature {
            "b" => ValueType::Bool,
            "i" => ValueType::Int,
            "u" => ValueType::UInt,
            "x" => ValueType::Int64,
            "t" => ValueType::UInt64,
            "d" => ValueType::Double,
            "s" => ValueType::Str,
            _ => return None,
        };
        Some(ty)
    }
}

/// A dynamically typed property or metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Variant {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(String),
}

impl Variant {
    pub fn value_type(&self) -> ValueType {
        match self {
            Variant::Bool(_) => ValueType::Bool,
            Variant::Int(_) => ValueType::Int,
            Variant::UInt(_) => ValueType::UInt,
            Variant::Int64(_) => ValueType::Int64,
            Variant::UInt64(_) => ValueType::UInt64,
            Variant::Double(_) => ValueType::Double,
            Variant::Str(_) => ValueType::Str,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value)
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Variant::UInt(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int64(value)
    }
}

impl From<u64> for Variant {
    fn from(value: u64) -> Self {
        Variant::UInt64(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Str(value.to_owned())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::Str(value)
    }
}

/// Object metadata: every key maps to one or more values, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Vec<Variant>>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` to the values stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Variant>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Replaces all values stored under `key`.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<Variant>) {
        self.0.insert(key.into(), values);
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[Variant]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn first(&self, key: &str) -> Option<&Variant> {
        self.0.get(key).and_then(|values| values.first())
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<Variant>> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Variant])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Variant>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

/// Handle of one in-flight browse operation, assigned by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BrowseId(pub u32);

impl BrowseId {
    /// Returned by a source that rejected a browse request.
    pub const INVALID: BrowseId = BrowseId(u32::MAX);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

/// Bus-stable identifier of a shared playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistId(pub u32);

impl PlaylistId {
    /// Stands for "no playlist" or a playlist that is not shared.
    pub const INVALID: PlaylistId = PlaylistId(0);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

/// Renderer playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Transitioning,
}

impl PlayState {
    pub fn as_u32(&self) -> u32 {
        match self {
            PlayState::Stopped => 0,
            PlayState::Playing => 1,
            PlayState::Paused => 2,
            PlayState::Transitioning => 3,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(PlayState::Stopped),
            1 => Some(PlayState::Playing),
            2 => Some(PlayState::Paused),
            3 => Some(PlayState::Transitioning),
            _ => None,
        }
    }
}

/// How a seek offset is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekMode {
    Absolute,
    Relative,
}

impl SeekMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(SeekMode::Absolute),
            1 => Some(SeekMode::Relative),
            _ => None,
        }
    }
}

/// Parameters of a browse request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseRequest {
    pub object_id: String,
    pub recursive: bool,
    /// Filter expression, parsed by the source.
    pub filter: Option<String>,
    /// Sort criteria such as `+artist,-title`.
    pub sort_criteria: Option<String>,
    pub metadata_keys: Vec<String>,
    pub skip_count: u32,
    pub item_count: u32,
}

/// One invocation of a browse result callback.
///
/// `remaining == 0` marks the last item; `-1` means the source does not know
/// how many items follow. A set `error` ends the browse as well.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseEvent {
    pub browse_id: BrowseId,
    pub remaining: i32,
    pub index: u32,
    pub object_id: Option<String>,
    pub metadata: Option<Metadata>,
    pub error: Option<ExtError>,
}

impl BrowseEvent {
    pub fn is_terminal(&self) -> bool {
        self.remaining == 0 || self.error.is_some()
    }
}

/// Result of a set-metadata call; partial failure shares the success shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetMetadataOutcome {
    pub object_id: String,
    pub failed_keys: Vec<String>,
    pub error: Option<ExtError>,
}

/// Name and type of a property an extension exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    pub value_type: ValueType,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}
