//! Bus interface and member names.

pub mod extension {
    pub const INTERFACE: &str = "io.mediabridge.Extension";

    pub const GET_PROPERTY: &str = "get_property";
    pub const SET_PROPERTY: &str = "set_property";
    pub const LIST_PROPERTIES: &str = "list_properties";
    pub const GET_NAME: &str = "get_name";
    pub const SET_NAME: &str = "set_name";

    pub const PROPERTY_CHANGED: &str = "property_changed";
    pub const NAME_CHANGED: &str = "name_changed";
    pub const ERROR: &str = "error";
}

pub mod source {
    pub const INTERFACE: &str = "io.mediabridge.Source";

    pub const BROWSE: &str = "browse";
    pub const CANCEL_BROWSE: &str = "cancel_browse";
    pub const GET_METADATA: &str = "get_metadata";
    pub const GET_METADATAS: &str = "get_metadatas";
    pub const SET_METADATA: &str = "set_metadata";
    pub const CREATE_OBJECT: &str = "create_object";
    pub const DESTROY_OBJECT: &str = "destroy_object";

    pub const BROWSE_RESULT: &str = "browse_result";
    pub const CONTAINER_CHANGED: &str = "container_changed";
    pub const METADATA_CHANGED: &str = "metadata_changed";
}

pub mod renderer {
    pub const INTERFACE: &str = "io.mediabridge.Renderer";

    pub const PLAY: &str = "play";
    pub const PLAY_OBJECT: &str = "play_object";
    pub const PLAY_URI: &str = "play_uri";
    pub const STOP: &str = "stop";
    pub const PAUSE: &str = "pause";
    pub const RESUME: &str = "resume";
    pub const NEXT: &str = "next";
    pub const PREVIOUS: &str = "previous";
    pub const GOTO_INDEX: &str = "goto_index";
    pub const ASSIGN_PLAYLIST: &str = "assign_playlist";
    pub const SET_POSITION: &str = "set_position";
    pub const GET_POSITION: &str = "get_position";
    pub const GET_STATUS: &str = "get_status";

    pub const STATE_CHANGED: &str = "state_changed";
    pub const PLAYLIST_CHANGED: &str = "playlist_changed";
    pub const MEDIA_CHANGED: &str = "media_changed";
    pub const METADATA_CHANGED: &str = "metadata_changed";
    pub const BUFFERING_INFO: &str = "buffering_info";
}
