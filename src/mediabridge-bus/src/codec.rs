//! Byte encoding of metadata maps embedded in bus messages.

use crate::{BusError, BusResult};
use mediabridge_core::Metadata;

pub fn encode_metadata(metadata: &Metadata) -> BusResult<Vec<u8>> {
    serde_json::to_vec(metadata).map_err(|err| BusError::Encode(err.to_string()))
}

/// An empty blob decodes to empty metadata.
pub fn decode_metadata(bytes: &[u8]) -> BusResult<Metadata> {
    if bytes.is_empty() {
        return Ok(Metadata::new());
    }
    serde_json::from_slice(bytes).map_err(|err| BusError::Decode(err.to_string()))
}
