use mediabridge_bus::BusError;
use thiserror::Error;

/// Errors from exporting or unexporting extensions.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("extension {uuid} is already exported at {path}")]
    AlreadyExported { uuid: String, path: String },
    #[error("extension {uuid} is not exported")]
    NotExported { uuid: String },
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

pub type ExportResult<T> = Result<T, ExportError>;
