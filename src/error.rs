// bucket_ingestor/src/error.rs
// Error taxonomy shared by the pipeline, the inventory and every adapter.

use thiserror::Error;

#[derive(Debug, Error,)]
pub enum IngestorError {
    /// Listing the object store failed; the whole cycle is abandoned.
    #[error("Object store unavailable: {0}")]
    StoreUnavailable(String,),
    #[error("Failed to fetch object: {0}")]
    FetchError(String,),
    #[error("Failed to parse document: {0}")]
    ParseError(String,),
    #[error("Failed to write document: {0}")]
    StoreWriteError(String,),
    #[error("Inventory error: {0}")]
    InventoryError(String,),
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String,),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String,),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error,),
    #[error("Other error: {0}")]
    Other(String,),
}

impl IngestorError {
    pub fn is_transient(&self,) -> bool {
        match self {
            IngestorError::ConnectionError(_,) => true,
            IngestorError::StoreWriteError(msg,) | IngestorError::StoreUnavailable(msg,) => {
                let m = msg.to_lowercase();
                m.contains("timeout",)
                    || m.contains("timed out",)
                    || m.contains("connection",)
                    || m.contains("busy",)
                    || m.contains("server selection",)
                    || m.contains("service unavailable",)
                    || m.contains("slow down",)
            },
            _ => false,
        }
    }

    /// Short machine-readable tag used in cycle reports.
    pub fn kind(&self,) -> &'static str {
        match self {
            IngestorError::StoreUnavailable(_,) => "store_unavailable",
            IngestorError::FetchError(_,) => "fetch_error",
            IngestorError::ParseError(_,) => "parse_error",
            IngestorError::StoreWriteError(_,) => "store_write_error",
            IngestorError::InventoryError(_,) => "inventory_error",
            IngestorError::ConnectionError(_,) => "connection_error",
            IngestorError::ConfigurationError(_,) => "configuration_error",
            IngestorError::IoError(_,) => "io_error",
            IngestorError::Other(_,) => "other",
        }
    }
}

pub type Result<T,> = std::result::Result<T, IngestorError,>;
