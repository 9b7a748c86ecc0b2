use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Script folder not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Module not found in process {pid}: {module}")]
    ModuleNotFound { pid: u32, module: String },

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    MemoryWriteFailed { address: u64, message: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid read length {length} (at most {max} bytes)")]
    InvalidLength { length: i64, max: usize },

    #[error("Invalid game configuration: {0}")]
    Config(String),

    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error("Unknown string encoding: {0}")]
    UnknownEncoding(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors that only mean the target is not reachable yet.
    ///
    /// The process latch traces these at debug level only; anything else is
    /// reported once per attach.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProcessNotFound(_) | Error::ModuleNotFound { .. } | Error::ProcessOpenFailed(_)
        )
    }
}
