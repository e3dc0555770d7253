//! On-disk layout and artifact persistence
//!
//! ```text
//! <root>/<source>/
//!   .lock
//!   changes/
//!     2018-06-01/
//!       109611.json
//!       ...
//!     2018-06-02/
//! ```
//!
//! A file's presence is the only record that a change has been fetched.

pub mod json;
pub mod lock;
pub mod path;

pub use json::{existing_artifacts, write_artifact};
pub use lock::SourceLock;
pub use path::ChangesLayout;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The artifact already exists and was left untouched
    #[error("artifact already exists: {0}")]
    AlreadyExists(std::path::PathBuf),

    /// Another process holds the source lock
    #[error("lock error: {0}")]
    LockError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
