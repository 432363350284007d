use std::path::PathBuf;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, SvalignError>;

/// Error taxonomy of the aligner core.
///
/// `BridgingExtraction` is recoverable (the caller clips and retries);
/// `InputMalformed` is fatal for the affected read only; `PackCorrupt` is
/// fatal for the whole run.
#[derive(thiserror::Error, Debug)]
pub enum SvalignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt pack '{prefix}': {reason}")]
    PackCorrupt { prefix: PathBuf, reason: String },

    #[error("malformed input record '{record}': {reason}")]
    InputMalformed { record: String, reason: String },

    #[error("position {pos} outside address space of size {size}")]
    OutOfRange { pos: u64, size: u64 },

    #[error("extraction [{begin}, {end}) bridges the forward/reverse seam or a contig border")]
    BridgingExtraction { begin: u64, end: u64 },

    #[error("unsupported operation on paired stream: {0}")]
    UnsupportedStreamOp(&'static str),

    #[error("read cancelled")]
    Cancelled,
}

impl SvalignError {
    /// Process exit code for the CLI shell.
    pub fn exit_code(&self) -> i32 {
        match self {
            SvalignError::Io(_) => 1,
            SvalignError::InputMalformed { .. } => 2,
            SvalignError::PackCorrupt { .. } => 3,
            SvalignError::OutOfRange { .. }
            | SvalignError::BridgingExtraction { .. }
            | SvalignError::UnsupportedStreamOp(_)
            | SvalignError::Cancelled => 4,
        }
    }
}
