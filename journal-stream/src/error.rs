use thiserror::Error;

/// Errors that can occur while reading journal files
#[derive(Debug, Error)]
pub enum JournalError {
    /// File header magic is not `LPKSHHRH`
    #[error("file signature is invalid")]
    BadSignature,

    /// The file returned fewer bytes than the object size requested
    #[error("short read at offset {offset:#x}: {needed} bytes requested")]
    ShortRead { offset: u64, needed: usize },

    /// Underlying read or seek failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An object offset that is zero, unaligned, or past the end of the file
    #[error("object offset {0:#x} is invalid")]
    BadOffset(u64),

    /// An object whose header or payload does not parse as the requested kind
    #[error("bad object at offset {offset:#x}: {reason}")]
    BadObject { offset: u64, reason: String },

    /// A data payload decoded without any `=` byte
    #[error("data payload contains no '=' separator")]
    MalformedPayload,

    /// The declared compression codec rejected the bytes
    #[error("{codec} decompression failed: {reason}")]
    Decompression { codec: &'static str, reason: String },

    /// `seek_to_cursor` exhausted the entry stream without a match
    #[error("entry for the specified cursor has not been found")]
    CursorNotFound,

    /// A cursor string that does not follow the six-field `s;i;b;m;t;x` form
    #[error("cursor string is malformed")]
    BadCursor,

    /// An invalid include pattern
    #[error("glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl JournalError {
    /// Whether the error spoils a single record rather than the whole file.
    ///
    /// Record-scoped errors may be demoted to warnings by a host-supplied
    /// callback; everything else terminates the traversal.
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            JournalError::MalformedPayload | JournalError::Decompression { .. }
        )
    }
}

/// A specialized Result type for journal operations
pub type Result<T> = std::result::Result<T, JournalError>;
