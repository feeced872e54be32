use crate::core::header::Tgi;
use crate::core::pointer::Pointer;
use thiserror::Error;

/// Coarse classification of a [`DbpfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Container or record layout is malformed
    Format,
    /// Compressed stream could not be decoded
    Codec,
    /// The pointer graph is inconsistent
    Integrity,
    /// Stored checksum does not match the payload
    Checksum,
    /// Reading or writing the backing file failed
    Io,
    /// Configuration could not be parsed
    Config,
    /// The requested entry or record does not exist
    Lookup,
}

#[derive(Error, Debug)]
pub enum DbpfError {
    #[error("Invalid signature: expected DBPF, found {0:02x?}")]
    InvalidSignature([u8; 4]),

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("Unsupported index version: {major}.{minor}")]
    UnsupportedIndexVersion { major: u32, minor: u32 },

    #[error("Directory table at {offset:#x} ({size} bytes) extends past buffer of {len} bytes")]
    DirectoryOutOfBounds { offset: u32, size: u32, len: usize },

    #[error("Entry {tgi} at {offset:#x} ({size} bytes) extends past buffer of {len} bytes")]
    EntryOutOfBounds {
        tgi: Tgi,
        offset: u32,
        size: u32,
        len: usize,
    },

    #[error("Unexpected end of data at {position}: needed {needed} more bytes")]
    UnexpectedEof { position: usize, needed: usize },

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Failed to decode record of type {type_id:#010x} at offset {offset:#x}: {source}")]
    Record {
        type_id: u32,
        offset: u32,
        #[source]
        source: Box<DbpfError>,
    },

    #[error("No codec registered for type {0:#010x}")]
    UnsupportedType(u32),

    #[error("Record type mismatch: expected {expected:#010x}, found {found:#010x}")]
    TypeMismatch { expected: u32, found: u32 },

    #[error("Invalid compression header")]
    InvalidCompressionHeader,

    #[error("Decompressed size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Back-reference {distance} bytes behind output position {position}")]
    InvalidBackReference { position: usize, distance: usize },

    #[error("Compressed stream truncated at {0}")]
    TruncatedStream(usize),

    #[error("Compressed stream overruns its declared size of {0} bytes")]
    OutputOverrun(usize),

    #[error("Duplicate mem address {0:#010x}")]
    DuplicateAddress(u32),

    #[error("Pointer {pointer} does not resolve")]
    DanglingPointer { pointer: Pointer },

    #[error("Null pointer in non-nullable slot of {owner:#010x}")]
    NullPointer { owner: u32 },

    #[error("Checksum mismatch for mem {mem:#010x}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { mem: u32, stored: u32, computed: u32 },

    #[error("Entry not found: {0}")]
    EntryNotFound(Tgi),

    #[error("No subfile of type {0:#010x}")]
    MissingSubfile(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbpfError {
    /// Classify the error, looking through record context wrappers.
    pub fn kind(&self) -> ErrorKind {
        use DbpfError::*;
        match self {
            Record { source, .. } => source.kind(),
            InvalidSignature(_)
            | UnsupportedVersion { .. }
            | UnsupportedIndexVersion { .. }
            | DirectoryOutOfBounds { .. }
            | EntryOutOfBounds { .. }
            | UnexpectedEof { .. }
            | Malformed(_)
            | UnsupportedType(_)
            | TypeMismatch { .. } => ErrorKind::Format,
            InvalidCompressionHeader
            | SizeMismatch { .. }
            | InvalidBackReference { .. }
            | TruncatedStream(_)
            | OutputOverrun(_) => ErrorKind::Codec,
            DuplicateAddress(_) | DanglingPointer { .. } | NullPointer { .. } => {
                ErrorKind::Integrity
            }
            ChecksumMismatch { .. } => ErrorKind::Checksum,
            Io(_) => ErrorKind::Io,
            Config(_) | Serialization(_) => ErrorKind::Config,
            EntryNotFound(_) | MissingSubfile(_) => ErrorKind::Lookup,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DbpfError::Malformed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DbpfError>;
