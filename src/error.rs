use thiserror::Error;

/// Everything that can stop a Btrieve file from decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The two bytes at offset 0 are neither `0x0000` nor `0x4346`.
    #[error("Unrecognized format signature: {signature:#06x}")]
    UnrecognizedFormat { signature: u16 },

    /// Page size or record length cannot describe a usable page layout.
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// A read of `len` bytes at `offset` runs past the end of the buffer.
    #[error("Truncated file: {len} byte(s) at offset {offset:#x} exceed file size {file_size}")]
    TruncatedFile { offset: usize, len: usize, file_size: usize },

    /// Fewer live records were found than the FCR declares.
    /// Only returned under [`ShortYieldPolicy::Fail`](crate::extract::ShortYieldPolicy::Fail).
    #[error("Short yield: FCR declares {expected} record(s), found {found}")]
    ShortYield { expected: u32, found: u32 },
}

impl DecodeError {
    pub(crate) fn geometry(reason: impl Into<String>) -> Self {
        DecodeError::InvalidGeometry { reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
