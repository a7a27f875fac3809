pub mod buffer;
pub mod error;
pub mod fcr;
pub mod record_type;
pub mod extract;
pub mod dump;

pub use buffer::{swap_words, ByteView};
pub use error::DecodeError;
pub use fcr::{load, FileDescriptor, Format, FcrSlot};
pub use record_type::{classify, RecordType};
pub use extract::{
    extract, extract_records, ExtractOptions, ExtractReport, Extraction, Records, ShortYieldPolicy,
    YieldStatus,
};

/// Load the FCR and extract every record in one call.
pub fn decode(
    bytes:   &[u8],
    options: &ExtractOptions,
) -> error::Result<(FileDescriptor, Extraction)> {
    let desc = load(bytes)?;
    let extraction = extract(bytes, &desc, options)?;
    Ok((desc, extraction))
}
