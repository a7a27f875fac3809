//! File Control Record (FCR), the header page(s) describing file geometry.
//!
//! # Layout (little-endian, offsets relative to the active FCR)
//!
//! | Offset  | Width | Field                                            |
//! |---------|-------|--------------------------------------------------|
//! | `0x00`  | 2     | signature: `0x0000` pre-6.x, `0x4346` 6.x+ ("FC")|
//! | `0x04`  | 4     | usage counter (6.x+, selects the active copy)    |
//! | `0x08`  | 2     | page size                                        |
//! | `0x18`  | 2     | physical record length, including overhead      |
//! | `0x1A`  | 4     | record count, word-swapped                       |
//! | `0x26`  | 4     | page count, word-swapped                         |
//! | `0x38`  | 1     | `virtual_records_ok` (signed)                    |
//! | `0x106` | 2     | user flags (signed)                              |
//!
//! Signature and page size are always read from offset 0 of the file.
//!
//! # Dual FCR
//!
//! 6.x+ files keep two FCR copies, on page 0 and page 1.  An update writes
//! the stale copy and bumps its usage counter, so the copy with the strictly
//! greater counter is current and the other is the previous snapshot.  Equal
//! counters keep page 0.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::buffer::ByteView;
use crate::error::{DecodeError, Result};
use crate::record_type::{classify, RecordType};

pub const SIGNATURE_OLD: u16 = 0x0000;
pub const SIGNATURE_NEW: u16 = 0x4346;

/// Offset of the page size, always read from the start of the file.
pub const PAGE_SIZE_OFFSET: usize = 0x08;

// FCR-relative field offsets.
pub const USAGE_COUNT_OFFSET:        usize = 0x04;
pub const PHYSICAL_LENGTH_OFFSET:    usize = 0x18;
pub const RECORD_COUNT_OFFSET:       usize = 0x1A;
pub const PAGE_COUNT_OFFSET:         usize = 0x26;
pub const VIRTUAL_RECORDS_OK_OFFSET: usize = 0x38;
pub const USER_FLAGS_OFFSET:         usize = 0x106;

/// Btrieve container generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Format {
    /// Pre-6.x: no signature, a single FCR on page 0.
    Old,
    /// 6.x and later: `FC` signature, FCR pair on pages 0 and 1.
    New,
}

impl Format {
    pub fn from_signature(signature: u16) -> Option<Self> {
        match signature {
            SIGNATURE_OLD => Some(Format::Old),
            SIGNATURE_NEW => Some(Format::New),
            _             => None,
        }
    }

    /// Number of pages occupied by FCR copies at the start of the file.
    pub fn fcr_pages(self) -> usize {
        match self {
            Format::Old => 1,
            Format::New => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Old => "pre-6.x",
            Format::New => "6.x+",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which FCR copy was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FcrSlot {
    First,
    Second,
}

/// File geometry and record layout, derived once from the active FCR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub format:             Format,
    pub page_size:          u16,
    /// Bytes per stored record slot, including length prefix or pointers.
    pub physical_length:    i16,
    /// Declared live records (un-swapped).
    pub record_count:       u32,
    /// Declared pages (un-swapped).  Informational; iteration uses `file_size`.
    pub page_count:         u32,
    pub record_type:        RecordType,
    /// Actual length of the backing buffer.
    pub file_size:          usize,
    pub active_fcr:         FcrSlot,
    /// Usage counter of the active FCR; `None` for the single-FCR format.
    pub fcr_usage:          Option<u32>,
    pub virtual_records_ok: i8,
    pub user_flags:         i16,
}

impl FileDescriptor {
    /// Decode the FCR of a complete in-memory file image.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let view = ByteView::new(bytes);

        let signature = view.u16_at(0)?;
        let format = Format::from_signature(signature)
            .ok_or(DecodeError::UnrecognizedFormat { signature })?;

        let page_size = view.u16_at(PAGE_SIZE_OFFSET)?;
        if page_size == 0 {
            return Err(DecodeError::geometry("page size is 0"));
        }

        let (active_fcr, fcr_usage) = match format {
            Format::Old => (FcrSlot::First, None),
            Format::New => {
                let (slot, usage) = select_active_fcr(view, page_size as usize)?;
                (slot, Some(usage))
            }
        };
        let fcr = view.at(fcr_offset(active_fcr, page_size))?;

        let physical_length    = fcr.i16_at(PHYSICAL_LENGTH_OFFSET)?;
        let record_count       = fcr.swapped_u32_at(RECORD_COUNT_OFFSET)?;
        let page_count         = fcr.swapped_u32_at(PAGE_COUNT_OFFSET)?;
        let virtual_records_ok = fcr.i8_at(VIRTUAL_RECORDS_OK_OFFSET)?;
        let user_flags         = fcr.i16_at(USER_FLAGS_OFFSET)?;

        let record_type = classify(format, virtual_records_ok, user_flags);
        debug!(
            %format, page_size, physical_length, record_count, page_count,
            virtual_records_ok, user_flags, %record_type,
            "decoded FCR"
        );

        Ok(Self {
            format,
            page_size,
            physical_length,
            record_count,
            page_count,
            record_type,
            file_size: bytes.len(),
            active_fcr,
            fcr_usage,
            virtual_records_ok,
            user_flags,
        })
    }

    /// Whole pages present in the buffer.  A trailing partial page is ignored.
    pub fn total_pages(&self) -> usize {
        self.file_size.checked_div(self.page_size as usize).unwrap_or(0)
    }

    /// Index of the first page after the FCR region.
    pub fn first_data_page(&self) -> usize {
        self.format.fcr_pages()
    }

    /// Bytes past the last whole page.
    pub fn trailing_bytes(&self) -> usize {
        self.file_size.checked_rem(self.page_size as usize).unwrap_or(0)
    }

    /// Whether each slot starts with a 2-byte live marker.
    ///
    /// 6.x+ files prefix every slot except compressed-fixed ones.
    pub fn has_live_marker(&self) -> bool {
        self.format == Format::New && self.record_type != RecordType::CompressedFixedLength
    }

    /// Record bytes actually copied out of each slot.
    pub fn payload_len(&self) -> usize {
        let physical = self.physical_length.max(0) as usize;
        if self.has_live_marker() {
            physical.saturating_sub(LIVE_MARKER_SIZE)
        } else {
            physical
        }
    }

    /// Check that pages can be carved into record slots.
    pub fn validate_geometry(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(DecodeError::geometry("page size is 0"));
        }
        if self.physical_length <= 0 {
            return Err(DecodeError::geometry(format!(
                "physical record length {} is not positive",
                self.physical_length
            )));
        }
        if self.page_size as usize <= PAGE_HEADER_SIZE {
            return Err(DecodeError::geometry(format!(
                "page size {} does not exceed the {PAGE_HEADER_SIZE}-byte page header",
                self.page_size
            )));
        }
        if self.has_live_marker() && (self.physical_length as usize) <= LIVE_MARKER_SIZE {
            return Err(DecodeError::geometry(format!(
                "physical record length {} leaves no room after the live marker",
                self.physical_length
            )));
        }
        Ok(())
    }
}

/// Size of the page header: 4-byte header word plus 2-byte usage word.
pub const PAGE_HEADER_SIZE: usize = 6;
/// Size of the per-slot live marker in 6.x+ variable-style slots.
pub const LIVE_MARKER_SIZE: usize = 2;

/// Decode the FCR of `bytes`.  See [`FileDescriptor::load`].
pub fn load(bytes: &[u8]) -> Result<FileDescriptor> {
    FileDescriptor::load(bytes)
}

fn fcr_offset(slot: FcrSlot, page_size: u16) -> usize {
    match slot {
        FcrSlot::First  => 0,
        FcrSlot::Second => page_size as usize,
    }
}

/// Compare the two FCR usage counters.  The second copy wins only when its
/// counter is strictly greater.
///
/// Counters compare as unsigned; a signed reading would disagree once a
/// counter reaches 2^31.
fn select_active_fcr(view: ByteView<'_>, page_size: usize) -> Result<(FcrSlot, u32)> {
    let first  = view.u32_at(USAGE_COUNT_OFFSET)?;
    let second = view.u32_at(page_size + USAGE_COUNT_OFFSET)?;
    let selected = if second > first {
        (FcrSlot::Second, second)
    } else {
        (FcrSlot::First, first)
    };
    debug!(first, second, active = ?selected.0, "selected active FCR");
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    const PAGE: usize = 512;

    fn put_fcr(buf: &mut [u8], base: usize, usage: u32, physical_length: i16, record_count: u32) {
        LittleEndian::write_u32(&mut buf[base + USAGE_COUNT_OFFSET..], usage);
        LittleEndian::write_i16(&mut buf[base + PHYSICAL_LENGTH_OFFSET..], physical_length);
        LittleEndian::write_u32(
            &mut buf[base + RECORD_COUNT_OFFSET..],
            crate::buffer::swap_words(record_count),
        );
    }

    fn image(signature: u16, pages: usize) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE * pages];
        LittleEndian::write_u16(&mut buf[0..], signature);
        LittleEndian::write_u16(&mut buf[PAGE_SIZE_OFFSET..], PAGE as u16);
        buf
    }

    #[test]
    fn old_format_reads_page_zero() {
        let mut buf = image(SIGNATURE_OLD, 2);
        put_fcr(&mut buf, 0, 0, 50, 10);
        LittleEndian::write_u32(&mut buf[PAGE_COUNT_OFFSET..], 0x0002_0000);

        let desc = load(&buf).unwrap();
        assert_eq!(desc.format, Format::Old);
        assert_eq!(desc.page_size, 512);
        assert_eq!(desc.physical_length, 50);
        assert_eq!(desc.record_count, 10);
        assert_eq!(desc.page_count, 2);
        assert_eq!(desc.active_fcr, FcrSlot::First);
        assert_eq!(desc.fcr_usage, None);
        assert_eq!(desc.record_type, RecordType::FixedLength);
        assert_eq!(desc.file_size, 1024);
    }

    #[test]
    fn new_format_prefers_strictly_greater_usage() {
        let mut buf = image(SIGNATURE_NEW, 3);
        put_fcr(&mut buf, 0, 4, 20, 1);
        put_fcr(&mut buf, PAGE, 5, 30, 2);
        let desc = load(&buf).unwrap();
        assert_eq!(desc.active_fcr, FcrSlot::Second);
        assert_eq!(desc.fcr_usage, Some(5));
        assert_eq!(desc.physical_length, 30);
        assert_eq!(desc.record_count, 2);

        put_fcr(&mut buf, 0, 9, 20, 1);
        let desc = load(&buf).unwrap();
        assert_eq!(desc.active_fcr, FcrSlot::First);
        assert_eq!(desc.physical_length, 20);
    }

    #[test]
    fn new_format_tie_keeps_first() {
        let mut buf = image(SIGNATURE_NEW, 3);
        put_fcr(&mut buf, 0, 7, 20, 1);
        put_fcr(&mut buf, PAGE, 7, 30, 2);
        let desc = load(&buf).unwrap();
        assert_eq!(desc.active_fcr, FcrSlot::First);
        assert_eq!(desc.physical_length, 20);
    }

    #[test]
    fn usage_counters_compare_unsigned() {
        let mut buf = image(SIGNATURE_NEW, 3);
        put_fcr(&mut buf, 0, 0x8000_0000, 20, 1);
        put_fcr(&mut buf, PAGE, 1, 30, 2);
        let desc = load(&buf).unwrap();
        assert_eq!(desc.active_fcr, FcrSlot::First);
        assert_eq!(desc.fcr_usage, Some(0x8000_0000));

        put_fcr(&mut buf, PAGE, 0xFFFF_FFFF, 30, 2);
        let desc = load(&buf).unwrap();
        assert_eq!(desc.active_fcr, FcrSlot::Second);
    }

    #[test]
    fn unknown_signature_is_rejected() {
        let buf = image(0x1234, 1);
        assert_eq!(load(&buf), Err(DecodeError::UnrecognizedFormat { signature: 0x1234 }));
    }

    #[test]
    fn zero_page_size_is_invalid_geometry() {
        let mut buf = image(SIGNATURE_OLD, 1);
        LittleEndian::write_u16(&mut buf[PAGE_SIZE_OFFSET..], 0);
        assert!(matches!(load(&buf), Err(DecodeError::InvalidGeometry { .. })));
    }

    #[test]
    fn short_buffers_are_truncated() {
        assert!(matches!(load(&[]), Err(DecodeError::TruncatedFile { .. })));

        // Header fits, but the page count at 0x26 does not.
        let mut header = [0u8; 0x20];
        LittleEndian::write_u16(&mut header[PAGE_SIZE_OFFSET..], PAGE as u16);
        assert_eq!(
            load(&header),
            Err(DecodeError::TruncatedFile { offset: PAGE_COUNT_OFFSET, len: 4, file_size: 0x20 })
        );

        // Second FCR candidate lies past the end.
        let buf = image(SIGNATURE_NEW, 1);
        assert!(matches!(load(&buf), Err(DecodeError::TruncatedFile { .. })));
    }

    #[test]
    fn geometry_validation() {
        let mut buf = image(SIGNATURE_OLD, 2);
        put_fcr(&mut buf, 0, 0, 0, 1);
        let desc = load(&buf).unwrap();
        assert!(matches!(desc.validate_geometry(), Err(DecodeError::InvalidGeometry { .. })));

        put_fcr(&mut buf, 0, 0, -4, 1);
        let desc = load(&buf).unwrap();
        assert!(desc.validate_geometry().is_err());

        put_fcr(&mut buf, 0, 0, 50, 1);
        let desc = load(&buf).unwrap();
        assert!(desc.validate_geometry().is_ok());

        let mut tiny = desc.clone();
        tiny.page_size = PAGE_HEADER_SIZE as u16;
        assert!(tiny.validate_geometry().is_err());

        let mut marker = desc;
        marker.format = Format::New;
        marker.physical_length = 2;
        assert!(marker.validate_geometry().is_err());
    }

    #[test]
    fn payload_len_strips_live_marker() {
        let mut buf = image(SIGNATURE_NEW, 3);
        put_fcr(&mut buf, 0, 1, 40, 1);
        let desc = load(&buf).unwrap();
        assert!(desc.has_live_marker());
        assert_eq!(desc.payload_len(), 38);

        LittleEndian::write_i16(&mut buf[USER_FLAGS_OFFSET..], 0x0008);
        let desc = load(&buf).unwrap();
        assert_eq!(desc.record_type, RecordType::CompressedFixedLength);
        assert!(!desc.has_live_marker());
        assert_eq!(desc.payload_len(), 40);
    }

    #[test]
    fn page_arithmetic() {
        let mut buf = image(SIGNATURE_OLD, 3);
        buf.extend_from_slice(&[0u8; 100]);
        put_fcr(&mut buf, 0, 0, 50, 1);
        let desc = load(&buf).unwrap();
        assert_eq!(desc.total_pages(), 3);
        assert_eq!(desc.first_data_page(), 1);
        assert_eq!(desc.trailing_bytes(), 100);
    }
}
