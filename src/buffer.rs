//! Bounds-checked field access over the raw file image.
//!
//! Every on-disk field is little-endian.  Reads go through [`ByteView`],
//! which validates the full `offset..offset + width` range against the
//! buffer before touching it and fails with
//! [`DecodeError::TruncatedFile`] otherwise.  No read ever panics.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DecodeError, Result};

/// Undo Btrieve's word-swapping of 32-bit counters.
///
/// The two 16-bit halves are stored transposed; swapping them again restores
/// the value, so the function is its own inverse.
#[inline]
pub fn swap_words(n: u32) -> u32 {
    ((n >> 16) & 0xFFFF) | (n << 16)
}

/// Read-only window over the complete file image.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    bytes: &'a [u8],
    // Absolute offset of `bytes[0]`; keeps error offsets file-relative.
    base:  usize,
}

impl<'a> ByteView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, base: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(DecodeError::TruncatedFile {
                offset: self.base.saturating_add(offset),
                len,
                file_size: self.base + self.bytes.len(),
            })
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn i8_at(&self, offset: usize) -> Result<i8> {
        Ok(self.u8_at(offset)? as i8)
    }

    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.slice(offset, 2)?))
    }

    pub fn i16_at(&self, offset: usize) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.slice(offset, 2)?))
    }

    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.slice(offset, 4)?))
    }

    /// Read a 32-bit counter stored with its halves transposed.
    pub fn swapped_u32_at(&self, offset: usize) -> Result<u32> {
        Ok(swap_words(self.u32_at(offset)?))
    }

    /// A sub-view starting at `offset` and running to the end of the buffer.
    ///
    /// Offsets inside the sub-view are relative to `offset`, which is how the
    /// two FCR candidates are addressed.
    pub fn at(&self, offset: usize) -> Result<ByteView<'a>> {
        let rest = self.bytes.get(offset..).ok_or(DecodeError::TruncatedFile {
            offset: self.base.saturating_add(offset),
            len: 0,
            file_size: self.base + self.bytes.len(),
        })?;
        Ok(ByteView { bytes: rest, base: self.base + offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_words_transposes_halves() {
        assert_eq!(swap_words(0x0001_0002), 0x0002_0001);
        assert_eq!(swap_words(0xDEAD_BEEF), 0xBEEF_DEAD);
        assert_eq!(swap_words(0), 0);
    }

    #[test]
    fn reads_little_endian_fields() {
        let bytes = [0x46, 0x43, 0xFE, 0xFF, 0x02, 0x00, 0x01, 0x00];
        let view = ByteView::new(&bytes);
        assert_eq!(view.u16_at(0).unwrap(), 0x4346);
        assert_eq!(view.i16_at(2).unwrap(), -2);
        assert_eq!(view.i8_at(2).unwrap(), -2);
        assert_eq!(view.u32_at(4).unwrap(), 0x0001_0002);
        assert_eq!(view.swapped_u32_at(4).unwrap(), 0x0002_0001);
    }

    #[test]
    fn out_of_range_read_is_truncation() {
        let bytes = [0u8; 4];
        let view = ByteView::new(&bytes);
        assert_eq!(
            view.u32_at(1),
            Err(DecodeError::TruncatedFile { offset: 1, len: 4, file_size: 4 })
        );
        assert!(view.u16_at(usize::MAX).is_err());
        assert!(view.at(5).is_err());
    }

    #[test]
    fn sub_view_is_relative() {
        let bytes = [0u8, 0, 0, 0, 0x34, 0x12];
        let view = ByteView::new(&bytes).at(4).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.u16_at(0).unwrap(), 0x1234);
        assert_eq!(
            view.u16_at(1),
            Err(DecodeError::TruncatedFile { offset: 5, len: 2, file_size: 6 })
        );
    }
}
