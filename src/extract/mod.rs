//! Page extractor: walk the page array and reassemble the record stream.
//!
//! # Page layout
//!
//! Every page after the FCR region starts with a 6-byte header: a 4-byte
//! header word, then a 2-byte usage word.  Bit `0x8000` of the usage word
//! marks a data page; index, overflow and free pages have it clear and are
//! skipped whole.  The rest of a data page is carved into
//! `(page_size - 6) / physical_length` slots.
//!
//! # Slots
//!
//! On 6.x+ files (except compressed-fixed) each slot opens with a 2-byte live
//! marker.  Zero means the slot is free: it is skipped and consumes no output
//! index.  Otherwise the `physical_length - 2` bytes after the marker are the
//! record.  Older files, and compressed-fixed records, copy the whole slot.
//!
//! # Termination
//!
//! Btrieve allocates whole pages, so the last data page usually carries unused
//! slots.  Extraction stops as soon as `record_count` records are collected.
//! Reaching the end of the file first is a short yield: logged and reported,
//! and an error only under [`ShortYieldPolicy::Fail`].
//!
//! # Parallel scan
//!
//! With the `parallel` feature and [`ExtractOptions::parallel`] set, pages are
//! classified concurrently with Rayon and then merged in ascending page order,
//! so the output is identical to the sequential path.  A page that fails to
//! read only fails the extraction if the merge gets that far.

use serde::Serialize;
use std::ops::Range;
use tracing::{debug, trace, warn};

use crate::buffer::ByteView;
use crate::error::{DecodeError, Result};
use crate::fcr::{FileDescriptor, LIVE_MARKER_SIZE, PAGE_HEADER_SIZE};

/// Offset of the usage word within a page.
pub const USAGE_WORD_OFFSET: usize = 0x04;
/// Usage-word bit marking a data page.
pub const DATA_PAGE_FLAG: u16 = 0x8000;

// ── Options ──────────────────────────────────────────────────────────────────

/// What to do when the file ends before `record_count` records are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortYieldPolicy {
    /// Return what was found; flag it in [`ExtractReport::status`].
    #[default]
    Warn,
    /// Fail with [`DecodeError::ShortYield`].
    Fail,
}

/// Configuration for [`extract`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub short_yield: ShortYieldPolicy,
    /// Scan pages concurrently.  Needs the `parallel` feature; ignored otherwise.
    pub parallel:    bool,
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Extracted records: a flat buffer of equally sized slots.
///
/// Every record is `physical_length` bytes wide.  For marker-prefixed
/// layouts only the first `payload_len` (= `physical_length - 2`) bytes carry
/// data and the last two are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Records {
    data:        Vec<u8>,
    record_len:  usize,
    payload_len: usize,
}

impl Records {
    fn with_capacity(record_len: usize, payload_len: usize, records: usize) -> Self {
        Self {
            data: Vec::with_capacity(records.saturating_mul(record_len)),
            record_len,
            payload_len,
        }
    }

    fn push(&mut self, payload: &[u8]) {
        self.data.extend_from_slice(payload);
        self.data.resize(self.data.len() + (self.record_len - payload.len()), 0);
    }

    pub fn len(&self) -> usize {
        if self.record_len == 0 { 0 } else { self.data.len() / self.record_len }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Width of every record in the output.
    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// Leading bytes of each record that hold file data.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.record_len)?;
        self.data.get(start..start.checked_add(self.record_len)?)
    }

    pub fn iter(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(self.record_len.max(1))
    }

    /// The whole stream, `len() * record_len()` bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl<'a> IntoIterator for &'a Records {
    type Item = &'a [u8];
    type IntoIter = std::slice::ChunksExact<'a, u8>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Whether the declared record count was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum YieldStatus {
    Complete,
    Short { expected: u32, found: u32 },
}

/// Counters gathered during one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    /// Whole pages in the file, FCR pages included.
    pub total_pages:      usize,
    /// Pages examined before extraction stopped.
    pub pages_scanned:    usize,
    pub data_pages:       usize,
    /// Index, overflow and free pages passed over.
    pub skipped_pages:    usize,
    /// Slots with a zero live marker.
    pub empty_slots:      usize,
    /// Bytes after the last whole page, never read.
    pub trailing_bytes:   usize,
    pub declared_records: u32,
    pub extracted:        usize,
    pub status:           YieldStatus,
}

impl ExtractReport {
    pub fn is_complete(&self) -> bool {
        self.status == YieldStatus::Complete
    }

    /// Summary line for display.
    pub fn summary(&self) -> String {
        format!(
            "{}/{} record(s) from {} data page(s); {} page(s) skipped, {} empty slot(s)",
            self.extracted,
            self.declared_records,
            self.data_pages,
            self.skipped_pages,
            self.empty_slots,
        )
    }
}

/// Result of [`extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub records: Records,
    pub report:  ExtractReport,
}

// ── Page classification ──────────────────────────────────────────────────────

/// One page's header, as listed by [`page_map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub index:   usize,
    pub offset:  usize,
    pub usage:   u16,
    pub is_data: bool,
}

/// Read the usage word of page `index`.
pub fn page_usage(bytes: &[u8], desc: &FileDescriptor, index: usize) -> Result<u16> {
    let offset = page_offset(desc.page_size as usize, index)?;
    ByteView::new(bytes).u16_at(offset.saturating_add(USAGE_WORD_OFFSET))
}

pub fn classify_page(bytes: &[u8], desc: &FileDescriptor, index: usize) -> Result<PageInfo> {
    let offset = page_offset(desc.page_size as usize, index)?;
    let usage = page_usage(bytes, desc, index)?;
    Ok(PageInfo { index, offset, usage, is_data: usage & DATA_PAGE_FLAG != 0 })
}

/// Classify every whole page after the FCR region.
pub fn page_map(bytes: &[u8], desc: &FileDescriptor) -> Result<Vec<PageInfo>> {
    (desc.first_data_page()..desc.total_pages())
        .map(|index| classify_page(bytes, desc, index))
        .collect()
}

fn page_offset(page_size: usize, index: usize) -> Result<usize> {
    page_size
        .checked_mul(index)
        .ok_or_else(|| DecodeError::geometry(format!("page {index} offset overflows")))
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Slot geometry shared by every data page.
#[derive(Debug, Clone, Copy)]
struct Layout {
    page_size:       usize,
    physical_length: usize,
    slots_per_page:  usize,
    live_marker:     bool,
    payload_len:     usize,
}

impl Layout {
    fn new(desc: &FileDescriptor) -> Result<Self> {
        desc.validate_geometry()?;
        let page_size       = desc.page_size as usize;
        let physical_length = desc.physical_length as usize;
        Ok(Self {
            page_size,
            physical_length,
            slots_per_page: (page_size - PAGE_HEADER_SIZE) / physical_length,
            live_marker:    desc.has_live_marker(),
            payload_len:    desc.payload_len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Payload starts at this absolute offset.
    Live(usize),
    Empty,
}

#[derive(Debug)]
struct PageScan {
    index: usize,
    /// `None` for non-data pages.
    slots: Option<Vec<Slot>>,
}

fn scan_page(view: ByteView<'_>, layout: &Layout, index: usize) -> Result<PageScan> {
    let page = page_offset(layout.page_size, index)?;
    let usage = view.u16_at(page + USAGE_WORD_OFFSET)?;
    if usage & DATA_PAGE_FLAG == 0 {
        return Ok(PageScan { index, slots: None });
    }

    let mut slots = Vec::with_capacity(layout.slots_per_page);
    for slot in 0..layout.slots_per_page {
        let record = page + PAGE_HEADER_SIZE + slot * layout.physical_length;
        if layout.live_marker {
            if view.u16_at(record)? == 0 {
                slots.push(Slot::Empty);
            } else {
                slots.push(Slot::Live(record + LIVE_MARKER_SIZE));
            }
        } else {
            slots.push(Slot::Live(record));
        }
    }
    Ok(PageScan { index, slots: Some(slots) })
}

#[cfg(feature = "parallel")]
fn merge_parallel(
    view:    ByteView<'_>,
    layout:  &Layout,
    desc:    &FileDescriptor,
    pages:   Range<usize>,
    records: Records,
) -> Result<(Records, ExtractReport)> {
    use rayon::prelude::*;

    // Per-page results are kept so an error on a page past the stopping
    // point is never surfaced, same as the sequential path.
    let scans: Vec<Result<PageScan>> = pages
        .into_par_iter()
        .map(|index| scan_page(view, layout, index))
        .collect();
    merge(scans, view, layout, desc, records)
}

#[cfg(not(feature = "parallel"))]
fn merge_parallel(
    view:    ByteView<'_>,
    layout:  &Layout,
    desc:    &FileDescriptor,
    pages:   Range<usize>,
    records: Records,
) -> Result<(Records, ExtractReport)> {
    debug!("built without the `parallel` feature; scanning sequentially");
    merge(pages.map(|i| scan_page(view, layout, i)), view, layout, desc, records)
}

/// Decode every live record of `bytes` in page-then-slot order.
pub fn extract(bytes: &[u8], desc: &FileDescriptor, options: &ExtractOptions) -> Result<Extraction> {
    let layout = Layout::new(desc)?;
    let view   = ByteView::new(bytes);
    let pages  = desc.first_data_page()..desc.total_pages().max(desc.first_data_page());

    // Never reserve more than the file can physically hold.
    let capacity = (desc.record_count as usize).min(pages.len().saturating_mul(layout.slots_per_page));
    let records = Records::with_capacity(layout.physical_length, layout.payload_len, capacity);

    debug!(
        total_pages = desc.total_pages(),
        slots_per_page = layout.slots_per_page,
        live_marker = layout.live_marker,
        declared = desc.record_count,
        "extracting records"
    );

    let (records, mut report) = if options.parallel {
        merge_parallel(view, &layout, desc, pages, records)?
    } else {
        merge(pages.map(|i| scan_page(view, &layout, i)), view, &layout, desc, records)?
    };

    if report.trailing_bytes > 0 {
        warn!(trailing_bytes = report.trailing_bytes, "file ends with a partial page");
    }

    let found = records.len() as u32;
    if found < desc.record_count {
        report.status = YieldStatus::Short { expected: desc.record_count, found };
        warn!(expected = desc.record_count, found, "file ended before the declared record count");
        if options.short_yield == ShortYieldPolicy::Fail {
            return Err(DecodeError::ShortYield { expected: desc.record_count, found });
        }
    }

    Ok(Extraction { records, report })
}

/// Extract with default options, returning only the records.
pub fn extract_records(bytes: &[u8], desc: &FileDescriptor) -> Result<Records> {
    extract(bytes, desc, &ExtractOptions::default()).map(|e| e.records)
}

/// Copy live slots into `records` in page order until the declared count is
/// reached.  A failed page scan is only reported once the merge reaches it.
fn merge<I>(
    scans:       I,
    view:        ByteView<'_>,
    layout:      &Layout,
    desc:        &FileDescriptor,
    mut records: Records,
) -> Result<(Records, ExtractReport)>
where
    I: IntoIterator<Item = Result<PageScan>>,
{
    let target = desc.record_count as usize;
    let mut report = ExtractReport {
        total_pages:      desc.total_pages(),
        pages_scanned:    0,
        data_pages:       0,
        skipped_pages:    0,
        empty_slots:      0,
        trailing_bytes:   desc.trailing_bytes(),
        declared_records: desc.record_count,
        extracted:        0,
        status:           YieldStatus::Complete,
    };

    'pages: for scan in scans {
        if records.len() >= target {
            break;
        }
        let PageScan { index, slots } = scan?;
        report.pages_scanned += 1;

        let Some(slots) = slots else {
            trace!(page = index, "skipping non-data page");
            report.skipped_pages += 1;
            continue;
        };
        report.data_pages += 1;

        for slot in slots {
            if records.len() >= target {
                break 'pages;
            }
            match slot {
                Slot::Empty => report.empty_slots += 1,
                Slot::Live(offset) => records.push(view.slice(offset, layout.payload_len)?),
            }
        }
    }

    report.extracted = records.len();
    Ok((records, report))
}
