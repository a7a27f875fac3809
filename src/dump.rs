//! Record rendering for the command-line tool.
//!
//! `spaced` prints one record per line, each byte as two lowercase hex
//! digits followed by a space.  `json` emits a single document holding the
//! descriptor, the extraction report and the records as hex strings.

use serde::Serialize;
use std::io::{self, Write};

use crate::extract::{ExtractReport, Extraction, Records};
use crate::fcr::FileDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Spaced,
    Json,
}

impl DumpFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "spaced" | "hex" => Some(DumpFormat::Spaced),
            "json"           => Some(DumpFormat::Json),
            _                => None,
        }
    }
}

/// Write each record as a line of space-separated hex bytes.
pub fn write_spaced<W: Write>(mut out: W, records: &Records) -> io::Result<()> {
    for record in records {
        for byte in record {
            write!(out, "{byte:02x} ")?;
        }
        out.write_all(b"\n")?;
    }
    out.flush()
}

#[derive(Serialize)]
struct DumpDocument<'a> {
    descriptor: &'a FileDescriptor,
    report:     &'a ExtractReport,
    records:    Vec<String>,
}

pub fn write_json<W: Write>(out: W, desc: &FileDescriptor, extraction: &Extraction) -> io::Result<()> {
    let doc = DumpDocument {
        descriptor: desc,
        report:     &extraction.report,
        records:    extraction.records.iter().map(hex::encode).collect(),
    };
    serde_json::to_writer_pretty(out, &doc)?;
    Ok(())
}

pub fn write_records<W: Write>(
    out:        W,
    format:     DumpFormat,
    desc:       &FileDescriptor,
    extraction: &Extraction,
) -> io::Result<()> {
    match format {
        DumpFormat::Spaced => write_spaced(out, &extraction.records),
        DumpFormat::Json   => write_json(out, desc, extraction),
    }
}
