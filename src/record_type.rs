//! Record-storage classification from FCR flag bits.
//!
//! The flag bits overlap between file versions, so the outcome depends on
//! the order in which they are tested.  [`RULES`] is that order, first match
//! wins.  The table is kept literal; do not fold it into a boolean formula.

use serde::Serialize;
use std::fmt;

use crate::fcr::Format;

/// `user_flags` bit: records are variable length.
pub const FLAG_VARIABLE:   u16 = 0x0001;
/// `user_flags` bit: trailing blanks of variable records are truncated.
pub const FLAG_TRUNCATE:   u16 = 0x0002;
/// `user_flags` bit: records are compressed.
pub const FLAG_COMPRESSED: u16 = 0x0008;
/// `user_flags` bit (6.x+ only): variable tail allocation table in use.
pub const FLAG_VAT:        u16 = 0x0800;

/// `virtual_records_ok` value that marks truncated variable records.
pub const VIRTUAL_TRUNCATED: u8 = 0xFD;

/// On-disk record layout of a Btrieve file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordType {
    FixedLength,
    CompressedFixedLength,
    VariableLength,
    CompressedVariableLength,
    TruncatedVariableLength,
    VariableTailAllocationTable,
}

impl RecordType {
    pub fn name(self) -> &'static str {
        match self {
            RecordType::FixedLength                 => "fixed",
            RecordType::CompressedFixedLength       => "compressed fixed",
            RecordType::VariableLength              => "variable",
            RecordType::CompressedVariableLength    => "compressed variable",
            RecordType::TruncatedVariableLength     => "truncated variable",
            RecordType::VariableTailAllocationTable => "variable (VAT)",
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, RecordType::CompressedFixedLength | RecordType::CompressedVariableLength)
    }

    pub fn is_variable(self) -> bool {
        !matches!(self, RecordType::FixedLength | RecordType::CompressedFixedLength)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The three FCR values the classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagInputs {
    pub format:             Format,
    pub virtual_records_ok: i8,
    pub user_flags:         i16,
}

impl FlagInputs {
    #[inline]
    fn flag(&self, bit: u16) -> bool {
        self.user_flags as u16 & bit != 0
    }

    fn compressed(&self) -> bool {
        self.flag(FLAG_COMPRESSED)
    }

    fn variable(&self) -> bool {
        self.virtual_records_ok != 0 || self.flag(FLAG_VARIABLE)
    }

    // `virtual_records_ok` is stored signed; the 0xFD marker is compared as
    // the raw unsigned byte.
    fn truncated(&self) -> bool {
        self.virtual_records_ok as u8 == VIRTUAL_TRUNCATED || self.flag(FLAG_TRUNCATE)
    }

    fn vat(&self) -> bool {
        self.format == Format::New && self.flag(FLAG_VAT)
    }
}

pub type Predicate = fn(&FlagInputs) -> bool;

/// Classification rules in precedence order.
pub const RULES: &[(Predicate, RecordType)] = &[
    (|i: &FlagInputs| i.compressed() && i.variable(), RecordType::CompressedVariableLength),
    (|i: &FlagInputs| i.vat(),                        RecordType::VariableTailAllocationTable),
    (|i: &FlagInputs| i.compressed(),                 RecordType::CompressedFixedLength),
    (|i: &FlagInputs| i.variable() && i.truncated(),  RecordType::TruncatedVariableLength),
    (|i: &FlagInputs| i.variable(),                   RecordType::VariableLength),
];

/// Classify a file's record layout.  Pure and total.
pub fn classify(format: Format, virtual_records_ok: i8, user_flags: i16) -> RecordType {
    let inputs = FlagInputs { format, virtual_records_ok, user_flags };
    RULES
        .iter()
        .find(|(rule, _)| rule(&inputs))
        .map(|&(_, record_type)| record_type)
        .unwrap_or(RecordType::FixedLength)
}
