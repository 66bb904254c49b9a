//! Data-directory parsers (C8): exports, imports, delay-load imports,
//! base relocations, attribute certificates. Each parser is handed the
//! section table and the relevant `DataDirectory` entry rather than the
//! whole image, so they stay independently testable.

mod base_relocations;
mod certificates;
mod delay_imports;
mod exports;
mod imports;

pub use base_relocations::{parse as parse_base_relocations, BaseRelocationBlock, BaseRelocationEntry, REL_BASED_ABSOLUTE};
pub use certificates::{parse as parse_certificates, write as write_certificates, Certificate};
pub use delay_imports::{parse as parse_delay_imports, DelayImportDescriptor};
pub use exports::{ExportDirectory, ExportedSymbol};
pub use imports::{parse as parse_imports, ImportDescriptor, ImportEntry};

pub use base_relocations::build as build_base_relocations;
