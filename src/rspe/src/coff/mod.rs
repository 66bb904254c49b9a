//! Byte-exact COFF/PE codec: parses and re-emits object files and
//! executable images, preserving every field a round trip doesn't
//! explicitly recompute.

mod buffer;
mod checksum;
mod directories;
mod dos;
mod error;
mod file_header;
mod image;
mod layout;
mod machine;
mod optional_header;
mod rva;
mod section;
mod strings;
mod symbol;

pub use buffer::Stream;
pub use checksum::{checksum_field_offset, compute as compute_checksum};
pub use directories::{
    build_base_relocations, parse_base_relocations, parse_certificates, parse_delay_imports, parse_imports,
    write_certificates, BaseRelocationBlock, BaseRelocationEntry, Certificate, DelayImportDescriptor,
    ExportDirectory, ExportedSymbol, ImportDescriptor, ImportEntry, REL_BASED_ABSOLUTE,
};
pub use dos::{DosHeader, DEFAULT_DOS_STUB, DOS_HEADER_SIZE, PE_SIGNATURE};
pub use error::{Error, Result};
pub use file_header::{FileCharacteristics, FileHeader, FILE_HEADER_SIZE};
pub use image::{new_empty_pe_image, Image, ReadOptions};
pub use machine::{
    ImageRelAmd64Type, ImageRelArmType, ImageRelBasedType, ImageRelI386Type, Machine,
    IMAGE_FILE_MACHINE_AMD64, IMAGE_FILE_MACHINE_ARM, IMAGE_FILE_MACHINE_ARM64, IMAGE_FILE_MACHINE_ARMNT,
    IMAGE_FILE_MACHINE_I386, IMAGE_FILE_MACHINE_UNKNOWN,
};
pub use optional_header::{
    DataDirectory, DllCharacteristics, NtFields, OptionalHeader, StandardFields, DIRECTORY_ARCHITECTURE,
    DIRECTORY_BASE_RELOCATIONS, DIRECTORY_BOUND_IMPORTS, DIRECTORY_CERTIFICATES, DIRECTORY_CLR_RUNTIME_HEADER,
    DIRECTORY_DEBUG, DIRECTORY_DELAY_IMPORTS, DIRECTORY_EXCEPTIONS, DIRECTORY_EXPORTS, DIRECTORY_GLOBAL_POINTERS,
    DIRECTORY_IMPORTS, DIRECTORY_IMPORT_ADDRESSES, DIRECTORY_LOAD_CONFIG, DIRECTORY_RESOURCES, DIRECTORY_TLS,
    MAGIC_PE32, MAGIC_PE32_PLUS, MAGIC_ROM,
};
pub use rva::{section_for_rva, try_read_ascii_string_at, try_read_u32_at};
pub use section::{LineNumber, Relocation, Section, SectionCharacteristics, SectionHeader, SECTION_HEADER_SIZE};
pub use strings::StringTable;
pub use symbol::{Symbol, SymbolName, SECTION_NUMBER_ABSOLUTE, SECTION_NUMBER_DEBUG, SECTION_NUMBER_UNDEFINED};
