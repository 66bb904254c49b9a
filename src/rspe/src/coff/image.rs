use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use super::buffer::{position, read_be_u32, write_be_u32, Stream};
use super::checksum::{self, checksum_field_offset};
use super::directories::{
    self, BaseRelocationBlock, Certificate, DelayImportDescriptor, ExportDirectory, ImportDescriptor,
};
use super::dos::{DosHeader, DEFAULT_DOS_STUB, DOS_HEADER_SIZE, PE_SIGNATURE};
use super::error::{Error, IoContext, Result};
use super::file_header::{FileHeader, FILE_HEADER_SIZE};
use super::layout;
use super::optional_header::{
    OptionalHeader, DIRECTORY_BASE_RELOCATIONS, DIRECTORY_CERTIFICATES, DIRECTORY_DELAY_IMPORTS,
    DIRECTORY_EXPORTS, DIRECTORY_IMPORTS,
};
use super::rva;
use super::section::{Section, SectionHeader};
use super::strings::StringTable;
use super::symbol::Symbol;

/// Recognized flags for `Image::parse`'s read options. Currently only
/// `STRIP_OVERLAY` exists — there is no configuration file or
/// environment-driven config surface for a library; options are whatever
/// the caller passes as a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions(u32);

impl ReadOptions {
    pub const STRIP_OVERLAY: u32 = 0x0000_0001;

    pub fn none() -> ReadOptions {
        ReadOptions(0)
    }

    pub fn check_flag(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn strips_overlay(&self) -> bool {
        self.check_flag(Self::STRIP_OVERLAY)
    }
}

impl From<u32> for ReadOptions {
    fn from(value: u32) -> Self {
        ReadOptions(value)
    }
}

/// Aggregates every component (C2–C6 plus the PE-specific post-section
/// structures) behind a single parse/emit entry point (C7). A `None`
/// `dos_header`/`optional_header` marks a COFF object file rather than a
/// PE image — object files have neither a DOS header nor (usually) an
/// optional header.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub dos_header: Option<DosHeader>,
    pub dos_stub: Vec<u8>,
    pub file_header: FileHeader,
    pub optional_header: Option<OptionalHeader>,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    pub string_table: StringTable,
    pub overlay: Vec<u8>,
    pub exports: Option<ExportDirectory>,
    pub imports: Vec<ImportDescriptor>,
    pub delay_imports: Vec<DelayImportDescriptor>,
    pub base_relocations: Option<Vec<BaseRelocationBlock>>,
    pub certificates: Vec<Certificate>,
    layout_suspended: bool,
}

impl Image {
    /// Parses a PE image or COFF object file from `stream`. Detected by
    /// peeking the first two bytes for the `"MZ"` DOS signature: object
    /// files begin directly with the COFF file header.
    pub fn parse<S: Stream>(stream: &mut S, options: ReadOptions) -> Result<Image> {
        let start = position(stream)?;
        let mut peek = [0u8; 2];
        stream.read_exact(&mut peek).ctx("image signature probe")?;
        stream.seek(SeekFrom::Start(start))?;
        let is_pe = peek == [0x4D, 0x5A];

        if is_pe {
            Self::parse_pe(stream, options)
        } else {
            Self::parse_object(stream)
        }
    }

    fn parse_pe<S: Stream>(stream: &mut S, options: ReadOptions) -> Result<Image> {
        let dos_header = DosHeader::read(stream)?;
        let stub_len = (dos_header.e_lfanew as u64).saturating_sub(DOS_HEADER_SIZE);
        let mut dos_stub = vec![0u8; stub_len as usize];
        stream.read_exact(&mut dos_stub).ctx("DOS stub")?;

        let signature = read_be_u32(stream)?;
        if signature != PE_SIGNATURE {
            return Err(Error::InvalidImageSignature { found: signature });
        }

        let file_header = FileHeader::read(stream)?;
        let optional_header = if file_header.optional_header_size > 0 {
            Some(OptionalHeader::read(stream, file_header.optional_header_size)?)
        } else {
            None
        };

        let sections = Self::read_sections(stream, &file_header)?;
        let (symbols, string_table) = Self::read_symbols_and_strings(stream, &file_header)?;

        let (exports, imports, delay_imports, base_relocations) = match &optional_header {
            Some(oh) => Self::parse_directories(stream, &file_header, oh, &sections)?,
            None => (None, Vec::new(), Vec::new(), None),
        };

        let end_of_sections = sections
            .iter()
            .filter(|s| s.header.pointer_to_raw_data != 0)
            .map(|s| s.header.pointer_to_raw_data as u64 + s.header.size_of_raw_data as u64)
            .max()
            .unwrap_or_else(|| optional_header.as_ref().map(|oh| oh.size_of_headers() as u64).unwrap_or(0));

        let certs_directory = optional_header.as_ref().and_then(|oh| oh.directory(DIRECTORY_CERTIFICATES));

        let (overlay, certificates) = match certs_directory.filter(|d| d.is_present()) {
            Some(dir) => {
                let span_len = (dir.rva as u64).saturating_sub(end_of_sections);
                let mut span = vec![0u8; span_len as usize];
                if span_len > 0 {
                    stream.seek(SeekFrom::Start(end_of_sections))?;
                    stream.read_exact(&mut span).ctx("overlay/padding span")?;
                }
                let overlay = if span.len() < 8 && span.iter().all(|&b| b == 0) {
                    Vec::new()
                } else {
                    span
                };
                let certs = directories::parse_certificates(stream, dir.rva, dir.size)?;
                (overlay, certs)
            }
            None => {
                stream.seek(SeekFrom::Start(end_of_sections))?;
                let mut overlay = Vec::new();
                stream.read_to_end(&mut overlay).ctx("overlay")?;
                (overlay, Vec::new())
            }
        };

        let overlay = if options.strips_overlay() { Vec::new() } else { overlay };

        Ok(Image {
            dos_header: Some(dos_header),
            dos_stub,
            file_header,
            optional_header,
            sections,
            symbols,
            string_table,
            overlay,
            exports,
            imports,
            delay_imports,
            base_relocations,
            certificates,
            layout_suspended: false,
        })
    }

    fn parse_object<S: Stream>(stream: &mut S) -> Result<Image> {
        let file_header = FileHeader::read(stream)?;
        let optional_header = if file_header.optional_header_size > 0 {
            Some(OptionalHeader::read(stream, file_header.optional_header_size)?)
        } else {
            None
        };
        let sections = Self::read_sections(stream, &file_header)?;
        let (symbols, string_table) = Self::read_symbols_and_strings(stream, &file_header)?;

        Ok(Image {
            dos_header: None,
            dos_stub: Vec::new(),
            file_header,
            optional_header,
            sections,
            symbols,
            string_table,
            overlay: Vec::new(),
            exports: None,
            imports: Vec::new(),
            delay_imports: Vec::new(),
            base_relocations: None,
            certificates: Vec::new(),
            layout_suspended: false,
        })
    }

    fn read_sections<S: Stream>(stream: &mut S, file_header: &FileHeader) -> Result<Vec<Section>> {
        let mut headers = Vec::with_capacity(file_header.section_count as usize);
        for _ in 0..file_header.section_count {
            headers.push(SectionHeader::read(stream)?);
        }
        let mut sections = Vec::with_capacity(headers.len());
        for header in headers {
            sections.push(Section::read_body(stream, header)?);
        }
        Ok(sections)
    }

    /// Reads symbol records sequentially from `sym_table_ptr` until the
    /// record count (a symbol plus its aux records) reaches
    /// `sym_count`, then reads the string table immediately following.
    fn read_symbols_and_strings<S: Stream>(
        stream: &mut S,
        file_header: &FileHeader,
    ) -> Result<(Vec<Symbol>, StringTable)> {
        if file_header.sym_table_ptr == 0 {
            return Ok((Vec::new(), StringTable::new()));
        }

        stream.seek(SeekFrom::Start(file_header.sym_table_ptr as u64))?;
        let mut symbols = Vec::new();
        let mut consumed = 0u32;
        while consumed < file_header.sym_count {
            let symbol = Symbol::read(stream)?;
            consumed += symbol.record_count();
            symbols.push(symbol);
        }

        let string_table = StringTable::read(stream)?;
        Ok((symbols, string_table))
    }

    fn parse_directories<S: Stream>(
        stream: &mut S,
        file_header: &FileHeader,
        optional_header: &OptionalHeader,
        sections: &[Section],
    ) -> Result<(
        Option<ExportDirectory>,
        Vec<ImportDescriptor>,
        Vec<DelayImportDescriptor>,
        Option<Vec<BaseRelocationBlock>>,
    )> {
        let _ = stream;
        let magic = optional_header.magic();

        let exports = match optional_header.directory(DIRECTORY_EXPORTS).filter(|d| d.is_present()) {
            Some(dir) => Some(ExportDirectory::parse(sections, &file_header.characteristics, dir.rva, dir.size)?),
            None => None,
        };

        let imports = match optional_header.directory(DIRECTORY_IMPORTS).filter(|d| d.is_present()) {
            Some(dir) => directories::parse_imports(sections, dir.rva, magic)?,
            None => Vec::new(),
        };

        let delay_imports = match optional_header.directory(DIRECTORY_DELAY_IMPORTS).filter(|d| d.is_present()) {
            Some(dir) => directories::parse_delay_imports(sections, dir.rva, magic)?,
            None => Vec::new(),
        };

        let base_relocations = match optional_header.directory(DIRECTORY_BASE_RELOCATIONS).filter(|d| d.is_present())
        {
            Some(dir) => Some(directories::parse_base_relocations(sections, dir.rva, dir.size)?),
            None => None,
        };

        Ok((exports, imports, delay_imports, base_relocations))
    }

    fn dos_and_stub_len(&self) -> Option<u64> {
        self.dos_header.as_ref().map(|_| DOS_HEADER_SIZE + self.dos_stub.len() as u64)
    }

    /// Disables the implicit `update_layout` that otherwise runs after
    /// each mutating operation, for bulk edits. `write` always performs
    /// a final pass regardless of this flag.
    pub fn suspend_layout(&mut self) {
        self.layout_suspended = true;
    }

    pub fn resume_layout(&mut self) -> Result<()> {
        self.layout_suspended = false;
        self.update_layout()
    }

    pub fn update_layout(&mut self) -> Result<()> {
        layout::update_layout(
            self.dos_and_stub_len(),
            &mut self.file_header,
            &mut self.optional_header,
            &mut self.sections,
            &self.symbols,
            &self.string_table,
        )
    }

    fn maybe_update_layout(&mut self) -> Result<()> {
        if !self.layout_suspended {
            self.update_layout()
        } else {
            Ok(())
        }
    }

    pub fn add_section(&mut self, section: Section) -> Result<()> {
        self.sections.push(section);
        self.maybe_update_layout()
    }

    pub fn remove_section(&mut self, name: &str) -> Result<Option<Section>> {
        let index = self.sections.iter().position(|s| s.name() == name);
        let removed = index.map(|i| self.sections.remove(i));
        self.maybe_update_layout()?;
        Ok(removed)
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> Result<()> {
        self.symbols.push(symbol);
        self.maybe_update_layout()
    }

    pub fn remove_symbol(&mut self, index: usize) -> Result<Symbol> {
        let removed = self.symbols.remove(index);
        self.maybe_update_layout()?;
        Ok(removed)
    }

    pub fn add_string(&mut self, s: &str) -> u32 {
        self.string_table.add(s)
    }

    pub fn remove_string(&mut self, offset: u32) -> Option<String> {
        self.string_table.remove(offset)
    }

    pub fn add_data_directory(&mut self, rva: u32, size: u32) -> Option<usize> {
        let dirs = self.optional_header.as_mut()?.data_directories_mut()?;
        dirs.push(super::optional_header::DataDirectory { rva, size });
        Some(dirs.len() - 1)
    }

    pub fn add_relocation(&mut self, section_name: &str, relocation: super::section::Relocation) -> bool {
        if let Some(section) = self.sections.iter_mut().find(|s| s.name() == section_name) {
            section.relocations.push(relocation);
            true
        } else {
            false
        }
    }

    pub fn add_line_number(&mut self, section_name: &str, line_number: super::section::LineNumber) -> bool {
        if let Some(section) = self.sections.iter_mut().find(|s| s.name() == section_name) {
            section.line_numbers.push(line_number);
            true
        } else {
            false
        }
    }

    pub fn add_certificate(&mut self, certificate: Certificate) {
        self.certificates.push(certificate);
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn string_table(&self) -> &StringTable {
        &self.string_table
    }

    pub fn imports(&self) -> &[ImportDescriptor] {
        &self.imports
    }

    pub fn delay_imports(&self) -> &[DelayImportDescriptor] {
        &self.delay_imports
    }

    pub fn exports(&self) -> Option<&ExportDirectory> {
        self.exports.as_ref()
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn base_relocations(&self) -> Option<&[BaseRelocationBlock]> {
        self.base_relocations.as_deref()
    }

    pub fn section_for_rva(&self, rva: u32) -> Option<&Section> {
        rva::section_for_rva(&self.sections, rva)
    }

    pub fn read_u32_at_rva(&self, rva: u32) -> Result<u32> {
        let section = self.section_for_rva(rva).ok_or(Error::RvaOutOfRange { rva })?;
        rva::read_u32_at(section, rva, &self.file_header.characteristics)
    }

    pub fn read_ascii_string_at_rva(&self, rva: u32) -> Result<String> {
        let section = self.section_for_rva(rva).ok_or(Error::RvaOutOfRange { rva })?;
        rva::read_ascii_string_at(section, rva)
    }

    /// Writes `self.write`'s output to a scratch buffer and computes the
    /// checksum over it (C10), storing the result back into the
    /// optional header. Call `write` again afterwards to emit bytes that
    /// reflect the updated checksum.
    pub fn calculate_checksum<S: Stream>(&mut self, scratch: &mut S) -> Result<u32> {
        scratch.seek(SeekFrom::Start(0))?;
        self.write(scratch)?;

        let mut bytes = Vec::new();
        scratch.seek(SeekFrom::Start(0))?;
        scratch.read_to_end(&mut bytes).ctx("checksum scratch buffer")?;

        let offset = checksum_field_offset(self.dos_and_stub_len().unwrap_or(0), FILE_HEADER_SIZE);
        let value = checksum::compute(&bytes, offset);
        if let Some(oh) = self.optional_header.as_mut() {
            oh.set_checksum(value);
        }
        Ok(value)
    }

    /// Emits DOS header, stub, signature, optional header, sections,
    /// overlay, then certificates — patching data directory 4 and
    /// re-emitting the optional header once certificate placement is
    /// known (C7). Always runs a final layout pass first regardless of
    /// `suspend_layout`.
    pub fn write<S: Stream>(&mut self, stream: &mut S) -> Result<()> {
        self.update_layout()?;

        let optional_header_start = if let Some(dos_header) = &self.dos_header {
            dos_header.write(stream)?;
            stream.write_all(&self.dos_stub)?;
            write_be_u32(stream, PE_SIGNATURE)?;
            Some(position(stream)? + FILE_HEADER_SIZE)
        } else {
            None
        };

        self.file_header.write(stream)?;
        if let Some(oh) = &self.optional_header {
            oh.write(stream)?;
        }

        for section in &self.sections {
            section.header.write(stream)?;
        }
        for section in &self.sections {
            section.write_body(stream)?;
        }

        if !self.symbols.is_empty() || !self.string_table.is_empty() {
            stream.seek(SeekFrom::Start(self.file_header.sym_table_ptr as u64))?;
            for symbol in &self.symbols {
                symbol.write(stream)?;
            }
            self.string_table.write(stream)?;
        }

        let end_of_sections = self
            .sections
            .iter()
            .filter(|s| s.header.pointer_to_raw_data != 0)
            .map(|s| s.header.pointer_to_raw_data as u64 + s.header.size_of_raw_data as u64)
            .max()
            .unwrap_or_else(|| self.optional_header.as_ref().map(|oh| oh.size_of_headers() as u64).unwrap_or(0));

        stream.seek(SeekFrom::Start(end_of_sections))?;
        stream.write_all(&self.overlay)?;

        if let Some(start) = optional_header_start {
            let (cert_start, cert_total) = directories::write_certificates(stream, &self.certificates)?;

            if let Some(oh) = self.optional_header.as_mut() {
                if let Some(dirs) = oh.data_directories_mut() {
                    if dirs.len() > DIRECTORY_CERTIFICATES {
                        dirs[DIRECTORY_CERTIFICATES] = super::optional_header::DataDirectory {
                            rva: if self.certificates.is_empty() { 0 } else { cert_start },
                            size: cert_total,
                        };
                    }
                }

                let resume = position(stream)?;
                stream.seek(SeekFrom::Start(start))?;
                oh.write(stream)?;
                stream.seek(SeekFrom::Start(resume))?;
            }
        }

        Ok(())
    }
}

/// Builds a fresh, section-less PE image around the given headers, for
/// callers assembling one from scratch rather than parsing an existing
/// file.
pub fn new_empty_pe_image(file_header: FileHeader, optional_header: OptionalHeader) -> Image {
    Image {
        dos_header: Some(DosHeader::new_minimal()),
        dos_stub: DEFAULT_DOS_STUB.to_vec(),
        file_header,
        optional_header: Some(optional_header),
        sections: Vec::new(),
        symbols: Vec::new(),
        string_table: StringTable::new(),
        overlay: Vec::new(),
        exports: None,
        imports: Vec::new(),
        delay_imports: Vec::new(),
        base_relocations: None,
        certificates: Vec::new(),
        layout_suspended: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coff::file_header::FileCharacteristics;
    use crate::coff::optional_header::{DataDirectory, NtFields, StandardFields};
    use crate::coff::section::SectionCharacteristics;

    fn sample_file_header() -> FileHeader {
        FileHeader {
            machine: 0x014C,
            section_count: 0,
            timestamp_unix_seconds: 0,
            sym_table_ptr: 0,
            sym_count: 0,
            optional_header_size: 0,
            characteristics: FileCharacteristics::from(0),
        }
    }

    fn sample_optional_header() -> OptionalHeader {
        OptionalHeader::Pe32 {
            standard: StandardFields {
                major_linker_version: 14,
                minor_linker_version: 0,
                size_of_code: 0,
                size_of_initialized_data: 0,
                size_of_uninitialized_data: 0,
                address_of_entry_point: 0x1000,
                base_of_code: 0,
            },
            base_of_data: 0,
            image_base: 0x0040_0000,
            nt: NtFields {
                section_alignment: 0x1000,
                file_alignment: 0x200,
                major_os_version: 6,
                minor_os_version: 0,
                major_image_version: 0,
                minor_image_version: 0,
                major_subsystem_version: 6,
                minor_subsystem_version: 0,
                win32_version_value: 0,
                size_of_image: 0,
                size_of_headers: 0,
                checksum: 0,
                subsystem: 3,
                dll_characteristics: 0u16.into(),
                loader_flags: 0,
            },
            size_of_stack_reserve: 0x10_0000,
            size_of_stack_commit: 0x1000,
            size_of_heap_reserve: 0x10_0000,
            size_of_heap_commit: 0x1000,
            data_directories: vec![DataDirectory::default(); 16],
        }
    }

    #[test]
    fn freshly_built_pe_image_round_trips() {
        let mut image = new_empty_pe_image(sample_file_header(), sample_optional_header());
        let text = Section {
            header: SectionHeader {
                name: ".text".to_string(),
                virtual_size: 0x20,
                virtual_address: 0x1000,
                size_of_raw_data: 0x200,
                pointer_to_raw_data: 0,
                pointer_to_relocations: 0,
                pointer_to_line_numbers: 0,
                number_of_relocations: 0,
                number_of_line_numbers: 0,
                characteristics: SectionCharacteristics::from(
                    SectionCharacteristics::CNT_CODE | SectionCharacteristics::MEM_EXECUTE,
                ),
            },
            raw_data: vec![0x90; 0x200],
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        };
        image.add_section(text).unwrap();

        let mut buf = Cursor::new(Vec::new());
        image.write(&mut buf).unwrap();

        let bytes = buf.into_inner();
        let mut cursor = Cursor::new(bytes);
        let parsed = Image::parse(&mut cursor, ReadOptions::none()).unwrap();

        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].name(), ".text");
        assert_eq!(parsed.optional_header.unwrap().magic(), super::super::optional_header::MAGIC_PE32);
    }
}
