mod coff;

pub use coff::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_file_header() -> FileHeader {
        FileHeader {
            machine: IMAGE_FILE_MACHINE_I386,
            section_count: 0,
            timestamp_unix_seconds: 0x6000_0000,
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
                dll_characteristics: DllCharacteristics::from(0),
                loader_flags: 0,
            },
            size_of_stack_reserve: 0x10_0000,
            size_of_stack_commit: 0x1000,
            size_of_heap_reserve: 0x10_0000,
            size_of_heap_commit: 0x1000,
            data_directories: vec![DataDirectory::default(); 16],
        }
    }

    fn text_section() -> Section {
        Section {
            header: SectionHeader {
                name: ".text".to_string(),
                virtual_size: 0x50,
                virtual_address: 0x1000,
                size_of_raw_data: 0x200,
                pointer_to_raw_data: 0,
                pointer_to_relocations: 0,
                pointer_to_line_numbers: 0,
                number_of_relocations: 0,
                number_of_line_numbers: 0,
                characteristics: SectionCharacteristics::from(
                    SectionCharacteristics::CNT_CODE
                        | SectionCharacteristics::MEM_EXECUTE
                        | SectionCharacteristics::MEM_READ,
                ),
            },
            raw_data: vec![0x90; 0x200],
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        }
    }

    /// An unmodified image, parsed and immediately re-emitted with no
    /// edits, reproduces the same bytes.
    #[test]
    fn unmodified_image_round_trips_byte_for_byte() {
        let mut image = new_empty_pe_image(sample_file_header(), sample_optional_header());
        image.add_section(text_section()).unwrap();

        let mut original = Cursor::new(Vec::new());
        image.write(&mut original).unwrap();
        let original_bytes = original.into_inner();

        let mut cursor = Cursor::new(original_bytes.clone());
        let mut parsed = Image::parse(&mut cursor, ReadOptions::none()).unwrap();

        let mut reemitted = Cursor::new(Vec::new());
        parsed.write(&mut reemitted).unwrap();

        assert_eq!(reemitted.into_inner(), original_bytes);
    }

    #[test]
    fn checksum_matches_compute_checksum_over_final_bytes() {
        let mut image = new_empty_pe_image(sample_file_header(), sample_optional_header());
        image.add_section(text_section()).unwrap();

        let mut scratch = Cursor::new(Vec::new());
        let checksum = image.calculate_checksum(&mut scratch).unwrap();

        let mut final_bytes = Cursor::new(Vec::new());
        image.write(&mut final_bytes).unwrap();
        let bytes = final_bytes.into_inner();

        let offset = checksum_field_offset(DOS_HEADER_SIZE + DEFAULT_DOS_STUB.len() as u64, FILE_HEADER_SIZE);
        assert_eq!(compute_checksum(&bytes, offset), checksum);
    }

    #[test]
    fn section_for_rva_respects_section_boundaries() {
        let mut image = new_empty_pe_image(sample_file_header(), sample_optional_header());
        image.add_section(text_section()).unwrap();

        assert!(image.section_for_rva(0x1000).is_some());
        assert!(image.section_for_rva(0x104F).is_some());
        assert!(image.section_for_rva(0x1050).is_none());
        assert!(image.section_for_rva(0x0FFF).is_none());
    }

    #[test]
    fn size_of_headers_and_size_of_image_stay_aligned_after_layout() {
        let mut image = new_empty_pe_image(sample_file_header(), sample_optional_header());
        image.add_section(text_section()).unwrap();
        image.update_layout().unwrap();

        let oh = image.optional_header.as_ref().unwrap();
        assert_eq!(oh.size_of_headers() as u64 % oh.file_alignment() as u64, 0);
        assert_eq!(oh.size_of_image() as u64 % oh.section_alignment() as u64, 0);
    }

    /// A COFF object file (no `"MZ"` signature) parses straight into the
    /// file header without expecting a DOS header or optional header.
    #[test]
    fn object_file_skips_dos_header_and_optional_header() {
        let mut section = text_section();
        section.header.pointer_to_raw_data = FILE_HEADER_SIZE as u32 + SECTION_HEADER_SIZE as u32;

        let mut file_header = sample_file_header();
        file_header.section_count = 1;

        let mut buf = Cursor::new(Vec::new());
        file_header.write(&mut buf).unwrap();
        section.header.write(&mut buf).unwrap();
        section.write_body(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf.into_inner());
        let parsed = Image::parse(&mut cursor, ReadOptions::none()).unwrap();
        assert!(parsed.optional_header.is_none());
        assert_eq!(parsed.sections().len(), 1);
        assert_eq!(parsed.sections()[0].name(), ".text");
    }

    fn idata_section() -> Section {
        let mut raw_data = vec![0u8; 0x100];
        raw_data[0..4].copy_from_slice(&0x3028u32.to_le_bytes()); // original_first_thunk
        raw_data[12..16].copy_from_slice(&0x3060u32.to_le_bytes()); // name_rva
        raw_data[16..20].copy_from_slice(&0x3028u32.to_le_bytes()); // first_thunk
        // offsets 20..40 stay zero: descriptor-table terminator
        raw_data[0x28..0x2C].copy_from_slice(&0x3080u32.to_le_bytes()); // ILT entry: hint/name RVA
        // offset 0x2C..0x30 stays zero: ILT terminator
        raw_data[0x60..0x60 + 13].copy_from_slice(b"KERNEL32.DLL\0");
        raw_data[0x80 + 2..0x80 + 2 + 12].copy_from_slice(b"CreateFileW\0");

        Section {
            header: SectionHeader {
                name: ".idata".to_string(),
                virtual_size: raw_data.len() as u32,
                virtual_address: 0x3000,
                size_of_raw_data: raw_data.len() as u32,
                pointer_to_raw_data: 0,
                pointer_to_relocations: 0,
                pointer_to_line_numbers: 0,
                number_of_relocations: 0,
                number_of_line_numbers: 0,
                characteristics: SectionCharacteristics::from(SectionCharacteristics::CNT_INITIALIZED_DATA),
            },
            raw_data,
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        }
    }

    /// An `.idata` section wired up through the imports data directory
    /// parses into a single descriptor naming its DLL and one
    /// name-imported entry, and re-emits byte-for-byte.
    #[test]
    fn import_directory_round_trips_through_image() {
        let mut image = new_empty_pe_image(sample_file_header(), sample_optional_header());
        image.add_section(idata_section()).unwrap();
        {
            let dirs = image.optional_header.as_mut().unwrap().data_directories_mut().unwrap();
            dirs[DIRECTORY_IMPORTS] = DataDirectory { rva: 0x3000, size: 40 };
        }

        let mut original = Cursor::new(Vec::new());
        image.write(&mut original).unwrap();
        let original_bytes = original.into_inner();

        let mut cursor = Cursor::new(original_bytes.clone());
        let mut parsed = Image::parse(&mut cursor, ReadOptions::none()).unwrap();

        assert_eq!(parsed.imports().len(), 1);
        assert_eq!(parsed.imports()[0].dll_name, "KERNEL32.DLL");
        assert_eq!(parsed.imports()[0].entries.len(), 1);
        assert!(!parsed.imports()[0].entries[0].by_ordinal);
        assert_eq!(parsed.imports()[0].entries[0].name.as_deref(), Some("CreateFileW"));

        let mut reemitted = Cursor::new(Vec::new());
        parsed.write(&mut reemitted).unwrap();
        assert_eq!(reemitted.into_inner(), original_bytes);
    }

    /// A freshly built base-relocation table (no pre-existing `.reloc`
    /// section) survives being attached to an image and read back.
    #[test]
    fn base_relocations_round_trip_through_image() {
        let blocks = vec![BaseRelocationBlock {
            page_rva: 0x1000,
            entries: vec![
                BaseRelocationEntry { kind: 3, offset: 0x10 },
                BaseRelocationEntry { kind: 3, offset: 0x20 },
                BaseRelocationEntry { kind: REL_BASED_ABSOLUTE, offset: 0 },
            ],
        }];
        let bytes = build_base_relocations(&blocks);

        let reloc_section = Section {
            header: SectionHeader {
                name: ".reloc".to_string(),
                virtual_size: bytes.len() as u32,
                virtual_address: 0x5000,
                size_of_raw_data: bytes.len() as u32,
                pointer_to_raw_data: 0,
                pointer_to_relocations: 0,
                pointer_to_line_numbers: 0,
                number_of_relocations: 0,
                number_of_line_numbers: 0,
                characteristics: SectionCharacteristics::from(SectionCharacteristics::CNT_INITIALIZED_DATA),
            },
            raw_data: bytes.clone(),
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        };

        let mut image = new_empty_pe_image(sample_file_header(), sample_optional_header());
        image.add_section(reloc_section).unwrap();
        {
            let dirs = image.optional_header.as_mut().unwrap().data_directories_mut().unwrap();
            dirs[DIRECTORY_BASE_RELOCATIONS] = DataDirectory { rva: 0x5000, size: bytes.len() as u32 };
        }

        let mut buf = Cursor::new(Vec::new());
        image.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf.into_inner());
        let parsed = Image::parse(&mut cursor, ReadOptions::none()).unwrap();

        assert_eq!(parsed.base_relocations(), Some(blocks.as_slice()));
    }

    /// An export directory holding one ordinary export and one forwarder
    /// round-trips through a built `.edata` section, with the forward
    /// reference name resolved back out.
    #[test]
    fn export_directory_with_forwarder_round_trips_through_image() {
        let directory = ExportDirectory {
            characteristics: 0,
            timestamp_unix_seconds: 0,
            major_version: 0,
            minor_version: 0,
            name: "mylib.dll".to_string(),
            ordinal_base: 1,
            symbols: vec![
                ExportedSymbol {
                    ordinal: 1,
                    rva: 0x1500,
                    name: "Alpha".to_string(),
                    is_forward: false,
                    reference_name: None,
                },
                ExportedSymbol {
                    ordinal: 2,
                    rva: 0,
                    name: "Beta".to_string(),
                    is_forward: true,
                    reference_name: Some("KERNEL32.HeapAlloc".to_string()),
                },
            ],
        };
        let body = directory.build(0x4000);

        let edata_section = Section {
            header: SectionHeader {
                name: ".edata".to_string(),
                virtual_size: body.len() as u32,
                virtual_address: 0x4000,
                size_of_raw_data: body.len() as u32,
                pointer_to_raw_data: 0,
                pointer_to_relocations: 0,
                pointer_to_line_numbers: 0,
                number_of_relocations: 0,
                number_of_line_numbers: 0,
                characteristics: SectionCharacteristics::from(SectionCharacteristics::CNT_INITIALIZED_DATA),
            },
            raw_data: body.clone(),
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        };

        let mut image = new_empty_pe_image(sample_file_header(), sample_optional_header());
        image.add_section(edata_section).unwrap();
        {
            let dirs = image.optional_header.as_mut().unwrap().data_directories_mut().unwrap();
            dirs[DIRECTORY_EXPORTS] = DataDirectory { rva: 0x4000, size: body.len() as u32 };
        }

        let mut buf = Cursor::new(Vec::new());
        image.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf.into_inner());
        let parsed = Image::parse(&mut cursor, ReadOptions::none()).unwrap();

        let exports = parsed.exports().unwrap();
        assert_eq!(exports.name, "mylib.dll");
        assert_eq!(exports.symbols.len(), 2);
        let alpha = exports.symbols.iter().find(|s| s.name == "Alpha").unwrap();
        assert!(!alpha.is_forward);
        assert_eq!(alpha.rva, 0x1500);
        let beta = exports.symbols.iter().find(|s| s.name == "Beta").unwrap();
        assert!(beta.is_forward);
        assert_eq!(beta.reference_name.as_deref(), Some("KERNEL32.HeapAlloc"));
    }
}
