use super::buffer::align_up;
use super::error::Result;
use super::file_header::{FileHeader, FILE_HEADER_SIZE};
use super::optional_header::OptionalHeader;
use super::section::{Section, LINE_NUMBER_SIZE, RELOCATION_SIZE, SECTION_HEADER_SIZE};
use super::strings::StringTable;
use super::symbol::Symbol;

/// Recomputes every offset, size, and count the format derives from the
/// section/symbol/string contents (C9): section order, header counts,
/// `size_of_headers`/`size_of_image`, and every section's raw-data /
/// relocation / line-number pointers. Always runs as the final step of
/// `write`, and on demand via `Image::update_layout` unless layout is
/// currently suspended.
///
/// `dos_and_stub_len` is `None` for COFF object files (no DOS header or
/// PE signature precede the COFF headers) and `Some(len)` for PE images,
/// where `len` is the DOS header plus stub length, excluding the 4-byte
/// PE signature that is accounted for separately.
pub fn update_layout(
    dos_and_stub_len: Option<u64>,
    file_header: &mut FileHeader,
    optional_header: &mut Option<OptionalHeader>,
    sections: &mut [Section],
    symbols: &[Symbol],
    string_table: &StringTable,
) -> Result<()> {
    sections.sort_by_key(|s| s.header.virtual_address);

    file_header.section_count = sections.len() as u16;
    file_header.sym_count = symbols.iter().map(Symbol::record_count).sum();

    let (file_alignment, headers_len) = if let Some(oh) = optional_header.as_mut() {
        file_header.optional_header_size = oh.size() as u16;

        let base_of_code = sections
            .iter()
            .find(|s| s.header.characteristics.is_cnt_code())
            .or_else(|| sections.first())
            .map(|s| s.header.virtual_address)
            .unwrap_or(0);
        oh.set_base_of_code(base_of_code);

        let file_alignment = (oh.file_alignment() as u64).max(1);
        let section_alignment = (oh.section_alignment() as u64).max(1);

        let header_bytes = dos_and_stub_len.unwrap_or(0)
            + 4
            + FILE_HEADER_SIZE
            + oh.size()
            + sections.len() as u64 * SECTION_HEADER_SIZE;
        let computed = align_up(header_bytes, file_alignment);
        // Some real-world toolchains inflate size_of_headers beyond the
        // minimum required; preserve a larger existing value.
        let size_of_headers = (oh.size_of_headers() as u64).max(computed);
        oh.set_size_of_headers(size_of_headers as u32);

        if let Some(last) = sections.last() {
            let size_of_image = align_up(
                last.header.virtual_address as u64 + last.header.virtual_size as u64,
                section_alignment,
            );
            oh.set_size_of_image(size_of_image as u32);
        }

        (file_alignment, size_of_headers)
    } else {
        (1, FILE_HEADER_SIZE + sections.len() as u64 * SECTION_HEADER_SIZE)
    };

    let mut cursor = headers_len;
    for section in sections.iter_mut() {
        if section.header.characteristics.is_cnt_uninitialized_data() {
            section.header.pointer_to_raw_data = 0;
        } else if section.header.size_of_raw_data > 0 {
            let aligned = align_up(cursor, file_alignment);
            section.header.pointer_to_raw_data = aligned as u32;
            cursor = aligned + section.header.size_of_raw_data as u64;
        } else {
            section.header.pointer_to_raw_data = 0;
        }

        if !section.relocations.is_empty() {
            section.header.pointer_to_relocations = cursor as u32;
            let overflow_extra = if section.header.number_of_relocations == 0xFFFF
                && section.header.characteristics.is_lnk_nreloc_ovfl()
            {
                1
            } else {
                0
            };
            cursor += (section.relocations.len() as u64 + overflow_extra) * RELOCATION_SIZE;
        } else {
            section.header.pointer_to_relocations = 0;
        }

        if !section.line_numbers.is_empty() {
            section.header.pointer_to_line_numbers = cursor as u32;
            cursor += section.line_numbers.len() as u64 * LINE_NUMBER_SIZE;
        } else {
            section.header.pointer_to_line_numbers = 0;
        }
    }

    // The Go linker embeds the symbol and string tables inside a
    // section named `.symtab` rather than at the standard location;
    // detect that by the existing pointer coinciding with a section's
    // raw-data pointer and leave it alone rather than writing a second
    // copy of the tables.
    let preserves_symtab_section = sections
        .iter()
        .any(|s| s.name() == ".symtab" && s.header.pointer_to_raw_data == file_header.sym_table_ptr);

    if !preserves_symtab_section {
        file_header.sym_table_ptr = if !symbols.is_empty() || !string_table.is_empty() {
            cursor as u32
        } else {
            0
        };
    }

    Ok(())
}
