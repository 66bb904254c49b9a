use super::super::error::{Error, Result};
use super::super::optional_header::MAGIC_PE32_PLUS;
use super::super::rva;
use super::super::section::Section;
use super::imports::ImportEntry;

pub const DELAY_IMPORT_DESCRIPTOR_SIZE: u64 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayImportDescriptor {
    pub attributes: u32,
    pub name_rva: u32,
    pub module_handle_rva: u32,
    pub delay_import_address_table: u32,
    pub delay_import_name_table: u32,
    pub bound_delay_import_table: u32,
    pub unload_delay_import_table: u32,
    pub timestamp_unix_seconds: u32,
    pub dll_name: String,
    pub entries: Vec<ImportEntry>,
}

/// Walks the delay-load descriptor table (C8 Delay-load Imports);
/// shares the import-lookup-table walk with `imports.rs` since both use
/// the same 32-/64-bit ordinal-or-hint/name encoding.
pub fn parse(sections: &[Section], directory_rva: u32, optional_header_magic: u16) -> Result<Vec<DelayImportDescriptor>> {
    let is_pe32_plus = optional_header_magic == MAGIC_PE32_PLUS;
    let mut descriptors = Vec::new();
    let mut cursor_rva = directory_rva;

    loop {
        let (section, offset) = rva::resolve(sections, cursor_rva)?;
        let raw = section
            .raw_data
            .get(offset..offset + DELAY_IMPORT_DESCRIPTOR_SIZE as usize)
            .ok_or(Error::RvaOutOfRange { rva: cursor_rva })?;

        let attributes = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        let name_rva = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let module_handle_rva = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        let delay_import_address_table = u32::from_le_bytes(raw[12..16].try_into().unwrap());
        let delay_import_name_table = u32::from_le_bytes(raw[16..20].try_into().unwrap());
        let bound_delay_import_table = u32::from_le_bytes(raw[20..24].try_into().unwrap());
        let unload_delay_import_table = u32::from_le_bytes(raw[24..28].try_into().unwrap());
        let timestamp_unix_seconds = u32::from_le_bytes(raw[28..32].try_into().unwrap());

        if delay_import_address_table == 0 && delay_import_name_table == 0 {
            break;
        }

        let dll_name = rva::read_ascii_string_at(section, name_rva).unwrap_or_default();
        let entries = walk_name_table(sections, delay_import_name_table, is_pe32_plus)?;

        descriptors.push(DelayImportDescriptor {
            attributes,
            name_rva,
            module_handle_rva,
            delay_import_address_table,
            delay_import_name_table,
            bound_delay_import_table,
            unload_delay_import_table,
            timestamp_unix_seconds,
            dll_name,
            entries,
        });

        cursor_rva += DELAY_IMPORT_DESCRIPTOR_SIZE as u32;
    }

    Ok(descriptors)
}

fn walk_name_table(sections: &[Section], mut rva: u32, is_pe32_plus: bool) -> Result<Vec<ImportEntry>> {
    const ORDINAL_FLAG_32: u32 = 0x8000_0000;
    const ORDINAL_FLAG_64: u64 = 0x8000_0000_0000_0000;

    let mut entries = Vec::new();
    loop {
        let (section, offset) = rva::resolve(sections, rva)?;

        let (raw_value, step): (u64, u32) = if is_pe32_plus {
            let raw = section.raw_data.get(offset..offset + 8).ok_or(Error::RvaOutOfRange { rva })?;
            (u64::from_le_bytes(raw.try_into().unwrap()), 8)
        } else {
            let raw = section.raw_data.get(offset..offset + 4).ok_or(Error::RvaOutOfRange { rva })?;
            (u32::from_le_bytes(raw.try_into().unwrap()) as u64, 4)
        };

        if raw_value == 0 {
            break;
        }

        let by_ordinal = if is_pe32_plus { raw_value & ORDINAL_FLAG_64 != 0 } else { raw_value & ORDINAL_FLAG_32 as u64 != 0 };
        if by_ordinal {
            entries.push(ImportEntry { by_ordinal: true, ordinal: Some((raw_value & 0xFFFF) as u16), hint: None, name: None });
        } else {
            let hint_name_rva = (raw_value & 0x7FFF_FFFF) as u32;
            let (hint_section, hint_offset) = rva::resolve(sections, hint_name_rva)?;
            let hint = hint_section
                .raw_data
                .get(hint_offset..hint_offset + 2)
                .map(|b| u16::from_le_bytes(b.try_into().unwrap()))
                .unwrap_or(0);
            let name = rva::read_ascii_string_at(hint_section, hint_name_rva + 2).unwrap_or_default();
            entries.push(ImportEntry { by_ordinal: false, ordinal: None, hint: Some(hint), name: Some(name) });
        }

        rva += step;
    }
    Ok(entries)
}
