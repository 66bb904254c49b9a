use super::super::error::{Error, Result};
use super::super::optional_header::MAGIC_PE32_PLUS;
use super::super::rva;
use super::super::section::Section;

pub const IMPORT_DESCRIPTOR_SIZE: u64 = 20;

const ORDINAL_FLAG_32: u32 = 0x8000_0000;
const ORDINAL_FLAG_64: u64 = 0x8000_0000_0000_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub by_ordinal: bool,
    pub ordinal: Option<u16>,
    pub hint: Option<u16>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDescriptor {
    pub original_first_thunk: u32,
    pub timestamp_unix_seconds: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    pub first_thunk: u32,
    pub dll_name: String,
    pub entries: Vec<ImportEntry>,
}

/// Walks the descriptor table at `directory_rva` until the all-zero
/// terminator (C8 Imports). `is_pe32_plus` selects 32- vs 64-bit import
/// lookup table entries.
pub fn parse(sections: &[Section], directory_rva: u32, optional_header_magic: u16) -> Result<Vec<ImportDescriptor>> {
    let is_pe32_plus = optional_header_magic == MAGIC_PE32_PLUS;
    let mut descriptors = Vec::new();
    let mut cursor_rva = directory_rva;

    loop {
        let (section, offset) = rva::resolve(sections, cursor_rva)?;
        let raw = section
            .raw_data
            .get(offset..offset + IMPORT_DESCRIPTOR_SIZE as usize)
            .ok_or(Error::RvaOutOfRange { rva: cursor_rva })?;

        let original_first_thunk = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        let timestamp_unix_seconds = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let forwarder_chain = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        let name_rva = u32::from_le_bytes(raw[12..16].try_into().unwrap());
        let first_thunk = u32::from_le_bytes(raw[16..20].try_into().unwrap());

        if original_first_thunk == 0 && first_thunk == 0 {
            break;
        }

        let dll_name = rva::read_ascii_string_at(section, name_rva).unwrap_or_default();
        let thunk_rva = if original_first_thunk != 0 { original_first_thunk } else { first_thunk };
        let entries = walk_lookup_table(sections, thunk_rva, is_pe32_plus)?;

        descriptors.push(ImportDescriptor {
            original_first_thunk,
            timestamp_unix_seconds,
            forwarder_chain,
            name_rva,
            first_thunk,
            dll_name,
            entries,
        });

        cursor_rva += IMPORT_DESCRIPTOR_SIZE as u32;
    }

    Ok(descriptors)
}

fn walk_lookup_table(sections: &[Section], mut rva: u32, is_pe32_plus: bool) -> Result<Vec<ImportEntry>> {
    let mut entries = Vec::new();
    loop {
        let (section, offset) = rva::resolve(sections, rva)?;

        if is_pe32_plus {
            let raw = section
                .raw_data
                .get(offset..offset + 8)
                .ok_or(Error::RvaOutOfRange { rva })?;
            let value = u64::from_le_bytes(raw.try_into().unwrap());
            if value == 0 {
                break;
            }
            entries.push(decode_entry_64(sections, value)?);
            rva += 8;
        } else {
            let raw = section
                .raw_data
                .get(offset..offset + 4)
                .ok_or(Error::RvaOutOfRange { rva })?;
            let value = u32::from_le_bytes(raw.try_into().unwrap());
            if value == 0 {
                break;
            }
            entries.push(decode_entry_32(sections, value)?);
            rva += 4;
        }
    }
    Ok(entries)
}

fn decode_entry_32(sections: &[Section], value: u32) -> Result<ImportEntry> {
    if value & ORDINAL_FLAG_32 != 0 {
        Ok(ImportEntry {
            by_ordinal: true,
            ordinal: Some((value & 0xFFFF) as u16),
            hint: None,
            name: None,
        })
    } else {
        decode_hint_name(sections, value & 0x7FFF_FFFF)
    }
}

fn decode_entry_64(sections: &[Section], value: u64) -> Result<ImportEntry> {
    if value & ORDINAL_FLAG_64 != 0 {
        Ok(ImportEntry {
            by_ordinal: true,
            ordinal: Some((value & 0xFFFF) as u16),
            hint: None,
            name: None,
        })
    } else {
        decode_hint_name(sections, (value & 0x7FFF_FFFF_FFFF_FFFF) as u32)
    }
}

/// Name RVAs may live in a different section than the descriptor itself,
/// so resolution always goes back through `rva::resolve` rather than
/// assuming the descriptor's section. Unresolvable names are not fatal —
/// an empty name is substituted and the walk continues.
fn decode_hint_name(sections: &[Section], hint_name_rva: u32) -> Result<ImportEntry> {
    let (section, offset) = match rva::resolve(sections, hint_name_rva) {
        Ok(v) => v,
        Err(_) => {
            return Ok(ImportEntry { by_ordinal: false, ordinal: None, hint: Some(0), name: Some(String::new()) })
        }
    };
    let hint = section
        .raw_data
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes(b.try_into().unwrap()))
        .unwrap_or(0);
    let name = rva::read_ascii_string_at(section, hint_name_rva + 2).unwrap_or_default();
    Ok(ImportEntry { by_ordinal: false, ordinal: None, hint: Some(hint), name: Some(name) })
}
