use super::error::{Error, Result};
use super::file_header::FileCharacteristics;
use super::section::Section;

/// Returns the first section in `sections` that contains `rva`, per
/// C11: a section "contains" `r` iff
/// `r ∈ [virtual_address, virtual_address + virtual_size)`.
pub fn section_for_rva(sections: &[Section], rva: u32) -> Option<&Section> {
    sections.iter().find(|s| s.contains_rva(rva))
}

/// `true` only when both `BYTES_REVERSED_LO` and `BYTES_REVERSED_HI` are
/// set on the owning image's file header — a deliberately narrow guard
/// against files that set too many characteristic bits, matching C11's
/// requirement that big-endian decoding is the exception, not triggered
/// by either bit alone.
fn is_big_endian(file_characteristics: &FileCharacteristics) -> bool {
    file_characteristics.is_bytes_reversed_lo() && file_characteristics.is_bytes_reversed_hi()
}

/// Resolves `rva` to its containing section and the local byte offset
/// within it, for callers that need to slice out a multi-field record
/// rather than decode a single typed value.
pub fn resolve(sections: &[Section], rva: u32) -> Result<(&Section, usize)> {
    let section = section_for_rva(sections, rva).ok_or(Error::RvaOutOfRange { rva })?;
    let offset = local_offset(section, rva)?;
    Ok((section, offset))
}

fn local_offset(section: &Section, rva: u32) -> Result<usize> {
    if !section.contains_rva(rva) {
        return Err(Error::RvaOutOfRange { rva });
    }
    let offset = (rva - section.header.virtual_address) as usize;
    if offset >= section.raw_data.len() {
        return Err(Error::RvaOutOfRange { rva });
    }
    Ok(offset)
}

pub fn read_u16_at(section: &Section, rva: u32, file_characteristics: &FileCharacteristics) -> Result<u16> {
    let offset = local_offset(section, rva)?;
    let bytes = section
        .raw_data
        .get(offset..offset + 2)
        .ok_or(Error::RvaOutOfRange { rva })?;
    let array: [u8; 2] = bytes.try_into().unwrap();
    Ok(if is_big_endian(file_characteristics) {
        u16::from_be_bytes(array)
    } else {
        u16::from_le_bytes(array)
    })
}

pub fn read_u32_at(section: &Section, rva: u32, file_characteristics: &FileCharacteristics) -> Result<u32> {
    let offset = local_offset(section, rva)?;
    let bytes = section
        .raw_data
        .get(offset..offset + 4)
        .ok_or(Error::RvaOutOfRange { rva })?;
    let array: [u8; 4] = bytes.try_into().unwrap();
    Ok(if is_big_endian(file_characteristics) {
        u32::from_be_bytes(array)
    } else {
        u32::from_le_bytes(array)
    })
}

pub fn read_u64_at(section: &Section, rva: u32, file_characteristics: &FileCharacteristics) -> Result<u64> {
    let offset = local_offset(section, rva)?;
    let bytes = section
        .raw_data
        .get(offset..offset + 8)
        .ok_or(Error::RvaOutOfRange { rva })?;
    let array: [u8; 8] = bytes.try_into().unwrap();
    Ok(if is_big_endian(file_characteristics) {
        u64::from_be_bytes(array)
    } else {
        u64::from_le_bytes(array)
    })
}

/// Scans forward from `rva` to a single NUL terminator, bounded by the
/// section's initialized-data length.
pub fn read_ascii_string_at(section: &Section, rva: u32) -> Result<String> {
    let start = local_offset(section, rva)?;
    let end = section.raw_data[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| start + p)
        .ok_or(Error::RvaOutOfRange { rva })?;
    Ok(String::from_utf8_lossy(&section.raw_data[start..end]).into_owned())
}

/// Scans forward from `rva` to a double NUL (UTF-16 terminator), bounded
/// by the section's initialized-data length.
pub fn read_utf16_string_at(section: &Section, rva: u32) -> Result<String> {
    let start = local_offset(section, rva)?;
    let mut units = Vec::new();
    let mut cursor = start;
    loop {
        let pair = section
            .raw_data
            .get(cursor..cursor + 2)
            .ok_or(Error::RvaOutOfRange { rva })?;
        let unit = u16::from_le_bytes(pair.try_into().unwrap());
        if unit == 0 {
            break;
        }
        units.push(unit);
        cursor += 2;
    }
    Ok(String::from_utf16_lossy(&units))
}

/// `Err`-free counterpart to `read_u32_at`: returns `(0, false)` instead
/// of propagating `RvaOutOfRange`, for call sites that want to keep
/// walking a table past a single bad entry (e.g. directory parsers
/// recovering per §7's `MalformedDirectory` policy).
pub fn try_read_u32_at(section: &Section, rva: u32, file_characteristics: &FileCharacteristics) -> (u32, bool) {
    match read_u32_at(section, rva, file_characteristics) {
        Ok(v) => (v, true),
        Err(_) => (0, false),
    }
}

pub fn try_read_ascii_string_at(section: &Section, rva: u32) -> (String, bool) {
    match read_ascii_string_at(section, rva) {
        Ok(v) => (v, true),
        Err(_) => (String::new(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coff::section::{SectionCharacteristics, SectionHeader};

    fn sample_section() -> Section {
        let mut raw_data = vec![0u8; 0x40];
        raw_data[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        raw_data[4..9].copy_from_slice(b"hello\0");
        Section {
            header: SectionHeader {
                name: ".rdata".to_string(),
                virtual_size: 0x40,
                virtual_address: 0x2000,
                size_of_raw_data: 0x40,
                pointer_to_raw_data: 0x400,
                pointer_to_relocations: 0,
                pointer_to_line_numbers: 0,
                number_of_relocations: 0,
                number_of_line_numbers: 0,
                characteristics: SectionCharacteristics::from(0),
            },
            raw_data,
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        }
    }

    #[test]
    fn resolves_values_within_section() {
        let section = sample_section();
        let sections = vec![section];
        let characteristics = FileCharacteristics::from(0);

        let found = section_for_rva(&sections, 0x2010).unwrap();
        assert_eq!(read_u32_at(found, 0x2000, &characteristics).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_ascii_string_at(found, 0x2004).unwrap(), "hello");
    }

    #[test]
    fn out_of_range_rva_fails() {
        let sections = vec![sample_section()];
        let characteristics = FileCharacteristics::from(0);
        assert!(section_for_rva(&sections, 0x9000).is_none());
        let (_, ok) = try_read_u32_at(&sections[0], 0x9000, &characteristics);
        assert!(!ok);
    }
}
