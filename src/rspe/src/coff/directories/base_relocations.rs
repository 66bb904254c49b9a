use super::super::buffer::align_up;
use super::super::error::{Error, Result};
use super::super::rva;
use super::super::section::Section;

/// `IMAGE_REL_BASED_ABSOLUTE`: a padding sentinel used to round a block's
/// entry count up to a 4-byte boundary. Preserved on write so block
/// sizes stay aligned.
pub const REL_BASED_ABSOLUTE: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseRelocationEntry {
    pub kind: u16,
    pub offset: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRelocationBlock {
    pub page_rva: u32,
    pub entries: Vec<BaseRelocationEntry>,
}

/// Walks base-relocation blocks while the current RVA lies within
/// `(directory.rva, directory.rva + directory.size)` (C8 Base
/// relocations). Each block header starts on a 4-byte boundary; the
/// block advances by its declared size rounded up to 4.
pub fn parse(sections: &[Section], directory_rva: u32, directory_size: u32) -> Result<Vec<BaseRelocationBlock>> {
    let mut blocks = Vec::new();
    let mut cursor_rva = directory_rva;
    let end_rva = directory_rva.saturating_add(directory_size);

    while cursor_rva < end_rva {
        let (section, offset) = rva::resolve(sections, cursor_rva)?;
        let header = section
            .raw_data
            .get(offset..offset + 8)
            .ok_or(Error::RvaOutOfRange { rva: cursor_rva })?;
        let page_rva = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let block_size = u32::from_le_bytes(header[4..8].try_into().unwrap());

        if block_size < 8 {
            break;
        }

        let entry_count = (block_size - 8) / 2;
        let mut entries = Vec::with_capacity(entry_count as usize);
        for i in 0..entry_count {
            let entry_offset = offset + 8 + (i * 2) as usize;
            let raw = section
                .raw_data
                .get(entry_offset..entry_offset + 2)
                .ok_or(Error::RvaOutOfRange { rva: cursor_rva })?;
            let value = u16::from_le_bytes(raw.try_into().unwrap());
            entries.push(BaseRelocationEntry { kind: value >> 12, offset: value & 0x0FFF });
        }

        blocks.push(BaseRelocationBlock { page_rva, entries });
        cursor_rva += align_up(block_size as u64, 4) as u32;
    }

    Ok(blocks)
}

/// Serializes `blocks` back into a `.reloc`-section-shaped byte buffer,
/// starting at local offset 0 (the caller places the resulting bytes at
/// whatever RVA the layout engine assigns the section).
pub fn build(blocks: &[BaseRelocationBlock]) -> Vec<u8> {
    let mut out = Vec::new();
    for block in blocks {
        let block_size = 8 + block.entries.len() as u32 * 2;
        out.extend_from_slice(&block.page_rva.to_le_bytes());
        out.extend_from_slice(&block_size.to_le_bytes());
        for entry in &block.entries {
            let packed = (entry.kind << 12) | (entry.offset & 0x0FFF);
            out.extend_from_slice(&packed.to_le_bytes());
        }
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::super::section::{SectionCharacteristics, SectionHeader};

    #[test]
    fn round_trips_through_build_and_parse() {
        let blocks = vec![
            BaseRelocationBlock {
                page_rva: 0x1000,
                entries: vec![
                    BaseRelocationEntry { kind: 3, offset: 0x10 },
                    BaseRelocationEntry { kind: 3, offset: 0x20 },
                    BaseRelocationEntry { kind: REL_BASED_ABSOLUTE, offset: 0 },
                ],
            },
            BaseRelocationBlock { page_rva: 0x2000, entries: vec![BaseRelocationEntry { kind: 10, offset: 0x30 }] },
        ];

        let bytes = build(&blocks);
        let section = Section {
            header: SectionHeader {
                name: ".reloc".to_string(),
                virtual_size: bytes.len() as u32,
                virtual_address: 0x5000,
                size_of_raw_data: bytes.len() as u32,
                pointer_to_raw_data: 0x800,
                pointer_to_relocations: 0,
                pointer_to_line_numbers: 0,
                number_of_relocations: 0,
                number_of_line_numbers: 0,
                characteristics: SectionCharacteristics::from(0),
            },
            raw_data: bytes,
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        };
        let directory_size = section.raw_data.len() as u32;

        let sections = vec![section];
        let parsed = parse(&sections, 0x5000, directory_size).unwrap();
        assert_eq!(parsed, blocks);
    }
}
