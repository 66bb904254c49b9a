use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::buffer::{read_fixed_ascii, write_fixed_ascii};
use super::error::{Error, IoContext, Result};

pub const SECTION_HEADER_SIZE: u64 = 40;
pub const RELOCATION_SIZE: u64 = 10;
pub const LINE_NUMBER_SIZE: u64 = 6;
const SECTION_NAME_LEN: usize = 8;

/// 10-byte COFF relocation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub virtual_address: u32,
    pub symbol_table_index: u32,
    pub kind: u16,
}

impl Relocation {
    pub fn read<R: Read>(reader: &mut R) -> Result<Relocation> {
        Ok(Relocation {
            virtual_address: reader.read_u32::<LittleEndian>().ctx("relocation entry")?,
            symbol_table_index: reader.read_u32::<LittleEndian>().ctx("relocation entry")?,
            kind: reader.read_u16::<LittleEndian>().ctx("relocation entry")?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.virtual_address)?;
        writer.write_u32::<LittleEndian>(self.symbol_table_index)?;
        writer.write_u16::<LittleEndian>(self.kind)?;
        Ok(())
    }
}

/// 6-byte COFF line-number entry. `type_or_symbol` is either a symbol
/// table index (when `line_number == 0`) or an RVA, per the COFF spec;
/// this crate treats it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub type_or_symbol: u32,
    pub line_number: u16,
}

impl LineNumber {
    pub fn read<R: Read>(reader: &mut R) -> Result<LineNumber> {
        Ok(LineNumber {
            type_or_symbol: reader.read_u32::<LittleEndian>().ctx("line-number entry")?,
            line_number: reader.read_u16::<LittleEndian>().ctx("line-number entry")?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.type_or_symbol)?;
        writer.write_u16::<LittleEndian>(self.line_number)?;
        Ok(())
    }
}

/// 40-byte section header (C4).
#[derive(Debug, Clone, PartialEq)]
pub struct SectionHeader {
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_line_numbers: u32,
    pub number_of_relocations: u16,
    pub number_of_line_numbers: u16,
    pub characteristics: SectionCharacteristics,
}

impl SectionHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<SectionHeader> {
        let name = read_fixed_ascii(reader, SECTION_NAME_LEN)?;
        Ok(SectionHeader {
            name,
            virtual_size: reader.read_u32::<LittleEndian>().ctx("section header")?,
            virtual_address: reader.read_u32::<LittleEndian>().ctx("section header")?,
            size_of_raw_data: reader.read_u32::<LittleEndian>().ctx("section header")?,
            pointer_to_raw_data: reader.read_u32::<LittleEndian>().ctx("section header")?,
            pointer_to_relocations: reader.read_u32::<LittleEndian>().ctx("section header")?,
            pointer_to_line_numbers: reader.read_u32::<LittleEndian>().ctx("section header")?,
            number_of_relocations: reader.read_u16::<LittleEndian>().ctx("section header")?,
            number_of_line_numbers: reader.read_u16::<LittleEndian>().ctx("section header")?,
            characteristics: SectionCharacteristics::from(
                reader.read_u32::<LittleEndian>().ctx("section header")?,
            ),
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_fixed_ascii(writer, &self.name, SECTION_NAME_LEN)?;
        writer.write_u32::<LittleEndian>(self.virtual_size)?;
        writer.write_u32::<LittleEndian>(self.virtual_address)?;
        writer.write_u32::<LittleEndian>(self.size_of_raw_data)?;
        writer.write_u32::<LittleEndian>(self.pointer_to_raw_data)?;
        writer.write_u32::<LittleEndian>(self.pointer_to_relocations)?;
        writer.write_u32::<LittleEndian>(self.pointer_to_line_numbers)?;
        writer.write_u16::<LittleEndian>(self.number_of_relocations)?;
        writer.write_u16::<LittleEndian>(self.number_of_line_numbers)?;
        writer.write_u32::<LittleEndian>(self.characteristics.0)?;
        Ok(())
    }
}

/// A section: header plus the three bodies it points at (C4). Owned
/// exclusively by the image; `Section` itself holds no back-reference —
/// RVA resolution goes through `Image::section_for_rva` instead (Design
/// Notes: prefer passing the image explicitly over a back-pointer).
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub header: SectionHeader,
    pub raw_data: Vec<u8>,
    pub relocations: Vec<Relocation>,
    pub line_numbers: Vec<LineNumber>,
}

impl Section {
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Fails with `BadSectionName` for names over 8 ASCII bytes; the
    /// `"/<offset>"` string-table indirection form is not supported on
    /// write.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if name.len() > SECTION_NAME_LEN {
            return Err(Error::BadSectionName { name: name.to_string() });
        }
        self.header.name = name.to_string();
        Ok(())
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.header.virtual_address
            && (rva as u64) < self.header.virtual_address as u64 + self.header.virtual_size as u64
    }

    /// Reads the raw data and relocation/line-number tables at the
    /// offsets already written into `header`, per C4: seek to each
    /// pointer in turn, read the body, then restore the stream position
    /// so the next section header can be read sequentially.
    pub fn read_body<S: Read + std::io::Seek>(
        stream: &mut S,
        header: SectionHeader,
    ) -> Result<Section> {
        let resume_at = super::buffer::position(stream)?;

        let raw_data = if header.characteristics.is_cnt_uninitialized_data() {
            Vec::new()
        } else if header.size_of_raw_data == 0 || header.pointer_to_raw_data == 0 {
            Vec::new()
        } else {
            stream.seek(std::io::SeekFrom::Start(header.pointer_to_raw_data as u64))?;
            let mut buf = vec![0u8; header.size_of_raw_data as usize];
            stream.read_exact(&mut buf).ctx("section raw data")?;
            buf
        };

        let relocations = if header.number_of_relocations == 0 || header.pointer_to_relocations == 0
        {
            Vec::new()
        } else {
            stream.seek(std::io::SeekFrom::Start(header.pointer_to_relocations as u64))?;
            read_relocations(stream, &header)?
        };

        let line_numbers = if header.number_of_line_numbers == 0 || header.pointer_to_line_numbers == 0
        {
            Vec::new()
        } else {
            stream.seek(std::io::SeekFrom::Start(header.pointer_to_line_numbers as u64))?;
            let mut entries = Vec::with_capacity(header.number_of_line_numbers as usize);
            for _ in 0..header.number_of_line_numbers {
                entries.push(LineNumber::read(stream)?);
            }
            entries
        };

        stream.seek(std::io::SeekFrom::Start(resume_at))?;

        Ok(Section { header, raw_data, relocations, line_numbers })
    }

    /// Writes raw data, relocations, and line numbers at the pointers
    /// already computed by the layout engine; does not touch the header
    /// itself (the caller writes headers contiguously beforehand).
    pub fn write_body<S: Write + std::io::Seek>(&self, stream: &mut S) -> Result<()> {
        if !self.header.characteristics.is_cnt_uninitialized_data() && !self.raw_data.is_empty() {
            stream.seek(std::io::SeekFrom::Start(self.header.pointer_to_raw_data as u64))?;
            stream.write_all(&self.raw_data)?;
        }

        if !self.relocations.is_empty() {
            stream.seek(std::io::SeekFrom::Start(self.header.pointer_to_relocations as u64))?;
            write_relocations(stream, &self.header, &self.relocations)?;
        }

        if !self.line_numbers.is_empty() {
            stream.seek(std::io::SeekFrom::Start(self.header.pointer_to_line_numbers as u64))?;
            for entry in &self.line_numbers {
                entry.write(stream)?;
            }
        }

        Ok(())
    }
}

fn read_relocations<R: Read>(reader: &mut R, header: &SectionHeader) -> Result<Vec<Relocation>> {
    if header.number_of_relocations == 0xFFFF && header.characteristics.is_lnk_nreloc_ovfl() {
        let overflow = Relocation::read(reader)?;
        let actual_count = overflow.virtual_address;
        let mut entries = Vec::with_capacity(actual_count as usize);
        for _ in 0..actual_count {
            entries.push(Relocation::read(reader)?);
        }
        Ok(entries)
    } else {
        let mut entries = Vec::with_capacity(header.number_of_relocations as usize);
        for _ in 0..header.number_of_relocations {
            entries.push(Relocation::read(reader)?);
        }
        Ok(entries)
    }
}

fn write_relocations<W: Write>(
    writer: &mut W,
    header: &SectionHeader,
    relocations: &[Relocation],
) -> Result<()> {
    if header.number_of_relocations == 0xFFFF && header.characteristics.is_lnk_nreloc_ovfl() {
        Relocation { virtual_address: relocations.len() as u32, symbol_table_index: 0, kind: 0 }
            .write(writer)?;
    }
    for entry in relocations {
        entry.write(writer)?;
    }
    Ok(())
}

/// `SectionHeader::characteristics` bit set (C4 supplement): every
/// Microsoft-documented `IMAGE_SCN_*` bit, including the 4-bit alignment
/// field and the relocation-count overflow marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionCharacteristics(u32);

impl SectionCharacteristics {
    pub(crate) const TYPE_NO_PAD: u32 = 0x0000_0008;
    pub(crate) const CNT_CODE: u32 = 0x0000_0020;
    pub(crate) const CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
    pub(crate) const CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;
    pub(crate) const LNK_OTHER: u32 = 0x0000_0100;
    pub(crate) const LNK_INFO: u32 = 0x0000_0200;
    pub(crate) const LNK_REMOVE: u32 = 0x0000_0800;
    pub(crate) const LNK_COMDAT: u32 = 0x0000_1000;
    pub(crate) const GPREL: u32 = 0x0000_8000;
    pub(crate) const MEM_PURGEABLE: u32 = 0x0002_0000;
    pub(crate) const MEM_LOCKED: u32 = 0x0004_0000;
    pub(crate) const MEM_PRELOAD: u32 = 0x0008_0000;
    pub(crate) const ALIGN_MASK: u32 = 0x00F0_0000;
    pub(crate) const LNK_NRELOC_OVFL: u32 = 0x0100_0000;
    pub(crate) const MEM_DISCARDABLE: u32 = 0x0200_0000;
    pub(crate) const MEM_NOT_CACHED: u32 = 0x0400_0000;
    pub(crate) const MEM_NOT_PAGED: u32 = 0x0800_0000;
    pub(crate) const MEM_SHARED: u32 = 0x1000_0000;
    pub(crate) const MEM_EXECUTE: u32 = 0x2000_0000;
    pub(crate) const MEM_READ: u32 = 0x4000_0000;
    pub(crate) const MEM_WRITE: u32 = 0x8000_0000;

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn check_flag(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn is_type_no_pad(&self) -> bool {
        self.check_flag(Self::TYPE_NO_PAD)
    }

    pub fn is_cnt_code(&self) -> bool {
        self.check_flag(Self::CNT_CODE)
    }

    pub fn is_cnt_initialized_data(&self) -> bool {
        self.check_flag(Self::CNT_INITIALIZED_DATA)
    }

    pub fn is_cnt_uninitialized_data(&self) -> bool {
        self.check_flag(Self::CNT_UNINITIALIZED_DATA)
    }

    pub fn is_lnk_other(&self) -> bool {
        self.check_flag(Self::LNK_OTHER)
    }

    pub fn is_lnk_info(&self) -> bool {
        self.check_flag(Self::LNK_INFO)
    }

    pub fn is_lnk_remove(&self) -> bool {
        self.check_flag(Self::LNK_REMOVE)
    }

    pub fn is_lnk_comdat(&self) -> bool {
        self.check_flag(Self::LNK_COMDAT)
    }

    pub fn is_gprel(&self) -> bool {
        self.check_flag(Self::GPREL)
    }

    pub fn is_mem_purgeable(&self) -> bool {
        self.check_flag(Self::MEM_PURGEABLE)
    }

    pub fn is_mem_locked(&self) -> bool {
        self.check_flag(Self::MEM_LOCKED)
    }

    pub fn is_mem_preload(&self) -> bool {
        self.check_flag(Self::MEM_PRELOAD)
    }

    /// Decodes the 4-bit alignment field (bits 20-23) into a byte count,
    /// or `None` when the field is zero (alignment unspecified).
    pub fn alignment_bytes(&self) -> Option<u32> {
        let field = (self.0 & Self::ALIGN_MASK) >> 20;
        if field == 0 {
            None
        } else {
            Some(1u32 << (field - 1))
        }
    }

    pub fn is_lnk_nreloc_ovfl(&self) -> bool {
        self.check_flag(Self::LNK_NRELOC_OVFL)
    }

    pub fn is_mem_discardable(&self) -> bool {
        self.check_flag(Self::MEM_DISCARDABLE)
    }

    pub fn is_mem_not_cached(&self) -> bool {
        self.check_flag(Self::MEM_NOT_CACHED)
    }

    pub fn is_mem_not_paged(&self) -> bool {
        self.check_flag(Self::MEM_NOT_PAGED)
    }

    pub fn is_mem_shared(&self) -> bool {
        self.check_flag(Self::MEM_SHARED)
    }

    pub fn is_mem_execute(&self) -> bool {
        self.check_flag(Self::MEM_EXECUTE)
    }

    pub fn is_mem_read(&self) -> bool {
        self.check_flag(Self::MEM_READ)
    }

    pub fn is_mem_write(&self) -> bool {
        self.check_flag(Self::MEM_WRITE)
    }
}

impl From<u32> for SectionCharacteristics {
    fn from(value: u32) -> Self {
        SectionCharacteristics(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header(name: &str, characteristics: u32) -> SectionHeader {
        SectionHeader {
            name: name.to_string(),
            virtual_size: 0x100,
            virtual_address: 0x1000,
            size_of_raw_data: 0x200,
            pointer_to_raw_data: 0,
            pointer_to_relocations: 0,
            pointer_to_line_numbers: 0,
            number_of_relocations: 0,
            number_of_line_numbers: 0,
            characteristics: SectionCharacteristics::from(characteristics),
        }
    }

    #[test]
    fn header_round_trips() {
        let header = sample_header(
            ".text",
            SectionCharacteristics::CNT_CODE
                | SectionCharacteristics::MEM_EXECUTE
                | SectionCharacteristics::MEM_READ,
        );
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, SECTION_HEADER_SIZE);

        let mut cursor = Cursor::new(buf);
        let parsed = SectionHeader::read(&mut cursor).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.characteristics.is_cnt_code());
        assert!(parsed.characteristics.is_mem_execute());
        assert!(!parsed.characteristics.is_mem_write());
    }

    #[test]
    fn set_name_rejects_long_names() {
        let mut section = Section {
            header: sample_header(".text", 0),
            raw_data: Vec::new(),
            relocations: Vec::new(),
            line_numbers: Vec::new(),
        };
        assert!(section.set_name(".toolong9").is_err());
        assert!(section.set_name(".data").is_ok());
        assert_eq!(section.name(), ".data");
    }

    #[test]
    fn overflowed_relocation_count_round_trips() {
        let mut header = sample_header(
            ".text",
            SectionCharacteristics::CNT_CODE | SectionCharacteristics::LNK_NRELOC_OVFL,
        );
        header.number_of_relocations = 0xFFFF;
        header.pointer_to_relocations = 0;

        let relocations: Vec<Relocation> = (0..3)
            .map(|i| Relocation { virtual_address: i, symbol_table_index: i, kind: 6 })
            .collect();

        let mut buf = Vec::new();
        write_relocations(&mut buf, &header, &relocations).unwrap();

        let mut cursor = Cursor::new(buf);
        let parsed = read_relocations(&mut cursor, &header).unwrap();
        assert_eq!(parsed, relocations);
    }
}
