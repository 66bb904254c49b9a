use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::error::{IoContext, Result};
use super::machine::Machine;

pub const FILE_HEADER_SIZE: u64 = 20;

/// 20-byte COFF file header (C2). Carried verbatim between parse and
/// emit except where the layout engine (`layout.rs`) recomputes
/// `section_count`, `sym_count`, `sym_table_ptr`, or
/// `optional_header_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub machine: u16,
    pub section_count: u16,
    pub timestamp_unix_seconds: u32,
    pub sym_table_ptr: u32,
    pub sym_count: u32,
    pub optional_header_size: u16,
    pub characteristics: FileCharacteristics,
}

impl FileHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<FileHeader> {
        let machine = reader.read_u16::<LittleEndian>().ctx("COFF file header")?;
        let section_count = reader.read_u16::<LittleEndian>().ctx("COFF file header")?;
        let timestamp_unix_seconds = reader.read_u32::<LittleEndian>().ctx("COFF file header")?;
        let sym_table_ptr = reader.read_u32::<LittleEndian>().ctx("COFF file header")?;
        let sym_count = reader.read_u32::<LittleEndian>().ctx("COFF file header")?;
        let optional_header_size = reader.read_u16::<LittleEndian>().ctx("COFF file header")?;
        let characteristics =
            FileCharacteristics::from(reader.read_u16::<LittleEndian>().ctx("COFF file header")?);

        Ok(FileHeader {
            machine,
            section_count,
            timestamp_unix_seconds,
            sym_table_ptr,
            sym_count,
            optional_header_size,
            characteristics,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.machine)?;
        writer.write_u16::<LittleEndian>(self.section_count)?;
        writer.write_u32::<LittleEndian>(self.timestamp_unix_seconds)?;
        writer.write_u32::<LittleEndian>(self.sym_table_ptr)?;
        writer.write_u32::<LittleEndian>(self.sym_count)?;
        writer.write_u16::<LittleEndian>(self.optional_header_size)?;
        writer.write_u16::<LittleEndian>(self.characteristics.0)?;
        Ok(())
    }

    pub fn machine(&self) -> Machine {
        Machine::from_raw(self.machine)
    }

    pub fn set_machine(&mut self, machine: Machine) {
        self.machine = machine.to_raw();
    }
}

/// `FileHeader::characteristics` bit set. Only the four bits the teacher's
/// CLI-focused model enumerated would be too narrow for a general-purpose
/// reader, so every Microsoft-documented `IMAGE_FILE_*` bit is exposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCharacteristics(u16);

impl FileCharacteristics {
    pub(crate) const RELOCS_STRIPPED: u16 = 0x0001;
    pub(crate) const EXECUTABLE_IMAGE: u16 = 0x0002;
    pub(crate) const LINE_NUMS_STRIPPED: u16 = 0x0004;
    pub(crate) const LOCAL_SYMS_STRIPPED: u16 = 0x0008;
    pub(crate) const AGGRESSIVE_WS_TRIM: u16 = 0x0010;
    pub(crate) const LARGE_ADDRESS_AWARE: u16 = 0x0020;
    pub(crate) const BYTES_REVERSED_LO: u16 = 0x0080;
    pub(crate) const MACHINE_32BIT: u16 = 0x0100;
    pub(crate) const DEBUG_STRIPPED: u16 = 0x0200;
    pub(crate) const REMOVABLE_RUN_FROM_SWAP: u16 = 0x0400;
    pub(crate) const NET_RUN_FROM_SWAP: u16 = 0x0800;
    pub(crate) const SYSTEM: u16 = 0x1000;
    pub(crate) const DLL: u16 = 0x2000;
    pub(crate) const UP_SYSTEM_ONLY: u16 = 0x4000;
    pub(crate) const BYTES_REVERSED_HI: u16 = 0x8000;

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn check_flag(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn is_relocs_stripped(&self) -> bool {
        self.check_flag(Self::RELOCS_STRIPPED)
    }

    pub fn is_executable_image(&self) -> bool {
        self.check_flag(Self::EXECUTABLE_IMAGE)
    }

    pub fn is_line_nums_stripped(&self) -> bool {
        self.check_flag(Self::LINE_NUMS_STRIPPED)
    }

    pub fn is_local_syms_stripped(&self) -> bool {
        self.check_flag(Self::LOCAL_SYMS_STRIPPED)
    }

    pub fn is_aggressive_ws_trim(&self) -> bool {
        self.check_flag(Self::AGGRESSIVE_WS_TRIM)
    }

    pub fn is_large_address_aware(&self) -> bool {
        self.check_flag(Self::LARGE_ADDRESS_AWARE)
    }

    pub fn is_bytes_reversed_lo(&self) -> bool {
        self.check_flag(Self::BYTES_REVERSED_LO)
    }

    pub fn is_32bit_machine(&self) -> bool {
        self.check_flag(Self::MACHINE_32BIT)
    }

    pub fn is_debug_stripped(&self) -> bool {
        self.check_flag(Self::DEBUG_STRIPPED)
    }

    pub fn is_removable_run_from_swap(&self) -> bool {
        self.check_flag(Self::REMOVABLE_RUN_FROM_SWAP)
    }

    pub fn is_net_run_from_swap(&self) -> bool {
        self.check_flag(Self::NET_RUN_FROM_SWAP)
    }

    pub fn is_system(&self) -> bool {
        self.check_flag(Self::SYSTEM)
    }

    pub fn is_dll(&self) -> bool {
        self.check_flag(Self::DLL)
    }

    pub fn is_up_system_only(&self) -> bool {
        self.check_flag(Self::UP_SYSTEM_ONLY)
    }

    pub fn is_bytes_reversed_hi(&self) -> bool {
        self.check_flag(Self::BYTES_REVERSED_HI)
    }
}

impl From<u16> for FileCharacteristics {
    fn from(value: u16) -> Self {
        FileCharacteristics(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_through_read_and_write() {
        let header = FileHeader {
            machine: Machine::I386.to_raw(),
            section_count: 3,
            timestamp_unix_seconds: 0x5F5E_1000,
            sym_table_ptr: 0x400,
            sym_count: 12,
            optional_header_size: 224,
            characteristics: FileCharacteristics::from(
                FileCharacteristics::EXECUTABLE_IMAGE | FileCharacteristics::LARGE_ADDRESS_AWARE,
            ),
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), FILE_HEADER_SIZE as usize);

        let mut cursor = Cursor::new(buf);
        let parsed = FileHeader::read(&mut cursor).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.characteristics.is_executable_image());
        assert!(parsed.characteristics.is_large_address_aware());
        assert!(!parsed.characteristics.is_dll());
        assert_eq!(parsed.machine(), Machine::I386);
    }
}
