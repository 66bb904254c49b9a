use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::error::{Error, IoContext, Result};

pub const MAGIC_PE32: u16 = 0x10B;
pub const MAGIC_PE32_PLUS: u16 = 0x20B;
pub const MAGIC_ROM: u16 = 0x107;

pub const DATA_DIRECTORY_SIZE: u64 = 8;

pub const DIRECTORY_EXPORTS: usize = 0;
pub const DIRECTORY_IMPORTS: usize = 1;
pub const DIRECTORY_RESOURCES: usize = 2;
pub const DIRECTORY_EXCEPTIONS: usize = 3;
pub const DIRECTORY_CERTIFICATES: usize = 4;
pub const DIRECTORY_BASE_RELOCATIONS: usize = 5;
pub const DIRECTORY_DEBUG: usize = 6;
pub const DIRECTORY_ARCHITECTURE: usize = 7;
pub const DIRECTORY_GLOBAL_POINTERS: usize = 8;
pub const DIRECTORY_TLS: usize = 9;
pub const DIRECTORY_LOAD_CONFIG: usize = 10;
pub const DIRECTORY_BOUND_IMPORTS: usize = 11;
pub const DIRECTORY_IMPORT_ADDRESSES: usize = 12;
pub const DIRECTORY_DELAY_IMPORTS: usize = 13;
pub const DIRECTORY_CLR_RUNTIME_HEADER: usize = 14;

/// `{rva, size}` pair; one entry per well-known directory index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn read<R: Read>(reader: &mut R) -> Result<DataDirectory> {
        let rva = reader.read_u32::<LittleEndian>().ctx("data directory")?;
        let size = reader.read_u32::<LittleEndian>().ctx("data directory")?;
        Ok(DataDirectory { rva, size })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.rva)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    pub fn is_present(&self) -> bool {
        self.rva != 0
    }
}

/// Fields shared by both PE32 and PE32+, independent of address width.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardFields {
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
}

/// Windows-specific fields whose width depends on the variant.
#[derive(Debug, Clone, PartialEq)]
pub struct NtFields {
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_os_version: u16,
    pub minor_os_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: u16,
    pub dll_characteristics: DllCharacteristics,
    pub loader_flags: u32,
}

/// The optional header is a discriminated union over `magic` (C3): PE32
/// carries a 32-bit `base_of_data`/`image_base`/stack-heap sizes, PE32+
/// widens those to 64 bits and drops `base_of_data`. Branching on magic
/// happens once here, in the variant, rather than at every field getter.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionalHeader {
    Pe32 {
        standard: StandardFields,
        base_of_data: u32,
        image_base: u32,
        nt: NtFields,
        size_of_stack_reserve: u32,
        size_of_stack_commit: u32,
        size_of_heap_reserve: u32,
        size_of_heap_commit: u32,
        data_directories: Vec<DataDirectory>,
    },
    Pe32Plus {
        standard: StandardFields,
        image_base: u64,
        nt: NtFields,
        size_of_stack_reserve: u64,
        size_of_stack_commit: u64,
        size_of_heap_reserve: u64,
        size_of_heap_commit: u64,
        data_directories: Vec<DataDirectory>,
    },
    /// `magic == 0x107`. The ROM layout is not laid out further here;
    /// bytes beyond the 24-byte standard fields are preserved opaquely.
    Rom { standard: StandardFields, tail: Vec<u8> },
}

impl OptionalHeader {
    pub fn magic(&self) -> u16 {
        match self {
            OptionalHeader::Pe32 { .. } => MAGIC_PE32,
            OptionalHeader::Pe32Plus { .. } => MAGIC_PE32_PLUS,
            OptionalHeader::Rom { .. } => MAGIC_ROM,
        }
    }

    pub fn standard(&self) -> &StandardFields {
        match self {
            OptionalHeader::Pe32 { standard, .. } => standard,
            OptionalHeader::Pe32Plus { standard, .. } => standard,
            OptionalHeader::Rom { standard, .. } => standard,
        }
    }

    pub fn data_directories(&self) -> &[DataDirectory] {
        match self {
            OptionalHeader::Pe32 { data_directories, .. } => data_directories,
            OptionalHeader::Pe32Plus { data_directories, .. } => data_directories,
            OptionalHeader::Rom { .. } => &[],
        }
    }

    pub fn data_directories_mut(&mut self) -> Option<&mut Vec<DataDirectory>> {
        match self {
            OptionalHeader::Pe32 { data_directories, .. } => Some(data_directories),
            OptionalHeader::Pe32Plus { data_directories, .. } => Some(data_directories),
            OptionalHeader::Rom { .. } => None,
        }
    }

    pub fn directory(&self, index: usize) -> Option<DataDirectory> {
        self.data_directories().get(index).copied()
    }

    pub fn number_of_rva_and_sizes(&self) -> u32 {
        self.data_directories().len() as u32
    }

    pub fn file_alignment(&self) -> u32 {
        match self {
            OptionalHeader::Pe32 { nt, .. } => nt.file_alignment,
            OptionalHeader::Pe32Plus { nt, .. } => nt.file_alignment,
            OptionalHeader::Rom { .. } => 0,
        }
    }

    pub fn section_alignment(&self) -> u32 {
        match self {
            OptionalHeader::Pe32 { nt, .. } => nt.section_alignment,
            OptionalHeader::Pe32Plus { nt, .. } => nt.section_alignment,
            OptionalHeader::Rom { .. } => 0,
        }
    }

    pub fn size_of_headers(&self) -> u32 {
        match self {
            OptionalHeader::Pe32 { nt, .. } => nt.size_of_headers,
            OptionalHeader::Pe32Plus { nt, .. } => nt.size_of_headers,
            OptionalHeader::Rom { .. } => 0,
        }
    }

    pub fn set_size_of_headers(&mut self, value: u32) {
        match self {
            OptionalHeader::Pe32 { nt, .. } => nt.size_of_headers = value,
            OptionalHeader::Pe32Plus { nt, .. } => nt.size_of_headers = value,
            OptionalHeader::Rom { .. } => {}
        }
    }

    pub fn size_of_image(&self) -> u32 {
        match self {
            OptionalHeader::Pe32 { nt, .. } => nt.size_of_image,
            OptionalHeader::Pe32Plus { nt, .. } => nt.size_of_image,
            OptionalHeader::Rom { .. } => 0,
        }
    }

    pub fn set_size_of_image(&mut self, value: u32) {
        match self {
            OptionalHeader::Pe32 { nt, .. } => nt.size_of_image = value,
            OptionalHeader::Pe32Plus { nt, .. } => nt.size_of_image = value,
            OptionalHeader::Rom { .. } => {}
        }
    }

    pub fn set_base_of_code(&mut self, value: u32) {
        match self {
            OptionalHeader::Pe32 { standard, .. } => standard.base_of_code = value,
            OptionalHeader::Pe32Plus { standard, .. } => standard.base_of_code = value,
            OptionalHeader::Rom { standard, .. } => standard.base_of_code = value,
        }
    }

    pub fn set_checksum(&mut self, value: u32) {
        match self {
            OptionalHeader::Pe32 { nt, .. } => nt.checksum = value,
            OptionalHeader::Pe32Plus { nt, .. } => nt.checksum = value,
            OptionalHeader::Rom { .. } => {}
        }
    }

    /// Consume exactly `size` bytes (per `FileHeader::optional_header_size`)
    /// and dispatch on `magic`.
    pub fn read<R: Read>(reader: &mut R, size: u16) -> Result<OptionalHeader> {
        let mut raw = vec![0u8; size as usize];
        reader.read_exact(&mut raw).ctx("optional header")?;
        let mut cursor = Cursor::new(raw);

        let magic = cursor.read_u16::<LittleEndian>().ctx("optional header magic")?;
        let standard = StandardFields {
            major_linker_version: cursor.read_u8().ctx("optional header")?,
            minor_linker_version: cursor.read_u8().ctx("optional header")?,
            size_of_code: cursor.read_u32::<LittleEndian>().ctx("optional header")?,
            size_of_initialized_data: cursor.read_u32::<LittleEndian>().ctx("optional header")?,
            size_of_uninitialized_data: cursor.read_u32::<LittleEndian>().ctx("optional header")?,
            address_of_entry_point: cursor.read_u32::<LittleEndian>().ctx("optional header")?,
            base_of_code: cursor.read_u32::<LittleEndian>().ctx("optional header")?,
        };

        match magic {
            MAGIC_PE32 => {
                let base_of_data = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let image_base = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let nt_head = read_nt_head(&mut cursor)?;
                let size_of_stack_reserve = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let size_of_stack_commit = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let size_of_heap_reserve = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let size_of_heap_commit = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let loader_flags = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let num_rva_and_sizes = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let data_directories = read_directories(&mut cursor, num_rva_and_sizes)?;

                Ok(OptionalHeader::Pe32 {
                    standard,
                    base_of_data,
                    image_base,
                    nt: nt_head.into_nt_fields(loader_flags),
                    size_of_stack_reserve,
                    size_of_stack_commit,
                    size_of_heap_reserve,
                    size_of_heap_commit,
                    data_directories,
                })
            }
            MAGIC_PE32_PLUS => {
                let image_base = cursor.read_u64::<LittleEndian>().ctx("optional header")?;
                let nt_head = read_nt_head(&mut cursor)?;
                let size_of_stack_reserve = cursor.read_u64::<LittleEndian>().ctx("optional header")?;
                let size_of_stack_commit = cursor.read_u64::<LittleEndian>().ctx("optional header")?;
                let size_of_heap_reserve = cursor.read_u64::<LittleEndian>().ctx("optional header")?;
                let size_of_heap_commit = cursor.read_u64::<LittleEndian>().ctx("optional header")?;
                let loader_flags = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let num_rva_and_sizes = cursor.read_u32::<LittleEndian>().ctx("optional header")?;
                let data_directories = read_directories(&mut cursor, num_rva_and_sizes)?;

                Ok(OptionalHeader::Pe32Plus {
                    standard,
                    image_base,
                    nt: nt_head.into_nt_fields(loader_flags),
                    size_of_stack_reserve,
                    size_of_stack_commit,
                    size_of_heap_reserve,
                    size_of_heap_commit,
                    data_directories,
                })
            }
            MAGIC_ROM => {
                let mut tail = Vec::new();
                cursor.read_to_end(&mut tail).ctx("optional header")?;
                Ok(OptionalHeader::Rom { standard, tail })
            }
            other => Err(Error::UnsupportedOptionalHeaderMagic { magic: other }),
        }
    }

    /// Always reserialises from the typed fields, per C3: there is no
    /// shadow byte buffer kept around between setter calls.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.magic())?;
        let standard = self.standard();
        writer.write_u8(standard.major_linker_version)?;
        writer.write_u8(standard.minor_linker_version)?;
        writer.write_u32::<LittleEndian>(standard.size_of_code)?;
        writer.write_u32::<LittleEndian>(standard.size_of_initialized_data)?;
        writer.write_u32::<LittleEndian>(standard.size_of_uninitialized_data)?;
        writer.write_u32::<LittleEndian>(standard.address_of_entry_point)?;
        writer.write_u32::<LittleEndian>(standard.base_of_code)?;

        match self {
            OptionalHeader::Pe32 {
                base_of_data,
                image_base,
                nt,
                size_of_stack_reserve,
                size_of_stack_commit,
                size_of_heap_reserve,
                size_of_heap_commit,
                data_directories,
                ..
            } => {
                writer.write_u32::<LittleEndian>(*base_of_data)?;
                writer.write_u32::<LittleEndian>(*image_base)?;
                write_nt_head(writer, nt)?;
                writer.write_u32::<LittleEndian>(*size_of_stack_reserve)?;
                writer.write_u32::<LittleEndian>(*size_of_stack_commit)?;
                writer.write_u32::<LittleEndian>(*size_of_heap_reserve)?;
                writer.write_u32::<LittleEndian>(*size_of_heap_commit)?;
                writer.write_u32::<LittleEndian>(nt.loader_flags)?;
                writer.write_u32::<LittleEndian>(data_directories.len() as u32)?;
                for dir in data_directories {
                    dir.write(writer)?;
                }
            }
            OptionalHeader::Pe32Plus {
                image_base,
                nt,
                size_of_stack_reserve,
                size_of_stack_commit,
                size_of_heap_reserve,
                size_of_heap_commit,
                data_directories,
                ..
            } => {
                writer.write_u64::<LittleEndian>(*image_base)?;
                write_nt_head(writer, nt)?;
                writer.write_u64::<LittleEndian>(*size_of_stack_reserve)?;
                writer.write_u64::<LittleEndian>(*size_of_stack_commit)?;
                writer.write_u64::<LittleEndian>(*size_of_heap_reserve)?;
                writer.write_u64::<LittleEndian>(*size_of_heap_commit)?;
                writer.write_u32::<LittleEndian>(nt.loader_flags)?;
                writer.write_u32::<LittleEndian>(data_directories.len() as u32)?;
                for dir in data_directories {
                    dir.write(writer)?;
                }
            }
            OptionalHeader::Rom { tail, .. } => {
                writer.write_all(tail)?;
            }
        }
        Ok(())
    }

    /// Size this header would occupy on disk if reserialised now.
    pub fn size(&self) -> u64 {
        match self {
            OptionalHeader::Pe32 { data_directories, .. } => {
                24 + 4 + 4 + 40 + 4 * 4 + 4 + data_directories.len() as u64 * DATA_DIRECTORY_SIZE
            }
            OptionalHeader::Pe32Plus { data_directories, .. } => {
                24 + 8 + 40 + 4 * 8 + 4 + data_directories.len() as u64 * DATA_DIRECTORY_SIZE
            }
            OptionalHeader::Rom { tail, .. } => 24 + tail.len() as u64,
        }
    }
}

/// The windows-specific fields up to (but not including) stack/heap
/// sizes are identical in shape between PE32 and PE32+; only the sizes
/// after them differ in width, so this intermediate struct avoids
/// duplicating the read/write of the shared prefix.
struct NtHead {
    section_alignment: u32,
    file_alignment: u32,
    major_os_version: u16,
    minor_os_version: u16,
    major_image_version: u16,
    minor_image_version: u16,
    major_subsystem_version: u16,
    minor_subsystem_version: u16,
    win32_version_value: u32,
    size_of_image: u32,
    size_of_headers: u32,
    checksum: u32,
    subsystem: u16,
    dll_characteristics: DllCharacteristics,
}

impl NtHead {
    fn into_nt_fields(self, loader_flags: u32) -> NtFields {
        NtFields {
            section_alignment: self.section_alignment,
            file_alignment: self.file_alignment,
            major_os_version: self.major_os_version,
            minor_os_version: self.minor_os_version,
            major_image_version: self.major_image_version,
            minor_image_version: self.minor_image_version,
            major_subsystem_version: self.major_subsystem_version,
            minor_subsystem_version: self.minor_subsystem_version,
            win32_version_value: self.win32_version_value,
            size_of_image: self.size_of_image,
            size_of_headers: self.size_of_headers,
            checksum: self.checksum,
            subsystem: self.subsystem,
            dll_characteristics: self.dll_characteristics,
            loader_flags,
        }
    }
}

fn read_nt_head<R: Read>(reader: &mut R) -> Result<NtHead> {
    Ok(NtHead {
        section_alignment: reader.read_u32::<LittleEndian>().ctx("optional header")?,
        file_alignment: reader.read_u32::<LittleEndian>().ctx("optional header")?,
        major_os_version: reader.read_u16::<LittleEndian>().ctx("optional header")?,
        minor_os_version: reader.read_u16::<LittleEndian>().ctx("optional header")?,
        major_image_version: reader.read_u16::<LittleEndian>().ctx("optional header")?,
        minor_image_version: reader.read_u16::<LittleEndian>().ctx("optional header")?,
        major_subsystem_version: reader.read_u16::<LittleEndian>().ctx("optional header")?,
        minor_subsystem_version: reader.read_u16::<LittleEndian>().ctx("optional header")?,
        win32_version_value: reader.read_u32::<LittleEndian>().ctx("optional header")?,
        size_of_image: reader.read_u32::<LittleEndian>().ctx("optional header")?,
        size_of_headers: reader.read_u32::<LittleEndian>().ctx("optional header")?,
        checksum: reader.read_u32::<LittleEndian>().ctx("optional header")?,
        subsystem: reader.read_u16::<LittleEndian>().ctx("optional header")?,
        dll_characteristics: DllCharacteristics::from(
            reader.read_u16::<LittleEndian>().ctx("optional header")?,
        ),
    })
}

fn write_nt_head<W: Write>(writer: &mut W, nt: &NtFields) -> Result<()> {
    writer.write_u32::<LittleEndian>(nt.section_alignment)?;
    writer.write_u32::<LittleEndian>(nt.file_alignment)?;
    writer.write_u16::<LittleEndian>(nt.major_os_version)?;
    writer.write_u16::<LittleEndian>(nt.minor_os_version)?;
    writer.write_u16::<LittleEndian>(nt.major_image_version)?;
    writer.write_u16::<LittleEndian>(nt.minor_image_version)?;
    writer.write_u16::<LittleEndian>(nt.major_subsystem_version)?;
    writer.write_u16::<LittleEndian>(nt.minor_subsystem_version)?;
    writer.write_u32::<LittleEndian>(nt.win32_version_value)?;
    writer.write_u32::<LittleEndian>(nt.size_of_image)?;
    writer.write_u32::<LittleEndian>(nt.size_of_headers)?;
    writer.write_u32::<LittleEndian>(nt.checksum)?;
    writer.write_u16::<LittleEndian>(nt.subsystem)?;
    writer.write_u16::<LittleEndian>(nt.dll_characteristics.0)?;
    Ok(())
}

fn read_directories<R: Read>(reader: &mut R, count: u32) -> Result<Vec<DataDirectory>> {
    let mut dirs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        dirs.push(DataDirectory::read(reader)?);
    }
    Ok(dirs)
}

/// `OptionalHeader::dll_characteristics` bit set (ASLR, NX, high-entropy
/// VA, ...), matching the teacher's named-const/`check_flag` flag idiom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DllCharacteristics(u16);

impl DllCharacteristics {
    pub(crate) const HIGH_ENTROPY_VA: u16 = 0x0020;
    pub(crate) const DYNAMIC_BASE: u16 = 0x0040;
    pub(crate) const FORCE_INTEGRITY: u16 = 0x0080;
    pub(crate) const NX_COMPAT: u16 = 0x0100;
    pub(crate) const NO_ISOLATION: u16 = 0x0200;
    pub(crate) const NO_SEH: u16 = 0x0400;
    pub(crate) const NO_BIND: u16 = 0x0800;
    pub(crate) const APPCONTAINER: u16 = 0x1000;
    pub(crate) const WDM_DRIVER: u16 = 0x2000;
    pub(crate) const GUARD_CF: u16 = 0x4000;
    pub(crate) const TERMINAL_SERVER_AWARE: u16 = 0x8000;

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn check_flag(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn is_high_entropy_va(&self) -> bool {
        self.check_flag(Self::HIGH_ENTROPY_VA)
    }

    pub fn is_dynamic_base(&self) -> bool {
        self.check_flag(Self::DYNAMIC_BASE)
    }

    pub fn is_force_integrity(&self) -> bool {
        self.check_flag(Self::FORCE_INTEGRITY)
    }

    pub fn is_nx_compat(&self) -> bool {
        self.check_flag(Self::NX_COMPAT)
    }

    pub fn is_no_isolation(&self) -> bool {
        self.check_flag(Self::NO_ISOLATION)
    }

    pub fn is_no_seh(&self) -> bool {
        self.check_flag(Self::NO_SEH)
    }

    pub fn is_no_bind(&self) -> bool {
        self.check_flag(Self::NO_BIND)
    }

    pub fn is_appcontainer(&self) -> bool {
        self.check_flag(Self::APPCONTAINER)
    }

    pub fn is_wdm_driver(&self) -> bool {
        self.check_flag(Self::WDM_DRIVER)
    }

    pub fn is_guard_cf(&self) -> bool {
        self.check_flag(Self::GUARD_CF)
    }

    pub fn is_terminal_server_aware(&self) -> bool {
        self.check_flag(Self::TERMINAL_SERVER_AWARE)
    }
}

impl From<u16> for DllCharacteristics {
    fn from(value: u16) -> Self {
        DllCharacteristics(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pe32() -> OptionalHeader {
        OptionalHeader::Pe32 {
            standard: StandardFields {
                major_linker_version: 14,
                minor_linker_version: 0,
                size_of_code: 0x1000,
                size_of_initialized_data: 0x2000,
                size_of_uninitialized_data: 0,
                address_of_entry_point: 0x1234,
                base_of_code: 0x1000,
            },
            base_of_data: 0x3000,
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
                size_of_image: 0x5000,
                size_of_headers: 0x400,
                checksum: 0,
                subsystem: 3,
                dll_characteristics: DllCharacteristics::from(
                    DllCharacteristics::DYNAMIC_BASE | DllCharacteristics::NX_COMPAT,
                ),
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
    fn pe32_round_trips_and_reports_magic() {
        let header = sample_pe32();
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, header.size());

        let mut cursor = Cursor::new(buf);
        let parsed = OptionalHeader::read(&mut cursor, header.size() as u16).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.magic(), MAGIC_PE32);
        assert_eq!(parsed.number_of_rva_and_sizes(), 16);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(0x9999).unwrap();
        buf.extend_from_slice(&[0u8; 22]);
        let mut cursor = Cursor::new(buf.clone());
        let err = OptionalHeader::read(&mut cursor, buf.len() as u16).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOptionalHeaderMagic { magic: 0x9999 }));
    }
}
