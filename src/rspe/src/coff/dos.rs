use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::buffer::{read_be_u16, write_be_u16};
use super::error::{Error, IoContext, Result};

pub const IMAGE_DOS_SIGNATURE: u16 = 0x4D5A; // "MZ"
pub const IMAGE_OS2_SIGNATURE: u16 = 0x4E45; // "NE"
pub const IMAGE_OS2_SIGNATURE_LE: u16 = 0x4C45; // "LE"

/// The 4-byte PE signature that immediately follows the DOS stub at
/// `e_lfanew`, always `"PE\0\0"`.
pub const PE_SIGNATURE: u32 = 0x5045_0000;

/// 64-byte legacy MS-DOS header. Only `e_lfanew` is consumed by the
/// parser; every other field is preserved verbatim so an unmodified image
/// round-trips byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    /// Absolute file offset of the PE signature.
    pub e_lfanew: u32,
}

pub const DOS_HEADER_SIZE: u64 = 64;

impl DosHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<DosHeader> {
        let e_magic = read_be_u16(reader)?;
        if e_magic != IMAGE_DOS_SIGNATURE
            && e_magic != IMAGE_OS2_SIGNATURE
            && e_magic != IMAGE_OS2_SIGNATURE_LE
        {
            return Err(Error::InvalidImageSignature { found: e_magic as u32 });
        }

        let e_cblp = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_cp = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_crlc = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_cparhdr = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_minalloc = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_maxalloc = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_ss = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_sp = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_csum = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_ip = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_cs = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_lfarlc = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_ovno = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let mut e_res = [0u16; 4];
        for slot in e_res.iter_mut() {
            *slot = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        }
        let e_oemid = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let e_oeminfo = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        let mut e_res2 = [0u16; 10];
        for slot in e_res2.iter_mut() {
            *slot = reader.read_u16::<LittleEndian>().ctx("DOS header")?;
        }
        let e_lfanew = reader.read_u32::<LittleEndian>().ctx("DOS header")?;

        Ok(DosHeader {
            e_magic,
            e_cblp,
            e_cp,
            e_crlc,
            e_cparhdr,
            e_minalloc,
            e_maxalloc,
            e_ss,
            e_sp,
            e_csum,
            e_ip,
            e_cs,
            e_lfarlc,
            e_ovno,
            e_res,
            e_oemid,
            e_oeminfo,
            e_res2,
            e_lfanew,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_be_u16(writer, self.e_magic)?;
        writer.write_u16::<LittleEndian>(self.e_cblp)?;
        writer.write_u16::<LittleEndian>(self.e_cp)?;
        writer.write_u16::<LittleEndian>(self.e_crlc)?;
        writer.write_u16::<LittleEndian>(self.e_cparhdr)?;
        writer.write_u16::<LittleEndian>(self.e_minalloc)?;
        writer.write_u16::<LittleEndian>(self.e_maxalloc)?;
        writer.write_u16::<LittleEndian>(self.e_ss)?;
        writer.write_u16::<LittleEndian>(self.e_sp)?;
        writer.write_u16::<LittleEndian>(self.e_csum)?;
        writer.write_u16::<LittleEndian>(self.e_ip)?;
        writer.write_u16::<LittleEndian>(self.e_cs)?;
        writer.write_u16::<LittleEndian>(self.e_lfarlc)?;
        writer.write_u16::<LittleEndian>(self.e_ovno)?;
        for slot in self.e_res {
            writer.write_u16::<LittleEndian>(slot)?;
        }
        writer.write_u16::<LittleEndian>(self.e_oemid)?;
        writer.write_u16::<LittleEndian>(self.e_oeminfo)?;
        for slot in self.e_res2 {
            writer.write_u16::<LittleEndian>(slot)?;
        }
        writer.write_u32::<LittleEndian>(self.e_lfanew)?;
        Ok(())
    }

    /// A minimal, canonical DOS header/stub pair for freshly-built images:
    /// `e_lfanew` points immediately past the 64-byte header (no stub
    /// bytes), which `Image::new` overwrites once the stub is attached.
    pub fn new_minimal() -> DosHeader {
        DosHeader {
            e_magic: IMAGE_DOS_SIGNATURE,
            e_cblp: 0x90,
            e_cp: 3,
            e_crlc: 0,
            e_cparhdr: 4,
            e_minalloc: 0,
            e_maxalloc: 0xFFFF,
            e_ss: 0,
            e_sp: 0xB8,
            e_csum: 0,
            e_ip: 0,
            e_cs: 0,
            e_lfarlc: 0x40,
            e_ovno: 0,
            e_res: [0; 4],
            e_oemid: 0,
            e_oeminfo: 0,
            e_res2: [0; 10],
            e_lfanew: DOS_HEADER_SIZE as u32,
        }
    }
}

/// The canonical 14 `"This program cannot be run in DOS mode"` stub
/// program most linkers emit after the DOS header. Used by
/// `Image::new` as a default stub; preserved verbatim on parse/emit for
/// existing images regardless of content.
pub const DEFAULT_DOS_STUB: &[u8] = &[
    0x0e, 0x1f, 0xba, 0x0e, 0x00, 0xb4, 0x09, 0xcd, 0x21, 0xb8, 0x01, 0x4c, 0xcd, 0x21, 0x54, 0x68,
    0x69, 0x73, 0x20, 0x70, 0x72, 0x6f, 0x67, 0x72, 0x61, 0x6d, 0x20, 0x63, 0x61, 0x6e, 0x6e, 0x6f,
    0x74, 0x20, 0x62, 0x65, 0x20, 0x72, 0x75, 0x6e, 0x20, 0x69, 0x6e, 0x20, 0x44, 0x4f, 0x53, 0x20,
    0x6d, 0x6f, 0x64, 0x65, 0x2e, 0x0d, 0x0d, 0x0a, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
