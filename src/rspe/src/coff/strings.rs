use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::buffer::{read_cstring_ascii, write_cstring_ascii};
use super::error::{IoContext, Result};

/// The first string sits at offset 4 — one past the table's own 4-byte
/// size field. This is the PE-specification convention; see the open
/// question this crate resolved in favour of it (offsets relative to the
/// start of the size field, not one byte past it).
const FIRST_STRING_OFFSET: u32 = 4;

/// COFF string table (C5): an ordered mapping from byte offset to ASCII
/// string, serialized as a 4-byte inclusive size followed by
/// NUL-terminated strings packed back to back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringTable {
    entries: Vec<(u32, String)>,
}

impl StringTable {
    pub fn new() -> StringTable {
        StringTable { entries: Vec::new() }
    }

    /// Reads the 4-byte size then the packed strings it covers. A
    /// declared `size == 0` is tolerated (observed in malformed
    /// `.res`-style object files) and treated as an empty table.
    pub fn read<R: Read>(reader: &mut R) -> Result<StringTable> {
        let size = reader.read_u32::<LittleEndian>().ctx("string table size")?;
        if size < 4 {
            return Ok(StringTable::new());
        }

        let mut remaining = vec![0u8; (size - 4) as usize];
        reader.read_exact(&mut remaining).ctx("string table body")?;
        let mut cursor = std::io::Cursor::new(remaining);

        let mut entries = Vec::new();
        let mut offset = FIRST_STRING_OFFSET;
        while (cursor.position() as u32) < size - 4 {
            let s = read_cstring_ascii(&mut cursor)?;
            let len = s.len() as u32;
            entries.push((offset, s));
            offset += len + 1;
        }

        Ok(StringTable { entries })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.on_disk_size())?;
        for (_, s) in &self.entries {
            write_cstring_ascii(writer, s)?;
        }
        Ok(())
    }

    /// Total on-disk size including the 4-byte size field itself.
    pub fn on_disk_size(&self) -> u32 {
        4 + self.entries.iter().map(|(_, s)| s.len() as u32 + 1).sum::<u32>()
    }

    /// Appends `s` and returns the byte offset it was stored at. The next
    /// offset is the previous entry's offset plus its length plus one,
    /// starting from `FIRST_STRING_OFFSET` for an empty table — keeping
    /// read and write consistent with the PE-specification convention.
    pub fn add(&mut self, s: &str) -> u32 {
        let offset = self
            .entries
            .last()
            .map(|(prev_offset, prev_s)| prev_offset + prev_s.len() as u32 + 1)
            .unwrap_or(FIRST_STRING_OFFSET);
        self.entries.push((offset, s.to_string()));
        offset
    }

    pub fn remove(&mut self, offset: u32) -> Option<String> {
        let index = self.entries.iter().position(|(o, _)| *o == offset)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get(&self, offset: u32) -> Option<&str> {
        self.entries.iter().find(|(o, _)| *o == offset).map(|(_, s)| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(o, s)| (*o, s.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
