use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::error::{IoContext, Result};
use super::strings::StringTable;

pub const SYMBOL_SIZE: u64 = 18;
pub const AUX_RECORD_SIZE: usize = 18;

pub const SECTION_NUMBER_UNDEFINED: i16 = 0;
pub const SECTION_NUMBER_ABSOLUTE: i16 = -1;
pub const SECTION_NUMBER_DEBUG: i16 = -2;

/// The first 8 bytes of a symbol record: either the name inline (NUL
/// padded, when the first 4 bytes are non-zero) or a string-table
/// offset (when they're all zero).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolName {
    Inline(String),
    Offset(u32),
}

/// 18-byte COFF symbol record plus its auxiliary follow-on records (C5).
/// The symbol table is owned exclusively by the image; `resolve_name`
/// takes the string table as an explicit parameter rather than holding
/// a back-reference, per the Design Notes' preference for passing the
/// owning collection in over threading a pointer back to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: SymbolName,
    pub value: u32,
    pub section_number: i16,
    pub symbol_type: u16,
    pub storage_class: u8,
    pub aux_records: Vec<[u8; AUX_RECORD_SIZE]>,
}

impl Symbol {
    pub fn read<R: Read>(reader: &mut R) -> Result<Symbol> {
        let mut name_field = [0u8; 8];
        reader.read_exact(&mut name_field).ctx("symbol name field")?;

        let name = if name_field[0..4] != [0, 0, 0, 0] {
            let end = name_field.iter().position(|&b| b == 0).unwrap_or(8);
            SymbolName::Inline(String::from_utf8_lossy(&name_field[..end]).into_owned())
        } else {
            let offset = u32::from_le_bytes(name_field[4..8].try_into().unwrap());
            SymbolName::Offset(offset)
        };

        let value = reader.read_u32::<LittleEndian>().ctx("symbol record")?;
        let section_number = reader.read_i16::<LittleEndian>().ctx("symbol record")?;
        let symbol_type = reader.read_u16::<LittleEndian>().ctx("symbol record")?;
        let storage_class = reader.read_u8().ctx("symbol record")?;
        let aux_count = reader.read_u8().ctx("symbol record")?;

        let mut aux_records = Vec::with_capacity(aux_count as usize);
        for _ in 0..aux_count {
            let mut record = [0u8; AUX_RECORD_SIZE];
            reader.read_exact(&mut record).ctx("auxiliary symbol record")?;
            aux_records.push(record);
        }

        Ok(Symbol { name, value, section_number, symbol_type, storage_class, aux_records })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        match &self.name {
            SymbolName::Inline(name) => {
                let mut field = [0u8; 8];
                let bytes = name.as_bytes();
                field[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
                writer.write_all(&field)?;
            }
            SymbolName::Offset(offset) => {
                writer.write_u32::<LittleEndian>(0)?;
                writer.write_u32::<LittleEndian>(*offset)?;
            }
        }
        writer.write_u32::<LittleEndian>(self.value)?;
        writer.write_i16::<LittleEndian>(self.section_number)?;
        writer.write_u16::<LittleEndian>(self.symbol_type)?;
        writer.write_u8(self.storage_class)?;
        writer.write_u8(self.aux_records.len() as u8)?;
        for record in &self.aux_records {
            writer.write_all(record)?;
        }
        Ok(())
    }

    /// Record count this symbol contributes towards
    /// `FileHeader::sym_count`: itself plus each auxiliary record.
    pub fn record_count(&self) -> u32 {
        1 + self.aux_records.len() as u32
    }

    pub fn aux_count(&self) -> u8 {
        self.aux_records.len() as u8
    }

    /// Resolves the symbol's display name, following a string-table
    /// offset if the name isn't stored inline.
    pub fn resolve_name<'a>(&'a self, string_table: &'a StringTable) -> Option<&'a str> {
        match &self.name {
            SymbolName::Inline(name) => Some(name.as_str()),
            SymbolName::Offset(offset) => string_table.get(*offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn inline_name_round_trips() {
        let symbol = Symbol {
            name: SymbolName::Inline(".text".to_string()),
            value: 0,
            section_number: 1,
            symbol_type: 0,
            storage_class: 3,
            aux_records: vec![[0u8; AUX_RECORD_SIZE]],
        };

        let mut buf = Vec::new();
        symbol.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, SYMBOL_SIZE + AUX_RECORD_SIZE as u64);

        let mut cursor = Cursor::new(buf);
        let parsed = Symbol::read(&mut cursor).unwrap();
        assert_eq!(parsed, symbol);
        assert_eq!(parsed.record_count(), 2);
    }

    #[test]
    fn offset_name_resolves_against_string_table() {
        let mut strings = StringTable::new();
        let offset = strings.add("a_long_external_symbol_name");

        let symbol = Symbol {
            name: SymbolName::Offset(offset),
            value: 0x10,
            section_number: SECTION_NUMBER_UNDEFINED,
            symbol_type: 0,
            storage_class: 2,
            aux_records: Vec::new(),
        };

        let mut buf = Vec::new();
        symbol.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        let parsed = Symbol::read(&mut cursor).unwrap();
        assert_eq!(parsed.resolve_name(&strings), Some("a_long_external_symbol_name"));
    }
}
