use super::super::error::{Error, Result};
use super::super::file_header::FileCharacteristics;
use super::super::rva::{self, section_for_rva};
use super::super::section::Section;

pub const EXPORT_DIRECTORY_HEADER_SIZE: u64 = 40;

/// A single logical exported symbol, reconstructed from the address,
/// name-pointer, and ordinal tables (C8 Exports).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSymbol {
    pub ordinal: u32,
    pub rva: u32,
    pub name: String,
    pub is_forward: bool,
    pub reference_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDirectory {
    pub characteristics: u32,
    pub timestamp_unix_seconds: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub name: String,
    pub ordinal_base: u32,
    pub symbols: Vec<ExportedSymbol>,
}

impl ExportDirectory {
    pub fn parse(
        sections: &[Section],
        file_characteristics: &FileCharacteristics,
        directory_rva: u32,
        directory_size: u32,
    ) -> Result<ExportDirectory> {
        let (section, offset) = rva::resolve(sections, directory_rva)?;
        let header = section
            .raw_data
            .get(offset..offset + EXPORT_DIRECTORY_HEADER_SIZE as usize)
            .ok_or(Error::RvaOutOfRange { rva: directory_rva })?;

        let read_u32 = |at: usize| u32::from_le_bytes(header[at..at + 4].try_into().unwrap());
        let read_u16 = |at: usize| u16::from_le_bytes(header[at..at + 2].try_into().unwrap());

        let characteristics = read_u32(0);
        let timestamp_unix_seconds = read_u32(4);
        let major_version = read_u16(8);
        let minor_version = read_u16(10);
        let name_rva = read_u32(12);
        let ordinal_base = read_u32(16);
        let number_of_functions = read_u32(20);
        let number_of_names = read_u32(24);
        let address_table_rva = read_u32(28);
        let name_pointer_table_rva = read_u32(32);
        let ordinal_table_rva = read_u32(36);

        let name = rva::read_ascii_string_at(section, name_rva).unwrap_or_default();

        let export_range = directory_rva..directory_rva.saturating_add(directory_size);

        let mut symbols = Vec::with_capacity(number_of_names as usize);
        for i in 0..number_of_names {
            let name_ptr_rva = name_pointer_table_rva + i * 4;
            let ordinal_rva = ordinal_table_rva + i * 2;

            let (name_section, _) = rva::resolve(sections, name_ptr_rva)?;
            let symbol_name_rva = rva::read_u32_at(name_section, name_ptr_rva, file_characteristics)?;
            let symbol_name = rva::read_ascii_string_at(
                section_for_rva(sections, symbol_name_rva)
                    .ok_or(Error::RvaOutOfRange { rva: symbol_name_rva })?,
                symbol_name_rva,
            )
            .unwrap_or_default();

            let (ordinal_section, _) = rva::resolve(sections, ordinal_rva)?;
            let ordinal_index =
                rva::read_u16_at(ordinal_section, ordinal_rva, file_characteristics)? as u32;

            if ordinal_index >= number_of_functions {
                continue;
            }

            let address_rva = address_table_rva + ordinal_index * 4;
            let (address_section, _) = rva::resolve(sections, address_rva)?;
            let symbol_rva = rva::read_u32_at(address_section, address_rva, file_characteristics)?;

            let (is_forward, reference_name) = if export_range.contains(&symbol_rva) {
                let reference = rva::read_ascii_string_at(section, symbol_rva).unwrap_or_default();
                (true, Some(reference))
            } else {
                (false, None)
            };

            symbols.push(ExportedSymbol {
                ordinal: ordinal_index + ordinal_base,
                rva: symbol_rva,
                name: symbol_name,
                is_forward,
                reference_name,
            });
        }

        Ok(ExportDirectory {
            characteristics,
            timestamp_unix_seconds,
            major_version,
            minor_version,
            name,
            ordinal_base,
            symbols,
        })
    }

    /// Lays out a complete `.edata` section body for `self`'s symbols:
    /// header, then Export Address Table / Name Pointer Table / Ordinal
    /// Table, then strings, per C8's build algorithm. `section_rva` is
    /// the virtual address the caller has assigned to the new section,
    /// so name-pointer/forward-reference RVAs can be computed up front.
    pub fn build(&self, section_rva: u32) -> Vec<u8> {
        let ordered: Vec<&ExportedSymbol> = {
            let mut named: Vec<&ExportedSymbol> = self.symbols.iter().collect();
            named.sort_by(|a, b| a.name.cmp(&b.name));
            named
        };
        let n = ordered.len() as u32;

        let eat_offset = EXPORT_DIRECTORY_HEADER_SIZE as u32;
        let name_ptr_offset = eat_offset + 4 * n;
        let ordinal_offset = name_ptr_offset + 4 * n;
        let strings_offset = ordinal_offset + 2 * n;

        let image_name_offset = strings_offset;
        let mut cursor = image_name_offset + self.name.len() as u32 + 1;
        let mut name_offsets = Vec::with_capacity(ordered.len());
        let mut reference_offsets = Vec::with_capacity(ordered.len());
        for symbol in &ordered {
            name_offsets.push(cursor);
            cursor += symbol.name.len() as u32 + 1;
        }
        for symbol in &ordered {
            if let Some(reference) = &symbol.reference_name {
                reference_offsets.push(Some(cursor));
                cursor += reference.len() as u32 + 1;
            } else {
                reference_offsets.push(None);
            }
        }

        let mut body = vec![0u8; cursor as usize];

        let min_ordinal = ordered.iter().map(|s| s.ordinal).min().unwrap_or(self.ordinal_base);
        let max_ordinal = ordered.iter().map(|s| s.ordinal).max().unwrap_or(self.ordinal_base);
        let function_count = if ordered.is_empty() { 0 } else { max_ordinal - min_ordinal + 1 };

        body[0..4].copy_from_slice(&self.characteristics.to_le_bytes());
        body[4..8].copy_from_slice(&self.timestamp_unix_seconds.to_le_bytes());
        body[8..10].copy_from_slice(&self.major_version.to_le_bytes());
        body[10..12].copy_from_slice(&self.minor_version.to_le_bytes());
        body[12..16].copy_from_slice(&(section_rva + image_name_offset).to_le_bytes());
        body[16..20].copy_from_slice(&min_ordinal.to_le_bytes());
        body[20..24].copy_from_slice(&function_count.to_le_bytes());
        body[24..28].copy_from_slice(&n.to_le_bytes());
        body[28..32].copy_from_slice(&(section_rva + eat_offset).to_le_bytes());
        body[32..36].copy_from_slice(&(section_rva + name_ptr_offset).to_le_bytes());
        body[36..40].copy_from_slice(&(section_rva + ordinal_offset).to_le_bytes());

        for (i, symbol) in ordered.iter().enumerate() {
            let unbiased_ordinal = symbol.ordinal - min_ordinal;
            let eat_pos = (eat_offset + 4 * unbiased_ordinal) as usize;
            let eat_value = match &reference_offsets[i] {
                Some(offset) => section_rva + *offset,
                None => symbol.rva,
            };
            body[eat_pos..eat_pos + 4].copy_from_slice(&eat_value.to_le_bytes());

            let name_ptr_pos = (name_ptr_offset + 4 * i as u32) as usize;
            body[name_ptr_pos..name_ptr_pos + 4]
                .copy_from_slice(&(section_rva + name_offsets[i]).to_le_bytes());

            let ordinal_pos = (ordinal_offset + 2 * i as u32) as usize;
            body[ordinal_pos..ordinal_pos + 2].copy_from_slice(&(unbiased_ordinal as u16).to_le_bytes());
        }

        let image_name_pos = image_name_offset as usize;
        body[image_name_pos..image_name_pos + self.name.len()].copy_from_slice(self.name.as_bytes());
        body[image_name_pos + self.name.len()] = 0;

        for (i, symbol) in ordered.iter().enumerate() {
            let pos = name_offsets[i] as usize;
            body[pos..pos + symbol.name.len()].copy_from_slice(symbol.name.as_bytes());
            body[pos + symbol.name.len()] = 0;
        }
        for (i, symbol) in ordered.iter().enumerate() {
            if let (Some(reference), Some(pos)) = (&symbol.reference_name, reference_offsets[i]) {
                let pos = pos as usize;
                body[pos..pos + reference.len()].copy_from_slice(reference.as_bytes());
                body[pos + reference.len()] = 0;
            }
        }

        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_lays_out_tables_before_strings() {
        let directory = ExportDirectory {
            characteristics: 0,
            timestamp_unix_seconds: 0,
            major_version: 0,
            minor_version: 0,
            name: "mylib.dll".to_string(),
            ordinal_base: 1,
            symbols: vec![
                ExportedSymbol {
                    ordinal: 1,
                    rva: 0x1000,
                    name: "Alpha".to_string(),
                    is_forward: false,
                    reference_name: None,
                },
                ExportedSymbol {
                    ordinal: 2,
                    rva: 0,
                    name: "Beta".to_string(),
                    is_forward: true,
                    reference_name: Some("KERNEL32.HeapAlloc".to_string()),
                },
            ],
        };

        let body = directory.build(0x3000);
        assert!(body.len() > EXPORT_DIRECTORY_HEADER_SIZE as usize);
        let num_functions = u32::from_le_bytes(body[24..28].try_into().unwrap());
        assert_eq!(num_functions, 2);
    }
}
