use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::error::{IoContext, Result};

/// A seekable random-access byte stream. The codec never requires more
/// than `Read + Write + Seek`; callers may pass a `File`, a
/// `Cursor<Vec<u8>>`, or any other type implementing these.
pub trait Stream: Read + Write + Seek {}
impl<T: Read + Write + Seek> Stream for T {}

/// Rounds `v` up to the next multiple of `a`. `a == 0` or `v` already a
/// multiple of `a` returns `v` unchanged.
pub fn align_up(v: u64, a: u64) -> u64 {
    if a == 0 || v % a == 0 {
        v
    } else {
        v - (v % a) + a
    }
}

/// Reads a fixed-length ASCII field, stopping at the first NUL (fields are
/// NUL-padded, not NUL-terminated — a full-length field with no NUL is
/// valid, e.g. an 8-byte section name that uses every byte).
pub fn read_fixed_ascii<R: Read>(reader: &mut R, len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).ctx("fixed-length ASCII field")?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// Writes `s` into a `len`-byte field, NUL-padding the remainder. Returns
/// `Err` via the caller's own validation if `s` is too long to fit —
/// this function truncates silently is not used; callers validate length
/// first (see `Section::set_name`).
pub fn write_fixed_ascii<W: Write>(writer: &mut W, s: &str, len: usize) -> Result<()> {
    let mut bytes = vec![0u8; len];
    let src = s.as_bytes();
    bytes[..src.len().min(len)].copy_from_slice(&src[..src.len().min(len)]);
    writer.write_all(&bytes).map_err(Into::into)
}

/// Reads a NUL-terminated ASCII string, consuming the terminator.
pub fn read_cstring_ascii<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = reader.read_u8().ctx("null-terminated ASCII string")?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads a NUL-terminated UTF-16LE string, consuming the terminator.
pub fn read_cstring_utf16<R: Read>(reader: &mut R) -> Result<String> {
    let mut units = Vec::new();
    loop {
        let u = reader.read_u16::<LittleEndian>().ctx("null-terminated UTF-16 string")?;
        if u == 0 {
            break;
        }
        units.push(u);
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Writes `s` as ASCII followed by a single NUL terminator.
pub fn write_cstring_ascii<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    writer.write_all(s.as_bytes())?;
    writer.write_u8(0)?;
    Ok(())
}

/// The DOS signature (`e_magic`) and the PE signature are stored
/// big-endian on disk despite every other field in the format being
/// little-endian; these two helpers keep that one reversal out of the
/// call sites that otherwise read/write LE throughout.
pub fn read_be_u16<R: Read>(reader: &mut R) -> Result<u16> {
    reader.read_u16::<BigEndian>().map_err(Into::into)
}

pub fn write_be_u16<W: Write>(writer: &mut W, value: u16) -> Result<()> {
    writer.write_u16::<BigEndian>(value).map_err(Into::into)
}

pub fn read_be_u32<R: Read>(reader: &mut R) -> Result<u32> {
    reader.read_u32::<BigEndian>().map_err(Into::into)
}

pub fn write_be_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_u32::<BigEndian>(value).map_err(Into::into)
}

/// Current stream position, as `u64`.
pub fn position<S: Seek>(stream: &mut S) -> Result<u64> {
    stream.seek(SeekFrom::Current(0)).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 512), 0);
        assert_eq!(align_up(1, 512), 512);
        assert_eq!(align_up(512, 512), 512);
        assert_eq!(align_up(513, 512), 1024);
        assert_eq!(align_up(123, 0), 123);
    }

    #[test]
    fn fixed_ascii_round_trips_full_length_field() {
        let mut buf = Vec::new();
        write_fixed_ascii(&mut buf, ".text", 8).unwrap();
        assert_eq!(buf, b".text\0\0\0");

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_fixed_ascii(&mut cursor, 8).unwrap(), ".text");
    }

    #[test]
    fn fixed_ascii_with_no_trailing_nul() {
        let mut buf = Vec::new();
        write_fixed_ascii(&mut buf, "abcdefgh", 8).unwrap();
        assert_eq!(buf, b"abcdefgh");
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_fixed_ascii(&mut cursor, 8).unwrap(), "abcdefgh");
    }

    #[test]
    fn cstring_ascii_round_trip() {
        let mut buf = Vec::new();
        write_cstring_ascii(&mut buf, "KERNEL32.dll").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_cstring_ascii(&mut cursor).unwrap(), "KERNEL32.dll");
    }
}
