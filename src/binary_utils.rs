//! Little-endian primitives and fixed-layout record marshaling.
//!
//! Every multi-byte value in the image is little-endian. A record is an
//! ordered list of named fixed-width fields packed and unpacked
//! explicitly; nothing here depends on host memory layout.

use std::io::{self, Cursor, Read};

pub fn read_u8(cursor: &mut Cursor<&[u8]>) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_u16_le(cursor: &mut Cursor<&[u8]>) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Write `value` at `pos`; a write that would run past the end of the
/// buffer is dropped.
pub fn write_u32(data: &mut [u8], value: u32, pos: usize) {
    if pos + 4 <= data.len() {
        data[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// One field of a fixed-layout record: a name for diagnostics plus a byte
/// width of 1, 2 or 4.
#[derive(Debug, Clone, Copy)]
pub struct RecordField {
    pub name: &'static str,
    pub width: usize,
}

pub const fn field(name: &'static str, width: usize) -> RecordField {
    RecordField { name, width }
}

pub fn record_width(fields: &[RecordField]) -> usize {
    fields.iter().map(|f| f.width).sum()
}

/// Decode one record laid out as `fields`, widening every value to u32.
pub fn unpack_record(data: &[u8], fields: &[RecordField]) -> io::Result<Vec<u32>> {
    if data.len() < record_width(fields) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "Record needs {} bytes, got {}",
                record_width(fields),
                data.len()
            ),
        ));
    }

    let mut values = Vec::with_capacity(fields.len());
    let mut pos = 0;

    for f in fields {
        let value = match f.width {
            1 => data[pos] as u32,
            2 => u16::from_le_bytes([data[pos], data[pos + 1]]) as u32,
            4 => u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Unsupported field width {} for {:?}", other, f.name),
                ));
            }
        };
        values.push(value);
        pos += f.width;
    }

    Ok(values)
}

/// Encode one record; the inverse of [`unpack_record`] bit for bit.
pub fn pack_record(values: &[u32], fields: &[RecordField]) -> Vec<u8> {
    assert_eq!(values.len(), fields.len(), "record value count mismatch");

    let mut out = Vec::with_capacity(record_width(fields));
    for (value, f) in values.iter().zip(fields) {
        match f.width {
            1 => out.push((value & 0xFF) as u8),
            2 => out.extend_from_slice(&(*value as u16).to_le_bytes()),
            4 => out.extend_from_slice(&value.to_le_bytes()),
            other => panic!("unsupported field width {} for {:?}", other, f.name),
        }
    }
    out
}
