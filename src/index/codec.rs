//! `index.bin` layout: magic `GQIX`, format version (u32), dimension (u32),
//! vector count (u64), then `count * dimension` f32 values. All little-endian.

use std::io::{Read, Write};

use super::{FlatL2Index, IndexError};

pub const MAGIC: [u8; 4] = *b"GQIX";
pub const FORMAT_VERSION: u32 = 1;

#[inline]
pub fn write_index<W: Write>(index: &FlatL2Index, w: &mut W) -> Result<(), IndexError> {
    w.write_all(&MAGIC)?;
    w.write_all(&FORMAT_VERSION.to_le_bytes())?;

    let dimension = u32::try_from(index.dimension()).map_err(|_| IndexError::Oversized {
        count: index.len() as u64,
        dimension: u32::MAX,
    })?;
    w.write_all(&dimension.to_le_bytes())?;
    w.write_all(&(index.len() as u64).to_le_bytes())?;

    for value in index.as_flat() {
        w.write_all(&value.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

#[inline]
pub fn encode_index(index: &FlatL2Index) -> Result<Vec<u8>, IndexError> {
    let mut bytes = Vec::with_capacity(20 + index.as_flat().len() * 4);
    write_index(index, &mut bytes)?;
    Ok(bytes)
}

#[inline]
pub fn read_index<R: Read>(r: &mut R) -> Result<FlatL2Index, IndexError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IndexError::BadMagic(magic));
    }

    let version = read_u32(r)?;
    if version != FORMAT_VERSION {
        return Err(IndexError::UnsupportedVersion(version));
    }

    let dimension = read_u32(r)?;
    let count = read_u64(r)?;
    let values = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(dimension as usize))
        .filter(|values| values.checked_mul(4).is_some())
        .ok_or(IndexError::Oversized { count, dimension })?;

    // Header counts are untrusted; grow the buffer only as bytes arrive
    let expected_bytes = values * 4;
    let mut raw = Vec::new();
    r.by_ref().take(expected_bytes as u64).read_to_end(&mut raw)?;
    if raw.len() != expected_bytes {
        return Err(IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "index body truncated: {} of {} bytes",
                raw.len(),
                expected_bytes
            ),
        )));
    }

    let mut probe = [0u8; 1];
    if r.read(&mut probe)? != 0 {
        return Err(IndexError::TrailingBytes(count as usize));
    }

    let data = raw
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect();

    FlatL2Index::from_flat(dimension as usize, data)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, IndexError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, IndexError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
