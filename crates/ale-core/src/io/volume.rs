use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array3;

use crate::error::{AleError, Result};
use crate::template::Affine;

const VOLUME_MAGIC: &[u8; 4] = b"ALEV";
const VOLUME_VERSION: u16 = 1;

/// Write a volume to `path`: magic, version, shape, 4x4 affine, then the
/// f64 payload little-endian in index order.
///
/// The data is written to `<path>.tmp` and renamed into place, so a
/// crash mid-write never leaves a readable file at the final name;
/// existence of the final name is the completion signal callers rely on.
pub fn write_volume(path: &Path, volume: &Array3<f64>, affine: &Affine) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let mut w = BufWriter::new(file);

        w.write_all(VOLUME_MAGIC)?;
        w.write_u16::<LittleEndian>(VOLUME_VERSION)?;
        let (sx, sy, sz) = volume.dim();
        w.write_u32::<LittleEndian>(sx as u32)?;
        w.write_u32::<LittleEndian>(sy as u32)?;
        w.write_u32::<LittleEndian>(sz as u32)?;
        for row in affine {
            for &v in row {
                w.write_f64::<LittleEndian>(v)?;
            }
        }
        for &v in volume.iter() {
            w.write_f64::<LittleEndian>(v)?;
        }
        w.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a volume written by [`write_volume`], bit-for-bit.
pub fn read_volume(path: &Path) -> Result<(Array3<f64>, Affine)> {
    let file = File::open(path)?;
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != VOLUME_MAGIC {
        return Err(AleError::InvalidVolume(format!(
            "{}: missing ALEV magic",
            path.display()
        )));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != VOLUME_VERSION {
        return Err(AleError::InvalidVolume(format!(
            "{}: unsupported version {version}",
            path.display()
        )));
    }

    let sx = r.read_u32::<LittleEndian>()? as usize;
    let sy = r.read_u32::<LittleEndian>()? as usize;
    let sz = r.read_u32::<LittleEndian>()? as usize;

    let mut affine: Affine = [[0.0; 4]; 4];
    for row in &mut affine {
        for v in row.iter_mut() {
            *v = r.read_f64::<LittleEndian>()?;
        }
    }

    let count = sx
        .checked_mul(sy)
        .and_then(|v| v.checked_mul(sz))
        .ok_or_else(|| AleError::InvalidVolume(format!("{}: shape overflow", path.display())))?;
    let mut data = Vec::with_capacity(count);
    for _ in 0..count {
        data.push(r.read_f64::<LittleEndian>()?);
    }

    let volume = Array3::from_shape_vec((sx, sy, sz), data)
        .map_err(|e| AleError::InvalidVolume(format!("{}: {e}", path.display())))?;
    Ok((volume, affine))
}

/// Write a table (rows of f64, possibly ragged) with the same temp-file
/// and rename discipline as volumes. Used for null-distribution vectors.
pub fn write_table(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let mut w = BufWriter::new(file);

        w.write_all(VOLUME_MAGIC)?;
        w.write_u16::<LittleEndian>(VOLUME_VERSION)?;
        w.write_u32::<LittleEndian>(rows.len() as u32)?;
        for row in rows {
            w.write_u64::<LittleEndian>(row.len() as u64)?;
            for &v in row {
                w.write_f64::<LittleEndian>(v)?;
            }
        }
        w.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a table written by [`write_table`].
pub fn read_table(path: &Path) -> Result<Vec<Vec<f64>>> {
    let file = File::open(path)?;
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != VOLUME_MAGIC {
        return Err(AleError::InvalidVolume(format!(
            "{}: missing ALEV magic",
            path.display()
        )));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != VOLUME_VERSION {
        return Err(AleError::InvalidVolume(format!(
            "{}: unsupported version {version}",
            path.display()
        )));
    }

    let n_rows = r.read_u32::<LittleEndian>()? as usize;
    let mut rows = Vec::with_capacity(n_rows);
    for _ in 0..n_rows {
        let len = r.read_u64::<LittleEndian>()? as usize;
        let mut row = Vec::with_capacity(len);
        for _ in 0..len {
            row.push(r.read_f64::<LittleEndian>()?);
        }
        rows.push(row);
    }
    Ok(rows)
}
