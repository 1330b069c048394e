//! Length-prefixed binary array files.
//!
//! The file format is fixed by the downstream analysis tools: a little-endian
//! `i32` dimension count, one `i32` per dimension, then the elements in
//! column-major order. Payloads are either `f64` or `i32`.

use crate::array::Array;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArrayIoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("array file has {0} dimensions, expected 1 to 8")]
    BadDimCount(i32),
    #[error("array file has negative dimension {0}")]
    NegativeDim(i32),
    #[error("array file truncated: expected {expected} elements, found {found}")]
    Truncated { expected: usize, found: usize },
}

fn write_header<W: Write>(w: &mut W, dims: &[usize]) -> Result<(), ArrayIoError> {
    w.write_all(&(dims.len() as i32).to_le_bytes())?;
    for &d in dims {
        w.write_all(&(d as i32).to_le_bytes())?;
    }
    Ok(())
}

fn read_header<R: Read>(r: &mut R) -> Result<Vec<usize>, ArrayIoError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    let num_dims = i32::from_le_bytes(buf);
    if !(1..=8).contains(&num_dims) {
        return Err(ArrayIoError::BadDimCount(num_dims));
    }
    let mut dims = Vec::with_capacity(num_dims as usize);
    for _ in 0..num_dims {
        r.read_exact(&mut buf)?;
        let d = i32::from_le_bytes(buf);
        if d < 0 {
            return Err(ArrayIoError::NegativeDim(d));
        }
        dims.push(d as usize);
    }
    Ok(dims)
}

/// Save an `f64` array to `path`.
pub fn save_f64(path: &Path, array: &Array<f64>) -> Result<(), ArrayIoError> {
    let mut w = BufWriter::new(File::create(path)?);
    write_header(&mut w, array.dims())?;
    for v in array.data() {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Save an `i32` array to `path`.
pub fn save_i32(path: &Path, array: &Array<i32>) -> Result<(), ArrayIoError> {
    let mut w = BufWriter::new(File::create(path)?);
    write_header(&mut w, array.dims())?;
    for v in array.data() {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Load an `f64` array from `path`.
pub fn load_f64(path: &Path) -> Result<Array<f64>, ArrayIoError> {
    let mut r = BufReader::new(File::open(path)?);
    let dims = read_header(&mut r)?;
    let n: usize = dims.iter().product();
    let mut data = Vec::with_capacity(n);
    let mut buf = [0u8; 8];
    for found in 0..n {
        if r.read_exact(&mut buf).is_err() {
            return Err(ArrayIoError::Truncated { expected: n, found });
        }
        data.push(f64::from_le_bytes(buf));
    }
    Ok(Array::from_vec(dims, data))
}

/// Load an `i32` array from `path`.
pub fn load_i32(path: &Path) -> Result<Array<i32>, ArrayIoError> {
    let mut r = BufReader::new(File::open(path)?);
    let dims = read_header(&mut r)?;
    let n: usize = dims.iter().product();
    let mut data = Vec::with_capacity(n);
    let mut buf = [0u8; 4];
    for found in 0..n {
        if r.read_exact(&mut buf).is_err() {
            return Err(ArrayIoError::Truncated { expected: n, found });
        }
        data.push(i32::from_le_bytes(buf));
    }
    Ok(Array::from_vec(dims, data))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let a = Array::from_vec(vec![2, 3], vec![0.5, -1.0, 2.25, 3.0, 4.0, 5.5]);
        save_f64(&path, &a).unwrap();
        let b = load_f64(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn i32_round_trip_3d() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.bin");
        let a = Array::from_vec(vec![2, 2, 2], (0..8).collect());
        save_i32(&path, &a).unwrap();
        let b = load_i32(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn truncated_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        let a = Array::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]);
        save_f64(&path, &a).unwrap();
        // Chop off the last element.
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();
        match load_f64(&path) {
            Err(ArrayIoError::Truncated { expected: 4, found: 3 }) => {}
            other => panic!("expected truncation error, got {other:?}"),
        }
    }
}
