// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::io::Write;
use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use crate::cartogram::MeshKind;
use crate::core::Lattice;
use crate::error::{CartogramError, Result};
use crate::geometry::{Point, Polygon};

/// Supported array file formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// MATLAB .mat format (Level 5).
    Mat,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(CartogramError::UnsupportedFileFormat(ext.to_string())),
        None => Err(CartogramError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

fn points_from_rows(data: Vec<f64>) -> Vec<Point> {
    data.chunks_exact(2)
        .map(|xy| Point::new(xy[0], xy[1]))
        .collect()
}

/// Load an `[n, 2]` point array from a .npy file (f64, or f32 promoted).
pub fn load_npy_points(path: &Path) -> Result<Vec<Point>> {
    let arr: ArrayD<f64> = match ndarray_npy::read_npy(path) {
        Ok(a) => a,
        Err(_) => {
            let arr32: ArrayD<f32> = ndarray_npy::read_npy(path)
                .map_err(|e| CartogramError::UnsupportedDtype(format!("{}", e)))?;
            arr32.mapv(|v| v as f64)
        }
    };

    let shape = arr.shape().to_vec();
    if shape.len() != 2 || shape[1] != 2 {
        return Err(CartogramError::ShapeMismatch {
            expected: vec![shape.first().copied().unwrap_or(0), 2],
            got: shape,
        });
    }

    // Fortran-order files must be brought to row-major before flattening.
    Ok(points_from_rows(
        arr.as_standard_layout().to_owned().into_raw_vec(),
    ))
}

/// Load a point array stored as `[n, 2]` or `[2, n]` in a .mat file.
pub fn load_mat_points(path: &Path, variable_name: &str) -> Result<Vec<Point>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| CartogramError::Other(format!("MAT parse error: {}", e)))?;

    let available: Vec<String> = mat.arrays().iter().map(|a| a.name().to_string()).collect();
    let array =
        mat.find_by_name(variable_name)
            .ok_or_else(|| CartogramError::MatVariableNotFound {
                expected: variable_name.to_string(),
                available,
            })?;

    let data: Vec<f64> = match array.data() {
        matfile::NumericData::Double { real, imag: _ } => real.clone(),
        matfile::NumericData::Single { real, imag: _ } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(CartogramError::UnsupportedDtype(
                "MAT file array is not f64 or f32".to_string(),
            ))
        }
    };

    let mat_shape: Vec<usize> = array.size().to_vec();
    let (rows, cols) = match mat_shape.as_slice() {
        &[r, c] if r * c == data.len() => (r, c),
        _ => {
            return Err(CartogramError::ShapeMismatch {
                expected: vec![data.len() / 2, 2],
                got: mat_shape,
            })
        }
    };

    // Column-major storage; a [2, n] array holds one point per column.
    let arr = ArrayD::from_shape_vec(IxDyn(&[rows, cols]).f(), data)
        .map_err(|e| CartogramError::Other(format!("shape error: {}", e)))?;
    let rows_of_points = if cols == 2 {
        arr
    } else if rows == 2 {
        arr.reversed_axes()
    } else {
        return Err(CartogramError::ShapeMismatch {
            expected: vec![rows, 2],
            got: mat_shape,
        });
    };

    Ok(points_from_rows(
        rows_of_points.as_standard_layout().to_owned().into_raw_vec(),
    ))
}

/// Load a point array, inferring the format from the extension.
/// `variable_name` selects the array inside .mat files.
pub fn load_points(path: &Path, variable_name: &str) -> Result<Vec<Point>> {
    match infer_format(path)? {
        FileFormat::Npy => load_npy_points(path),
        FileFormat::Mat => load_mat_points(path, variable_name),
    }
}

/// Save points as an `[n, 2]` array.
pub fn save_points(points: &[Point], path: &Path, variable_name: &str) -> Result<()> {
    let data: Vec<f64> = points.iter().flat_map(|p| [p.x, p.y]).collect();
    save_array(&[points.len(), 2], data, path, variable_name)
}

/// Save a lattice's source or deformed node positions as a
/// `[height, width, 2]` array.
pub fn save_lattice(lattice: &Lattice, kind: MeshKind, path: &Path) -> Result<()> {
    let data: Vec<f64> = lattice
        .nodes()
        .iter()
        .flat_map(|node| {
            let p = match kind {
                MeshKind::Source => node.source,
                MeshKind::Deformed => node.deformed,
            };
            [p.x, p.y]
        })
        .collect();
    let name = kind.to_string();
    save_array(&[lattice.height(), lattice.width(), 2], data, path, &name)
}

/// Save quadrilateral mesh cells as a `[cells, 5, 2]` array of closed rings.
pub fn save_mesh(cells: &[Polygon], path: &Path) -> Result<()> {
    let mut data = Vec::with_capacity(cells.len() * 10);
    for cell in cells {
        let ring = cell.exterior().map(Vec::as_slice).unwrap_or(&[]);
        if ring.len() != 5 {
            return Err(CartogramError::ShapeMismatch {
                expected: vec![5, 2],
                got: vec![ring.len(), 2],
            });
        }
        data.extend(ring.iter().flat_map(|p| [p.x, p.y]));
    }
    save_array(&[cells.len(), 5, 2], data, path, "mesh")
}

fn save_array(shape: &[usize], data: Vec<f64>, path: &Path, variable_name: &str) -> Result<()> {
    let arr = ArrayD::from_shape_vec(IxDyn(shape), data)
        .map_err(|e| CartogramError::Other(format!("shape error: {}", e)))?;
    match infer_format(path)? {
        FileFormat::Npy => ndarray_npy::write_npy(path, &arr)
            .map_err(|e| CartogramError::Other(format!("npy write error: {}", e))),
        FileFormat::Mat => {
            // MATLAB wants column-major data with the dimensions in array order.
            let col_major = arr.t().as_standard_layout().to_owned().into_raw_vec();
            write_mat_level5(path, variable_name, shape, &col_major)
        }
    }
}

const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;

/// Append a tagged data element, zero-padded to an 8-byte boundary.
fn push_element(buf: &mut Vec<u8>, data_type: u32, payload: &[u8]) {
    buf.extend_from_slice(&data_type.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    let pad = payload.len().next_multiple_of(8) - payload.len();
    buf.extend(std::iter::repeat(0u8).take(pad));
}

/// Minimal MAT-file Level 5 writer for a single real f64 array.
///
/// The `matfile` crate only reads, so this writes the 128-byte header and one
/// uncompressed miMATRIX element (flags, dimensions, name, real part).
/// `data` must already be in column-major order.
fn write_mat_level5(path: &Path, var_name: &str, dimensions: &[usize], data: &[f64]) -> Result<()> {
    let mut header = [b' '; 128];
    let desc = b"MATLAB 5.0 MAT-file, created by distcarto";
    header[..desc.len()].copy_from_slice(desc);
    header[116..124].fill(0);
    header[124..126].copy_from_slice(&0x0100u16.to_le_bytes());
    header[126..128].copy_from_slice(b"IM");

    let mut body = Vec::with_capacity(64 + data.len() * 8);
    let flags: Vec<u8> = [MX_DOUBLE_CLASS, 0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    push_element(&mut body, MI_UINT32, &flags);
    let dims: Vec<u8> = dimensions
        .iter()
        .flat_map(|&d| (d as i32).to_le_bytes())
        .collect();
    push_element(&mut body, MI_INT32, &dims);
    push_element(&mut body, MI_INT8, var_name.as_bytes());
    let real: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
    push_element(&mut body, MI_DOUBLE, &real);

    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);
    w.write_all(&header)?;
    w.write_all(&MI_MATRIX.to_le_bytes())?;
    w.write_all(&(body.len() as u32).to_le_bytes())?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}
