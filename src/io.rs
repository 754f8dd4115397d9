// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::io::Write;
use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use ndarray_npy::{ReadableElement, WritableElement};

use crate::core::{PhysicalPoint, VoxelGrid, VoxelValue};
use crate::error::{LaplaceError, Result};

/// MAT variable name used when saving a solution field.
pub const FIELD_VARIABLE: &str = "laplace";
/// MAT variable name used when saving a label grid.
pub const LABELS_VARIABLE: &str = "labels";

/// `None` if the file does not hold `T` elements.
fn try_read_npy<T>(path: &Path) -> Option<Result<ArrayD<i32>>>
where
    T: ReadableElement + VoxelValue,
{
    let arr = ndarray_npy::read_npy::<_, ArrayD<T>>(path).ok()?;
    let data = match to_labels(arr.iter().copied()) {
        Ok(data) => data,
        Err(e) => return Some(Err(e)),
    };
    Some(
        ArrayD::from_shape_vec(arr.raw_dim(), data)
            .map_err(|e| LaplaceError::Other(format!("shape error: {}", e))),
    )
}

/// Convert voxel values to labels, rejecting any that overflow an `i32`.
fn to_labels<T: VoxelValue>(values: impl Iterator<Item = T>) -> Result<Vec<i32>> {
    values
        .enumerate()
        .map(|(offset, v)| {
            v.to_label().ok_or_else(|| {
                LaplaceError::UnsupportedDtype(format!(
                    "value at offset {} does not fit a 32-bit label",
                    offset
                ))
            })
        })
        .collect()
}

fn into_volume(arr: ArrayD<i32>) -> Result<(Vec<i32>, [usize; 3])> {
    let shape = volume_shape(arr.shape())?;
    // Fortran-order .npy files would otherwise give column-major data.
    Ok((arr.as_standard_layout().to_owned().into_raw_vec(), shape))
}

fn volume_shape(shape: &[usize]) -> Result<[usize; 3]> {
    match shape {
        &[nx, ny, nz] => Ok([nx, ny, nz]),
        _ => Err(LaplaceError::Other(format!(
            "expected a 3D volume, got shape {:?}",
            shape
        ))),
    }
}

/// Load a segmentation or label volume from a .npy file.
///
/// Integer and floating-point arrays are accepted; floats are rounded to the
/// nearest label and `NaN` becomes 0.
pub fn load_npy_volume(path: &Path) -> Result<(Vec<i32>, [usize; 3])> {
    std::fs::metadata(path)?;
    let arr = try_read_npy::<i32>(path)
        .or_else(|| try_read_npy::<u8>(path))
        .or_else(|| try_read_npy::<i16>(path))
        .or_else(|| try_read_npy::<u16>(path))
        .or_else(|| try_read_npy::<i8>(path))
        .or_else(|| try_read_npy::<u32>(path))
        .or_else(|| try_read_npy::<i64>(path))
        .or_else(|| try_read_npy::<f64>(path))
        .or_else(|| try_read_npy::<f32>(path));
    match arr {
        Some(arr) => into_volume(arr?),
        None => {
            // Surface the reader's own message for the common type.
            let err = ndarray_npy::read_npy::<_, ArrayD<i32>>(path)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default();
            Err(LaplaceError::UnsupportedDtype(format!(
                "{}: {}",
                path.display(),
                err
            )))
        }
    }
}

/// Save a grid to a .npy file in row-major order.
pub fn save_npy<T: WritableElement + Clone>(grid: &VoxelGrid<T>, path: &Path) -> Result<()> {
    let arr = ArrayD::from_shape_vec(IxDyn(&grid.shape()), grid.data().to_vec())
        .map_err(|e| LaplaceError::Other(format!("shape error: {}", e)))?;

    ndarray_npy::write_npy(path, &arr)
        .map_err(|e| LaplaceError::Other(format!("npy write error: {}", e)))?;

    Ok(())
}

/// Load a segmentation or label volume from a .mat file.
///
/// If `variable_name` is `None` the file must hold exactly one array. The MAT
/// dimensions become the grid shape and the column-major data is re-laid out
/// in row-major order.
pub fn load_mat_volume(
    path: &Path,
    variable_name: Option<&str>,
) -> Result<(Vec<i32>, [usize; 3])> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| LaplaceError::Other(format!("MAT parse error: {}", e)))?;

    let available: Vec<String> = mat.arrays().iter().map(|a| a.name().to_string()).collect();

    let array = match variable_name {
        Some(name) => mat.find_by_name(name),
        None if mat.arrays().len() == 1 => mat.arrays().first(),
        None => None,
    }
    .ok_or_else(|| LaplaceError::MatVariableNotFound {
        expected: variable_name.unwrap_or("(single array)").to_string(),
        available,
    })?;

    let data: Vec<i32> = match array.data() {
        matfile::NumericData::Double { real, .. } => to_labels(real.iter().copied())?,
        matfile::NumericData::Single { real, .. } => to_labels(real.iter().copied())?,
        matfile::NumericData::Int8 { real, .. } => to_labels(real.iter().copied())?,
        matfile::NumericData::UInt8 { real, .. } => to_labels(real.iter().copied())?,
        matfile::NumericData::Int16 { real, .. } => to_labels(real.iter().copied())?,
        matfile::NumericData::UInt16 { real, .. } => to_labels(real.iter().copied())?,
        matfile::NumericData::Int32 { real, .. } => real.clone(),
        matfile::NumericData::UInt32 { real, .. } => to_labels(real.iter().copied())?,
        matfile::NumericData::Int64 { real, .. } => to_labels(real.iter().copied())?,
        _ => {
            return Err(LaplaceError::UnsupportedDtype(format!(
                "MAT array '{}' has an unsupported numeric class",
                array.name()
            )))
        }
    };

    let mat_shape: Vec<usize> = array.size().to_vec();
    let shape = volume_shape(&mat_shape)?;
    if data.len() != shape.iter().product::<usize>() {
        return Err(LaplaceError::ShapeMismatch {
            expected: mat_shape,
            got: vec![data.len()],
        });
    }

    let arr = ArrayD::from_shape_vec(IxDyn(&mat_shape).f(), data)
        .map_err(|e| LaplaceError::Other(format!("shape error: {}", e)))?;
    Ok((arr.as_standard_layout().to_owned().into_raw_vec(), shape))
}

/// Save an f64 grid to a .mat file (Level 5) under `var_name`.
///
/// `matfile` only reads, so this goes through a minimal uncompressed Level 5
/// writer: one real double array per file.
pub fn save_mat(grid: &VoxelGrid<f64>, path: &Path, var_name: &str) -> Result<()> {
    let shape = grid.shape();
    let arr = ArrayD::from_shape_vec(IxDyn(&shape), grid.data().to_vec())
        .map_err(|e| LaplaceError::Other(format!("shape error: {}", e)))?;

    // Column-major data under the same dimensions, as MATLAB indexes u(i, j, k).
    let col_major: Vec<f64> = arr.reversed_axes().as_standard_layout().to_owned().into_raw_vec();

    write_mat_level5(path, var_name, &shape, &col_major)
}

/// Minimal MAT-file Level 5 writer for a single f64 array.
fn write_mat_level5(path: &Path, var_name: &str, dimensions: &[usize], data: &[f64]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);

    // Header: 116 bytes of text, 8-byte subsystem offset, version, endian tag.
    let desc = b"MATLAB 5.0 MAT-file, created by airway-laplace";
    let mut header_text = [b' '; 116];
    let copy_len = desc.len().min(116);
    header_text[..copy_len].copy_from_slice(&desc[..copy_len]);
    w.write_all(&header_text)?;
    w.write_all(&[0u8; 8])?;
    w.write_all(&0x0100u16.to_le_bytes())?;
    w.write_all(b"IM")?;

    // miMATRIX element: flags, dimensions, name, real part. Each sub-element
    // is an 8-byte tag plus data padded to 8 bytes.
    let flags_total: u32 = 16;

    let dims_size = (dimensions.len() * 4) as u32;
    let dims_padded = dims_size.div_ceil(8) * 8;

    let name_bytes = var_name.as_bytes();
    let name_size = name_bytes.len() as u32;
    let name_padded = name_size.div_ceil(8) * 8;

    let real_size = (data.len() * 8) as u32;

    let matrix_size = flags_total + (8 + dims_padded) + (8 + name_padded) + (8 + real_size);

    w.write_all(&14u32.to_le_bytes())?; // miMATRIX
    w.write_all(&matrix_size.to_le_bytes())?;

    w.write_all(&6u32.to_le_bytes())?; // miUINT32
    w.write_all(&8u32.to_le_bytes())?;
    w.write_all(&6u32.to_le_bytes())?; // mxDOUBLE_CLASS
    w.write_all(&0u32.to_le_bytes())?;

    w.write_all(&5u32.to_le_bytes())?; // miINT32
    w.write_all(&dims_size.to_le_bytes())?;
    for &d in dimensions {
        w.write_all(&(d as i32).to_le_bytes())?;
    }
    w.write_all(&vec![0u8; (dims_padded - dims_size) as usize])?;

    w.write_all(&1u32.to_le_bytes())?; // miINT8
    w.write_all(&name_size.to_le_bytes())?;
    w.write_all(name_bytes)?;
    w.write_all(&vec![0u8; (name_padded - name_size) as usize])?;

    w.write_all(&9u32.to_le_bytes())?; // miDOUBLE
    w.write_all(&real_size.to_le_bytes())?;
    for &val in data {
        w.write_all(&val.to_le_bytes())?;
    }

    w.flush()?;
    Ok(())
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(LaplaceError::UnsupportedFileFormat(ext.to_string())),
        None => Err(LaplaceError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

/// Supported file formats for volume I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// MATLAB .mat format (Level 5).
    Mat,
}

/// Load a volume as integer labels, inferring format from extension.
pub fn load_volume(path: &Path, mat_variable: Option<&str>) -> Result<(Vec<i32>, [usize; 3])> {
    match infer_format(path)? {
        FileFormat::Npy => load_npy_volume(path),
        FileFormat::Mat => load_mat_volume(path, mat_variable),
    }
}

/// Load a volume and attach geometry. Neither format stores spacing or origin.
pub fn load_grid(
    path: &Path,
    mat_variable: Option<&str>,
    spacing: [f64; 3],
    origin: PhysicalPoint,
) -> Result<VoxelGrid<i32>> {
    let (data, shape) = load_volume(path, mat_variable)?;
    VoxelGrid::new(shape, spacing, origin, data)
}

/// Save a solution field, inferring format from extension.
pub fn save_field(field: &VoxelGrid<f64>, path: &Path) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Npy => save_npy(field, path),
        FileFormat::Mat => save_mat(field, path, FIELD_VARIABLE),
    }
}

/// Save a label grid, inferring format from extension. MAT output stores the
/// labels as doubles.
pub fn save_labels(labels: &VoxelGrid<i32>, path: &Path) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Npy => save_npy(labels, path),
        FileFormat::Mat => save_mat(&labels.map(|&l| f64::from(l)), path, LABELS_VARIABLE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_labels() -> VoxelGrid<i32> {
        let data: Vec<i32> = (0..24).collect();
        VoxelGrid::new([2, 3, 4], [1.0; 3], [0.0; 3], data).unwrap()
    }

    #[test]
    fn npy_label_roundtrip() {
        let grid = ramp_labels();
        let tmp = std::env::temp_dir().join("airway_laplace_test_labels.npy");
        save_labels(&grid, &tmp).unwrap();

        let loaded = load_grid(&tmp, None, [0.5; 3], [1.0, 2.0, 3.0]).unwrap();
        assert_eq!(loaded.shape(), [2, 3, 4]);
        assert_eq!(loaded.data(), grid.data());
        assert_eq!(loaded.spacing(), [0.5; 3]);
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn npy_u8_segmentation_is_promoted() {
        let arr =
            ArrayD::from_shape_vec(IxDyn(&[2, 2, 2]), vec![0u8, 1, 1, 0, 255, 0, 0, 1]).unwrap();
        let tmp = std::env::temp_dir().join("airway_laplace_test_u8.npy");
        ndarray_npy::write_npy(&tmp, &arr).unwrap();

        let (data, shape) = load_npy_volume(&tmp).unwrap();
        assert_eq!(shape, [2, 2, 2]);
        assert_eq!(data, vec![0, 1, 1, 0, 255, 0, 0, 1]);
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn npy_i64_overflow_is_rejected() {
        let arr = ArrayD::from_shape_vec(IxDyn(&[1, 1, 2]), vec![1i64, 1 << 32]).unwrap();
        let tmp = std::env::temp_dir().join("airway_laplace_test_i64.npy");
        ndarray_npy::write_npy(&tmp, &arr).unwrap();

        let err = load_npy_volume(&tmp).unwrap_err();
        assert!(matches!(err, LaplaceError::UnsupportedDtype(_)));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn npy_float_field_roundtrip() {
        let field =
            VoxelGrid::new([1, 2, 2], [1.0; 3], [0.0; 3], vec![0.0, 0.5, f64::NAN, 1.0]).unwrap();
        let tmp = std::env::temp_dir().join("airway_laplace_test_field.npy");
        save_field(&field, &tmp).unwrap();

        let arr: ArrayD<f64> = ndarray_npy::read_npy(&tmp).unwrap();
        assert_eq!(arr.shape(), &[1, 2, 2]);
        let values = arr.into_raw_vec();
        assert_eq!(values[1], 0.5);
        assert!(values[2].is_nan());
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn npy_rejects_non_volume() {
        let arr = ArrayD::from_shape_vec(IxDyn(&[4, 4]), vec![1i32; 16]).unwrap();
        let tmp = std::env::temp_dir().join("airway_laplace_test_2d.npy");
        ndarray_npy::write_npy(&tmp, &arr).unwrap();
        assert!(load_npy_volume(&tmp).is_err());
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn mat_label_roundtrip() {
        let grid = ramp_labels();
        let tmp = std::env::temp_dir().join("airway_laplace_test_labels.mat");
        save_labels(&grid, &tmp).unwrap();

        let (data, shape) = load_mat_volume(&tmp, Some(LABELS_VARIABLE)).unwrap();
        assert_eq!(shape, [2, 3, 4]);
        assert_eq!(data, grid.data());

        // A single array is found without naming it.
        let (data, _) = load_mat_volume(&tmp, None).unwrap();
        assert_eq!(data, grid.data());
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn mat_field_readable_by_matfile() {
        let data = vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        let field = VoxelGrid::new([2, 1, 3], [1.0; 3], [0.0; 3], data).unwrap();
        let tmp = std::env::temp_dir().join("airway_laplace_test_field.mat");
        save_field(&field, &tmp).unwrap();

        let file = std::fs::File::open(&tmp).unwrap();
        let mut reader = std::io::BufReader::new(file);
        let mat = matfile::MatFile::parse(&mut reader).unwrap();
        let arr = mat.find_by_name(FIELD_VARIABLE).unwrap();
        assert_eq!(arr.size(), &vec![2, 1, 3]);
        match arr.data() {
            matfile::NumericData::Double { real, .. } => {
                // Column-major: u(1,0,0) comes second.
                assert_eq!(real.len(), 6);
                assert_eq!(real[1], 0.3);
            }
            _ => panic!("Expected double data"),
        }
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn mat_missing_variable() {
        let tmp = std::env::temp_dir().join("airway_laplace_test_missing.mat");
        save_labels(&ramp_labels(), &tmp).unwrap();
        match load_mat_volume(&tmp, Some("segmentation")) {
            Err(LaplaceError::MatVariableNotFound { expected, available }) => {
                assert_eq!(expected, "segmentation");
                assert_eq!(available, vec![LABELS_VARIABLE.to_string()]);
            }
            other => panic!("expected MatVariableNotFound, got {:?}", other.map(|_| ())),
        }
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn unsupported_format() {
        assert!(matches!(
            infer_format(Path::new("airway.nrrd")),
            Err(LaplaceError::UnsupportedFileFormat(_))
        ));
        assert!(matches!(
            infer_format(Path::new("airway")),
            Err(LaplaceError::UnsupportedFileFormat(_))
        ));
    }
}
