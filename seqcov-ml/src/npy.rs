//! `.npy` export of prediction and target tensors.

use std::io::Write;
use std::path::Path;

use ndarray::Array3;
use ndarray_npy::WriteNpyExt;

use crate::error::MlError;
use crate::tensor::Tensor3;

/// Copy a tensor into an owned C-order array.
pub fn to_array(tensor: &Tensor3) -> Result<Array3<f32>, MlError> {
    let [a, b, c] = tensor.shape();
    Array3::from_shape_vec((a, b, c), tensor.as_slice().to_vec())
        .map_err(|e| MlError::shape(format!("npy export: {e}")))
}

pub fn write_npy<W: Write>(out: W, tensor: &Tensor3) -> Result<(), MlError> {
    to_array(tensor)?
        .write_npy(out)
        .map_err(|e| MlError::Io(std::io::Error::other(e)))
}

pub fn write_npy_file(path: &Path, tensor: &Tensor3) -> Result<(), MlError> {
    let file = std::fs::File::create(path)?;
    write_npy(std::io::BufWriter::new(file), tensor)
}
