//! Reading and writing gridded field artifacts.
//!
//! # File Format
//!
//! Plain text with `#` header lines followed by whitespace-separated
//! values, one grid row per line:
//!
//! ```text
//! # swevar field
//! # dims: 3 64 64
//! 0.0012 -0.0034 ...
//! ```
//!
//! The `dims:` header carries the tensor shape, outermost dimension
//! first. Values are written with Rust's shortest round-trip float
//! formatting, so a write/read cycle is bit-exact.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use burn::prelude::*;
use thiserror::Error;

use crate::backend::{tensor_from_vec, tensor_to_vec};
use crate::grid::Grid;
use crate::model::SweState;

/// Error type for field file I/O.
#[derive(Debug, Error)]
pub enum FieldFileError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error with line number
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Header or value count inconsistent with the expected shape
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    /// File contains no data values
    #[error("Field file contains no data")]
    Empty,
}

/// Write a flat value buffer with its dims header.
fn write_values(
    path: &Path,
    dims: &[usize],
    values: &[f64],
    row_len: usize,
) -> Result<(), FieldFileError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# swevar field")?;
    let dims_str: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
    writeln!(out, "# dims: {}", dims_str.join(" "))?;

    for row in values.chunks(row_len) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

/// Read a dims header and flat value buffer.
pub(crate) fn read_values(path: &Path) -> Result<(Vec<usize>, Vec<f64>), FieldFileError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut dims: Option<Vec<usize>> = None;
    let mut values = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('#') {
            let rest = rest.trim();
            if let Some(spec) = rest.strip_prefix("dims:") {
                let parsed: Result<Vec<usize>, _> =
                    spec.split_whitespace().map(|t| t.parse()).collect();
                dims = Some(parsed.map_err(|e| FieldFileError::Parse {
                    line: line_no + 1,
                    message: format!("bad dims header: {e}"),
                })?);
            }
            continue;
        }
        for token in trimmed.split_whitespace() {
            let value: f64 = token.parse().map_err(|e| FieldFileError::Parse {
                line: line_no + 1,
                message: format!("bad value '{token}': {e}"),
            })?;
            values.push(value);
        }
    }

    let dims = dims.ok_or(FieldFileError::Parse {
        line: 0,
        message: "missing dims header".into(),
    })?;
    if values.is_empty() {
        return Err(FieldFileError::Empty);
    }
    let expected: usize = dims.iter().product();
    if values.len() != expected {
        return Err(FieldFileError::Shape {
            expected: format!("{expected} values for dims {dims:?}"),
            actual: format!("{}", values.len()),
        });
    }
    Ok((dims, values))
}

/// Persist a 3-channel state.
pub fn write_state_file<B: Backend>(path: &Path, state: &SweState<B>) -> Result<(), FieldFileError>
where
    f64: From<B::FloatElem>,
{
    let (ny, nx) = state.dims();
    let values = tensor_to_vec(&state.to_channels());
    write_values(path, &[3, ny, nx], &values, nx)
}

/// Load a 3-channel state, validating its shape against the grid.
pub fn read_state_file<B: Backend>(
    path: &Path,
    grid: &Grid,
    device: &B::Device,
) -> Result<SweState<B>, FieldFileError>
where
    B::FloatElem: From<f64>,
{
    let (dims, values) = read_values(path)?;
    if dims != vec![3, grid.ny, grid.nx] {
        return Err(FieldFileError::Shape {
            expected: format!("[3, {}, {}]", grid.ny, grid.nx),
            actual: format!("{dims:?}"),
        });
    }
    let channels = tensor_from_vec::<B, 3>(values, grid.state_shape(), device);
    SweState::from_channels(channels, grid).map_err(|e| FieldFileError::Shape {
        expected: format!("[3, {}, {}]", grid.ny, grid.nx),
        actual: e.to_string(),
    })
}

/// Persist an observation or mask stack of shape `[T + 1, 3, ny, nx]`.
pub fn write_stack_file<B: Backend>(
    path: &Path,
    stack: &Tensor<B, 4>,
) -> Result<(), FieldFileError>
where
    f64: From<B::FloatElem>,
{
    let dims = stack.dims();
    let values = tensor_to_vec(stack);
    write_values(path, &dims, &values, dims[3])
}

/// Load an observation or mask stack, validating its shape against the grid.
pub fn read_stack_file<B: Backend>(
    path: &Path,
    grid: &Grid,
    device: &B::Device,
) -> Result<Tensor<B, 4>, FieldFileError>
where
    B::FloatElem: From<f64>,
{
    let (dims, values) = read_values(path)?;
    if dims.len() != 4 || dims[1] != 3 || dims[2] != grid.ny || dims[3] != grid.nx {
        return Err(FieldFileError::Shape {
            expected: format!("[_, 3, {}, {}]", grid.ny, grid.nx),
            actual: format!("{dims:?}"),
        });
    }
    let shape = [dims[0], dims[1], dims[2], dims[3]];
    Ok(tensor_from_vec::<B, 4>(values, shape, device))
}
