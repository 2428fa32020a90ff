//! Reading and writing the aggregate results table.
//!
//! Same text format as the field files; the dims header carries the
//! `(n_samples, methods, metrics)` shape.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::io::field_file::{read_values, FieldFileError};
use crate::metrics::{Method, Metrics, ResultsTable};

/// Persist the results table.
pub fn write_results(path: &Path, table: &ResultsTable) -> Result<(), FieldFileError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# swevar results")?;
    writeln!(
        out,
        "# dims: {} {} {}",
        table.n_samples(),
        Method::ALL.len(),
        Metrics::COUNT
    )?;
    writeln!(out, "# metrics: epe angular grad_norm div_norm lap_norm")?;

    for row in table.as_flat().chunks(Metrics::COUNT) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

/// Load a results table.
pub fn read_results(path: &Path) -> Result<ResultsTable, FieldFileError> {
    let (dims, values) = read_values(path)?;
    if dims.len() != 3 || dims[1] != Method::ALL.len() || dims[2] != Metrics::COUNT {
        return Err(FieldFileError::Shape {
            expected: format!("[_, {}, {}]", Method::ALL.len(), Metrics::COUNT),
            actual: format!("{dims:?}"),
        });
    }

    ResultsTable::from_flat(dims[0], values).map_err(|e| FieldFileError::Shape {
        expected: format!("{} x {} x {}", dims[0], dims[1], dims[2]),
        actual: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("swevar_results_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_results_roundtrip() {
        let mut table = ResultsTable::new(2);
        table.set(
            0,
            Method::Plain,
            &Metrics {
                epe: 0.125,
                angular: 0.25,
                grad_norm: 1.5,
                div_norm: 0.75,
                lap_norm: 2.0,
            },
        );
        table.set(
            1,
            Method::DeepPrior,
            &Metrics {
                epe: 0.0625,
                angular: 0.5,
                grad_norm: 1.25,
                div_norm: 0.375,
                lap_norm: 1.75,
            },
        );

        let path = temp_path("table.dat");
        write_results(&path, &table).unwrap();
        let back = read_results(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back, table);
    }

    #[test]
    fn test_missing_results_is_io_error() {
        let result = read_results(&temp_path("missing.dat"));
        assert!(matches!(result, Err(FieldFileError::Io(_))));
    }
}
