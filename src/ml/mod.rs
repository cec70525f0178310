//! Capability providers for the feature-engineering and model-fitting
//! algorithms. The pipeline treats these as opaque: fixed input/output
//! shapes, no knobs exposed beyond what the stage configs carry.

pub mod boost;
pub mod estimator;
pub mod metrics;
pub mod preprocess;
pub mod resample;

use std::path::Path;

use anyhow::{Context, Result, bail};
use ndarray::Array2;

/// Persists a dense numeric array as headerless delimited text.
pub fn save_array(path: &Path, array: &Array2<f64>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create array directory: {}", parent.display()))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create array file: {}", path.display()))?;
    for row in array.rows() {
        let rendered: Vec<String> = row.iter().map(|v| format!("{v}")).collect();
        writer
            .write_record(&rendered)
            .with_context(|| format!("Failed to write array row: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush array file: {}", path.display()))?;
    Ok(())
}

pub fn load_array(path: &Path) -> Result<Array2<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to open array file: {}", path.display()))?;
    let mut values: Vec<f64> = Vec::new();
    let mut width: Option<usize> = None;
    let mut height = 0usize;
    for record in reader.records() {
        let record =
            record.with_context(|| format!("Failed to read array row: {}", path.display()))?;
        match width {
            None => width = Some(record.len()),
            Some(expected) if expected != record.len() => {
                bail!(
                    "Ragged array file {}: expected {expected} values per row, got {}",
                    path.display(),
                    record.len()
                );
            }
            _ => {}
        }
        for field in record.iter() {
            let value: f64 = field
                .parse()
                .with_context(|| format!("Non-numeric value in array file: {}", path.display()))?;
            values.push(value);
        }
        height += 1;
    }
    let width = width.unwrap_or(0);
    Array2::from_shape_vec((height, width), values)
        .with_context(|| format!("Array file has inconsistent shape: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn array_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transformed/train.csv");
        let original = array![[1.0, -0.5, 1.0], [0.25, 3.0, 0.0]];
        save_array(&path, &original).unwrap();
        let reloaded = load_array(&path).unwrap();
        assert_eq!(reloaded, original);
    }
}
