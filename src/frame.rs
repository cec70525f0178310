use std::path::Path;

use anyhow::{Context, Result, bail};
use ndarray::Array2;

/// One table cell. Missing values stay missing end to end; numeric parsing
/// happens once, at the edge where raw text enters the system.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn parse(raw: &str) -> Cell {
        if raw.is_empty() {
            return Cell::Missing;
        }
        match raw.parse::<f64>() {
            Ok(value) => Cell::Number(value),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Number(value) => {
                if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
                    format!("{}", *value as i64)
                } else {
                    format!("{value}")
                }
            }
            Cell::Text(text) => text.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }
}

/// Column-named table of rows. This is the currency every stage upstream of
/// the numeric transform consumes and produces.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "Row width {} does not match {} columns",
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// New frame without the named columns. Absent names are ignored so the
    /// same drop list works for collections that never carried the column.
    pub fn drop_columns(&self, names: &[String]) -> Frame {
        let kept: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !names.contains(c))
            .map(|(i, _)| i)
            .collect();
        let columns = kept.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| kept.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Frame { columns, rows }
    }

    /// Splits the named column out, returning its cells and the remaining
    /// frame. Used to separate the label from the features.
    pub fn take_column(&self, name: &str) -> Result<(Vec<Cell>, Frame)> {
        let idx = self
            .column_index(name)
            .with_context(|| format!("Column '{name}' not present in frame"))?;
        let cells = self.rows.iter().map(|row| row[idx].clone()).collect();
        let name_owned = self.columns[idx].clone();
        let rest = self.drop_columns(std::slice::from_ref(&name_owned));
        Ok((cells, rest))
    }

    /// Numeric values of one column, skipping missing and textual cells.
    pub fn column_values(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self
            .column_index(name)
            .with_context(|| format!("Column '{name}' not present in frame"))?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row[idx].as_number())
            .collect())
    }

    /// Dense matrix view of the frame. Missing and textual cells become NaN
    /// so the imputer downstream can see them.
    pub fn numeric_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::from_elem((self.n_rows(), self.n_columns()), f64::NAN);
        for (r, row) in self.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if let Some(value) = cell.as_number() {
                    matrix[[r, c]] = value;
                }
            }
        }
        matrix
    }

    /// Vertical concatenation of two frames with identical column sets.
    pub fn concat(&self, other: &Frame) -> Result<Frame> {
        if self.columns != other.columns {
            bail!("Cannot concatenate frames with different columns");
        }
        let mut merged = self.clone();
        merged.rows.extend(other.rows.iter().cloned());
        Ok(merged)
    }

    pub fn read_csv(path: &Path) -> Result<Frame> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        let columns: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        let mut frame = Frame::new(columns);
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to read CSV row: {}", path.display()))?;
            let row = record.iter().map(Cell::parse).collect();
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    /// Writes the frame as delimited text with a header row, creating
    /// parent directories as needed.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        writer
            .write_record(&self.columns)
            .context("Failed to write CSV header")?;
        for row in &self.rows {
            let rendered: Vec<String> = row.iter().map(Cell::render).collect();
            writer
                .write_record(&rendered)
                .context("Failed to write CSV row")?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush CSV file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Frame {
        let mut frame = Frame::new(vec!["s1".into(), "s2".into(), "class".into()]);
        frame
            .push_row(vec![
                Cell::Number(1.5),
                Cell::Missing,
                Cell::Text("neg".into()),
            ])
            .unwrap();
        frame
            .push_row(vec![
                Cell::Number(-2.0),
                Cell::Number(4.0),
                Cell::Text("pos".into()),
            ])
            .unwrap();
        frame
    }

    #[test]
    fn csv_round_trip_preserves_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/sample.csv");
        let frame = sample();
        frame.write_csv(&path).unwrap();

        let reloaded = Frame::read_csv(&path).unwrap();
        assert_eq!(reloaded.columns(), frame.columns());
        assert_eq!(reloaded.rows(), frame.rows());
    }

    #[test]
    fn numeric_matrix_marks_missing_as_nan() {
        let matrix = sample().numeric_matrix();
        assert_eq!(matrix[[0, 0]], 1.5);
        assert!(matrix[[0, 1]].is_nan());
        assert!(matrix[[0, 2]].is_nan());
    }

    #[test]
    fn take_column_separates_the_label() {
        let (label, features) = sample().take_column("class").unwrap();
        assert_eq!(label.len(), 2);
        assert_eq!(features.columns(), ["s1", "s2"]);
    }

    #[test]
    fn drop_columns_ignores_absent_names() {
        let dropped = sample().drop_columns(&["s2".into(), "not_there".into()]);
        assert_eq!(dropped.columns(), ["s1", "class"]);
        assert_eq!(dropped.n_rows(), 2);
    }

    #[test]
    fn row_width_mismatch_is_rejected() {
        let mut frame = Frame::new(vec!["a".into(), "b".into()]);
        assert!(frame.push_row(vec![Cell::Number(1.0)]).is_err());
    }
}
