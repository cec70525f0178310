use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::info;

use crate::error::PipelineError;
use crate::frame::{Cell, Frame};

/// Sentinel the upstream collectors write for unavailable readings.
const NOT_AVAILABLE: &str = "na";

/// Synthetic identifier the document store attaches to every record.
const DOCUMENT_ID_FIELD: &str = "_id";

/// Fetches a named record collection as a uniform table and persists tables
/// back as records. Implementations must surface a clean missing-value
/// representation for the "na" sentinel.
pub trait TabularStore {
    fn fetch(&self, collection: &str, database: Option<&str>) -> Result<Frame, PipelineError>;

    fn persist(
        &self,
        frame: &Frame,
        collection: &str,
        database: Option<&str>,
    ) -> Result<usize, PipelineError>;
}

/// Document store backed by a directory tree of JSON-lines collections,
/// one record per line under `<root>/<database>/<collection>.jsonl`.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    default_database: String,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>, default_database: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_database: default_database.into(),
        }
    }

    fn collection_path(&self, collection: &str, database: Option<&str>) -> PathBuf {
        let database = database.unwrap_or(&self.default_database);
        self.root.join(database).join(format!("{collection}.jsonl"))
    }

    fn read_documents(&self, collection: &str, database: Option<&str>) -> Result<Vec<Value>> {
        let path = self.collection_path(collection, database);
        let file = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open collection: {}", path.display()))?;
        let mut documents = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line
                .with_context(|| format!("Failed to read collection: {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let document: Value = serde_json::from_str(&line)
                .with_context(|| format!("Malformed record in collection: {}", path.display()))?;
            documents.push(document);
        }
        Ok(documents)
    }

    fn materialize(documents: &[Value]) -> Result<Frame> {
        // Stable column order: first-seen across all documents, so sparse
        // records cannot reorder the table.
        let mut columns: Vec<String> = Vec::new();
        for document in documents {
            let object = document
                .as_object()
                .ok_or_else(|| anyhow!("Collection record is not a JSON object"))?;
            for key in object.keys() {
                if key != DOCUMENT_ID_FIELD && !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut frame = Frame::new(columns.clone());
        for document in documents {
            let object = document
                .as_object()
                .ok_or_else(|| anyhow!("Collection record is not a JSON object"))?;
            let row = columns
                .iter()
                .map(|column| cell_from_value(object.get(column)))
                .collect();
            frame.push_row(row)?;
        }
        Ok(frame)
    }
}

fn cell_from_value(value: Option<&Value>) -> Cell {
    match value {
        None | Some(Value::Null) => Cell::Missing,
        Some(Value::Number(number)) => number.as_f64().map(Cell::Number).unwrap_or(Cell::Missing),
        Some(Value::String(text)) if text == NOT_AVAILABLE => Cell::Missing,
        Some(Value::String(text)) => Cell::parse(text),
        Some(other) => Cell::Text(other.to_string()),
    }
}

fn value_from_cell(cell: &Cell) -> Value {
    match cell {
        Cell::Missing => Value::Null,
        Cell::Number(number) => serde_json::Number::from_f64(*number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Cell::Text(text) => Value::String(text.clone()),
    }
}

impl TabularStore for DocumentStore {
    fn fetch(&self, collection: &str, database: Option<&str>) -> Result<Frame, PipelineError> {
        let documents = self
            .read_documents(collection, database)
            .map_err(|err| PipelineError::adapter(format!("fetching collection '{collection}'"), err))?;
        let frame = Self::materialize(&documents)
            .map_err(|err| PipelineError::adapter(format!("materializing collection '{collection}'"), err))?;
        info!(
            collection,
            rows = frame.n_rows(),
            columns = frame.n_columns(),
            "Collection materialized"
        );
        Ok(frame)
    }

    fn persist(
        &self,
        frame: &Frame,
        collection: &str,
        database: Option<&str>,
    ) -> Result<usize, PipelineError> {
        let path = self.collection_path(collection, database);
        let write = || -> Result<usize> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create collection directory: {}", parent.display())
                })?;
            }
            let mut file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create collection: {}", path.display()))?;
            for row in frame.rows() {
                let record: serde_json::Map<String, Value> = frame
                    .columns()
                    .iter()
                    .cloned()
                    .zip(row.iter().map(value_from_cell))
                    .collect();
                serde_json::to_writer(&mut file, &record)
                    .with_context(|| format!("Failed to write record: {}", path.display()))?;
                writeln!(file).with_context(|| format!("Failed to write record: {}", path.display()))?;
            }
            Ok(frame.n_rows())
        };
        write()
            .map_err(|err| PipelineError::adapter(format!("persisting collection '{collection}'"), err))
    }
}
