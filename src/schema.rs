use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Static declaration of the columns the pipeline expects after ingestion
/// has dropped the raw-only columns.
///
/// `columns` is the post-drop shape (features plus the target column);
/// `drop_columns` names raw-table columns that never reach validation and
/// therefore must not appear in `columns`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    pub columns: Vec<String>,
    pub numerical_columns: Vec<String>,
    #[serde(default)]
    pub drop_columns: Vec<String>,
    pub target_column: String,
}

impl SchemaConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
        let schema: SchemaConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse schema YAML: {}", path.display()))?;
        schema.check()?;
        Ok(schema)
    }

    /// Internal consistency: numerical columns and the target must be
    /// declared, and dropped columns must not be.
    pub fn check(&self) -> Result<()> {
        if self.columns.is_empty() {
            bail!("Schema must declare at least one column");
        }
        for numeric in &self.numerical_columns {
            if !self.columns.contains(numeric) {
                bail!("Numerical column '{numeric}' is not declared in the schema columns");
            }
        }
        if !self.columns.contains(&self.target_column) {
            bail!(
                "Target column '{}' is not declared in the schema columns",
                self.target_column
            );
        }
        for dropped in &self.drop_columns {
            if self.columns.contains(dropped) {
                bail!("Drop column '{dropped}' conflicts with a declared schema column");
            }
        }
        Ok(())
    }

    pub fn expected_column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SchemaConfig {
        SchemaConfig {
            columns: vec!["s1".into(), "s2".into(), "class".into()],
            numerical_columns: vec!["s1".into(), "s2".into()],
            drop_columns: vec!["batch_id".into()],
            target_column: "class".into(),
        }
    }

    #[test]
    fn valid_schema_passes_check() {
        schema().check().unwrap();
    }

    #[test]
    fn undeclared_numerical_column_is_rejected() {
        let mut s = schema();
        s.numerical_columns.push("s9".into());
        let err = s.check().unwrap_err();
        assert!(err.to_string().contains("s9"));
    }

    #[test]
    fn missing_target_column_is_rejected() {
        let mut s = schema();
        s.target_column = "label".into();
        assert!(s.check().is_err());
    }

    #[test]
    fn drop_column_overlapping_schema_is_rejected() {
        let mut s = schema();
        s.drop_columns.push("s1".into());
        assert!(s.check().is_err());
    }
}
