use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::frame::{Cell, Frame};
use crate::ml::boost::GradientBooster;
use crate::ml::preprocess::Preprocessor;

pub const NEGATIVE_LABEL: &str = "neg";
pub const POSITIVE_LABEL: &str = "pos";

/// Canonical binary target encoding (neg -> 0, pos -> 1), reused by every
/// downstream metric computation.
pub struct TargetMapping;

impl TargetMapping {
    pub fn encode_cell(cell: &Cell) -> Result<f64> {
        match cell {
            Cell::Text(text) if text == NEGATIVE_LABEL => Ok(0.0),
            Cell::Text(text) if text == POSITIVE_LABEL => Ok(1.0),
            Cell::Number(value) if *value == 0.0 || *value == 1.0 => Ok(*value),
            other => bail!("Unrecognized target value: {other:?}"),
        }
    }

    pub fn encode(cells: &[Cell]) -> Result<Vec<f64>> {
        cells.iter().map(Self::encode_cell).collect()
    }

    pub fn decode(value: f64) -> &'static str {
        if value >= 0.5 {
            POSITIVE_LABEL
        } else {
            NEGATIVE_LABEL
        }
    }
}

/// Deployable unit: the fitted preprocessor and the fitted classifier
/// travel together so serving never sees raw features without the exact
/// transform they were trained under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub preprocessor: Preprocessor,
    pub classifier: GradientBooster,
}

impl ModelBundle {
    pub fn new(preprocessor: Preprocessor, classifier: GradientBooster) -> Self {
        Self {
            preprocessor,
            classifier,
        }
    }

    /// Predicts on already-transformed features.
    pub fn predict_transformed(&self, features: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        self.classifier.predict(features)
    }

    /// Predicts on a raw feature frame: numeric view, fitted transform,
    /// then classify.
    pub fn predict_frame(&self, features: &Frame) -> Result<Vec<f64>> {
        let matrix = features.numeric_matrix();
        let transformed = self.preprocessor.transform(matrix.view())?;
        self.classifier.predict(transformed.view())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create model directory: {}", parent.display())
            })?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create model bundle: {}", path.display()))?;
        serde_json::to_writer(file, self)
            .with_context(|| format!("Failed to serialize model bundle: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open model bundle: {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("Failed to deserialize model bundle: {}", path.display()))
    }
}

/// Versioned model registry: one timestamped directory per accepted
/// promotion under the root. The incumbent is the greatest directory name
/// that actually contains a bundle file.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn best_model_path(&self) -> Result<Option<PathBuf>> {
        if !self.root.exists() {
            return Ok(None);
        }
        let mut versions: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read model registry: {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.root.join(&name).join(crate::config::MODEL_FILE).is_file() {
                versions.push(name);
            }
        }
        versions.sort();
        Ok(versions
            .pop()
            .map(|version| self.root.join(version).join(crate::config::MODEL_FILE)))
    }

    pub fn has_model(&self) -> Result<bool> {
        Ok(self.best_model_path()?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn target_mapping_is_the_canonical_encoding() {
        assert_eq!(
            TargetMapping::encode_cell(&Cell::Text("neg".into())).unwrap(),
            0.0
        );
        assert_eq!(
            TargetMapping::encode_cell(&Cell::Text("pos".into())).unwrap(),
            1.0
        );
        assert!(TargetMapping::encode_cell(&Cell::Text("maybe".into())).is_err());
        assert_eq!(TargetMapping::decode(1.0), "pos");
        assert_eq!(TargetMapping::decode(0.0), "neg");
    }

    #[test]
    fn empty_registry_has_no_incumbent() {
        let dir = tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path().join("saved_models"));
        assert!(registry.best_model_path().unwrap().is_none());
        assert!(!registry.has_model().unwrap());
    }

    #[test]
    fn greatest_timestamped_version_wins() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("saved_models");
        for version in ["20250101000000", "20260101000000", "20240101000000"] {
            let slot = root.join(version);
            std::fs::create_dir_all(&slot).unwrap();
            std::fs::write(slot.join(crate::config::MODEL_FILE), "{}").unwrap();
        }
        // A directory without a bundle file never counts.
        std::fs::create_dir_all(root.join("20270101000000")).unwrap();

        let registry = ModelRegistry::new(&root);
        let best = registry.best_model_path().unwrap().unwrap();
        assert_eq!(
            best,
            root.join("20260101000000").join(crate::config::MODEL_FILE)
        );
    }
}
