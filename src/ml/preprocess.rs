use anyhow::{Result, bail};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Two-step numeric preprocessing fitted on the train split only:
/// constant-value imputation followed by robust scaling. Median/IQR
/// centering keeps telemetry outliers from dominating the scale the way
/// they would with mean/variance scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    fill_value: f64,
    medians: Vec<f64>,
    scales: Vec<f64>,
}

impl Preprocessor {
    pub fn fit(features: ArrayView2<'_, f64>) -> Result<Self> {
        if features.nrows() == 0 || features.ncols() == 0 {
            bail!("Cannot fit preprocessor on an empty feature matrix");
        }
        let fill_value = 0.0;
        let mut medians = Vec::with_capacity(features.ncols());
        let mut scales = Vec::with_capacity(features.ncols());
        for column in features.columns() {
            let mut values: Vec<f64> = column
                .iter()
                .map(|v| if v.is_nan() { fill_value } else { *v })
                .collect();
            values.sort_by(|a, b| a.total_cmp(b));
            medians.push(percentile(&values, 0.5));
            let iqr = percentile(&values, 0.75) - percentile(&values, 0.25);
            // A zero interquartile range would wipe the column out; leave
            // such columns centered but unscaled.
            scales.push(if iqr > 0.0 { iqr } else { 1.0 });
        }
        Ok(Self {
            fill_value,
            medians,
            scales,
        })
    }

    pub fn transform(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.medians.len() {
            bail!(
                "Feature width {} does not match fitted width {}",
                features.ncols(),
                self.medians.len()
            );
        }
        let mut transformed = Array2::zeros((features.nrows(), features.ncols()));
        for ((row, col), value) in features.indexed_iter() {
            let imputed = if value.is_nan() {
                self.fill_value
            } else {
                *value
            };
            transformed[[row, col]] = (imputed - self.medians[col]) / self.scales[col];
        }
        Ok(transformed)
    }

    pub fn n_features(&self) -> usize {
        self.medians.len()
    }
}

/// Linear-interpolated percentile of an ascending-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = position - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}
