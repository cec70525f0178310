use anyhow::{Result, bail};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_ROUNDS: usize = 100;
const DEFAULT_LEARNING_RATE: f64 = 0.1;
const DEFAULT_L2: f64 = 1.0;
const MAX_SPLIT_CANDIDATES: usize = 32;

/// One boosted regression stump: rows with `feature < threshold` take the
/// left value, everything else (including non-finite inputs) the right.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stump {
    feature: usize,
    threshold: f64,
    left_value: f64,
    right_value: f64,
}

impl Stump {
    fn value_for(&self, row: &[f64]) -> f64 {
        if row[self.feature] < self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

/// Gradient-boosted stump ensemble with logistic loss, fitted with
/// library-default hyperparameters. Second-order (Newton) leaf weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBooster {
    base_score: f64,
    learning_rate: f64,
    n_features: usize,
    stumps: Vec<Stump>,
}

impl GradientBooster {
    pub fn fit(features: ArrayView2<'_, f64>, labels: &[f64]) -> Result<Self> {
        if features.nrows() == 0 {
            bail!("Cannot fit classifier on an empty training set");
        }
        if features.nrows() != labels.len() {
            bail!(
                "Feature rows {} do not match label count {}",
                features.nrows(),
                labels.len()
            );
        }

        let rows: Vec<Vec<f64>> = features.rows().into_iter().map(|r| r.to_vec()).collect();
        let positive_rate = labels.iter().filter(|&&l| l >= 0.5).count() as f64
            / labels.len() as f64;
        let base_score = log_odds(positive_rate);

        let mut model = Self {
            base_score,
            learning_rate: DEFAULT_LEARNING_RATE,
            n_features: features.ncols(),
            stumps: Vec::with_capacity(DEFAULT_ROUNDS),
        };

        let mut margins = vec![base_score; rows.len()];
        for round in 0..DEFAULT_ROUNDS {
            let mut gradients = Vec::with_capacity(rows.len());
            let mut hessians = Vec::with_capacity(rows.len());
            for (margin, &label) in margins.iter().zip(labels) {
                let probability = sigmoid(*margin);
                gradients.push(probability - label);
                hessians.push((probability * (1.0 - probability)).max(1e-12));
            }

            let stump = best_stump(&rows, &gradients, &hessians);
            for (margin, row) in margins.iter_mut().zip(&rows) {
                *margin += model.learning_rate * stump.value_for(row);
            }
            if round == 0 {
                debug!(
                    feature = stump.feature,
                    threshold = stump.threshold,
                    "First boosting split selected"
                );
            }
            model.stumps.push(stump);
        }

        Ok(model)
    }

    /// Raw additive margins (log-odds scale).
    pub fn decision_function(&self, features: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        if features.ncols() != self.n_features {
            bail!(
                "Feature width {} does not match fitted width {}",
                features.ncols(),
                self.n_features
            );
        }
        Ok(features
            .rows()
            .into_iter()
            .map(|row| {
                let row = row.to_vec();
                self.base_score
                    + self.learning_rate
                        * self
                            .stumps
                            .iter()
                            .map(|stump| stump.value_for(&row))
                            .sum::<f64>()
            })
            .collect())
    }

    /// Hard 0/1 class predictions.
    pub fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        Ok(self
            .decision_function(features)?
            .into_iter()
            .map(|margin| if sigmoid(margin) >= 0.5 { 1.0 } else { 0.0 })
            .collect())
    }
}

/// Greedy single-split search over quantile-spaced candidate thresholds,
/// maximizing the Newton gain. Falls back to a bias-only stump when no
/// split improves on the unsplit leaf, which keeps boosting well-defined
/// for constant feature matrices.
fn best_stump(rows: &[Vec<f64>], gradients: &[f64], hessians: &[f64]) -> Stump {
    let total_gradient: f64 = gradients.iter().sum();
    let total_hessian: f64 = hessians.iter().sum();
    let unsplit_score = total_gradient * total_gradient / (total_hessian + DEFAULT_L2);
    let bias_weight = -total_gradient / (total_hessian + DEFAULT_L2);

    let n_features = rows.first().map(Vec::len).unwrap_or(0);
    let mut best: Option<(f64, Stump)> = None;

    for feature in 0..n_features {
        let mut values: Vec<f64> = rows
            .iter()
            .map(|row| row[feature])
            .filter(|v| v.is_finite())
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        if values.len() < 2 {
            continue;
        }

        for threshold in candidate_thresholds(&values) {
            let mut left_gradient = 0.0;
            let mut left_hessian = 0.0;
            for (row, (&gradient, &hessian)) in rows.iter().zip(gradients.iter().zip(hessians)) {
                if row[feature] < threshold {
                    left_gradient += gradient;
                    left_hessian += hessian;
                }
            }
            let right_gradient = total_gradient - left_gradient;
            let right_hessian = total_hessian - left_hessian;
            let gain = left_gradient * left_gradient / (left_hessian + DEFAULT_L2)
                + right_gradient * right_gradient / (right_hessian + DEFAULT_L2)
                - unsplit_score;
            if gain > best.as_ref().map(|(g, _)| *g).unwrap_or(1e-9) {
                best = Some((
                    gain,
                    Stump {
                        feature,
                        threshold,
                        left_value: -left_gradient / (left_hessian + DEFAULT_L2),
                        right_value: -right_gradient / (right_hessian + DEFAULT_L2),
                    },
                ));
            }
        }
    }

    best.map(|(_, stump)| stump).unwrap_or(Stump {
        feature: 0,
        threshold: f64::NEG_INFINITY,
        left_value: bias_weight,
        right_value: bias_weight,
    })
}

/// Midpoints between consecutive distinct values, thinned to a bounded
/// number of evenly spaced candidates.
fn candidate_thresholds(sorted_unique: &[f64]) -> Vec<f64> {
    let gaps = sorted_unique.len() - 1;
    let step = (gaps / MAX_SPLIT_CANDIDATES).max(1);
    (0..gaps)
        .step_by(step)
        .map(|i| (sorted_unique[i] + sorted_unique[i + 1]) / 2.0)
        .collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn log_odds(p: f64) -> f64 {
    let clamped = p.clamp(1e-6, 1.0 - 1e-6);
    (clamped / (1.0 - clamped)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn separable_data(n_per_class: usize) -> (Array2<f64>, Vec<f64>) {
        let mut values = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class {
            values.extend_from_slice(&[i as f64 * 0.01, 1.0]);
            labels.push(0.0);
            values.extend_from_slice(&[5.0 + i as f64 * 0.01, 1.0]);
            labels.push(1.0);
        }
        (
            Array2::from_shape_vec((n_per_class * 2, 2), values).unwrap(),
            labels,
        )
    }

    #[test]
    fn learns_a_separable_pattern_perfectly() {
        let (features, labels) = separable_data(30);
        let model = GradientBooster::fit(features.view(), &labels).unwrap();
        let predictions = model.predict(features.view()).unwrap();
        assert_eq!(predictions, labels);
    }

    #[test]
    fn constant_features_predict_the_majority_class() {
        let features = Array2::from_elem((10, 3), 1.0);
        let labels = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let model = GradientBooster::fit(features.view(), &labels).unwrap();
        let predictions = model.predict(features.view()).unwrap();
        assert!(predictions.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn generalizes_to_unseen_points_of_the_same_pattern() {
        let (features, labels) = separable_data(50);
        let model = GradientBooster::fit(features.view(), &labels).unwrap();
        let unseen = ndarray::array![[0.2, 1.0], [5.2, 1.0]];
        assert_eq!(model.predict(unseen.view()).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn serde_round_trip_predicts_identically() {
        let (features, labels) = separable_data(20);
        let model = GradientBooster::fit(features.view(), &labels).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let reloaded: GradientBooster = serde_json::from_str(&json).unwrap();
        assert_eq!(
            model.predict(features.view()).unwrap(),
            reloaded.predict(features.view()).unwrap()
        );
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let (features, labels) = separable_data(5);
        let model = GradientBooster::fit(features.view(), &labels).unwrap();
        let narrow = ndarray::array![[1.0]];
        assert!(model.predict(narrow.view()).is_err());
    }
}
