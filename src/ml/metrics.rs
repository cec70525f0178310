use anyhow::{Result, bail};

use crate::artifact::ClassificationMetric;

/// Precision, recall and F1 for the positive class (label 1) of a binary
/// prediction. Degenerate denominators score zero rather than erroring.
pub fn classification_score(y_true: &[f64], y_pred: &[f64]) -> Result<ClassificationMetric> {
    if y_true.len() != y_pred.len() {
        bail!(
            "Label/prediction length mismatch: {} vs {}",
            y_true.len(),
            y_pred.len()
        );
    }
    if y_true.is_empty() {
        bail!("Cannot score an empty prediction set");
    }

    let mut true_positives = 0.0f64;
    let mut false_positives = 0.0f64;
    let mut false_negatives = 0.0f64;
    for (&truth, &predicted) in y_true.iter().zip(y_pred) {
        let truth_positive = truth >= 0.5;
        let predicted_positive = predicted >= 0.5;
        match (truth_positive, predicted_positive) {
            (true, true) => true_positives += 1.0,
            (false, true) => false_positives += 1.0,
            (true, false) => false_negatives += 1.0,
            (false, false) => {}
        }
    }

    let precision = if true_positives + false_positives > 0.0 {
        true_positives / (true_positives + false_positives)
    } else {
        0.0
    };
    let recall = if true_positives + false_negatives > 0.0 {
        true_positives / (true_positives + false_negatives)
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Ok(ClassificationMetric {
        f1_score: f1,
        precision_score: precision,
        recall_score: recall,
    })
}
