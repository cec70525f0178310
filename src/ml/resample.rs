use anyhow::{Result, bail};
use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;

const SMOTE_NEIGHBOURS: usize = 5;

/// Corrects class imbalance: minority oversampling by nearest-neighbour
/// interpolation up to the majority count, then Tomek-link cleaning that
/// removes both members of every cross-class mutual-nearest-neighbour pair.
pub fn smote_tomek(
    features: ArrayView2<'_, f64>,
    labels: &[f64],
    rng: &mut StdRng,
) -> Result<(Array2<f64>, Vec<f64>)> {
    if features.nrows() != labels.len() {
        bail!(
            "Feature rows {} do not match label count {}",
            features.nrows(),
            labels.len()
        );
    }

    let mut rows: Vec<Vec<f64>> = features.rows().into_iter().map(|r| r.to_vec()).collect();
    let mut labels = labels.to_vec();

    oversample_minority(&mut rows, &mut labels, rng);
    remove_tomek_links(&mut rows, &mut labels);

    let width = rows.first().map(Vec::len).unwrap_or(0);
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let resampled = Array2::from_shape_vec((labels.len(), width), flat)?;
    Ok((resampled, labels))
}

fn oversample_minority(rows: &mut Vec<Vec<f64>>, labels: &mut Vec<f64>, rng: &mut StdRng) {
    let positives = labels.iter().filter(|&&l| l >= 0.5).count();
    let negatives = labels.len() - positives;
    let (minority_label, minority_count, majority_count) = if positives < negatives {
        (1.0, positives, negatives)
    } else {
        (0.0, negatives, positives)
    };
    if minority_count < 2 || minority_count == majority_count {
        return;
    }

    let minority_indices: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|&(_, &l)| (l >= 0.5) == (minority_label >= 0.5))
        .map(|(i, _)| i)
        .collect();
    let k = SMOTE_NEIGHBOURS.min(minority_count - 1);
    let synthetic_needed = majority_count - minority_count;
    debug!(
        minority = minority_count,
        majority = majority_count,
        synthetic = synthetic_needed,
        "Oversampling minority class"
    );

    for _ in 0..synthetic_needed {
        let anchor = minority_indices[rng.random_range(0..minority_indices.len())];
        let neighbours = nearest_within(rows, anchor, &minority_indices, k);
        let neighbour = neighbours[rng.random_range(0..neighbours.len())];
        let fraction: f64 = rng.random_range(0.0..1.0);
        let synthetic: Vec<f64> = rows[anchor]
            .iter()
            .zip(&rows[neighbour])
            .map(|(a, b)| a + fraction * (b - a))
            .collect();
        rows.push(synthetic);
        labels.push(minority_label);
    }
}

/// Indices of the `k` nearest members of `candidates` to `anchor`,
/// excluding the anchor itself.
fn nearest_within(
    rows: &[Vec<f64>],
    anchor: usize,
    candidates: &[usize],
    k: usize,
) -> Vec<usize> {
    let mut ranked: Vec<(f64, usize)> = candidates
        .iter()
        .filter(|&&i| i != anchor)
        .map(|&i| (squared_distance(&rows[anchor], &rows[i]), i))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.truncate(k.max(1));
    ranked.into_iter().map(|(_, i)| i).collect()
}

fn remove_tomek_links(rows: &mut Vec<Vec<f64>>, labels: &mut Vec<f64>) {
    let n = rows.len();
    if n < 2 {
        return;
    }
    let mut nearest = vec![0usize; n];
    for i in 0..n {
        let mut best = f64::INFINITY;
        for j in 0..n {
            if i == j {
                continue;
            }
            let distance = squared_distance(&rows[i], &rows[j]);
            if distance < best {
                best = distance;
                nearest[i] = j;
            }
        }
    }

    let mut removed = vec![false; n];
    for i in 0..n {
        let j = nearest[i];
        let mutual = nearest[j] == i;
        let cross_class = (labels[i] >= 0.5) != (labels[j] >= 0.5);
        if mutual && cross_class {
            removed[i] = true;
            removed[j] = true;
        }
    }

    let link_members = removed.iter().filter(|&&r| r).count();
    if link_members > 0 {
        debug!(removed = link_members, "Tomek links cleaned");
        let mut kept_rows = Vec::with_capacity(n - link_members);
        let mut kept_labels = Vec::with_capacity(n - link_members);
        for i in 0..n {
            if !removed[i] {
                kept_rows.push(std::mem::take(&mut rows[i]));
                kept_labels.push(labels[i]);
            }
        }
        *rows = kept_rows;
        *labels = kept_labels;
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
