//! Internal clustering quality measures.
//!
//! Both measures work without ground truth, which is the situation when
//! choosing k for gene clusters:
//!
//! | Metric | Range | Best | Use |
//! |--------|-------|------|-----|
//! | [`inertia`] | [0, ∞) | lower | elbow method |
//! | [`silhouette_score`] | [-1, 1] | higher | silhouette method |
//!
//! # Silhouette
//!
//! For point i with a = mean distance to the other members of its cluster and
//! b = smallest mean distance to the members of another cluster:
//!
//! ```text
//! s(i) = (b - a) / max(a, b)
//! ```
//!
//! Points in singleton clusters score 0. Distances are Euclidean between
//! feature rows.
//!
//! # References
//!
//! - Rousseeuw (1987). "Silhouettes: a graphical aid to the interpretation and
//!   validation of cluster analysis."

use ndarray::{Array2, ArrayView1};

/// Sum of squared distances from each row to its assigned centroid.
pub fn inertia(data: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &k)| squared_euclidean(&data.row(i), &centroids.row(k)))
        .sum()
}

/// Per-point silhouette values.
///
/// Returns all zeros when fewer than two clusters are populated.
pub fn silhouette_samples(data: &Array2<f64>, labels: &[usize]) -> Vec<f64> {
    let n = data.nrows().min(labels.len());
    let n_clusters = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; n_clusters];
    for &l in &labels[..n] {
        sizes[l] += 1;
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return vec![0.0; n];
    }

    let mut out = Vec::with_capacity(n);
    let mut sums = vec![0.0f64; n_clusters];
    for i in 0..n {
        sums.iter_mut().for_each(|s| *s = 0.0);
        for j in 0..n {
            if i != j {
                sums[labels[j]] += squared_euclidean(&data.row(i), &data.row(j)).sqrt();
            }
        }
        let own = labels[i];
        if sizes[own] <= 1 {
            out.push(0.0);
            continue;
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        out.push(if denom > 0.0 { (b - a) / denom } else { 0.0 });
    }
    out
}

/// Mean silhouette over all points; 0 with fewer than two populated clusters.
pub fn silhouette_score(data: &Array2<f64>, labels: &[usize]) -> f64 {
    let samples = silhouette_samples(data, labels);
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

#[inline]
pub(crate) fn squared_euclidean(a: &ArrayView1<'_, f64>, b: &ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn well_separated_clusters_score_near_one() {
        let data = array![[0.0, 0.0], [0.0, 0.1], [10.0, 10.0], [10.0, 10.1]];
        let s = silhouette_score(&data, &[0, 0, 1, 1]);
        assert!(s > 0.95, "silhouette {s}");
    }

    #[test]
    fn swapped_labels_score_negative() {
        let data = array![[0.0, 0.0], [0.0, 0.1], [10.0, 10.0], [10.0, 10.1]];
        let s = silhouette_score(&data, &[0, 1, 0, 1]);
        assert!(s < 0.0);
    }

    #[test]
    fn single_cluster_scores_zero() {
        let data = array![[0.0], [1.0], [2.0]];
        assert_eq!(silhouette_score(&data, &[0, 0, 0]), 0.0);
    }

    #[test]
    fn singleton_cluster_point_scores_zero() {
        let data = array![[0.0], [0.1], [5.0]];
        let s = silhouette_samples(&data, &[0, 0, 1]);
        assert_eq!(s[2], 0.0);
        assert!(s[0] > 0.9);
    }

    #[test]
    fn inertia_sums_squared_distances() {
        let data = array![[0.0, 0.0], [2.0, 0.0]];
        let centroids = array![[1.0, 0.0]];
        assert!((inertia(&data, &[0, 0], &centroids) - 2.0).abs() < 1e-12);
    }
}
