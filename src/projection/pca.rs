//! Principal component projection of genes.
//!
//! # Method
//!
//! With `X = |C|` (one row per gene) and `Xc` its column-centered copy:
//!
//! ```text
//! Σ = Xcᵀ Xc / (n - 1)        covariance of the correlation profiles
//! Σ = V Λ Vᵀ                  eigendecomposition, λ₁ ≥ λ₂ ≥ …
//! scores = Xc V[:, :d]
//! ratio_k = λ_k / Σ λ
//! ```
//!
//! One decomposition serves both the scree curve (up to
//! [`MAX_SCREE_COMPONENTS`] ratios) and the 2-3 plotted components, so the
//! two are always consistent.
//!
//! Eigenvectors are only defined up to sign; each component is flipped so
//! that its largest-magnitude loading is positive, which makes repeated runs
//! and different platforms agree.

use faer::{Mat, Side};
use ndarray::Array2;
use tracing::debug;

use super::{absolute_input, display_clusters, ProjectionResult};
use crate::cluster::DEFAULT_SEED;
use crate::correlation::CorrelationMatrix;
use crate::error::{Error, Result};

/// Upper bound on explained-variance ratios reported for the scree curve.
pub const MAX_SCREE_COMPONENTS: usize = 25;

/// PCA over the absolute correlation matrix.
#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
    scree_components: usize,
    display_clusters: Option<usize>,
    seed: u64,
}

/// Descending eigenpairs of a centered covariance.
pub(crate) struct Decomposition {
    centered: Array2<f64>,
    /// Eigenvalues, descending, clamped at 0.
    values: Vec<f64>,
    /// Eigenvectors, one per entry of `values`.
    vectors: Vec<Vec<f64>>,
}

impl Decomposition {
    /// Center `x` by column and decompose its covariance.
    pub(crate) fn new(x: &Array2<f64>) -> Result<Self> {
        let (n, d) = x.dim();
        if n < 2 || d == 0 {
            return Err(Error::DegenerateInput(format!(
                "PCA needs at least 2 points, got {n}"
            )));
        }

        let mut centered = x.clone();
        for mut col in centered.columns_mut() {
            let mean = col.sum() / n as f64;
            col.mapv_inplace(|v| v - mean);
        }

        let cov = centered.t().dot(&centered) / (n - 1) as f64;
        let cov = Mat::from_fn(d, d, |i, j| cov[[i, j]]);
        let eig = cov
            .as_ref()
            .self_adjoint_eigen(Side::Lower)
            .map_err(|err| Error::Decomposition(format!("{err:?}")))?;
        let diag = eig.S();
        let basis = eig.U();

        // faer returns eigenvalues in nondecreasing order.
        let mut values = Vec::with_capacity(d);
        let mut vectors = Vec::with_capacity(d);
        for idx in (0..d).rev() {
            values.push(diag[idx].max(0.0));
            let mut v: Vec<f64> = (0..d).map(|row| basis[(row, idx)]).collect();
            let pivot = v
                .iter()
                .copied()
                .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
            if pivot < 0.0 {
                v.iter_mut().for_each(|x| *x = -*x);
            }
            vectors.push(v);
        }

        Ok(Self {
            centered,
            values,
            vectors,
        })
    }

    /// Explained-variance ratio of the first `k` components.
    pub(crate) fn ratios(&self, k: usize) -> Vec<f64> {
        let total: f64 = self.values.iter().sum();
        self.values
            .iter()
            .take(k)
            .map(|&v| if total > 0.0 { v / total } else { 0.0 })
            .collect()
    }

    /// Projection of every point onto the first `k` components.
    pub(crate) fn scores(&self, k: usize) -> Array2<f64> {
        let k = k.min(self.vectors.len());
        let n = self.centered.nrows();
        Array2::from_shape_fn((n, k), |(i, c)| {
            self.centered
                .row(i)
                .iter()
                .zip(&self.vectors[c])
                .map(|(x, v)| x * v)
                .sum()
        })
    }
}

impl Pca {
    /// Project onto `n_components` principal components.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            scree_components: MAX_SCREE_COMPONENTS,
            display_clusters: None,
            seed: DEFAULT_SEED,
        }
    }

    /// Number of explained-variance ratios to report (at most 25).
    pub fn with_scree_components(mut self, scree_components: usize) -> Self {
        self.scree_components = scree_components;
        self
    }

    /// Run k-means with `k` clusters on the projected scores.
    pub fn with_display_clusters(mut self, k: usize) -> Self {
        self.display_clusters = Some(k);
        self
    }

    /// Set seed for display clustering.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Project the genes of `corr`.
    pub fn fit(&self, corr: &CorrelationMatrix) -> Result<ProjectionResult> {
        if self.n_components == 0 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be at least 1",
            });
        }
        if self.scree_components == 0 || self.scree_components > MAX_SCREE_COMPONENTS {
            return Err(Error::InvalidParameter {
                name: "scree_components",
                message: "must be between 1 and 25",
            });
        }

        let x = absolute_input(corr)?;
        let n = x.nrows();
        let decomposition = Decomposition::new(&x)?;

        let explained_variance = decomposition.ratios(self.scree_components.min(n));
        let cumulative_variance = explained_variance
            .iter()
            .scan(0.0, |acc, r| {
                *acc += r;
                Some(*acc)
            })
            .collect();

        let k = self.n_components.min(n);
        let scores = decomposition.scores(k);
        let components = decomposition.vectors[..k].to_vec();
        let clusters = display_clusters(&scores, corr.genes(), self.display_clusters, self.seed)?;

        debug!(
            genes = n,
            components = k,
            first_ratio = explained_variance.first().copied().unwrap_or(0.0),
            "PCA projection computed"
        );

        Ok(ProjectionResult {
            genes: corr.genes().to_vec(),
            scores,
            explained_variance,
            cumulative_variance,
            components,
            clusters,
        })
    }
}

/// PCA projection with `n_components` scores and `scree_components` ratios.
pub fn project_pca(
    corr: &CorrelationMatrix,
    n_components: usize,
    scree_components: usize,
) -> Result<ProjectionResult> {
    Pca::new(n_components)
        .with_scree_components(scree_components)
        .fit(corr)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationMethod;

    fn two_blocks(per_block: usize) -> CorrelationMatrix {
        let n = per_block * 2;
        let values = Array2::from_shape_fn((n, n), |(i, j)| {
            let same = i / per_block == j / per_block;
            let jitter = ((i * 7 + j * 7) % 5) as f64 * 0.01;
            if same {
                0.85 + jitter
            } else {
                0.1 - jitter
            }
        });
        let genes = (0..n).map(|i| format!("g{i}")).collect();
        CorrelationMatrix::new(genes, values, CorrelationMethod::Pearson).unwrap()
    }

    #[test]
    fn explained_variance_is_a_partial_distribution() {
        let result = project_pca(&two_blocks(5), 3, 25).unwrap();
        // 10 genes: at most 10 ratios
        assert_eq!(result.explained_variance.len(), 10);
        assert!(result.explained_variance.iter().all(|&r| r >= 0.0));
        let total: f64 = result.explained_variance.iter().sum();
        assert!(total <= 1.0 + 1e-9);
        assert!(result
            .explained_variance
            .windows(2)
            .all(|w| w[0] >= w[1] - 1e-12));
        let last = *result.cumulative_variance.last().unwrap();
        assert!((last - total).abs() < 1e-12);
    }

    #[test]
    fn first_component_separates_blocks() {
        let result = project_pca(&two_blocks(4), 2, 25).unwrap();
        assert_eq!(result.scores.dim(), (8, 2));
        assert!(result.explained_variance[0] > 0.8);
        let pc1 = result.scores.column(0);
        let left = pc1[0].signum();
        assert!((0..4).all(|i| pc1[i].signum() == left));
        assert!((4..8).all(|i| pc1[i].signum() == -left));
    }

    #[test]
    fn repeated_fits_are_identical() {
        let corr = two_blocks(5);
        let a = project_pca(&corr, 3, 10).unwrap();
        let b = project_pca(&corr, 3, 10).unwrap();
        assert_eq!(a.scores, b.scores);
        assert_eq!(a.components, b.components);
    }

    #[test]
    fn largest_loading_is_positive() {
        let result = project_pca(&two_blocks(3), 3, 25).unwrap();
        for component in &result.components {
            let pivot = component
                .iter()
                .copied()
                .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
            assert!(pivot > 0.0);
        }
    }

    #[test]
    fn display_clusters_follow_blocks() {
        let result = Pca::new(3)
            .with_display_clusters(2)
            .with_seed(42)
            .fit(&two_blocks(4))
            .unwrap();
        let clusters = result.clusters.unwrap();
        assert_eq!(clusters.members.len(), 2);
        let first = clusters.labels[0];
        assert!(clusters.labels[..4].iter().all(|&l| l == first));
        assert!(clusters.labels[4..].iter().all(|&l| l != first));
    }

    #[test]
    fn oversized_display_clusters_keep_projection() {
        let corr = two_blocks(2);
        let small = CorrelationMatrix::new(
            corr.genes()[..3].to_vec(),
            corr.values().slice(ndarray::s![..3, ..3]).to_owned(),
            CorrelationMethod::Pearson,
        )
        .unwrap();
        for k in [0, 1, 3, 5] {
            let result = Pca::new(2).with_display_clusters(k).fit(&small).unwrap();
            assert_eq!(result.scores.nrows(), 3);
            assert!(result.clusters.is_none(), "k = {k}");
        }
        let result = Pca::new(2).with_display_clusters(2).fit(&small).unwrap();
        assert_eq!(result.clusters.unwrap().labels.len(), 3);
    }

    #[test]
    fn rejects_bad_parameters() {
        let corr = two_blocks(2);
        assert!(project_pca(&corr, 0, 25).is_err());
        assert!(project_pca(&corr, 2, 26).is_err());
        let single = CorrelationMatrix::new(
            vec!["a".into()],
            Array2::eye(1),
            CorrelationMethod::Pearson,
        )
        .unwrap();
        assert!(matches!(
            project_pca(&single, 2, 25),
            Err(Error::DegenerateInput(_))
        ));
    }

    #[test]
    fn scores_serialize_as_nested_rows() {
        let result = project_pca(&two_blocks(2), 2, 25).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["scores"].as_array().unwrap().len(), 4);
        assert_eq!(json["scores"][0].as_array().unwrap().len(), 2);
    }
}
