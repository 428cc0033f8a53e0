//! Low-dimensional views of the gene correlation structure.
//!
//! Both projections treat each gene as one point whose coordinates are its
//! row of `|C|`, the absolute correlation matrix:
//!
//! | Method | Preserves | Output |
//! |--------|-----------|--------|
//! | [`Pca`] | global variance | scores, explained variance, loadings |
//! | [`Tsne`] | local neighbourhoods | scores only |
//!
//! Either can also run k-means on its own output coordinates to color genes
//! by display cluster; the assignment is returned as a
//! [`ClusterAssignment`].

mod pca;
mod space_tree;
mod tsne;

use ndarray::Array2;
use serde::Serialize;
use tracing::debug;

use crate::cluster::{ClusterAssignment, Kmeans};
use crate::correlation::{serialize_rows, CorrelationMatrix};
use crate::error::{Error, Result};

pub use pca::{project_pca, Pca, MAX_SCREE_COMPONENTS};
pub use tsne::{project_neighbor_embedding, Tsne, TsneMode};

/// Genes embedded in a low-dimensional space.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionResult {
    /// Gene per score row.
    pub genes: Vec<String>,
    /// `genes × d` coordinates.
    #[serde(serialize_with = "serialize_rows")]
    pub scores: Array2<f64>,
    /// Explained-variance ratio per scree component (PCA only).
    pub explained_variance: Vec<f64>,
    /// Running sum of `explained_variance`.
    pub cumulative_variance: Vec<f64>,
    /// Loadings of the returned components, one row per component (PCA only).
    pub components: Vec<Vec<f64>>,
    /// Display clusters computed on `scores`, when requested.
    pub clusters: Option<ClusterAssignment>,
}

impl ProjectionResult {
    /// Output dimensionality.
    pub fn n_components(&self) -> usize {
        self.scores.ncols()
    }
}

/// `|C|` with at least two genes.
fn absolute_input(corr: &CorrelationMatrix) -> Result<Array2<f64>> {
    if corr.n_genes() < 2 {
        return Err(Error::DegenerateInput(format!(
            "projection needs at least 2 genes, got {}",
            corr.n_genes()
        )));
    }
    Ok(corr.abs())
}

/// K-means on projected coordinates.
///
/// Coloring needs `2 <= k < n`; any other `k` leaves the projection
/// uncolored instead of failing it.
fn display_clusters(
    scores: &Array2<f64>,
    genes: &[String],
    k: Option<usize>,
    seed: u64,
) -> Result<Option<ClusterAssignment>> {
    let Some(k) = k else {
        return Ok(None);
    };
    let n = scores.nrows();
    if k < 2 || k >= n {
        debug!(k, genes = n, "display clusters skipped");
        return Ok(None);
    }
    let fit = Kmeans::new(k).with_seed(seed).fit(scores)?;
    Ok(Some(ClusterAssignment::from_labels(k, seed, genes, fit.labels)))
}
