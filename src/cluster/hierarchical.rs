//! Hierarchical (agglomerative) clustering of genes.
//!
//! Bottom-up clustering that builds a **dendrogram** by iteratively
//! merging the closest clusters. Unlike K-means, you don't need to specify
//! k in advance: cut the tree at any height.
//!
//! # Linkage Methods
//!
//! The key choice: how do we define "distance between clusters"?
//!
//! | Linkage | Formula | Effect |
//! |---------|---------|--------|
//! | Single | min(d(a,b)) for a∈A, b∈B | Chaining; elongated clusters |
//! | Complete | max(d(a,b)) | Compact, spherical clusters |
//! | Average | mean(d(a,b)) | Balanced compromise |
//! | Ward | Δ variance | Minimizes within-cluster variance |
//!
//! ## Ward's Method: Variance Minimization
//!
//! ```text
//! Δ(A,B) = (nₐ × nᵦ)/(nₐ + nᵦ) × ||μₐ - μᵦ||²
//! ```
//!
//! Ward assumes Euclidean dissimilarities. With [`LinkageInput::DistanceRows`]
//! (the default) each row of the `1 - |r|` matrix is treated as one gene's
//! feature vector and the dissimilarity is the Euclidean distance between
//! rows, which keeps Ward well defined. [`LinkageInput::Precomputed`] feeds
//! `1 - |r|` to the linkage unchanged.

use std::str::FromStr;

use kodama::{linkage as kodama_linkage, Method as KodamaMethod};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::kmeans::rows_to_array;
use super::traits::Clustering;
use crate::correlation::CorrelationMatrix;
use crate::error::{Error, Result};
use crate::hierarchy::LinkageTree;
use crate::metrics::squared_euclidean;

/// Linkage method for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Single linkage: minimum distance between clusters.
    Single,
    /// Complete linkage: maximum distance between clusters.
    Complete,
    /// Average linkage: mean distance between clusters.
    Average,
    /// Ward's method: minimize within-cluster variance.
    #[default]
    Ward,
}

impl Linkage {
    fn kodama(self) -> KodamaMethod {
        match self {
            Linkage::Single => KodamaMethod::Single,
            Linkage::Complete => KodamaMethod::Complete,
            Linkage::Average => KodamaMethod::Average,
            Linkage::Ward => KodamaMethod::Ward,
        }
    }
}

impl FromStr for Linkage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "complete" => Ok(Self::Complete),
            "average" => Ok(Self::Average),
            "ward" => Ok(Self::Ward),
            _ => Err(Error::InvalidParameter {
                name: "linkage",
                message: "expected single, complete, average or ward",
            }),
        }
    }
}

/// How the correlation-derived distance matrix enters the linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageInput {
    /// Rows of `1 - |r|` are observations; Euclidean distance between rows.
    #[default]
    DistanceRows,
    /// `1 - |r|` used directly as the dissimilarity.
    Precomputed,
}

/// Hierarchical (agglomerative) clustering.
#[derive(Debug, Clone)]
pub struct HierarchicalClustering {
    /// Number of clusters produced by [`Clustering::fit_predict`].
    n_clusters: usize,
    /// Linkage method.
    linkage: Linkage,
    input: LinkageInput,
}

impl HierarchicalClustering {
    /// Create a new hierarchical clusterer.
    pub fn new(linkage: Linkage) -> Self {
        Self {
            n_clusters: 2,
            linkage,
            input: LinkageInput::default(),
        }
    }

    /// Set how the distance matrix is interpreted.
    pub fn with_input(mut self, input: LinkageInput) -> Self {
        self.input = input;
        self
    }

    /// Set the flat cluster count used by [`Clustering::fit_predict`].
    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    /// Linkage tree over the genes of a correlation matrix.
    pub fn fit(&self, corr: &CorrelationMatrix) -> Result<LinkageTree> {
        let n = corr.n_genes();
        if n < 2 {
            return Err(Error::DegenerateInput(format!(
                "hierarchical linkage needs at least 2 genes, got {n}"
            )));
        }

        let distance = corr.distance();
        let condensed = match self.input {
            LinkageInput::DistanceRows => condensed_euclidean(&distance),
            LinkageInput::Precomputed => {
                let mut out = Vec::with_capacity(n * (n - 1) / 2);
                for i in 0..n - 1 {
                    for j in i + 1..n {
                        out.push(distance[[i, j]]);
                    }
                }
                out
            }
        };

        let tree = self.link(condensed, corr.genes().to_vec());
        debug!(
            genes = n,
            linkage = ?self.linkage,
            input = ?self.input,
            "hierarchical linkage computed"
        );
        Ok(tree)
    }

    /// Linkage tree over arbitrary feature rows (Euclidean distances).
    pub fn fit_rows(&self, data: &[Vec<f64>]) -> Result<LinkageTree> {
        let data = rows_to_array(data)?;
        let labels = (0..data.nrows()).map(|i| i.to_string()).collect();
        Ok(self.link(condensed_euclidean(&data), labels))
    }

    fn link(&self, mut condensed: Vec<f64>, labels: Vec<String>) -> LinkageTree {
        let n = labels.len();
        let mut tree = LinkageTree::new(labels);
        if n < 2 {
            return tree;
        }

        // kodama's dendrogram uses SciPy/MATLAB-style cluster labels:
        // - leaves: 0..n-1
        // - each merge i creates cluster id n+i
        let dend = kodama_linkage(&mut condensed, n, self.linkage.kodama());
        for step in dend.steps() {
            tree.add_merge(step.cluster1, step.cluster2, step.dissimilarity, step.size);
        }
        tree
    }
}

impl Clustering for HierarchicalClustering {
    fn fit_predict(&self, data: &[Vec<f64>]) -> Result<Vec<usize>> {
        self.fit_rows(data)?.cut_to_k(self.n_clusters)
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }
}

/// Linkage tree of a correlation matrix with the default row-wise input.
pub fn hierarchical_linkage(corr: &CorrelationMatrix, method: Linkage) -> Result<LinkageTree> {
    HierarchicalClustering::new(method).fit(corr)
}

/// Condensed (upper triangle, row-major) Euclidean distances between rows.
fn condensed_euclidean(data: &Array2<f64>) -> Vec<f64> {
    let n = data.nrows();
    let mut condensed = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for row in 0..n.saturating_sub(1) {
        for col in (row + 1)..n {
            condensed.push(squared_euclidean(&data.row(row), &data.row(col)).sqrt());
        }
    }
    condensed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationMethod;
    use ndarray::array;

    fn blocks() -> CorrelationMatrix {
        // {a, b} and {c, d} strongly correlated within, weakly across
        let values = array![
            [1.0, 0.95, 0.1, 0.05],
            [0.95, 1.0, 0.0, 0.1],
            [0.1, 0.0, 1.0, -0.9],
            [0.05, 0.1, -0.9, 1.0],
        ];
        let genes = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        CorrelationMatrix::new(genes, values, CorrelationMethod::Pearson).unwrap()
    }

    #[test]
    fn test_hierarchical_basic() {
        let data = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.1],
        ];

        let hc = HierarchicalClustering::new(Linkage::Average).with_n_clusters(2);
        let labels = hc.fit_predict(&data).unwrap();

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_linkage_tree_shape() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![10.0, 0.0]];

        let tree = HierarchicalClustering::new(Linkage::Single)
            .fit_rows(&data)
            .unwrap();

        assert_eq!(tree.n_items(), 3);
        assert_eq!(tree.n_merges(), 2);
        assert!((tree.distances()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlated_blocks_merge_first_for_every_method() {
        let corr = blocks();
        for method in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            for input in [LinkageInput::DistanceRows, LinkageInput::Precomputed] {
                let tree = HierarchicalClustering::new(method)
                    .with_input(input)
                    .fit(&corr)
                    .unwrap();
                let labels = tree.cut_to_k(2).unwrap();
                assert_eq!(labels, vec![0, 0, 1, 1], "{method:?} {input:?}");
                let heights = tree.distances();
                assert!(heights.windows(2).all(|w| w[0] <= w[1] + 1e-12));
            }
        }
    }

    #[test]
    fn tree_carries_gene_labels() {
        let tree = hierarchical_linkage(&blocks(), Linkage::Ward).unwrap();
        assert_eq!(tree.labels()[2], "c");
        assert_eq!(tree.linkage_rows().len(), 3);
    }

    #[test]
    fn single_gene_is_degenerate() {
        let corr =
            CorrelationMatrix::new(vec!["a".into()], array![[1.0]], CorrelationMethod::Pearson)
                .unwrap();
        assert!(matches!(
            hierarchical_linkage(&corr, Linkage::Ward),
            Err(Error::DegenerateInput(_))
        ));
    }

    #[test]
    fn linkage_parses_from_str() {
        assert_eq!("Ward".parse::<Linkage>().unwrap(), Linkage::Ward);
        assert!("median".parse::<Linkage>().is_err());
    }
}
