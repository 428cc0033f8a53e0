//! Clustering genes by their correlation profiles.
//!
//! Both algorithms here work on the same dissimilarity, `d = 1 - |r|`:
//! genes that move together (or exactly against each other) are close.
//!
//! ## K-means
//!
//! The classic algorithm: assign each point to the nearest centroid, then
//! update centroids to the mean of their points. Repeat.
//!
//! **Objective**: Minimize within-cluster sum of squares:
//!
//! ```text
//! J = Σ_k Σ_{x ∈ C_k} ||x - μ_k||²
//! ```
//!
//! Each row of the distance matrix is used as a gene's feature vector. The
//! number of clusters is chosen with [`KSelection`] (elbow and silhouette).
//! K-means also colors projections (see [`crate::projection`]), where it runs
//! on the low-dimensional coordinates instead.
//!
//! ### Hierarchical (Agglomerative) Clustering
//!
//! Bottom-up: start with each gene as its own cluster, repeatedly merge
//! the two closest clusters until one remains. The merge history forms a
//! [`LinkageTree`](crate::hierarchy::LinkageTree) you can cut at any height.
//!
//! ## Usage
//!
//! ```rust
//! use ivcca::cluster::{Clustering, Kmeans};
//!
//! let data = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.0, 10.0],
//!     vec![10.1, 10.1],
//! ];
//!
//! let labels = Kmeans::new(2).with_seed(42).fit_predict(&data).unwrap();
//! assert_eq!(labels[0], labels[1]);  // First two together
//! assert_ne!(labels[0], labels[2]);  // Separate from last two
//! ```

mod hierarchical;
mod kmeans;
mod selection;
mod traits;

use std::collections::BTreeMap;

use serde::Serialize;

pub use hierarchical::{hierarchical_linkage, HierarchicalClustering, Linkage, LinkageInput};
pub use kmeans::{Kmeans, KmeansFit, DEFAULT_SEED};
pub use selection::{select_optimal_k, KSelection, KSelectionResult};
pub use traits::Clustering;

/// Hard assignment of genes to clusters `0..k`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    /// Number of clusters requested.
    pub k: usize,
    /// Seed the assignment was produced with.
    pub seed: u64,
    /// Cluster id per gene, in gene order.
    pub labels: Vec<usize>,
    /// Cluster id to member gene names, in gene order.
    pub members: BTreeMap<usize, Vec<String>>,
}

impl ClusterAssignment {
    /// Group `genes` by `labels`.
    pub fn from_labels(k: usize, seed: u64, genes: &[String], labels: Vec<usize>) -> Self {
        let mut members: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (gene, &label) in genes.iter().zip(&labels) {
            members.entry(label).or_default().push(gene.clone());
        }
        Self {
            k,
            seed,
            labels,
            members,
        }
    }

    /// Members of one cluster.
    pub fn cluster(&self, id: usize) -> &[String] {
        self.members.get(&id).map_or(&[], Vec::as_slice)
    }
}
