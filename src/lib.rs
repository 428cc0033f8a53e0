//! # ivcca
//!
//! Inter-variability cross correlation analysis: correlate the genes of an
//! expression matrix and read structure off the correlation matrix.
//!
//! | Module | Provides |
//! |--------|----------|
//! | [`dataset`] | validated samples × genes matrix |
//! | [`correlation`] | Pearson / Spearman / Kendall matrices, cross-dataset correlation |
//! | [`ranking`] | genes ranked by aggregate absolute correlation |
//! | [`cluster`] | k-means, optimal-k selection, agglomerative linkage |
//! | [`hierarchy`] | linkage trees and flat cuts |
//! | [`projection`] | PCA and t-SNE (exact / Barnes–Hut) gene maps |
//! | [`pathway`] | PAI, PCI, CECI pathway scores and gene-to-list summaries |
//! | [`network`] | thresholded correlation graphs |
//! | [`session`] | stage-gated pipeline over one or two datasets |
//!
//! ```
//! use ivcca::{compute_correlation, CorrelationMethod, Dataset};
//!
//! let values = vec![
//!     vec![1.0, 2.0, 5.0],
//!     vec![2.0, 4.0, 3.0],
//!     vec![3.0, 6.0, 1.0],
//! ];
//! let samples = vec!["s1".into(), "s2".into(), "s3".into()];
//! let genes = vec!["A".into(), "B".into(), "C".into()];
//! let dataset = Dataset::new(values, samples, genes).unwrap();
//!
//! let corr = compute_correlation(&dataset, CorrelationMethod::Pearson).unwrap();
//! assert!((corr.get("a", "b").unwrap() - 1.0).abs() < 1e-12);
//! assert!((corr.get("A", "C").unwrap() + 1.0).abs() < 1e-12);
//! ```
//!
//! All engines are synchronous and take the correlation matrix by shared
//! reference. Randomized engines take an explicit `u64` seed. The crate
//! logs through `tracing` and never installs a subscriber.

pub mod cluster;
/// TOML-loadable analysis defaults.
pub mod config;
pub mod correlation;
pub mod dataset;
/// Error types used across `ivcca`.
pub mod error;
mod genes;
pub mod hierarchy;
pub mod metrics;
pub mod network;
pub mod pathway;
pub mod projection;
pub mod ranking;
pub mod session;


pub use error::{Error, Result, Stage};
pub use genes::{GeneLookup, Resolved};

pub use cluster::{
    hierarchical_linkage, select_optimal_k, ClusterAssignment, Clustering, HierarchicalClustering,
    KSelectionResult, Kmeans, Linkage,
};
pub use config::AnalysisConfig;
pub use correlation::{
    compute_correlation, cross_dataset_correlation, CorrelationMatrix, CorrelationMethod,
    CrossCorrelationMatrix,
};
pub use dataset::Dataset;
pub use hierarchy::LinkageTree;
pub use metrics::{inertia, silhouette_score};
pub use network::{build_network, NetworkGraph};
pub use pathway::{
    analyze_pathway, compare_two_pathways, gene_to_genes, gene_to_pathways, pathway_overlap,
    score_pathways, Pathway, PathwayScore, PathwayScorer,
};
pub use projection::{project_neighbor_embedding, project_pca, Pca, ProjectionResult, Tsne};
pub use ranking::{rank_genes, Aggregation, RankedGenes};
pub use session::{Analysis, TwoSetAnalysis};
