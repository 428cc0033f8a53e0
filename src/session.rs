//! Stage-gated analysis sessions.
//!
//! [`Analysis`] carries one dataset through the pipeline:
//!
//! ```text
//! load_dataset ──► compute_correlation ──► rank / cluster / project / pathways / network
//! ```
//!
//! Each step checks that the stage it depends on is present and otherwise
//! fails with [`Error::NotLoaded`] naming that stage. The correlation matrix
//! is held behind an [`Arc`]: readers keep whatever matrix they were handed,
//! and a recomputation swaps in a new one instead of mutating it.
//!
//! [`TwoSetAnalysis`] is the two-dataset counterpart built around
//! [`cross_dataset_correlation`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::cluster::{ClusterAssignment, KSelectionResult, Kmeans};
use crate::config::AnalysisConfig;
use crate::correlation::{
    compute_correlation, cross_dataset_correlation, CorrelationMatrix, CorrelationMethod,
    CrossCorrelationMatrix, CrossRanking,
};
use crate::dataset::Dataset;
use crate::error::{Error, Result, Stage};
use crate::hierarchy::LinkageTree;
use crate::network::{build_network, NetworkGraph};
use crate::pathway::{
    analyze_pathway, compare_two_pathways, gene_to_genes, gene_to_pathways, GenePathwayCorrelation,
    GeneToGenes, Pathway, PathwayAnalysis, PathwayComparison, PathwayScore,
};
use crate::projection::ProjectionResult;
use crate::ranking::{rank_genes, RankedGenes};

/// Single-dataset analysis session.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    config: AnalysisConfig,
    dataset: Option<Dataset>,
    correlation: Option<Arc<CorrelationMatrix>>,
}

impl Analysis {
    /// Empty session with the given defaults.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            dataset: None,
            correlation: None,
        }
    }

    /// Session defaults.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Replace the session defaults. Computed stages are kept.
    pub fn set_config(&mut self, config: AnalysisConfig) {
        self.config = config;
    }

    /// Install a dataset, discarding any correlation computed for the previous one.
    pub fn load_dataset(&mut self, dataset: Dataset) {
        info!(
            genes = dataset.n_genes(),
            samples = dataset.n_samples(),
            "dataset loaded"
        );
        self.dataset = Some(dataset);
        self.correlation = None;
    }

    /// Keep only the listed genes of the loaded dataset.
    pub fn filter_genes<S: AsRef<str>>(&mut self, keep: &[S]) -> Result<()> {
        let filtered = self.dataset()?.filter_genes(keep)?;
        self.load_dataset(filtered);
        Ok(())
    }

    /// Loaded dataset.
    pub fn dataset(&self) -> Result<&Dataset> {
        self.dataset.as_ref().ok_or(Error::NotLoaded {
            stage: Stage::Dataset,
        })
    }

    /// Correlate the loaded dataset with the configured method.
    pub fn compute_correlation(&mut self) -> Result<Arc<CorrelationMatrix>> {
        self.compute_correlation_with(self.config.method)
    }

    /// Correlate the loaded dataset with an explicit method.
    pub fn compute_correlation_with(&mut self, method: CorrelationMethod) -> Result<Arc<CorrelationMatrix>> {
        let matrix = Arc::new(compute_correlation(self.dataset()?, method)?);
        self.correlation = Some(Arc::clone(&matrix));
        Ok(matrix)
    }

    /// Current correlation matrix.
    pub fn correlation(&self) -> Result<Arc<CorrelationMatrix>> {
        self.correlation.clone().ok_or(Error::NotLoaded {
            stage: Stage::Correlation,
        })
    }

    fn corr(&self) -> Result<&CorrelationMatrix> {
        self.correlation.as_deref().ok_or(Error::NotLoaded {
            stage: Stage::Correlation,
        })
    }

    /// Rank genes with the configured aggregation.
    pub fn rank_genes(&self) -> Result<RankedGenes> {
        Ok(rank_genes(self.corr()?, self.config.aggregation))
    }

    /// Correlation matrix with rows and columns in ranking order.
    pub fn sorted_correlation(&self) -> Result<CorrelationMatrix> {
        let corr = self.corr()?;
        rank_genes(corr, self.config.aggregation).sorted_matrix(corr)
    }

    /// Elbow and silhouette choice of k.
    pub fn select_optimal_k(&self) -> Result<KSelectionResult> {
        self.config.k_selection().select(self.corr()?)
    }

    /// k-means over the correlation distance rows.
    ///
    /// A `k` above the gene count is lowered to it (one gene per cluster).
    pub fn kmeans(&self, k: usize) -> Result<ClusterAssignment> {
        let corr = self.corr()?;
        let c = &self.config.clustering;
        let n = corr.n_genes();
        let k = if k > n {
            debug!(requested = k, genes = n, "k lowered to gene count");
            n
        } else {
            k
        };
        let fit = Kmeans::new(k)
            .with_seed(self.config.seed)
            .with_n_init(c.n_init)
            .with_max_iter(c.max_iter)
            .fit(&corr.distance())?;
        Ok(ClusterAssignment::from_labels(
            k,
            self.config.seed,
            corr.genes(),
            fit.labels,
        ))
    }

    /// Agglomerative tree with the configured linkage.
    pub fn hierarchical_linkage(&self) -> Result<LinkageTree> {
        self.config.hierarchical().fit(self.corr()?)
    }

    /// PCA projection, optionally colored by `k` display clusters.
    pub fn project_pca(&self, display_clusters: Option<usize>) -> Result<ProjectionResult> {
        let pca = self.config.pca();
        let pca = match display_clusters {
            Some(k) => pca.with_display_clusters(k),
            None => pca,
        };
        pca.fit(self.corr()?)
    }

    /// t-SNE projection, optionally colored by `k` display clusters.
    pub fn project_tsne(&self, display_clusters: Option<usize>) -> Result<ProjectionResult> {
        let tsne = self.config.tsne();
        let tsne = match display_clusters {
            Some(k) => tsne.with_display_clusters(k),
            None => tsne,
        };
        tsne.fit(self.corr()?)
    }

    /// CECI scores of `pathways`. With `use_ranking`, PCI_B comes from a
    /// dataset-wide ranking computed with the configured aggregation.
    pub fn score_pathways(&self, pathways: &[Pathway], use_ranking: bool) -> Result<Vec<PathwayScore>> {
        let corr = self.corr()?;
        let ranked = use_ranking.then(|| rank_genes(corr, self.config.aggregation));
        Ok(self.config.scorer().score(corr, pathways, ranked.as_ref()))
    }

    /// Rank one pathway's genes by internal cohesion.
    pub fn analyze_pathway<S: AsRef<str>>(&self, genes: &[S]) -> Result<PathwayAnalysis> {
        analyze_pathway(self.corr()?, genes)
    }

    /// Compare two pathways.
    pub fn compare_two_pathways<S: AsRef<str>>(&self, first: &[S], second: &[S]) -> Result<PathwayComparison> {
        compare_two_pathways(self.corr()?, first, second)
    }

    /// Correlations of one gene with a gene list.
    pub fn gene_to_genes<S: AsRef<str>>(&self, gene: &str, targets: &[S]) -> Result<GeneToGenes> {
        gene_to_genes(self.corr()?, gene, targets)
    }

    /// Mean correlation of one gene with each pathway.
    pub fn gene_to_pathways(&self, gene: &str, pathways: &[Pathway]) -> Result<Vec<GenePathwayCorrelation>> {
        gene_to_pathways(self.corr()?, gene, pathways)
    }

    /// Network at the configured threshold, optionally over a gene subset.
    pub fn build_network<S: AsRef<str>>(&self, gene_subset: Option<&[S]>) -> Result<NetworkGraph> {
        build_network(self.corr()?, self.config.network.threshold, gene_subset)
    }
}

/// Two-dataset cross-correlation session.
#[derive(Debug, Clone, Default)]
pub struct TwoSetAnalysis {
    config: AnalysisConfig,
    first: Option<Dataset>,
    second: Option<Dataset>,
    correlation: Option<Arc<CrossCorrelationMatrix>>,
}

impl TwoSetAnalysis {
    /// Empty session with the given defaults.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            first: None,
            second: None,
            correlation: None,
        }
    }

    /// Install the first dataset; drops any cross-correlation.
    pub fn load_first(&mut self, dataset: Dataset) {
        self.first = Some(dataset);
        self.correlation = None;
    }

    /// Install the second dataset; drops any cross-correlation.
    pub fn load_second(&mut self, dataset: Dataset) {
        self.second = Some(dataset);
        self.correlation = None;
    }

    /// Correlate every gene of the first dataset with every gene of the second.
    pub fn compute_correlation(&mut self) -> Result<Arc<CrossCorrelationMatrix>> {
        let (Some(a), Some(b)) = (self.first.as_ref(), self.second.as_ref()) else {
            return Err(Error::NotLoaded {
                stage: Stage::Dataset,
            });
        };
        let matrix = Arc::new(cross_dataset_correlation(a, b)?);
        self.correlation = Some(Arc::clone(&matrix));
        Ok(matrix)
    }

    /// Current cross-correlation matrix.
    pub fn correlation(&self) -> Result<Arc<CrossCorrelationMatrix>> {
        self.correlation.clone().ok_or(Error::NotLoaded {
            stage: Stage::Correlation,
        })
    }

    /// Rank both gene axes with the configured aggregation.
    pub fn rank(&self) -> Result<CrossRanking> {
        Ok(self.correlation()?.rank(self.config.aggregation))
    }
}
