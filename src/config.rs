//! Analysis defaults, loadable from TOML.
//!
//! Every field has a default, so an empty document is a valid configuration
//! and a partial one only overrides what it names:
//!
//! ```toml
//! seed = 7
//!
//! [clustering]
//! max_k = 12
//! linkage = "average"
//!
//! [tsne]
//! perplexity = 15.0
//! ```

use serde::{Deserialize, Serialize};

use crate::cluster::{HierarchicalClustering, KSelection, Linkage, DEFAULT_SEED};
use crate::correlation::CorrelationMethod;
use crate::error::{Error, Result};
use crate::network::DEFAULT_THRESHOLD;
use crate::pathway::{CeciCalibration, PathwayScorer};
use crate::projection::{Pca, Tsne, MAX_SCREE_COMPONENTS};
use crate::ranking::Aggregation;

/// User-facing defaults for a whole analysis session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Correlation coefficient.
    #[serde(default)]
    pub method: CorrelationMethod,
    /// Ranking reduction.
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Seed shared by every randomized engine.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub pca: PcaConfig,
    #[serde(default)]
    pub tsne: TsneConfig,
    #[serde(default)]
    pub pathway: PathwayConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

/// k-means, k-selection and linkage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_n_init")]
    pub n_init: usize,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default)]
    pub linkage: Linkage,
}

/// PCA projection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaConfig {
    #[serde(default = "default_pca_components")]
    pub n_components: usize,
    #[serde(default = "default_scree_components")]
    pub scree_components: usize,
}

/// t-SNE settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsneConfig {
    #[serde(default = "default_tsne_components")]
    pub n_components: usize,
    #[serde(default = "default_perplexity")]
    pub perplexity: f64,
    #[serde(default = "default_tsne_iter")]
    pub max_iter: usize,
    #[serde(default = "default_patience")]
    pub patience: usize,
    /// Below this many genes the gradient is computed exactly.
    #[serde(default = "default_exact_threshold")]
    pub exact_threshold: usize,
    #[serde(default = "default_theta")]
    pub theta: f64,
}

/// Pathway scoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayConfig {
    #[serde(default = "default_min_genes")]
    pub min_genes: usize,
    #[serde(default)]
    pub calibration: CeciCalibration,
}

/// Correlation network settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_seed() -> u64 { DEFAULT_SEED }
fn default_max_k() -> usize { 10 }
fn default_n_init() -> usize { 10 }
fn default_max_iter() -> usize { 300 }
fn default_pca_components() -> usize { 3 }
fn default_scree_components() -> usize { MAX_SCREE_COMPONENTS }
fn default_tsne_components() -> usize { 2 }
fn default_perplexity() -> f64 { 30.0 }
fn default_tsne_iter() -> usize { 1000 }
fn default_patience() -> usize { 300 }
fn default_exact_threshold() -> usize { 1000 }
fn default_theta() -> f64 { 0.5 }
fn default_min_genes() -> usize { 5 }
fn default_threshold() -> f64 { DEFAULT_THRESHOLD }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::default(),
            aggregation: Aggregation::default(),
            seed: default_seed(),
            clustering: ClusteringConfig::default(),
            pca: PcaConfig::default(),
            tsne: TsneConfig::default(),
            pathway: PathwayConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_k: default_max_k(),
            n_init: default_n_init(),
            max_iter: default_max_iter(),
            linkage: Linkage::default(),
        }
    }
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: default_pca_components(),
            scree_components: default_scree_components(),
        }
    }
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            n_components: default_tsne_components(),
            perplexity: default_perplexity(),
            max_iter: default_tsne_iter(),
            patience: default_patience(),
            exact_threshold: default_exact_threshold(),
            theta: default_theta(),
        }
    }
}

impl Default for PathwayConfig {
    fn default() -> Self {
        Self {
            min_genes: default_min_genes(),
            calibration: CeciCalibration::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| Error::Config(err.to_string()))
    }

    /// Reject values no engine can run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.clustering;
        if c.max_k < 2 {
            return Err(invalid("clustering.max_k must be at least 2"));
        }
        if c.n_init == 0 || c.max_iter == 0 {
            return Err(invalid("clustering.n_init and clustering.max_iter must be positive"));
        }

        if self.pca.n_components == 0 {
            return Err(invalid("pca.n_components must be at least 1"));
        }
        if self.pca.scree_components == 0 || self.pca.scree_components > MAX_SCREE_COMPONENTS {
            return Err(invalid(&format!(
                "pca.scree_components must be between 1 and {MAX_SCREE_COMPONENTS}"
            )));
        }

        let t = &self.tsne;
        if !(1..=3).contains(&t.n_components) {
            return Err(invalid("tsne.n_components must be 1, 2 or 3"));
        }
        if t.perplexity.is_nan() || t.perplexity <= 0.0 {
            return Err(invalid("tsne.perplexity must be positive"));
        }
        if t.theta.is_nan() || t.theta < 0.0 {
            return Err(invalid("tsne.theta must be non-negative"));
        }
        if t.max_iter == 0 {
            return Err(invalid("tsne.max_iter must be positive"));
        }

        let cal = &self.pathway.calibration;
        if !cal.std.is_finite() || cal.std <= 0.0 || !cal.mean.is_finite() {
            return Err(invalid("pathway.calibration needs a finite mean and a positive std"));
        }

        if !(0.0..=1.0).contains(&self.network.threshold) {
            return Err(invalid("network.threshold must be within [0, 1]"));
        }
        Ok(())
    }

    /// k-selection engine with this configuration's budget and seed.
    pub fn k_selection(&self) -> KSelection {
        KSelection::new(self.clustering.max_k)
            .with_seed(self.seed)
            .with_n_init(self.clustering.n_init)
            .with_max_iter(self.clustering.max_iter)
    }

    /// Hierarchical clustering with the configured linkage.
    pub fn hierarchical(&self) -> HierarchicalClustering {
        HierarchicalClustering::new(self.clustering.linkage)
    }

    /// PCA engine.
    pub fn pca(&self) -> Pca {
        Pca::new(self.pca.n_components)
            .with_scree_components(self.pca.scree_components)
            .with_seed(self.seed)
    }

    /// t-SNE engine.
    pub fn tsne(&self) -> Tsne {
        let t = &self.tsne;
        Tsne::new(t.n_components)
            .with_perplexity(t.perplexity)
            .with_max_iter(t.max_iter)
            .with_patience(t.patience)
            .with_exact_threshold(t.exact_threshold)
            .with_theta(t.theta)
            .with_seed(self.seed)
    }

    /// Pathway scorer.
    pub fn scorer(&self) -> PathwayScorer {
        PathwayScorer::new()
            .with_min_genes(self.pathway.min_genes)
            .with_calibration(self.pathway.calibration)
    }
}

fn invalid(message: &str) -> Error {
    Error::Config(message.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.method, CorrelationMethod::Pearson);
        assert_eq!(config.aggregation, Aggregation::Mean);
        assert_eq!(config.seed, 42);
        assert_eq!(config.clustering.max_k, 10);
        assert_eq!(config.clustering.n_init, 10);
        assert_eq!(config.clustering.max_iter, 300);
        assert_eq!(config.clustering.linkage, Linkage::Ward);
        assert_eq!(config.pca.n_components, 3);
        assert_eq!(config.pca.scree_components, 25);
        assert_eq!(config.tsne.n_components, 2);
        assert_eq!(config.tsne.perplexity, 30.0);
        assert_eq!(config.tsne.max_iter, 1000);
        assert_eq!(config.tsne.patience, 300);
        assert_eq!(config.tsne.exact_threshold, 1000);
        assert_eq!(config.tsne.theta, 0.5);
        assert_eq!(config.pathway.min_genes, 5);
        assert_eq!(config.pathway.calibration.mean, 7.908);
        assert_eq!(config.pathway.calibration.std, 2.0605);
        assert_eq!(config.network.threshold, 0.75);
    }

    #[test]
    fn partial_document_overrides_named_fields() {
        let text = r#"
            method = "spearman"
            aggregation = "max"
            seed = 7

            [clustering]
            max_k = 12
            linkage = "average"

            [tsne]
            perplexity = 15.0

            [pathway.calibration]
            mean = 5.0
        "#;
        let config = AnalysisConfig::from_toml_str(text).unwrap();
        assert_eq!(config.method, CorrelationMethod::Spearman);
        assert_eq!(config.aggregation, Aggregation::Max);
        assert_eq!(config.seed, 7);
        assert_eq!(config.clustering.max_k, 12);
        assert_eq!(config.clustering.n_init, 10);
        assert_eq!(config.clustering.linkage, Linkage::Average);
        assert_eq!(config.tsne.perplexity, 15.0);
        assert_eq!(config.tsne.n_components, 2);
        assert_eq!(config.pathway.calibration.mean, 5.0);
        assert_eq!(config.pathway.calibration.std, 2.0605);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for text in [
            "[clustering]\nmax_k = 1",
            "[pca]\nscree_components = 30",
            "[tsne]\nn_components = 4",
            "[tsne]\nperplexity = -1.0",
            "[network]\nthreshold = 1.5",
            "[pathway.calibration]\nstd = 0.0",
            "method = \"cosine\"",
            "seed = \"abc\"",
        ] {
            assert!(
                matches!(AnalysisConfig::from_toml_str(text), Err(Error::Config(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn toml_round_trip() {
        let mut config = AnalysisConfig::default();
        config.network.threshold = 0.6;
        config.clustering.linkage = Linkage::Complete;
        let text = config.to_toml_string().unwrap();
        assert_eq!(AnalysisConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn engines_pick_up_configured_values() {
        let config = AnalysisConfig::from_toml_str("[tsne]\nexact_threshold = 10").unwrap();
        let tsne = config.tsne();
        assert_eq!(tsne.mode_for(9), crate::projection::TsneMode::Exact);
        assert_eq!(tsne.mode_for(10), crate::projection::TsneMode::BarnesHut);
    }
}
