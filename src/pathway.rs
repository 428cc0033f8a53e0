//! Pathway-level correlation scores.
//!
//! A pathway is a named list of gene names, matched case-insensitively
//! against the dataset. Duplicate matches collapse to one gene.
//!
//! # Composite index
//!
//! | Score | Definition |
//! |-------|------------|
//! | PAI | distinct genes found / distinct genes listed |
//! | PCI_A | mean over pathway genes of their mean `|r|` to the other pathway genes |
//! | PCI_B | mean dataset-wide ranking score of the pathway genes (optional) |
//! | CECI | `PAI × (PCI_B or PCI_A) × 100` |
//! | z | `(CECI - μ) / σ`, with calibration μ = 7.908, σ = 2.0605 by default |
//!
//! PCI_B reuses a [`RankedGenes`] computed over the whole dataset, so a
//! pathway scores high when its genes are strongly connected to anything,
//! not only to each other.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::correlation::CorrelationMatrix;
use crate::error::{Error, Result};
use crate::genes::{fold, Resolved};
use crate::ranking::{descending_order, rank_genes, Aggregation, RankedGenes};

/// A named gene list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pathway {
    /// Pathway identifier (usually the source file name).
    pub name: String,
    /// Listed gene names, any casing.
    pub genes: Vec<String>,
}

impl Pathway {
    /// Create a pathway.
    pub fn new<S: Into<String>>(name: impl Into<String>, genes: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            genes: genes.into_iter().map(Into::into).collect(),
        }
    }

    /// Distinct non-empty names after case folding.
    pub fn distinct_genes(&self) -> usize {
        distinct_folded(&self.genes)
    }
}

/// Calibration of the CECI z-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeciCalibration {
    /// Reference mean of CECI.
    pub mean: f64,
    /// Reference standard deviation of CECI.
    pub std: f64,
}

impl Default for CeciCalibration {
    fn default() -> Self {
        Self {
            mean: 7.908,
            std: 2.0605,
        }
    }
}

impl CeciCalibration {
    /// Standardize a CECI value.
    pub fn z_score(&self, ceci: f64) -> f64 {
        (ceci - self.mean) / self.std
    }
}

/// Composite scores of one pathway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathwayScore {
    /// Pathway identifier.
    pub pathway: String,
    /// Distinct genes found in the dataset.
    pub genes_found: usize,
    /// Distinct genes listed.
    pub total_genes: usize,
    /// Coverage ratio.
    pub pai: f64,
    /// Internal cohesion; `None` with fewer than two genes found.
    pub pci_a: Option<f64>,
    /// Cohesion from a dataset-wide ranking, when one was supplied.
    pub pci_b: Option<f64>,
    /// Composite index; `None` when no cohesion is defined.
    pub ceci: Option<f64>,
    /// Calibrated CECI.
    pub z_score: Option<f64>,
}

/// Multi-pathway CECI scoring.
#[derive(Debug, Clone)]
pub struct PathwayScorer {
    min_genes: usize,
    calibration: CeciCalibration,
}

impl Default for PathwayScorer {
    fn default() -> Self {
        Self {
            min_genes: 5,
            calibration: CeciCalibration::default(),
        }
    }
}

impl PathwayScorer {
    /// Scorer with default threshold (5 genes) and calibration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip pathways with fewer matched genes than this.
    pub fn with_min_genes(mut self, min_genes: usize) -> Self {
        self.min_genes = min_genes;
        self
    }

    /// Set z-score calibration.
    pub fn with_calibration(mut self, calibration: CeciCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Score every pathway with enough matched genes, sorted by CECI
    /// descending (undefined CECI last).
    pub fn score(
        &self,
        corr: &CorrelationMatrix,
        pathways: &[Pathway],
        ranked: Option<&RankedGenes>,
    ) -> Vec<PathwayScore> {
        let ranking = ranked.map(RankedGenes::score_map);
        let mut scores = Vec::with_capacity(pathways.len());

        for pathway in pathways {
            let resolved = corr.lookup().resolve(&pathway.genes);
            if resolved.found() < self.min_genes {
                debug!(
                    pathway = %pathway.name,
                    found = resolved.found(),
                    min_genes = self.min_genes,
                    "pathway skipped"
                );
                continue;
            }

            let total_genes = pathway.distinct_genes();
            let pai = if total_genes == 0 {
                0.0
            } else {
                resolved.found() as f64 / total_genes as f64
            };
            let pci_a = internal_cohesion(corr, &resolved.indices);
            let pci_b = ranking.as_ref().and_then(|map| {
                let matched: Vec<f64> = resolved
                    .indices
                    .iter()
                    .filter_map(|&i| map.get(&fold(&corr.genes()[i])).copied())
                    .collect();
                mean(&matched)
            });
            let ceci = pci_b.or(pci_a).map(|cohesion| pai * cohesion * 100.0);

            scores.push(PathwayScore {
                pathway: pathway.name.clone(),
                genes_found: resolved.found(),
                total_genes,
                pai,
                pci_a,
                pci_b,
                ceci,
                z_score: ceci.map(|c| self.calibration.z_score(c)),
            });
        }

        let keys: Vec<f64> = scores.iter().map(|s| s.ceci.unwrap_or(f64::NAN)).collect();
        let order = descending_order(&keys);
        let mut slots: Vec<Option<PathwayScore>> = scores.into_iter().map(Some).collect();
        order.into_iter().filter_map(|i| slots[i].take()).collect()
    }
}

/// Score pathways with the default calibration.
pub fn score_pathways(
    corr: &CorrelationMatrix,
    pathways: &[Pathway],
    ranked: Option<&RankedGenes>,
    min_genes: usize,
) -> Vec<PathwayScore> {
    PathwayScorer::new()
        .with_min_genes(min_genes)
        .score(corr, pathways, ranked)
}

/// Cohesion ranking of one pathway's genes.
#[derive(Debug, Clone, Serialize)]
pub struct PathwayAnalysis {
    /// Matched genes ranked by mean `|r|` to the other pathway genes.
    pub ranked: RankedGenes,
    /// Correlation submatrix in matched-gene order.
    pub submatrix: CorrelationMatrix,
    /// Mean off-diagonal `|r|` of the submatrix.
    pub mean_abs_correlation: f64,
    /// Listed names that matched no dataset gene.
    pub missing: Vec<String>,
}

/// Rank a single pathway's genes by internal cohesion.
pub fn analyze_pathway<S: AsRef<str>>(corr: &CorrelationMatrix, genes: &[S]) -> Result<PathwayAnalysis> {
    let resolved = resolve_nonempty(corr, genes)?;
    let submatrix = corr.submatrix(&resolved.indices)?;
    let ranked = rank_genes(&submatrix, Aggregation::Mean);
    let off_diagonal: Vec<f64> = submatrix.upper_triangle().iter().map(|v| v.abs()).collect();

    Ok(PathwayAnalysis {
        ranked,
        mean_abs_correlation: mean(&off_diagonal).unwrap_or(0.0),
        submatrix,
        missing: resolved.missing,
    })
}

/// Similarity of two pathways.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathwayComparison {
    /// Cosine similarity of the zero-padded per-gene cohesion vectors.
    pub cosine_similarity: f64,
    /// Genes listed in the first pathway.
    pub size_a: usize,
    /// Genes listed in the second pathway.
    pub size_b: usize,
    /// Distinct genes of the first pathway found in the dataset.
    pub found_a: usize,
    /// Distinct genes of the second pathway found in the dataset.
    pub found_b: usize,
    /// Names listed verbatim in both pathways, sorted.
    pub shared: Vec<String>,
}

/// Compare two pathways by the shape of their internal cohesion.
pub fn compare_two_pathways<S: AsRef<str>>(
    corr: &CorrelationMatrix,
    first: &[S],
    second: &[S],
) -> Result<PathwayComparison> {
    let a = resolve_nonempty(corr, first)?;
    let b = resolve_nonempty(corr, second)?;

    let mut va = per_gene_cohesion(corr, &a.indices);
    let mut vb = per_gene_cohesion(corr, &b.indices);
    let len = va.len().max(vb.len());
    va.resize(len, 0.0);
    vb.resize(len, 0.0);

    let names_b: HashSet<&str> = second.iter().map(AsRef::as_ref).collect();
    let mut shared: Vec<String> = first
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| names_b.contains(name))
        .map(str::to_string)
        .collect();
    shared.sort();
    shared.dedup();

    Ok(PathwayComparison {
        cosine_similarity: cosine(&va, &vb),
        size_a: first.len(),
        size_b: second.len(),
        found_a: a.found(),
        found_b: b.found(),
        shared,
    })
}

/// Case-insensitive set relation of two gene lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PathwayOverlap {
    /// Genes in both lists (first list's spelling).
    pub shared: Vec<String>,
    /// Genes only in the first list.
    pub only_first: Vec<String>,
    /// Genes only in the second list.
    pub only_second: Vec<String>,
}

/// Shared and exclusive genes of two lists, in first-seen order.
pub fn pathway_overlap<S: AsRef<str>>(first: &[S], second: &[S]) -> PathwayOverlap {
    let folded_a: HashSet<String> = first.iter().map(|g| fold(g.as_ref())).collect();
    let folded_b: HashSet<String> = second.iter().map(|g| fold(g.as_ref())).collect();

    let mut out = PathwayOverlap::default();
    let mut seen = HashSet::new();
    for name in first {
        let key = fold(name.as_ref());
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        if folded_b.contains(&key) {
            out.shared.push(name.as_ref().trim().to_string());
        } else {
            out.only_first.push(name.as_ref().trim().to_string());
        }
    }
    seen.clear();
    for name in second {
        let key = fold(name.as_ref());
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        if !folded_a.contains(&key) {
            out.only_second.push(name.as_ref().trim().to_string());
        }
    }
    out
}

/// Correlation of one gene with one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneCorrelation {
    /// Target gene (dataset spelling).
    pub gene: String,
    /// Correlation coefficient.
    pub correlation: f64,
}

/// Correlations of one gene against a gene list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneToGenes {
    /// Query gene (dataset spelling).
    pub gene: String,
    /// Targets sorted by `|r|` descending.
    pub targets: Vec<GeneCorrelation>,
    /// Mean signed correlation.
    pub mean_correlation: f64,
    /// Mean absolute correlation.
    pub mean_abs_correlation: f64,
    /// Requested names that matched no dataset gene.
    pub missing: Vec<String>,
}

/// Correlate one gene with every found gene of `targets`.
pub fn gene_to_genes<S: AsRef<str>>(corr: &CorrelationMatrix, gene: &str, targets: &[S]) -> Result<GeneToGenes> {
    let query = corr
        .lookup()
        .index_of(gene)
        .ok_or_else(|| Error::GeneNotFound(gene.to_string()))?;
    let resolved = resolve_nonempty(corr, targets)?;

    let values: Vec<f64> = resolved
        .indices
        .iter()
        .map(|&j| corr.values()[[query, j]])
        .collect();
    let magnitudes: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    let targets = descending_order(&magnitudes)
        .into_iter()
        .map(|r| GeneCorrelation {
            gene: corr.genes()[resolved.indices[r]].clone(),
            correlation: values[r],
        })
        .collect();

    Ok(GeneToGenes {
        gene: corr.genes()[query].clone(),
        targets,
        mean_correlation: mean(&values).unwrap_or(0.0),
        mean_abs_correlation: mean(&magnitudes).unwrap_or(0.0),
        missing: resolved.missing,
    })
}

/// Summary of one gene against one pathway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenePathwayCorrelation {
    /// Pathway identifier.
    pub pathway: String,
    /// Genes listed in the pathway.
    pub total_genes: usize,
    /// Distinct pathway genes found in the dataset.
    pub genes_found: usize,
    /// Mean signed correlation to the found genes.
    pub mean_correlation: f64,
    /// Mean absolute correlation to the found genes.
    pub mean_abs_correlation: f64,
}

/// Correlate one gene with several pathways, strongest first.
///
/// Pathways with no gene in the dataset are left out.
pub fn gene_to_pathways(
    corr: &CorrelationMatrix,
    gene: &str,
    pathways: &[Pathway],
) -> Result<Vec<GenePathwayCorrelation>> {
    let query = corr
        .lookup()
        .index_of(gene)
        .ok_or_else(|| Error::GeneNotFound(gene.to_string()))?;

    let rows: Vec<GenePathwayCorrelation> = pathways
        .iter()
        .filter_map(|pathway| {
            let resolved = corr.lookup().resolve(&pathway.genes);
            let values: Vec<f64> = resolved
                .indices
                .iter()
                .map(|&j| corr.values()[[query, j]])
                .collect();
            let magnitudes: Vec<f64> = values.iter().map(|v| v.abs()).collect();
            Some(GenePathwayCorrelation {
                pathway: pathway.name.clone(),
                total_genes: pathway.distinct_genes(),
                genes_found: resolved.found(),
                mean_correlation: mean(&values)?,
                mean_abs_correlation: mean(&magnitudes)?,
            })
        })
        .collect();

    let keys: Vec<f64> = rows.iter().map(|r| r.mean_abs_correlation).collect();
    let order = descending_order(&keys);
    let mut slots: Vec<Option<GenePathwayCorrelation>> = rows.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

fn resolve_nonempty<S: AsRef<str>>(corr: &CorrelationMatrix, genes: &[S]) -> Result<Resolved> {
    let resolved = corr.lookup().resolve(genes);
    if resolved.is_empty() {
        return Err(Error::EmptyPathway(format!("{} genes listed", genes.len())));
    }
    Ok(resolved)
}

/// Mean `|r|` of each gene to the other genes of `indices`.
fn per_gene_cohesion(corr: &CorrelationMatrix, indices: &[usize]) -> Vec<f64> {
    let m = indices.len();
    if m < 2 {
        return vec![0.0; m];
    }
    let values = corr.values();
    indices
        .iter()
        .map(|&i| {
            indices
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| values[[i, j]].abs())
                .sum::<f64>()
                / (m - 1) as f64
        })
        .collect()
}

fn internal_cohesion(corr: &CorrelationMatrix, indices: &[usize]) -> Option<f64> {
    if indices.len() < 2 {
        return None;
    }
    mean(&per_gene_cohesion(corr, indices))
}

fn distinct_folded<S: AsRef<str>>(names: &[S]) -> usize {
    names
        .iter()
        .map(|n| fold(n.as_ref()))
        .filter(|n| !n.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationMethod;
    use ndarray::array;

    fn corr() -> CorrelationMatrix {
        let values = array![
            [1.0, 0.8, 0.6, 0.1, -0.2],
            [0.8, 1.0, 0.4, 0.0, 0.3],
            [0.6, 0.4, 1.0, -0.5, 0.1],
            [0.1, 0.0, -0.5, 1.0, 0.9],
            [-0.2, 0.3, 0.1, 0.9, 1.0],
        ];
        let genes = ["TP53", "BRCA1", "MYC", "EGFR", "KRAS"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        CorrelationMatrix::new(genes, values, CorrelationMethod::Pearson).unwrap()
    }

    #[test]
    fn fully_matched_pathway_has_unit_pai() {
        let p = Pathway::new("p53", ["tp53", "Brca1", "MYC"]);
        let scores = score_pathways(&corr(), &[p], None, 2);
        assert_eq!(scores.len(), 1);
        let s = &scores[0];
        assert_eq!(s.pai, 1.0);
        // per gene: (0.8+0.6)/2, (0.8+0.4)/2, (0.6+0.4)/2
        let pci_a = (0.7 + 0.6 + 0.5) / 3.0;
        assert!((s.pci_a.unwrap() - pci_a).abs() < 1e-12);
        assert!((s.ceci.unwrap() - pci_a * 100.0).abs() < 1e-9);
        let z = (pci_a * 100.0 - 7.908) / 2.0605;
        assert!((s.z_score.unwrap() - z).abs() < 1e-9);
        assert_eq!(s.pci_b, None);
    }

    #[test]
    fn partial_match_and_duplicates() {
        let p = Pathway::new("mixed", ["TP53", "tp53", "MYC", "NOPE", "ALSO_NOPE"]);
        let s = &score_pathways(&corr(), &[p], None, 1)[0];
        assert_eq!(s.genes_found, 2);
        assert_eq!(s.total_genes, 4);
        assert!((s.pai - 0.5).abs() < 1e-12);
        assert!((s.ceci.unwrap() - 0.5 * 0.6 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn ranking_scores_replace_internal_cohesion() {
        let c = corr();
        let ranked = rank_genes(&c, Aggregation::Mean);
        let p = Pathway::new("p", ["EGFR", "KRAS"]);
        let s = &score_pathways(&c, &[p], Some(&ranked), 2)[0];
        let expected = ((0.1 + 0.0 + 0.5 + 0.9) / 4.0 + (0.2 + 0.3 + 0.1 + 0.9) / 4.0) / 2.0;
        assert!((s.pci_b.unwrap() - expected).abs() < 1e-12);
        assert!((s.ceci.unwrap() - expected * 100.0).abs() < 1e-9);
    }

    #[test]
    fn results_sorted_by_ceci_and_small_pathways_skipped() {
        let pathways = vec![
            Pathway::new("weak", ["BRCA1", "EGFR"]),
            Pathway::new("strong", ["EGFR", "KRAS"]),
            Pathway::new("tiny", ["MYC"]),
        ];
        let scores = score_pathways(&corr(), &pathways, None, 2);
        let names: Vec<_> = scores.iter().map(|s| s.pathway.as_str()).collect();
        assert_eq!(names, vec!["strong", "weak"]);
    }

    #[test]
    fn single_gene_pathway_has_undefined_ceci_sorted_last() {
        let pathways = vec![Pathway::new("one", ["MYC"]), Pathway::new("two", ["TP53", "BRCA1"])];
        let scores = score_pathways(&corr(), &pathways, None, 1);
        assert_eq!(scores[0].pathway, "two");
        assert_eq!(scores[1].ceci, None);
        assert_eq!(scores[1].z_score, None);
    }

    #[test]
    fn custom_calibration() {
        let scorer = PathwayScorer::new().with_min_genes(2).with_calibration(CeciCalibration {
            mean: 0.0,
            std: 1.0,
        });
        let s = &scorer.score(&corr(), &[Pathway::new("p", ["EGFR", "KRAS"])], None)[0];
        assert!((s.z_score.unwrap() - s.ceci.unwrap()).abs() < 1e-12);
    }

    #[test]
    fn single_pathway_analysis_ranks_by_cohesion() {
        let a = analyze_pathway(&corr(), &["myc", "tp53", "brca1", "missing"]).unwrap();
        assert_eq!(a.ranked.genes, vec!["TP53", "BRCA1", "MYC"]);
        assert_eq!(a.missing, vec!["missing"]);
        assert_eq!(a.submatrix.n_genes(), 3);
        assert!((a.mean_abs_correlation - 0.6).abs() < 1e-12);
        assert!(matches!(
            analyze_pathway(&corr(), &["x", "y"]),
            Err(Error::EmptyPathway(_))
        ));
    }

    #[test]
    fn comparison_pads_vectors_and_intersects_names() {
        let cmp = compare_two_pathways(&corr(), &["TP53", "BRCA1", "MYC"], &["EGFR", "KRAS", "TP53"]).unwrap();
        assert!((0.0..=1.0 + 1e-12).contains(&cmp.cosine_similarity));
        assert_eq!(cmp.shared, vec!["TP53"]);
        assert_eq!((cmp.found_a, cmp.found_b), (3, 3));

        let same = compare_two_pathways(&corr(), &["TP53", "BRCA1"], &["TP53", "BRCA1"]).unwrap();
        assert!((same.cosine_similarity - 1.0).abs() < 1e-12);

        // exact-name intersection is case-sensitive
        let cased = compare_two_pathways(&corr(), &["TP53"], &["tp53"]).unwrap();
        assert!(cased.shared.is_empty());
        assert_eq!(cased.cosine_similarity, 0.0);
    }

    #[test]
    fn overlap_is_case_insensitive() {
        let o = pathway_overlap(&["TP53", "MYC", "EGFR", "myc"], &["tp53", "KRAS"]);
        assert_eq!(o.shared, vec!["TP53"]);
        assert_eq!(o.only_first, vec!["MYC", "EGFR"]);
        assert_eq!(o.only_second, vec!["KRAS"]);
    }

    #[test]
    fn gene_to_genes_sorts_by_magnitude() {
        let r = gene_to_genes(&corr(), "myc", &["TP53", "EGFR", "KRAS", "GHOST"]).unwrap();
        assert_eq!(r.gene, "MYC");
        let names: Vec<_> = r.targets.iter().map(|t| t.gene.as_str()).collect();
        assert_eq!(names, vec!["TP53", "EGFR", "KRAS"]);
        assert!((r.targets[1].correlation + 0.5).abs() < 1e-12);
        assert!((r.mean_abs_correlation - 0.4).abs() < 1e-12);
        assert!((r.mean_correlation - 0.2 / 3.0).abs() < 1e-12);
        assert_eq!(r.missing, vec!["GHOST"]);

        assert_eq!(
            gene_to_genes(&corr(), "ghost", &["TP53"]).unwrap_err(),
            Error::GeneNotFound("ghost".into())
        );
    }

    #[test]
    fn gene_to_pathways_skips_unmatched() {
        let pathways = vec![
            Pathway::new("a", ["BRCA1", "MYC"]),
            Pathway::new("b", ["EGFR", "KRAS"]),
            Pathway::new("none", ["X"]),
        ];
        let rows = gene_to_pathways(&corr(), "KRAS", &pathways).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.pathway.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!((rows[0].mean_abs_correlation - 0.95).abs() < 1e-12);
        assert!((rows[1].mean_correlation - 0.2).abs() < 1e-12);
    }
}
