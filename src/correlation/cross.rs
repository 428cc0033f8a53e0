//! Correlation between two independently loaded datasets.
//!
//! Both datasets must describe the same samples in the same order; cell
//! (i, j) is the Pearson correlation of gene i of the first dataset with gene
//! j of the second across those samples.

use ndarray::Array2;
use serde::Serialize;
use tracing::debug;

use super::coefficients::{complete_pairs, pearson};
use super::serialize_rows;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::ranking::{Aggregation, RankedGenes};

/// Rectangular genes(A) × genes(B) correlation matrix.
#[derive(Debug, Clone, Serialize)]
pub struct CrossCorrelationMatrix {
    genes_a: Vec<String>,
    genes_b: Vec<String>,
    #[serde(serialize_with = "serialize_rows")]
    values: Array2<f64>,
}

/// Independent rankings of both axes plus the doubly sorted matrix.
#[derive(Debug, Clone, Serialize)]
pub struct CrossRanking {
    /// Ranking of the first dataset's genes (rows).
    pub rows: RankedGenes,
    /// Ranking of the second dataset's genes (columns).
    pub cols: RankedGenes,
    /// The matrix with rows and columns reordered by their rankings.
    pub sorted: CrossCorrelationMatrix,
}

impl CrossCorrelationMatrix {
    /// Genes of the first dataset (rows).
    pub fn genes_a(&self) -> &[String] {
        &self.genes_a
    }

    /// Genes of the second dataset (columns).
    pub fn genes_b(&self) -> &[String] {
        &self.genes_b
    }

    /// Raw coefficients.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Row-major nested copy of the coefficients.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        super::to_rows(&self.values)
    }

    /// Rank rows and columns independently by aggregate absolute correlation.
    pub fn rank(&self, aggregation: Aggregation) -> CrossRanking {
        let row_scores: Vec<f64> = self
            .values
            .rows()
            .into_iter()
            .map(|r| aggregation.reduce(r.iter().map(|v| v.abs())))
            .collect();
        let col_scores: Vec<f64> = self
            .values
            .columns()
            .into_iter()
            .map(|c| aggregation.reduce(c.iter().map(|v| v.abs())))
            .collect();

        let rows = RankedGenes::from_scores(&self.genes_a, &row_scores, aggregation);
        let cols = RankedGenes::from_scores(&self.genes_b, &col_scores, aggregation);
        let values = Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| {
            self.values[[rows.order[i], cols.order[j]]]
        });
        let sorted = CrossCorrelationMatrix {
            genes_a: rows.genes.clone(),
            genes_b: cols.genes.clone(),
            values,
        };
        CrossRanking { rows, cols, sorted }
    }
}

/// Pearson correlation of every gene in `a` with every gene in `b`.
///
/// Fails with [`Error::SampleCountMismatch`] when the datasets have a
/// different number of samples; no partial matrix is produced.
pub fn cross_dataset_correlation(a: &Dataset, b: &Dataset) -> Result<CrossCorrelationMatrix> {
    if a.n_samples() != b.n_samples() {
        return Err(Error::SampleCountMismatch {
            left: a.n_samples(),
            right: b.n_samples(),
        });
    }

    let cols_a: Vec<Vec<f64>> = (0..a.n_genes()).map(|g| a.gene_column(g).to_vec()).collect();
    let cols_b: Vec<Vec<f64>> = (0..b.n_genes()).map(|g| b.gene_column(g).to_vec()).collect();

    let values = Array2::from_shape_fn((cols_a.len(), cols_b.len()), |(i, j)| {
        let (x, y) = complete_pairs(&cols_a[i], &cols_b[j]);
        pearson(&x, &y)
    });

    debug!(
        genes_a = cols_a.len(),
        genes_b = cols_b.len(),
        samples = a.n_samples(),
        "cross-dataset correlation computed"
    );
    Ok(CrossCorrelationMatrix {
        genes_a: a.genes().to_vec(),
        genes_b: b.genes().to_vec(),
        values,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ds(rows: Vec<Vec<f64>>, genes: &[&str]) -> Dataset {
        let samples = (0..rows.len()).map(|i| format!("s{i}")).collect();
        Dataset::new(rows, samples, genes.iter().map(|g| g.to_string()).collect()).unwrap()
    }

    #[test]
    fn mismatched_samples_fail_without_partial_result() {
        let a = ds(vec![vec![1.0], vec![2.0], vec![3.0]], &["A"]);
        let b = ds(vec![vec![1.0], vec![2.0]], &["B"]);
        let err = cross_dataset_correlation(&a, &b).unwrap_err();
        assert_eq!(err, Error::SampleCountMismatch { left: 3, right: 2 });
    }

    #[test]
    fn cells_are_pearson_across_samples() {
        let a = ds(
            vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0]],
            &["A1", "A2"],
        );
        let b = ds(
            vec![vec![3.0, 10.0], vec![2.0, 20.0], vec![1.0, 30.0]],
            &["B1", "B2"],
        );
        let m = cross_dataset_correlation(&a, &b).unwrap();
        assert_eq!(m.values().dim(), (2, 2));
        assert!((m.values()[[0, 0]] + 1.0).abs() < 1e-12);
        assert!((m.values()[[0, 1]] - 1.0).abs() < 1e-12);
        // constant gene A2
        assert_eq!(m.values()[[1, 0]], 0.0);
        assert_eq!(m.values()[[1, 1]], 0.0);
    }

    #[test]
    fn inexact_constant_gene_is_uncorrelated() {
        let a = ds((1..=10).map(|i| vec![i as f64]).collect(), &["A"]);
        let b = ds(vec![vec![0.1]; 10], &["B"]);
        let m = cross_dataset_correlation(&a, &b).unwrap();
        assert_eq!(m.values()[[0, 0]], 0.0);
    }

    #[test]
    fn ranking_sorts_each_axis_independently() {
        let a = ds(
            vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0]],
            &["A1", "A2"],
        );
        let b = ds(
            vec![vec![0.0, 10.0], vec![0.0, 20.0], vec![0.0, 30.0]],
            &["B1", "B2"],
        );
        let m = cross_dataset_correlation(&a, &b).unwrap();
        let ranked = m.rank(Aggregation::Mean);
        assert_eq!(ranked.rows.genes, vec!["A1", "A2"]);
        assert_eq!(ranked.cols.genes, vec!["B2", "B1"]);
        assert!((ranked.sorted.values()[[0, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(ranked.sorted.genes_b(), &["B2".to_string(), "B1".to_string()]);
    }
}
