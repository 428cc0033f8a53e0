//! Gene ranking by aggregate correlation strength.
//!
//! Each gene gets one score from the absolute values of its off-diagonal
//! correlations, either their mean or their maximum. Sorting genes by that
//! score (descending, ties kept in original order) and reindexing both axes
//! of the matrix by the same permutation gives the "sorted matrix" view,
//! which puts the most connected genes in the top-left block.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationMatrix;
use crate::error::{Error, Result};
use crate::genes::fold;

/// How a gene's absolute correlations are reduced to one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Mean absolute correlation.
    #[default]
    Mean,
    /// Maximum absolute correlation.
    Max,
}

impl Aggregation {
    /// Reduce a sequence of absolute coefficients; empty input scores 0.
    pub fn reduce<I: IntoIterator<Item = f64>>(self, values: I) -> f64 {
        let mut count = 0usize;
        let mut acc = 0.0f64;
        for v in values {
            count += 1;
            acc = match self {
                Aggregation::Mean => acc + v,
                Aggregation::Max => acc.max(v),
            };
        }
        match (self, count) {
            (_, 0) => 0.0,
            (Aggregation::Mean, n) => acc / n as f64,
            (Aggregation::Max, _) => acc,
        }
    }
}

impl FromStr for Aggregation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "magnitude" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            _ => Err(Error::InvalidParameter {
                name: "aggregation",
                message: "expected mean or max",
            }),
        }
    }
}

/// Genes ordered by descending score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedGenes {
    /// Aggregation used for the scores.
    pub aggregation: Aggregation,
    /// `order[r]` is the original index of the gene at rank `r`.
    pub order: Vec<usize>,
    /// Gene names in rank order.
    pub genes: Vec<String>,
    /// Scores in rank order (non-increasing).
    pub scores: Vec<f64>,
}

impl RankedGenes {
    /// Rank precomputed per-gene scores.
    pub fn from_scores(genes: &[String], scores: &[f64], aggregation: Aggregation) -> Self {
        let order = descending_order(scores);
        Self {
            aggregation,
            genes: order.iter().map(|&i| genes[i].clone()).collect(),
            scores: order.iter().map(|&i| scores[i]).collect(),
            order,
        }
    }

    /// Number of ranked genes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the ranking is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inverse permutation: `inverse()[original] == rank`.
    pub fn inverse(&self) -> Vec<usize> {
        let mut inv = vec![0; self.order.len()];
        for (rank, &idx) in self.order.iter().enumerate() {
            inv[idx] = rank;
        }
        inv
    }

    /// The correlation matrix with both axes in rank order.
    pub fn sorted_matrix(&self, corr: &CorrelationMatrix) -> Result<CorrelationMatrix> {
        if corr.n_genes() != self.len() {
            return Err(Error::DimensionMismatch {
                expected: self.len(),
                found: corr.n_genes(),
            });
        }
        corr.reordered(&self.order)
    }

    /// Score lookup by case-insensitive gene name.
    ///
    /// Names that fold together resolve to the earliest gene in matrix order,
    /// as matrix lookups do.
    pub fn score_map(&self) -> HashMap<String, f64> {
        let mut by_index: Vec<usize> = (0..self.len()).collect();
        by_index.sort_unstable_by_key(|&rank| self.order[rank]);
        let mut map = HashMap::with_capacity(self.len());
        for rank in by_index {
            map.entry(fold(&self.genes[rank])).or_insert(self.scores[rank]);
        }
        map
    }
}

/// Rank genes by aggregate absolute off-diagonal correlation.
pub fn rank_genes(corr: &CorrelationMatrix, aggregation: Aggregation) -> RankedGenes {
    let values = corr.values();
    let n = corr.n_genes();
    let scores: Vec<f64> = (0..n)
        .map(|i| {
            aggregation.reduce(
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| values[[i, j]].abs()),
            )
        })
        .collect();
    RankedGenes::from_scores(corr.genes(), &scores, aggregation)
}

/// Indices sorted by descending score; stable, NaN last.
pub(crate) fn descending_order(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (scores[a], scores[b]);
        match (x.is_nan(), y.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => y.total_cmp(&x),
        }
    });
    order
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationMethod;
    use ndarray::array;
    use proptest::prelude::*;

    fn matrix() -> CorrelationMatrix {
        let genes = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let values = array![
            [1.0, 0.9, -0.8, 0.1],
            [0.9, 1.0, -0.7, 0.0],
            [-0.8, -0.7, 1.0, 0.2],
            [0.1, 0.0, 0.2, 1.0],
        ];
        CorrelationMatrix::new(genes, values, CorrelationMethod::Pearson).unwrap()
    }

    #[test]
    fn mean_ranking_orders_by_strength() {
        let r = rank_genes(&matrix(), Aggregation::Mean);
        assert_eq!(r.genes, vec!["A", "C", "B", "D"]);
        assert!((r.scores[0] - 0.6).abs() < 1e-12);
        assert!(r.scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn max_ranking_breaks_ties_by_original_order() {
        let r = rank_genes(&matrix(), Aggregation::Max);
        // A and B both peak at 0.9; A comes first.
        assert_eq!(&r.genes[..2], &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn sorted_matrix_round_trips_through_inverse() {
        let corr = matrix();
        let r = rank_genes(&corr, Aggregation::Mean);
        let sorted = r.sorted_matrix(&corr).unwrap();
        let back = sorted.reordered(&r.inverse()).unwrap();
        assert_eq!(back.values(), corr.values());
        assert_eq!(sorted.values()[[0, 1]], sorted.values()[[1, 0]]);
    }

    #[test]
    fn single_gene_scores_zero() {
        let corr = CorrelationMatrix::new(
            vec!["A".into()],
            array![[1.0]],
            CorrelationMethod::Pearson,
        )
        .unwrap();
        let r = rank_genes(&corr, Aggregation::Mean);
        assert_eq!(r.scores, vec![0.0]);
    }

    #[test]
    fn score_map_is_case_insensitive() {
        let r = rank_genes(&matrix(), Aggregation::Mean);
        assert!(r.score_map().contains_key("d"));
    }

    #[test]
    fn score_map_keeps_first_of_case_duplicates() {
        let genes = vec!["Tp53".to_string(), "x".to_string(), "TP53".to_string()];
        // The later duplicate ranks first.
        let r = RankedGenes::from_scores(&genes, &[0.2, 0.5, 0.9], Aggregation::Mean);
        assert_eq!(r.genes[0], "TP53");
        let map = r.score_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["tp53"], 0.2);
    }

    proptest! {
        #[test]
        fn ranking_is_a_permutation(scores in proptest::collection::vec(0.0f64..1.0, 1..40)) {
            let genes: Vec<String> = (0..scores.len()).map(|i| format!("g{i}")).collect();
            let r = RankedGenes::from_scores(&genes, &scores, Aggregation::Mean);
            let mut seen = r.order.clone();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..scores.len()).collect::<Vec<_>>());
            prop_assert!(r.scores.windows(2).all(|w| w[0] >= w[1]));
            let inv = r.inverse();
            for (rank, &idx) in r.order.iter().enumerate() {
                prop_assert_eq!(inv[idx], rank);
            }
        }
    }
}
