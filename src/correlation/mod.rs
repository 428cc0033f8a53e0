//! Gene-by-gene correlation.
//!
//! Every gene is a column of the [`Dataset`]; the correlation matrix holds one
//! coefficient per gene pair. Three methods are supported:
//!
//! | Method | Measures | Robust to |
//! |--------|----------|-----------|
//! | Pearson | linear association | nothing in particular |
//! | Spearman | monotone association (Pearson over ranks) | outliers, monotone transforms |
//! | Kendall | pair concordance (tau-b) | outliers, ties |
//!
//! Missing cells are handled pairwise: each coefficient uses the samples where
//! both genes are present. Anything undefined (zero variance, fewer than two
//! usable samples) is stored as 0, so the matrix never contains NaN. The
//! diagonal is 1 by construction.
//!
//! ```rust
//! use ivcca::{compute_correlation, CorrelationMethod, Dataset};
//!
//! let ds = Dataset::new(
//!     vec![vec![1.0, 2.0], vec![2.0, 4.0], vec![3.0, 7.0]],
//!     vec!["s1".into(), "s2".into(), "s3".into()],
//!     vec!["A".into(), "B".into()],
//! ).unwrap();
//! let corr = compute_correlation(&ds, CorrelationMethod::Pearson).unwrap();
//! assert!(corr.get("a", "b").unwrap() > 0.9);
//! ```

mod coefficients;
mod cross;

use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::genes::GeneLookup;

pub use coefficients::{average_ranks, kendall, pearson, spearman};
pub use cross::{cross_dataset_correlation, CrossCorrelationMatrix, CrossRanking};

/// Correlation coefficient family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    /// Pearson product-moment correlation.
    #[default]
    Pearson,
    /// Spearman rank correlation.
    Spearman,
    /// Kendall tau-b.
    Kendall,
}

impl FromStr for CorrelationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(Self::Pearson),
            "spearman" => Ok(Self::Spearman),
            "kendall" => Ok(Self::Kendall),
            _ => Err(Error::InvalidParameter {
                name: "method",
                message: "expected pearson, spearman or kendall",
            }),
        }
    }
}

/// Square, symmetric gene × gene correlation matrix with unit diagonal.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    genes: Vec<String>,
    #[serde(serialize_with = "serialize_rows")]
    values: Array2<f64>,
    method: CorrelationMethod,
    #[serde(skip)]
    lookup: GeneLookup,
}

/// Distribution statistics over the strict upper triangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrelationSummary {
    /// Mean coefficient.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Smallest coefficient.
    pub min: f64,
    /// Largest coefficient.
    pub max: f64,
    /// Median coefficient.
    pub median: f64,
}

/// Equal-width histogram of coefficients over [-1, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` bin edges.
    pub edges: Vec<f64>,
    /// Count per bin; the last bin is closed on the right.
    pub counts: Vec<usize>,
}

impl CorrelationMatrix {
    /// Wrap precomputed coefficients.
    ///
    /// NaN entries become 0, values are clamped to [-1, 1] and the diagonal is
    /// set to 1.
    pub fn new(genes: Vec<String>, mut values: Array2<f64>, method: CorrelationMethod) -> Result<Self> {
        let n = genes.len();
        if values.nrows() != n || values.ncols() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: if values.nrows() != n {
                    values.nrows()
                } else {
                    values.ncols()
                },
            });
        }
        values.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) });
        for i in 0..n {
            values[[i, i]] = 1.0;
        }
        let lookup = GeneLookup::new(&genes);
        Ok(Self {
            genes,
            values,
            method,
            lookup,
        })
    }

    /// Gene names in matrix order.
    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    /// Raw coefficients.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Method the coefficients were computed with.
    pub fn method(&self) -> CorrelationMethod {
        self.method
    }

    /// Number of genes.
    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    /// Case-insensitive gene lookup.
    pub fn lookup(&self) -> &GeneLookup {
        &self.lookup
    }

    /// Coefficient between two genes by (case-insensitive) name.
    pub fn get(&self, a: &str, b: &str) -> Result<f64> {
        let i = self
            .lookup
            .index_of(a)
            .ok_or_else(|| Error::GeneNotFound(a.to_string()))?;
        let j = self
            .lookup
            .index_of(b)
            .ok_or_else(|| Error::GeneNotFound(b.to_string()))?;
        Ok(self.values[[i, j]])
    }

    /// Element-wise absolute values.
    pub fn abs(&self) -> Array2<f64> {
        self.values.mapv(f64::abs)
    }

    /// Dissimilarity `1 - |r|`: symmetric, zero diagonal, in [0, 1].
    pub fn distance(&self) -> Array2<f64> {
        let mut d = self.values.mapv(|v| 1.0 - v.abs());
        for i in 0..self.n_genes() {
            d[[i, i]] = 0.0;
        }
        d
    }

    /// Reorder both axes by `order` (a permutation or a subset of indices).
    pub fn reordered(&self, order: &[usize]) -> Result<Self> {
        if let Some(&bad) = order.iter().find(|&&i| i >= self.n_genes()) {
            return Err(Error::DimensionMismatch {
                expected: self.n_genes(),
                found: bad,
            });
        }
        let values = Array2::from_shape_fn((order.len(), order.len()), |(i, j)| {
            self.values[[order[i], order[j]]]
        });
        let genes: Vec<String> = order.iter().map(|&i| self.genes[i].clone()).collect();
        let lookup = GeneLookup::new(&genes);
        Ok(Self {
            genes,
            values,
            method: self.method,
            lookup,
        })
    }

    /// Correlation submatrix over a subset of genes.
    pub fn submatrix(&self, indices: &[usize]) -> Result<Self> {
        self.reordered(indices)
    }

    /// Coefficients above the diagonal, row by row.
    pub fn upper_triangle(&self) -> Vec<f64> {
        let n = self.n_genes();
        let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                out.push(self.values[[i, j]]);
            }
        }
        out
    }

    /// Summary statistics of the off-diagonal coefficients.
    ///
    /// Returns `None` for a single-gene matrix.
    pub fn summary(&self) -> Option<CorrelationSummary> {
        let mut vals = self.upper_triangle();
        if vals.is_empty() {
            return None;
        }
        let n = vals.len() as f64;
        let mean = vals.iter().sum::<f64>() / n;
        let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        vals.sort_by(f64::total_cmp);
        let mid = vals.len() / 2;
        let median = if vals.len() % 2 == 0 {
            (vals[mid - 1] + vals[mid]) / 2.0
        } else {
            vals[mid]
        };
        Some(CorrelationSummary {
            mean,
            std: var.sqrt(),
            min: vals[0],
            max: vals[vals.len() - 1],
            median,
        })
    }

    /// Histogram of off-diagonal coefficients.
    pub fn histogram(&self, bins: usize) -> Result<Histogram> {
        if bins == 0 {
            return Err(Error::InvalidParameter {
                name: "bins",
                message: "must be at least 1",
            });
        }
        let width = 2.0 / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|b| -1.0 + b as f64 * width).collect();
        let mut counts = vec![0usize; bins];
        for v in self.upper_triangle() {
            let b = (((v + 1.0) / width).floor() as usize).min(bins - 1);
            counts[b] += 1;
        }
        Ok(Histogram { edges, counts })
    }

    /// Row-major nested copy of the coefficients.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        to_rows(&self.values)
    }
}

/// Compute the gene × gene correlation matrix of a dataset.
pub fn compute_correlation(dataset: &Dataset, method: CorrelationMethod) -> Result<CorrelationMatrix> {
    let n = dataset.n_genes();
    if n == 0 {
        return Err(Error::EmptyInput);
    }

    let columns: Vec<Vec<f64>> = (0..n).map(|g| dataset.gene_column(g).to_vec()).collect();
    let complete = dataset.missing_count() == 0;
    let constant: Vec<bool> = columns.iter().map(|c| coefficients::is_constant(c)).collect();

    // Without missing cells, ranks (and centered columns) are shared by all pairs.
    let prepared: Option<Vec<Vec<f64>>> = match (complete, method) {
        (true, CorrelationMethod::Pearson) => Some(columns.iter().map(|c| centered(c)).collect()),
        (true, CorrelationMethod::Spearman) => Some(
            columns
                .iter()
                .map(|c| centered(&average_ranks(c)))
                .collect(),
        ),
        _ => None,
    };

    let row = |i: usize| -> Vec<f64> {
        ((i + 1)..n)
            .map(|j| match &prepared {
                Some(_) if constant[i] || constant[j] => 0.0,
                Some(cols) => centered_pearson(&cols[i], &cols[j]),
                None => {
                    let (x, y) = coefficients::complete_pairs(&columns[i], &columns[j]);
                    match method {
                        CorrelationMethod::Pearson => pearson(&x, &y),
                        CorrelationMethod::Spearman => spearman(&x, &y),
                        CorrelationMethod::Kendall => kendall(&x, &y),
                    }
                }
            })
            .collect()
    };

    #[cfg(feature = "parallel")]
    let upper: Vec<Vec<f64>> = (0..n).into_par_iter().map(row).collect();
    #[cfg(not(feature = "parallel"))]
    let upper: Vec<Vec<f64>> = (0..n).map(row).collect();

    let mut values = Array2::<f64>::eye(n);
    for (i, tail) in upper.iter().enumerate() {
        for (offset, &r) in tail.iter().enumerate() {
            let j = i + 1 + offset;
            values[[i, j]] = r;
            values[[j, i]] = r;
        }
    }

    debug!(?method, genes = n, samples = dataset.n_samples(), "correlation computed");
    CorrelationMatrix::new(dataset.genes().to_vec(), values, method)
}

fn centered(col: &[f64]) -> Vec<f64> {
    let mean = col.iter().sum::<f64>() / col.len().max(1) as f64;
    col.iter().map(|v| v - mean).collect()
}

fn centered_pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += a * b;
        sxx += a * a;
        syy += b * b;
    }
    coefficients::finish(sxy, sxx, syy)
}

pub(crate) fn to_rows(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.rows().into_iter().map(|r| r.to_vec()).collect()
}

pub(crate) fn serialize_rows<S: Serializer>(m: &Array2<f64>, s: S) -> std::result::Result<S::Ok, S::Error> {
    to_rows(m).serialize(s)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dataset(cols: &[Vec<f64>]) -> Dataset {
        let n_samples = cols[0].len();
        let rows = (0..n_samples)
            .map(|s| cols.iter().map(|c| c[s]).collect())
            .collect();
        Dataset::new(
            rows,
            (0..n_samples).map(|i| format!("s{i}")).collect(),
            (0..cols.len()).map(|i| format!("G{i}")).collect(),
        )
        .unwrap()
    }

    #[test]
    fn zero_variance_gene_has_zero_off_diagonal() {
        let ds = dataset(&[
            vec![1.0, 2.0, 3.0, 4.0],
            vec![7.0, 7.0, 7.0, 7.0],
            vec![4.0, 1.0, 3.0, 2.0],
        ]);
        for method in [
            CorrelationMethod::Pearson,
            CorrelationMethod::Spearman,
            CorrelationMethod::Kendall,
        ] {
            let c = compute_correlation(&ds, method).unwrap();
            assert_eq!(c.values()[[1, 1]], 1.0);
            for j in [0, 2] {
                assert_eq!(c.values()[[1, j]], 0.0);
                assert_eq!(c.values()[[j, 1]], 0.0);
            }
        }

        // 0.1 and 0.7 are not exact in binary, so their column means are not either
        let ds = dataset(&[
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
            vec![0.1; 10],
            vec![0.7; 10],
        ]);
        for method in [CorrelationMethod::Pearson, CorrelationMethod::Spearman] {
            let c = compute_correlation(&ds, method).unwrap();
            assert_eq!(c.values()[[0, 1]], 0.0);
            assert_eq!(c.values()[[0, 2]], 0.0);
            assert_eq!(c.values()[[1, 2]], 0.0);
            assert_eq!(c.values()[[2, 1]], 0.0);
        }
    }

    #[test]
    fn missing_values_use_pairwise_complete_samples() {
        let ds = dataset(&[
            vec![1.0, 2.0, f64::NAN, 4.0, 5.0],
            vec![2.0, 4.0, 100.0, 8.0, 10.0],
        ]);
        let c = compute_correlation(&ds, CorrelationMethod::Pearson).unwrap();
        assert!((c.values()[[0, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn all_missing_pair_is_zero() {
        let ds = dataset(&[vec![f64::NAN, f64::NAN, 1.0], vec![1.0, 2.0, f64::NAN]]);
        let c = compute_correlation(&ds, CorrelationMethod::Spearman).unwrap();
        assert_eq!(c.values()[[0, 1]], 0.0);
    }

    #[test]
    fn reorder_and_back_is_identity() {
        let ds = dataset(&[
            vec![1.0, 2.0, 3.0, 5.0],
            vec![2.0, 1.0, 4.0, 3.0],
            vec![9.0, 3.0, 1.0, 0.0],
        ]);
        let c = compute_correlation(&ds, CorrelationMethod::Pearson).unwrap();
        let perm = [2, 0, 1];
        let mut inverse = [0; 3];
        for (pos, &idx) in perm.iter().enumerate() {
            inverse[idx] = pos;
        }
        let back = c.reordered(&perm).unwrap().reordered(&inverse).unwrap();
        assert_eq!(back.values(), c.values());
        assert_eq!(back.genes(), c.genes());
    }

    #[test]
    fn summary_and_histogram() {
        let genes: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let values = ndarray::array![[1.0, 0.5, -0.5], [0.5, 1.0, 1.0], [-0.5, 1.0, 1.0]];
        let c = CorrelationMatrix::new(genes, values, CorrelationMethod::Pearson).unwrap();

        let s = c.summary().unwrap();
        assert!((s.mean - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(s.min, -0.5);
        assert_eq!(s.max, 1.0);
        assert_eq!(s.median, 0.5);

        let h = c.histogram(4).unwrap();
        assert_eq!(h.edges.len(), 5);
        assert_eq!(h.counts, vec![0, 1, 0, 2]);
    }

    #[test]
    fn new_normalizes_nan_and_diagonal() {
        let genes = vec!["A".to_string(), "B".to_string()];
        let values = ndarray::array![[0.0, f64::NAN], [f64::NAN, f64::NAN]];
        let c = CorrelationMatrix::new(genes, values, CorrelationMethod::Kendall).unwrap();
        assert_eq!(c.to_rows(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn serializes_as_nested_rows() {
        let genes = vec!["A".to_string(), "B".to_string()];
        let values = ndarray::array![[1.0, 0.25], [0.25, 1.0]];
        let c = CorrelationMatrix::new(genes, values, CorrelationMethod::Pearson).unwrap();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["values"][0][1], 0.25);
        assert_eq!(json["method"], "pearson");
        assert_eq!(json["genes"][1], "B");
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("Spearman".parse::<CorrelationMethod>().unwrap(), CorrelationMethod::Spearman);
        assert!("cosine".parse::<CorrelationMethod>().is_err());
    }

    proptest! {
        #[test]
        fn matrix_is_symmetric_bounded_with_unit_diagonal(
            cols in proptest::collection::vec(
                proptest::collection::vec(-50.0f64..50.0, 6),
                2..6,
            ),
            method_idx in 0usize..3,
        ) {
            let method = [
                CorrelationMethod::Pearson,
                CorrelationMethod::Spearman,
                CorrelationMethod::Kendall,
            ][method_idx];
            let c = compute_correlation(&dataset(&cols), method).unwrap();
            let v = c.values();
            for i in 0..c.n_genes() {
                prop_assert_eq!(v[[i, i]], 1.0);
                for j in 0..c.n_genes() {
                    prop_assert_eq!(v[[i, j]], v[[j, i]]);
                    prop_assert!((-1.0..=1.0).contains(&v[[i, j]]));
                    prop_assert!(!v[[i, j]].is_nan());
                }
            }
        }
    }
}
