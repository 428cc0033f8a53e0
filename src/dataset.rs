//! Expression datasets.
//!
//! A [`Dataset`] is an immutable samples × genes matrix. Missing cells are
//! stored as NaN and handled downstream (pairwise-complete correlation).

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Immutable samples × genes expression matrix.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<String>,
    genes: Vec<String>,
    values: Array2<f64>,
}

impl Dataset {
    /// Build a dataset from row-major values (one row per sample).
    ///
    /// Fails with [`Error::InvalidFormat`] when the matrix is empty or ragged,
    /// when identifier counts disagree with its shape, or when gene names
    /// repeat.
    pub fn new(values: Vec<Vec<f64>>, samples: Vec<String>, genes: Vec<String>) -> Result<Self> {
        if values.is_empty() || genes.is_empty() {
            return Err(Error::InvalidFormat("data matrix is empty".into()));
        }
        if values.len() != samples.len() {
            return Err(Error::InvalidFormat(format!(
                "{} sample ids for {} rows",
                samples.len(),
                values.len()
            )));
        }
        let n_genes = genes.len();
        let mut flat = Vec::with_capacity(values.len() * n_genes);
        for (row_idx, row) in values.iter().enumerate() {
            if row.len() != n_genes {
                return Err(Error::InvalidFormat(format!(
                    "row {row_idx} has {} values, expected {n_genes}",
                    row.len()
                )));
            }
            flat.extend_from_slice(row);
        }

        let mut seen = HashSet::with_capacity(n_genes);
        if let Some(dup) = genes.iter().find(|g| !seen.insert(g.as_str())) {
            return Err(Error::InvalidFormat(format!("duplicate gene name '{dup}'")));
        }

        let values = Array2::from_shape_vec((samples.len(), n_genes), flat)
            .map_err(|e| Error::InvalidFormat(e.to_string()))?;

        let dataset = Self {
            samples,
            genes,
            values,
        };
        let missing = dataset.missing_count();
        if missing > 0 {
            warn!(missing, "dataset contains missing values");
        }
        debug!(
            samples = dataset.n_samples(),
            genes = dataset.n_genes(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Build a dataset from a textual table.
    ///
    /// `header[0]` names the sample column; the remaining header cells are
    /// gene ids. In each row the first cell is the sample id and the rest are
    /// parsed as numbers; anything that does not parse becomes NaN.
    pub fn from_rows<S: AsRef<str>>(header: &[S], rows: &[Vec<S>]) -> Result<Self> {
        if header.len() < 2 {
            return Err(Error::InvalidFormat(
                "header needs a sample column and at least one gene".into(),
            ));
        }
        let genes: Vec<String> = header[1..]
            .iter()
            .map(|g| g.as_ref().trim().to_string())
            .collect();

        let mut samples = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let Some((id, cells)) = row.split_first() else {
                return Err(Error::InvalidFormat("empty row".into()));
            };
            samples.push(id.as_ref().trim().to_string());
            values.push(cells.iter().map(|c| parse_cell(c.as_ref())).collect());
        }
        Self::new(values, samples, genes)
    }

    /// Keep only the listed genes (exact names), preserving dataset order.
    pub fn filter_genes<S: AsRef<str>>(&self, keep: &[S]) -> Result<Self> {
        let wanted: HashSet<&str> = keep.iter().map(|g| g.as_ref()).collect();
        let indices: Vec<usize> = self
            .genes
            .iter()
            .enumerate()
            .filter(|(_, g)| wanted.contains(g.as_str()))
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            return Err(Error::GeneNotFound(
                "none of the filter genes are present".into(),
            ));
        }
        let values = self.values.select(ndarray::Axis(1), &indices);
        Ok(Self {
            samples: self.samples.clone(),
            genes: indices.iter().map(|&i| self.genes[i].clone()).collect(),
            values,
        })
    }

    /// Sample identifiers, one per row.
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Gene names, one per column.
    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    /// The samples × genes matrix.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Values of one gene across all samples.
    pub fn gene_column(&self, gene: usize) -> ArrayView1<'_, f64> {
        self.values.column(gene)
    }

    /// Number of samples (rows).
    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    /// Number of genes (columns).
    pub fn n_genes(&self) -> usize {
        self.values.ncols()
    }

    /// Count of missing (NaN) cells.
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

fn parse_cell(cell: &str) -> f64 {
    cell.trim().parse::<f64>().unwrap_or(f64::NAN)
}
