//! Choosing the number of gene clusters.
//!
//! Every k in `[2, min(max_k, n - 1)]` is fitted with [`Kmeans`] on the rows
//! of the `1 - |r|` distance matrix, and two criteria are reported:
//!
//! - **Elbow**: the first k where the second difference of inertia,
//!   `I(k-1) - 2 I(k) + I(k+1)`, is non-negative. Falls back to the smallest
//!   tested k when the curve never bends.
//! - **Silhouette**: the k with the largest mean silhouette (first on ties).
//!
//! Neither is authoritative; the caller picks one.

use serde::Serialize;
use tracing::{debug, info};

use super::kmeans::{Kmeans, DEFAULT_SEED};
use crate::correlation::CorrelationMatrix;
use crate::error::{Error, Result};
use crate::metrics::silhouette_score;

/// K returned when no k can be tested.
const FALLBACK_K: usize = 2;

/// Grid search over k with elbow and silhouette criteria.
#[derive(Debug, Clone)]
pub struct KSelection {
    max_k: usize,
    seed: u64,
    n_init: usize,
    max_iter: usize,
}

/// Scores for every tested k, plus both optima.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KSelectionResult {
    /// Tested cluster counts, ascending.
    pub k_values: Vec<usize>,
    /// Inertia per tested k.
    pub inertias: Vec<f64>,
    /// Mean silhouette per tested k (0 with fewer than two populated clusters).
    pub silhouettes: Vec<f64>,
    /// Optimal k by the elbow criterion.
    pub k_elbow: usize,
    /// Optimal k by maximum silhouette.
    pub k_silhouette: usize,
}

impl KSelection {
    /// Test k from 2 up to `max_k`.
    pub fn new(max_k: usize) -> Self {
        Self {
            max_k,
            seed: DEFAULT_SEED,
            n_init: 10,
            max_iter: 300,
        }
    }

    /// Set random seed shared by every k-means fit.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set k-means restarts per k.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set k-means iteration budget per restart.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Run the grid search over the genes of `corr`.
    pub fn select(&self, corr: &CorrelationMatrix) -> Result<KSelectionResult> {
        if self.max_k < 2 {
            return Err(Error::InvalidParameter {
                name: "max_k",
                message: "must be at least 2",
            });
        }

        let n = corr.n_genes();
        let upper = self.max_k.min(n.saturating_sub(1));
        let k_values: Vec<usize> = (2..=upper).collect();
        if k_values.is_empty() {
            debug!(genes = n, "too few genes to test any k, using fallback");
            return Ok(KSelectionResult {
                k_values,
                inertias: Vec::new(),
                silhouettes: Vec::new(),
                k_elbow: FALLBACK_K,
                k_silhouette: FALLBACK_K,
            });
        }

        let features = corr.distance();
        let mut inertias = Vec::with_capacity(k_values.len());
        let mut silhouettes = Vec::with_capacity(k_values.len());
        for &k in &k_values {
            let fit = Kmeans::new(k)
                .with_seed(self.seed)
                .with_n_init(self.n_init)
                .with_max_iter(self.max_iter)
                .fit(&features)?;
            silhouettes.push(silhouette_score(&features, &fit.labels));
            inertias.push(fit.inertia);
        }

        let k_elbow = elbow(&k_values, &inertias);
        let k_silhouette = argmax(&silhouettes).map_or(FALLBACK_K, |i| k_values[i]);
        info!(k_elbow, k_silhouette, tested = k_values.len(), "optimal k selected");

        Ok(KSelectionResult {
            k_values,
            inertias,
            silhouettes,
            k_elbow,
            k_silhouette,
        })
    }
}

/// Grid search with default restarts and iteration budget.
pub fn select_optimal_k(corr: &CorrelationMatrix, max_k: usize, seed: u64) -> Result<KSelectionResult> {
    KSelection::new(max_k).with_seed(seed).select(corr)
}

fn elbow(k_values: &[usize], inertias: &[f64]) -> usize {
    let Some(&first) = k_values.first() else {
        return FALLBACK_K;
    };
    (1..inertias.len().saturating_sub(1))
        .find(|&i| inertias[i - 1] - 2.0 * inertias[i] + inertias[i + 1] >= 0.0)
        .map_or(first, |i| k_values[i])
}

fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}
