//! t-distributed stochastic neighbor embedding of genes.
//!
//! # Algorithm
//!
//! 1. **Affinities**: squared Euclidean distances between rows of `|C|`. For
//!    each gene a Gaussian bandwidth is found by binary search so that the
//!    conditional distribution over its neighbours has the target perplexity
//!    (`exp(H) = perplexity`). The conditionals are symmetrized into a joint P.
//! 2. **Initialization**: the leading principal components of `|C|`,
//!    divided by the standard deviation of the first one and scaled by 1e-4.
//! 3. **Optimization**: gradient descent on `KL(P || Q)` with a Student-t
//!    kernel `q_ij ∝ 1 / (1 + |y_i - y_j|²)`:
//!
//! ```text
//! ∂KL/∂y_i = 4 Σ_j (p_ij - q_ij) (1 + |y_i - y_j|²)⁻¹ (y_i - y_j)
//! ```
//!
//! The first 250 iterations exaggerate P by 12 with momentum 0.5, the rest
//! run with momentum 0.8. Per-coordinate gains grow by 0.2 while the gradient
//! keeps its sign and shrink by 0.8 otherwise (floor 0.01). The KL divergence
//! is checked every 50 iterations; the run stops once it has not improved for
//! `patience` iterations.
//!
//! # Modes
//!
//! | Mode | P | Repulsion | Cost per iteration |
//! |------|---|-----------|--------------------|
//! | [`TsneMode::Exact`] | dense | all pairs | O(n²) |
//! | [`TsneMode::BarnesHut`] | `3·perplexity` nearest neighbours | space tree | O(n log n) |
//!
//! Exact mode is used below `exact_threshold` genes (1000 by default).
//!
//! # References
//!
//! - van der Maaten & Hinton (2008). "Visualizing Data using t-SNE."
//! - van der Maaten (2014). "Accelerating t-SNE using Tree-Based Algorithms."

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::{debug, info};

use super::pca::Decomposition;
use super::space_tree::{to_point, SpaceTree};
use super::{absolute_input, display_clusters, ProjectionResult};
use crate::cluster::DEFAULT_SEED;
use crate::correlation::CorrelationMatrix;
use crate::error::{Error, Result};
use crate::metrics::squared_euclidean;

const EARLY_EXAGGERATION: f64 = 12.0;
const EXPLORATION_ITERS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const MIN_GRAD_NORM: f64 = 1e-7;
const CHECK_EVERY: usize = 50;
const INIT_SCALE: f64 = 1e-4;
const PERPLEXITY_TOL: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const EPS: f64 = f64::EPSILON;

/// How pairwise terms are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TsneMode {
    /// Dense affinities and exact repulsion.
    Exact,
    /// Sparse nearest-neighbour affinities and tree-approximated repulsion.
    BarnesHut,
}

/// t-SNE over the absolute correlation matrix.
#[derive(Debug, Clone)]
pub struct Tsne {
    n_components: usize,
    perplexity: f64,
    max_iter: usize,
    patience: usize,
    exact_threshold: usize,
    theta: f64,
    seed: u64,
    display_clusters: Option<usize>,
}

enum Affinities {
    Dense(Array2<f64>),
    Sparse(Vec<Vec<(usize, f64)>>),
}

impl Tsne {
    /// Embed into `n_components` (1 to 3) dimensions.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            perplexity: 30.0,
            max_iter: 1000,
            patience: 300,
            exact_threshold: 1000,
            theta: 0.5,
            seed: DEFAULT_SEED,
            display_clusters: None,
        }
    }

    /// Set target perplexity (capped for small inputs).
    pub fn with_perplexity(mut self, perplexity: f64) -> Self {
        self.perplexity = perplexity;
        self
    }

    /// Set total iteration budget, exploration phase included.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set iterations without KL improvement before stopping.
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Use exact mode below this many genes.
    pub fn with_exact_threshold(mut self, exact_threshold: usize) -> Self {
        self.exact_threshold = exact_threshold;
        self
    }

    /// Set Barnes–Hut opening angle.
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    /// Set seed (random initialization fallback and display clustering).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run k-means with `k` clusters on the embedding.
    pub fn with_display_clusters(mut self, k: usize) -> Self {
        self.display_clusters = Some(k);
        self
    }

    /// Mode used for `n` genes.
    pub fn mode_for(&self, n: usize) -> TsneMode {
        if n < self.exact_threshold {
            TsneMode::Exact
        } else {
            TsneMode::BarnesHut
        }
    }

    /// Perplexity actually used for `n` genes.
    pub fn effective_perplexity(&self, n: usize) -> f64 {
        let floor = 5.0f64.max((n.saturating_sub(1) / 3) as f64);
        self.perplexity
            .min(floor)
            .min(n.saturating_sub(1).max(1) as f64)
    }

    /// Embed the genes of `corr`.
    pub fn fit(&self, corr: &CorrelationMatrix) -> Result<ProjectionResult> {
        if !(1..=3).contains(&self.n_components) {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be 1, 2 or 3",
            });
        }
        if self.perplexity.is_nan() || self.perplexity <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "perplexity",
                message: "must be positive",
            });
        }
        if self.theta.is_nan() || self.theta < 0.0 {
            return Err(Error::InvalidParameter {
                name: "theta",
                message: "must be non-negative",
            });
        }

        let x = absolute_input(corr)?;
        let n = x.nrows();
        let perplexity = self.effective_perplexity(n);
        if perplexity != self.perplexity {
            debug!(
                requested = self.perplexity,
                used = perplexity,
                genes = n,
                "perplexity adjusted"
            );
        }

        let mode = self.mode_for(n);
        info!(genes = n, ?mode, perplexity, "t-SNE started");

        let p = match mode {
            TsneMode::Exact => Affinities::Dense(dense_affinities(&x, perplexity)),
            TsneMode::BarnesHut => Affinities::Sparse(sparse_affinities(&x, perplexity)),
        };
        let y = self.initial_embedding(&x)?;
        let scores = self.optimize(y, &p);
        let clusters = display_clusters(&scores, corr.genes(), self.display_clusters, self.seed)?;

        Ok(ProjectionResult {
            genes: corr.genes().to_vec(),
            scores,
            explained_variance: Vec::new(),
            cumulative_variance: Vec::new(),
            components: Vec::new(),
            clusters,
        })
    }

    /// Scaled principal components, or a small seeded Gaussian when PCA
    /// yields too few components.
    fn initial_embedding(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let n = x.nrows();
        let pcs = Decomposition::new(x)?.scores(3.min(n));
        if pcs.ncols() >= self.n_components {
            let first = pcs.column(0);
            let mean = first.sum() / n as f64;
            let std = (first.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
            let scale = if std > 0.0 { INIT_SCALE / std } else { INIT_SCALE };
            return Ok(Array2::from_shape_fn((n, self.n_components), |(i, c)| {
                pcs[[i, c]] * scale
            }));
        }

        debug!(seed = self.seed, "random t-SNE initialization");
        let normal = Normal::new(0.0, INIT_SCALE)
            .map_err(|e| Error::InvalidFormat(e.to_string()))?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(Array2::from_shape_fn((n, self.n_components), |_| {
            normal.sample(&mut rng)
        }))
    }

    fn optimize(&self, mut y: Array2<f64>, p: &Affinities) -> Array2<f64> {
        let (n, d) = y.dim();
        let learning_rate = (n as f64 / EARLY_EXAGGERATION / 4.0).max(50.0);
        let mut update = Array2::<f64>::zeros((n, d));
        let mut gains = Array2::<f64>::ones((n, d));

        let mut best_error = f64::INFINITY;
        let mut best_iter = 0;

        for iter in 0..self.max_iter {
            let exploring = iter < EXPLORATION_ITERS;
            if iter == EXPLORATION_ITERS {
                best_error = f64::INFINITY;
                best_iter = iter;
            }
            let exaggeration = if exploring { EARLY_EXAGGERATION } else { 1.0 };
            let momentum = if exploring {
                INITIAL_MOMENTUM
            } else {
                FINAL_MOMENTUM
            };

            let check = (iter + 1) % CHECK_EVERY == 0 || iter + 1 == self.max_iter;
            let (grad, error) = match p {
                Affinities::Dense(p) => exact_gradient(&y, p, exaggeration, check),
                Affinities::Sparse(p) => bh_gradient(&y, p, exaggeration, self.theta, check),
            };

            for ((u, g), (gain, yi)) in update
                .iter_mut()
                .zip(grad.iter())
                .zip(gains.iter_mut().zip(y.iter_mut()))
            {
                let grown = if *u * g < 0.0 {
                    *gain + 0.2
                } else {
                    *gain * 0.8
                };
                *gain = grown.max(MIN_GAIN);
                *u = momentum * *u - learning_rate * *gain * g;
                *yi += *u;
            }

            if !check {
                continue;
            }
            let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if error < best_error {
                best_error = error;
                best_iter = iter;
            } else if iter - best_iter > self.patience {
                debug!(iter, error, "t-SNE stopped without progress");
                break;
            }
            if grad_norm < MIN_GRAD_NORM {
                debug!(iter, grad_norm, "t-SNE gradient vanished");
                break;
            }
        }
        debug!(kl = best_error, "t-SNE finished");
        y
    }
}

/// Embedding with default iteration budget and exact/Barnes–Hut switch.
pub fn project_neighbor_embedding(
    corr: &CorrelationMatrix,
    n_components: usize,
    perplexity: f64,
    seed: u64,
) -> Result<ProjectionResult> {
    Tsne::new(n_components)
        .with_perplexity(perplexity)
        .with_seed(seed)
        .fit(corr)
}

/// Conditional distribution of one point over `distances` (squared) with the
/// bandwidth that matches `perplexity`.
fn conditional_row(distances: &[f64], perplexity: f64) -> Vec<f64> {
    let desired = perplexity.ln();
    let mut beta = 1.0f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut row = vec![0.0; distances.len()];

    for _ in 0..PERPLEXITY_STEPS {
        let mut sum = 0.0;
        for (r, &dist) in row.iter_mut().zip(distances) {
            *r = (-dist * beta).exp();
            sum += *r;
        }
        if sum == 0.0 {
            sum = 1e-8;
        }
        let mut weighted = 0.0;
        for (r, &dist) in row.iter_mut().zip(distances) {
            *r /= sum;
            weighted += dist * *r;
        }
        let entropy = sum.ln() + beta * weighted;
        let diff = entropy - desired;
        if diff.abs() <= PERPLEXITY_TOL {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() {
                beta * 2.0
            } else {
                (beta + beta_max) / 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() {
                beta / 2.0
            } else {
                (beta + beta_min) / 2.0
            };
        }
    }
    row
}

fn dense_affinities(x: &Array2<f64>, perplexity: f64) -> Array2<f64> {
    let n = x.nrows();
    let mut p = Array2::<f64>::zeros((n, n));
    let mut distances = Vec::with_capacity(n - 1);
    for i in 0..n {
        distances.clear();
        distances.extend((0..n).filter(|&j| j != i).map(|j| row_distance(x, i, j)));
        let cond = conditional_row(&distances, perplexity);
        for (j, v) in (0..n).filter(|&j| j != i).zip(cond) {
            p[[i, j]] = v;
        }
    }
    let sym = &p + &p.t();
    let total = sym.sum().max(EPS);
    sym.mapv(|v| (v / total).max(EPS))
}

fn sparse_affinities(x: &Array2<f64>, perplexity: f64) -> Vec<Vec<(usize, f64)>> {
    let n = x.nrows();
    let k = (n - 1).min((3.0 * perplexity + 1.0) as usize);
    let mut joint: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];

    for i in 0..n {
        let mut neighbours: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, row_distance(x, i, j)))
            .collect();
        neighbours.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        neighbours.truncate(k);

        let distances: Vec<f64> = neighbours.iter().map(|&(_, d)| d).collect();
        let cond = conditional_row(&distances, perplexity);
        for (&(j, _), v) in neighbours.iter().zip(cond) {
            *joint[i].entry(j).or_insert(0.0) += v;
            *joint[j].entry(i).or_insert(0.0) += v;
        }
    }

    let total = joint
        .iter()
        .flat_map(|row| row.values())
        .sum::<f64>()
        .max(EPS);
    joint
        .into_iter()
        .map(|row| row.into_iter().map(|(j, v)| (j, v / total)).collect())
        .collect()
}

fn row_distance(x: &Array2<f64>, i: usize, j: usize) -> f64 {
    squared_euclidean(&x.row(i), &x.row(j))
}

fn kernel(a: &ArrayView1<'_, f64>, b: &ArrayView1<'_, f64>) -> f64 {
    1.0 / (1.0 + squared_euclidean(a, b))
}

fn exact_gradient(
    y: &Array2<f64>,
    p: &Array2<f64>,
    exaggeration: f64,
    with_error: bool,
) -> (Array2<f64>, f64) {
    let (n, d) = y.dim();
    let num = Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            0.0
        } else {
            kernel(&y.row(i), &y.row(j))
        }
    });
    let z = num.sum().max(EPS);

    let mut grad = Array2::<f64>::zeros((n, d));
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let coeff = 4.0 * (exaggeration * p[[i, j]] - num[[i, j]] / z) * num[[i, j]];
            for c in 0..d {
                grad[[i, c]] += coeff * (y[[i, c]] - y[[j, c]]);
            }
        }
    }

    let error = if with_error {
        let mut kl = 0.0;
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let pij = (exaggeration * p[[i, j]]).max(EPS);
                    let qij = (num[[i, j]] / z).max(EPS);
                    kl += pij * (pij / qij).ln();
                }
            }
        }
        kl
    } else {
        f64::NAN
    };
    (grad, error)
}

fn bh_gradient(
    y: &Array2<f64>,
    p: &[Vec<(usize, f64)>],
    exaggeration: f64,
    theta: f64,
    with_error: bool,
) -> (Array2<f64>, f64) {
    let (n, d) = y.dim();
    let points: Vec<_> = y
        .rows()
        .into_iter()
        .map(|r| to_point(&r.to_vec()))
        .collect();
    let tree = SpaceTree::new(&points, d);

    let mut grad = Array2::<f64>::zeros((n, d));
    let mut z = 0.0;
    let mut repulsive = Array2::<f64>::zeros((n, d));
    for (i, point) in points.iter().enumerate() {
        let rep = tree.repulsion(point, theta);
        z += rep.z;
        for c in 0..d {
            repulsive[[i, c]] = rep.force[c];
        }
    }
    let z = z.max(EPS);

    let mut kl = 0.0;
    for (i, row) in p.iter().enumerate() {
        for &(j, pij) in row {
            let q = kernel(&y.row(i), &y.row(j));
            let coeff = exaggeration * pij * q;
            for c in 0..d {
                grad[[i, c]] += coeff * (y[[i, c]] - y[[j, c]]);
            }
            if with_error {
                let pe = (exaggeration * pij).max(EPS);
                kl += pe * (pe / (q / z).max(EPS)).ln();
            }
        }
    }
    for i in 0..n {
        for c in 0..d {
            grad[[i, c]] = 4.0 * (grad[[i, c]] - repulsive[[i, c]] / z);
        }
    }

    (grad, if with_error { kl } else { f64::NAN })
}
