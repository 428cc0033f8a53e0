//! K-means clustering.
//!
//! Partitions data into k clusters by minimizing **within-cluster sum of squares**
//! (WCSS), reported as inertia.
//!
//! # The Objective
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids via k-means++
//! 2. **Assign**: Each point → nearest centroid
//! 3. **Update**: Each centroid → mean of assigned points
//! 4. Repeat until the centroid shift falls below tolerance
//!
//! Lloyd only finds a local minimum, so the fit is restarted `n_init` times and
//! the lowest-inertia run wins.
//!
//! ## K-means++ Initialization
//!
//! 1. Choose first centroid uniformly at random
//! 2. Choose next centroid with probability proportional to D(x)²
//!    (squared distance to nearest existing centroid)
//!
//! # Reproducibility
//!
//! Every random draw (initial centroids, empty-cluster reseeding, restarts)
//! comes from one `StdRng` seeded with [`Kmeans::with_seed`]. There is no
//! thread-local randomness: identical data, k and seed give identical labels.

use ndarray::Array2;
use rand::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::traits::Clustering;
use crate::error::{Error, Result};
use crate::metrics::{inertia, squared_euclidean};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 42;

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum Lloyd iterations per run.
    max_iter: usize,
    /// Convergence tolerance, relative to the mean feature variance.
    tol: f64,
    /// Independent restarts.
    n_init: usize,
    /// Random seed.
    seed: u64,
}

/// Result of a k-means fit.
#[derive(Debug, Clone)]
pub struct KmeansFit {
    /// Cluster label per point, in `[0, k)`.
    pub labels: Vec<usize>,
    /// k × d centroid matrix.
    pub centroids: Array2<f64>,
    /// Sum of squared distances to assigned centroids.
    pub inertia: f64,
    /// Lloyd iterations used by the winning run.
    pub n_iter: usize,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            seed: DEFAULT_SEED,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the number of restarts (at least 1).
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit on an n × d matrix.
    pub fn fit(&self, data: &Array2<f64>) -> Result<KmeansFit> {
        let n = data.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if self.k == 0 || self.k > n {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }

        let tol = self.tol * mean_variance(data);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KmeansFit> = None;

        for _ in 0..self.n_init {
            let run = self.run_once(data, tol, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        best.ok_or(Error::EmptyInput)
    }

    /// Fit on row vectors.
    pub fn fit_rows(&self, data: &[Vec<f64>]) -> Result<KmeansFit> {
        self.fit(&rows_to_array(data)?)
    }

    fn run_once(&self, data: &Array2<f64>, tol: f64, rng: &mut StdRng) -> KmeansFit {
        let n = data.nrows();
        let d = data.ncols();

        let mut centroids = self.init_centroids(data, rng);
        let mut labels = vec![0usize; n];
        let mut n_iter = 0;

        for iter in 0..self.max_iter {
            n_iter = iter + 1;
            self.assign(data, &centroids, &mut labels);

            // Update step
            let mut new_centroids = Array2::zeros((self.k, d));
            let mut counts = vec![0usize; self.k];

            for i in 0..n {
                let k = labels[i];
                for j in 0..d {
                    new_centroids[[k, j]] += data[[i, j]];
                }
                counts[k] += 1;
            }

            for k in 0..self.k {
                if counts[k] > 0 {
                    for j in 0..d {
                        new_centroids[[k, j]] /= counts[k] as f64;
                    }
                } else {
                    // Empty cluster: reseed from a random point
                    let idx = rng.random_range(0..n);
                    new_centroids.row_mut(k).assign(&data.row(idx));
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();

            centroids = new_centroids;

            if shift <= tol {
                break;
            }
        }

        // Labels must match the final centroids for inertia to be meaningful.
        self.assign(data, &centroids, &mut labels);
        let inertia = inertia(data, &labels, &centroids);

        KmeansFit {
            labels,
            centroids,
            inertia,
            n_iter,
        }
    }

    fn assign(&self, data: &Array2<f64>, centroids: &Array2<f64>, labels: &mut [usize]) {
        let nearest = |i: usize| -> usize {
            let point = data.row(i);
            let mut best_cluster = 0;
            let mut best_dist = f64::MAX;
            for k in 0..self.k {
                let dist = squared_euclidean(&point, &centroids.row(k));
                if dist < best_dist {
                    best_dist = dist;
                    best_cluster = k;
                }
            }
            best_cluster
        };

        #[cfg(feature = "parallel")]
        labels
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, label)| *label = nearest(i));

        #[cfg(not(feature = "parallel"))]
        for (i, label) in labels.iter_mut().enumerate() {
            *label = nearest(i);
        }
    }

    /// Initialize centroids using k-means++ algorithm.
    fn init_centroids(&self, data: &Array2<f64>, rng: &mut StdRng) -> Array2<f64> {
        let n = data.nrows();
        let d = data.ncols();
        let mut centroids = Array2::zeros((self.k, d));

        // First centroid: random point
        let first = rng.random_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        // Distance of every point to its nearest chosen centroid so far.
        let mut distances: Vec<f64> = (0..n)
            .map(|j| squared_euclidean(&data.row(j), &centroids.row(0)))
            .collect();

        for i in 1..self.k {
            // Sample proportional to squared distance
            let total: f64 = distances.iter().sum();
            let selected = if total <= 0.0 {
                rng.random_range(0..n)
            } else {
                let threshold = rng.random::<f64>() * total;
                let mut cumsum = 0.0;
                let mut selected = n - 1;
                for (j, &dist) in distances.iter().enumerate() {
                    cumsum += dist;
                    if cumsum >= threshold && dist > 0.0 {
                        selected = j;
                        break;
                    }
                }
                selected
            };

            centroids.row_mut(i).assign(&data.row(selected));
            for (j, slot) in distances.iter_mut().enumerate() {
                let dist = squared_euclidean(&data.row(j), &centroids.row(i));
                if dist < *slot {
                    *slot = dist;
                }
            }
        }

        centroids
    }
}

impl Clustering for Kmeans {
    fn fit_predict(&self, data: &[Vec<f64>]) -> Result<Vec<usize>> {
        Ok(self.fit_rows(data)?.labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

/// Mean per-column variance, used to scale the convergence tolerance.
fn mean_variance(data: &Array2<f64>) -> f64 {
    let n = data.nrows() as f64;
    if data.ncols() == 0 || n == 0.0 {
        return 0.0;
    }
    let total: f64 = data
        .columns()
        .into_iter()
        .map(|c| {
            let mean = c.sum() / n;
            c.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / data.ncols() as f64
}

pub(crate) fn rows_to_array(data: &[Vec<f64>]) -> Result<Array2<f64>> {
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }
    let d = data[0].len();
    let mut flat: Vec<f64> = Vec::with_capacity(data.len() * d);
    for point in data {
        if point.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: point.len(),
            });
        }
        flat.extend(point);
    }
    Array2::from_shape_vec((data.len(), d), flat).map_err(|e| Error::InvalidFormat(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.1],
        ]
    }

    #[test]
    fn test_kmeans_basic() {
        let labels = Kmeans::new(2).with_seed(42).fit_predict(&two_blobs()).unwrap();

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_kmeans_all_points_assigned() {
        let data: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![i as f64 * 0.1, (i % 5) as f64])
            .collect();

        let labels = Kmeans::new(5).with_seed(123).fit_predict(&data).unwrap();

        assert_eq!(labels.len(), data.len());
        for &label in &labels {
            assert!(label < 5, "label {} out of range", label);
        }
    }

    #[test]
    fn test_kmeans_k_equals_n() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];

        let fit = Kmeans::new(3).with_seed(42).fit_rows(&data).unwrap();

        let unique: std::collections::HashSet<_> = fit.labels.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(fit.inertia.abs() < 1e-12);
    }

    #[test]
    fn test_kmeans_deterministic_with_seed() {
        let data: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![(i * 7 % 11) as f64, (i * 3 % 5) as f64])
            .collect();

        let a = Kmeans::new(4).with_seed(7).fit_rows(&data).unwrap();
        let b = Kmeans::new(4).with_seed(7).fit_rows(&data).unwrap();

        assert_eq!(a.labels, b.labels, "same seed should give same result");
        assert_eq!(a.inertia, b.inertia);
    }

    #[test]
    fn test_kmeans_inertia_matches_assignment() {
        let fit = Kmeans::new(2).fit_rows(&two_blobs()).unwrap();
        // each blob: two points 0.1*sqrt(2) apart, centroid in the middle
        assert!((fit.inertia - 0.02).abs() < 1e-9, "inertia {}", fit.inertia);
    }

    #[test]
    fn test_kmeans_restarts_never_worse() {
        let data: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![((i * 13) % 17) as f64, ((i * 5) % 7) as f64])
            .collect();
        let single = Kmeans::new(4).with_n_init(1).fit_rows(&data).unwrap();
        let many = Kmeans::new(4).with_n_init(10).fit_rows(&data).unwrap();
        assert!(many.inertia <= single.inertia + 1e-12);
    }

    #[test]
    fn test_kmeans_empty_input_error() {
        let data: Vec<Vec<f64>> = vec![];
        assert!(Kmeans::new(2).fit_predict(&data).is_err());
    }

    #[test]
    fn test_kmeans_k_larger_than_n_error() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let err = Kmeans::new(5).fit_predict(&data).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidClusterCount {
                requested: 5,
                n_items: 2
            }
        );
    }
}
