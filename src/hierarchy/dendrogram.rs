//! Linkage tree produced by agglomerative clustering.
//!
//! Cluster ids follow the SciPy/MATLAB convention: leaves are `0..n`, and the
//! i-th merge creates cluster `n + i`. That makes [`LinkageTree::linkage_rows`]
//! directly consumable by dendrogram renderers.

use serde::Serialize;

use crate::error::{Error, Result};

/// A single merge operation in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Merge {
    /// First cluster being merged (index).
    pub cluster_a: usize,
    /// Second cluster being merged (index).
    pub cluster_b: usize,
    /// Distance/dissimilarity at which merge occurred.
    pub distance: f64,
    /// Size of resulting cluster.
    pub size: usize,
}

/// Merge history of agglomerative clustering over labelled items.
#[derive(Debug, Clone, Serialize)]
pub struct LinkageTree {
    labels: Vec<String>,
    merges: Vec<Merge>,
}

impl LinkageTree {
    /// Create an empty tree over labelled leaves.
    pub fn new(labels: Vec<String>) -> Self {
        let cap = labels.len().saturating_sub(1);
        Self {
            labels,
            merges: Vec::with_capacity(cap),
        }
    }

    /// Record a merge operation.
    pub fn add_merge(&mut self, cluster_a: usize, cluster_b: usize, distance: f64, size: usize) {
        self.merges.push(Merge {
            cluster_a,
            cluster_b,
            distance,
            size,
        });
    }

    /// Leaf labels (gene names).
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of original items.
    pub fn n_items(&self) -> usize {
        self.labels.len()
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    /// Merges in the order they happened.
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Merge heights.
    pub fn distances(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }

    /// SciPy-style linkage rows `[a, b, distance, size]`.
    pub fn linkage_rows(&self) -> Vec<[f64; 4]> {
        self.merges
            .iter()
            .map(|m| {
                [
                    m.cluster_a as f64,
                    m.cluster_b as f64,
                    m.distance,
                    m.size as f64,
                ]
            })
            .collect()
    }

    /// Leaves in dendrogram drawing order (left to right).
    pub fn leaf_order(&self) -> Vec<usize> {
        let n = self.n_items();
        if self.merges.is_empty() {
            return (0..n).collect();
        }
        let mut order = Vec::with_capacity(n);
        let mut stack = vec![n + self.merges.len() - 1];
        while let Some(id) = stack.pop() {
            if id < n {
                order.push(id);
            } else {
                let m = &self.merges[id - n];
                // right child first so the left one pops first
                stack.push(m.cluster_b);
                stack.push(m.cluster_a);
            }
        }
        // Leaves never merged (incomplete trees) go last.
        if order.len() < n {
            let mut seen = vec![false; n];
            order.iter().for_each(|&l| seen[l] = true);
            order.extend((0..n).filter(|&l| !seen[l]));
        }
        order
    }

    /// Flat clusters from merges at or below `threshold`.
    pub fn cut_at_distance(&self, threshold: f64) -> Vec<usize> {
        let steps = self
            .merges
            .iter()
            .take_while(|m| m.distance <= threshold)
            .count();
        self.flat(steps)
    }

    /// Flat clustering with exactly `k` clusters (1 ≤ k ≤ n).
    pub fn cut_to_k(&self, k: usize) -> Result<Vec<usize>> {
        let n = self.n_items();
        if k == 0 || k > n {
            return Err(Error::InvalidClusterCount {
                requested: k,
                n_items: n,
            });
        }
        let steps = n - k;
        if steps > self.merges.len() {
            return Err(Error::InvalidClusterCount {
                requested: k,
                n_items: n,
            });
        }
        Ok(self.flat(steps))
    }

    /// Apply the first `steps` merges and label the resulting components
    /// 0.. in order of first leaf appearance.
    fn flat(&self, steps: usize) -> Vec<usize> {
        let n = self.n_items();
        let mut parent: Vec<usize> = (0..n + steps).collect();

        fn root(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for (i, m) in self.merges.iter().take(steps).enumerate() {
            let new_id = n + i;
            let a = root(&mut parent, m.cluster_a);
            let b = root(&mut parent, m.cluster_b);
            parent[a] = new_id;
            parent[b] = new_id;
        }

        let mut relabel = std::collections::HashMap::new();
        (0..n)
            .map(|leaf| {
                let r = root(&mut parent, leaf);
                let next = relabel.len();
                *relabel.entry(r).or_insert(next)
            })
            .collect()
    }
}
