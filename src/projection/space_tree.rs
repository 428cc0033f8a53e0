//! Barnes–Hut space-partitioning tree for 1-3 dimensional embeddings.
//!
//! Each internal cell splits into `2^d` children (binary tree, quadtree or
//! octree). A cell far enough from the query point relative to its width,
//! `width / dist < θ`, stands in for all the points it contains through its
//! center of mass, which turns the O(n²) repulsive sum of t-SNE into
//! O(n log n).

/// Positions are stored in fixed 3-slot arrays; unused slots stay 0.
const MAX_DIM: usize = 3;
/// Cells stop splitting past this depth; coincident points share a leaf.
const MAX_DEPTH: usize = 48;

type Point = [f64; MAX_DIM];

#[derive(Debug, Clone)]
struct Cell {
    center: Point,
    half: f64,
    mass: Point,
    count: usize,
    first_child: Option<usize>,
    /// Position shared by every point in a leaf.
    point: Option<Point>,
}

impl Cell {
    fn empty(center: Point, half: f64) -> Self {
        Self {
            center,
            half,
            mass: [0.0; MAX_DIM],
            count: 0,
            first_child: None,
            point: None,
        }
    }
}

/// Tree over the rows of an `n × d` embedding.
#[derive(Debug, Clone)]
pub(crate) struct SpaceTree {
    dim: usize,
    cells: Vec<Cell>,
}

/// Repulsive term of one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Repulsion {
    /// `Σ_j q_ij² (y_i - y_j)` with `q_ij = 1 / (1 + |y_i - y_j|²)`.
    pub force: Point,
    /// `Σ_j q_ij`, the point's share of the normalization.
    pub z: f64,
}

impl SpaceTree {
    /// Build over `points` (all of length `dim`, 1 ≤ dim ≤ 3).
    pub(crate) fn new(points: &[Point], dim: usize) -> Self {
        let dim = dim.clamp(1, MAX_DIM);
        let mut lo = [f64::INFINITY; MAX_DIM];
        let mut hi = [f64::NEG_INFINITY; MAX_DIM];
        for p in points {
            for k in 0..dim {
                lo[k] = lo[k].min(p[k]);
                hi[k] = hi[k].max(p[k]);
            }
        }

        let mut center = [0.0; MAX_DIM];
        let mut half = 0.0f64;
        for k in 0..dim {
            if lo[k].is_finite() && hi[k].is_finite() {
                center[k] = (lo[k] + hi[k]) / 2.0;
                half = half.max((hi[k] - lo[k]) / 2.0);
            }
        }
        half = half * (1.0 + 1e-5) + 1e-12;

        let mut tree = Self {
            dim,
            cells: vec![Cell::empty(center, half)],
        };
        for p in points {
            tree.insert(p);
        }
        tree
    }

    /// Number of points in the tree.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cells[0].count
    }

    fn child_slot(&self, cell: usize, p: &Point) -> usize {
        let c = &self.cells[cell].center;
        (0..self.dim)
            .filter(|&k| p[k] > c[k])
            .fold(0, |slot, k| slot | (1 << k))
    }

    fn subdivide(&mut self, cell: usize) -> usize {
        let Cell { center, half, .. } = self.cells[cell];
        let first = self.cells.len();
        let quarter = half / 2.0;
        for slot in 0..(1usize << self.dim) {
            let mut c = center;
            for (k, ck) in c.iter_mut().enumerate().take(self.dim) {
                *ck += if slot & (1 << k) != 0 { quarter } else { -quarter };
            }
            self.cells.push(Cell::empty(c, quarter));
        }
        self.cells[cell].first_child = Some(first);
        first
    }

    fn insert(&mut self, p: &Point) {
        let mut cell = 0;
        let mut depth = 0;
        loop {
            let node = &mut self.cells[cell];
            let c = node.count as f64;
            for k in 0..self.dim {
                node.mass[k] = (node.mass[k] * c + p[k]) / (c + 1.0);
            }
            node.count += 1;

            if let Some(first) = node.first_child {
                cell = first + self.child_slot(cell, p);
                depth += 1;
                continue;
            }

            let Some(existing) = node.point else {
                node.point = Some(*p);
                return;
            };
            if existing[..self.dim] == p[..self.dim] || depth >= MAX_DEPTH {
                return;
            }

            // Push the points already here one level down, then retry.
            let moved = node.count - 1;
            node.point = None;
            let first = self.subdivide(cell);
            let child = first + self.child_slot(cell, &existing);
            let target = &mut self.cells[child];
            target.count = moved;
            target.mass = existing;
            target.point = Some(existing);

            cell = first + self.child_slot(cell, p);
            depth += 1;
        }
    }

    fn contains(&self, cell: usize, p: &Point) -> bool {
        let node = &self.cells[cell];
        (0..self.dim).all(|k| (p[k] - node.center[k]).abs() <= node.half)
    }

    /// Approximate repulsion on point `p`, itself a member of the tree.
    pub(crate) fn repulsion(&self, p: &Point, theta: f64) -> Repulsion {
        let mut out = Repulsion {
            force: [0.0; MAX_DIM],
            z: 0.0,
        };
        let mut stack = vec![0usize];
        while let Some(cell) = stack.pop() {
            let node = &self.cells[cell];
            if node.count == 0 {
                continue;
            }

            // Leaves compare against their exact position, cells against the mass.
            let anchor = match (node.first_child, node.point) {
                (None, Some(point)) => point,
                _ => node.mass,
            };
            let mut diff = [0.0; MAX_DIM];
            let mut d2 = 0.0;
            for k in 0..self.dim {
                diff[k] = p[k] - anchor[k];
                d2 += diff[k] * diff[k];
            }

            if let Some(first) = node.first_child {
                let width = 2.0 * node.half;
                let far = d2 > 0.0 && width * width < theta * theta * d2;
                if !far || self.contains(cell, p) {
                    stack.extend(first..first + (1 << self.dim));
                    continue;
                }
            } else if d2 == 0.0 {
                // Leaf at p: every other point here sits at distance 0.
                out.z += node.count.saturating_sub(1) as f64;
                continue;
            }

            let q = 1.0 / (1.0 + d2);
            let n = node.count as f64;
            out.z += n * q;
            for k in 0..self.dim {
                out.force[k] += n * q * q * diff[k];
            }
        }
        out
    }
}

/// Copy a row into a fixed-size point.
pub(crate) fn to_point(row: &[f64]) -> Point {
    let mut p = [0.0; MAX_DIM];
    for (slot, v) in p.iter_mut().zip(row) {
        *slot = *v;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(points: &[Point], i: usize, dim: usize) -> Repulsion {
        let mut out = Repulsion {
            force: [0.0; MAX_DIM],
            z: 0.0,
        };
        for (j, q) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            let mut d2 = 0.0;
            for k in 0..dim {
                d2 += (points[i][k] - q[k]).powi(2);
            }
            let w = 1.0 / (1.0 + d2);
            out.z += w;
            for k in 0..dim {
                out.force[k] += w * w * (points[i][k] - q[k]);
            }
        }
        out
    }

    fn grid(dim: usize) -> Vec<Point> {
        (0..40)
            .map(|i| {
                let mut p = [0.0; MAX_DIM];
                for (k, slot) in p.iter_mut().enumerate().take(dim) {
                    *slot = ((i * (k + 3) * 7) % 13) as f64 * 0.37 - (i % 5) as f64;
                }
                p
            })
            .collect()
    }

    #[test]
    fn zero_theta_matches_brute_force() {
        for dim in 1..=3 {
            let points = grid(dim);
            let tree = SpaceTree::new(&points, dim);
            assert_eq!(tree.len(), points.len());
            for i in [0, 7, 39] {
                let approx = tree.repulsion(&points[i], 0.0);
                let exact = brute_force(&points, i, dim);
                assert!((approx.z - exact.z).abs() < 1e-9, "dim {dim} point {i}");
                for k in 0..dim {
                    assert!((approx.force[k] - exact.force[k]).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn approximation_stays_close() {
        let points = grid(2);
        let tree = SpaceTree::new(&points, 2);
        for i in 0..points.len() {
            let approx = tree.repulsion(&points[i], 0.5);
            let exact = brute_force(&points, i, 2);
            assert!((approx.z - exact.z).abs() / exact.z < 0.1);
        }
    }

    #[test]
    fn coincident_points_share_a_leaf() {
        let points = vec![[1.0, 1.0, 0.0]; 5];
        let tree = SpaceTree::new(&points, 2);
        assert_eq!(tree.len(), 5);
        let r = tree.repulsion(&points[0], 0.5);
        assert_eq!(r.z, 4.0);
        assert_eq!(r.force, [0.0; MAX_DIM]);
    }
}
