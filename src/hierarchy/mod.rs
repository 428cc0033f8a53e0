//! Hierarchical structures built from gene clustering.
//!
//! [`LinkageTree`] records agglomerative merges in the SciPy/MATLAB
//! convention and derives the views a caller needs from one tree:
//!
//! ```text
//! View               │ Method
//! ───────────────────┼──────────────────────────────
//! Linkage matrix     │ LinkageTree::linkage_rows
//! Dendrogram order   │ LinkageTree::leaf_order
//! Flat by height     │ LinkageTree::cut_at_distance
//! Flat by count      │ LinkageTree::cut_to_k
//! ```

mod dendrogram;

pub use dendrogram::{LinkageTree, Merge};
