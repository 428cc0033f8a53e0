//! Thresholded correlation networks.
//!
//! Genes are nodes; an undirected edge joins two genes when the magnitude of
//! their correlation reaches the threshold, weighted by that magnitude.
//! Degree (number of strong partners) is the usual hub measure read off the
//! result.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::correlation::CorrelationMatrix;
use crate::error::{Error, Result};
use crate::genes::fold;
use crate::ranking::descending_order;

/// Threshold used when none is configured.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Undirected gene graph with `|r|` edge weights.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    graph: UnGraph<String, f64>,
    threshold: f64,
}

/// One edge of the network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkEdge {
    /// Gene earlier in node order.
    pub source: String,
    /// Gene later in node order.
    pub target: String,
    /// Absolute correlation.
    pub weight: f64,
}

/// Degree of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDegree {
    /// Gene name.
    pub gene: String,
    /// Number of incident edges.
    pub degree: usize,
}

#[derive(Serialize)]
struct NetworkView<'a> {
    threshold: f64,
    nodes: Vec<&'a str>,
    edges: Vec<NetworkEdge>,
    degrees: Vec<NodeDegree>,
}

impl NetworkGraph {
    /// Underlying petgraph graph; node weights are gene names.
    pub fn graph(&self) -> &UnGraph<String, f64> {
        &self.graph
    }

    /// Threshold the edges were selected with.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of genes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Gene names in node order.
    pub fn genes(&self) -> Vec<&str> {
        self.graph.node_weights().map(String::as_str).collect()
    }

    /// Edges in insertion order (row-major over the upper triangle).
    pub fn edges(&self) -> Vec<NetworkEdge> {
        self.graph
            .edge_references()
            .map(|e| NetworkEdge {
                source: self.graph[e.source()].clone(),
                target: self.graph[e.target()].clone(),
                weight: *e.weight(),
            })
            .collect()
    }

    /// Whether two genes (case-insensitive) are connected.
    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        match (self.node(a), self.node(b)) {
            (Some(x), Some(y)) => self.graph.find_edge(x, y).is_some(),
            _ => false,
        }
    }

    /// Degree of every node, highest first; ties keep node order.
    pub fn degrees(&self) -> Vec<NodeDegree> {
        let raw: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors(n).count())
            .collect();
        let keys: Vec<f64> = raw.iter().map(|&d| d as f64).collect();
        descending_order(&keys)
            .into_iter()
            .map(|i| NodeDegree {
                gene: self.graph[NodeIndex::new(i)].clone(),
                degree: raw[i],
            })
            .collect()
    }

    /// The `n` highest-degree nodes.
    pub fn top_degrees(&self, n: usize) -> Vec<NodeDegree> {
        let mut degrees = self.degrees();
        degrees.truncate(n);
        degrees
    }

    fn node(&self, name: &str) -> Option<NodeIndex> {
        let key = fold(name);
        self.graph
            .node_indices()
            .find(|&n| fold(&self.graph[n]) == key)
    }
}

impl Serialize for NetworkGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        NetworkView {
            threshold: self.threshold,
            nodes: self.genes(),
            edges: self.edges(),
            degrees: self.degrees(),
        }
        .serialize(serializer)
    }
}

/// Connect genes whose `|r|` is at least `threshold` (in [0, 1]).
///
/// With `gene_subset`, only the listed genes (case-insensitive, duplicates
/// collapsed) become nodes; the build fails with [`Error::EmptyPathway`]
/// when none of them is in the dataset.
pub fn build_network<S: AsRef<str>>(
    corr: &CorrelationMatrix,
    threshold: f64,
    gene_subset: Option<&[S]>,
) -> Result<NetworkGraph> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidParameter {
            name: "threshold",
            message: "must be within [0, 1]",
        });
    }

    let indices: Vec<usize> = match gene_subset {
        Some(names) => {
            let resolved = corr.lookup().resolve(names);
            if resolved.is_empty() {
                return Err(Error::EmptyPathway(format!("{} network genes listed", names.len())));
            }
            resolved.indices
        }
        None => (0..corr.n_genes()).collect(),
    };

    let values = corr.values();
    let mut graph = UnGraph::<String, f64>::with_capacity(indices.len(), 0);
    let nodes: Vec<NodeIndex> = indices
        .iter()
        .map(|&i| graph.add_node(corr.genes()[i].clone()))
        .collect();

    for a in 0..indices.len() {
        for b in (a + 1)..indices.len() {
            let weight = values[[indices[a], indices[b]]].abs();
            if weight >= threshold {
                graph.add_edge(nodes[a], nodes[b], weight);
            }
        }
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        threshold,
        "correlation network built"
    );
    Ok(NetworkGraph { graph, threshold })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationMethod;
    use ndarray::array;

    const NO_SUBSET: Option<&[&str]> = None;

    fn corr() -> CorrelationMatrix {
        let values = array![
            [1.0, 0.9, -0.8, 0.1],
            [0.9, 1.0, -0.7, 0.2],
            [-0.8, -0.7, 1.0, 0.0],
            [0.1, 0.2, 0.0, 1.0],
        ];
        let genes = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        CorrelationMatrix::new(genes, values, CorrelationMethod::Pearson).unwrap()
    }

    #[test]
    fn edges_follow_absolute_threshold() {
        let net = build_network(&corr(), 0.75, NO_SUBSET).unwrap();
        assert_eq!(net.node_count(), 4);
        assert_eq!(net.edge_count(), 2);
        assert!(net.has_edge("a", "b"));
        assert!(net.has_edge("A", "C"));
        assert!(!net.has_edge("B", "C"));
        let edges = net.edges();
        assert!((edges[1].weight - 0.8).abs() < 1e-12);
    }

    #[test]
    fn degrees_sorted_descending_and_stable() {
        let net = build_network(&corr(), 0.65, NO_SUBSET).unwrap();
        let degrees = net.degrees();
        let order: Vec<_> = degrees.iter().map(|d| (d.gene.as_str(), d.degree)).collect();
        assert_eq!(order, vec![("A", 2), ("B", 2), ("C", 2), ("D", 0)]);
        assert_eq!(net.top_degrees(1).len(), 1);
    }

    #[test]
    fn threshold_extremes() {
        let full = build_network(&corr(), 0.0, NO_SUBSET).unwrap();
        assert_eq!(full.edge_count(), 6);
        let none = build_network(&corr(), 1.0, NO_SUBSET).unwrap();
        assert_eq!(none.edge_count(), 0);
        assert!(build_network(&corr(), 1.5, NO_SUBSET).is_err());
        assert!(build_network(&corr(), f64::NAN, NO_SUBSET).is_err());
    }

    #[test]
    fn subset_restricts_nodes() {
        let net = build_network(&corr(), 0.5, Some(&["c", "b", "C"][..])).unwrap();
        assert_eq!(net.genes(), vec!["C", "B"]);
        assert_eq!(net.edge_count(), 1);
        assert!(matches!(
            build_network(&corr(), 0.5, Some(&["Z"][..])),
            Err(Error::EmptyPathway(_))
        ));
    }

    #[test]
    fn serializes_nodes_edges_and_degrees() {
        let net = build_network(&corr(), 0.75, NO_SUBSET).unwrap();
        let json = serde_json::to_value(&net).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 4);
        assert_eq!(json["edges"].as_array().unwrap().len(), 2);
        assert_eq!(json["degrees"][0]["gene"], "A");
    }
}
