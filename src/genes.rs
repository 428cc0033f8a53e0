//! Case-insensitive gene-name resolution.
//!
//! Pathway files and user gene lists rarely agree with the dataset on casing
//! ("Tp53" vs "TP53"), so every lookup folds case and trims whitespace, then
//! reports the dataset's canonical spelling.

use std::collections::HashMap;

use serde::Serialize;

/// Maps folded gene names to dataset column indices.
#[derive(Debug, Clone, Default)]
pub struct GeneLookup {
    by_folded: HashMap<String, usize>,
}

/// Outcome of resolving a list of names against a [`GeneLookup`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolved {
    /// Matched dataset indices, in first-seen order, duplicates collapsed.
    pub indices: Vec<usize>,
    /// Names from the request that did not match any dataset gene.
    pub missing: Vec<String>,
}

impl Resolved {
    /// Number of distinct genes found.
    pub fn found(&self) -> usize {
        self.indices.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

pub(crate) fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

impl GeneLookup {
    /// Build a lookup over canonical gene names.
    ///
    /// When two names fold to the same key the first one wins.
    pub fn new<S: AsRef<str>>(genes: &[S]) -> Self {
        let mut by_folded = HashMap::with_capacity(genes.len());
        for (idx, gene) in genes.iter().enumerate() {
            by_folded.entry(fold(gene.as_ref())).or_insert(idx);
        }
        Self { by_folded }
    }

    /// Index of a single gene.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_folded.get(&fold(name)).copied()
    }

    /// Resolve a list of names, collapsing duplicate matches.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Resolved {
        let mut out = Resolved::default();
        for name in names {
            match self.index_of(name.as_ref()) {
                Some(idx) if !out.indices.contains(&idx) => out.indices.push(idx),
                Some(_) => {}
                None => out.missing.push(name.as_ref().to_string()),
            }
        }
        out
    }
}
