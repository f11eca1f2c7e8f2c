//! Query results and result containers.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Label;

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// External label of the matched vector
    pub label: Label,
    /// Distance to the query (lower = closer)
    pub score: f64,
}

impl QueryResult {
    pub fn new(label: Label, score: f64) -> Self {
        Self { label, score }
    }
}

/// Order by score ascending, then label ascending.
pub fn cmp_by_score(a: &QueryResult, b: &QueryResult) -> Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.label.cmp(&b.label))
}

/// The reply to a k-NN or range query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryReply {
    pub results: Vec<QueryResult>,
}

impl QueryReply {
    pub fn new(results: Vec<QueryResult>) -> Self {
        Self { results }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn push(&mut self, result: QueryResult) {
        self.results.push(result);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryResult> {
        self.results.iter()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.results.iter().map(|r| r.label).collect()
    }

    pub fn truncate(&mut self, len: usize) {
        self.results.truncate(len);
    }

    pub fn sort_by_score(&mut self) {
        self.results.sort_by(cmp_by_score);
    }

    pub fn sort_by_label(&mut self) {
        self.results.sort_by_key(|r| r.label);
    }
}

impl IntoIterator for QueryReply {
    type Item = QueryResult;
    type IntoIter = std::vec::IntoIter<QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryReply {
    type Item = &'a QueryResult;
    type IntoIter = std::slice::Iter<'a, QueryResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Accumulates hits before they become a `QueryReply`.
pub trait ResultsContainer {
    fn emplace(&mut self, label: Label, score: f64);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the container. The order of the returned results is unspecified.
    fn into_results(self) -> Vec<QueryResult>;
}

/// Keeps every emplaced hit, duplicates included.
#[derive(Debug, Default)]
pub struct DefaultResults {
    results: Vec<QueryResult>,
}

impl DefaultResults {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultsContainer for DefaultResults {
    fn emplace(&mut self, label: Label, score: f64) {
        self.results.push(QueryResult::new(label, score));
    }

    fn len(&self) -> usize {
        self.results.len()
    }

    fn into_results(self) -> Vec<QueryResult> {
        self.results
    }
}

/// Keeps one hit per label; re-emplacing a label keeps the better score.
#[derive(Debug, Default)]
pub struct UniqueResults {
    best: HashMap<Label, f64>,
}

impl UniqueResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, label: Label) -> bool {
        self.best.contains_key(&label)
    }
}

impl ResultsContainer for UniqueResults {
    fn emplace(&mut self, label: Label, score: f64) {
        self.best
            .entry(label)
            .and_modify(|s| {
                if score < *s {
                    *s = score;
                }
            })
            .or_insert(score);
    }

    fn len(&self) -> usize {
        self.best.len()
    }

    fn into_results(self) -> Vec<QueryResult> {
        self.best
            .into_iter()
            .map(|(label, score)| QueryResult::new(label, score))
            .collect()
    }
}
