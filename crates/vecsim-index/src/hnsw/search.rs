//! Greedy descent, layer beam search, k-NN and range queries.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use vecsim_types::{Label, QueryReply, QueryResult, VecSimError, VectorElement};

use super::graph::Candidate;
use super::HnswIndex;
use crate::error::IndexError;
use crate::queue::UpdatableMaxHeap;

impl<T: VectorElement> HnswIndex<T> {
    /// Walk from `start` towards `query` on `layer`, one closest step at a time.
    ///
    /// Deleted nodes are valid waypoints.
    pub(crate) fn greedy_descend(
        &self,
        query: &[T],
        start: u32,
        start_dist: f64,
        layer: usize,
    ) -> (u32, f64) {
        let (mut current, mut current_dist) = (start, start_dist);
        loop {
            let mut changed = false;
            for &n in &self.links(current, layer).out {
                let d = self.distance_to(query, n);
                if d < current_dist {
                    current = n;
                    current_dist = d;
                    changed = true;
                }
            }
            if !changed {
                return (current, current_dist);
            }
        }
    }

    /// Entry point for `query` on `layer`, found by descending from the top.
    pub(crate) fn descend_to(&self, query: &[T], layer: usize) -> Option<(u32, f64)> {
        let entry = self.entry_point?;
        let mut best = (entry, self.distance_to(query, entry));
        for l in (layer + 1..=self.max_level).rev() {
            best = self.greedy_descend(query, best.0, best.1, l);
        }
        Some(best)
    }

    /// Beam search on one layer.
    ///
    /// Returns up to `ef` live nodes sorted by distance, then id. Deleted nodes
    /// are expanded but never returned.
    pub(crate) fn search_layer(
        &self,
        query: &[T],
        entry: u32,
        entry_dist: f64,
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited = HashSet::new();
        visited.insert(entry);

        let mut candidates = BinaryHeap::new();
        candidates.push(Reverse(Candidate {
            dist: entry_dist,
            id: entry,
        }));

        let mut results: UpdatableMaxHeap<f64, u32> = UpdatableMaxHeap::with_capacity(ef + 1);
        if !self.node(entry).deleted {
            results.emplace(entry_dist, entry);
        }
        let mut bound = results.peek().map_or(f64::INFINITY, |(d, _)| d);

        while let Some(Reverse(current)) = candidates.pop() {
            if current.dist > bound && results.len() >= ef {
                break;
            }
            for &n in &self.links(current.id, layer).out {
                if !visited.insert(n) {
                    continue;
                }
                let d = self.distance_to(query, n);
                if results.len() < ef || d < bound {
                    candidates.push(Reverse(Candidate { dist: d, id: n }));
                    if !self.node(n).deleted {
                        results.emplace(d, n);
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                    bound = results.peek().map_or(f64::INFINITY, |(d, _)| d);
                }
            }
        }

        let mut found: Vec<Candidate> = results
            .into_vec()
            .into_iter()
            .map(|(dist, id)| Candidate { dist, id })
            .collect();
        found.sort();
        found
    }

    /// Approximate k nearest labels with a layer-0 beam of width `ef`.
    pub fn search(&self, query: &[T], k: usize, ef: usize) -> Result<QueryReply, IndexError> {
        VecSimError::check_dimension(self.config.dim, query.len())?;
        if ef < k {
            return Err(IndexError::InvalidEf { ef, k });
        }
        let query = self.config.metric.prepare(query);
        let Some((entry, entry_dist)) = self.descend_to(&query, 0) else {
            return Ok(QueryReply::default());
        };
        if k == 0 {
            return Ok(QueryReply::default());
        }

        let found = self.search_layer(&query, entry, entry_dist, ef, 0);
        let mut reply = QueryReply::new(self.to_results(&found));
        reply.truncate(k);
        Ok(reply)
    }

    /// Every live label within `radius` of `query`.
    ///
    /// Exploration continues while candidates lie within a boundary of
    /// `max(best, radius) * (1 + epsilon)`, which tightens as closer nodes turn up.
    pub fn range_search(
        &self,
        query: &[T],
        radius: f64,
        epsilon: f64,
    ) -> Result<QueryReply, IndexError> {
        VecSimError::check_dimension(self.config.dim, query.len())?;
        if radius < 0.0 || epsilon < 0.0 {
            return Err(IndexError::InvalidInput(
                "radius and epsilon must be >= 0".to_string(),
            ));
        }
        let query = self.config.metric.prepare(query);
        let Some((entry, entry_dist)) = self.descend_to(&query, 0) else {
            return Ok(QueryReply::default());
        };

        let mut dynamic_range = entry_dist.max(radius);
        let mut boundary = dynamic_range * (1.0 + epsilon);

        let mut visited = HashSet::new();
        visited.insert(entry);
        let mut candidates = BinaryHeap::new();
        candidates.push(Reverse(Candidate {
            dist: entry_dist,
            id: entry,
        }));
        let mut found = Vec::new();
        if entry_dist <= radius && !self.node(entry).deleted {
            found.push(Candidate {
                dist: entry_dist,
                id: entry,
            });
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if current.dist > boundary {
                break;
            }
            for &n in &self.links(current.id, 0).out {
                if !visited.insert(n) {
                    continue;
                }
                let d = self.distance_to(&query, n);
                if d < boundary {
                    candidates.push(Reverse(Candidate { dist: d, id: n }));
                    if d < dynamic_range {
                        dynamic_range = d.max(radius);
                        boundary = dynamic_range * (1.0 + epsilon);
                    }
                    if d <= radius && !self.node(n).deleted {
                        found.push(Candidate { dist: d, id: n });
                    }
                }
            }
        }

        found.sort();
        Ok(QueryReply::new(self.to_results(&found)))
    }

    /// Labels of `found`, which is sorted by (distance, id). A multi-value
    /// index keeps only the first, closest hit of each label.
    fn to_results(&self, found: &[Candidate]) -> Vec<QueryResult> {
        let mut seen: HashSet<Label> = HashSet::new();
        found
            .iter()
            .map(|c| (self.node(c.id).label, c.dist))
            .filter(|(label, _)| !self.config.multi || seen.insert(*label))
            .map(|(label, dist)| QueryResult::new(label, dist))
            .collect()
    }
}
