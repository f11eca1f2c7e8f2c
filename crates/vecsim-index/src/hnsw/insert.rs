//! Insertion and neighbor selection.

use tracing::trace;

use vecsim_types::{Label, VecSimError, VectorElement};

use super::graph::{Candidate, Node};
use super::HnswIndex;
use crate::error::IndexError;

impl<T: VectorElement> HnswIndex<T> {
    /// Insert one vector into a free slot and link it into the graph.
    ///
    /// Fails with `CapacityReached` when every allocated slot is taken; the
    /// owner decides when to grow.
    pub fn insert(&mut self, label: Label, vector: &[T]) -> Result<u32, IndexError> {
        VecSimError::check_dimension(self.config.dim, vector.len())?;
        if self.nodes.len() >= self.capacity {
            return Err(IndexError::CapacityReached(self.capacity));
        }

        let data = self.config.metric.prepare(vector);
        let level = self.draw_level();
        let generation = self.next_generation();
        let id = self.nodes.len() as u32;

        self.vectors.extend_from_slice(&data);
        self.nodes.push(Node::new(label, level, generation));
        self.labels.entry(label).or_default().push(id);

        let start = self.entry_point.map(|e| (e, self.distance_to(&data, e)));
        let Some((mut entry, mut entry_dist)) = start else {
            self.entry_point = Some(id);
            self.max_level = level;
            trace!(id = id, level = level, "Inserted first node");
            return Ok(id);
        };

        let max_level = self.max_level;
        for layer in (level + 1..=max_level).rev() {
            (entry, entry_dist) = self.greedy_descend(&data, entry, entry_dist, layer);
        }

        for layer in (0..=level.min(max_level)).rev() {
            let found =
                self.search_layer(&data, entry, entry_dist, self.config.ef_construction, layer);
            let cap = self.config.max_degree(layer);
            let selected = self.select_neighbors(&found, cap);
            for &n in &selected {
                self.add_edge(id, n, layer);
                self.add_edge(n, id, layer);
                if self.links(n, layer).out.len() > cap {
                    self.evict_farthest(n, layer);
                }
            }
            if let Some(closest) = found.first() {
                entry = closest.id;
                entry_dist = closest.dist;
            }
        }

        if level > max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }
        trace!(id = id, label = label, level = level, "Inserted node");
        Ok(id)
    }

    /// Pick up to `cap` of `candidates` (sorted nearest first), skipping any
    /// candidate that is closer to an already chosen neighbor than to the target.
    pub(crate) fn select_neighbors(&self, candidates: &[Candidate], cap: usize) -> Vec<u32> {
        if candidates.len() <= cap {
            return candidates.iter().map(|c| c.id).collect();
        }
        let mut chosen: Vec<u32> = Vec::with_capacity(cap);
        for c in candidates {
            if chosen.len() >= cap {
                break;
            }
            if chosen
                .iter()
                .all(|&s| self.distance_between(s, c.id) >= c.dist)
            {
                chosen.push(c.id);
            }
        }
        chosen
    }

    /// Drop the weakest out-edge of `id` on `layer`; ties evict the higher id.
    pub(crate) fn evict_farthest(&mut self, id: u32, layer: usize) {
        let farthest = self
            .links(id, layer)
            .out
            .iter()
            .map(|&n| Candidate {
                dist: self.distance_between(id, n),
                id: n,
            })
            .max();
        if let Some(victim) = farthest {
            self.remove_edge(id, victim.id, layer);
        }
    }
}
