//! Soft delete, neighborhood repair and slot compaction.

use tracing::trace;

use vecsim_types::VectorElement;

use super::graph::Candidate;
use super::HnswIndex;
use crate::error::IndexError;

impl<T: VectorElement> HnswIndex<T> {
    fn check_id(&self, id: u32) -> Result<(), IndexError> {
        if (id as usize) < self.nodes.len() {
            Ok(())
        } else {
            Err(IndexError::InvalidNodeState {
                id,
                reason: format!("out of range ({} nodes)", self.nodes.len()),
            })
        }
    }

    /// True when `id` has no edges left on any layer.
    pub fn is_isolated(&self, id: u32) -> bool {
        self.nodes.get(id as usize).is_some_and(|n| n.is_isolated())
    }

    /// Exclude `id` from results and from its label. Its edges stay in place.
    pub fn mark_deleted(&mut self, id: u32) -> Result<(), IndexError> {
        self.check_id(id)?;
        if self.node(id).deleted {
            return Err(IndexError::InvalidNodeState {
                id,
                reason: "already marked deleted".to_string(),
            });
        }

        let label = self.node(id).label;
        self.nodes[id as usize].deleted = true;
        self.marked_deleted += 1;
        if let Some(ids) = self.labels.get_mut(&label) {
            ids.retain(|&i| i != id);
            if ids.is_empty() {
                self.labels.remove(&label);
            }
        }

        if self.entry_point == Some(id) {
            self.replace_entry_point(id);
        }
        trace!(id = id, label = label, "Marked node deleted");
        Ok(())
    }

    /// Pick a live node on the highest possible layer as the new entry point.
    fn replace_entry_point(&mut self, old: u32) {
        let top = self.max_level;
        let neighbor = self
            .links(old, top)
            .out
            .iter()
            .copied()
            .find(|&n| !self.node(n).deleted);
        if let Some(n) = neighbor {
            self.entry_point = Some(n);
            return;
        }

        let best = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.deleted)
            .max_by(|(ia, a), (ib, b)| a.top_level().cmp(&b.top_level()).then(ib.cmp(ia)));
        match best {
            Some((id, node)) => {
                self.entry_point = Some(id as u32);
                self.max_level = node.top_level();
            }
            None => {
                self.entry_point = None;
                self.max_level = 0;
            }
        }
    }

    /// Reconnect the in-neighbors of a deleted node and isolate it.
    ///
    /// Each live in-neighbor loses its edge to `id` and is offered the deleted
    /// node's live out-neighbors as replacements, up to its degree cap.
    pub fn repair(&mut self, id: u32) -> Result<(), IndexError> {
        self.check_id(id)?;
        if !self.node(id).deleted {
            return Err(IndexError::InvalidNodeState {
                id,
                reason: "repair requires a deleted node".to_string(),
            });
        }

        for layer in 0..self.node(id).levels.len() {
            let incoming = self.links(id, layer).incoming.clone();
            let replacements = self.links(id, layer).out.clone();
            let cap = self.config.max_degree(layer);

            for n in incoming {
                self.remove_edge(n, id, layer);
                if !self.node(n).deleted {
                    self.reconnect(n, &replacements, cap, layer);
                }
            }
            for c in replacements {
                self.remove_edge(id, c, layer);
            }
        }
        trace!(id = id, "Repaired deleted node");
        Ok(())
    }

    fn reconnect(&mut self, n: u32, replacements: &[u32], cap: usize, layer: usize) {
        let existing = self.links(n, layer).out.clone();
        if existing.len() >= cap {
            return;
        }
        let mut candidates: Vec<Candidate> = replacements
            .iter()
            .copied()
            .filter(|&c| c != n && !self.node(c).deleted && !existing.contains(&c))
            .map(|c| Candidate {
                dist: self.distance_between(n, c),
                id: c,
            })
            .collect();
        candidates.sort();

        let mut chosen = existing;
        for c in &candidates {
            if chosen.len() >= cap {
                break;
            }
            if chosen
                .iter()
                .all(|&s| self.distance_between(s, c.id) >= c.dist)
            {
                chosen.push(c.id);
                self.add_edge(n, c.id, layer);
            }
        }
        // Never leave a live node without a way out.
        if chosen.is_empty() {
            if let Some(c) = candidates.first() {
                self.add_edge(n, c.id, layer);
            }
        }
    }

    /// Physically remove a deleted, isolated node by moving the last slot into it.
    ///
    /// Refuses to relocate a last slot that is itself marked deleted.
    pub fn swap_remove(&mut self, id: u32) -> Result<(), IndexError> {
        self.check_id(id)?;
        let node = self.node(id);
        if !node.deleted || !node.is_isolated() {
            return Err(IndexError::InvalidNodeState {
                id,
                reason: "swap requires a deleted, repaired node".to_string(),
            });
        }

        let last = (self.nodes.len() - 1) as u32;
        if id != last {
            if self.node(last).deleted {
                return Err(IndexError::InvalidNodeState {
                    id: last,
                    reason: "last slot is pending deletion".to_string(),
                });
            }
            self.relocate(last, id);
        }

        self.nodes.pop();
        self.vectors.truncate(last as usize * self.config.dim);
        self.marked_deleted -= 1;
        trace!(id = id, moved = last, "Swapped out deleted node");
        Ok(())
    }

    /// Move node `from` into the free slot `to`, rewriting every reference.
    fn relocate(&mut self, from: u32, to: u32) {
        let dim = self.config.dim;
        for layer in 0..self.node(from).levels.len() {
            let links = self.links(from, layer).clone();
            for t in links.out {
                for i in self.nodes[t as usize].levels[layer].incoming.iter_mut() {
                    if *i == from {
                        *i = to;
                    }
                }
            }
            for s in links.incoming {
                for o in self.nodes[s as usize].levels[layer].out.iter_mut() {
                    if *o == from {
                        *o = to;
                    }
                }
            }
        }

        let label = self.node(from).label;
        if let Some(ids) = self.labels.get_mut(&label) {
            for i in ids.iter_mut() {
                if *i == from {
                    *i = to;
                }
            }
        }
        if self.entry_point == Some(from) {
            self.entry_point = Some(to);
        }

        self.nodes.swap(to as usize, from as usize);
        let (from, to) = (from as usize, to as usize);
        self.vectors
            .copy_within(from * dim..(from + 1) * dim, to * dim);
    }
}
