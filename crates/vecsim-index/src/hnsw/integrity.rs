//! Structural consistency check.

use std::collections::HashSet;

use vecsim_types::VectorElement;

use super::HnswIndex;
use crate::error::IndexError;

fn violation(msg: String) -> Result<(), IndexError> {
    Err(IndexError::Integrity(msg))
}

impl<T: VectorElement> HnswIndex<T> {
    /// Verify every structural invariant of the graph.
    ///
    /// Returns the first violation found. Loaded images must pass this before
    /// they are handed out.
    pub fn check_integrity(&self) -> Result<(), IndexError> {
        let count = self.nodes.len();
        if count.checked_mul(self.config.dim) != Some(self.vectors.len()) {
            return violation(format!(
                "{} vector elements for {} nodes of dim {}",
                self.vectors.len(),
                count,
                self.config.dim
            ));
        }
        if count > self.capacity {
            return violation(format!("{} nodes exceed capacity {}", count, self.capacity));
        }

        let mut deleted = 0;
        for (id, node) in self.nodes.iter().enumerate() {
            let id = id as u32;
            if node.levels.is_empty() {
                return violation(format!("node {} has no layers", id));
            }
            if node.deleted {
                deleted += 1;
            } else if node.top_level() > self.max_level {
                return violation(format!(
                    "live node {} above max level {}",
                    id, self.max_level
                ));
            }
            for (layer, links) in node.levels.iter().enumerate() {
                self.check_links(id, layer, &links.out, &links.incoming)?;
            }
        }
        if deleted != self.marked_deleted {
            return violation(format!(
                "{} deleted nodes but counter says {}",
                deleted, self.marked_deleted
            ));
        }

        match self.entry_point {
            Some(entry) => {
                let Some(node) = self.nodes.get(entry as usize) else {
                    return violation(format!("entry point {} out of range", entry));
                };
                if node.deleted {
                    return violation(format!("entry point {} is deleted", entry));
                }
                if node.top_level() != self.max_level {
                    return violation(format!(
                        "entry point {} on level {} but max level is {}",
                        entry,
                        node.top_level(),
                        self.max_level
                    ));
                }
            }
            None if deleted < count => {
                return violation("no entry point but live nodes exist".to_string());
            }
            None => {}
        }

        self.check_labels(count - deleted)
    }

    fn check_links(
        &self,
        id: u32,
        layer: usize,
        out: &[u32],
        incoming: &[u32],
    ) -> Result<(), IndexError> {
        if out.len() > self.config.max_degree(layer) {
            return violation(format!(
                "node {} has {} neighbors on layer {} (cap {})",
                id,
                out.len(),
                layer,
                self.config.max_degree(layer)
            ));
        }
        let mut seen = HashSet::new();
        for &n in out {
            if n == id {
                return violation(format!("node {} links to itself on layer {}", id, layer));
            }
            if !seen.insert(n) {
                return violation(format!("node {} lists {} twice on layer {}", id, n, layer));
            }
            let Some(target) = self.nodes.get(n as usize) else {
                return violation(format!("node {} links to missing node {}", id, n));
            };
            match target.levels.get(layer) {
                Some(links) if links.incoming.contains(&id) => {}
                Some(_) => {
                    return violation(format!(
                        "edge {} -> {} on layer {} missing from incoming set",
                        id, n, layer
                    ))
                }
                None => {
                    return violation(format!(
                        "node {} links to {} above its top layer {}",
                        id, n, layer
                    ))
                }
            }
        }
        for &s in incoming {
            let mirrored = self
                .nodes
                .get(s as usize)
                .and_then(|src| src.levels.get(layer))
                .is_some_and(|links| links.out.contains(&id));
            if !mirrored {
                return violation(format!(
                    "incoming {} -> {} on layer {} has no matching edge",
                    s, id, layer
                ));
            }
        }
        Ok(())
    }

    fn check_labels(&self, live: usize) -> Result<(), IndexError> {
        let mut mapped = 0;
        for (label, ids) in &self.labels {
            if ids.is_empty() {
                return violation(format!("label {} maps to no ids", label));
            }
            if !self.config.multi && ids.len() > 1 {
                return violation(format!(
                    "label {} has {} ids in a single-value index",
                    label,
                    ids.len()
                ));
            }
            for &id in ids {
                match self.nodes.get(id as usize) {
                    Some(node) if node.deleted => {
                        return violation(format!("label {} maps to deleted node {}", label, id))
                    }
                    Some(node) if node.label != *label => {
                        return violation(format!(
                            "label {} maps to node {} labelled {}",
                            label, id, node.label
                        ))
                    }
                    Some(_) => mapped += 1,
                    None => {
                        return violation(format!("label {} maps to missing node {}", label, id))
                    }
                }
            }
        }
        if mapped != live {
            return violation(format!("{} live nodes but {} mapped ids", live, mapped));
        }
        Ok(())
    }
}
