//! Node arena and edge bookkeeping.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vecsim_types::{Label, VectorElement};

use super::HnswIndex;

/// Neighbor lists of one node on one layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Links {
    pub(crate) out: Vec<u32>,
    /// Every node with an out-edge to this one on the same layer
    pub(crate) incoming: Vec<u32>,
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) label: Label,
    pub(crate) deleted: bool,
    pub(crate) generation: u64,
    /// One entry per layer, 0 through the node's top layer
    pub(crate) levels: Vec<Links>,
}

impl Node {
    pub(crate) fn new(label: Label, top_level: usize, generation: u64) -> Self {
        Self {
            label,
            deleted: false,
            generation,
            levels: vec![Links::default(); top_level + 1],
        }
    }

    pub(crate) fn top_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub(crate) fn is_isolated(&self) -> bool {
        self.levels
            .iter()
            .all(|l| l.out.is_empty() && l.incoming.is_empty())
    }
}

/// Candidate ordered by distance, ties by id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub(crate) dist: f64,
    pub(crate) id: u32,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl<T: VectorElement> HnswIndex<T> {
    pub(crate) fn node(&self, id: u32) -> &Node {
        &self.nodes[id as usize]
    }

    pub(crate) fn links(&self, id: u32, layer: usize) -> &Links {
        &self.nodes[id as usize].levels[layer]
    }

    fn links_mut(&mut self, id: u32, layer: usize) -> &mut Links {
        &mut self.nodes[id as usize].levels[layer]
    }

    pub(crate) fn stored(&self, id: u32) -> &[T] {
        let dim = self.config.dim;
        let start = id as usize * dim;
        &self.vectors[start..start + dim]
    }

    pub(crate) fn distance_to(&self, query: &[T], id: u32) -> f64 {
        self.config.metric.distance(query, self.stored(id))
    }

    pub(crate) fn distance_between(&self, a: u32, b: u32) -> f64 {
        self.config.metric.distance(self.stored(a), self.stored(b))
    }

    /// Add `from -> to` on `layer` and mirror it in `to`'s incoming set.
    pub(crate) fn add_edge(&mut self, from: u32, to: u32, layer: usize) {
        if from == to || self.links(from, layer).out.contains(&to) {
            return;
        }
        self.links_mut(from, layer).out.push(to);
        self.links_mut(to, layer).incoming.push(from);
    }

    pub(crate) fn remove_edge(&mut self, from: u32, to: u32, layer: usize) {
        self.links_mut(from, layer).out.retain(|&n| n != to);
        self.links_mut(to, layer).incoming.retain(|&n| n != from);
    }

    /// Draw the top layer of a new node.
    ///
    /// Each draw uses its own seeded generator so the sequence depends only on
    /// the configured seed and the number of draws so far.
    pub(crate) fn draw_level(&mut self) -> usize {
        let seed = self.config.level_seed.wrapping_add(self.level_counter);
        self.level_counter += 1;
        let mut rng = StdRng::seed_from_u64(seed);
        let uniform: f64 = 1.0 - rng.random::<f64>();
        (-uniform.ln() * self.config.level_multiplier()) as usize
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}
