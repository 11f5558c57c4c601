//! In-memory HNSW graph: vector cache, layered adjacency and the insert /
//! search algorithms.
//!
//! Nodes are plain ids into `vectors`; adjacency lists hold ids, never
//! references. Nothing here touches disk. Insertion reports every
//! adjacency row it changed so the caller can persist them one by one.

use std::collections::{HashMap, HashSet};

use memory_types::NodeId;

use crate::heap::{MaxHeap, MinHeap, Prioritized};
use crate::select::NeighborSelector;
use crate::similarity::cosine_similarity;

/// Tunables the algorithms need; a view over `HnswConfig`.
#[derive(Debug, Clone, Copy)]
pub struct GraphParams {
    pub m_max: usize,
    pub m_max0: usize,
    pub ef_construction: usize,
}

impl GraphParams {
    /// Degree bound for a layer.
    pub fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m_max0
        } else {
            self.m_max
        }
    }
}

/// Adjacency rows and entry point changes produced by one insertion.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InsertDelta {
    /// (layer, node) rows whose neighbour list changed, in change order
    pub rows: Vec<(usize, NodeId)>,
    /// Entry point or max layer moved
    pub entry_changed: bool,
}

impl InsertDelta {
    fn touch(&mut self, layer: usize, node: NodeId) {
        if !self.rows.contains(&(layer, node)) {
            self.rows.push((layer, node));
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Graph {
    vectors: HashMap<NodeId, Vec<f32>>,
    layers: Vec<HashMap<NodeId, Vec<NodeId>>>,
    entry_point: Option<NodeId>,
    max_layer: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph restored from persisted state: `max_layer + 1` empty layers.
    pub fn with_entry(entry_point: Option<NodeId>, max_layer: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            layers: vec![HashMap::new(); max_layer + 1],
            entry_point,
            max_layer,
        }
    }

    pub fn entry_point(&self) -> Option<NodeId> {
        self.entry_point
    }

    pub fn max_layer(&self) -> usize {
        self.max_layer
    }

    /// Move the entry point, growing the layer stack to `max_layer`.
    pub fn set_entry(&mut self, entry_point: NodeId, max_layer: usize) {
        self.ensure_layers(max_layer);
        self.entry_point = Some(entry_point);
        self.max_layer = max_layer;
    }

    /// Forget the entry point. The next insert becomes the entry.
    pub fn clear_entry(&mut self) {
        self.entry_point = None;
        self.max_layer = 0;
    }

    /// Highest layer with an adjacency row for `id`.
    pub fn node_level(&self, id: NodeId) -> Option<usize> {
        self.layers
            .iter()
            .rposition(|adjacency| adjacency.contains_key(&id))
    }

    /// Highest layer holding a node with a cached vector, and that node
    /// (smallest id on ties).
    pub fn highest_cached_node(&self) -> Option<(NodeId, usize)> {
        for (layer, adjacency) in self.layers.iter().enumerate().rev() {
            let best = adjacency
                .keys()
                .filter(|id| self.vectors.contains_key(id))
                .min()
                .copied();
            if let Some(id) = best {
                return Some((id, layer));
            }
        }
        self.vectors.keys().min().map(|&id| (id, 0))
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, layer: usize) -> Option<&HashMap<NodeId, Vec<NodeId>>> {
        self.layers.get(layer)
    }

    /// Number of cached vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &HashMap<NodeId, Vec<f32>> {
        &self.vectors
    }

    pub fn vector(&self, id: NodeId) -> Option<&[f32]> {
        self.vectors.get(&id).map(Vec::as_slice)
    }

    pub fn cache_vector(&mut self, id: NodeId, vector: Vec<f32>) {
        self.vectors.insert(id, vector);
    }

    /// Neighbours of `node` at `layer`; empty when either is unknown.
    pub fn neighbors(&self, layer: usize, node: NodeId) -> &[NodeId] {
        self.layers
            .get(layer)
            .and_then(|adjacency| adjacency.get(&node))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace a neighbour list, growing the layer stack if needed.
    pub fn set_neighbors(&mut self, layer: usize, node: NodeId, neighbors: Vec<NodeId>) {
        self.ensure_layers(layer);
        self.layers[layer].insert(node, neighbors);
    }

    fn ensure_layers(&mut self, layer: usize) {
        while self.layers.len() <= layer {
            self.layers.push(HashMap::new());
        }
    }

    fn similarity(&self, query: &[f32], id: NodeId) -> Option<f32> {
        self.vectors.get(&id).map(|v| cosine_similarity(query, v))
    }

    /// Single-path hill climb: keep moving to the neighbour with strictly
    /// higher similarity until none improves.
    pub fn greedy_search_layer(&self, query: &[f32], entry: NodeId, layer: usize) -> NodeId {
        let Some(mut best) = self.similarity(query, entry) else {
            return entry;
        };
        let mut current = entry;

        loop {
            let mut next = current;
            for &neighbor in self.neighbors(layer, current) {
                if let Some(similarity) = self.similarity(query, neighbor) {
                    if similarity > best {
                        best = similarity;
                        next = neighbor;
                    }
                }
            }
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Bounded best-first search returning ids, best first.
    pub fn search_layer_ef(
        &self,
        query: &[f32],
        entry: NodeId,
        layer: usize,
        ef: usize,
    ) -> Vec<NodeId> {
        self.search_layer_scored(query, entry, layer, ef)
            .into_iter()
            .map(|p| p.value)
            .collect()
    }

    /// Bounded best-first search keeping the best `ef` results, sorted by
    /// descending similarity. An entry without a cached vector yields `[]`;
    /// neighbours without one are skipped.
    pub fn search_layer_scored(
        &self,
        query: &[f32],
        entry: NodeId,
        layer: usize,
        ef: usize,
    ) -> Vec<Prioritized<NodeId>> {
        let ef = ef.max(1);
        let Some(entry_similarity) = self.similarity(query, entry) else {
            return Vec::new();
        };

        let mut visited = HashSet::from([entry]);
        let mut candidates = MaxHeap::new();
        let mut results = MinHeap::with_capacity(ef + 1);
        candidates.push(Prioritized::new(entry, entry_similarity));
        results.push(Prioritized::new(entry, entry_similarity));

        while let Some(candidate) = candidates.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if worst.priority > candidate.priority {
                        break;
                    }
                }
            }

            for &neighbor in self.neighbors(layer, candidate.value) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let Some(similarity) = self.similarity(query, neighbor) else {
                    continue;
                };

                let improves = results.len() < ef
                    || results.peek().map_or(true, |worst| similarity > worst.priority);
                if improves {
                    candidates.push(Prioritized::new(neighbor, similarity));
                    results.push(Prioritized::new(neighbor, similarity));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found = results.into_vec();
        sort_best_first(&mut found);
        found
    }

    /// Greedy descent to layer 1, then a beam search of width `ef` on layer 0.
    pub fn search(&self, query: &[f32], ef: usize) -> Vec<Prioritized<NodeId>> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };

        let mut current = entry;
        for layer in (1..=self.max_layer).rev() {
            current = self.greedy_search_layer(query, current, layer);
        }
        self.search_layer_scored(query, current, 0, ef)
    }

    /// Link node `id` into every layer up to `level`.
    ///
    /// The vector is cached if it is not already. Returns the rows that
    /// changed; the graph itself is already updated.
    pub fn insert(
        &mut self,
        id: NodeId,
        vector: &[f32],
        level: usize,
        params: &GraphParams,
        selector: &dyn NeighborSelector,
    ) -> InsertDelta {
        let mut delta = InsertDelta::default();
        if !self.vectors.contains_key(&id) {
            self.vectors.insert(id, vector.to_vec());
        }

        let Some(entry) = self.entry_point else {
            self.ensure_layers(level);
            for layer in 0..=level {
                self.layers[layer].insert(id, Vec::new());
                delta.touch(layer, id);
            }
            self.entry_point = Some(id);
            self.max_layer = level;
            delta.entry_changed = true;
            return delta;
        };

        self.ensure_layers(level);
        let top = self.max_layer;

        let mut current = entry;
        for layer in (level + 1..=top).rev() {
            current = self.greedy_search_layer(vector, current, layer);
        }

        for layer in (0..=level.min(top)).rev() {
            let candidates: Vec<Prioritized<NodeId>> = self
                .search_layer_scored(vector, current, layer, params.ef_construction)
                .into_iter()
                .filter(|c| c.value != id)
                .collect();

            let m = params.max_degree(layer);
            let selected = selector.select(vector, &candidates, m, &self.vectors);

            self.layers[layer].insert(id, selected.clone());
            delta.touch(layer, id);

            for &neighbor in &selected {
                self.link(layer, neighbor, id, m, selector);
                delta.touch(layer, neighbor);
            }

            if let Some(&best) = selected.first() {
                current = best;
            }
        }

        if level > top {
            for layer in top + 1..=level {
                self.layers[layer].insert(id, Vec::new());
                delta.touch(layer, id);
            }
            self.entry_point = Some(id);
            self.max_layer = level;
            delta.entry_changed = true;
        }

        delta
    }

    /// Add the back edge `node -> new_id`; if `node` overflows its bound,
    /// keep its own best `m` by similarity to `node`.
    fn link(
        &mut self,
        layer: usize,
        node: NodeId,
        new_id: NodeId,
        m: usize,
        selector: &dyn NeighborSelector,
    ) {
        let mut list = self.layers[layer].remove(&node).unwrap_or_default();
        if !list.contains(&new_id) {
            list.push(new_id);
        }

        if list.len() > m {
            list = match self.vectors.get(&node) {
                Some(base) => {
                    let mut scored: Vec<Prioritized<NodeId>> = list
                        .iter()
                        .filter_map(|&n| {
                            self.vectors
                                .get(&n)
                                .map(|v| Prioritized::new(n, cosine_similarity(base, v)))
                        })
                        .collect();
                    sort_best_first(&mut scored);
                    selector.select(base, &scored, m, &self.vectors)
                }
                None => {
                    list.truncate(m);
                    list
                }
            };
        }

        self.layers[layer].insert(node, list);
    }
}

/// Descending similarity; ties broken by ascending id so order is stable.
fn sort_best_first(items: &mut [Prioritized<NodeId>]) {
    items.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.value.cmp(&b.value))
    });
}
