use crate::{Error, ErrorKind};
use nohash::IntMap;
use rand::rngs::StdRng;
use rand::Rng;

/// Direction in which to traverse a vertex's incident edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    In,
    Out,
    All,
}

/// A read-only, densely-indexed multigraph: the Graph provider the Leiden
/// engine optimises over.
///
/// Vertices are `0..vcount()`, edges are `0..ecount()`. Degree and strength
/// are precomputed eagerly at construction, per direction, since they never
/// change once the graph exists; this is the "eagerly precomputed" half of
/// the caching split described for the engine's resource model. Adjacency
/// lists (`neighbors`/`incident_edges`) are also built eagerly rather than
/// lazily, since a `Graph` here is small enough, and immutable enough, that
/// there is no benefit to deferring it — the mutable, query-order-dependent
/// caching the original design reserves for lazily-built state lives one
/// level up, in `Partition`'s neighbor-community cache.
pub struct Graph {
    directed: bool,
    correct_self_loops: bool,
    edges: Vec<(usize, usize, f64)>,
    node_size: Vec<u64>,
    node_self_weight: Vec<f64>,
    out_adj: Vec<Vec<(usize, usize)>>,
    in_adj: Vec<Vec<(usize, usize)>>,
    strength_out: Vec<f64>,
    strength_in: Vec<f64>,
    total_weight: f64,
    total_size: u64,
    density: f64,
}

impl Graph {
    /// Builds a graph from `n` vertices and a list of `(src, dst, weight)`
    /// edges. `node_size` defaults to `1` per vertex; `correct_self_loops`
    /// defaults to whether any self-loop is present.
    pub fn new(
        n: usize,
        directed: bool,
        edges: Vec<(usize, usize, f64)>,
        node_size: Option<Vec<u64>>,
        correct_self_loops: Option<bool>,
    ) -> Result<Graph, Error> {
        for &(u, v, w) in &edges {
            if u >= n || v >= n {
                return Err(Error::new(
                    ErrorKind::InconsistentSizes,
                    format!("edge ({}, {}) references a vertex outside [0, {})", u, v, n),
                ));
            }
            if w.is_nan() || w.is_infinite() || w < 0.0 {
                return Err(Error::new(
                    ErrorKind::InvalidWeight,
                    format!("edge ({}, {}) has invalid weight {}", u, v, w),
                ));
            }
        }
        let node_size = match node_size {
            Some(v) => {
                if v.len() != n {
                    return Err(Error::new(
                        ErrorKind::InconsistentSizes,
                        format!("node_size has length {}, expected {}", v.len(), n),
                    ));
                }
                v
            }
            None => vec![1; n],
        };

        let has_self_loop = edges.iter().any(|&(u, v, _)| u == v);
        let correct_self_loops = correct_self_loops.unwrap_or(has_self_loop);

        let mut out_adj: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
        let mut in_adj: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];

        for (e, &(u, v, _)) in edges.iter().enumerate() {
            if directed {
                out_adj[u].push((v, e));
                in_adj[v].push((u, e));
            } else if u == v {
                // A self-loop occupies both "stubs" of the vertex, so it is
                // recorded twice in the single undirected adjacency list.
                out_adj[u].push((v, e));
                out_adj[u].push((v, e));
            } else {
                out_adj[u].push((v, e));
                out_adj[v].push((u, e));
            }
        }
        if !directed {
            in_adj = out_adj.clone();
        }

        let strength_out: Vec<f64> = out_adj
            .iter()
            .map(|adj| adj.iter().map(|&(_, e)| edges[e].2).sum())
            .collect();
        let strength_in: Vec<f64> = in_adj
            .iter()
            .map(|adj| adj.iter().map(|&(_, e)| edges[e].2).sum())
            .collect();

        // Summed rather than assigned: a vertex with more than one self-loop
        // edge in the input multigraph must contribute all of them, the
        // same way `strength`/`w_in` already accumulate across duplicate
        // self-loops via the doubled adjacency list.
        let mut node_self_weight = vec![0.0; n];
        for &(u, v, w) in &edges {
            if u == v {
                node_self_weight[u] += w;
            }
        }

        let total_weight: f64 = edges.iter().map(|&(_, _, w)| w).sum();
        let total_size: u64 = node_size.iter().sum();

        let normalise = if correct_self_loops {
            (total_size * total_size) as f64
        } else {
            (total_size * total_size.saturating_sub(1)) as f64
        };
        let density = if normalise == 0.0 {
            0.0
        } else if directed {
            total_weight / normalise
        } else {
            2.0 * total_weight / normalise
        };

        Ok(Graph {
            directed,
            correct_self_loops,
            edges,
            node_size,
            node_self_weight,
            out_adj,
            in_adj,
            strength_out,
            strength_in,
            total_weight,
            total_size,
            density,
        })
    }

    pub fn vcount(&self) -> usize {
        self.node_size.len()
    }

    pub fn ecount(&self) -> usize {
        self.edges.len()
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn correct_self_loops(&self) -> bool {
        self.correct_self_loops
    }

    pub fn edge(&self, e: usize) -> (usize, usize) {
        let (u, v, _) = self.edges[e];
        (u, v)
    }

    pub fn edge_weight(&self, e: usize) -> f64 {
        self.edges[e].2
    }

    pub fn node_size(&self, v: usize) -> u64 {
        self.node_size[v]
    }

    pub fn node_self_weight(&self, v: usize) -> f64 {
        self.node_self_weight[v]
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    fn adj(&self, v: usize, mode: Mode) -> Vec<(usize, usize)> {
        match mode {
            Mode::Out => self.out_adj[v].clone(),
            Mode::In => self.in_adj[v].clone(),
            Mode::All => {
                if self.directed {
                    let mut both = self.out_adj[v].clone();
                    both.extend_from_slice(&self.in_adj[v]);
                    both
                } else {
                    self.out_adj[v].clone()
                }
            }
        }
    }

    /// Neighbors of `v` in the given direction, in the same order as
    /// [`Graph::incident_edges`].
    pub fn neighbors(&self, v: usize, mode: Mode) -> Vec<usize> {
        self.adj(v, mode).into_iter().map(|(u, _)| u).collect()
    }

    /// Incident edges of `v` in the given direction, parallel to
    /// [`Graph::neighbors`].
    pub fn incident_edges(&self, v: usize, mode: Mode) -> Vec<usize> {
        self.adj(v, mode).into_iter().map(|(_, e)| e).collect()
    }

    pub fn degree(&self, v: usize, mode: Mode) -> usize {
        match mode {
            Mode::Out => self.out_adj[v].len(),
            Mode::In => self.in_adj[v].len(),
            Mode::All => {
                if self.directed {
                    self.out_adj[v].len() + self.in_adj[v].len()
                } else {
                    self.out_adj[v].len()
                }
            }
        }
    }

    pub fn strength(&self, v: usize, mode: Mode) -> f64 {
        match mode {
            Mode::Out => self.strength_out[v],
            Mode::In => self.strength_in[v],
            Mode::All => {
                if self.directed {
                    self.strength_out[v] + self.strength_in[v]
                } else {
                    self.strength_out[v]
                }
            }
        }
    }

    /// Picks a uniformly random neighbor of `v` in the given direction, in
    /// O(1), using `rng`.
    pub fn random_neighbor(&self, v: usize, mode: Mode, rng: &mut StdRng) -> Result<usize, Error> {
        let adj = match mode {
            Mode::Out => &self.out_adj[v],
            Mode::In => &self.in_adj[v],
            Mode::All if !self.directed => &self.out_adj[v],
            Mode::All => {
                // ALL for a directed graph straddles two owned lists; build
                // the combined view once here rather than precomputing it
                // for every vertex up front.
                let combined = self.adj(v, mode);
                if combined.is_empty() {
                    return Err(Error::new(
                        ErrorKind::OptimizationFailure,
                        format!("cannot select a random neighbour for isolated node {}", v),
                    ));
                }
                let idx = rng.gen_range(0..combined.len());
                return Ok(combined[idx].0);
            }
        };
        if adj.is_empty() {
            return Err(Error::new(
                ErrorKind::OptimizationFailure,
                format!("cannot select a random neighbour for isolated node {}", v),
            ));
        }
        let idx = rng.gen_range(0..adj.len());
        Ok(adj[idx].0)
    }

    /// The number of possible edges among `k` vertices, under this graph's
    /// directedness and self-loop-correction convention.
    pub fn possible_edges(&self, k: u64) -> u64 {
        let mut possible = k * k.saturating_sub(1);
        if !self.directed {
            possible /= 2;
        }
        if self.correct_self_loops {
            possible += k;
        }
        possible
    }

    /// Collapses a partition into a coarser graph: communities become
    /// vertices, and edges are the sum of weight spanning each pair of
    /// communities (a community's intra-community weight becomes a
    /// self-loop). Node sizes of the new graph are the communities' sizes;
    /// self-weights are read back from the constructed self-loop edges, the
    /// same way the original implementation derives them, rather than being
    /// recomputed independently from `w_in`.
    pub fn collapse(&self, membership: &[usize], n_communities: usize, csize: &[u64]) -> Graph {
        let mut collapsed: Vec<IntMap<usize, f64>> = vec![IntMap::default(); n_communities];
        for &(u, v, w) in &self.edges {
            let cu = membership[u];
            let cv = membership[v];
            *collapsed[cu].entry(cv).or_insert(0.0) += w;
        }
        let mut new_edges = Vec::new();
        for (c, targets) in collapsed.into_iter().enumerate() {
            let mut keys: Vec<usize> = targets.keys().copied().collect();
            keys.sort_unstable();
            for k in keys {
                new_edges.push((c, k, targets[&k]));
            }
        }
        let node_size: Vec<u64> = csize[..n_communities].to_vec();
        Graph::new(
            n_communities,
            self.directed,
            new_edges,
            Some(node_size),
            Some(self.correct_self_loops),
        )
        .expect("collapsed graph is constructed from already-validated weights")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Graph {
        Graph::new(
            3,
            false,
            vec![(0, 1, 1.0), (1, 2, 1.0), (0, 2, 1.0)],
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn basic_counts() {
        let g = triangle();
        assert_eq!(g.vcount(), 3);
        assert_eq!(g.ecount(), 3);
        assert_eq!(g.total_weight(), 3.0);
        assert_eq!(g.degree(0, Mode::All), 2);
        assert_eq!(g.strength(0, Mode::All), 2.0);
    }

    #[test]
    fn undirected_self_loop_doubles_in_adjacency() {
        let g = Graph::new(1, false, vec![(0, 0, 2.0)], None, None).unwrap();
        assert_eq!(g.neighbors(0, Mode::Out).len(), 2);
        assert_eq!(g.strength(0, Mode::Out), 4.0);
        assert_eq!(g.node_self_weight(0), 2.0);
    }

    #[test]
    fn duplicate_self_loops_are_summed_rather_than_overwritten() {
        let g = Graph::new(1, false, vec![(0, 0, 2.0), (0, 0, 3.0)], None, None).unwrap();
        assert_eq!(g.node_self_weight(0), 5.0);
        assert_eq!(g.strength(0, Mode::Out), 10.0);
    }

    #[test]
    fn rejects_out_of_range_edge() {
        let err = Graph::new(2, false, vec![(0, 5, 1.0)], None, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InconsistentSizes);
    }

    #[test]
    fn rejects_negative_weight() {
        let err = Graph::new(2, false, vec![(0, 1, -1.0)], None, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidWeight);
    }

    #[test]
    fn collapse_sums_spanning_weights() {
        let g = triangle();
        let membership = vec![0, 0, 1];
        let csize = vec![2, 1];
        let collapsed = g.collapse(&membership, 2, &csize);
        assert_eq!(collapsed.vcount(), 2);
        // edges (0,1) internal to community 0, (1,2) and (0,2) cross to community 1.
        assert_eq!(collapsed.node_self_weight(0), 1.0);
        assert_eq!(collapsed.total_weight(), 3.0);
    }
}
