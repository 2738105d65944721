use super::graph::{Graph, Mode};
use super::quality::{kl_dir, Quality};
use crate::{Error, ErrorKind};
use std::cell::RefCell;

/// Either a borrowed top-level graph or a graph owned by the partition that
/// collapsed it. Replaces the source's weak "owner" back-pointer from Graph
/// to Partition: ownership only ever flows one way, from a Partition down to
/// the aggregate Graph it created, so a plain `Box` is unambiguous and the
/// aggregate is dropped automatically with its Partition.
enum GraphHandle<'g> {
    Borrowed(&'g Graph),
    Owned(Box<Graph>),
}

impl<'g> std::ops::Deref for GraphHandle<'g> {
    type Target = Graph;
    fn deref(&self) -> &Graph {
        match self {
            GraphHandle::Borrowed(g) => g,
            GraphHandle::Owned(g) => g,
        }
    }
}

/// Per-direction, per-vertex cache of community weight sums, used by
/// `weight_to_comm`/`weight_from_comm`. Rebuilt whenever the queried vertex
/// differs from the last one cached; invalidated explicitly for a single
/// vertex on `move_node`.
#[derive(Default)]
struct NeighCommCache {
    last_vertex: Option<usize>,
    weight: Vec<f64>,
    touched: Vec<usize>,
}

impl NeighCommCache {
    fn invalidate(&mut self) {
        self.last_vertex = None;
    }
}

/// A partition of a [`Graph`]'s vertices into communities, together with the
/// incremental bookkeeping (`csize`, `cnodes`, `w_in`, `w_from`, `w_to`,
/// `empty_comms`) that makes `diff_move` and `move_node` cheap, and the
/// [`Quality`] function the partition is scored against.
pub struct Partition<'g> {
    graph: GraphHandle<'g>,
    quality: Quality,
    membership: Vec<usize>,
    csize: Vec<u64>,
    cnodes: Vec<usize>,
    w_in: Vec<f64>,
    w_from: Vec<f64>,
    w_to: Vec<f64>,
    w_in_total: f64,
    e_possible_total: u64,
    empty_comms: Vec<usize>,
    n_communities: usize,
    cache_to: RefCell<NeighCommCache>,
    cache_from: RefCell<NeighCommCache>,
}

impl<'g> Partition<'g> {
    /// The singleton partition: `σ(v) = v`.
    pub fn singleton(graph: &'g Graph, quality: Quality) -> Partition<'g> {
        let n = graph.vcount();
        let membership: Vec<usize> = (0..n).collect();
        Partition::from_membership_borrowed(graph, quality, membership)
            .expect("singleton membership is always valid")
    }

    /// A partition over an explicit membership vector.
    pub fn with_membership(
        graph: &'g Graph,
        quality: Quality,
        membership: Vec<usize>,
    ) -> Result<Partition<'g>, Error> {
        Partition::from_membership_borrowed(graph, quality, membership)
    }

    fn from_membership_borrowed(
        graph: &'g Graph,
        quality: Quality,
        membership: Vec<usize>,
    ) -> Result<Partition<'g>, Error> {
        if membership.len() != graph.vcount() {
            return Err(Error::new(
                ErrorKind::InconsistentSizes,
                format!(
                    "membership has length {}, expected {}",
                    membership.len(),
                    graph.vcount()
                ),
            ));
        }
        let mut p = Partition {
            graph: GraphHandle::Borrowed(graph),
            quality,
            membership,
            csize: Vec::new(),
            cnodes: Vec::new(),
            w_in: Vec::new(),
            w_from: Vec::new(),
            w_to: Vec::new(),
            w_in_total: 0.0,
            e_possible_total: 0,
            empty_comms: Vec::new(),
            n_communities: 0,
            cache_to: RefCell::new(NeighCommCache::default()),
            cache_from: RefCell::new(NeighCommCache::default()),
        };
        p.init_admin();
        Ok(p)
    }

    fn from_owned_graph(
        graph: Graph,
        quality: Quality,
        membership: Vec<usize>,
    ) -> Partition<'static> {
        let mut p = Partition {
            graph: GraphHandle::Owned(Box::new(graph)),
            quality,
            membership,
            csize: Vec::new(),
            cnodes: Vec::new(),
            w_in: Vec::new(),
            w_from: Vec::new(),
            w_to: Vec::new(),
            w_in_total: 0.0,
            e_possible_total: 0,
            empty_comms: Vec::new(),
            n_communities: 0,
            cache_to: RefCell::new(NeighCommCache::default()),
            cache_from: RefCell::new(NeighCommCache::default()),
        };
        p.init_admin();
        p
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn quality_fn(&self) -> Quality {
        self.quality
    }

    /// Full recomputation of every aggregate from `membership` and the
    /// graph's edges. `move_node` maintains the same aggregates
    /// incrementally; the two must always agree (exercised directly by the
    /// partition tests below).
    fn init_admin(&mut self) {
        let n = self.graph.vcount();
        self.n_communities = self.membership.iter().copied().max().map_or(0, |m| m + 1);
        let k = self.n_communities;

        self.csize = vec![0; k];
        self.cnodes = vec![0; k];
        self.w_in = vec![0.0; k];
        self.w_from = vec![0.0; k];
        self.w_to = vec![0.0; k];

        for v in 0..n {
            let c = self.membership[v];
            self.csize[c] += self.graph.node_size(v);
            self.cnodes[c] += 1;
        }

        // Accumulated per vertex, via the same adjacency lists `move_node`
        // walks, rather than per edge with hand-written undirected-doubling
        // logic: this guarantees the two stay in agreement on self-loops
        // (an undirected self-loop occupies two list entries) without
        // maintaining two independent formulas for the same convention.
        for v in 0..n {
            let c = self.membership[v];
            self.w_from[c] += self.graph.strength(v, Mode::Out);
            self.w_to[c] += self.graph.strength(v, Mode::In);

            for (u, e) in self
                .graph
                .neighbors(v, Mode::Out)
                .into_iter()
                .zip(self.graph.incident_edges(v, Mode::Out))
            {
                if self.membership[u] == c {
                    let int_w = self.graph.edge_weight(e)
                        / (if self.graph.is_directed() { 1.0 } else { 2.0 })
                        / (if u == v { 2.0 } else { 1.0 });
                    self.w_in[c] += int_w;
                }
            }
            for (u, e) in self
                .graph
                .neighbors(v, Mode::In)
                .into_iter()
                .zip(self.graph.incident_edges(v, Mode::In))
            {
                if self.membership[u] == c {
                    let int_w = self.graph.edge_weight(e)
                        / (if self.graph.is_directed() { 1.0 } else { 2.0 })
                        / (if u == v { 2.0 } else { 1.0 });
                    self.w_in[c] += int_w;
                }
            }
        }
        self.w_in_total = self.w_in.iter().sum();

        self.e_possible_total = (0..k).map(|c| self.graph.possible_edges(self.csize[c])).sum();

        self.empty_comms = (0..k).filter(|&c| self.cnodes[c] == 0).collect();

        self.cache_to.borrow_mut().invalidate();
        self.cache_from.borrow_mut().invalidate();
    }

    pub fn membership(&self, v: usize) -> usize {
        self.membership[v]
    }

    pub fn membership_vec(&self) -> &[usize] {
        &self.membership
    }

    pub fn n_communities(&self) -> usize {
        self.n_communities
    }

    pub fn csize(&self, c: usize) -> u64 {
        self.csize.get(c).copied().unwrap_or(0)
    }

    pub fn cnodes(&self, c: usize) -> usize {
        self.cnodes.get(c).copied().unwrap_or(0)
    }

    pub fn get_community(&self, c: usize) -> Vec<usize> {
        (0..self.membership.len())
            .filter(|&v| self.membership[v] == c)
            .collect()
    }

    pub fn get_communities(&self) -> Vec<Vec<usize>> {
        (0..self.n_communities)
            .map(|c| self.get_community(c))
            .collect()
    }

    pub fn total_weight_in_comm(&self, c: usize) -> f64 {
        self.w_in.get(c).copied().unwrap_or(0.0)
    }

    pub fn total_weight_from_comm(&self, c: usize) -> f64 {
        self.w_from.get(c).copied().unwrap_or(0.0)
    }

    pub fn total_weight_to_comm(&self, c: usize) -> f64 {
        self.w_to.get(c).copied().unwrap_or(0.0)
    }

    pub fn total_weight_in_all_comms(&self) -> f64 {
        self.w_in_total
    }

    pub fn total_possible_edges_in_all_comms(&self) -> u64 {
        self.e_possible_total
    }

    fn rebuild_cache(&self, v: usize, mode: Mode, cache: &mut NeighCommCache) {
        if cache.weight.len() < self.n_communities {
            cache.weight.resize(self.n_communities, 0.0);
        }
        for &c in &cache.touched {
            cache.weight[c] = 0.0;
        }
        cache.touched.clear();

        let neighbors = self.graph.neighbors(v, mode);
        let edges = self.graph.incident_edges(v, mode);
        for (u, e) in neighbors.into_iter().zip(edges.into_iter()) {
            let w = self.graph.edge_weight(e);
            let w = if !self.graph.is_directed() && u == v {
                w / 2.0
            } else {
                w
            };
            let c = self.membership[u];
            if cache.weight[c] == 0.0 {
                cache.touched.push(c);
            }
            cache.weight[c] += w;
        }
        cache.last_vertex = Some(v);
    }

    /// Weight of `v`'s outgoing edges landing in community `c`, cached per
    /// vertex and invalidated by `move_node` only for the vertex it moved.
    pub fn weight_to_comm(&self, v: usize, c: usize) -> f64 {
        let mut cache = self.cache_to.borrow_mut();
        if cache.last_vertex != Some(v) {
            self.rebuild_cache(v, Mode::Out, &mut cache);
        }
        cache.weight.get(c).copied().unwrap_or(0.0)
    }

    /// Weight of `v`'s incoming edges arriving from community `c`.
    pub fn weight_from_comm(&self, v: usize, c: usize) -> f64 {
        let mut cache = self.cache_from.borrow_mut();
        if cache.last_vertex != Some(v) {
            self.rebuild_cache(v, Mode::In, &mut cache);
        }
        cache.weight.get(c).copied().unwrap_or(0.0)
    }

    fn grow_to(&mut self, new_k: usize) -> Result<(), Error> {
        if new_k > self.graph.vcount() {
            return Err(Error::new(
                ErrorKind::TooManyCommunities,
                format!(
                    "cannot grow to {} communities with only {} vertices",
                    new_k,
                    self.graph.vcount()
                ),
            ));
        }
        while self.n_communities < new_k {
            self.csize.push(0);
            self.cnodes.push(0);
            self.w_in.push(0.0);
            self.w_from.push(0.0);
            self.w_to.push(0.0);
            self.empty_comms.push(self.n_communities);
            self.n_communities += 1;
        }
        Ok(())
    }

    /// Moves `v` into `c_new`, updating every aggregate incrementally.
    pub fn move_node(&mut self, v: usize, c_new: usize) -> Result<(), Error> {
        let c_old = self.membership[v];
        if c_new == c_old {
            return Ok(());
        }
        if c_new >= self.n_communities {
            self.grow_to(c_new + 1)?;
        }

        let size_v = self.graph.node_size(v) as i64;
        let directed_factor = if self.graph.is_directed() { 1.0 } else { 2.0 };
        let delta_poss = 2.0 * size_v as f64
            * (self.csize[c_new] as f64 - self.csize[c_old] as f64 + size_v as f64)
            / directed_factor;
        self.e_possible_total = (self.e_possible_total as f64 + delta_poss).round() as u64;

        self.cnodes[c_old] -= 1;
        self.csize[c_old] -= self.graph.node_size(v);
        if self.cnodes[c_old] == 0 {
            self.empty_comms.push(c_old);
        }
        if self.cnodes[c_new] == 0 {
            if let Some(pos) = self.empty_comms.iter().rposition(|&c| c == c_new) {
                self.empty_comms.remove(pos);
            }
        }
        self.cnodes[c_new] += 1;
        self.csize[c_new] += self.graph.node_size(v);

        for mode in [Mode::Out, Mode::In] {
            let neighbors = self.graph.neighbors(v, mode);
            let edges = self.graph.incident_edges(v, mode);
            for (u, e) in neighbors.into_iter().zip(edges.into_iter()) {
                let w = self.graph.edge_weight(e);
                match mode {
                    Mode::Out => {
                        self.w_from[c_old] -= w;
                        self.w_from[c_new] += w;
                    }
                    Mode::In => {
                        self.w_to[c_old] -= w;
                        self.w_to[c_new] += w;
                    }
                    Mode::All => unreachable!(),
                }
                let int_w = w
                    / (if self.graph.is_directed() { 1.0 } else { 2.0 })
                    / (if u == v { 2.0 } else { 1.0 });
                if self.membership[u] == c_old {
                    self.w_in[c_old] -= int_w;
                    self.w_in_total -= int_w;
                }
                if self.membership[u] == c_new || u == v {
                    self.w_in[c_new] += int_w;
                    self.w_in_total += int_w;
                }
            }
        }

        self.membership[v] = c_new;
        self.cache_to.borrow_mut().invalidate();
        self.cache_from.borrow_mut().invalidate();
        Ok(())
    }

    /// The change in `quality()` that `move_node(v, c_new)` would cause,
    /// without mutating the partition. Must stay algebraically consistent
    /// with `quality` for every variant — this is the property the unit
    /// tests in this module check directly.
    pub fn diff_move(&self, v: usize, c_new: usize) -> f64 {
        let c_old = self.membership[v];
        if c_new == c_old {
            return 0.0;
        }
        match self.quality {
            Quality::Modularity => self.diff_move_modularity(v, c_old, c_new, 1.0),
            Quality::RbConfiguration { gamma } => self.diff_move_modularity(v, c_old, c_new, gamma),
            Quality::Cpm { gamma } => self.diff_move_cpm(v, c_old, c_new, gamma),
            Quality::Rber { gamma } => {
                self.diff_move_cpm(v, c_old, c_new, gamma * self.graph.density())
            }
            Quality::Significance => self.diff_move_significance(v, c_old, c_new),
            Quality::Surprise => self.diff_move_surprise(v, c_old, c_new),
        }
    }

    fn diff_move_modularity(&self, v: usize, c_old: usize, c_new: usize, gamma: f64) -> f64 {
        let total_weight = self.graph.total_weight() * (2.0 - self.directed_flag());
        if total_weight == 0.0 {
            return 0.0;
        }
        let w_to_old = self.weight_to_comm(v, c_old);
        let w_from_old = self.weight_from_comm(v, c_old);
        let w_to_new = self.weight_to_comm(v, c_new);
        let w_from_new = self.weight_from_comm(v, c_new);
        let k_out = self.graph.strength(v, Mode::Out);
        let k_in = self.graph.strength(v, Mode::In);
        let self_weight = self.graph.node_self_weight(v);
        let k_out_old = self.total_weight_from_comm(c_old);
        let k_in_old = self.total_weight_to_comm(c_old);
        let k_out_new = self.total_weight_from_comm(c_new) + k_out;
        let k_in_new = self.total_weight_to_comm(c_new) + k_in;

        let diff_old = (w_to_old - gamma * k_out * k_in_old / total_weight)
            + (w_from_old - gamma * k_in * k_out_old / total_weight);
        let diff_new = (w_to_new + self_weight - gamma * k_out * k_in_new / total_weight)
            + (w_from_new + self_weight - gamma * k_in * k_out_new / total_weight);

        let m = if self.graph.is_directed() {
            self.graph.total_weight()
        } else {
            2.0 * self.graph.total_weight()
        };
        if m == 0.0 {
            0.0
        } else {
            (diff_new - diff_old) / m
        }
    }

    fn diff_move_cpm(&self, v: usize, c_old: usize, c_new: usize, gamma: f64) -> f64 {
        let size_v = self.graph.node_size(v) as f64;
        let correct = self.graph.correct_self_loops();
        let csize_old = self.csize[c_old] as f64;
        let csize_new = self.csize[c_new] as f64;

        let delta_poss_old = if correct {
            size_v * (2.0 * csize_old - size_v)
        } else {
            size_v * (2.0 * csize_old - size_v - 1.0)
        };
        let delta_poss_new = if correct {
            size_v * (2.0 * csize_new + size_v)
        } else {
            size_v * (2.0 * csize_new + size_v - 1.0)
        };

        let sw = self.graph.node_self_weight(v);
        let diff_old = self.weight_to_comm(v, c_old) + self.weight_from_comm(v, c_old)
            - sw
            - gamma * delta_poss_old;
        let diff_new =
            self.weight_to_comm(v, c_new) + self.weight_from_comm(v, c_new) + sw - gamma * delta_poss_new;
        diff_new - diff_old
    }

    fn diff_move_significance(&self, v: usize, c_old: usize, c_new: usize) -> f64 {
        let normalise = 2.0 - self.directed_flag();
        let p = self.graph.density();
        let size_v = self.graph.node_size(v);

        let n_old = self.csize[c_old];
        let poss_old = self.graph.possible_edges(n_old) as f64;
        let m_old = self.total_weight_in_comm(c_old);
        let q_old = if poss_old > 0.0 { m_old / poss_old } else { 0.0 };

        let n_oldx = n_old - size_v;
        let poss_oldx = self.graph.possible_edges(n_oldx) as f64;
        let sw = self.graph.node_self_weight(v);
        let wtc = self.weight_to_comm(v, c_old) - sw;
        let wfc = self.weight_from_comm(v, c_old) - sw;
        let m_oldx = m_old - wtc / normalise - wfc / normalise - sw;
        let q_oldx = if poss_oldx > 0.0 { m_oldx / poss_oldx } else { 0.0 };

        let n_new = self.csize[c_new];
        let poss_new = self.graph.possible_edges(n_new) as f64;
        let m_new = self.total_weight_in_comm(c_new);
        let q_new = if poss_new > 0.0 { m_new / poss_new } else { 0.0 };

        let n_newx = n_new + size_v;
        let poss_newx = self.graph.possible_edges(n_newx) as f64;
        let wtc = self.weight_to_comm(v, c_new);
        let wfc = self.weight_from_comm(v, c_new);
        let sw = self.graph.node_self_weight(v);
        let m_newx = m_new + wtc / normalise + wfc / normalise + sw;
        let q_newx = if poss_newx > 0.0 { m_newx / poss_newx } else { 0.0 };

        poss_oldx * kl_dir(q_oldx, p) + poss_newx * kl_dir(q_newx, p)
            - poss_old * kl_dir(q_old, p)
            - poss_new * kl_dir(q_new, p)
    }

    fn diff_move_surprise(&self, v: usize, c_old: usize, c_new: usize) -> f64 {
        let m = self.graph.total_weight();
        if m == 0.0 {
            return 0.0;
        }
        let normalise = 2.0 - self.directed_flag();
        let n2 = self.graph.possible_edges(self.graph.total_size()) as f64;
        let mc = self.total_weight_in_all_comms();
        let nc2 = self.total_possible_edges_in_all_comms() as f64;

        let size_v = self.graph.node_size(v);
        let sw = self.graph.node_self_weight(v);
        let wtc = self.weight_to_comm(v, c_old) - sw;
        let wfc = self.weight_from_comm(v, c_old) - sw;
        let m_old = wtc / normalise + wfc / normalise + sw;

        let wtc_new = self.weight_to_comm(v, c_new);
        let wfc_new = self.weight_from_comm(v, c_new);
        let sw_new = self.graph.node_self_weight(v);
        let m_new = wtc_new / normalise + wfc_new / normalise + sw_new;

        let q = mc / m;
        let s = nc2 / n2;
        let q_new = (mc - m_old + m_new) / m;
        let delta_nc2 = 2.0 * size_v as f64
            * (self.csize[c_new] as f64 - self.csize[c_old] as f64 + size_v as f64)
            / normalise;
        let s_new = (nc2 + delta_nc2) / n2;

        m * (kl_dir(q_new, s_new) - kl_dir(q, s))
    }

    fn directed_flag(&self) -> f64 {
        if self.graph.is_directed() {
            1.0
        } else {
            0.0
        }
    }

    /// The whole-partition quality score.
    pub fn quality(&self) -> f64 {
        match self.quality {
            Quality::Modularity => self.quality_modularity(1.0),
            Quality::RbConfiguration { gamma } => self.quality_modularity(gamma),
            Quality::Cpm { gamma } => self.quality_cpm(gamma),
            Quality::Rber { gamma } => self.quality_cpm(gamma * self.graph.density()),
            Quality::Significance => self.quality_significance(),
            Quality::Surprise => self.quality_surprise(),
        }
    }

    fn quality_modularity(&self, gamma: f64) -> f64 {
        let m = if self.graph.is_directed() {
            self.graph.total_weight()
        } else {
            2.0 * self.graph.total_weight()
        };
        if m == 0.0 {
            return 0.0;
        }
        let divisor = if self.graph.is_directed() { 1.0 } else { 4.0 } * self.graph.total_weight();
        let mut mod_sum = 0.0;
        for c in 0..self.n_communities {
            let w = self.total_weight_in_comm(c);
            let w_out = self.total_weight_from_comm(c);
            let w_in = self.total_weight_to_comm(c);
            let null = if divisor == 0.0 {
                0.0
            } else {
                gamma * w_out * w_in / divisor
            };
            mod_sum += w - null;
        }
        let q = (2.0 - self.directed_flag()) * mod_sum;
        q / m
    }

    fn quality_cpm(&self, gamma: f64) -> f64 {
        let mut acc = 0.0;
        for c in 0..self.n_communities {
            acc += self.total_weight_in_comm(c) - gamma * self.graph.possible_edges(self.csize[c]) as f64;
        }
        (2.0 - self.directed_flag()) * acc
    }

    fn quality_significance(&self) -> f64 {
        let p = self.graph.density();
        let mut s = 0.0;
        for c in 0..self.n_communities {
            let n_c = self.csize[c];
            let m_c = self.total_weight_in_comm(c);
            let poss = self.graph.possible_edges(n_c) as f64;
            let p_c = if poss > 0.0 { m_c / poss } else { 0.0 };
            s += poss * kl_dir(p_c, p);
        }
        s
    }

    fn quality_surprise(&self) -> f64 {
        let mc = self.total_weight_in_all_comms();
        let nc2 = self.total_possible_edges_in_all_comms() as f64;
        let m = self.graph.total_weight();
        if m == 0.0 {
            return 0.0;
        }
        let n2 = self.graph.possible_edges(self.graph.total_size()) as f64;
        let q = mc / m;
        let s = nc2 / n2;
        m * kl_dir(q, s)
    }

    /// Relabels communities `0..K'` with `K'` the number of non-empty
    /// communities: the largest community gets id `0`, ties broken by
    /// larger `cnodes`, then by the original id. Quality is unchanged.
    pub fn renumber_communities(&mut self) {
        let order = Self::renumbering_order(&[(&self.csize, &self.cnodes)]);
        self.apply_renumbering(&order);
    }

    /// Multiplex form: communities are ranked by the sum of `csize` across
    /// every partition in `partitions`, so layers stay consistently
    /// numbered. Every partition must share the same membership and
    /// community count (the multi-layer optimiser enforces this).
    pub fn renumber_communities_multiplex(partitions: &mut [Partition]) {
        let k = partitions[0].n_communities;
        let mut combined_csize = vec![0u64; k];
        let mut combined_cnodes = vec![0usize; k];
        for p in partitions.iter() {
            for c in 0..k {
                combined_csize[c] += p.csize(c);
                combined_cnodes[c] += p.cnodes(c);
            }
        }
        let order = Self::renumbering_order(&[(&combined_csize, &combined_cnodes)]);
        for p in partitions.iter_mut() {
            p.apply_renumbering(&order);
        }
    }

    /// Returns, for each old community id, its new id, using the
    /// largest-first / most-nodes-first / lowest-original-id-first order.
    fn renumbering_order(sources: &[(&Vec<u64>, &Vec<usize>)]) -> Vec<usize> {
        let (csize, cnodes) = sources[0];
        let k = csize.len();
        let mut order: Vec<usize> = (0..k).collect();
        order.sort_by(|&a, &b| {
            csize[b]
                .cmp(&csize[a])
                .then(cnodes[b].cmp(&cnodes[a]))
                .then(a.cmp(&b))
        });
        let mut new_id = vec![0usize; k];
        for (new, &old) in order.iter().enumerate() {
            new_id[old] = new;
        }
        new_id
    }

    fn apply_renumbering(&mut self, new_id: &[usize]) {
        let new_membership: Vec<usize> = self.membership.iter().map(|&c| new_id[c]).collect();
        self.membership = new_membership;
        self.init_admin();
    }

    /// Sets `σ(v) = coarse_membership[coarse_node[v]]` for every fine
    /// vertex `v`; `coarse_node` is the map from this partition's vertices
    /// to the coarser partition's vertices (identity when omitted).
    pub fn from_coarse_partition(
        &mut self,
        coarse_membership: &[usize],
        coarse_node: Option<&[usize]>,
    ) -> Result<(), Error> {
        let n = self.membership.len();
        let new_membership: Vec<usize> = (0..n)
            .map(|v| {
                let cn = coarse_node.map_or(v, |m| m[v]);
                coarse_membership[cn]
            })
            .collect();
        self.set_membership(new_membership)
    }

    /// Replaces this partition's membership wholesale with another
    /// partition's, re-initialising all aggregates.
    pub fn from_partition(&mut self, other: &Partition) -> Result<(), Error> {
        self.set_membership(other.membership.clone())
    }

    /// Replaces the membership vector and recomputes every aggregate from
    /// scratch via [`Partition::init_admin`].
    pub fn set_membership(&mut self, membership: Vec<usize>) -> Result<(), Error> {
        if membership.len() != self.graph.vcount() {
            return Err(Error::new(
                ErrorKind::InconsistentSizes,
                format!(
                    "membership has length {}, expected {}",
                    membership.len(),
                    self.graph.vcount()
                ),
            ));
        }
        self.membership = membership;
        self.init_admin();
        Ok(())
    }

    /// Returns an empty community id, allocating a fresh one past the
    /// current range if none is free.
    pub fn get_empty_community(&mut self) -> Result<usize, Error> {
        if let Some(&c) = self.empty_comms.last() {
            return Ok(c);
        }
        self.add_empty_community()
    }

    /// Allocates a new, empty community id, bounded by `n`.
    pub fn add_empty_community(&mut self) -> Result<usize, Error> {
        let new_k = self.n_communities + 1;
        self.grow_to(new_k)?;
        Ok(new_k - 1)
    }

    /// Collapses the graph using this partition's communities and returns a
    /// fresh singleton partition of the same quality function over the
    /// collapsed graph, which it owns.
    pub fn aggregate_partition(&self) -> Partition<'static> {
        let collapsed = self
            .graph
            .collapse(&self.membership, self.n_communities, &self.csize);
        let n = collapsed.vcount();
        let membership: Vec<usize> = (0..n).collect();
        Partition::from_owned_graph(collapsed, self.quality, membership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use assert_unordered::assert_eq_unordered;

    fn triangle_and_edge() -> Graph {
        // Two triangles {0,1,2} and {3,4,5} joined by a single bridge (2,3).
        Graph::new(
            6,
            false,
            vec![
                (0, 1, 1.0),
                (0, 2, 1.0),
                (1, 2, 1.0),
                (3, 4, 1.0),
                (3, 5, 1.0),
                (4, 5, 1.0),
                (2, 3, 1.0),
            ],
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn init_admin_matches_incremental_after_moves() {
        let g = triangle_and_edge();
        let mut p = Partition::singleton(&g, Quality::cpm(0.5));
        p.move_node(1, 0).unwrap();
        p.move_node(2, 0).unwrap();
        p.move_node(4, 3).unwrap();
        p.move_node(5, 3).unwrap();

        let w_in_incremental = p.w_in.clone();
        let w_from_incremental = p.w_from.clone();
        let w_to_incremental = p.w_to.clone();
        let csize_incremental = p.csize.clone();

        p.init_admin();

        for c in 0..p.n_communities() {
            assert_approx_eq!(w_in_incremental[c], p.w_in[c], 1e-9);
            assert_approx_eq!(w_from_incremental[c], p.w_from[c], 1e-9);
            assert_approx_eq!(w_to_incremental[c], p.w_to[c], 1e-9);
            assert_eq!(csize_incremental[c], p.csize[c]);
        }
    }

    fn assert_diff_move_matches_quality(p: &mut Partition, v: usize, c_new: usize) {
        let before = p.quality();
        let predicted_diff = p.diff_move(v, c_new);
        p.move_node(v, c_new).unwrap();
        let after = p.quality();
        assert_approx_eq!(after - before, predicted_diff, 1e-6);
    }

    #[test]
    fn diff_move_matches_quality_for_every_variant() {
        let g = triangle_and_edge();
        for quality in [
            Quality::Modularity,
            Quality::cpm(0.5),
            Quality::rber(0.5),
            Quality::rb_configuration(1.0),
            Quality::Significance,
            Quality::Surprise,
        ] {
            let mut p = Partition::singleton(&g, quality);
            assert_diff_move_matches_quality(&mut p, 1, 0);
            assert_diff_move_matches_quality(&mut p, 2, 0);
            assert_diff_move_matches_quality(&mut p, 4, 3);
        }
    }

    #[test]
    fn collapsed_graph_preserves_quality() {
        let g = triangle_and_edge();
        for quality in [
            Quality::Modularity,
            Quality::cpm(0.5),
            Quality::Surprise,
        ] {
            let mut p = Partition::singleton(&g, quality);
            p.move_node(1, 0).unwrap();
            p.move_node(2, 0).unwrap();
            p.move_node(4, 3).unwrap();
            p.move_node(5, 3).unwrap();
            let before = p.quality();
            let aggregate = p.aggregate_partition();
            assert_approx_eq!(before, aggregate.quality(), 1e-9);
        }
    }

    #[test]
    fn renumber_communities_preserves_quality() {
        let g = triangle_and_edge();
        let mut p = Partition::singleton(&g, Quality::cpm(0.5));
        p.move_node(1, 0).unwrap();
        p.move_node(2, 0).unwrap();
        p.move_node(4, 3).unwrap();
        p.move_node(5, 3).unwrap();
        let before = p.quality();
        p.renumber_communities();
        assert_approx_eq!(before, p.quality(), 1e-9);
        assert_eq!(p.n_communities(), 2);
    }

    #[test]
    fn renumber_communities_is_idempotent() {
        let g = triangle_and_edge();
        let mut p = Partition::singleton(&g, Quality::cpm(0.5));
        p.move_node(1, 0).unwrap();
        p.move_node(2, 0).unwrap();
        p.move_node(4, 3).unwrap();
        p.move_node(5, 3).unwrap();
        p.renumber_communities();
        let once: Vec<usize> = (0..g.vcount()).map(|v| p.membership(v)).collect();
        p.renumber_communities();
        let twice: Vec<usize> = (0..g.vcount()).map(|v| p.membership(v)).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn get_community_returns_members_regardless_of_traversal_order() {
        let g = triangle_and_edge();
        let mut p = Partition::singleton(&g, Quality::cpm(0.5));
        p.move_node(2, 0).unwrap();
        p.move_node(1, 0).unwrap();
        assert_eq_unordered!(p.get_community(0), vec![0, 1, 2]);
    }

    #[test]
    fn karate_like_fixture_cpm_quality_is_three() {
        let g = triangle_and_edge();
        let mut p = Partition::with_membership(&g, Quality::cpm(0.5), vec![0, 0, 0, 1, 1, 1]).unwrap();
        // w_in[0] = 3 (triangle), w_in[1] = 3 (triangle); possible_edges(3) = 3 each.
        assert_approx_eq!(p.quality(), 3.0, 1e-9);
        p.renumber_communities();
        assert_approx_eq!(p.quality(), 3.0, 1e-9);
    }
}
