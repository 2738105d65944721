use super::partition::Partition;
use super::rng::{get_rng, shuffled_indexes};
use crate::Error;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::VecDeque;

/// Which candidate communities a vertex is tried against during a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsiderComms {
    /// Every community touching one of the vertex's neighbours. The
    /// default for both the initial phase and refinement.
    AllNeighComms,
    /// A single randomly chosen neighbouring community.
    RandNeighComm,
    /// Every community currently in the partition, plus a fresh one.
    AllComms,
    /// A single randomly chosen community from the whole partition.
    RandComm,
}

/// Which local-improvement routine drives a phase: full local moving (a
/// FIFO that re-enqueues neighbours) or a single merge-only pass (used
/// during refinement so already-merged groups are never re-split).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    MoveNodes,
    MergeNodes,
}

/// Builder-style configuration for [`Optimiser`], mirroring the engine's
/// constructor-then-setters convention rather than a single large
/// constructor argument list.
#[derive(Debug, Clone)]
pub struct OptimiserConfig {
    pub consider_comms: ConsiderComms,
    pub refine_consider_comms: ConsiderComms,
    pub optimise_routine: Routine,
    pub refine_routine: Routine,
    pub consider_empty_community: bool,
    pub refine_partition: bool,
    pub max_comm_size: Option<u64>,
    pub seed: Option<u64>,
}

impl Default for OptimiserConfig {
    fn default() -> Self {
        OptimiserConfig {
            consider_comms: ConsiderComms::AllNeighComms,
            refine_consider_comms: ConsiderComms::AllNeighComms,
            optimise_routine: Routine::MoveNodes,
            refine_routine: Routine::MergeNodes,
            consider_empty_community: true,
            refine_partition: true,
            max_comm_size: None,
            seed: None,
        }
    }
}

impl OptimiserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consider_comms(mut self, c: ConsiderComms) -> Self {
        self.consider_comms = c;
        self
    }

    pub fn refine_consider_comms(mut self, c: ConsiderComms) -> Self {
        self.refine_consider_comms = c;
        self
    }

    pub fn optimise_routine(mut self, r: Routine) -> Self {
        self.optimise_routine = r;
        self
    }

    pub fn refine_routine(mut self, r: Routine) -> Self {
        self.refine_routine = r;
        self
    }

    pub fn consider_empty_community(mut self, b: bool) -> Self {
        self.consider_empty_community = b;
        self
    }

    pub fn refine_partition(mut self, refine: bool) -> Self {
        self.refine_partition = refine;
        self
    }

    pub fn max_comm_size(mut self, n: Option<u64>) -> Self {
        self.max_comm_size = n;
        self
    }

    pub fn seed(mut self, s: Option<u64>) -> Self {
        self.seed = s;
        self
    }
}

/// Drives a [`Partition`] to local optimality under its quality function,
/// via repeated local-moving, optional refinement, and aggregation into a
/// coarser level — the three phases the Leiden method alternates between.
pub struct Optimiser {
    config: OptimiserConfig,
    rng: StdRng,
}

impl Optimiser {
    pub fn new(config: OptimiserConfig) -> Optimiser {
        let rng = get_rng(config.seed);
        Optimiser { config, rng }
    }

    /// Candidate communities to try moving `v` into under `consider`, among
    /// `partition`'s own communities (the unconstrained case).
    fn candidates_for(
        &mut self,
        partition: &Partition,
        v: usize,
        consider: ConsiderComms,
    ) -> Vec<usize> {
        use super::graph::Mode;
        match consider {
            ConsiderComms::AllNeighComms => partition
                .graph()
                .neighbors(v, Mode::All)
                .into_iter()
                .map(|u| partition.membership(u))
                .unique()
                .collect(),
            ConsiderComms::RandNeighComm => {
                let neighbors = partition.graph().neighbors(v, Mode::All);
                if neighbors.is_empty() {
                    Vec::new()
                } else {
                    let u = neighbors[self.rng.gen_range(0..neighbors.len())];
                    vec![partition.membership(u)]
                }
            }
            ConsiderComms::AllComms => (0..partition.n_communities()).collect(),
            ConsiderComms::RandComm => {
                let k = partition.n_communities();
                if k == 0 {
                    Vec::new()
                } else {
                    vec![self.rng.gen_range(0..k)]
                }
            }
        }
    }

    /// Candidate communities to try moving `v` into, for the configured
    /// [`ConsiderComms`] policy, plus a fresh empty community when
    /// `consider_empty_community` is set.
    fn candidates(
        &mut self,
        partition: &mut Partition,
        v: usize,
        consider: ConsiderComms,
    ) -> Result<Vec<usize>, Error> {
        let mut candidates = self.candidates_for(partition, v, consider);
        if self.config.consider_empty_community {
            let c_old = partition.membership(v);
            // A singleton `v` (alone in its community) already *is* an empty
            // community in waiting; requesting one would force the
            // partition to grow past `vcount`, which is exactly the
            // "too many communities" fault. Only offer one when moving `v`
            // out would leave its old community non-empty.
            if partition.cnodes(c_old) as u64 > partition.graph().node_size(v) {
                candidates.push(partition.get_empty_community()?);
            }
        }
        Ok(candidates)
    }

    /// As [`Optimiser::candidates`], but restricted to communities of
    /// `refined` whose members all share `v`'s community in `fixed` — the
    /// constraint that keeps a refinement pass from merging across an outer
    /// partition's boundaries.
    fn candidates_constrained(
        &mut self,
        refined: &Partition,
        fixed: &Partition,
        v: usize,
        consider: ConsiderComms,
    ) -> Vec<usize> {
        use super::graph::Mode;
        let fixed_comm = fixed.membership(v);
        match consider {
            ConsiderComms::AllComms | ConsiderComms::RandComm => self
                .candidates_for(refined, v, consider)
                .into_iter()
                .filter(|&c| {
                    refined
                        .get_community(c)
                        .iter()
                        .all(|&u| fixed.membership(u) == fixed_comm)
                })
                .collect(),
            _ => {
                let neighbors: Vec<usize> = refined
                    .graph()
                    .neighbors(v, Mode::All)
                    .into_iter()
                    .filter(|&u| fixed.membership(u) == fixed_comm)
                    .collect();
                match consider {
                    ConsiderComms::RandNeighComm => {
                        if neighbors.is_empty() {
                            Vec::new()
                        } else {
                            let u = neighbors[self.rng.gen_range(0..neighbors.len())];
                            vec![refined.membership(u)]
                        }
                    }
                    _ => neighbors
                        .into_iter()
                        .map(|u| refined.membership(u))
                        .unique()
                        .collect(),
                }
            }
        }
    }

    /// Picks the best community for `v` among `candidates`, subject to
    /// `max_comm_size`, returning `(community, diff_move)` or `None` if no
    /// move improves quality. Ties break to the lowest candidate community
    /// id, independent of visitation order, for reproducibility.
    fn best_move(
        &self,
        partition: &Partition,
        v: usize,
        candidates: &[usize],
    ) -> Option<(usize, f64)> {
        let c_old = partition.membership(v);
        let mut best: Option<(usize, f64)> = None;
        for &c in candidates {
            if c == c_old {
                continue;
            }
            if let Some(max_size) = self.config.max_comm_size {
                let grown = partition.csize(c) + partition.graph().node_size(v);
                if c != c_old && grown > max_size {
                    continue;
                }
            }
            let diff = partition.diff_move(v, c);
            let improves = match best {
                None => diff > 1e-9,
                Some((best_c, best_d)) => diff > best_d || (diff == best_d && c < best_c),
            };
            if improves {
                best = Some((c, diff));
            }
        }
        best
    }

    /// Local node moving: a FIFO of every vertex, initially in shuffled
    /// order. Popping `v`, a strictly-improving move re-enqueues every
    /// neighbour of `v` that isn't already queued and doesn't already share
    /// `v`'s new community — the old community's members might now benefit
    /// from a move of their own. Terminates when the queue empties, i.e. at
    /// a fixed point where no further move improves quality. Returns the
    /// total quality improvement.
    pub fn move_nodes(&mut self, partition: &mut Partition) -> Result<f64, Error> {
        use super::graph::Mode;
        let consider = self.config.consider_comms;
        let n = partition.graph().vcount();
        let mut total_improvement = 0.0;
        let mut queued = vec![true; n];
        let mut queue: VecDeque<usize> = shuffled_indexes(n, &mut self.rng).into_iter().collect();
        while let Some(v) = queue.pop_front() {
            queued[v] = false;
            let candidates = self.candidates(partition, v, consider)?;
            if let Some((c_new, diff)) = self.best_move(partition, v, &candidates) {
                partition.move_node(v, c_new)?;
                total_improvement += diff;
                for u in partition.graph().neighbors(v, Mode::All) {
                    if !queued[u] && partition.membership(u) != c_new {
                        queued[u] = true;
                        queue.push_back(u);
                    }
                }
            }
        }
        Ok(total_improvement)
    }

    /// One unconstrained pass over every vertex (shuffled), each processed
    /// at most once, moving it into the best strictly-improving candidate
    /// community. Unlike [`Optimiser::move_nodes`] this never re-enqueues a
    /// neighbour, so it converges in a single sweep rather than iterating to
    /// a fixed point.
    pub fn merge_nodes(&mut self, partition: &mut Partition) -> Result<f64, Error> {
        let consider = self.config.consider_comms;
        let n = partition.graph().vcount();
        let mut total_improvement = 0.0;
        let order = shuffled_indexes(n, &mut self.rng);
        for v in order {
            let candidates = self.candidates(partition, v, consider)?;
            if let Some((c_new, diff)) = self.best_move(partition, v, &candidates) {
                if diff > 0.0 {
                    partition.move_node(v, c_new)?;
                    total_improvement += diff;
                }
            }
        }
        Ok(total_improvement)
    }

    /// Constrained local moving: as [`Optimiser::move_nodes`], but `v` may
    /// only move into a community all of whose current members share `v`'s
    /// community in `fixed`. Runs the same FIFO re-enqueue loop to a fixed
    /// point. Used for Leiden refinement with `refine_routine = MoveNodes`.
    pub fn move_nodes_constrained(
        &mut self,
        refined: &mut Partition,
        fixed: &Partition,
    ) -> Result<f64, Error> {
        use super::graph::Mode;
        let consider = self.config.refine_consider_comms;
        let n = refined.graph().vcount();
        let mut total_improvement = 0.0;
        let mut queued = vec![true; n];
        let mut queue: VecDeque<usize> = shuffled_indexes(n, &mut self.rng).into_iter().collect();
        while let Some(v) = queue.pop_front() {
            queued[v] = false;
            let candidates = self.candidates_constrained(refined, fixed, v, consider);
            if let Some((c_new, diff)) = self.best_move(refined, v, &candidates) {
                refined.move_node(v, c_new)?;
                total_improvement += diff;
                for u in refined.graph().neighbors(v, Mode::All) {
                    if !queued[u] && refined.membership(u) != c_new {
                        queued[u] = true;
                        queue.push_back(u);
                    }
                }
            }
        }
        Ok(total_improvement)
    }

    /// Refinement pass: starting from the singleton partition, greedily
    /// merges vertices only into communities that stay within their
    /// `fixed` (pre-move-nodes) community, producing a refined partition
    /// whose communities are subsets of `fixed`'s. This is the Leiden
    /// method's guarantee that every refined community is well connected.
    /// Used for Leiden refinement with `refine_routine = MergeNodes`, the
    /// default.
    pub fn merge_nodes_constrained(
        &mut self,
        refined: &mut Partition,
        fixed: &Partition,
    ) -> Result<f64, Error> {
        let consider = self.config.refine_consider_comms;
        let n = refined.graph().vcount();
        let mut total_improvement = 0.0;
        let order = shuffled_indexes(n, &mut self.rng);
        for v in order {
            let candidates = self.candidates_constrained(refined, fixed, v, consider);
            if let Some((c_new, diff)) = self.best_move(refined, v, &candidates) {
                if diff > 0.0 {
                    refined.move_node(v, c_new)?;
                    total_improvement += diff;
                }
            }
        }
        Ok(total_improvement)
    }

    /// Runs the configured initial-phase routine (`optimise_routine`) on an
    /// unconstrained partition.
    fn run_initial_routine(&mut self, partition: &mut Partition) -> Result<f64, Error> {
        match self.config.optimise_routine {
            Routine::MoveNodes => self.move_nodes(partition),
            Routine::MergeNodes => self.merge_nodes(partition),
        }
    }

    /// Runs the configured refinement routine (`refine_routine`), constrained
    /// by `fixed`.
    fn run_refine_routine(
        &mut self,
        refined: &mut Partition,
        fixed: &Partition,
    ) -> Result<f64, Error> {
        match self.config.refine_routine {
            Routine::MoveNodes => self.move_nodes_constrained(refined, fixed),
            Routine::MergeNodes => self.merge_nodes_constrained(refined, fixed),
        }
    }

    /// Runs one full Leiden level: local moving, optional refinement,
    /// aggregation into a coarser graph, and recursion, lifting the coarse
    /// membership back through every level on the way out. Returns the
    /// total quality improvement achieved at every level combined.
    pub fn optimise_partition(&mut self, partition: &mut Partition) -> Result<f64, Error> {
        let mut improvement = self.run_initial_routine(partition)?;
        // `n_communities()` only ever grows (it is `1 + max membership`) and
        // does not shrink when communities empty out during local moving;
        // renumbering drops the empties so the count below reflects actual,
        // non-empty communities.
        partition.renumber_communities();

        if partition.n_communities() >= partition.graph().vcount() {
            // Already fully singleton or fully merged: nothing left to
            // aggregate into, so this level is final.
            return Ok(improvement);
        }

        let mut working = if self.config.refine_partition {
            let mut refined = Partition::singleton(partition.graph(), partition.quality_fn());
            improvement += self.run_refine_routine(&mut refined, partition)?;
            refined
        } else {
            Partition::with_membership(
                partition.graph(),
                partition.quality_fn(),
                partition.membership_vec().to_vec(),
            )?
        };
        working.renumber_communities();

        if working.n_communities() >= working.graph().vcount() {
            return Ok(improvement);
        }

        let mut aggregate = working.aggregate_partition();
        // `aggregate`'s own singleton membership doubles as the coarse
        // community's mapping from fine communities to coarse vertices,
        // since `Graph::collapse` numbers supernodes by community id.
        let coarse_node: Vec<usize> = working.membership_vec().to_vec();

        improvement += self.optimise_partition(&mut aggregate)?;

        partition.from_coarse_partition(aggregate.membership_vec(), Some(&coarse_node))?;
        partition.renumber_communities();
        Ok(improvement)
    }

    /// Multi-layer form: every partition in `partitions` shares the same
    /// vertex set and membership, but each is scored against its own graph
    /// (layer). A vertex's move is evaluated as the `layer_weights`-weighted
    /// sum of `diff_move` across every layer, and applied to every
    /// partition at once so membership never diverges between layers.
    pub fn optimise_partition_multiplex(
        &mut self,
        partitions: &mut [Partition],
        layer_weights: &[f64],
    ) -> Result<f64, Error> {
        use super::graph::Mode;
        assert_eq!(partitions.len(), layer_weights.len());
        let n = partitions[0].graph().vcount();
        let mut total_improvement = 0.0;
        let mut queued = vec![true; n];
        let mut queue: VecDeque<usize> = shuffled_indexes(n, &mut self.rng).into_iter().collect();

        while let Some(v) = queue.pop_front() {
            queued[v] = false;
            let mut candidates: Vec<usize> = partitions
                .iter()
                .flat_map(|p| {
                    p.graph()
                        .neighbors(v, Mode::All)
                        .into_iter()
                        .map(move |u| p.membership(u))
                })
                .unique()
                .collect();
            let c_old = partitions[0].membership(v);
            if self.config.consider_empty_community
                && partitions[0].cnodes(c_old) as u64 > partitions[0].graph().node_size(v)
            {
                for p in partitions.iter_mut() {
                    candidates.push(p.get_empty_community()?);
                }
            }

            let mut best: Option<(usize, f64)> = None;
            for &c in &candidates {
                if c == c_old {
                    continue;
                }
                let diff: f64 = partitions
                    .iter()
                    .zip(layer_weights.iter())
                    .map(|(p, w)| w * p.diff_move(v, c))
                    .sum();
                let improves = match best {
                    None => diff > 1e-9,
                    Some((best_c, best_d)) => diff > best_d || (diff == best_d && c < best_c),
                };
                if improves {
                    best = Some((c, diff));
                }
            }
            if let Some((c_new, diff)) = best {
                for p in partitions.iter_mut() {
                    p.move_node(v, c_new)?;
                }
                total_improvement += diff;
                let neighbors: Vec<usize> = partitions
                    .iter()
                    .flat_map(|p| p.graph().neighbors(v, Mode::All))
                    .unique()
                    .collect();
                for u in neighbors {
                    if !queued[u] && partitions[0].membership(u) != c_new {
                        queued[u] = true;
                        queue.push_back(u);
                    }
                }
            }
        }
        Ok(total_improvement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leiden::{Graph, Quality};

    fn two_triangles() -> Graph {
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
            ],
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn move_nodes_discovers_the_two_triangles() {
        let g = two_triangles();
        let mut partition = Partition::singleton(&g, Quality::cpm(0.1));
        let mut optimiser = Optimiser::new(OptimiserConfig::new().seed(Some(1)));
        let improvement = optimiser.move_nodes(&mut partition).unwrap();
        assert!(improvement > 0.0);
        assert_eq!(partition.membership(0), partition.membership(1));
        assert_eq!(partition.membership(1), partition.membership(2));
        assert_eq!(partition.membership(3), partition.membership(4));
        assert_eq!(partition.membership(4), partition.membership(5));
        assert_ne!(partition.membership(0), partition.membership(3));
    }

    #[test]
    fn move_nodes_run_twice_produces_zero_improvement_the_second_time() {
        let g = two_triangles();
        let mut partition = Partition::singleton(&g, Quality::cpm(0.1));
        let mut optimiser = Optimiser::new(OptimiserConfig::new().seed(Some(1)));
        let first = optimiser.move_nodes(&mut partition).unwrap();
        assert!(first > 0.0);
        let second = optimiser.move_nodes(&mut partition).unwrap();
        assert_eq!(second, 0.0);
    }

    #[test]
    fn optimise_partition_converges_to_quality_improving_fixed_point() {
        let g = two_triangles();
        let mut partition = Partition::singleton(&g, Quality::cpm(0.1));
        let before = partition.quality();
        let mut optimiser = Optimiser::new(OptimiserConfig::new().seed(Some(7)));
        optimiser.optimise_partition(&mut partition).unwrap();
        assert!(partition.quality() >= before);
        assert_eq!(partition.membership(0), partition.membership(1));
        assert_eq!(partition.membership(1), partition.membership(2));
        assert_eq!(partition.membership(3), partition.membership(4));
        assert_eq!(partition.membership(4), partition.membership(5));
    }

    #[test]
    fn optimise_partition_multiplex_keeps_shared_membership() {
        let g1 = two_triangles();
        let g2 = Graph::new(
            6,
            false,
            vec![(0, 3, 1.0), (1, 4, 1.0), (2, 5, 1.0)],
            None,
            None,
        )
        .unwrap();
        let mut p1 = Partition::singleton(&g1, Quality::cpm(0.1));
        let mut p2 = Partition::singleton(&g2, Quality::cpm(0.1));
        let mut optimiser = Optimiser::new(OptimiserConfig::new().seed(Some(3)));
        optimiser
            .optimise_partition_multiplex(std::slice::from_mut(&mut p1), &[1.0])
            .unwrap();
        // Single-layer multiplex call with weight 1.0 behaves like move_nodes
        // on that one layer: the two triangles should still end up merged.
        assert_eq!(p1.membership(0), p1.membership(1));
        assert_eq!(p1.membership(1), p1.membership(2));
        let _ = p2;
    }
}
