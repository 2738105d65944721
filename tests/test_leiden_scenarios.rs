use assert_approx_eq::assert_approx_eq;
use graphleiden::leiden::{ConsiderComms, Graph, Optimiser, OptimiserConfig, Partition, Quality};

fn two_triangles_with_bridge() -> Graph {
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
            (2, 3, 0.1),
        ],
        None,
        None,
    )
    .unwrap()
}

#[test]
fn cpm_finds_the_two_triangles() {
    let graph = two_triangles_with_bridge();
    let mut partition = Partition::singleton(&graph, Quality::cpm(0.5));
    let mut optimiser = Optimiser::new(
        OptimiserConfig::new()
            .consider_comms(ConsiderComms::AllNeighComms)
            .seed(Some(11)),
    );
    optimiser.optimise_partition(&mut partition).unwrap();

    assert_eq!(partition.membership(0), partition.membership(1));
    assert_eq!(partition.membership(1), partition.membership(2));
    assert_eq!(partition.membership(3), partition.membership(4));
    assert_eq!(partition.membership(4), partition.membership(5));
    assert_ne!(partition.membership(0), partition.membership(3));
}

#[test]
fn singleton_graph_is_its_own_community() {
    let graph = Graph::new(1, false, vec![], None, None).unwrap();
    let mut partition = Partition::singleton(&graph, Quality::cpm(1.0));
    let mut optimiser = Optimiser::new(OptimiserConfig::new().seed(Some(1)));
    optimiser.optimise_partition(&mut partition).unwrap();
    assert_eq!(partition.n_communities(), 1);
    assert_eq!(partition.membership(0), 0);
}

#[test]
fn modularity_separates_two_disjoint_cliques() {
    let graph = Graph::new(
        8,
        false,
        vec![
            (0, 1, 1.0),
            (0, 2, 1.0),
            (0, 3, 1.0),
            (1, 2, 1.0),
            (1, 3, 1.0),
            (2, 3, 1.0),
            (4, 5, 1.0),
            (4, 6, 1.0),
            (4, 7, 1.0),
            (5, 6, 1.0),
            (5, 7, 1.0),
            (6, 7, 1.0),
        ],
        None,
        None,
    )
    .unwrap();
    let mut partition = Partition::singleton(&graph, Quality::Modularity);
    let mut optimiser = Optimiser::new(OptimiserConfig::new().seed(Some(3)));
    optimiser.optimise_partition(&mut partition).unwrap();

    let c0 = partition.membership(0);
    let c4 = partition.membership(4);
    assert_ne!(c0, c4);
    for v in 1..4 {
        assert_eq!(partition.membership(v), c0);
    }
    for v in 5..8 {
        assert_eq!(partition.membership(v), c4);
    }
}

#[test]
fn directed_ring_diff_move_is_rotationally_symmetric() {
    // A symmetric directed cycle: rotating every vertex by one position is
    // an automorphism of the graph, so merging a vertex into its successor
    // must have the same quality delta everywhere around the ring.
    let graph = Graph::new(
        4,
        true,
        vec![(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0), (3, 0, 1.0)],
        None,
        None,
    )
    .unwrap();
    let partition = Partition::singleton(&graph, Quality::rb_configuration(1.0));
    let merge_into_successor: Vec<f64> = (0..4)
        .map(|v| partition.diff_move(v, (v + 1) % 4))
        .collect();
    for diff in &merge_into_successor[1..] {
        assert_approx_eq!(*diff, merge_into_successor[0], 1e-9);
    }
}

#[test]
fn surprise_quality_of_an_edgeless_graph_is_zero() {
    let graph = Graph::new(5, false, vec![], None, None).unwrap();
    let partition = Partition::singleton(&graph, Quality::Surprise);
    assert_approx_eq!(partition.quality(), 0.0, 1e-9);
}

#[test]
fn multiplex_with_opposite_weighted_identical_layers_never_moves() {
    // Two identical layers scored with opposite layer weights cancel
    // exactly for every candidate move, so the multi-layer optimiser must
    // leave the singleton partition untouched no matter how it is seeded.
    let layer_a = Graph::new(4, false, vec![(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0)], None, None).unwrap();
    let layer_b = Graph::new(4, false, vec![(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0)], None, None).unwrap();

    let pa = Partition::singleton(&layer_a, Quality::cpm(0.3));
    let pb = Partition::singleton(&layer_b, Quality::cpm(0.3));
    let mut layers = [pa, pb];

    let mut optimiser = Optimiser::new(OptimiserConfig::new().seed(Some(5)));
    optimiser
        .optimise_partition_multiplex(&mut layers, &[1.0, -1.0])
        .unwrap();

    for v in 0..4 {
        assert_eq!(layers[0].membership(v), v);
        assert_eq!(layers[1].membership(v), v);
    }
}
