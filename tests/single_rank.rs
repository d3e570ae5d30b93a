//! End-to-end scenarios that need a live MPI universe but not a multi-rank
//! launcher — a single-process `mpi::initialize()` universe, same pattern
//! SPEC_FULL.md's test-tooling section calls for so the ORB/distributed
//! modules aren't only exercised through their pure-Rust unit tests.

use mpi::traits::*;
use nalgebra::SVector;

use barnes_hut_mpi::body::Body;
use barnes_hut_mpi::distributed::build_tree;
use barnes_hut_mpi::geometry::BBox;
use barnes_hut_mpi::orb::orb_decompose;
use barnes_hut_mpi::tree::BhConfig;

fn global_box() -> BBox<3> {
    BBox::new(SVector::from([0.0; 3]), SVector::from([8.0; 3]))
}

#[test]
fn single_rank_orb_is_a_no_op() {
    let universe = mpi::initialize().expect("MPI initialization failed");
    let world = universe.world();
    assert_eq!(world.size(), 1);

    let bodies = vec![
        Body::new(0, SVector::from([1.0, 1.0, 1.0]), SVector::zeros(), 1.0),
        Body::new(1, SVector::from([6.0, 6.0, 6.0]), SVector::zeros(), 2.0),
    ];
    let (steps, local_box, kept) = orb_decompose(bodies, &global_box(), &world).unwrap();

    // With one rank there are zero bisection levels: nothing moves.
    assert!(steps.is_empty());
    assert_eq!(local_box, global_box());
    assert_eq!(kept.len(), 2);
}

#[test]
fn single_rank_build_tree_holds_every_body() {
    let universe = mpi::initialize().expect("MPI initialization failed");
    let world = universe.world();

    let bodies = vec![
        Body::new(0, SVector::from([1.0, 1.0, 1.0]), SVector::zeros(), 1.0),
        Body::new(1, SVector::from([6.0, 6.0, 6.0]), SVector::zeros(), 3.0),
    ];
    let (steps, local_box, bodies) = orb_decompose(bodies, &global_box(), &world).unwrap();
    let tree = build_tree(&bodies, &steps, local_box, &BhConfig::default(), &world).unwrap();

    let root = &tree.arena[tree.root];
    assert!((root.mass - 4.0).abs() < 1e-12);
}

#[test]
fn out_of_range_body_is_rejected_at_orb_entry() {
    let universe = mpi::initialize().expect("MPI initialization failed");
    let world = universe.world();

    let bodies = vec![Body::new(0, SVector::from([100.0, 100.0, 100.0]), SVector::zeros(), 1.0)];
    assert!(orb_decompose(bodies, &global_box(), &world).is_err());
}
