//! Distributed tree construction: seed the ORB skeleton, insert local
//! bodies, then exchange/graft/prune boundary detail level by level.
//!
//! Grounded 1:1 in `original_source/tree/build_tree.cpp`'s `build_tree()`:
//! the bounds-then-bodies insertion order, the per-level
//! `cells_to_send`/exchange/`construct_received_trees`/`prune_tree` loop,
//! and the `initiator`-gated send/receive ordering that avoids the
//! classic two-rank deadlock (spec.md §4.3 step 3, §5).

use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use crate::body::Body;
use crate::error::ProtocolError;
use crate::geometry::BBox;
use crate::orb::OrbStep;
use crate::tree::{BhConfig, Tree, TreeError};
use crate::wire::{flatten, reconstruct, MpiCell};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Build this rank's local tree: own-box detail down to single bodies,
/// aggregate summaries for everything outside it contributed by ORB
/// partners at each level (spec.md §4.3).
pub fn build_tree<const D: usize>(
    bodies: &[Body<D>],
    steps: &[OrbStep<D>],
    global_box: BBox<D>,
    config: &BhConfig,
    comm: &SimpleCommunicator,
) -> Result<Tree<D>, BuildError> {
    let mut tree = Tree::new(global_box, *config);

    for step in steps {
        tree.insert_empty_cell(&step.bound);
    }
    for b in bodies {
        tree.insert_body(b.clone())?;
    }

    for step in steps {
        let mut indices = Vec::new();
        tree.cells_to_send(&step.other_bound, &mut indices);
        let outgoing = flatten(&tree, &indices);

        let partner = comm.process_at_rank(step.partner);
        let incoming: Vec<MpiCell<D>> = if step.initiator {
            let (recv, _) = partner.receive_vec::<MpiCell<D>>();
            partner.send(&outgoing[..]);
            recv
        } else {
            partner.send(&outgoing[..]);
            let (recv, _) = partner.receive_vec::<MpiCell<D>>();
            recv
        };

        let roots = reconstruct(&incoming)?;
        for root in &roots {
            tree.insert_cell(root)?;
        }

        tree.prune_tree(&step.bound);
    }

    Ok(tree)
}
