//! Barnes-Hut force evaluation: the opening-criterion walk over a local
//! [`Tree`], driven across a rank's bodies with `rayon`.
//!
//! Grounded in the teacher's `run_bh`/`Tree::leaves` (stack-based traversal
//! applying `s/d < theta`, then `rayon::par_iter().reduce(...)` across
//! leaves) generalized from "parallel over leaves, one force_fn call per
//! leaf pair" to "parallel over bodies, sequential walk per body" so that
//! each body's own accumulation order is reproducible regardless of how
//! rayon schedules the outer loop (spec.md §8 "Force determinism").

use generational_arena::Index;
use nalgebra::SVector;
use rayon::prelude::*;

use crate::body::Body;
use crate::kernel::eval_force;
use crate::tree::{Cell, Tree};

/// Accumulate the acceleration on `b` by walking `tree` from the root,
/// applying the Barnes-Hut opening criterion `s / d < theta` at every
/// internal cell (spec.md §4.4). `theta == 0.0` never opens, so every leaf
/// is visited: exact O(N) against this rank's local tree.
pub fn eval_body_force<const D: usize>(tree: &Tree<D>, b: &Body<D>) -> SVector<f64, D> {
    let mut acc = SVector::<f64, D>::zeros();
    let mut stack = vec![tree.root];
    while let Some(idx) = stack.pop() {
        walk(tree, idx, b, &mut acc, &mut stack);
    }
    acc
}

fn walk<const D: usize>(
    tree: &Tree<D>,
    idx: Index,
    b: &Body<D>,
    acc: &mut SVector<f64, D>,
    stack: &mut Vec<Index>,
) {
    let cell: &Cell<D> = &tree.arena[idx];
    if cell.is_empty() {
        return;
    }
    if let Some(leaf_body) = &cell.body {
        if leaf_body.id != b.id {
            *acc += eval_force(&b.pos, &cell.com, cell.mass, tree.config.g, tree.config.r_soft);
        }
        return;
    }
    // Internal cell: apply the opening criterion using the cell's own side
    // length as `s` and the distance from `b` to the cell's center of mass.
    let d = (b.pos - cell.com).norm();
    let s = cell.box_.max_side();
    if d > 0.0 && s / d < tree.config.theta {
        *acc += eval_force(&b.pos, &cell.com, cell.mass, tree.config.g, tree.config.r_soft);
        return;
    }
    if let Some(children) = &cell.children {
        stack.extend(children.iter().flatten());
    }
}

/// Evaluate forces for every local body, writing each body's elapsed
/// wall-clock evaluation time into `work` for the next ORB pass (spec.md
/// §4.1 step 3, §4.4 last line). Bodies are independent of each other, so
/// the outer loop runs in parallel; each body's own walk stays sequential.
pub fn compute_forces<const D: usize>(tree: &Tree<D>, bodies: &mut [Body<D>]) -> Vec<SVector<f64, D>> {
    let results: Vec<(SVector<f64, D>, f64)> = bodies
        .par_iter()
        .map(|b| {
            let start = std::time::Instant::now();
            let a = eval_body_force(tree, b);
            (a, start.elapsed().as_secs_f64())
        })
        .collect();

    for (b, (_, work)) in bodies.iter_mut().zip(&results) {
        b.work = *work;
    }
    results.into_iter().map(|(a, _)| a).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;
    use crate::tree::BhConfig;
    use approx::assert_relative_eq;

    fn box3(lo: [f64; 3], hi: [f64; 3]) -> BBox<3> {
        BBox::new(SVector::from(lo), SVector::from(hi))
    }

    #[test]
    fn theta_zero_matches_brute_force() {
        let mut tree = Tree::new(box3([0.0; 3], [8.0; 3]), BhConfig { theta: 0.0, ..BhConfig::default() });
        let bodies = vec![
            Body::new(0, SVector::from([1.0, 1.0, 1.0]), SVector::zeros(), 1.0),
            Body::new(1, SVector::from([5.0, 1.0, 1.0]), SVector::zeros(), 2.0),
            Body::new(2, SVector::from([1.0, 5.0, 5.0]), SVector::zeros(), 3.0),
        ];
        for b in &bodies {
            tree.insert_body(b.clone()).unwrap();
        }

        for b in &bodies {
            let got = eval_body_force(&tree, b);
            let mut expected = SVector::<f64, 3>::zeros();
            for other in &bodies {
                if other.id != b.id {
                    expected += eval_force(&b.pos, &other.pos, other.mass, tree.config.g, tree.config.r_soft);
                }
            }
            assert_relative_eq!(got, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn self_interaction_excluded() {
        let mut tree = Tree::new(box3([0.0; 3], [4.0; 3]), BhConfig::default());
        let body = Body::new(0, SVector::from([1.0, 1.0, 1.0]), SVector::zeros(), 5.0);
        tree.insert_body(body.clone()).unwrap();

        let a = eval_body_force(&tree, &body);
        assert_relative_eq!(a, SVector::<f64, 3>::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn compute_forces_records_work() {
        let mut tree = Tree::new(box3([0.0; 3], [4.0; 3]), BhConfig::default());
        let mut bodies = vec![
            Body::new(0, SVector::from([1.0, 1.0, 1.0]), SVector::zeros(), 1.0),
            Body::new(1, SVector::from([3.0, 3.0, 3.0]), SVector::zeros(), 1.0),
        ];
        for b in &bodies {
            tree.insert_body(b.clone()).unwrap();
        }
        let accs = compute_forces(&tree, &mut bodies);
        assert_eq!(accs.len(), 2);
        for b in &bodies {
            assert!(b.work >= 0.0);
        }
    }
}
