//! The integrator shell: ORB, build, force, leapfrog, sweep — one `step`
//! call per time step. Deliberately thin (spec.md §1, §4.5): this module
//! adds no tree or force logic of its own, mirroring `main.cpp`'s role as a
//! driver around `orb()`/`build_tree()`/per-body force evaluation/update.

use log::{debug, info};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use nalgebra::SVector;

use crate::body::{Body, OUT_OF_RANGE_MASS};
use crate::config::SimConfig;
use crate::distributed::{build_tree, BuildError};
use crate::force::compute_forces;
use crate::orb::{orb_decompose, OrbError};
use crate::tree::BhConfig;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Orb(#[from] OrbError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Owns this rank's bodies across the run and drives one time step at a
/// time, per spec.md §4.5.
pub struct Simulation<const D: usize> {
    pub bodies: Vec<Body<D>>,
    pub out_of_range: Vec<Body<D>>,
    pub config: SimConfig<D>,
}

impl<const D: usize> Simulation<D> {
    pub fn new(bodies: Vec<Body<D>>, config: SimConfig<D>) -> Self {
        Self {
            bodies,
            out_of_range: Vec::new(),
            config,
        }
    }

    /// Run one leapfrog step: redistribute (ORB), rebuild the local tree,
    /// evaluate forces, integrate, then sweep bodies that left the global
    /// box into `out_of_range` (spec.md §4.5, §6).
    pub fn step(&mut self, comm: &SimpleCommunicator) -> Result<(), StepError> {
        let bodies = std::mem::take(&mut self.bodies);
        let bh_config = BhConfig {
            theta: self.config.theta,
            g: self.config.g,
            r_soft: self.config.r_soft,
            ..BhConfig::default()
        };

        debug!(target: "orb", "redistributing {} bodies", bodies.len());
        let (steps, local_box, mut bodies) = orb_decompose(bodies, &self.config.global_box, comm)?;

        debug!(target: "tree", "building local tree over {} bodies", bodies.len());
        let tree = build_tree(&bodies, &steps, self.config.global_box.clone(), &bh_config, comm)?;

        debug!(target: "force", "evaluating forces");
        let accelerations = compute_forces(&tree, &mut bodies);

        let dt = self.config.dt;
        for (b, a) in bodies.iter_mut().zip(&accelerations) {
            integrate(b, a, dt);
        }

        let mut kept = Vec::with_capacity(bodies.len());
        for mut b in bodies {
            if self.config.global_box.contains(&b.pos) {
                kept.push(b);
            } else {
                b.mass = OUT_OF_RANGE_MASS;
                self.out_of_range.push(b);
            }
        }

        if self.config.timing {
            info!(target: "orb", "rank holds local box {:?}", local_box);
        }

        self.bodies = kept;
        Ok(())
    }

    /// Run the full configured number of steps.
    pub fn run(&mut self, comm: &SimpleCommunicator) -> Result<(), StepError> {
        for step_idx in 0..self.config.n_steps {
            self.step(comm)?;
            if self.config.timing {
                info!(target: "orb", "completed step {step_idx}");
            }
        }
        Ok(())
    }
}

/// Leapfrog update: `v += a*dt`, `r += v*dt + 0.5*a*dt^2` — the corrected,
/// damped form (spec.md §4.5; `main.cpp`'s original update omitted the
/// `0.5*a*dt^2` position correction, fixed here).
fn integrate<const D: usize>(b: &mut Body<D>, a: &SVector<f64, D>, dt: f64) {
    b.pos += b.vel * dt + a * (0.5 * dt * dt);
    b.vel += a * dt;
}
