//! Point masses, and their wire representation for ORB redistribution.

use mpi::traits::Equivalence;
use nalgebra::SVector;

/// A point mass. Carries a stable external `id` (preserved through
/// redistributions, per spec.md §3) and the `work` load-balancing weight
/// measured during the previous force evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct Body<const D: usize> {
    pub id: u64,
    pub pos: SVector<f64, D>,
    pub vel: SVector<f64, D>,
    pub mass: f64,
    pub work: f64,
}

/// Sentinel mass tagging a body that left the global box, per spec.md §6.
pub const OUT_OF_RANGE_MASS: f64 = -1.0;

impl<const D: usize> Body<D> {
    pub fn new(id: u64, pos: SVector<f64, D>, vel: SVector<f64, D>, mass: f64) -> Self {
        Self {
            id,
            pos,
            vel,
            mass,
            work: 1.0,
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        self.mass == OUT_OF_RANGE_MASS
    }
}

/// Fixed-size MPI wire form of a `Body<D>`. `[f64; D]` rather than
/// `SVector<f64, D>` because `Equivalence` is derived over plain arrays,
/// matching `original_source/misc/mpi_types.h`'s `MPICell`/`Body` offsetof
/// layout translated into rsmpi's derive macro (see e.g. the `Body` struct
/// in `akriese-cluster-computing-ss24`).
#[derive(Clone, Copy, Debug, Equivalence)]
pub struct BodyWire<const D: usize> {
    pub id: u64,
    pub pos: [f64; D],
    pub vel: [f64; D],
    pub mass: f64,
    pub work: f64,
}

fn svector_to_array<const D: usize>(v: &SVector<f64, D>) -> [f64; D] {
    std::array::from_fn(|c| v[c])
}

impl<const D: usize> From<&Body<D>> for BodyWire<D> {
    fn from(b: &Body<D>) -> Self {
        Self {
            id: b.id,
            pos: svector_to_array(&b.pos),
            vel: svector_to_array(&b.vel),
            mass: b.mass,
            work: b.work,
        }
    }
}

fn array_to_svector<const D: usize>(a: [f64; D]) -> SVector<f64, D> {
    SVector::from_fn(|c, _| a[c])
}

impl<const D: usize> From<BodyWire<D>> for Body<D> {
    fn from(w: BodyWire<D>) -> Self {
        Body {
            id: w.id,
            pos: array_to_svector(w.pos),
            vel: array_to_svector(w.vel),
            mass: w.mass,
            work: w.work,
        }
    }
}
