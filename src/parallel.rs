//! Collective operations across a process group.
//!
//! The learning loop is written in SPMD style: every rank runs the same
//! iteration sequence and meets the others only inside the collectives
//! defined here. Components receive the transport by value instead of
//! reading global process identifiers, so the sequential build and a
//! message-passing build differ only in which `Transport` they are handed.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Collective operations required by the sampler and the learning engine.
///
/// All reductions are in-place sums over ranks; `broadcast` distributes the
/// root's buffer to every rank. Implementations must be deterministic with
/// respect to rank count: every rank calls every collective in the same
/// order.
pub trait Transport {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sum a scalar over all ranks.
    fn sum_f64(&self, x: f64) -> f64;

    /// Sum a complex scalar over all ranks.
    fn sum_c64(&self, x: Complex64) -> Complex64;

    /// Element-wise sum of a complex vector over all ranks, in place.
    fn sum_vector(&self, x: &mut DVector<Complex64>);

    /// Element-wise sum of a complex matrix over all ranks, in place.
    fn sum_matrix(&self, x: &mut DMatrix<Complex64>);

    /// Replace `x` on every rank with the root's copy.
    fn broadcast_vector(&self, x: &mut DVector<Complex64>);

    /// Deliver `from_root[rank]` to each rank. Only the root's input is
    /// meaningful; other ranks may pass an empty slice.
    fn scatter_u64(&self, from_root: &[u64]) -> u64;

    /// Block until every rank has arrived.
    fn barrier(&self);
}

/// Transport for a single-process run: every collective is the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum_f64(&self, x: f64) -> f64 {
        x
    }

    fn sum_c64(&self, x: Complex64) -> Complex64 {
        x
    }

    fn sum_vector(&self, _x: &mut DVector<Complex64>) {}

    fn sum_matrix(&self, _x: &mut DMatrix<Complex64>) {}

    fn broadcast_vector(&self, _x: &mut DVector<Complex64>) {}

    fn scatter_u64(&self, from_root: &[u64]) -> u64 {
        from_root[0]
    }

    fn barrier(&self) {}
}
