//! Lattice Hamiltonians and the connected-configuration protocol.
//!
//! An [`Operator`] reports, for a configuration `v`, every configuration `v'`
//! with a nonzero matrix element `<v'|O|v>`. Each connection is described by
//! the element itself, the sites that change, and their new values; the
//! diagonal term is reported with an empty change list. Local energies and
//! observable estimates follow as `sum_k mel[k] * psi(v'_k) / psi(v)`.

mod heisenberg;
mod ising;

pub use heisenberg::Heisenberg;
pub use ising::Ising;

use nalgebra::DVector;
use num_complex::Complex64;

/// Enumeration of configurations connected to `v` through the operator.
pub trait Operator {
    /// Fill `mel`, `connectors` and `newconfs` with one entry per connected
    /// configuration. The buffers are cleared first so they can be reused
    /// across calls without reallocation.
    fn find_conn(
        &self,
        v: &DVector<f64>,
        mel: &mut Vec<Complex64>,
        connectors: &mut Vec<Vec<usize>>,
        newconfs: &mut Vec<Vec<f64>>,
    );
}

/// Hamiltonian selected at run time from the input file.
pub enum Hamiltonian {
    Ising(Ising),
    Heisenberg(Heisenberg),
}

impl Operator for Hamiltonian {
    fn find_conn(
        &self,
        v: &DVector<f64>,
        mel: &mut Vec<Complex64>,
        connectors: &mut Vec<Vec<usize>>,
        newconfs: &mut Vec<Vec<f64>>,
    ) {
        match self {
            Hamiltonian::Ising(op) => op.find_conn(v, mel, connectors, newconfs),
            Hamiltonian::Heisenberg(op) => op.find_conn(v, mel, connectors, newconfs),
        }
    }
}
