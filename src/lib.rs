//! lattice_vmc - Variational Monte Carlo for lattice spin models
//!
//! This crate finds approximate ground states of lattice quantum many-body
//! Hamiltonians by optimizing a permutation-symmetric Restricted Boltzmann
//! Machine wavefunction with the Stochastic Reconfiguration method, sampling
//! configurations through local Metropolis moves.

pub mod error;
pub mod graph;
pub mod hamiltonian;
pub mod hilbert;
pub mod io;
pub mod machine;
pub mod optimizer;
pub mod parallel;
pub mod sampling;
pub mod stats;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use graph::{Graph, Hypercube};
pub use hamiltonian::{Hamiltonian, Heisenberg, Ising, Operator};
pub use hilbert::{Boson, Hilbert, Qubit, Spin};
pub use io::{Input, LogWriter};
pub use machine::{Lookup, Machine, RbmSpinSymm, RbmSpinSymmState};
pub use optimizer::{AdaGrad, Optimizer, Sgd, Stepper};
pub use parallel::{LocalTransport, Transport};
pub use sampling::{MetropolisLocal, Sr, SrOptions};
pub use stats::ObsManager;
