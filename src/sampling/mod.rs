//! Monte Carlo sampling and the stochastic reconfiguration learning loop.

mod metropolis;
mod sr;

pub use metropolis::MetropolisLocal;
pub use sr::{Sr, SrOptions};
