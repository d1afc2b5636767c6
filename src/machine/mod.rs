//! Wavefunction machines: log-amplitudes, sparse differences and gradients.
//!
//! A machine holds the variational parameters of a trial wavefunction over
//! discrete configurations. Samplers talk to it through the lookup protocol:
//! a per-chain cache of hidden-unit pre-activations that is initialized once
//! per Markov chain and updated incrementally on accepted moves, keeping the
//! cost of a proposal sublinear in the number of hidden units.

mod rbm_spin_symm;

pub use rbm_spin_symm::{RbmSpinSymm, RbmSpinSymmState};

use nalgebra::DVector;
use num_complex::Complex64;

use crate::error::Result;

/// Cached hidden-unit pre-activations `theta = W^T v + b` for one chain.
#[derive(Clone, Debug)]
pub struct Lookup {
    pub theta: DVector<Complex64>,
}

impl Default for Lookup {
    fn default() -> Self {
        Lookup {
            theta: DVector::from_element(0, Complex64::new(0.0, 0.0)),
        }
    }
}

/// Variational wavefunction over discrete configurations.
///
/// `log_val` returns `ln psi(v)`; the `_diff` variants return
/// `ln psi(v') - ln psi(v)` for sparse changes of `v` without recomputing the
/// full amplitude. Parameter gradients `d ln psi / d theta_k` drive the
/// stochastic reconfiguration update.
pub trait Machine {
    /// Number of visible units.
    fn nvisible(&self) -> usize;

    /// Number of free variational parameters.
    fn npar(&self) -> usize;

    /// Fill the parameters with i.i.d. complex Gaussians of width `sigma`.
    fn init_random_pars(&mut self, seed: u64, sigma: f64) -> Result<()>;

    fn get_parameters(&self) -> DVector<Complex64>;

    fn set_parameters(&mut self, pars: &DVector<Complex64>) -> Result<()>;

    /// Allocate and fill the lookup for configuration `v`.
    fn init_lookup(&self, v: &DVector<f64>, lt: &mut Lookup);

    /// Advance the lookup for a sparse change of `v`, before the change is
    /// applied to `v` itself.
    fn update_lookup(&self, v: &DVector<f64>, tochange: &[usize], newconf: &[f64], lt: &mut Lookup);

    fn log_val(&self, v: &DVector<f64>) -> Complex64;

    /// `log_val` using the cached pre-activations.
    fn log_val_lookup(&self, v: &DVector<f64>, lt: &Lookup) -> Complex64;

    /// Log-amplitude differences for a batch of sparse changes, without a
    /// lookup; the pre-activations are computed once for all entries.
    fn log_val_diff(
        &self,
        v: &DVector<f64>,
        tochange: &[Vec<usize>],
        newconf: &[Vec<f64>],
    ) -> DVector<Complex64>;

    /// Log-amplitude difference for a single sparse change, using the cached
    /// pre-activations. Must leave the lookup untouched.
    fn log_val_diff_lookup(
        &self,
        v: &DVector<f64>,
        tochange: &[usize],
        newconf: &[f64],
        lt: &Lookup,
    ) -> Complex64;

    /// Gradient of `ln psi` with respect to the free parameters.
    fn der_log(&self, v: &DVector<f64>) -> DVector<Complex64>;

    /// Write a JSON checkpoint of the parameters.
    fn save(&self, path: &std::path::Path) -> Result<()>;
}

/// `ln cosh x` without overflow for large `|x|`.
pub fn lncosh_real(x: f64) -> f64 {
    let xa = x.abs();
    xa + (-2.0 * xa).exp().ln_1p() - std::f64::consts::LN_2
}

/// Complex `ln cosh`, splitting off the real part so the exponentials stay
/// bounded: `cosh(x + iy) = cosh(x) (cos y + i tanh(x) sin y)`.
pub fn lncosh(z: Complex64) -> Complex64 {
    let phase = Complex64::new(z.im.cos(), z.re.tanh() * z.im.sin());
    Complex64::new(lncosh_real(z.re), 0.0) + phase.ln()
}
