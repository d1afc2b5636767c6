//! JSON input schema and component builders.
//!
//! The input file has one section per component; each section carries a
//! `Name` selecting the concrete implementation plus its settings. Builders
//! validate the names and ranges here so the driver stays a straight line.

use num_complex::Complex64;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::graph::{Graph, Hypercube};
use crate::hamiltonian::{Hamiltonian, Heisenberg, Ising};
use crate::hilbert::{Boson, Hilbert, Qubit, Spin};
use crate::machine::RbmSpinSymm;
use crate::optimizer::{AdaGrad, Optimizer, Sgd};
use crate::sampling::SrOptions;

/// Top-level input document.
#[derive(Clone, Debug, Deserialize)]
pub struct Input {
    #[serde(rename = "Graph")]
    pub graph: GraphConfig,
    #[serde(rename = "Hilbert")]
    pub hilbert: HilbertConfig,
    #[serde(rename = "Hamiltonian")]
    pub hamiltonian: HamiltonianConfig,
    #[serde(rename = "Machine")]
    pub machine: MachineConfig,
    #[serde(rename = "Sampler")]
    pub sampler: SamplerConfig,
    #[serde(rename = "Optimizer")]
    pub optimizer: OptimizerConfig,
    #[serde(rename = "Learning")]
    pub learning: LearningConfig,
}

impl Input {
    pub fn from_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GraphConfig {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "L")]
    pub l: usize,
    #[serde(rename = "Dimension")]
    pub dimension: usize,
    #[serde(rename = "Pbc", default = "default_true")]
    pub pbc: bool,
}

impl GraphConfig {
    pub fn build(&self) -> Result<Hypercube> {
        match self.name.as_str() {
            "Hypercube" => Hypercube::new(self.l, self.dimension, self.pbc),
            other => Err(Error::config(format!("unknown graph '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct HilbertConfig {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Nspins")]
    pub nspins: Option<usize>,
    #[serde(rename = "S", default = "default_spin")]
    pub s: f64,
    #[serde(rename = "TotalSz")]
    pub total_sz: Option<f64>,
    #[serde(rename = "Nbosons")]
    pub nbosons: Option<usize>,
    #[serde(rename = "Nmax")]
    pub nmax: Option<usize>,
    #[serde(rename = "Ntotal")]
    pub ntotal: Option<usize>,
    #[serde(rename = "Nqubits")]
    pub nqubits: Option<usize>,
}

impl HilbertConfig {
    pub fn build(&self) -> Result<Hilbert> {
        match self.name.as_str() {
            "Spin" => {
                let nspins = self
                    .nspins
                    .ok_or_else(|| Error::config("Nspins is required for a Spin space"))?;
                let mut spin = Spin::new(nspins, self.s)?;
                if let Some(total_sz) = self.total_sz {
                    spin = spin.with_total_sz(total_sz)?;
                }
                Ok(Hilbert::Spin(spin))
            }
            "Boson" => {
                let nbosons = self
                    .nbosons
                    .ok_or_else(|| Error::config("Nbosons is required for a Boson space"))?;
                let nmax = self
                    .nmax
                    .ok_or_else(|| Error::config("Nmax is required for a Boson space"))?;
                let mut boson = Boson::new(nbosons, nmax)?;
                if let Some(ntotal) = self.ntotal {
                    boson = boson.with_total_n(ntotal)?;
                }
                Ok(Hilbert::Boson(boson))
            }
            "Qubit" => {
                let nqubits = self
                    .nqubits
                    .ok_or_else(|| Error::config("Nqubits is required for a Qubit space"))?;
                Ok(Hilbert::Qubit(Qubit::new(nqubits)))
            }
            other => Err(Error::config(format!("unknown Hilbert space '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct HamiltonianConfig {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "h")]
    pub h: Option<f64>,
}

impl HamiltonianConfig {
    pub fn build(&self, graph: &impl Graph) -> Result<Hamiltonian> {
        match self.name.as_str() {
            "Ising" => {
                let h = self
                    .h
                    .ok_or_else(|| Error::config("transverse field h is required for Ising"))?;
                Ok(Hamiltonian::Ising(Ising::new(graph, h)))
            }
            "Heisenberg" => Ok(Hamiltonian::Heisenberg(Heisenberg::new(graph))),
            other => Err(Error::config(format!("unknown Hamiltonian '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MachineConfig {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Alpha")]
    pub alpha: usize,
    #[serde(rename = "UseVisibleBias", default = "default_true")]
    pub use_visible_bias: bool,
    #[serde(rename = "UseHiddenBias", default = "default_true")]
    pub use_hidden_bias: bool,
    #[serde(rename = "Seed", default = "default_machine_seed")]
    pub seed: u64,
    #[serde(rename = "Sigma", default = "default_sigma")]
    pub sigma: f64,
    #[serde(rename = "asymm")]
    pub asymm: Option<Complex64>,
    #[serde(rename = "bsymm")]
    pub bsymm: Option<Vec<Complex64>>,
    #[serde(rename = "Wsymm")]
    pub wsymm: Option<Vec<Vec<Complex64>>>,
}

impl MachineConfig {
    pub fn build(&self, graph: &impl Graph, hilbert: &Hilbert) -> Result<RbmSpinSymm> {
        if self.name != "RbmSpinSymm" {
            return Err(Error::config(format!("unknown machine '{}'", self.name)));
        }
        let mut machine = RbmSpinSymm::new(
            graph,
            hilbert,
            self.alpha,
            self.use_visible_bias,
            self.use_hidden_bias,
        )?;

        use crate::machine::Machine;
        if self.wsymm.is_none() {
            machine.init_random_pars(self.seed, self.sigma)?;
        }
        machine.set_symm_params(self.asymm, self.bsymm.clone(), self.wsymm.clone())?;
        Ok(machine)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SamplerConfig {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Seed")]
    pub seed: Option<u64>,
}

impl SamplerConfig {
    /// Validate the sampler name; the chain itself is built by the driver
    /// once the machine exists.
    pub fn validate(&self) -> Result<()> {
        match self.name.as_str() {
            "MetropolisLocal" => Ok(()),
            other => Err(Error::config(format!("unknown sampler '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OptimizerConfig {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "LearningRate")]
    pub learning_rate: Option<f64>,
    #[serde(rename = "L2Reg", default)]
    pub l2_reg: f64,
    #[serde(rename = "DecayFactor", default = "default_one")]
    pub decay_factor: f64,
    #[serde(rename = "Epscut", default = "default_epscut")]
    pub epscut: f64,
}

impl OptimizerConfig {
    pub fn build(&self) -> Result<Optimizer> {
        match self.name.as_str() {
            "Sgd" => {
                let lr = self
                    .learning_rate
                    .ok_or_else(|| Error::config("LearningRate is required for Sgd"))?;
                Ok(Optimizer::Sgd(Sgd::new(lr, self.l2_reg, self.decay_factor)?))
            }
            "AdaGrad" => {
                let lr = self.learning_rate.unwrap_or(0.001);
                Ok(Optimizer::AdaGrad(AdaGrad::new(lr, self.epscut)?))
            }
            other => Err(Error::config(format!("unknown optimizer '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LearningConfig {
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "Nsamples")]
    pub nsamples: usize,
    #[serde(rename = "NiterOpt")]
    pub niter_opt: usize,
    #[serde(rename = "OutputFile")]
    pub output_file: String,
    #[serde(rename = "SaveEvery", default = "default_save_every")]
    pub save_every: usize,
    #[serde(rename = "DiagShift", default = "default_diag_shift")]
    pub diag_shift: f64,
    #[serde(rename = "RescaleShift", default)]
    pub rescale_shift: bool,
    #[serde(rename = "UseIterative", default)]
    pub use_iterative: bool,
    #[serde(rename = "CgTolerance", default = "default_cg_tolerance")]
    pub cg_tolerance: f64,
    #[serde(rename = "SvdThreshold", default = "default_svd_threshold")]
    pub svd_threshold: f64,
}

impl LearningConfig {
    pub fn build(&self) -> Result<SrOptions> {
        let use_sr = match self.method.as_str() {
            "Sr" => true,
            "Gd" => false,
            other => return Err(Error::config(format!("unknown learning method '{other}'"))),
        };
        Ok(SrOptions {
            nsamples: self.nsamples,
            niter_opt: self.niter_opt,
            output_file: Some(self.output_file.clone()),
            save_every: self.save_every,
            use_sr,
            diag_shift: self.diag_shift,
            rescale_shift: self.rescale_shift,
            use_iterative: self.use_iterative,
            cg_tolerance: self.cg_tolerance,
            cg_max_iter: 1000,
            svd_threshold: self.svd_threshold,
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_spin() -> f64 {
    0.5
}

fn default_machine_seed() -> u64 {
    1234
}

fn default_sigma() -> f64 {
    0.01
}

fn default_one() -> f64 {
    1.0
}

fn default_epscut() -> f64 {
    1e-7
}

fn default_save_every() -> usize {
    100
}

fn default_diag_shift() -> f64 {
    0.01
}

fn default_cg_tolerance() -> f64 {
    1e-3
}

fn default_svd_threshold() -> f64 {
    1e-6
}
