//! Restricted Boltzmann Machine with permutation-symmetric weight tying.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::hilbert::Hilbert;
use crate::machine::{lncosh, Lookup, Machine};

/// RBM whose weights are tied under a site-permutation group.
///
/// The free parameters are a single visible bias, `alpha` hidden biases and
/// an `N x alpha` weight block. They are expanded to the bare RBM tensors by
/// replicating each hidden orbit over the `P` group elements:
///
/// - `a[i] = asymm`
/// - `b[j] = bsymm[j / P]`
/// - `W[i, j] = Wsymm[perm[j % P][i], j / P]`
///
/// where `perm` is the graph's symmetry table. The expansion is refreshed
/// after every mutation of the symmetric set, so log-amplitude queries always
/// see consistent bare tensors.
pub struct RbmSpinSymm {
    nv: usize,
    alpha: usize,
    permsize: usize,
    nh: usize,
    npar: usize,
    nbare: usize,
    usea: bool,
    useb: bool,
    permtable: Vec<Vec<usize>>,

    asymm: Complex64,
    bsymm: DVector<Complex64>,
    wsymm: DMatrix<Complex64>,

    a: DVector<Complex64>,
    b: DVector<Complex64>,
    w: DMatrix<Complex64>,

    // bare parameter index -> free parameter index; the scatter-add form of
    // the 0/1 aggregation matrix between bare and symmetric gradients
    bare_to_symm: Vec<usize>,
}

impl RbmSpinSymm {
    pub fn new(
        graph: &impl Graph,
        hilbert: &Hilbert,
        alpha: usize,
        usea: bool,
        useb: bool,
    ) -> Result<Self> {
        let nv = graph.nsites();
        if nv != hilbert.size() {
            return Err(Error::config(format!(
                "graph has {} sites but the Hilbert space has {}",
                nv,
                hilbert.size()
            )));
        }
        if alpha < 1 {
            return Err(Error::config("Alpha must be at least 1"));
        }

        let permtable = graph.symmetry_table()?;
        let permsize = permtable.len();
        for row in &permtable {
            if row.len() != nv {
                return Err(Error::config("symmetry table row length differs from site count"));
            }
        }

        let nh = alpha * permsize;
        let mut npar = alpha * nv;
        let mut nbare = nv * nh;
        if usea {
            npar += 1;
            nbare += nv;
        }
        if useb {
            npar += alpha;
            nbare += nh;
        }

        let bare_to_symm = Self::build_symm_map(&permtable, nv, nh, alpha, permsize, usea, useb);
        debug_assert_eq!(bare_to_symm.len(), nbare);

        info!(
            "symmetric RBM: {} visible, {} hidden, {} free parameters ({} bare)",
            nv, nh, npar, nbare
        );

        let mut machine = Self {
            nv,
            alpha,
            permsize,
            nh,
            npar,
            nbare,
            usea,
            useb,
            permtable,
            asymm: Complex64::default(),
            bsymm: DVector::zeros(alpha),
            wsymm: DMatrix::zeros(nv, alpha),
            a: DVector::zeros(nv),
            b: DVector::zeros(nh),
            w: DMatrix::zeros(nv, nh),
            bare_to_symm,
        };
        machine.set_bare_parameters();
        Ok(machine)
    }

    /// Each bare partial accumulates into the free parameter of its
    /// equivalence class, in the same block order as `get_parameters`.
    fn build_symm_map(
        permtable: &[Vec<usize>],
        nv: usize,
        nh: usize,
        alpha: usize,
        permsize: usize,
        usea: bool,
        useb: bool,
    ) -> Vec<usize> {
        let mut map = Vec::new();
        let mut offset = 0;

        if usea {
            map.extend(std::iter::repeat(0).take(nv));
            offset += 1;
        }
        if useb {
            for j in 0..nh {
                map.push(offset + j / permsize);
            }
            offset += alpha;
        }
        for i in 0..nv {
            for j in 0..nh {
                let isymm = permtable[j % permsize][i];
                let jsymm = j / permsize;
                map.push(offset + isymm * alpha + jsymm);
            }
        }
        map
    }

    fn set_bare_parameters(&mut self) {
        let asymm = if self.usea { self.asymm } else { Complex64::default() };
        self.a.fill(asymm);

        for j in 0..self.nh {
            self.b[j] = if self.useb { self.bsymm[j / self.permsize] } else { Complex64::default() };
        }

        for i in 0..self.nv {
            for j in 0..self.nh {
                let isymm = self.permtable[j % self.permsize][i];
                self.w[(i, j)] = self.wsymm[(isymm, j / self.permsize)];
            }
        }
    }

    fn theta(&self, v: &DVector<f64>) -> DVector<Complex64> {
        let vc = v.map(|x| Complex64::new(x, 0.0));
        self.w.tr_mul(&vc) + &self.b
    }

    fn visible_term(&self, v: &DVector<f64>) -> Complex64 {
        v.iter().zip(self.a.iter()).map(|(&vi, ai)| ai * vi).sum()
    }

    pub fn nhidden(&self) -> usize {
        self.nh
    }

    pub fn alpha(&self) -> usize {
        self.alpha
    }

    /// Snapshot of the free parameters for checkpointing.
    pub fn state(&self) -> RbmSpinSymmState {
        RbmSpinSymmState {
            name: "RbmSpinSymm".to_string(),
            nvisible: self.nv,
            alpha: self.alpha,
            use_visible_bias: self.usea,
            use_hidden_bias: self.useb,
            asymm: self.asymm,
            bsymm: self.bsymm.iter().copied().collect(),
            wsymm: (0..self.nv)
                .map(|i| (0..self.alpha).map(|k| self.wsymm[(i, k)]).collect())
                .collect(),
        }
    }

    /// Restore the free parameters from a checkpoint, validating shape and
    /// machine identity.
    pub fn load_state(&mut self, state: &RbmSpinSymmState) -> Result<()> {
        if state.name != "RbmSpinSymm" {
            return Err(Error::config(format!(
                "checkpoint is for machine '{}', expected 'RbmSpinSymm'",
                state.name
            )));
        }
        if state.nvisible != self.nv {
            return Err(Error::config(format!(
                "checkpoint has {} visible units, the Hilbert space has {}",
                state.nvisible, self.nv
            )));
        }
        if state.alpha != self.alpha {
            return Err(Error::config(format!(
                "checkpoint has Alpha = {}, machine has Alpha = {}",
                state.alpha, self.alpha
            )));
        }
        self.set_symm_params(
            Some(state.asymm),
            Some(state.bsymm.clone()),
            Some(state.wsymm.clone()),
        )
    }

    /// Overwrite whichever symmetric blocks are provided; absent blocks keep
    /// their current values. Always re-expands the bare tensors.
    pub fn set_symm_params(
        &mut self,
        asymm: Option<Complex64>,
        bsymm: Option<Vec<Complex64>>,
        wsymm: Option<Vec<Vec<Complex64>>>,
    ) -> Result<()> {
        if let Some(a) = asymm {
            self.asymm = a;
        }
        if let Some(b) = bsymm {
            if b.len() != self.alpha {
                return Err(Error::config(format!(
                    "bsymm has {} entries, expected {}",
                    b.len(),
                    self.alpha
                )));
            }
            self.bsymm = DVector::from_vec(b);
        }
        if let Some(w) = wsymm {
            if w.len() != self.nv || w.iter().any(|row| row.len() != self.alpha) {
                return Err(Error::config(format!(
                    "Wsymm must be a {} x {} matrix",
                    self.nv, self.alpha
                )));
            }
            for (i, row) in w.iter().enumerate() {
                for (k, &val) in row.iter().enumerate() {
                    self.wsymm[(i, k)] = val;
                }
            }
        }
        self.set_bare_parameters();
        Ok(())
    }

    pub fn read_state(path: impl AsRef<Path>) -> Result<RbmSpinSymmState> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl Machine for RbmSpinSymm {
    fn nvisible(&self) -> usize {
        self.nv
    }

    fn npar(&self) -> usize {
        self.npar
    }

    fn init_random_pars(&mut self, seed: u64, sigma: f64) -> Result<()> {
        let normal = Normal::new(0.0, sigma)
            .map_err(|e| Error::config(format!("invalid Sigma for parameter init: {e}")))?;
        let mut rng = StdRng::seed_from_u64(seed);
        let pars = DVector::from_fn(self.npar, |_, _| {
            Complex64::new(normal.sample(&mut rng), normal.sample(&mut rng))
        });
        self.set_parameters(&pars)
    }

    fn get_parameters(&self) -> DVector<Complex64> {
        let mut pars = DVector::zeros(self.npar);
        let mut k = 0;
        if self.usea {
            pars[k] = self.asymm;
            k += 1;
        }
        if self.useb {
            for p in 0..self.alpha {
                pars[k] = self.bsymm[p];
                k += 1;
            }
        }
        for i in 0..self.nv {
            for j in 0..self.alpha {
                pars[k] = self.wsymm[(i, j)];
                k += 1;
            }
        }
        pars
    }

    fn set_parameters(&mut self, pars: &DVector<Complex64>) -> Result<()> {
        if pars.len() != self.npar {
            return Err(Error::config(format!(
                "got {} parameters, machine has {}",
                pars.len(),
                self.npar
            )));
        }
        let mut k = 0;
        if self.usea {
            self.asymm = pars[k];
            k += 1;
        }
        if self.useb {
            for p in 0..self.alpha {
                self.bsymm[p] = pars[k];
                k += 1;
            }
        }
        for i in 0..self.nv {
            for j in 0..self.alpha {
                self.wsymm[(i, j)] = pars[k];
                k += 1;
            }
        }
        self.set_bare_parameters();
        Ok(())
    }

    fn init_lookup(&self, v: &DVector<f64>, lt: &mut Lookup) {
        lt.theta = self.theta(v);
    }

    fn update_lookup(&self, v: &DVector<f64>, tochange: &[usize], newconf: &[f64], lt: &mut Lookup) {
        for (s, &sf) in tochange.iter().enumerate() {
            let d = Complex64::from(newconf[s] - v[sf]);
            lt.theta += self.w.row(sf).transpose() * d;
        }
    }

    fn log_val(&self, v: &DVector<f64>) -> Complex64 {
        let theta = self.theta(v);
        self.visible_term(v) + theta.iter().map(|&t| lncosh(t)).sum::<Complex64>()
    }

    fn log_val_lookup(&self, v: &DVector<f64>, lt: &Lookup) -> Complex64 {
        self.visible_term(v) + lt.theta.iter().map(|&t| lncosh(t)).sum::<Complex64>()
    }

    fn log_val_diff(
        &self,
        v: &DVector<f64>,
        tochange: &[Vec<usize>],
        newconf: &[Vec<f64>],
    ) -> DVector<Complex64> {
        let theta = self.theta(v);
        let logtsum: Complex64 = theta.iter().map(|&t| lncosh(t)).sum();

        let mut diffs = DVector::zeros(tochange.len());
        for (k, (sites, vals)) in tochange.iter().zip(newconf.iter()).enumerate() {
            if sites.is_empty() {
                continue;
            }
            let mut thetanew = theta.clone();
            let mut diff = Complex64::default();
            for (s, &sf) in sites.iter().enumerate() {
                let d = Complex64::from(vals[s] - v[sf]);
                diff += self.a[sf] * d;
                thetanew += self.w.row(sf).transpose() * d;
            }
            diff += thetanew.iter().map(|&t| lncosh(t)).sum::<Complex64>() - logtsum;
            diffs[k] = diff;
        }
        diffs
    }

    fn log_val_diff_lookup(
        &self,
        v: &DVector<f64>,
        tochange: &[usize],
        newconf: &[f64],
        lt: &Lookup,
    ) -> Complex64 {
        if tochange.is_empty() {
            return Complex64::default();
        }
        let logtsum: Complex64 = lt.theta.iter().map(|&t| lncosh(t)).sum();
        let mut thetanew = lt.theta.clone();
        let mut diff = Complex64::default();
        for (s, &sf) in tochange.iter().enumerate() {
            let d = Complex64::from(newconf[s] - v[sf]);
            diff += self.a[sf] * d;
            thetanew += self.w.row(sf).transpose() * d;
        }
        diff + thetanew.iter().map(|&t| lncosh(t)).sum::<Complex64>() - logtsum
    }

    fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.state())?;
        Ok(())
    }

    fn der_log(&self, v: &DVector<f64>) -> DVector<Complex64> {
        let theta = self.theta(v);
        let tanh_theta = theta.map(|t| t.tanh());

        let mut bare = DVector::zeros(self.nbare);
        let mut k = 0;
        if self.usea {
            for i in 0..self.nv {
                bare[k] = Complex64::from(v[i]);
                k += 1;
            }
        }
        if self.useb {
            for j in 0..self.nh {
                bare[k] = tanh_theta[j];
                k += 1;
            }
        }
        for i in 0..self.nv {
            for j in 0..self.nh {
                bare[k] = tanh_theta[j] * v[i];
                k += 1;
            }
        }

        let mut der = DVector::zeros(self.npar);
        for (kbare, &ksymm) in self.bare_to_symm.iter().enumerate() {
            der[ksymm] += bare[kbare];
        }
        der
    }
}

/// On-disk form of the machine; what `.wf` checkpoints contain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RbmSpinSymmState {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Nvisible")]
    pub nvisible: usize,
    #[serde(rename = "Alpha")]
    pub alpha: usize,
    #[serde(rename = "UseVisibleBias")]
    pub use_visible_bias: bool,
    #[serde(rename = "UseHiddenBias")]
    pub use_hidden_bias: bool,
    #[serde(rename = "asymm")]
    pub asymm: Complex64,
    #[serde(rename = "bsymm")]
    pub bsymm: Vec<Complex64>,
    #[serde(rename = "Wsymm")]
    pub wsymm: Vec<Vec<Complex64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Hypercube;
    use crate::hilbert::Spin;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn spin_chain(n: usize) -> (Hypercube, Hilbert) {
        let graph = Hypercube::new(n, 1, true).unwrap();
        let hilbert = Hilbert::Spin(Spin::new(n, 0.5).unwrap());
        (graph, hilbert)
    }

    fn random_machine(n: usize, alpha: usize, seed: u64) -> RbmSpinSymm {
        let (graph, hilbert) = spin_chain(n);
        let mut m = RbmSpinSymm::new(&graph, &hilbert, alpha, true, true).unwrap();
        m.init_random_pars(seed, 0.1).unwrap();
        m
    }

    fn random_config(n: usize, rng: &mut impl Rng) -> DVector<f64> {
        DVector::from_fn(n, |_, _| if rng.gen::<bool>() { 1.0 } else { -1.0 })
    }

    #[test]
    fn parameter_counts() {
        let (graph, hilbert) = spin_chain(6);
        let m = RbmSpinSymm::new(&graph, &hilbert, 2, true, true).unwrap();
        assert_eq!(m.nhidden(), 12);
        assert_eq!(m.npar(), 6 * 2 + 2 + 1);

        let bare = RbmSpinSymm::new(&graph, &hilbert, 2, false, false).unwrap();
        assert_eq!(bare.npar(), 12);
    }

    #[test]
    fn symm_map_class_sizes() {
        let (graph, hilbert) = spin_chain(5);
        let m = RbmSpinSymm::new(&graph, &hilbert, 3, true, true).unwrap();

        let mut class_size = vec![0usize; m.npar];
        for &k in &m.bare_to_symm {
            class_size[k] += 1;
        }
        // visible bias gathers all N sites, every other class has P members
        assert_eq!(class_size[0], 5);
        assert!(class_size[1..].iter().all(|&c| c == 5));
    }

    #[test]
    fn expansion_replicates_hidden_orbits() {
        let m = random_machine(6, 2, 42);
        for j in 0..m.nhidden() {
            assert_eq!(m.b[j], m.bsymm[j / m.permsize]);
        }
        for i in 0..m.nv {
            for j in 0..m.nh {
                let expected = m.wsymm[(m.permtable[j % m.permsize][i], j / m.permsize)];
                assert_eq!(m.w[(i, j)], expected);
            }
        }
    }

    #[test]
    fn parameter_round_trip_is_identity() {
        let mut m = random_machine(8, 2, 7);
        let pars = m.get_parameters();
        m.set_parameters(&pars).unwrap();
        assert_eq!(m.get_parameters(), pars);

        let short = DVector::zeros(3);
        assert!(m.set_parameters(&short).is_err());
    }

    #[test]
    fn diff_matches_full_evaluation() {
        let mut rng = StdRng::seed_from_u64(11);
        let m = random_machine(10, 1, 3);
        let v = random_config(10, &mut rng);

        let tochange = vec![vec![2usize], vec![0, 7], vec![]];
        let newconf = vec![vec![-v[2]], vec![-v[0], -v[7]], vec![]];
        let diffs = m.log_val_diff(&v, &tochange, &newconf);

        for k in 0..tochange.len() {
            let mut vp = v.clone();
            for (s, &sf) in tochange[k].iter().enumerate() {
                vp[sf] = newconf[k][s];
            }
            let expected = m.log_val(&vp) - m.log_val(&v);
            assert_relative_eq!(diffs[k].re, expected.re, epsilon = 1e-10);
            assert_relative_eq!(diffs[k].im, expected.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn lookup_diff_matches_batch_diff() {
        let mut rng = StdRng::seed_from_u64(19);
        let m = random_machine(8, 2, 5);
        let v = random_config(8, &mut rng);

        let mut lt = Lookup::default();
        m.init_lookup(&v, &mut lt);

        let sites = vec![3usize, 6];
        let vals = vec![-v[3], -v[6]];
        let from_lookup = m.log_val_diff_lookup(&v, &sites, &vals, &lt);
        let from_batch = m.log_val_diff(&v, &[sites], &[vals])[0];
        assert_relative_eq!(from_lookup.re, from_batch.re, epsilon = 1e-10);
        assert_relative_eq!(from_lookup.im, from_batch.im, epsilon = 1e-10);
    }

    #[test]
    fn lookup_stays_consistent_across_updates() {
        let mut rng = StdRng::seed_from_u64(23);
        let m = random_machine(8, 2, 9);
        let mut v = random_config(8, &mut rng);

        let mut lt = Lookup::default();
        m.init_lookup(&v, &mut lt);

        for _ in 0..50 {
            let site = rng.gen_range(0..8);
            let newval = -v[site];
            m.update_lookup(&v, &[site], &[newval], &mut lt);
            v[site] = newval;

            let direct = m.log_val(&v);
            let cached = m.log_val_lookup(&v, &lt);
            assert_relative_eq!(direct.re, cached.re, epsilon = 1e-10);
            assert_relative_eq!(direct.im, cached.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(31);
        let mut m = random_machine(6, 1, 13);
        let v = random_config(6, &mut rng);

        let der = m.der_log(&v);
        let pars = m.get_parameters();
        let eps = 1e-4;

        for k in 0..m.npar() {
            let mut plus = pars.clone();
            plus[k] += Complex64::from(eps);
            m.set_parameters(&plus).unwrap();
            let valp = m.log_val(&v);

            let mut minus = pars.clone();
            minus[k] -= Complex64::from(eps);
            m.set_parameters(&minus).unwrap();
            let valm = m.log_val(&v);

            let numeric = (valp - valm) / Complex64::from(2.0 * eps);
            assert_relative_eq!(der[k].re, numeric.re, epsilon = 1e-6);
            assert_relative_eq!(der[k].im, numeric.im, epsilon = 1e-6);
        }
        m.set_parameters(&pars).unwrap();
    }

    #[test]
    fn log_val_is_translation_invariant() {
        let graph = Hypercube::new(4, 2, true).unwrap();
        let hilbert = Hilbert::Spin(Spin::new(16, 0.5).unwrap());
        let mut m = RbmSpinSymm::new(&graph, &hilbert, 2, true, true).unwrap();
        m.init_random_pars(77, 0.1).unwrap();

        let mut rng = StdRng::seed_from_u64(41);
        let v = random_config(16, &mut rng);
        let reference = m.log_val(&v);

        for row in graph.symmetry_table().unwrap() {
            let mut translated = DVector::zeros(16);
            for (p, &image) in row.iter().enumerate() {
                translated[image] = v[p];
            }
            let shifted = m.log_val(&translated);
            assert_relative_eq!(shifted.re, reference.re, epsilon = 1e-12);
            assert_relative_eq!(shifted.im, reference.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn state_round_trip_preserves_log_val() {
        let mut rng = StdRng::seed_from_u64(53);
        let m = random_machine(8, 2, 17);

        let json = serde_json::to_string(&m.state()).unwrap();
        let state: RbmSpinSymmState = serde_json::from_str(&json).unwrap();

        let (graph, hilbert) = spin_chain(8);
        let mut restored = RbmSpinSymm::new(&graph, &hilbert, 2, true, true).unwrap();
        restored.load_state(&state).unwrap();

        for _ in 0..20 {
            let v = random_config(8, &mut rng);
            assert_eq!(m.log_val(&v), restored.log_val(&v));
        }
    }

    #[test]
    fn load_state_rejects_mismatches() {
        let m = random_machine(8, 2, 17);
        let mut state = m.state();
        state.name = "RbmSpin".to_string();

        let (graph, hilbert) = spin_chain(8);
        let mut other = RbmSpinSymm::new(&graph, &hilbert, 2, true, true).unwrap();
        assert!(other.load_state(&state).is_err());

        let mut wrong_size = m.state();
        wrong_size.nvisible = 4;
        assert!(other.load_state(&wrong_size).is_err());
    }
}
