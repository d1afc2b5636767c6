//! Discrete Hilbert spaces: local alphabets and configuration generation.
//!
//! Local quantum numbers are stored as `f64` entries of a configuration
//! vector, but every space here is discrete: for spin `S` the admissible
//! values are the integers `-2S, -2S+2, ..., 2S`, for bosons the occupations
//! `0..=Nmax`, for qubits `{0, 1}`.

use nalgebra::DVector;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

/// Spin-`S` chain of `nspins` sites, optionally constrained to a fixed total
/// magnetization along z.
#[derive(Clone, Debug)]
pub struct Spin {
    s: f64,
    nspins: usize,
    total_sz: Option<f64>,
    local: Vec<f64>,
}

impl Spin {
    pub fn new(nspins: usize, s: f64) -> Result<Self> {
        if s <= 0.0 {
            return Err(Error::config("spin S must be positive"));
        }
        if (2.0 * s).fract() != 0.0 {
            return Err(Error::config("spin S must be integer or half-integer"));
        }
        let nstates = (2.0 * s) as usize + 1;
        let local = (0..nstates).map(|i| -2.0 * s + 2.0 * i as f64).collect();
        Ok(Self { s, nspins, total_sz: None, local })
    }

    /// Restrict sampling to configurations with `sum(v) = 2 * total_sz`.
    pub fn with_total_sz(mut self, total_sz: f64) -> Result<Self> {
        let raises = self.s * self.nspins as f64 + total_sz;
        if raises.fract() != 0.0 || raises < 0.0 || raises > 2.0 * self.s * self.nspins as f64 {
            return Err(Error::config(format!(
                "cannot fix total Sz = {} with {} spins of S = {}",
                total_sz, self.nspins, self.s
            )));
        }
        self.total_sz = Some(total_sz);
        Ok(self)
    }

    fn random_vals(&self, v: &mut DVector<f64>, rng: &mut impl Rng) {
        debug_assert_eq!(v.len(), self.nspins);

        let Some(total_sz) = self.total_sz else {
            for x in v.iter_mut() {
                *x = self.local[rng.gen_range(0..self.local.len())];
            }
            return;
        };

        if self.s == 0.5 {
            let nup = (self.nspins as f64 / 2.0 + total_sz) as usize;
            let mut vals = vec![1.0; nup];
            vals.resize(self.nspins, -1.0);
            vals.shuffle(rng);
            for (x, val) in v.iter_mut().zip(vals) {
                *x = val;
            }
            return;
        }

        // General spin: raise random unsaturated sites one step at a time
        // until the magnetization target is met.
        v.fill(-2.0 * self.s);
        let mut pool: Vec<usize> = (0..self.nspins).collect();
        let raises = (self.s * self.nspins as f64 + total_sz) as usize;
        for _ in 0..raises {
            let k = rng.gen_range(0..pool.len());
            let site = pool[k];
            v[site] += 2.0;
            if v[site] > 2.0 * self.s - 1.0 {
                pool.swap_remove(k);
            }
        }
    }
}

/// Bosonic occupations `0..=nmax` on `nsites` sites, optionally with a fixed
/// total particle number.
#[derive(Clone, Debug)]
pub struct Boson {
    nsites: usize,
    nmax: usize,
    total_n: Option<usize>,
    local: Vec<f64>,
}

impl Boson {
    pub fn new(nsites: usize, nmax: usize) -> Result<Self> {
        if nmax < 1 {
            return Err(Error::config("boson Nmax must be at least 1"));
        }
        let local = (0..=nmax).map(|n| n as f64).collect();
        Ok(Self { nsites, nmax, total_n: None, local })
    }

    pub fn with_total_n(mut self, total_n: usize) -> Result<Self> {
        if total_n > self.nmax * self.nsites {
            return Err(Error::config(format!(
                "cannot place {} bosons on {} sites with Nmax = {}",
                total_n, self.nsites, self.nmax
            )));
        }
        self.total_n = Some(total_n);
        Ok(self)
    }

    fn random_vals(&self, v: &mut DVector<f64>, rng: &mut impl Rng) {
        debug_assert_eq!(v.len(), self.nsites);

        let Some(total_n) = self.total_n else {
            for x in v.iter_mut() {
                *x = self.local[rng.gen_range(0..self.local.len())];
            }
            return;
        };

        v.fill(0.0);
        let mut pool: Vec<usize> = (0..self.nsites).collect();
        for _ in 0..total_n {
            let k = rng.gen_range(0..pool.len());
            let site = pool[k];
            v[site] += 1.0;
            if v[site] as usize >= self.nmax {
                pool.swap_remove(k);
            }
        }
    }
}

/// Qubit register with local states `{0, 1}`.
#[derive(Clone, Debug)]
pub struct Qubit {
    nqubits: usize,
    local: Vec<f64>,
}

impl Qubit {
    pub fn new(nqubits: usize) -> Self {
        Self { nqubits, local: vec![0.0, 1.0] }
    }
}

/// A discrete Hilbert space selected at run time.
#[derive(Clone, Debug)]
pub enum Hilbert {
    Spin(Spin),
    Boson(Boson),
    Qubit(Qubit),
}

impl Hilbert {
    /// Every space in this crate is discrete; samplers check this before
    /// relying on the finite alphabet.
    pub fn is_discrete(&self) -> bool {
        true
    }

    /// Number of sites.
    pub fn size(&self) -> usize {
        match self {
            Hilbert::Spin(h) => h.nspins,
            Hilbert::Boson(h) => h.nsites,
            Hilbert::Qubit(h) => h.nqubits,
        }
    }

    /// Size of the local alphabet.
    pub fn local_size(&self) -> usize {
        self.local_states().len()
    }

    /// Admissible local quantum numbers, in increasing order.
    pub fn local_states(&self) -> &[f64] {
        match self {
            Hilbert::Spin(h) => &h.local,
            Hilbert::Boson(h) => &h.local,
            Hilbert::Qubit(h) => &h.local,
        }
    }

    /// Fill `v` with a valid configuration, honoring any conserved quantity.
    pub fn random_vals(&self, v: &mut DVector<f64>, rng: &mut impl Rng) {
        match self {
            Hilbert::Spin(h) => h.random_vals(v, rng),
            Hilbert::Boson(h) => h.random_vals(v, rng),
            Hilbert::Qubit(h) => {
                for x in v.iter_mut() {
                    *x = h.local[rng.gen_range(0..h.local.len())];
                }
            }
        }
    }

    /// Write `newconf[k]` into `v[tochange[k]]`, in place.
    pub fn update_conf(&self, v: &mut DVector<f64>, tochange: &[usize], newconf: &[f64]) {
        debug_assert_eq!(tochange.len(), newconf.len());
        for (&site, &val) in tochange.iter().zip(newconf.iter()) {
            v[site] = val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn spin_half_alphabet() {
        let h = Hilbert::Spin(Spin::new(8, 0.5).unwrap());
        assert_eq!(h.local_states(), &[-1.0, 1.0]);
        assert_eq!(h.local_size(), 2);
        assert_eq!(h.size(), 8);
    }

    #[test]
    fn spin_three_halves_alphabet() {
        let h = Spin::new(4, 1.5).unwrap();
        assert_eq!(h.local, vec![-3.0, -1.0, 1.0, 3.0]);
    }

    #[test]
    fn invalid_spin_rejected() {
        assert!(Spin::new(4, 0.0).is_err());
        assert!(Spin::new(4, 0.7).is_err());
    }

    #[test]
    fn constrained_spin_half_hits_target() {
        let h = Hilbert::Spin(Spin::new(16, 0.5).unwrap().with_total_sz(2.0).unwrap());
        let mut rng = StdRng::seed_from_u64(7);
        let mut v = DVector::zeros(16);
        for _ in 0..20 {
            h.random_vals(&mut v, &mut rng);
            assert_eq!(v.sum(), 4.0);
            assert!(v.iter().all(|&x| x == 1.0 || x == -1.0));
        }
    }

    #[test]
    fn constrained_general_spin_hits_target() {
        let h = Hilbert::Spin(Spin::new(6, 1.0).unwrap().with_total_sz(1.0).unwrap());
        let mut rng = StdRng::seed_from_u64(3);
        let mut v = DVector::zeros(6);
        for _ in 0..20 {
            h.random_vals(&mut v, &mut rng);
            assert_eq!(v.sum(), 2.0);
            assert!(v.iter().all(|&x| x == -2.0 || x == 0.0 || x == 2.0));
        }
    }

    #[test]
    fn infeasible_constraint_rejected() {
        assert!(Spin::new(4, 0.5).unwrap().with_total_sz(3.0).is_err());
        assert!(Spin::new(3, 0.5).unwrap().with_total_sz(0.0).is_err());
        assert!(Boson::new(3, 2).unwrap().with_total_n(7).is_err());
    }

    #[test]
    fn constrained_bosons_hit_target() {
        let h = Hilbert::Boson(Boson::new(5, 3).unwrap().with_total_n(8).unwrap());
        let mut rng = StdRng::seed_from_u64(11);
        let mut v = DVector::zeros(5);
        for _ in 0..20 {
            h.random_vals(&mut v, &mut rng);
            assert_eq!(v.sum(), 8.0);
            assert!(v.iter().all(|&x| (0.0..=3.0).contains(&x)));
        }
    }

    #[test]
    fn update_conf_writes_in_place() {
        let h = Hilbert::Qubit(Qubit::new(4));
        let mut v = DVector::from_vec(vec![0.0, 0.0, 1.0, 1.0]);
        h.update_conf(&mut v, &[1, 3], &[1.0, 0.0]);
        assert_eq!(v.as_slice(), &[0.0, 1.0, 1.0, 0.0]);
    }
}
