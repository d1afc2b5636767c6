//! Metropolis sampling with local single-site moves.

use log::info;
use nalgebra::DVector;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};

use crate::error::{Error, Result};
use crate::hilbert::Hilbert;
use crate::machine::{Lookup, Machine};
use crate::parallel::Transport;

/// Markov chain over configurations distributed as `|psi(v)|^2`.
///
/// Each sweep proposes one single-site change per site: a site is drawn
/// uniformly, a different local value is drawn uniformly, and the move is
/// accepted with probability `min(1, |psi(v')/psi(v)|^2)`. The amplitude
/// ratio comes from the machine's lookup-based difference, so a proposal
/// costs O(hidden units touched by one site) rather than a full evaluation.
pub struct MetropolisLocal<M: Machine> {
    psi: M,
    hilbert: Hilbert,
    nv: usize,
    localstates: Vec<f64>,
    rng: StdRng,
    v: DVector<f64>,
    lt: Lookup,
    accept: f64,
    moves: f64,
}

impl<M: Machine> MetropolisLocal<M> {
    /// Build the chain and seed its generator.
    ///
    /// Rank 0 produces one seed per rank (from the OS entropy source, or
    /// derived from `base_seed` for reproducible runs) and scatters them, so
    /// chains on different ranks are independent.
    pub fn new<T: Transport>(
        psi: M,
        hilbert: Hilbert,
        transport: &T,
        base_seed: Option<u64>,
    ) -> Result<Self> {
        if !hilbert.is_discrete() {
            return Err(Error::config(
                "the local Metropolis sampler works only for discrete Hilbert spaces",
            ));
        }
        if hilbert.local_size() < 2 {
            return Err(Error::config("the local alphabet must have at least two states"));
        }
        if psi.nvisible() != hilbert.size() {
            return Err(Error::config(format!(
                "machine has {} visible units but the Hilbert space has {} sites",
                psi.nvisible(),
                hilbert.size()
            )));
        }

        let seeds: Vec<u64> = if transport.rank() == 0 {
            (0..transport.size())
                .map(|i| match base_seed {
                    Some(base) => base.wrapping_add(i as u64),
                    None => OsRng.next_u64(),
                })
                .collect()
        } else {
            Vec::new()
        };
        let rng = StdRng::seed_from_u64(transport.scatter_u64(&seeds));

        let nv = hilbert.size();
        let localstates = hilbert.local_states().to_vec();
        let mut sampler = Self {
            psi,
            hilbert,
            nv,
            localstates,
            rng,
            v: DVector::zeros(nv),
            lt: Lookup::default(),
            accept: 0.0,
            moves: 0.0,
        };
        sampler.reset(true);

        if transport.rank() == 0 {
            info!("local Metropolis sampler ready on {} sites", nv);
        }
        Ok(sampler)
    }

    /// Restart the chain: optionally draw a fresh configuration, always
    /// rebuild the lookup and zero the acceptance counters.
    pub fn reset(&mut self, init_random: bool) {
        if init_random {
            self.hilbert.random_vals(&mut self.v, &mut self.rng);
        }
        self.psi.init_lookup(&self.v, &mut self.lt);
        self.accept = 0.0;
        self.moves = 0.0;
    }

    /// One Metropolis sweep: `nv` single-site proposals.
    pub fn sweep(&mut self) {
        for _ in 0..self.nv {
            let site = self.rng.gen_range(0..self.nv);

            let mut newval = self.localstates[self.rng.gen_range(0..self.localstates.len())];
            while (newval - self.v[site]).abs() <= f64::EPSILON {
                newval = self.localstates[self.rng.gen_range(0..self.localstates.len())];
            }

            let tochange = [site];
            let newconf = [newval];
            let lvd = self.psi.log_val_diff_lookup(&self.v, &tochange, &newconf, &self.lt);
            let ratio = (2.0 * lvd.re).exp();

            #[cfg(debug_assertions)]
            self.check_lookup();

            if ratio > self.rng.gen::<f64>() {
                self.accept += 1.0;

                #[cfg(debug_assertions)]
                let logval_before = self.psi.log_val(&self.v);

                self.psi.update_lookup(&self.v, &tochange, &newconf, &mut self.lt);
                self.hilbert.update_conf(&mut self.v, &tochange, &newconf);

                #[cfg(debug_assertions)]
                self.check_accepted_move(logval_before, lvd);
            }
            self.moves += 1.0;
        }
    }

    pub fn visible(&self) -> &DVector<f64> {
        &self.v
    }

    pub fn set_visible(&mut self, v: DVector<f64>) {
        self.v = v;
        self.psi.init_lookup(&self.v, &mut self.lt);
    }

    /// Fraction of accepted moves since the last reset.
    pub fn acceptance(&self) -> f64 {
        if self.moves == 0.0 {
            0.0
        } else {
            self.accept / self.moves
        }
    }

    pub fn psi(&self) -> &M {
        &self.psi
    }

    pub fn psi_mut(&mut self) -> &mut M {
        &mut self.psi
    }

    pub fn hilbert(&self) -> &Hilbert {
        &self.hilbert
    }

    #[cfg(debug_assertions)]
    fn check_lookup(&self) {
        let direct = self.psi.log_val(&self.v);
        let cached = self.psi.log_val_lookup(&self.v, &self.lt);
        if ((direct - cached).exp() - 1.0).norm() > 1e-8 {
            panic!("lookup out of sync: log_val = {direct}, lookup log_val = {cached}");
        }
    }

    #[cfg(debug_assertions)]
    fn check_accepted_move(&self, logval_before: num_complex::Complex64, lvd: num_complex::Complex64) {
        let logval_after = self.psi.log_val(&self.v);
        if ((logval_after - logval_before - lvd).exp() - 1.0).norm() > 1e-8 {
            panic!(
                "incremental difference {} does not match recomputed {}",
                lvd,
                logval_after - logval_before
            );
        }
    }
}
