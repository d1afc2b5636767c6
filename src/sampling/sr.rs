//! Stochastic Reconfiguration ground-state optimizer.
//!
//! Each iteration samples configurations from `|psi|^2`, estimates the local
//! energies and log-derivatives, and takes a natural-gradient step obtained
//! from the covariance matrix of the log-derivatives:
//!
//!   (S + lambda I) dp = b
//!
//! where `S_kk' = <O_k* O_k'> - <O_k>* <O_k'>`, `b_k = <O_k* E_loc> -
//! <O_k>* <E_loc>` and `O_k = d ln psi / d theta_k`. The system is solved
//! either directly (rank-thresholded SVD of the explicitly reduced S) or by
//! a matrix-free conjugate gradient that only ever applies `S x`. With
//! `Method = "Gd"` the plain energy gradient is used instead.

use std::path::PathBuf;

use log::{error, info};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::hamiltonian::Operator;
use crate::io::LogWriter;
use crate::machine::Machine;
use crate::optimizer::Stepper;
use crate::parallel::Transport;
use crate::sampling::MetropolisLocal;
use crate::stats::ObsManager;

/// Settings of the learning loop, with the defaults of the input schema.
#[derive(Clone, Debug)]
pub struct SrOptions {
    /// Total configurations per iteration, across all ranks.
    pub nsamples: usize,
    /// Number of optimization iterations.
    pub niter_opt: usize,
    /// Base path for the `.log` and `.wf` output files.
    pub output_file: Option<String>,
    /// Checkpoint period, in iterations.
    pub save_every: usize,
    /// Natural-gradient update when true, plain gradient descent otherwise.
    pub use_sr: bool,
    /// Diagonal shift lambda added to S.
    pub diag_shift: f64,
    /// Normalize the step by `sqrt(dp^H S dp)`.
    pub rescale_shift: bool,
    /// Solve with the matrix-free conjugate gradient instead of the SVD.
    pub use_iterative: bool,
    /// Relative residual target of the conjugate gradient.
    pub cg_tolerance: f64,
    /// Iteration cap of the conjugate gradient.
    pub cg_max_iter: usize,
    /// Singular-value cutoff of the direct solver.
    pub svd_threshold: f64,
}

impl Default for SrOptions {
    fn default() -> Self {
        Self {
            nsamples: 1000,
            niter_opt: 100,
            output_file: None,
            save_every: 100,
            use_sr: true,
            diag_shift: 0.01,
            rescale_shift: false,
            use_iterative: false,
            cg_tolerance: 1e-3,
            cg_max_iter: 1000,
            svd_threshold: 1e-6,
        }
    }
}

impl SrOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nsamples(mut self, n: usize) -> Self {
        self.nsamples = n;
        self
    }

    pub fn with_niter_opt(mut self, n: usize) -> Self {
        self.niter_opt = n;
        self
    }

    pub fn with_output_file(mut self, base: impl Into<String>) -> Self {
        self.output_file = Some(base.into());
        self
    }

    pub fn with_diag_shift(mut self, shift: f64) -> Self {
        self.diag_shift = shift;
        self
    }

    pub fn with_gradient_descent(mut self) -> Self {
        self.use_sr = false;
        self
    }

    pub fn with_iterative_solver(mut self, iterative: bool) -> Self {
        self.use_iterative = iterative;
        self
    }

    pub fn with_rescale_shift(mut self, rescale: bool) -> Self {
        self.rescale_shift = rescale;
        self
    }
}

/// Per-iteration history of the optimization, for callers that want the
/// trace beyond the `.log` file.
#[derive(Clone, Debug)]
pub struct SrResult {
    pub energy_history: Vec<f64>,
    pub variance_history: Vec<f64>,
    pub acceptance_history: Vec<f64>,
    pub final_parameters: DVector<Complex64>,
}

/// The learning engine tying sampler, Hamiltonian and stepper together.
pub struct Sr<Op, M, St, T>
where
    Op: Operator,
    M: Machine,
    St: Stepper,
    T: Transport,
{
    ham: Op,
    sampler: MetropolisLocal<M>,
    opt: St,
    transport: T,
    opts: SrOptions,

    npar: usize,
    obs: ObsManager,
    iter0: usize,

    vsamp: DMatrix<f64>,
    elocs: DVector<Complex64>,
    ok: DMatrix<Complex64>,
    grad: DVector<Complex64>,

    writer: Option<LogWriter>,
    wf_path: Option<PathBuf>,

    // reusable find_conn buffers
    mel: Vec<Complex64>,
    connectors: Vec<Vec<usize>>,
    newconfs: Vec<Vec<f64>>,
}

impl<Op, M, St, T> Sr<Op, M, St, T>
where
    Op: Operator,
    M: Machine,
    St: Stepper,
    T: Transport,
{
    pub fn new(
        ham: Op,
        sampler: MetropolisLocal<M>,
        mut opt: St,
        transport: T,
        opts: SrOptions,
    ) -> Result<Self> {
        if opts.nsamples < transport.size() {
            return Err(Error::config(format!(
                "Nsamples = {} is smaller than the number of ranks ({})",
                opts.nsamples,
                transport.size()
            )));
        }
        if opts.diag_shift < 0.0 {
            return Err(Error::config("DiagShift must be non-negative"));
        }

        let npar = sampler.psi().npar();
        opt.init(npar);

        let mut obs = ObsManager::new();
        obs.add("Energy");
        obs.add("EnergyVariance");
        obs.add("Acceptance");

        let (writer, wf_path) = match (&opts.output_file, transport.rank()) {
            (Some(base), 0) => (
                Some(LogWriter::create(format!("{base}.log"))?),
                Some(PathBuf::from(format!("{base}.wf"))),
            ),
            _ => (None, None),
        };

        if transport.rank() == 0 {
            println!("# Learning running on {} process(es)", transport.size());
            if opts.use_sr {
                println!("# Using the stochastic reconfiguration method");
                if opts.use_iterative {
                    println!("# With iterative solver");
                }
            } else {
                println!("# Using a gradient-descent based method");
            }
        }
        transport.barrier();

        Ok(Self {
            ham,
            sampler,
            opt,
            transport,
            opts,
            npar,
            obs,
            iter0: 0,
            vsamp: DMatrix::zeros(0, 0),
            elocs: DVector::zeros(0),
            ok: DMatrix::zeros(0, 0),
            grad: DVector::zeros(npar),
            writer,
            wf_path,
            mel: Vec::new(),
            connectors: Vec::new(),
            newconfs: Vec::new(),
        })
    }

    /// Run the full optimization and return the per-iteration trace.
    pub fn run(&mut self) -> Result<SrResult> {
        self.opt.reset();

        let niter = self.opts.niter_opt;
        let mut result = SrResult {
            energy_history: Vec::with_capacity(niter),
            variance_history: Vec::with_capacity(niter),
            acceptance_history: Vec::with_capacity(niter),
            final_parameters: DVector::zeros(self.npar),
        };

        for i in 0..niter {
            self.sample();
            self.gradient();
            self.update_parameters()?;
            let record = self.print_output(i)?;

            let energy = record["Energy"]["Mean"].as_f64().unwrap_or(f64::NAN);
            let variance = record["EnergyVariance"]["Mean"].as_f64().unwrap_or(f64::NAN);
            result.energy_history.push(energy);
            result.variance_history.push(variance);
            result.acceptance_history.push(self.sampler.acceptance());

            info!(
                "iteration {:4}: energy = {:.6}, variance = {:.6}, acceptance = {:.3}",
                self.iter0 + i,
                energy,
                variance,
                self.sampler.acceptance()
            );
        }
        self.iter0 += niter;

        if self.transport.rank() == 0 {
            if let Some(path) = &self.wf_path {
                self.sampler.psi().save(path)?;
            }
        }
        self.transport.barrier();

        result.final_parameters = self.sampler.psi().get_parameters();
        Ok(result)
    }

    pub fn sampler(&self) -> &MetropolisLocal<M> {
        &self.sampler
    }

    /// Fill the per-rank sample buffer with `ceil(Nsamples / nranks)` sweeps.
    fn sample(&mut self) {
        self.sampler.reset(false);

        let nranks = self.transport.size();
        let nlocal = (self.opts.nsamples + nranks - 1) / nranks;
        let nv = self.sampler.psi().nvisible();
        self.vsamp = DMatrix::zeros(nlocal, nv);

        for i in 0..nlocal {
            self.sampler.sweep();
            self.vsamp.row_mut(i).tr_copy_from(self.sampler.visible());
        }
    }

    /// Local energy `sum_k mel_k psi(v'_k) / psi(v)` of one configuration.
    fn local_value(&mut self, v: &DVector<f64>) -> Complex64 {
        self.ham
            .find_conn(v, &mut self.mel, &mut self.connectors, &mut self.newconfs);
        let lvd = self.sampler.psi().log_val_diff(v, &self.connectors, &self.newconfs);

        let mut value = Complex64::default();
        for (m, d) in self.mel.iter().zip(lvd.iter()) {
            value += m * d.exp();
        }
        value
    }

    /// Estimate the energy gradient from the current sample buffer and feed
    /// the observables.
    fn gradient(&mut self) {
        self.obs.reset("Energy");
        self.obs.reset("EnergyVariance");
        self.obs.reset("Acceptance");

        let nsamp = self.vsamp.nrows();
        let nranks = self.transport.size();
        self.elocs = DVector::zeros(nsamp);
        self.ok = DMatrix::zeros(nsamp, self.npar);

        for i in 0..nsamp {
            let v: DVector<f64> = self.vsamp.row(i).transpose();
            let eloc = self.local_value(&v);
            self.elocs[i] = eloc;
            self.obs.push("Energy", eloc.re);

            let der = self.sampler.psi().der_log(&v);
            self.ok.row_mut(i).tr_copy_from(&der);
        }

        let mut elocmean = self.elocs.sum() / nsamp as f64;
        elocmean = self.transport.sum_c64(elocmean) / nranks as f64;

        let mut okmean: DVector<Complex64> = self.ok.row_mean().transpose();
        self.transport.sum_vector(&mut okmean);
        okmean.unscale_mut(nranks as f64);

        let okmean_row = okmean.transpose();
        for i in 0..nsamp {
            let mut row = self.ok.row_mut(i);
            row -= &okmean_row;
        }
        self.elocs.add_scalar_mut(-elocmean);

        for e in self.elocs.iter() {
            self.obs.push("EnergyVariance", e.norm_sqr());
        }

        self.grad = self.ok.ad_mul(&self.elocs) * Complex64::from(2.0);
        self.transport.sum_vector(&mut self.grad);
        self.grad.unscale_mut((nranks * nsamp) as f64);
    }

    /// One parameter update. Solver failures and non-finite gradients skip
    /// the step; the parameters keep their previous values.
    fn update_parameters(&mut self) -> Result<()> {
        if self.opts.use_sr {
            let nsamp = self.vsamp.nrows();
            let nranks = self.transport.size();
            let scale = 1.0 / (nranks * nsamp) as f64;

            let mut b = self.ok.ad_mul(&self.elocs);
            self.transport.sum_vector(&mut b);
            b.unscale_mut((nranks * nsamp) as f64);

            let deltap = if self.opts.use_iterative {
                let dp = self.solve_iterative(&b, scale);
                self.transport.barrier();
                dp
            } else {
                self.solve_direct(&b, scale)
            };

            match deltap {
                Ok(dp) => self.grad = dp,
                Err(err) => {
                    error!("parameter update skipped: {err}");
                    return Ok(());
                }
            }
        }

        if self.grad.iter().any(|g| !g.re.is_finite() || !g.im.is_finite()) {
            error!("parameter update skipped: non-finite gradient");
            return Ok(());
        }

        let mut pars = self.sampler.psi().get_parameters();
        self.opt.update(&self.grad, &mut pars);
        self.transport.broadcast_vector(&mut pars);
        self.sampler.psi_mut().set_parameters(&pars)?;
        self.transport.barrier();
        Ok(())
    }

    /// Explicitly reduce S and solve through its SVD with a rank threshold.
    fn solve_direct(&self, b: &DVector<Complex64>, scale: f64) -> Result<DVector<Complex64>> {
        let mut s = self.ok.ad_mul(&self.ok);
        self.transport.sum_matrix(&mut s);
        s.scale_mut(scale);
        for i in 0..self.npar {
            s[(i, i)] += Complex64::from(self.opts.diag_shift);
        }

        let deltap = s
            .clone()
            .svd(true, true)
            .solve(b, self.opts.svd_threshold)
            .map_err(Error::numerics)?;

        if self.opts.rescale_shift {
            let nor = deltap.dotc(&(&s * &deltap)).re;
            if nor <= 0.0 || !nor.is_finite() {
                return Err(Error::numerics("step rescaling produced a non-positive norm"));
            }
            return Ok(deltap.unscale(nor.sqrt()));
        }
        Ok(deltap)
    }

    /// Solve through the matrix-free conjugate gradient; S is only ever
    /// applied, never materialized.
    fn solve_iterative(&self, b: &DVector<Complex64>, scale: f64) -> Result<DVector<Complex64>> {
        let op = SrOperator {
            ok: &self.ok,
            shift: self.opts.diag_shift,
            scale,
            transport: &self.transport,
        };
        let deltap = conjugate_gradient(&op, b, self.opts.cg_tolerance, self.opts.cg_max_iter)?;

        if self.opts.rescale_shift {
            let nor = deltap.dotc(&op.multiply(&deltap)).re;
            if nor <= 0.0 || !nor.is_finite() {
                return Err(Error::numerics("step rescaling produced a non-positive norm"));
            }
            return Ok(deltap.unscale(nor.sqrt()));
        }
        Ok(deltap)
    }

    /// Reduce the iteration's observables into the log record.
    fn print_output(&mut self, i: usize) -> Result<serde_json::Map<String, Value>> {
        self.obs.push("Acceptance", self.sampler.acceptance());

        let mut record = self.obs.snapshot(&self.transport);
        record.insert("Iteration".to_string(), json!(self.iter0 + i));

        if self.transport.rank() == 0 {
            if let Some(writer) = &mut self.writer {
                writer.append(Value::Object(record.clone()))?;
            }
            if let Some(path) = &self.wf_path {
                if self.opts.save_every > 0 && i % self.opts.save_every == 0 {
                    self.sampler.psi().save(path)?;
                }
            }
        }
        self.transport.barrier();
        Ok(record)
    }
}

/// The SR matrix as an implicit operator: `S x = scale * Ok^H (Ok x) +
/// shift * x`, with the parameter-space product reduced across ranks so
/// every rank sees the same Krylov vectors.
struct SrOperator<'a, T: Transport> {
    ok: &'a DMatrix<Complex64>,
    shift: f64,
    scale: f64,
    transport: &'a T,
}

impl<T: Transport> SrOperator<'_, T> {
    fn multiply(&self, x: &DVector<Complex64>) -> DVector<Complex64> {
        let y = self.ok * x;
        let mut z = self.ok.ad_mul(&y);
        self.transport.sum_vector(&mut z);
        z *= Complex64::from(self.scale);
        z + x * Complex64::from(self.shift)
    }
}

/// Conjugate gradient for the Hermitian positive-definite system `S x = b`
/// with identity preconditioner; converges when the residual drops below
/// `tol * |b|`.
fn conjugate_gradient<T: Transport>(
    op: &SrOperator<'_, T>,
    b: &DVector<Complex64>,
    tol: f64,
    max_iter: usize,
) -> Result<DVector<Complex64>> {
    let mut x: DVector<Complex64> = DVector::zeros(b.len());
    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Ok(x);
    }

    let mut r = b.clone();
    let mut p = r.clone();
    let mut rs_old = r.norm_squared();
    let one = Complex64::from(1.0);

    for _ in 0..max_iter {
        if rs_old.sqrt() <= tol * b_norm {
            return Ok(x);
        }

        let ap = op.multiply(&p);
        let denom = p.dotc(&ap).re;
        if denom <= 0.0 || !denom.is_finite() {
            return Err(Error::numerics("conjugate gradient hit a non-positive curvature"));
        }
        let alpha = rs_old / denom;

        x.axpy(Complex64::from(alpha), &p, one);
        r.axpy(Complex64::from(-alpha), &ap, one);

        let rs_new = r.norm_squared();
        p *= Complex64::from(rs_new / rs_old);
        p += &r;
        rs_old = rs_new;
    }
    Err(Error::numerics(format!(
        "conjugate gradient did not converge within {max_iter} iterations"
    )))
}
