//! Per-iteration observable accumulation.
//!
//! The learning loop pushes one value per Monte Carlo sample into named
//! accumulators; at the end of an iteration a snapshot reduces them across
//! ranks into `{Mean, Sigma, Taucorr}` records. Sigma is the error of the
//! mean from the blocking method, with the block length set by the estimated
//! autocorrelation time.

use serde_json::{json, Map, Value};
use statrs::statistics::Statistics;

use crate::parallel::Transport;

/// Named sample accumulators for one learning iteration.
#[derive(Debug, Default)]
pub struct ObsManager {
    series: Vec<(String, Vec<f64>)>,
}

impl ObsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observable; re-adding an existing name is a no-op.
    pub fn add(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.series.iter().any(|(n, _)| *n == name) {
            self.series.push((name, Vec::new()));
        }
    }

    /// Drop all samples of one observable.
    pub fn reset(&mut self, name: &str) {
        if let Some((_, samples)) = self.series.iter_mut().find(|(n, _)| n == name) {
            samples.clear();
        }
    }

    pub fn push(&mut self, name: &str, value: f64) {
        if let Some((_, samples)) = self.series.iter_mut().find(|(n, _)| n == name) {
            samples.push(value);
        }
    }

    /// Reduce every observable across ranks into a JSON map, in registration
    /// order. Ranks hold equally many samples, so the global mean is the
    /// rank-average of local means; errors of independent chains combine in
    /// quadrature.
    pub fn snapshot<T: Transport>(&self, transport: &T) -> Map<String, Value> {
        let nranks = transport.size() as f64;
        let mut out = Map::new();
        for (name, samples) in &self.series {
            let mean = transport.sum_f64(samples.mean()) / nranks;
            let tau = transport.sum_f64(autocorrelation_time(samples)) / nranks;
            let sigma_local = blocking_error(samples, tau);
            let sigma = transport.sum_f64(sigma_local * sigma_local).sqrt() / nranks;
            out.insert(
                name.clone(),
                json!({ "Mean": mean, "Sigma": sigma, "Taucorr": tau }),
            );
        }
        out
    }
}

/// Integrated autocorrelation time from the initial positive sequence of the
/// normalized autocorrelation function.
fn autocorrelation_time(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return 1.0;
    }
    let mean = samples.mean();
    let var = samples.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if var == 0.0 {
        return 1.0;
    }

    let mut tau = 1.0;
    for t in 1..n / 2 {
        let auto_t: f64 = samples[..n - t]
            .iter()
            .zip(samples[t..].iter())
            .map(|(&x, &y)| (x - mean) * (y - mean))
            .sum::<f64>()
            / ((n - t) as f64 * var);
        if auto_t < 0.0 {
            break;
        }
        tau += 2.0 * auto_t;
    }
    tau
}

/// Error of the mean from non-overlapping blocks of length `2 tau`.
fn blocking_error(samples: &[f64], tau: f64) -> f64 {
    let block_size = (2.0 * tau).ceil().max(1.0) as usize;
    let n_blocks = samples.len() / block_size;
    if n_blocks < 2 {
        return 0.0;
    }

    let block_means: Vec<f64> = (0..n_blocks)
        .map(|i| samples[i * block_size..(i + 1) * block_size].mean())
        .collect();

    let mean = block_means.iter().sum::<f64>() / n_blocks as f64;
    let variance = block_means.iter().map(|&x| (x - mean).powi(2)).sum::<f64>()
        / (n_blocks - 1) as f64;
    (variance / n_blocks as f64).sqrt()
}
