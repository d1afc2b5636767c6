//! Elementary parameter-update rules driven by the learning engine.

use nalgebra::DVector;
use num_complex::Complex64;

use crate::error::{Error, Result};

/// A stepper turns a gradient into an in-place parameter update. The
/// learning engine computes the (natural) gradient; the stepper owns the
/// step-size schedule and any per-parameter state.
pub trait Stepper {
    /// Size the internal state for `npar` parameters.
    fn init(&mut self, npar: usize);

    /// Forget accumulated state and restart the schedule.
    fn reset(&mut self);

    fn update(&mut self, grad: &DVector<Complex64>, pars: &mut DVector<Complex64>);
}

/// Plain stochastic gradient descent with optional L2 regularization and a
/// multiplicative learning-rate decay.
pub struct Sgd {
    learning_rate: f64,
    l2_reg: f64,
    decay_factor: f64,
    eta: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64, l2_reg: f64, decay_factor: f64) -> Result<Self> {
        if learning_rate <= 0.0 {
            return Err(Error::config("LearningRate must be positive"));
        }
        if l2_reg < 0.0 {
            return Err(Error::config("L2Reg must be non-negative"));
        }
        if !(0.0..=1.0).contains(&decay_factor) || decay_factor == 0.0 {
            return Err(Error::config("DecayFactor must be in (0, 1]"));
        }
        Ok(Self { learning_rate, l2_reg, decay_factor, eta: learning_rate })
    }
}

impl Stepper for Sgd {
    fn init(&mut self, _npar: usize) {}

    fn reset(&mut self) {
        self.eta = self.learning_rate;
    }

    fn update(&mut self, grad: &DVector<Complex64>, pars: &mut DVector<Complex64>) {
        for (p, g) in pars.iter_mut().zip(grad.iter()) {
            *p -= (g + *p * self.l2_reg) * self.eta;
        }
        self.eta *= self.decay_factor;
    }
}

/// AdaGrad: per-parameter step sizes shrinking with the accumulated squared
/// gradient history.
pub struct AdaGrad {
    learning_rate: f64,
    epscut: f64,
    gt: DVector<f64>,
}

impl AdaGrad {
    pub fn new(learning_rate: f64, epscut: f64) -> Result<Self> {
        if learning_rate <= 0.0 {
            return Err(Error::config("LearningRate must be positive"));
        }
        if epscut <= 0.0 {
            return Err(Error::config("Epscut must be positive"));
        }
        Ok(Self { learning_rate, epscut, gt: DVector::zeros(0) })
    }
}

impl Stepper for AdaGrad {
    fn init(&mut self, npar: usize) {
        self.gt = DVector::zeros(npar);
    }

    fn reset(&mut self) {
        self.gt.fill(0.0);
    }

    fn update(&mut self, grad: &DVector<Complex64>, pars: &mut DVector<Complex64>) {
        for ((p, g), gt) in pars.iter_mut().zip(grad.iter()).zip(self.gt.iter_mut()) {
            *gt += g.norm_sqr();
            *p -= g * (self.learning_rate / (*gt + self.epscut).sqrt());
        }
    }
}

/// Stepper selected at run time from the input file.
pub enum Optimizer {
    Sgd(Sgd),
    AdaGrad(AdaGrad),
}

impl Stepper for Optimizer {
    fn init(&mut self, npar: usize) {
        match self {
            Optimizer::Sgd(s) => s.init(npar),
            Optimizer::AdaGrad(s) => s.init(npar),
        }
    }

    fn reset(&mut self) {
        match self {
            Optimizer::Sgd(s) => s.reset(),
            Optimizer::AdaGrad(s) => s.reset(),
        }
    }

    fn update(&mut self, grad: &DVector<Complex64>, pars: &mut DVector<Complex64>) {
        match self {
            Optimizer::Sgd(s) => s.update(grad, pars),
            Optimizer::AdaGrad(s) => s.update(grad, pars),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sgd_moves_against_the_gradient() {
        let mut sgd = Sgd::new(0.1, 0.0, 1.0).unwrap();
        sgd.init(2);
        let grad = DVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, -2.0)]);
        let mut pars = DVector::from_element(2, Complex64::default());
        sgd.update(&grad, &mut pars);

        assert_relative_eq!(pars[0].re, -0.1, epsilon = 1e-14);
        assert_relative_eq!(pars[1].im, 0.2, epsilon = 1e-14);
    }

    #[test]
    fn sgd_decay_shrinks_the_step() {
        let mut sgd = Sgd::new(0.1, 0.0, 0.5).unwrap();
        sgd.init(1);
        let grad = DVector::from_element(1, Complex64::new(1.0, 0.0));
        let mut pars = DVector::from_element(1, Complex64::default());
        sgd.update(&grad, &mut pars);
        sgd.update(&grad, &mut pars);
        // steps of 0.1 then 0.05
        assert_relative_eq!(pars[0].re, -0.15, epsilon = 1e-14);

        sgd.reset();
        let mut fresh = DVector::from_element(1, Complex64::default());
        sgd.update(&grad, &mut fresh);
        assert_relative_eq!(fresh[0].re, -0.1, epsilon = 1e-14);
    }

    #[test]
    fn adagrad_normalizes_by_gradient_history() {
        let mut ada = AdaGrad::new(0.1, 1e-7).unwrap();
        ada.init(1);
        let grad = DVector::from_element(1, Complex64::new(2.0, 0.0));
        let mut pars = DVector::from_element(1, Complex64::default());
        ada.update(&grad, &mut pars);
        // first step is close to -lr * g / |g|
        assert_relative_eq!(pars[0].re, -0.1, epsilon = 1e-6);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(Sgd::new(0.0, 0.0, 1.0).is_err());
        assert!(Sgd::new(0.1, -1.0, 1.0).is_err());
        assert!(Sgd::new(0.1, 0.0, 0.0).is_err());
        assert!(AdaGrad::new(0.1, 0.0).is_err());
    }
}
