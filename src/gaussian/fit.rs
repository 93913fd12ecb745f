//! Levenberg-Marquardt least-squares fit of the rotated 2D Gaussian
//!
//! Normal equations with Marquardt diagonal scaling, Nielsen damping update.

use nalgebra::SMatrix;

use super::{Gaussian2D, Params, N_PARAMS};
use crate::grid::IntensityGrid;

type Normal = SMatrix<f64, N_PARAMS, N_PARAMS>;

/// Damping level above which the normal equations are declared singular
const MAX_LAMBDA: f64 = 1e16;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FitError {
    #[error("{0} samples are not enough to fit 7 parameters")]
    TooFewSamples(usize),
    #[error("no convergence after {evaluations} evaluations (cost: {cost:e})")]
    NotConverged { evaluations: usize, cost: f64 },
    #[error("singular normal equations")]
    Singular,
    #[error("non-finite residuals")]
    NonFinite,
    #[error("degenerate Gaussian widths: sigma_x={0}, sigma_y={1}")]
    DegenerateWidth(f64, f64),
}
type Result<T> = std::result::Result<T, FitError>;

/// Solver settings
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    max_evaluations: usize,
    ftol: f64,
    xtol: f64,
    gtol: f64,
    lambda: f64,
}
impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 200_000,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            lambda: 1e-3,
        }
    }
}
impl FitOptions {
    /// Maximum number of model evaluations over the whole grid
    pub fn max_evaluations(self, max_evaluations: usize) -> Self {
        Self {
            max_evaluations,
            ..self
        }
    }
    /// Relative cost reduction tolerance
    pub fn ftol(self, ftol: f64) -> Self {
        Self { ftol, ..self }
    }
    /// Relative step size tolerance
    pub fn xtol(self, xtol: f64) -> Self {
        Self { xtol, ..self }
    }
    /// Tolerance on the cosine between the residuals and the Jacobian columns
    pub fn gtol(self, gtol: f64) -> Self {
        Self { gtol, ..self }
    }
    /// Initial damping factor
    pub fn lambda(self, lambda: f64) -> Self {
        Self { lambda, ..self }
    }
}

/// Outcome of a converged fit
#[derive(Debug, Clone, PartialEq)]
pub struct Fitted {
    pub params: Gaussian2D,
    /// sum of squared residuals
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// parameter covariance `s²(JᵀJ)⁻¹`, `s² = cost/(n-7)`
    pub covariance: Option<Normal>,
}
impl Fitted {
    /// Standard errors of the parameters, in the [`Params`] order
    pub fn std_errors(&self) -> Option<Params> {
        self.covariance
            .as_ref()
            .map(|c| c.diagonal().map(|v| v.max(0.).sqrt()))
    }
}

/// Fits the Gaussian to every pixel of the grid
pub fn fit_grid(grid: &IntensityGrid, guess: Gaussian2D, options: &FitOptions) -> Result<Fitted> {
    let samples: Vec<_> = grid.samples().collect();
    fit(&samples, guess, options)
}

/// Fits the Gaussian to the `(x, y, value)` samples starting from `guess`
pub fn fit(samples: &[(f64, f64, f64)], guess: Gaussian2D, options: &FitOptions) -> Result<Fitted> {
    let n = samples.len();
    if n <= N_PARAMS {
        return Err(FitError::TooFewSamples(n));
    }
    let mut params = sanitize(guess);
    let (mut jtj, mut jtr, mut cost) = normal_equations(samples, &params);
    let mut evaluations = 1;
    if !cost.is_finite() {
        return Err(FitError::NonFinite);
    }

    let mut lambda = options.lambda;
    let mut nu = 2f64;
    let mut iterations = 0;
    loop {
        if cost == 0. || gradient_cosine(&jtj, &jtr, cost) <= options.gtol {
            break;
        }
        if evaluations >= options.max_evaluations {
            return Err(FitError::NotConverged { evaluations, cost });
        }
        iterations += 1;

        let mut damped = jtj;
        for k in 0..N_PARAMS {
            damped[(k, k)] += lambda * jtj[(k, k)].max(1e-12);
        }
        let Some(cholesky) = damped.cholesky() else {
            lambda *= nu;
            nu *= 2.;
            if lambda > MAX_LAMBDA {
                return Err(FitError::Singular);
            }
            continue;
        };
        let delta = cholesky.solve(&jtr);
        let p = params.to_params();
        let small_step = delta.norm() <= options.xtol * (p.norm() + options.xtol);

        let trial = Gaussian2D::from(p + delta);
        let trial_cost = cost_of(samples, &trial);
        evaluations += 1;

        let predicted: f64 = (0..N_PARAMS)
            .map(|k| delta[k] * (lambda * jtj[(k, k)].max(1e-12) * delta[k] + jtr[k]))
            .sum();
        let rho = (cost - trial_cost) / predicted;

        if trial_cost.is_finite() && predicted > 0. && rho > 0. {
            let reduction = cost - trial_cost;
            let previous = cost;
            params = trial;
            (jtj, jtr, cost) = normal_equations(samples, &params);
            evaluations += 1;
            lambda *= (1f64 / 3.).max(1. - (2. * rho - 1.).powi(3));
            nu = 2.;
            log::trace!("#{iterations}: cost={cost:e} lambda={lambda:e}");
            if small_step || reduction <= options.ftol * previous {
                break;
            }
        } else {
            if small_step {
                break;
            }
            lambda *= nu;
            nu *= 2.;
            if lambda > MAX_LAMBDA {
                return Err(FitError::Singular);
            }
        }
    }

    let params = Gaussian2D {
        sigma_x: params.sigma_x.abs(),
        sigma_y: params.sigma_y.abs(),
        ..params
    }
    .wrapped();
    if !(params.sigma_x > 0. && params.sigma_y > 0.)
        || !params.sigma_x.is_finite()
        || !params.sigma_y.is_finite()
    {
        return Err(FitError::DegenerateWidth(params.sigma_x, params.sigma_y));
    }
    let covariance = jtj
        .try_inverse()
        .map(|inv| inv * (cost / (n - N_PARAMS) as f64));
    log::debug!(
        "fit converged in {} iterations ({} evaluations): {}",
        iterations,
        evaluations,
        params
    );
    Ok(Fitted {
        params,
        cost,
        iterations,
        evaluations,
        covariance,
    })
}

/// Replaces non-positive or non-finite widths by one pixel
fn sanitize(guess: Gaussian2D) -> Gaussian2D {
    let width = |s: f64| {
        if s.is_finite() && s.abs() > 0. {
            s.abs()
        } else {
            log::debug!("initial width {s} replaced by 1 pixel");
            1.
        }
    };
    Gaussian2D {
        sigma_x: width(guess.sigma_x),
        sigma_y: width(guess.sigma_y),
        ..guess
    }
}

/// Returns `JᵀJ`, `Jᵀr` and `Σr²` with `r = data − model`
fn normal_equations(samples: &[(f64, f64, f64)], params: &Gaussian2D) -> (Normal, Params, f64) {
    let q = params.quadratic();
    let mut jtj = Normal::zeros();
    let mut jtr = Params::zeros();
    let mut cost = 0f64;
    for &(x, y, value) in samples {
        let (model, gradient) = params.gradient_with(&q, x, y);
        let r = value - model;
        jtj.ger(1., &gradient, &gradient, 1.);
        jtr.axpy(r, &gradient, 1.);
        cost += r * r;
    }
    (jtj, jtr, cost)
}

fn cost_of(samples: &[(f64, f64, f64)], params: &Gaussian2D) -> f64 {
    params
        .eval_many(samples.iter().map(|&(x, y, _)| (x, y)))
        .zip(samples)
        .map(|(model, &(_, _, value))| (value - model) * (value - model))
        .sum()
}

/// Largest cosine between the residual vector and a Jacobian column
fn gradient_cosine(jtj: &Normal, jtr: &Params, cost: f64) -> f64 {
    let r_norm = cost.sqrt();
    (0..N_PARAMS)
        .filter(|&k| jtj[(k, k)] > 0.)
        .map(|k| jtr[k].abs() / (jtj[(k, k)].sqrt() * r_norm))
        .fold(0f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaussian::{guess, InitialGuess};
    use std::f64::consts::FRAC_PI_2;

    fn truth() -> Gaussian2D {
        Gaussian2D::new(1000., 50., 50., 10., 6., 0.3, 100.)
    }

    /// Same surface with sigma_x >= sigma_y
    fn canonical(g: Gaussian2D) -> Gaussian2D {
        if g.sigma_x >= g.sigma_y {
            g.wrapped()
        } else {
            Gaussian2D {
                sigma_x: g.sigma_y,
                sigma_y: g.sigma_x,
                theta: g.theta + FRAC_PI_2,
                ..g
            }
            .wrapped()
        }
    }

    fn relative_error(value: f64, expected: f64) -> f64 {
        ((value - expected) / expected).abs()
    }

    #[test]
    fn noise_free_recovery() {
        let grid = truth().surface(100, 100).unwrap();
        let guess = guess::moments(&grid).unwrap();
        let fitted = fit_grid(&grid, guess, &FitOptions::default()).unwrap();
        let p = canonical(fitted.params);
        let t = truth();
        for (name, value, expected) in [
            ("amplitude", p.amplitude, t.amplitude),
            ("center_x", p.center_x, t.center_x),
            ("center_y", p.center_y, t.center_y),
            ("sigma_x", p.sigma_x, t.sigma_x),
            ("sigma_y", p.sigma_y, t.sigma_y),
            ("theta", p.theta, t.theta),
            ("offset", p.offset, t.offset),
        ] {
            assert!(
                relative_error(value, expected) < 1e-2,
                "{name}: {value} vs {expected}"
            );
        }
    }

    #[test]
    fn fitted_surface_residual() {
        let grid = truth().surface(100, 100).unwrap();
        let guess = guess::moments(&grid).unwrap();
        let fitted = fit_grid(&grid, guess, &FitOptions::default()).unwrap();
        let surface = fitted.params.surface(100, 100).unwrap();
        let sse: f64 = surface
            .as_slice()
            .iter()
            .zip(grid.as_slice())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        assert!(sse < 1e-6, "SSE: {sse:e}");
        assert!(fitted.cost < 1e-6, "cost: {:e}", fitted.cost);
    }

    #[test]
    fn idempotent() {
        let grid = truth().surface(80, 90).unwrap();
        let guess = InitialGuess::Moments.estimate(&grid).unwrap();
        let options = FitOptions::default();
        let first = fit_grid(&grid, guess, &options).unwrap();
        let second = fit_grid(&grid, guess, &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn covariance_of_a_noisy_fit() {
        // deterministic pseudo-noise
        let t = truth();
        let grid = IntensityGrid::from_fn(100, 100, |x, y| {
            t.eval(x, y) + 3. * ((x * 12.9898 + y * 78.233).sin() * 43758.5453).fract()
        })
        .unwrap();
        let guess = guess::moments(&grid).unwrap();
        let fitted = fit_grid(&grid, guess, &FitOptions::default()).unwrap();
        let errors = fitted.std_errors().unwrap();
        assert!(errors.iter().all(|e| e.is_finite() && *e > 0.), "{errors}");
        assert!(errors[1] < 0.1, "center_x error: {}", errors[1]);
    }

    #[test]
    fn too_few_samples() {
        let samples = vec![(0., 0., 1.); 7];
        assert_eq!(
            fit(&samples, truth(), &FitOptions::default()).unwrap_err(),
            FitError::TooFewSamples(7)
        );
    }

    #[test]
    fn evaluation_budget() {
        let grid = truth().surface(60, 60).unwrap();
        let guess = Gaussian2D::new(10., 5., 55., 2., 2., 0., 0.);
        let err = fit_grid(&grid, guess, &FitOptions::default().max_evaluations(3)).unwrap_err();
        assert!(
            matches!(err, FitError::NotConverged { evaluations, .. } if evaluations >= 3),
            "{err}"
        );
    }
}
