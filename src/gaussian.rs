//! Rotated 2D Gaussian surface
//!
//! ```text
//! a = cos²θ/(2σx²) + sin²θ/(2σy²)
//! b = −sin(2θ)/(4σx²) + sin(2θ)/(4σy²)
//! c = sin²θ/(2σx²) + cos²θ/(2σy²)
//! f(x,y) = offset + amplitude·exp(−(a(x−x₀)² + 2b(x−x₀)(y−y₀) + c(y−y₀)²))
//! ```
//! σx and σy are the widths along the model axes before the rotation mixing.

use std::{f64::consts::FRAC_PI_2, f64::consts::PI, fmt};

use nalgebra::SVector;

use crate::grid::{GridError, IntensityGrid};

pub mod fit;
pub mod guess;
pub use fit::{fit, fit_grid, FitError, FitOptions, Fitted};
pub use guess::{moments, GuessError, InitialGuess};

/// Number of model parameters
pub const N_PARAMS: usize = 7;
/// Model parameters as a vector: (amplitude, center_x, center_y, sigma_x, sigma_y, theta, offset)
pub type Params = SVector<f64, N_PARAMS>;

/// Rotated 2D Gaussian model parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian2D {
    pub amplitude: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    /// rotation angle [rd]
    pub theta: f64,
    pub offset: f64,
}

/// Quadratic form coefficients of the exponent
#[derive(Debug, Clone, Copy)]
struct Quadratic {
    a: f64,
    b: f64,
    c: f64,
}

impl Gaussian2D {
    /// Empirical starting point for a fixed imaging setup
    pub const EMPIRICAL: Gaussian2D = Gaussian2D {
        amplitude: 2000.,
        center_x: 150.,
        center_y: 140.,
        sigma_x: 15.,
        sigma_y: 15.,
        theta: 0.,
        offset: 50.,
    };
    pub fn new(
        amplitude: f64,
        center_x: f64,
        center_y: f64,
        sigma_x: f64,
        sigma_y: f64,
        theta: f64,
        offset: f64,
    ) -> Self {
        Self {
            amplitude,
            center_x,
            center_y,
            sigma_x,
            sigma_y,
            theta,
            offset,
        }
    }
    /// Surface maximum: `amplitude + offset`
    pub fn peak(&self) -> f64 {
        self.amplitude + self.offset
    }
    /// Parameters as a vector
    pub fn to_params(&self) -> Params {
        Params::from([
            self.amplitude,
            self.center_x,
            self.center_y,
            self.sigma_x,
            self.sigma_y,
            self.theta,
            self.offset,
        ])
    }
    fn quadratic(&self) -> Quadratic {
        let (sin_t, cos_t) = self.theta.sin_cos();
        let sin_2t = (2. * self.theta).sin();
        let sx2 = self.sigma_x * self.sigma_x;
        let sy2 = self.sigma_y * self.sigma_y;
        Quadratic {
            a: cos_t * cos_t / (2. * sx2) + sin_t * sin_t / (2. * sy2),
            b: -sin_2t / (4. * sx2) + sin_2t / (4. * sy2),
            c: sin_t * sin_t / (2. * sx2) + cos_t * cos_t / (2. * sy2),
        }
    }
    fn exponential(&self, q: &Quadratic, x: f64, y: f64) -> f64 {
        let dx = x - self.center_x;
        let dy = y - self.center_y;
        (-(q.a * dx * dx + 2. * q.b * dx * dy + q.c * dy * dy)).exp()
    }
    /// Surface height at (x,y)
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        self.offset + self.amplitude * self.exponential(&self.quadratic(), x, y)
    }
    /// Surface heights at the given coordinates
    pub fn eval_many<'a, I>(&'a self, xy: I) -> impl Iterator<Item = f64> + 'a
    where
        I: IntoIterator<Item = (f64, f64)>,
        I::IntoIter: 'a,
    {
        let q = self.quadratic();
        xy.into_iter()
            .map(move |(x, y)| self.offset + self.amplitude * self.exponential(&q, x, y))
    }
    /// Surface sampled on the pixel grid of a `rows` × `cols` image
    pub fn surface(&self, rows: usize, cols: usize) -> Result<IntensityGrid, GridError> {
        let q = self.quadratic();
        IntensityGrid::from_fn(rows, cols, |x, y| {
            self.offset + self.amplitude * self.exponential(&q, x, y)
        })
    }
    /// Surface height and its partial derivatives with respect to the parameters, at (x,y)
    pub fn eval_with_gradient(&self, x: f64, y: f64) -> (f64, Params) {
        self.gradient_with(&self.quadratic(), x, y)
    }
    fn gradient_with(&self, q: &Quadratic, x: f64, y: f64) -> (f64, Params) {
        let Gaussian2D {
            amplitude,
            sigma_x,
            sigma_y,
            theta,
            ..
        } = *self;
        let dx = x - self.center_x;
        let dy = y - self.center_y;
        let e = self.exponential(q, x, y);
        let ae = amplitude * e;

        let (sin_t, cos_t) = theta.sin_cos();
        let (sin_2t, cos_2t) = (2. * theta).sin_cos();
        let (sx2, sy2) = (sigma_x * sigma_x, sigma_y * sigma_y);
        let (sx3, sy3) = (sx2 * sigma_x, sy2 * sigma_y);
        // d(quadratic form)/dp for a given (da, db, dc)
        let dform = |da: f64, db: f64, dc: f64| da * dx * dx + 2. * db * dx * dy + dc * dy * dy;

        let d_sigma_x = dform(
            -cos_t * cos_t / sx3,
            sin_2t / (2. * sx3),
            -sin_t * sin_t / sx3,
        );
        let d_sigma_y = dform(
            -sin_t * sin_t / sy3,
            -sin_2t / (2. * sy3),
            -cos_t * cos_t / sy3,
        );
        let d_theta = dform(
            sin_2t * (1. / sy2 - 1. / sx2) / 2.,
            cos_2t * (1. / sy2 - 1. / sx2) / 2.,
            sin_2t * (1. / sx2 - 1. / sy2) / 2.,
        );

        let gradient = Params::from([
            e,
            ae * 2. * (q.a * dx + q.b * dy),
            ae * 2. * (q.b * dx + q.c * dy),
            -ae * d_sigma_x,
            -ae * d_sigma_y,
            -ae * d_theta,
            1.,
        ]);
        (self.offset + ae, gradient)
    }
    /// Returns the same surface with `theta` wrapped into (−π/2, π/2]
    pub fn wrapped(self) -> Self {
        let mut theta = self.theta.rem_euclid(PI);
        if theta > FRAC_PI_2 {
            theta -= PI;
        }
        Self { theta, ..self }
    }
}
impl From<Params> for Gaussian2D {
    fn from(p: Params) -> Self {
        Self::new(p[0], p[1], p[2], p[3], p[4], p[5], p[6])
    }
}
impl From<Gaussian2D> for Params {
    fn from(g: Gaussian2D) -> Self {
        g.to_params()
    }
}
impl fmt::Display for Gaussian2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A={:.3} x0={:.3} y0={:.3} sx={:.3} sy={:.3} theta={:.4} offset={:.3}",
            self.amplitude,
            self.center_x,
            self.center_y,
            self.sigma_x,
            self.sigma_y,
            self.theta,
            self.offset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotated() -> Gaussian2D {
        Gaussian2D::new(1000., 50., 50., 10., 6., 0.3, 100.)
    }

    #[test]
    fn peak_at_center() {
        let g = rotated();
        assert_eq!(g.eval(50., 50.), 1100.);
        assert_eq!(g.peak(), 1100.);
        assert!(g.eval(60., 47.) < g.peak());
    }

    #[test]
    fn axis_aligned_widths() {
        let g = Gaussian2D::new(1., 0., 0., 2., 5., 0., 0.);
        // one sigma away along each axis
        assert!((g.eval(2., 0.) - (-0.5f64).exp()).abs() < 1e-15);
        assert!((g.eval(0., 5.) - (-0.5f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn rotation_by_half_turn_swaps_axes() {
        let g = Gaussian2D::new(1., 0., 0., 2., 5., 0., 0.);
        let h = Gaussian2D::new(1., 0., 0., 5., 2., FRAC_PI_2, 0.);
        for &(x, y) in &[(1., 2.), (-3., 0.5), (4., -4.)] {
            assert!((g.eval(x, y) - h.eval(x, y)).abs() < 1e-12);
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let g = rotated();
        let p = g.to_params();
        for &(x, y) in &[(55.3, 47.1), (42., 58.), (50., 50.)] {
            let (value, gradient) = g.eval_with_gradient(x, y);
            assert!((value - g.eval(x, y)).abs() < 1e-9);
            for k in 0..N_PARAMS {
                let h = 1e-6 * p[k].abs().max(1.);
                let mut p_plus = p;
                let mut p_minus = p;
                p_plus[k] += h;
                p_minus[k] -= h;
                let numeric = (Gaussian2D::from(p_plus).eval(x, y)
                    - Gaussian2D::from(p_minus).eval(x, y))
                    / (2. * h);
                assert!(
                    (numeric - gradient[k]).abs() < 1e-5 * numeric.abs().max(1.),
                    "param #{k} at ({x},{y}): analytic {} vs numeric {}",
                    gradient[k],
                    numeric
                );
            }
        }
    }

    #[test]
    fn surface_matches_eval() {
        let g = rotated();
        let surface = g.surface(20, 30).unwrap();
        assert_eq!(surface.rows(), 20);
        assert_eq!(surface.cols(), 30);
        assert_eq!(surface.get(7, 13), Some(g.eval(7., 13.)));
        let many: Vec<f64> = g.eval_many(vec![(7., 13.), (0., 0.)]).collect();
        assert_eq!(many, vec![g.eval(7., 13.), g.eval(0., 0.)]);
    }

    #[test]
    fn wrapped_theta() {
        let g = Gaussian2D { theta: 0.3 + PI, ..rotated() }.wrapped();
        assert!((g.theta - 0.3).abs() < 1e-12);
        let g = Gaussian2D { theta: -0.3 - 2. * PI, ..rotated() }.wrapped();
        assert!((g.theta + 0.3).abs() < 1e-12);
        let g = Gaussian2D { theta: -FRAC_PI_2, ..rotated() }.wrapped();
        assert!((g.theta - FRAC_PI_2).abs() < 1e-12);
    }
}
