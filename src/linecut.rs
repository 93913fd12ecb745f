//! Line cuts through the fitted spot
//!
//! The image and the fitted surface are sampled along two straight lines through the
//! fitted center, at θ−45° and θ+45°. The image is interpolated bilinearly, the surface
//! is evaluated exactly.

use std::f64::consts::FRAC_PI_4;

use crate::{gaussian::Gaussian2D, grid::IntensityGrid};

/// Sampling of the line cuts
#[derive(Debug, Clone, PartialEq)]
pub struct LineCutOptions {
    points: usize,
    extent: f64,
}
impl Default for LineCutOptions {
    fn default() -> Self {
        Self {
            points: 100,
            extent: 4.,
        }
    }
}
impl LineCutOptions {
    /// Number of samples along each line
    pub fn points(self, points: usize) -> Self {
        Self { points, ..self }
    }
    /// Half length of the lines in units of the largest Gaussian width
    pub fn extent(self, extent: f64) -> Self {
        Self { extent, ..self }
    }
}

/// One sample of a line cut
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePoint {
    /// signed distance to the center [pixel]
    pub position: f64,
    pub x: f64,
    pub y: f64,
    /// interpolated image intensity
    pub data: f64,
    /// fitted surface height
    pub fit: f64,
}

/// Image and fit sampled along a line
#[derive(Debug, Clone, PartialEq)]
pub struct LineCut {
    /// line direction [rd]
    pub angle: f64,
    pub points: Vec<LinePoint>,
}
impl LineCut {
    /// Samples the image and the surface along the line through the surface center at `angle`
    ///
    /// Samples outside the image are skipped.
    pub fn sample(
        grid: &IntensityGrid,
        params: &Gaussian2D,
        angle: f64,
        options: &LineCutOptions,
    ) -> Self {
        let half_length = options.extent * params.sigma_x.abs().max(params.sigma_y.abs());
        let (sin_a, cos_a) = angle.sin_cos();
        let n = options.points;
        let points: Vec<LinePoint> = (0..n)
            .map(|i| {
                if n > 1 {
                    -half_length + 2. * half_length * i as f64 / (n - 1) as f64
                } else {
                    0.
                }
            })
            .filter_map(|position| {
                let x = params.center_x + position * cos_a;
                let y = params.center_y + position * sin_a;
                grid.bilinear(x, y).map(|data| LinePoint {
                    position,
                    x,
                    y,
                    data,
                    fit: params.eval(x, y),
                })
            })
            .collect();
        if points.len() < n {
            log::debug!(
                "line cut at {:.3}rd: {} samples outside the image",
                angle,
                n - points.len()
            );
        }
        Self { angle, points }
    }
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn positions(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.position)
    }
    pub fn data(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.data)
    }
    pub fn fit(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.fit)
    }
    /// Coefficient of determination of the fit along the line
    ///
    /// `1 − Σ(data−fit)²/Σ(data−mean)²`; NaN if the sampled data is flat or empty.
    pub fn r_squared(&self) -> f64 {
        let n = self.len() as f64;
        let mean = self.data().sum::<f64>() / n;
        let total: f64 = self.data().map(|d| (d - mean) * (d - mean)).sum();
        if self.is_empty() || total == 0. {
            log::warn!(
                "line cut at {:.3}rd: flat or empty data, R² is undefined",
                self.angle
            );
            return f64::NAN;
        }
        let residual: f64 = self.points.iter().map(|p| (p.data - p.fit).powi(2)).sum();
        1. - residual / total
    }
}

/// The two line cuts of a fitted spot
#[derive(Debug, Clone, PartialEq)]
pub struct LineCuts {
    /// cut at θ−45°
    pub minus_45: LineCut,
    /// cut at θ+45°, the cut the spot R² is computed on
    pub plus_45: LineCut,
}
impl LineCuts {
    pub fn new(grid: &IntensityGrid, params: &Gaussian2D, options: &LineCutOptions) -> Self {
        Self {
            minus_45: LineCut::sample(grid, params, params.theta - FRAC_PI_4, options),
            plus_45: LineCut::sample(grid, params, params.theta + FRAC_PI_4, options),
        }
    }
    /// R² along the θ+45° cut
    pub fn r_squared(&self) -> f64 {
        self.plus_45.r_squared()
    }
}
