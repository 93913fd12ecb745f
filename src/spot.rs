//! Spot fitting
//!
//! A [SpotImage] is the intensity grid read from an SDDS file according to an
//! [ImageLayout]. The [SpotFitter] turns the grid into a [SpotFit]: the initial guess,
//! the least-squares fit and the line cuts.

use std::path::Path;

use crate::{
    gaussian::{fit_grid, FitError, FitOptions, Gaussian2D, GuessError, InitialGuess, Params},
    grid::{GridError, IntensityGrid},
    linecut::{LineCutOptions, LineCuts},
    sdds::{SddsError, SddsFile},
};

#[derive(thiserror::Error, Debug)]
pub enum SpotError {
    #[error("failed to read the SDDS file")]
    Sdds(#[from] SddsError),
    #[error("invalid image")]
    Grid(#[from] GridError),
    #[error("resolution parameter {name:?} is not a positive integer: {value}")]
    Resolution { name: String, value: f64 },
    #[error("initial guess failed")]
    Guess(#[from] GuessError),
    #[error("Gaussian fit failed")]
    Fit(#[from] FitError),
}
type Result<T> = std::result::Result<T, SpotError>;

/// Names of the SDDS parameters and array holding the spot image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageLayout {
    x_res: String,
    y_res: String,
    image: String,
    timestamp: Option<String>,
}
impl Default for ImageLayout {
    fn default() -> Self {
        Self {
            x_res: String::from("nbPtsInSet1"),
            y_res: String::from("nbPtsInSet2"),
            image: String::from("imageSet"),
            timestamp: Some(String::from("TimeStamp")),
        }
    }
}
impl ImageLayout {
    /// Parameter with the number of columns
    pub fn x_res<S: Into<String>>(self, x_res: S) -> Self {
        Self {
            x_res: x_res.into(),
            ..self
        }
    }
    /// Parameter with the number of rows
    pub fn y_res<S: Into<String>>(self, y_res: S) -> Self {
        Self {
            y_res: y_res.into(),
            ..self
        }
    }
    /// Array with the row-major image
    pub fn image<S: Into<String>>(self, image: S) -> Self {
        Self {
            image: image.into(),
            ..self
        }
    }
    /// Parameter with the acquisition time [s], `None` to ignore it
    pub fn timestamp(self, timestamp: Option<String>) -> Self {
        Self { timestamp, ..self }
    }
}

/// Spot image and its acquisition time
#[derive(Debug, Clone, PartialEq)]
pub struct SpotImage {
    pub grid: IntensityGrid,
    pub timestamp: Option<f64>,
}
impl SpotImage {
    /// Extracts the image from the first page of an SDDS file
    pub fn from_sdds(sdds: &SddsFile, layout: &ImageLayout) -> Result<Self> {
        let resolution = |name: &str| -> Result<usize> {
            let value = sdds.parameter_f64(name)?;
            if value >= 1. && value.fract() == 0. {
                Ok(value as usize)
            } else {
                Err(SpotError::Resolution {
                    name: name.to_string(),
                    value,
                })
            }
        };
        let cols = resolution(&layout.x_res)?;
        let rows = resolution(&layout.y_res)?;
        let data = sdds.array_f64(&layout.image)?.to_vec();
        let grid = IntensityGrid::new(rows, cols, data)?;
        let timestamp = match &layout.timestamp {
            Some(name) => match sdds.parameter_f64(name) {
                Ok(t) => Some(t),
                Err(e) => {
                    log::debug!("no timestamp: {e}");
                    None
                }
            },
            None => None,
        };
        Ok(Self { grid, timestamp })
    }
    /// Reads the SDDS file and extracts the image
    pub fn from_path<P: AsRef<Path>>(path: P, layout: &ImageLayout) -> Result<Self> {
        let sdds = SddsFile::from_path(path)?;
        Self::from_sdds(&sdds, layout)
    }
}

/// Gaussian spot fitter
#[derive(Debug, Clone, Default)]
pub struct SpotFitter {
    guess: InitialGuess,
    fallback: Option<Gaussian2D>,
    options: FitOptions,
    cuts: LineCutOptions,
}
impl SpotFitter {
    /// Initial guess strategy
    pub fn guess(self, guess: InitialGuess) -> Self {
        Self { guess, ..self }
    }
    /// Starting point used when the initial guess estimation fails
    pub fn fallback(self, fallback: Gaussian2D) -> Self {
        Self {
            fallback: Some(fallback),
            ..self
        }
    }
    /// Least-squares solver settings
    pub fn fit_options(self, options: FitOptions) -> Self {
        Self { options, ..self }
    }
    /// Line cuts sampling
    pub fn line_cuts(self, cuts: LineCutOptions) -> Self {
        Self { cuts, ..self }
    }
    /// Fits a rotated 2D Gaussian to the image
    pub fn fit(&self, grid: &IntensityGrid) -> Result<SpotFit> {
        let guess = match (self.guess.estimate(grid), self.fallback) {
            (Ok(guess), _) => guess,
            (Err(e), Some(fallback)) => {
                log::warn!("{e}, falling back to {fallback}");
                fallback
            }
            (Err(e), None) => return Err(e.into()),
        };
        let fitted = fit_grid(grid, guess, &self.options)?;
        let cuts = LineCuts::new(grid, &fitted.params, &self.cuts);
        Ok(SpotFit {
            params: fitted.params,
            std_errors: fitted.std_errors(),
            cost: fitted.cost,
            iterations: fitted.iterations,
            evaluations: fitted.evaluations,
            r_squared: cuts.r_squared(),
            cuts,
        })
    }
}

/// Gaussian fit of a spot image
#[derive(Debug, Clone, PartialEq)]
pub struct SpotFit {
    pub params: Gaussian2D,
    /// parameter standard errors, in the [Params] order
    pub std_errors: Option<Params>,
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub cuts: LineCuts,
    /// R² along the θ+45° line cut
    pub r_squared: f64,
}
impl SpotFit {
    pub fn amplitude(&self) -> f64 {
        self.params.amplitude
    }
    /// Surface maximum, `amplitude + baseline`
    pub fn peak(&self) -> f64 {
        self.params.peak()
    }
    pub fn baseline(&self) -> f64 {
        self.params.offset
    }
    /// Amplitude corrected for the optical density attenuation
    pub fn effective_amplitude(&self, od: f64) -> f64 {
        self.amplitude() * attenuation(od)
    }
    /// Baseline corrected for the optical density attenuation
    pub fn effective_baseline(&self, od: f64) -> f64 {
        self.baseline() * attenuation(od)
    }
}

/// Attenuation factor `10^od` of an optical density
pub fn attenuation(od: f64) -> f64 {
    10f64.powf(od)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Gaussian noise from the Box-Muller transform
    fn gaussian_noise(rng: &mut StdRng, sigma: f64) -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.);
        let u2: f64 = rng.gen();
        sigma * (-2. * u1.ln()).sqrt() * (2. * std::f64::consts::PI * u2).cos()
    }

    #[test]
    fn noisy_spot() {
        let truth = Gaussian2D::new(2000., 150., 140., 15., 12., 0., 50.);
        let mut rng = StdRng::seed_from_u64(5);
        let grid = IntensityGrid::from_fn(300, 300, |x, y| {
            truth.eval(x, y) + gaussian_noise(&mut rng, 5.)
        })
        .unwrap();
        let spot = SpotFitter::default().fit(&grid).unwrap();
        let mut p = spot.params;
        if p.theta.abs() > std::f64::consts::FRAC_PI_4 {
            // same surface with the axes swapped
            std::mem::swap(&mut p.sigma_x, &mut p.sigma_y);
        }
        assert!((p.amplitude - 2000.).abs() / 2000. < 0.05, "A: {}", p.amplitude);
        assert!((p.center_x - 150.).abs() < 1., "x0: {}", p.center_x);
        assert!((p.center_y - 140.).abs() < 1., "y0: {}", p.center_y);
        assert!((p.sigma_x - 15.).abs() / 15. < 0.1, "sx: {}", p.sigma_x);
        assert!((p.sigma_y - 12.).abs() / 12. < 0.1, "sy: {}", p.sigma_y);
        assert!(spot.r_squared >= 0.9, "R²: {}", spot.r_squared);
        assert!(spot.cuts.minus_45.r_squared() >= 0.9);
        assert!((spot.baseline() - 50.).abs() < 1., "baseline: {}", spot.baseline());
    }

    #[test]
    fn effective_values() {
        let grid = Gaussian2D::new(500., 20., 20., 4., 3., 0.1, 20.)
            .surface(40, 40)
            .unwrap();
        let spot = SpotFitter::default().fit(&grid).unwrap();
        assert!((spot.peak() - 520.).abs() < 1e-3);
        assert!((spot.effective_amplitude(2.) - 50_000.).abs() < 1e-1);
        assert!((spot.effective_baseline(0.) - spot.baseline()).abs() < 1e-12);
    }

    #[test]
    fn flat_image_without_and_with_fallback() {
        let grid = IntensityGrid::new(30, 30, vec![10.; 900]).unwrap();
        let err = SpotFitter::default().fit(&grid).unwrap_err();
        assert!(matches!(err, SpotError::Guess(GuessError::ZeroIntensity)));
        // the fallback gets past the guess, the fit itself is ill-posed
        let fitter = SpotFitter::default()
            .fallback(Gaussian2D::new(1., 15., 15., 3., 3., 0., 10.))
            .fit_options(FitOptions::default().max_evaluations(50));
        match fitter.fit(&grid) {
            Err(SpotError::Fit(_)) => (),
            Ok(spot) => assert!(spot.r_squared.is_nan() || spot.r_squared <= 1.),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
