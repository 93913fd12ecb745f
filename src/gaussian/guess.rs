use super::Gaussian2D;
use crate::grid::IntensityGrid;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GuessError {
    #[error("zero total intensity above the mean level: no centroid")]
    ZeroIntensity,
    #[error("zero intensity above the mean level along {axis} #{index}: no width")]
    ZeroProfile { axis: &'static str, index: usize },
}
type Result<T> = std::result::Result<T, GuessError>;

/// Strategy for the starting point of the least-squares fit
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InitialGuess {
    /// Estimate from the image moments
    #[default]
    Moments,
    /// Use a constant, known a priori, parameter set
    Fixed(Gaussian2D),
}
impl InitialGuess {
    /// The fixed empirical guess [`Gaussian2D::EMPIRICAL`]
    pub fn empirical() -> Self {
        Self::Fixed(Gaussian2D::EMPIRICAL)
    }
    /// Returns the initial parameters for the given image
    pub fn estimate(&self, grid: &IntensityGrid) -> Result<Gaussian2D> {
        match self {
            InitialGuess::Moments => moments(grid),
            InitialGuess::Fixed(params) => Ok(*params),
        }
    }
}

/// Moment based estimate of the Gaussian parameters
///
/// The moments are computed on the intensities above the image mean.
/// The centroid comes from the normalized first moments and the widths from the
/// second moments of the row and of the column through the centroid.
/// The amplitude is the image maximum, the offset the image mean and the rotation is 0.
pub fn moments(grid: &IntensityGrid) -> Result<Gaussian2D> {
    let mean = grid.mean();
    let weight = |v: f64| (v - mean).max(0.);

    let total: f64 = grid.as_slice().iter().map(|&v| weight(v)).sum();
    if total <= 0. || !total.is_finite() {
        return Err(GuessError::ZeroIntensity);
    }
    let (center_x, center_y) = grid
        .samples()
        .map(|(x, y, v)| {
            let w = weight(v) / total;
            (x * w, y * w)
        })
        .fold((0f64, 0f64), |(sx, sy), (x, y)| (sx + x, sy + y));

    let row_idx = (center_y.round() as usize).min(grid.rows() - 1);
    let col_idx = (center_x.round() as usize).min(grid.cols() - 1);
    let row: Vec<f64> = grid
        .row(row_idx)
        .map(|row| row.iter().map(|&v| weight(v)).collect())
        .unwrap_or_default();
    let column: Vec<f64> = grid
        .column(col_idx)
        .map(|col| col.into_iter().map(weight).collect())
        .unwrap_or_default();

    let sigma_x = profile_width(&row, center_x).ok_or(GuessError::ZeroProfile {
        axis: "row",
        index: row_idx,
    })?;
    let sigma_y = profile_width(&column, center_y).ok_or(GuessError::ZeroProfile {
        axis: "column",
        index: col_idx,
    })?;

    let guess = Gaussian2D::new(grid.max(), center_x, center_y, sigma_x, sigma_y, 0., mean);
    log::debug!("moments guess: {}", guess);
    Ok(guess)
}

/// Standard deviation of a 1D intensity profile around `center`
fn profile_width(profile: &[f64], center: f64) -> Option<f64> {
    let sum: f64 = profile.iter().sum();
    if sum <= 0. {
        return None;
    }
    let variance: f64 = profile
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let d = i as f64 - center;
            d * d * (w / sum)
        })
        .sum();
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_impulse() {
        let (x0, y0) = (17usize, 9usize);
        let grid =
            IntensityGrid::from_fn(32, 40, |x, y| if x == x0 as f64 && y == y0 as f64 { 1. } else { 0. })
                .unwrap();
        let guess = moments(&grid).unwrap();
        assert_eq!(guess.center_x, x0 as f64);
        assert_eq!(guess.center_y, y0 as f64);
        assert!(guess.sigma_x.abs() < 1e-12, "sigma_x: {}", guess.sigma_x);
        assert!(guess.sigma_y.abs() < 1e-12, "sigma_y: {}", guess.sigma_y);
        assert_eq!(guess.amplitude, 1.);
        assert_eq!(guess.theta, 0.);
    }

    #[test]
    fn flat_grid_fails() {
        let grid = IntensityGrid::new(10, 10, vec![42.; 100]).unwrap();
        assert_eq!(moments(&grid).unwrap_err(), GuessError::ZeroIntensity);
        let grid = IntensityGrid::new(10, 10, vec![0.; 100]).unwrap();
        assert_eq!(moments(&grid).unwrap_err(), GuessError::ZeroIntensity);
    }

    #[test]
    fn gaussian_spot() {
        let truth = Gaussian2D::new(1000., 50., 50., 10., 6., 0.3, 100.);
        let grid = truth.surface(100, 100).unwrap();
        let guess = moments(&grid).unwrap();
        assert!((guess.center_x - 50.).abs() < 1e-6, "x0: {}", guess.center_x);
        assert!((guess.center_y - 50.).abs() < 1e-6, "y0: {}", guess.center_y);
        // widths of the horizontal and vertical cuts through a rotated spot
        assert!(guess.sigma_x > 6. && guess.sigma_x < 11., "sx: {}", guess.sigma_x);
        assert!(guess.sigma_y > 4. && guess.sigma_y < 8., "sy: {}", guess.sigma_y);
        assert_eq!(guess.amplitude, grid.max());
        assert_eq!(guess.offset, grid.mean());
    }

    #[test]
    fn moments_by_default() {
        assert_eq!(InitialGuess::default(), InitialGuess::Moments);
    }

    #[test]
    fn fixed_guess_ignores_the_image() {
        let grid = IntensityGrid::new(2, 2, vec![0.; 4]).unwrap();
        let guess = InitialGuess::empirical().estimate(&grid).unwrap();
        assert_eq!(guess, Gaussian2D::EMPIRICAL);
    }
}
