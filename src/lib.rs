//! # Spot analysis
//!
//! Fits a rotated 2D Gaussian to beam spot images stored in SDDS files.
//!
//! ```no_run
//! use spot_analysis::{ImageLayout, SpotFitter, SpotImage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = SpotImage::from_path("spot_0001.sdds", &ImageLayout::default())?;
//! let spot = SpotFitter::default().fit(&image.grid)?;
//! println!("{} (R²={:.4})", spot.params, spot.r_squared);
//! # Ok(())
//! # }
//! ```
//!
//! The [spot::SpotFitter] estimates the starting point (intensity moments or a fixed
//! guess), refines it with a Levenberg-Marquardt least-squares fit and samples the image
//! and the fitted surface along two line cuts through the spot center. A [batch::Batch] of files
//! is collected into a [report::Report] with the sample names and optical densities of
//! a [samples::SampleTable] and the values of [auxiliary::AuxiliaryLog]s.

pub mod auxiliary;
pub mod batch;
pub mod error;
pub mod gaussian;
pub mod grid;
pub mod linecut;
pub mod report;
pub mod samples;
pub mod sdds;
pub mod spot;

pub use auxiliary::AuxiliaryLog;
pub use batch::Batch;
pub use error::Error;
pub use gaussian::{FitOptions, Gaussian2D, InitialGuess};
pub use grid::IntensityGrid;
pub use linecut::{LineCut, LineCutOptions, LineCuts};
pub use report::{Report, SpotRecord};
pub use samples::SampleTable;
pub use sdds::SddsFile;
pub use spot::{attenuation, ImageLayout, SpotFit, SpotFitter, SpotImage};
