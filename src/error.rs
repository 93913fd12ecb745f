use crate::{
    auxiliary::AuxiliaryError,
    gaussian::{FitError, GuessError},
    grid::GridError,
    report::ReportError,
    samples::SampleError,
    sdds::SddsError,
    spot::SpotError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `grid` module")]
    Grid(#[from] GridError),
    #[error("Error in the initial guess estimation")]
    Guess(#[from] GuessError),
    #[error("Error in the Gaussian fit")]
    Fit(#[from] FitError),
    #[error("Error in the `sdds` module")]
    Sdds(#[from] SddsError),
    #[error("Error in the `spot` module")]
    Spot(#[from] SpotError),
    #[error("Error in the `auxiliary` module")]
    Auxiliary(#[from] AuxiliaryError),
    #[error("Error in the `samples` module")]
    Samples(#[from] SampleError),
    #[error("Error in the `report` module")]
    Report(#[from] ReportError),
}
