use std::path::PathBuf;

use anyhow::Context;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use spot_analysis::{
    AuxiliaryLog, Batch, FitOptions, Gaussian2D, ImageLayout, InitialGuess, LineCutOptions,
    SampleTable, SpotFitter,
};
use strum_macros::{Display, EnumString};
use structopt::StructOpt;

#[derive(Debug, Clone, Copy, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
enum Guess {
    Moments,
    Fixed,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "analyze-spots",
    about = "Rotated 2D Gaussian fits of SDDS spot images"
)]
struct Opt {
    /// SDDS files or glob patterns
    #[structopt(required = true)]
    inputs: Vec<String>,
    /// Initial guess: moments or fixed
    #[structopt(short, long, default_value = "moments")]
    guess: Guess,
    /// Starts from the fixed guess when the moments cannot be computed
    #[structopt(long)]
    fallback: bool,
    /// Auxiliary logs, CSV files with (time, value) columns
    #[structopt(short, long, parse(from_os_str))]
    aux: Vec<PathBuf>,
    /// Sample table, CSV file with (prefix, sample, od) columns
    #[structopt(short, long, parse(from_os_str))]
    samples: Option<PathBuf>,
    /// Optical density of the files without a sample
    #[structopt(long, default_value = "0")]
    od: f64,
    /// CSV report
    #[structopt(long, parse(from_os_str), default_value = "spots.csv")]
    csv: PathBuf,
    /// LaTeX report
    #[structopt(long, parse(from_os_str))]
    latex: Option<PathBuf>,
    /// PDF report (requires the `tectonic` feature)
    #[structopt(long, parse(from_os_str))]
    pdf: Option<PathBuf>,
    /// Directory of the spot plots (requires the `plot` feature)
    #[structopt(long, parse(from_os_str))]
    plots: Option<PathBuf>,
    /// Directory of the PGM images
    #[structopt(long, parse(from_os_str))]
    pgm: Option<PathBuf>,
    /// Parameter with the number of columns
    #[structopt(long, default_value = "nbPtsInSet1")]
    x_res: String,
    /// Parameter with the number of rows
    #[structopt(long, default_value = "nbPtsInSet2")]
    y_res: String,
    /// Array with the image
    #[structopt(long, default_value = "imageSet")]
    image: String,
    /// Parameter with the acquisition time
    #[structopt(long, default_value = "TimeStamp")]
    timestamp: String,
    /// Maximum number of model evaluations of the fit
    #[structopt(long, default_value = "200000")]
    max_evaluations: usize,
    /// Number of samples along the line cuts
    #[structopt(long, default_value = "100")]
    cut_points: usize,
    /// Half length of the line cuts in units of the largest width
    #[structopt(long, default_value = "4")]
    cut_extent: f64,
    /// Report title
    #[structopt(long, default_value = "Beam spot analysis")]
    title: String,
}

/// Expands the glob patterns
fn expand(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for pattern in inputs {
        let paths = glob(pattern)
            .with_context(|| format!("invalid pattern {pattern:?}"))?
            .collect::<Result<Vec<PathBuf>, _>>()?;
        if paths.is_empty() {
            log::warn!("no file matches {pattern:?}");
        }
        files.extend(paths);
    }
    Ok(files)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let files = expand(&opt.inputs)?;
    anyhow::ensure!(!files.is_empty(), "no SDDS file to analyze");

    let samples = opt
        .samples
        .as_ref()
        .map(SampleTable::from_path)
        .transpose()
        .context("failed to load the sample table")?;
    let logs = opt
        .aux
        .iter()
        .map(AuxiliaryLog::from_path)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to load the auxiliary logs")?;
    for log in &logs {
        if let Some((start, end)) = log.time_range() {
            log::info!("{}: {} samples from {start}s to {end}s", log.name, log.len());
        }
    }
    for dir in [&opt.pgm, &opt.plots].into_iter().flatten() {
        std::fs::create_dir_all(dir)?;
    }
    #[cfg(not(feature = "plot"))]
    if opt.plots.is_some() {
        log::warn!("built without the `plot` feature, no plot is drawn");
    }

    let mut fitter = SpotFitter::default()
        .guess(match opt.guess {
            Guess::Moments => InitialGuess::Moments,
            Guess::Fixed => InitialGuess::empirical(),
        })
        .fit_options(FitOptions::default().max_evaluations(opt.max_evaluations))
        .line_cuts(
            LineCutOptions::default()
                .points(opt.cut_points)
                .extent(opt.cut_extent),
        );
    if opt.fallback {
        fitter = fitter.fallback(Gaussian2D::EMPIRICAL);
    }
    let mut batch = Batch::default()
        .layout(
            ImageLayout::default()
                .x_res(opt.x_res.as_str())
                .y_res(opt.y_res.as_str())
                .image(opt.image.as_str())
                .timestamp(Some(opt.timestamp.clone())),
        )
        .fitter(fitter)
        .auxiliary_logs(logs)
        .od(opt.od);
    if let Some(samples) = samples {
        batch = batch.samples(samples);
    }
    if let Some(dir) = &opt.pgm {
        batch = batch.pgm(dir);
    }
    if let Some(dir) = &opt.plots {
        batch = batch.plots(dir);
    }

    log::info!("{} files, {} initial guess", files.len(), opt.guess);
    let pb = ProgressBar::new(files.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    let report = batch.run(&files, Some(&pb));
    pb.finish_with_message("done");

    report.to_csv(&opt.csv)?;
    if let Some(path) = &opt.latex {
        report.write_latex(path, &opt.title)?;
    }
    if let Some(path) = &opt.pdf {
        #[cfg(feature = "tectonic")]
        report.to_pdf(path, &opt.title)?;
        #[cfg(not(feature = "tectonic"))]
        log::warn!("built without the `tectonic` feature, {path:?} is not written");
    }
    Ok(())
}
