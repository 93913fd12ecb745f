//! Batch analysis
//!
//! A [Batch] analyzes the image files one after the other and records every outcome
//! in the [Report]: a file that cannot be read or fitted yields a failed [SpotRecord]
//! and the next files are still analyzed.

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;

use crate::{
    auxiliary::AuxiliaryLog,
    report::{Report, SpotRecord},
    samples::SampleTable,
    spot::{ImageLayout, SpotFitter, SpotImage},
};

/// Per file analysis settings
#[derive(Debug, Clone, Default)]
pub struct Batch {
    layout: ImageLayout,
    fitter: SpotFitter,
    samples: Option<SampleTable>,
    logs: Vec<AuxiliaryLog>,
    od: f64,
    pgm: Option<PathBuf>,
    #[cfg_attr(not(feature = "plot"), allow(dead_code))]
    plots: Option<PathBuf>,
}
impl Batch {
    pub fn layout(self, layout: ImageLayout) -> Self {
        Self { layout, ..self }
    }
    pub fn fitter(self, fitter: SpotFitter) -> Self {
        Self { fitter, ..self }
    }
    /// Sample names and optical densities
    pub fn samples(self, samples: SampleTable) -> Self {
        Self {
            samples: Some(samples),
            ..self
        }
    }
    /// Auxiliary logs sampled at the image timestamps
    pub fn auxiliary_logs(self, logs: Vec<AuxiliaryLog>) -> Self {
        Self { logs, ..self }
    }
    /// Optical density of the files without a sample
    pub fn od(self, od: f64) -> Self {
        Self { od, ..self }
    }
    /// Directory of the PGM images
    pub fn pgm<P: Into<PathBuf>>(self, dir: P) -> Self {
        Self {
            pgm: Some(dir.into()),
            ..self
        }
    }
    /// Directory of the spot plots, drawn with the `plot` feature only
    pub fn plots<P: Into<PathBuf>>(self, dir: P) -> Self {
        Self {
            plots: Some(dir.into()),
            ..self
        }
    }
    /// Analyzes the files in order, advancing the progress bar if any
    pub fn run<P: AsRef<Path>>(&self, paths: &[P], progress: Option<&ProgressBar>) -> Report {
        let mut report = Report::default();
        report.extend(paths.iter().map(|path| {
            let path = path.as_ref();
            if let Some(pb) = progress {
                pb.set_message(path.display().to_string());
            }
            let record = self.analyze(path);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            record
        }));
        log::info!(
            "{} spots analyzed, {} failed",
            report.len(),
            report.failures()
        );
        report
    }
    /// Analyzes one file, a failure is recorded instead of returned
    pub fn analyze(&self, path: &Path) -> SpotRecord {
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let stem = path
            .file_stem()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.clone());
        let sample = self.samples.as_ref().and_then(|s| s.lookup(&file));
        let od = sample.map_or(self.od, |s| s.od());

        let mut record = match SpotImage::from_path(path, &self.layout) {
            Ok(image) => {
                if let Some(dir) = &self.pgm {
                    if let Err(e) = image.grid.to_pgm(dir.join(format!("{stem}.pgm"))) {
                        log::warn!("{file}: {e}");
                    }
                }
                let mut record = match self.fitter.fit(&image.grid) {
                    Ok(spot) => SpotRecord::new(file.as_str(), Ok(spot)),
                    Err(e) => {
                        log::warn!("{file}: {e}");
                        SpotRecord::failed(file.as_str(), &e)
                    }
                };
                record.x_res = Some(image.grid.cols());
                record.y_res = Some(image.grid.rows());
                record.timestamp = image.timestamp;
                for log in &self.logs {
                    let value = image.timestamp.and_then(|t| log.value_at(t));
                    record.auxiliary.insert(log.name.clone(), value);
                }
                self.plot(&image, &stem, &mut record);
                record
            }
            Err(e) => {
                log::warn!("{file}: {e}");
                let mut record = SpotRecord::failed(file.as_str(), &e);
                for log in &self.logs {
                    record.auxiliary.insert(log.name.clone(), None);
                }
                record
            }
        };
        record.sample = sample.map(|s| s.name.clone());
        record.od = od;
        record
    }
    #[cfg(feature = "plot")]
    fn plot(&self, image: &SpotImage, stem: &str, record: &mut SpotRecord) {
        use crate::report::plot;
        let (Some(dir), Ok(spot)) = (&self.plots, &record.result) else {
            return;
        };
        let heatmap = dir.join(format!("{stem}_image.png"));
        let cuts = dir.join(format!("{stem}_cuts.png"));
        match plot::heatmap(&image.grid, spot, &heatmap)
            .and_then(|_| plot::line_cuts(spot, &cuts))
        {
            Ok(()) => record.figures.extend([heatmap, cuts]),
            Err(e) => log::warn!("{}: {e}", record.file),
        }
    }
    #[cfg(not(feature = "plot"))]
    fn plot(&self, _image: &SpotImage, _stem: &str, _record: &mut SpotRecord) {}
}
