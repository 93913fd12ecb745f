//! Batch report
//!
//! Every analyzed file yields a [SpotRecord], successful or not. The [Report] collects
//! them and exports a CSV table, a LaTeX summary and, with the `tectonic` feature, the
//! compiled PDF.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::Write,
    ops::Deref,
    path::{Path, PathBuf},
};

use itertools::Itertools;

use crate::spot::SpotFit;

#[cfg(feature = "plot")]
pub mod plot;

#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("Failed to write the report")]
    Io(#[from] std::io::Error),
    #[error("Failed to write the CSV file")]
    Csv(#[from] csv::Error),
    #[error("Failed to compile the LaTeX report: {0}")]
    Latex(String),
    #[error("Failed to draw the plot: {0}")]
    Plot(String),
}
type Result<T> = std::result::Result<T, ReportError>;

/// CSV columns preceding the auxiliary logs
pub const HEADER: [&str; 28] = [
    "file",
    "sample",
    "timestamp",
    "x_res",
    "y_res",
    "od",
    "status",
    "amplitude",
    "peak",
    "effective_amplitude",
    "center_x",
    "center_y",
    "sigma_x",
    "sigma_y",
    "theta",
    "baseline",
    "effective_baseline",
    "r_squared",
    "r_squared_minus45",
    "amplitude_err",
    "center_x_err",
    "center_y_err",
    "sigma_x_err",
    "sigma_y_err",
    "theta_err",
    "offset_err",
    "iterations",
    "evaluations",
];

/// Analysis outcome of one image file
#[derive(Debug, Clone, PartialEq)]
pub struct SpotRecord {
    pub file: String,
    pub sample: Option<String>,
    /// acquisition time [s]
    pub timestamp: Option<f64>,
    /// optical density of the filter
    pub od: f64,
    pub x_res: Option<usize>,
    pub y_res: Option<usize>,
    /// the fit or the failure message
    pub result: std::result::Result<SpotFit, String>,
    /// auxiliary log values at the timestamp
    pub auxiliary: BTreeMap<String, Option<f64>>,
    /// plots of the spot
    pub figures: Vec<PathBuf>,
}
impl SpotRecord {
    pub fn new<S: Into<String>>(file: S, result: std::result::Result<SpotFit, String>) -> Self {
        Self {
            file: file.into(),
            sample: None,
            timestamp: None,
            od: 0.,
            x_res: None,
            y_res: None,
            result,
            auxiliary: BTreeMap::new(),
            figures: vec![],
        }
    }
    /// Failed analysis with the error and its sources as message
    pub fn failed<S: Into<String>>(file: S, error: &dyn std::error::Error) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(e) = source {
            message.push_str(&format!(": {e}"));
            source = e.source();
        }
        Self::new(file, Err(message))
    }
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
    /// `ok` or the failure message
    pub fn status(&self) -> &str {
        match &self.result {
            Ok(_) => "ok",
            Err(message) => message,
        }
    }
    fn csv_record<'a>(&self, auxiliary: impl Iterator<Item = &'a String>) -> Vec<String> {
        let opt = |x: Option<f64>| x.map(|x| x.to_string()).unwrap_or_default();
        let mut record = vec![
            self.file.clone(),
            self.sample.clone().unwrap_or_default(),
            opt(self.timestamp),
            self.x_res.map(|x| x.to_string()).unwrap_or_default(),
            self.y_res.map(|x| x.to_string()).unwrap_or_default(),
            self.od.to_string(),
            self.status().to_string(),
        ];
        match &self.result {
            Ok(spot) => {
                let p = &spot.params;
                record.extend(
                    [
                        p.amplitude,
                        spot.peak(),
                        spot.effective_amplitude(self.od),
                        p.center_x,
                        p.center_y,
                        p.sigma_x,
                        p.sigma_y,
                        p.theta,
                        spot.baseline(),
                        spot.effective_baseline(self.od),
                        spot.r_squared,
                        spot.cuts.minus_45.r_squared(),
                    ]
                    .iter()
                    .map(|x| x.to_string()),
                );
                match &spot.std_errors {
                    Some(e) => record.extend(e.iter().map(|x| x.to_string())),
                    None => record.extend((0..7).map(|_| String::new())),
                }
                record.push(spot.iterations.to_string());
                record.push(spot.evaluations.to_string());
            }
            Err(_) => record.extend((7..HEADER.len()).map(|_| String::new())),
        }
        record.extend(auxiliary.map(|key| opt(self.auxiliary.get(key).copied().flatten())));
        record
    }
}

/// Append-only collection of the analysis records
#[derive(Debug, Default, Clone)]
pub struct Report {
    records: Vec<SpotRecord>,
}
impl Deref for Report {
    type Target = [SpotRecord];
    fn deref(&self) -> &Self::Target {
        &self.records
    }
}
impl Report {
    pub fn push(&mut self, record: SpotRecord) {
        self.records.push(record);
    }
    /// Number of failed analyses
    pub fn failures(&self) -> usize {
        self.records.iter().filter(|r| !r.is_ok()).count()
    }
    /// Names of the auxiliary logs, sorted
    pub fn auxiliary_names(&self) -> BTreeSet<&String> {
        self.records
            .iter()
            .flat_map(|r| r.auxiliary.keys())
            .collect()
    }
    /// Writes the CSV table
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let auxiliary = self.auxiliary_names();
        let mut keys: Vec<&str> = HEADER.to_vec();
        keys.extend(auxiliary.iter().map(|k| k.as_str()));
        wtr.write_record(&keys)?;
        for record in &self.records {
            wtr.write_record(record.csv_record(auxiliary.iter().copied()))?;
        }
        wtr.flush()?;
        Ok(())
    }
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        log::info!("Writing {:?}...", path.as_ref());
        self.write_csv(File::create(path)?)
    }
    /// LaTeX summary table of the successful fits
    pub fn latex_table(&self) -> String {
        let rows = self
            .records
            .iter()
            .filter_map(|r| r.result.as_ref().ok().map(|spot| (r, spot)))
            .map(|(r, spot)| {
                let p = &spot.params;
                format!(
                    " {} & {} & {:.2} & {:.1} & {:.1} & ({:.2}, {:.2}) & {:.2} & {:.2} & {:.1} & {:.1} & {:.4} \\\\",
                    escape(&r.file),
                    escape(r.sample.as_deref().unwrap_or("-")),
                    r.od,
                    p.amplitude,
                    spot.effective_amplitude(r.od),
                    p.center_x,
                    p.center_y,
                    p.sigma_x,
                    p.sigma_y,
                    p.theta.to_degrees(),
                    spot.baseline(),
                    spot.r_squared,
                )
            })
            .join("\n");
        format!(
            r#"
\begin{{longtable}}{{llrrrcrrrrr}}
\caption{{Gaussian fits}} \\
\toprule
File & Sample & OD & $A$ & $A_{{\mathrm{{eff}}}}$ & $(x_0, y_0)$ & $\sigma_x$ & $\sigma_y$ & $\theta$ [deg] & Baseline & $R^2$ \\
\midrule
\endhead
{}
\bottomrule
\end{{longtable}}
"#,
            rows
        )
    }
    /// LaTeX table of the failed analyses, `None` if there is none
    pub fn latex_failures(&self) -> Option<String> {
        if self.failures() == 0 {
            return None;
        }
        let rows = self
            .records
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| format!(" {} & {} \\\\", escape(&r.file), escape(r.status())))
            .join("\n");
        Some(format!(
            r#"
\begin{{longtable}}{{lp{{0.6\textwidth}}}}
\caption{{Failed analyses}} \\
\toprule
File & Error \\
\midrule
\endhead
{}
\bottomrule
\end{{longtable}}
"#,
            rows
        ))
    }
    /// Complete LaTeX document: summary, failures and one section per spot with figures
    pub fn to_latex(&self, title: &str) -> String {
        let sections = self
            .records
            .iter()
            .filter(|r| !r.figures.is_empty())
            .map(|r| {
                let figures = r
                    .figures
                    .iter()
                    .map(|f| {
                        format!(
                            "\\includegraphics[width=0.45\\textwidth]{{{}}}",
                            f.display()
                        )
                    })
                    .join("\n");
                format!(
                    r#"
\section{{{}}}
\begin{{center}}
{}
\end{{center}}
"#,
                    escape(&r.file),
                    figures
                )
            })
            .join("\n");
        format!(
            r#"
\documentclass{{article}}
\usepackage[colorlinks=true,linkcolor=blue]{{hyperref}}\usepackage{{graphicx}}
\usepackage{{booktabs}}
\usepackage{{longtable}}

\addtolength{{\textwidth}}{{3cm}}
\addtolength{{\evensidemargin}}{{-2cm}}
\addtolength{{\oddsidemargin}}{{-1.5cm}}

\title{{{}}}
\date{{\today}}

\begin{{document}}
\maketitle
{}
{}
{}
\end{{document}}
"#,
            escape(title),
            self.latex_table(),
            self.latex_failures().unwrap_or_default(),
            sections
        )
    }
    pub fn write_latex<P: AsRef<Path>>(&self, path: P, title: &str) -> Result<()> {
        log::info!("Writing {:?}...", path.as_ref());
        let mut file = File::create(path)?;
        file.write_all(self.to_latex(title).as_bytes())?;
        Ok(())
    }
    /// Compiles the LaTeX document into a PDF file
    #[cfg(feature = "tectonic")]
    pub fn to_pdf<P: AsRef<Path>>(&self, path: P, title: &str) -> Result<()> {
        let now = std::time::Instant::now();
        log::info!("Compiling the report ...");
        let pdf_data: Vec<u8> = tectonic::latex_to_pdf(self.to_latex(title))
            .map_err(|e| ReportError::Latex(e.to_string()))?;
        let mut doc = File::create(path)?;
        doc.write_all(&pdf_data)?;
        log::info!(" ... report compiled in {}s", now.elapsed().as_secs());
        Ok(())
    }
}
impl Extend<SpotRecord> for Report {
    fn extend<T: IntoIterator<Item = SpotRecord>>(&mut self, iter: T) {
        self.records.extend(iter)
    }
}

/// Escapes the LaTeX special characters
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str(r"\textbackslash{}"),
            '~' => escaped.push_str(r"\textasciitilde{}"),
            '^' => escaped.push_str(r"\textasciicircum{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gaussian::Gaussian2D, spot::SpotFitter};

    fn report() -> Report {
        let grid = Gaussian2D::new(800., 25., 20., 5., 3., 0.2, 40.)
            .surface(40, 50)
            .unwrap();
        let spot = SpotFitter::default().fit(&grid).unwrap();
        let mut ok = SpotRecord::new("run_1.sdds", Ok(spot));
        ok.sample = Some("quartz".into());
        ok.od = 1.;
        ok.x_res = Some(50);
        ok.y_res = Some(40);
        ok.timestamp = Some(12.5);
        ok.auxiliary.insert("current".into(), Some(3.));
        ok.auxiliary.insert("temperature".into(), None);
        let mut failed = SpotRecord::new("run_2.sdds", Err("flat image, no spot".into()));
        failed.auxiliary.insert("current".into(), Some(4.));
        let mut report = Report::default();
        report.push(ok);
        report.push(failed);
        report
    }

    #[test]
    fn csv_columns() {
        let report = report();
        let mut buffer = vec![];
        report.write_csv(&mut buffer).unwrap();
        let mut rdr = csv::Reader::from_reader(buffer.as_slice());
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.len(), HEADER.len() + 2);
        assert_eq!(&headers[0], "file");
        assert_eq!(&headers[17], "r_squared");
        assert_eq!(&headers[28], "current");
        assert_eq!(&headers[29], "temperature");
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);

        let ok = &records[0];
        assert_eq!(ok.len(), headers.len());
        assert_eq!(&ok[1], "quartz");
        assert_eq!(&ok[6], "ok");
        let amplitude: f64 = ok[7].parse().unwrap();
        let effective: f64 = ok[9].parse().unwrap();
        assert!((effective - 10. * amplitude).abs() < 1e-6 * effective);
        assert!((amplitude - 800.).abs() < 1e-3);
        assert_eq!(&ok[28], "3");
        assert_eq!(&ok[29], "");

        let failed = &records[1];
        assert_eq!(failed.len(), headers.len());
        assert_eq!(&failed[6], "flat image, no spot");
        assert!((7..28).all(|i| failed[i].is_empty()));
        assert_eq!(&failed[28], "4");
        assert_eq!(report.failures(), 1);
    }

    #[test]
    fn latex_document() {
        let report = report();
        let latex = report.to_latex("Spots & more");
        assert!(latex.contains(r"\usepackage{booktabs}"));
        assert!(latex.contains(r"\title{Spots \& more}"));
        assert!(latex.contains(r"run\_1.sdds & quartz & 1.00 & 800.0"));
        assert!(latex.contains(r"run\_2.sdds & flat image, no spot \\"));
        assert!(!latex.contains(r"\section"));
    }

    #[test]
    fn failed_record_message() {
        let error = crate::Error::from(crate::grid::GridError::Empty(0, 3));
        let record = SpotRecord::failed("a.sdds", &error);
        assert!(!record.is_ok());
        assert!(record.status().starts_with("Error in the `grid` module: "));
    }

    #[test]
    fn escapes() {
        assert_eq!(escape("a_b%c"), r"a\_b\%c");
        assert_eq!(escape(r"x\y"), r"x\textbackslash{}y");
    }
}
