//! Auxiliary parameter logs
//!
//! Time series recorded next to the images (beam current, temperature, ...) and
//! looked up at the image timestamps.

use std::{fs::File, io::Read, path::Path};

use flate2::read::GzDecoder;

#[derive(thiserror::Error, Debug)]
pub enum AuxiliaryError {
    #[error("Failed to open the auxiliary log")]
    Io(#[from] std::io::Error),
    #[error("Failed to deserialize the CSV file")]
    Csv(#[from] csv::Error),
    #[error("expected (time, value) columns, found {0} header(s)")]
    Header(usize),
    #[error("invalid number {value:?} in line {line}")]
    Number { line: u64, value: String },
}
type Result<T> = std::result::Result<T, AuxiliaryError>;

/// Named `(time, value)` series sorted by time
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryLog {
    pub name: String,
    times: Vec<f64>,
    values: Vec<f64>,
}
impl AuxiliaryLog {
    /// Creates a log from unordered samples
    pub fn new<S: Into<String>>(name: S, mut samples: Vec<(f64, f64)>) -> Self {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (times, values) = samples.into_iter().unzip();
        Self {
            name: name.into(),
            times,
            values,
        }
    }
    /// Loads a CSV log, possibly gzipped
    ///
    /// The first column is the time in seconds and the second one the value, the log is
    /// named after the header of the second column.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading {:?}...", path);
        let mut file = File::open(path)?;
        let mut contents = String::new();
        if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            GzDecoder::new(file).read_to_string(&mut contents)?;
        } else {
            file.read_to_string(&mut contents)?;
        }
        Self::from_csv(contents.as_bytes())
    }
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?;
        if headers.len() < 2 {
            return Err(AuxiliaryError::Header(headers.len()));
        }
        let name = headers[1].trim().to_string();
        let mut samples = vec![];
        for result in rdr.records() {
            let record = result?;
            let line = record.position().map_or(0, |p| p.line());
            let number = |i: usize| -> Result<f64> {
                let field = record.get(i).unwrap_or_default().trim();
                field.parse().map_err(|_| AuxiliaryError::Number {
                    line,
                    value: field.to_string(),
                })
            };
            samples.push((number(0)?, number(1)?));
        }
        log::debug!("auxiliary log {:?}: {} samples", name, samples.len());
        Ok(Self::new(name, samples))
    }
    pub fn len(&self) -> usize {
        self.times.len()
    }
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
    /// Time range of the log
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((*self.times.first()?, *self.times.last()?))
    }
    /// Last recorded value at or before `time`, `None` before the first sample
    pub fn value_at(&self, time: f64) -> Option<f64> {
        let i = self.times.partition_point(|&t| t <= time);
        i.checked_sub(1).map(|i| self.values[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "time, beam current\n10,1.5\n20,2.5\n30,3.5\n";

    #[test]
    fn named_after_the_value_column() {
        let log = AuxiliaryLog::from_csv(CSV.as_bytes()).unwrap();
        assert_eq!(log.name, "beam current");
        assert_eq!(log.len(), 3);
        assert_eq!(log.time_range(), Some((10., 30.)));
    }

    #[test]
    fn last_value_at_or_before() {
        let log = AuxiliaryLog::from_csv(CSV.as_bytes()).unwrap();
        assert_eq!(log.value_at(5.), None);
        assert_eq!(log.value_at(10.), Some(1.5));
        assert_eq!(log.value_at(19.9), Some(1.5));
        assert_eq!(log.value_at(20.), Some(2.5));
        assert_eq!(log.value_at(1e9), Some(3.5));
    }

    #[test]
    fn unordered_samples() {
        let log = AuxiliaryLog::new("T", vec![(3., 30.), (1., 10.), (2., 20.)]);
        assert_eq!(log.value_at(2.5), Some(20.));
        assert_eq!(AuxiliaryLog::new("empty", vec![]).value_at(0.), None);
    }

    #[test]
    fn invalid_number() {
        let err = AuxiliaryLog::from_csv("t,v\n1,2\n2,oops\n".as_bytes()).unwrap_err();
        match err {
            AuxiliaryError::Number { line, value } => {
                assert_eq!(line, 3);
                assert_eq!(value, "oops");
            }
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn single_column() {
        assert!(matches!(
            AuxiliaryLog::from_csv("time\n1\n".as_bytes()).unwrap_err(),
            AuxiliaryError::Header(1)
        ));
    }
}
