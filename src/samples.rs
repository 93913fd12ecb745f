//! Sample names and optical densities
//!
//! The sample table maps image file name prefixes to the imaged sample and to the
//! optical density of the filter in front of the camera.

use std::{fs::File, io::Read, path::Path};

use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum SampleError {
    #[error("Failed to open the sample table")]
    Io(#[from] std::io::Error),
    #[error("Failed to deserialize the CSV file")]
    Csv(#[from] csv::Error),
}
type Result<T> = std::result::Result<T, SampleError>;

/// Sample table row
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Sample {
    /// file name prefix
    pub prefix: String,
    #[serde(rename = "sample")]
    pub name: String,
    /// optical density, empty for no filter
    pub od: Option<f64>,
}
impl Sample {
    /// Optical density, 0 without a filter
    pub fn od(&self) -> f64 {
        self.od.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleTable {
    samples: Vec<Sample>,
}
impl SampleTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading {:?}...", path);
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        Self::from_csv(contents.as_bytes())
    }
    /// Reads the `prefix,sample,od` CSV table
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let samples = rdr.deserialize().collect::<std::result::Result<Vec<Sample>, _>>()?;
        Ok(Self { samples })
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    /// Sample with the longest prefix matching the file name
    pub fn lookup(&self, file_name: &str) -> Option<&Sample> {
        self.samples
            .iter()
            .filter(|s| file_name.starts_with(&s.prefix))
            .max_by_key(|s| s.prefix.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "prefix,sample,od\nrun1_,quartz,1.0\nrun1_b,sapphire, 2.5\nrun2_,YAG,\n";

    #[test]
    fn longest_prefix() {
        let table = SampleTable::from_csv(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("run1_a_0001.sdds").unwrap().name, "quartz");
        let sample = table.lookup("run1_b_0001.sdds").unwrap();
        assert_eq!(sample.name, "sapphire");
        assert_eq!(sample.od(), 2.5);
        assert!(table.lookup("run3_0001.sdds").is_none());
    }

    #[test]
    fn missing_od_is_zero() {
        let table = SampleTable::from_csv(CSV.as_bytes()).unwrap();
        let sample = table.lookup("run2_x.sdds").unwrap();
        assert_eq!(sample.od, None);
        assert_eq!(sample.od(), 0.);
    }
}
