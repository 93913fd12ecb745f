//! SDDS (Self Describing Data Sets) files
//!
//! Reads the first page of `SDDS1` files in `ascii` or `binary` data mode, optionally
//! gzip-compressed (`.gz` extension), and writes files in `ascii` mode.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
    str::FromStr,
};

use flate2::read::GzDecoder;
use strum_macros::{Display, EnumString};

mod header;
mod page;
mod writer;
use header::Header;

#[derive(thiserror::Error, Debug)]
pub enum SddsError {
    #[error("failed to read the SDDS file")]
    Io(#[from] std::io::Error),
    #[error("not an SDDS file: missing the SDDS version line")]
    NotSdds,
    #[error("malformed namelist: {0}")]
    Namelist(String),
    #[error("unknown data type {0:?}")]
    UnknownType(String),
    #[error("unsupported data layout: {0}")]
    Unsupported(String),
    #[error("unexpected end of data while reading {0:?}")]
    Eof(String),
    #[error("failed to parse {value:?} as {data_type} for {name:?}")]
    Parse {
        name: String,
        value: String,
        data_type: DataType,
    },
    #[error("no parameter named {0:?}")]
    MissingParameter(String),
    #[error("no array named {0:?}")]
    MissingArray(String),
    #[error("no column named {0:?}")]
    MissingColumn(String),
    #[error("{0:?} is not numeric")]
    NotNumeric(String),
}
type Result<T> = std::result::Result<T, SddsError>;

/// SDDS element types
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    Double,
    Float,
    Long,
    Ulong,
    Long64,
    Ulong64,
    Short,
    Ushort,
    Character,
    String,
}
impl DataType {
    pub(crate) fn parse(name: &str) -> Result<Self> {
        Self::from_str(name.trim()).map_err(|_| SddsError::UnknownType(name.to_string()))
    }
    pub fn is_numeric(&self) -> bool {
        !matches!(self, DataType::Character | DataType::String)
    }
}

/// Parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}
impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(x) => Some(*x),
            Value::Text(_) => None,
        }
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// Array or column elements
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}
impl Elements {
    pub fn len(&self) -> usize {
        match self {
            Elements::Numeric(v) => v.len(),
            Elements::Text(v) => v.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Elements::Numeric(v) => Some(v.as_slice()),
            Elements::Text(_) => None,
        }
    }
}

/// Multi-dimensional array, elements in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub name: String,
    pub dimensions: Vec<usize>,
    pub elements: Elements,
}

/// First page of an SDDS file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SddsFile {
    pub description: Option<String>,
    parameters: Vec<(String, Value)>,
    arrays: Vec<Array>,
    columns: Vec<(String, Elements)>,
}
impl SddsFile {
    /// Reads an SDDS file, gunzipping files with the `gz` extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading {:?}...", path);
        let mut file = BufReader::new(File::open(path)?);
        let mut bytes = Vec::new();
        if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            GzDecoder::new(file).read_to_end(&mut bytes)?;
        } else {
            file.read_to_end(&mut bytes)?;
        }
        Self::from_bytes(&bytes)
    }
    /// Parses the content of an SDDS file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, offset) = Header::parse(bytes)?;
        log::debug!(
            "SDDS header: {} parameters, {} arrays, {} columns, {:?} mode",
            header.parameters.len(),
            header.arrays.len(),
            header.columns.len(),
            header.mode
        );
        page::read(&header, &bytes[offset..])
    }
    pub fn with_description<S: Into<String>>(mut self, text: S) -> Self {
        self.description = Some(text.into());
        self
    }
    /// Adds a parameter
    pub fn with_parameter<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }
    /// Adds a numeric array
    pub fn with_array<S: Into<String>>(
        mut self,
        name: S,
        dimensions: Vec<usize>,
        elements: Elements,
    ) -> Self {
        self.arrays.push(Array {
            name: name.into(),
            dimensions,
            elements,
        });
        self
    }
    /// Adds a column
    pub fn with_column<S: Into<String>>(mut self, name: S, elements: Elements) -> Self {
        self.columns.push((name.into(), elements));
        self
    }
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }
    /// Numeric parameter value
    pub fn parameter_f64(&self, name: &str) -> Result<f64> {
        self.parameter(name)
            .ok_or_else(|| SddsError::MissingParameter(name.to_string()))?
            .as_f64()
            .ok_or_else(|| SddsError::NotNumeric(name.to_string()))
    }
    pub fn arrays(&self) -> &[Array] {
        &self.arrays
    }
    pub fn array(&self, name: &str) -> Option<&Array> {
        self.arrays.iter().find(|a| a.name == name)
    }
    /// Numeric array elements
    pub fn array_f64(&self, name: &str) -> Result<&[f64]> {
        self.array(name)
            .ok_or_else(|| SddsError::MissingArray(name.to_string()))?
            .elements
            .as_f64()
            .ok_or_else(|| SddsError::NotNumeric(name.to_string()))
    }
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Elements)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }
    /// Numeric column values
    pub fn column_f64(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v))
            .ok_or_else(|| SddsError::MissingColumn(name.to_string()))?
            .as_f64()
            .ok_or_else(|| SddsError::NotNumeric(name.to_string()))
    }
    /// Number of rows of the column data
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII: &str = r#"SDDS1
!# little-endian
&description text="camera spot", contents="image", &end
&parameter name=nbPtsInSet1, type=long, &end
&parameter name=nbPtsInSet2, type=long, &end
&parameter name=Camera, type=string, &end
&parameter name=Gain, type=double, fixed_value=2.5, &end
&array name=imageSet, type=double, dimensions=1, &end
&column name=Index, type=long, &end
&column name=Label, type=string, &end
&data mode=ascii, &end
! page 1
3
2
"CCD 1"
6
1 2 3
4 5 6
2
0 first
1 "second row"
"#;

    #[test]
    fn ascii_page() {
        let sdds = SddsFile::from_bytes(ASCII.as_bytes()).unwrap();
        assert_eq!(sdds.description.as_deref(), Some("camera spot"));
        assert_eq!(sdds.parameter_f64("nbPtsInSet1").unwrap(), 3.);
        assert_eq!(sdds.parameter_f64("nbPtsInSet2").unwrap(), 2.);
        assert_eq!(sdds.parameter("Camera"), Some(&Value::from("CCD 1")));
        assert_eq!(sdds.parameter_f64("Gain").unwrap(), 2.5);
        assert_eq!(
            sdds.array_f64("imageSet").unwrap(),
            &[1., 2., 3., 4., 5., 6.]
        );
        assert_eq!(sdds.array("imageSet").unwrap().dimensions, vec![6]);
        assert_eq!(sdds.rows(), 2);
        assert_eq!(sdds.column_f64("Index").unwrap(), &[0., 1.]);
        match sdds.columns().nth(1).unwrap().1 {
            Elements::Text(labels) => assert_eq!(labels, &["first", "second row"]),
            e => panic!("unexpected column: {e:?}"),
        }
        assert!(matches!(
            sdds.parameter_f64("Camera").unwrap_err(),
            SddsError::NotNumeric(_)
        ));
        assert!(matches!(
            sdds.array_f64("missing").unwrap_err(),
            SddsError::MissingArray(_)
        ));
    }

    fn binary(big_endian: bool) -> Vec<u8> {
        let header = format!(
            "SDDS1\n!# {}-endian\n\
             &parameter name=nbPtsInSet1, type=short, &end\n\
             &parameter name=nbPtsInSet2, type=long, &end\n\
             &parameter name=Name, type=string, &end\n\
             &array name=imageSet, type=float, dimensions=2, &end\n\
             &column name=Value, type=double, &end\n\
             &data mode=binary, &end\n",
            if big_endian { "big" } else { "little" }
        );
        let mut bytes = header.into_bytes();
        macro_rules! put {
            ($v:expr) => {
                if big_endian {
                    bytes.extend_from_slice(&$v.to_be_bytes())
                } else {
                    bytes.extend_from_slice(&$v.to_le_bytes())
                }
            };
        }
        put!(1i32); // rows
        put!(2i16);
        put!(3i32);
        put!(4i32);
        bytes.extend_from_slice(b"spot");
        put!(3i32);
        put!(2i32);
        for v in [1f32, 2., 3., 4., 5., 6.] {
            put!(v);
        }
        put!(42f64);
        bytes
    }

    #[test]
    fn binary_page() {
        for big_endian in [false, true] {
            let sdds = SddsFile::from_bytes(&binary(big_endian)).unwrap();
            assert_eq!(sdds.parameter_f64("nbPtsInSet1").unwrap(), 2.);
            assert_eq!(sdds.parameter_f64("nbPtsInSet2").unwrap(), 3.);
            assert_eq!(sdds.parameter("Name"), Some(&Value::from("spot")));
            let image = sdds.array("imageSet").unwrap();
            assert_eq!(image.dimensions, vec![3, 2]);
            assert_eq!(image.elements.as_f64().unwrap(), &[1., 2., 3., 4., 5., 6.]);
            assert_eq!(sdds.column_f64("Value").unwrap(), &[42.]);
        }
    }

    #[test]
    fn truncated_binary_page() {
        let mut bytes = binary(false);
        bytes.truncate(bytes.len() - 12);
        assert!(matches!(
            SddsFile::from_bytes(&bytes).unwrap_err(),
            SddsError::Eof(_)
        ));
    }

    #[test]
    fn not_sdds() {
        assert!(matches!(
            SddsFile::from_bytes(b"P2 3 2 255\n").unwrap_err(),
            SddsError::NotSdds
        ));
    }

    #[test]
    fn unknown_type() {
        let text = "SDDS1\n&parameter name=x, type=complex, &end\n&data mode=ascii, &end\n";
        assert!(matches!(
            SddsFile::from_bytes(text.as_bytes()).unwrap_err(),
            SddsError::UnknownType(_)
        ));
    }

    #[test]
    fn write_then_read() {
        let sdds = SddsFile::default()
            .with_parameter("nbPtsInSet1", 2.)
            .with_parameter("Camera", "CCD \"A\"")
            .with_array("imageSet", vec![4], Elements::Numeric(vec![0.5, 1e-3, 7., 1e12]))
            .with_column("Time", Elements::Numeric(vec![1., 2., 3.]))
            .with_column("Tag", Elements::Text(vec!["a".into(), "b c".into(), "".into()]));
        let mut buffer = Vec::new();
        sdds.write_ascii(&mut buffer).unwrap();
        let read = SddsFile::from_bytes(&buffer).unwrap();
        assert_eq!(read, sdds);
    }
}
