use std::collections::HashMap;

use regex::Regex;

use super::{DataType, Result, SddsError};

/// Parameter or column definition
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Definition {
    pub name: String,
    pub data_type: DataType,
    pub fixed_value: Option<String>,
}

/// Array definition
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArrayDefinition {
    pub name: String,
    pub data_type: DataType,
    pub dimensions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Ascii,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Header {
    pub description: Option<String>,
    pub parameters: Vec<Definition>,
    pub arrays: Vec<ArrayDefinition>,
    pub columns: Vec<Definition>,
    pub mode: Mode,
    pub column_major: bool,
    pub big_endian: bool,
}

/// Fields of a `&name ... &end` namelist
struct Namelist {
    kind: String,
    fields: HashMap<String, String>,
}
impl Namelist {
    fn parse(text: &str, field: &Regex) -> Result<Self> {
        let text = text.trim();
        let kind: String = text
            .strip_prefix('&')
            .ok_or_else(|| SddsError::Namelist(text.to_string()))?
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if kind.is_empty() {
            return Err(SddsError::Namelist(text.to_string()));
        }
        let fields = field
            .captures_iter(&text[kind.len() + 1..])
            .map(|c| (c[1].to_lowercase(), unquote(&c[2])))
            .collect();
        Ok(Self { kind, fields })
    }
    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|v| v.as_str())
    }
    fn required(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            SddsError::Namelist(format!("&{} without the {:?} field", self.kind, key))
        })
    }
    fn flag(&self, key: &str) -> bool {
        self.get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .map_or(false, |v| v != 0)
    }
}

/// Removes the surrounding double quotes and the escapes of a quoted string
pub(crate) fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => {
            let mut text = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        text.push(escaped);
                    }
                } else {
                    text.push(c);
                }
            }
            text
        }
        None => value.to_string(),
    }
}

impl Header {
    /// Parses the header, returning it with the offset of the first data byte
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let field = Regex::new(r#"(\w+)\s*=\s*("(?:[^"\\]|\\.)*"|[^,\s]+)"#)
            .map_err(|e| SddsError::Namelist(e.to_string()))?;
        let mut header = Header {
            description: None,
            parameters: vec![],
            arrays: vec![],
            columns: vec![],
            mode: Mode::Binary,
            column_major: false,
            big_endian: cfg!(target_endian = "big"),
        };
        let mut offset = 0;
        let mut first = true;
        let mut pending = String::new();
        while offset < bytes.len() {
            let end = bytes[offset..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |i| offset + i + 1);
            let line = String::from_utf8_lossy(&bytes[offset..end]);
            let line = line.trim_end();
            offset = end;
            if first {
                if !line.starts_with("SDDS") {
                    return Err(SddsError::NotSdds);
                }
                first = false;
                continue;
            }
            if let Some(comment) = line.strip_prefix('!') {
                if comment.contains("big-endian") {
                    header.big_endian = true;
                } else if comment.contains("little-endian") {
                    header.big_endian = false;
                }
                continue;
            }
            pending.push_str(line);
            pending.push(' ');
            while let Some(i) = pending.find("&end") {
                let namelist = Namelist::parse(&pending[..i], &field)?;
                pending.drain(..i + 4);
                if header.add(namelist)? {
                    return Ok((header, offset));
                }
            }
        }
        if first {
            Err(SddsError::NotSdds)
        } else {
            Err(SddsError::Eof("&data".into()))
        }
    }
    /// Adds a namelist to the header, returns true on the `&data` namelist
    fn add(&mut self, namelist: Namelist) -> Result<bool> {
        match namelist.kind.as_str() {
            "description" => {
                self.description = namelist.get("text").map(String::from);
            }
            "parameter" | "column" => {
                let definition = Definition {
                    name: namelist.required("name")?.to_string(),
                    data_type: DataType::parse(namelist.required("type")?)?,
                    fixed_value: namelist.get("fixed_value").map(String::from),
                };
                if namelist.kind == "parameter" {
                    self.parameters.push(definition);
                } else {
                    self.columns.push(definition);
                }
            }
            "array" => {
                let dimensions = match namelist.get("dimensions") {
                    Some(d) => d.parse().map_err(|_| {
                        SddsError::Namelist(format!("invalid array dimensions {d:?}"))
                    })?,
                    None => 1,
                };
                self.arrays.push(ArrayDefinition {
                    name: namelist.required("name")?.to_string(),
                    data_type: DataType::parse(namelist.required("type")?)?,
                    dimensions,
                });
            }
            "data" => {
                self.mode = match namelist.required("mode")? {
                    "ascii" => Mode::Ascii,
                    "binary" => Mode::Binary,
                    mode => return Err(SddsError::Unsupported(format!("{mode} data mode"))),
                };
                if namelist.flag("no_row_counts") {
                    return Err(SddsError::Unsupported("no_row_counts".into()));
                }
                if namelist.get("lines_per_row").map_or(false, |n| n != "1") {
                    log::debug!("lines_per_row ignored, rows are read as a token stream");
                }
                self.column_major = namelist.flag("column_major_order");
                return Ok(true);
            }
            kind => log::debug!("skipping the &{kind} namelist"),
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_namelists() {
        let text = "SDDS1\n!# big-endian\n&column name=x,\n  type=double, units=m,\n  &end\n\
                    &associate filename=\"a.sdds\", &end\n\
                    &array name=img, type=ushort, dimensions=2, &end\n\
                    &data mode=binary, column_major_order=1, &end\n\x00\x01";
        let (header, offset) = Header::parse(text.as_bytes()).unwrap();
        assert!(header.big_endian);
        assert!(header.column_major);
        assert_eq!(header.mode, Mode::Binary);
        assert_eq!(header.columns[0].name, "x");
        assert_eq!(header.columns[0].data_type, DataType::Double);
        assert_eq!(header.arrays[0].dimensions, 2);
        assert_eq!(header.arrays[0].data_type, DataType::Ushort);
        assert_eq!(&text.as_bytes()[offset..], b"\x00\x01");
    }

    #[test]
    fn quoted_values() {
        assert_eq!(unquote(r#""a, \"b\"""#), r#"a, "b""#);
        assert_eq!(unquote("plain"), "plain");
        let text = "SDDS1\n&parameter name=Note, type=string, fixed_value=\"x = 1, y\", &end\n&data mode=ascii, &end\n";
        let (header, _) = Header::parse(text.as_bytes()).unwrap();
        assert_eq!(header.parameters[0].fixed_value.as_deref(), Some("x = 1, y"));
    }

    #[test]
    fn missing_data_namelist() {
        let text = "SDDS1\n&parameter name=x, type=double, &end\n";
        assert!(matches!(
            Header::parse(text.as_bytes()).unwrap_err(),
            SddsError::Eof(_)
        ));
    }
}
