//! First page readers for the `ascii` and `binary` data modes

use super::{
    header::{unquote, ArrayDefinition, Definition, Header, Mode},
    Array, DataType, Elements, Result, SddsError, SddsFile, Value,
};

pub(crate) fn read(header: &Header, data: &[u8]) -> Result<SddsFile> {
    let mut sdds = SddsFile {
        description: header.description.clone(),
        ..Default::default()
    };
    let mut source: Box<dyn Source + '_> = match header.mode {
        Mode::Ascii => Box::new(Ascii::new(data)),
        Mode::Binary => Box::new(Binary {
            data,
            position: 0,
            big_endian: header.big_endian,
        }),
    };
    let rows = match header.mode {
        Mode::Binary => Some(source.row_count()?),
        Mode::Ascii => None,
    };
    for definition in &header.parameters {
        let value = match &definition.fixed_value {
            Some(fixed) => parse_value(definition, fixed)?,
            None => source.parameter(definition)?,
        };
        sdds.parameters.push((definition.name.clone(), value));
    }
    for definition in &header.arrays {
        let dimensions = source.dimensions(definition)?;
        let count = dimensions
            .iter()
            .try_fold(1usize, |n, &d| n.checked_mul(d))
            .ok_or_else(|| {
                SddsError::Unsupported(format!(
                    "{:?} dimensions {:?} overflow the element count",
                    definition.name, dimensions
                ))
            })?;
        let elements = source.elements(&definition.name, definition.data_type, count)?;
        sdds.arrays.push(Array {
            name: definition.name.clone(),
            dimensions,
            elements,
        });
    }
    let rows = match rows {
        Some(rows) => rows,
        None => source.row_count()?,
    };
    let mut columns: Vec<Elements> = header
        .columns
        .iter()
        .map(|c| empty(c.data_type, rows))
        .collect();
    if header.column_major && header.mode == Mode::Binary {
        for (definition, column) in header.columns.iter().zip(&mut columns) {
            *column = source.elements(&definition.name, definition.data_type, rows)?;
        }
    } else {
        for _ in 0..rows {
            for (definition, column) in header.columns.iter().zip(&mut columns) {
                let value = source.value(&definition.name, definition.data_type)?;
                push(column, value);
            }
        }
    }
    sdds.columns = header
        .columns
        .iter()
        .map(|c| c.name.clone())
        .zip(columns)
        .collect();
    Ok(sdds)
}

/// Upper bound of the preallocated elements, counts read from the file are not trusted
const MAX_CAPACITY: usize = 1 << 20;

fn empty(data_type: DataType, capacity: usize) -> Elements {
    let capacity = capacity.min(MAX_CAPACITY);
    if data_type.is_numeric() {
        Elements::Numeric(Vec::with_capacity(capacity))
    } else {
        Elements::Text(Vec::with_capacity(capacity))
    }
}
fn push(elements: &mut Elements, value: Value) {
    match (elements, value) {
        (Elements::Numeric(v), Value::Number(x)) => v.push(x),
        (Elements::Text(v), Value::Text(x)) => v.push(x),
        (Elements::Text(v), Value::Number(x)) => v.push(x.to_string()),
        (Elements::Numeric(v), Value::Text(_)) => v.push(f64::NAN),
    }
}

fn parse_value(definition: &Definition, text: &str) -> Result<Value> {
    parse_token(&definition.name, definition.data_type, text)
}
fn parse_token(name: &str, data_type: DataType, token: &str) -> Result<Value> {
    if data_type.is_numeric() {
        token
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| SddsError::Parse {
                name: name.to_string(),
                value: token.to_string(),
                data_type,
            })
    } else {
        Ok(Value::Text(unquote(token.trim())))
    }
}

/// Page data source
///
/// The binary page starts with the row count, the ascii page holds it after the arrays.
trait Source {
    fn row_count(&mut self) -> Result<usize>;
    fn parameter(&mut self, definition: &Definition) -> Result<Value>;
    fn dimensions(&mut self, definition: &ArrayDefinition) -> Result<Vec<usize>>;
    fn value(&mut self, name: &str, data_type: DataType) -> Result<Value>;
    fn elements(&mut self, name: &str, data_type: DataType, count: usize) -> Result<Elements> {
        let mut elements = empty(data_type, count);
        for _ in 0..count {
            let value = self.value(name, data_type)?;
            push(&mut elements, value);
        }
        Ok(elements)
    }
}

struct Binary<'a> {
    data: &'a [u8],
    position: usize,
    big_endian: bool,
}
impl<'a> Binary<'a> {
    fn take<const N: usize>(&mut self, name: &str) -> Result<[u8; N]> {
        let bytes = self
            .data
            .get(self.position..self.position + N)
            .ok_or_else(|| SddsError::Eof(name.to_string()))?;
        self.position += N;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }
    fn i32(&mut self, name: &str) -> Result<i32> {
        let bytes = self.take::<4>(name)?;
        Ok(if self.big_endian {
            i32::from_be_bytes(bytes)
        } else {
            i32::from_le_bytes(bytes)
        })
    }
    fn length(&mut self, name: &str) -> Result<usize> {
        let n = self.i32(name)?;
        usize::try_from(n)
            .map_err(|_| SddsError::Unsupported(format!("negative length {n} for {name:?}")))
    }
}
macro_rules! number {
    ($self:ident, $name:ident, $t:ty, $n:literal) => {{
        let bytes = $self.take::<$n>($name)?;
        if $self.big_endian {
            <$t>::from_be_bytes(bytes) as f64
        } else {
            <$t>::from_le_bytes(bytes) as f64
        }
    }};
}
impl<'a> Source for Binary<'a> {
    fn row_count(&mut self) -> Result<usize> {
        self.length("row count")
    }
    fn parameter(&mut self, definition: &Definition) -> Result<Value> {
        self.value(&definition.name, definition.data_type)
    }
    fn dimensions(&mut self, definition: &ArrayDefinition) -> Result<Vec<usize>> {
        (0..definition.dimensions)
            .map(|_| self.length(&definition.name))
            .collect()
    }
    fn value(&mut self, name: &str, data_type: DataType) -> Result<Value> {
        Ok(match data_type {
            DataType::Double => Value::Number(number!(self, name, f64, 8)),
            DataType::Float => Value::Number(number!(self, name, f32, 4)),
            DataType::Long => Value::Number(number!(self, name, i32, 4)),
            DataType::Ulong => Value::Number(number!(self, name, u32, 4)),
            DataType::Long64 => Value::Number(number!(self, name, i64, 8)),
            DataType::Ulong64 => Value::Number(number!(self, name, u64, 8)),
            DataType::Short => Value::Number(number!(self, name, i16, 2)),
            DataType::Ushort => Value::Number(number!(self, name, u16, 2)),
            DataType::Character => {
                let [c] = self.take::<1>(name)?;
                Value::Text((c as char).to_string())
            }
            DataType::String => {
                let n = self.length(name)?;
                let bytes = self
                    .data
                    .get(self.position..self.position + n)
                    .ok_or_else(|| SddsError::Eof(name.to_string()))?;
                self.position += n;
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        })
    }
}

/// Whitespace separated tokens of an ascii page, `!` comment lines skipped
struct Ascii<'a> {
    lines: std::str::Lines<'a>,
    tokens: std::vec::IntoIter<String>,
}
impl<'a> Ascii<'a> {
    fn new(data: &'a [u8]) -> Self {
        let text = std::str::from_utf8(data).unwrap_or_else(|e| {
            log::warn!("ascii page is not valid UTF-8 after byte {}", e.valid_up_to());
            // the valid prefix is still readable
            std::str::from_utf8(&data[..e.valid_up_to()]).unwrap_or_default()
        });
        Self {
            lines: text.lines(),
            tokens: Vec::new().into_iter(),
        }
    }
    fn line(&mut self, name: &str) -> Result<&'a str> {
        self.lines
            .find(|line| !line.starts_with('!'))
            .ok_or_else(|| SddsError::Eof(name.to_string()))
    }
    fn token(&mut self, name: &str) -> Result<String> {
        loop {
            if let Some(token) = self.tokens.next() {
                return Ok(token);
            }
            let line = self.line(name)?;
            self.tokens = split(line).into_iter();
        }
    }
}
/// Splits a line into tokens, keeping double-quoted strings whole
fn split(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '"' {
            token.push(c);
            chars.next();
            while let Some(c) = chars.next() {
                token.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        token.push(escaped);
                    }
                } else if c == '"' {
                    break;
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }
    tokens
}
impl<'a> Source for Ascii<'a> {
    fn row_count(&mut self) -> Result<usize> {
        let token = self.token("row count")?;
        token.parse().map_err(|_| SddsError::Parse {
            name: "row count".into(),
            value: token,
            data_type: DataType::Long,
        })
    }
    /// One parameter per line, string values span the whole line
    fn parameter(&mut self, definition: &Definition) -> Result<Value> {
        let line = self.line(&definition.name)?;
        parse_value(definition, line)
    }
    fn dimensions(&mut self, definition: &ArrayDefinition) -> Result<Vec<usize>> {
        (0..definition.dimensions)
            .map(|_| {
                let token = self.token(&definition.name)?;
                token.parse().map_err(|_| SddsError::Parse {
                    name: definition.name.clone(),
                    value: token,
                    data_type: DataType::Long,
                })
            })
            .collect()
    }
    fn value(&mut self, name: &str, data_type: DataType) -> Result<Value> {
        let token = self.token(name)?;
        parse_token(name, data_type, &token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_tokens() {
        assert_eq!(
            split(r#"1  "a b" x "say \"hi\"" 2.5e3"#),
            vec!["1", "\"a b\"", "x", r#""say \"hi\"""#, "2.5e3"]
        );
        assert!(split("   ").is_empty());
    }

    #[test]
    fn oversized_dimensions() {
        let text = "SDDS1\n&array name=imageSet, type=double, dimensions=2, &end\n\
                    &data mode=ascii, &end\n2147483647 2147483647\n1 2 3\n";
        assert!(matches!(
            SddsFile::from_bytes(text.as_bytes()).unwrap_err(),
            SddsError::Eof(_)
        ));
    }

    #[test]
    fn overflowing_dimensions() {
        let text = "SDDS1\n&array name=imageSet, type=double, dimensions=3, &end\n\
                    &data mode=ascii, &end\n4294967296 4294967296 2\n1 2 3\n";
        assert!(matches!(
            SddsFile::from_bytes(text.as_bytes()).unwrap_err(),
            SddsError::Unsupported(_)
        ));
    }

    #[test]
    fn oversized_row_count() {
        let text = "SDDS1\n&column name=Value, type=double, &end\n\
                    &data mode=ascii, &end\n4611686018427387904\n1\n2\n";
        assert!(matches!(
            SddsFile::from_bytes(text.as_bytes()).unwrap_err(),
            SddsError::Eof(_)
        ));
    }

    #[test]
    fn oversized_binary_row_count() {
        let mut bytes = b"SDDS1\n!# little-endian\n&column name=Value, type=double, &end\n\
                          &data mode=binary, &end\n"
            .to_vec();
        bytes.extend(i32::MAX.to_le_bytes());
        bytes.extend(1f64.to_le_bytes());
        assert!(matches!(
            SddsFile::from_bytes(&bytes).unwrap_err(),
            SddsError::Eof(_)
        ));
    }
}
