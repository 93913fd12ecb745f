use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use super::{Elements, Result, SddsFile, Value};

/// Values per line of the array data
const LINE_WIDTH: usize = 10;

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}
fn type_of(elements: &Elements) -> &'static str {
    match elements {
        Elements::Numeric(_) => "double",
        Elements::Text(_) => "string",
    }
}
fn element(elements: &Elements, i: usize) -> String {
    match elements {
        Elements::Numeric(v) => v[i].to_string(),
        Elements::Text(v) => quote(&v[i]),
    }
}

impl SddsFile {
    /// Writes the file in `ascii` data mode
    pub fn write_ascii<W: Write>(&self, mut w: W) -> Result<()> {
        writeln!(w, "SDDS1")?;
        if let Some(text) = &self.description {
            writeln!(w, "&description text={}, &end", quote(text))?;
        }
        for (name, value) in &self.parameters {
            let data_type = match value {
                Value::Number(_) => "double",
                Value::Text(_) => "string",
            };
            writeln!(w, "&parameter name={name}, type={data_type}, &end")?;
        }
        for array in &self.arrays {
            writeln!(
                w,
                "&array name={}, type={}, dimensions={}, &end",
                array.name,
                type_of(&array.elements),
                array.dimensions.len()
            )?;
        }
        for (name, elements) in &self.columns {
            writeln!(w, "&column name={name}, type={}, &end", type_of(elements))?;
        }
        writeln!(w, "&data mode=ascii, &end")?;

        for (_, value) in &self.parameters {
            match value {
                Value::Number(x) => writeln!(w, "{x}")?,
                Value::Text(text) => writeln!(w, "{}", quote(text))?,
            }
        }
        for array in &self.arrays {
            let dimensions: Vec<String> = array.dimensions.iter().map(|d| d.to_string()).collect();
            writeln!(w, "{}", dimensions.join(" "))?;
            let n = array.elements.len();
            for start in (0..n).step_by(LINE_WIDTH) {
                let line: Vec<String> = (start..n.min(start + LINE_WIDTH))
                    .map(|i| element(&array.elements, i))
                    .collect();
                writeln!(w, "{}", line.join(" "))?;
            }
        }
        let rows = self.rows();
        writeln!(w, "{rows}")?;
        for i in 0..rows {
            let row: Vec<String> = self
                .columns
                .iter()
                .map(|(_, elements)| {
                    if i < elements.len() {
                        element(elements, i)
                    } else {
                        log::warn!("short column, padding the row #{i}");
                        String::from("0")
                    }
                })
                .collect();
            writeln!(w, "{}", row.join(" "))?;
        }
        Ok(())
    }
    /// Writes the file in `ascii` data mode to `path`
    pub fn to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        log::info!("Writing {:?}...", path);
        let mut file = BufWriter::new(File::create(path)?);
        self.write_ascii(&mut file)?;
        file.flush()?;
        Ok(())
    }
}
