//! Intensity grid
//!
//! Row-major 2D array of pixel intensities with the pixel coordinates
//! `x = column index` and `y = row index`.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

#[derive(thiserror::Error, Debug)]
pub enum GridError {
    #[error("grid is empty ({0}x{1})")]
    Empty(usize, usize),
    #[error("expected {expected} samples for a {rows}x{cols} grid, found {found}")]
    Shape {
        rows: usize,
        cols: usize,
        expected: usize,
        found: usize,
    },
    #[error("non-finite intensity at (x={0}, y={1})")]
    NonFinite(usize, usize),
    #[error("failed to write the PGM file")]
    Io(#[from] std::io::Error),
}
type Result<T> = std::result::Result<T, GridError>;

/// 2D intensity samples, `rows` × `cols`, stored row after row
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGrid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}
impl IntensityGrid {
    /// Creates a grid from row-major data
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(GridError::Empty(rows, cols));
        }
        if data.len() != rows * cols {
            return Err(GridError::Shape {
                rows,
                cols,
                expected: rows * cols,
                found: data.len(),
            });
        }
        if let Some(k) = data.iter().position(|v| !v.is_finite()) {
            return Err(GridError::NonFinite(k % cols, k / cols));
        }
        Ok(Self { rows, cols, data })
    }
    /// Creates a grid evaluating `f(x, y)` at every pixel
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(f64, f64) -> f64,
    {
        let data: Vec<f64> = (0..rows)
            .flat_map(|y| (0..cols).map(move |x| (x, y)))
            .map(|(x, y)| f(x as f64, y as f64))
            .collect();
        Self::new(rows, cols, data)
    }
    /// Number of rows (y resolution)
    pub fn rows(&self) -> usize {
        self.rows
    }
    /// Number of columns (x resolution)
    pub fn cols(&self) -> usize {
        self.cols
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
    /// Intensity at column `x` and row `y`
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x < self.cols && y < self.rows {
            Some(self.data[y * self.cols + x])
        } else {
            None
        }
    }
    /// Row `y`
    pub fn row(&self, y: usize) -> Option<&[f64]> {
        (y < self.rows).then(|| &self.data[y * self.cols..(y + 1) * self.cols])
    }
    /// Column `x`
    pub fn column(&self, x: usize) -> Option<Vec<f64>> {
        (x < self.cols).then(|| self.data.iter().skip(x).step_by(self.cols).cloned().collect())
    }
    /// Iterator over the `(x, y, value)` samples, row after row
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        let cols = self.cols;
        self.data
            .iter()
            .enumerate()
            .map(move |(k, &v)| ((k % cols) as f64, (k / cols) as f64, v))
    }
    /// Returns the X and Y coordinate grids, both row-major like the intensities
    pub fn coordinates(&self) -> (Vec<f64>, Vec<f64>) {
        self.samples().map(|(x, y, _)| (x, y)).unzip()
    }
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }
    pub fn mean(&self) -> f64 {
        self.sum() / self.len() as f64
    }
    pub fn max(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }
    pub fn min(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }
    /// Samples the grid at the sub-pixel position (x,y) using bilinear interpolation
    ///
    /// Returns `None` outside `[0, cols-1] × [0, rows-1]`.
    pub fn bilinear(&self, x: f64, y: f64) -> Option<f64> {
        if self.cols < 2 || self.rows < 2 || !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (x_max, y_max) = ((self.cols - 1) as f64, (self.rows - 1) as f64);
        if x < 0. || y < 0. || x > x_max || y > y_max {
            return None;
        }
        // the last row/column interpolates from the cell before it
        let x0 = (x.floor() as usize).min(self.cols - 2);
        let y0 = (y.floor() as usize).min(self.rows - 2);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let idx00 = y0 * self.cols + x0;
        let idx01 = idx00 + self.cols;
        let p00 = self.data[idx00];
        let p10 = self.data[idx00 + 1];
        let p01 = self.data[idx01];
        let p11 = self.data[idx01 + 1];

        let a = p00 + fx * (p10 - p00);
        let b = p01 + fx * (p11 - p01);
        Some(a + fy * (b - a))
    }
    /// Writes the grid as an ASCII PGM (P2) image
    ///
    /// Intensities are rounded to the nearest integer, negative values are clipped to 0.
    pub fn to_pgm<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        let max = self.max().max(0.).round() as u64;
        writeln!(file, "P2 {} {} {}", self.cols, self.rows, max)?;
        for row in self.data.chunks(self.cols) {
            let line: Vec<String> = row
                .iter()
                .map(|v| format!("{}", v.max(0.).round() as u64))
                .collect();
            writeln!(file, "{}", line.join(" "))?;
        }
        file.flush()?;
        Ok(())
    }
}
