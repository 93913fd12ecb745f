//! Writes a rotated Gaussian spot into an SDDS file
//!
//! The file has the layout `analyze-spots` reads by default; a `.gz` output is gzipped.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use flate2::{write::GzEncoder, Compression};
use spot_analysis::{sdds::Elements, Gaussian2D, SddsFile};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "synthetic-spot", about = "Writes a synthetic Gaussian spot SDDS file")]
struct Opt {
    /// SDDS file
    #[structopt(parse(from_os_str))]
    output: PathBuf,
    /// Number of columns
    #[structopt(long, default_value = "300")]
    x_res: usize,
    /// Number of rows
    #[structopt(long, default_value = "300")]
    y_res: usize,
    #[structopt(long, default_value = "2000")]
    amplitude: f64,
    #[structopt(long, default_value = "150")]
    center_x: f64,
    #[structopt(long, default_value = "140")]
    center_y: f64,
    #[structopt(long, default_value = "15")]
    sigma_x: f64,
    #[structopt(long, default_value = "15")]
    sigma_y: f64,
    /// Rotation angle [deg]
    #[structopt(long, default_value = "0")]
    theta: f64,
    #[structopt(long, default_value = "50")]
    offset: f64,
    /// Acquisition time [s]
    #[structopt(long, default_value = "0")]
    timestamp: f64,
    /// Rounds the intensities to integer counts
    #[structopt(long)]
    counts: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let spot = Gaussian2D::new(
        opt.amplitude,
        opt.center_x,
        opt.center_y,
        opt.sigma_x,
        opt.sigma_y,
        opt.theta.to_radians(),
        opt.offset,
    );
    log::info!("{spot}");
    let grid = spot.surface(opt.y_res, opt.x_res)?;
    let mut image = grid.as_slice().to_vec();
    if opt.counts {
        image.iter_mut().for_each(|v| *v = v.round());
    }

    let sdds = SddsFile::default()
        .with_description(format!("synthetic spot: {spot}"))
        .with_parameter("nbPtsInSet1", opt.x_res as f64)
        .with_parameter("nbPtsInSet2", opt.y_res as f64)
        .with_parameter("TimeStamp", opt.timestamp)
        .with_array(
            "imageSet",
            vec![opt.y_res, opt.x_res],
            Elements::Numeric(image),
        );

    if opt.output.extension().and_then(|e| e.to_str()) == Some("gz") {
        let file = BufWriter::new(File::create(&opt.output)?);
        let mut gz = GzEncoder::new(file, Compression::default());
        sdds.write_ascii(&mut gz)?;
        gz.finish()?.flush()?;
    } else {
        sdds.to_path(&opt.output)?;
    }
    log::info!("{:?} written", opt.output);
    Ok(())
}
