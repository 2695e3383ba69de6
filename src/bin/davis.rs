// ----------------------------------- CLI -----------------------------------
use clap::Parser;
use std::path::PathBuf;

#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "davis", about = "Direct inversion of velocity-map images")]
pub struct Cli {

    /// TOML file with the sampling geometry
    #[clap(short, long, default_value = "davis-config.toml")]
    pub config: PathBuf,

    /// Polar grid to invert: raw little-endian f64, radius-major
    #[clap(short = 'f', long)]
    pub input_file: PathBuf,

    /// Directory for the per-order radial profile files
    #[clap(short, long, default_value = "data/out/profiles")]
    pub out_dir: PathBuf,

    #[cfg(not(feature = "serial"))]
    /// Maximum number of rayon threads
    #[clap(short = 'j', long, default_value = "4")]
    pub num_threads: usize,

}
// --------------------------------------------------------------------------------

use std::error::Error;

use indicatif::{ProgressBar, ProgressStyle};

use davis::config::read_config_file;
use davis::io;
use davis::{CancelToken, Inverter};

fn main() -> Result<(), Box<dyn Error>> {

    let args = Cli::parse();

    // Set up progress reporting and timing
    use std::time::Instant;
    let mut now = Instant::now();

    let mut report_time = |message: &str| {
        println!("{}: {} ms", message, now.elapsed().as_millis());
        now = Instant::now();
    };

    #[cfg(not(feature = "serial"))]
    // Set the maximum number of threads used by rayon for parallel iteration
    match rayon::ThreadPoolBuilder::new().num_threads(args.num_threads).build_global() {
        Err(e) => println!("{}", e),
        Ok(_)  => println!("Using up to {} threads.", args.num_threads),
    }

    // --- Read the sampling geometry and the measured polar grid ---------------------
    let config = read_config_file(&args.config)?;
    let geometry = config.geometry()?;
    println!(
        "{} radial x {} angular bins, Legendre orders 0..={}",
        geometry.radius_count(),
        geometry.angle_count(),
        geometry.max_order()
    );
    let grid = io::read_polar_grid(&args.input_file, &geometry)?;
    report_time("Loaded polar grid from local disk");

    // --- Build the matrix cache for this geometry ------------------------------------
    let progress = ProgressBar::new(100);
    progress.set_style(ProgressStyle::default_bar()
                       .template("Precalculating: [{elapsed_precise}] {wide_bar} {pos} %")?
    );
    progress.tick();
    let mut inverter = Inverter::new(geometry);
    inverter.precalculate_with(&progress, &CancelToken::new())?;
    progress.finish();
    report_time("Precalculated basis matrices");

    // --- Invert -----------------------------------------------------------------------
    inverter.set_polar(grid)?;
    let profiles = inverter.invert()?;
    report_time("Inverted polar grid");

    // --- Write one radial profile per Legendre order ----------------------------------
    let paths = io::write_profiles(&args.out_dir, &profiles)?;
    for path in &paths {
        println!("Wrote {}", path.display());
    }
    report_time("Wrote radial profiles");

    Ok(())
}
