//! Configuration file parser for the inversion geometry

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DavisError, DavisResult};
use crate::geometry::Geometry;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Size of the Cartesian image in pixels, as (height, width)
    pub image_size: (usize, usize),

    /// Symmetry centre of the image in pixel coordinates, as (x, y) with x
    /// running along the width
    pub centre: (f64, f64),

    /// Angular bin width of the polar grid, in degrees
    pub angular_step: f64,

    /// Radial bin width of the polar grid, in pixels
    #[serde(default = "default_radial_step")]
    pub radial_step: f64,

    /// Number of photons absorbed in the ionization step; Legendre orders
    /// 0..=2*photons are reconstructed
    pub photons: usize,
}

fn default_radial_step() -> f64 { 1.0 }

impl Config {
    /// Validate the parsed values and derive the polar grids from them.
    pub fn geometry(&self) -> DavisResult<Geometry> {
        Geometry::new(
            self.image_size,
            self.centre,
            self.angular_step,
            self.radial_step,
            self.photons,
        )
    }
}

pub fn read_config_file(path: &Path) -> DavisResult<Config> {
    let config = fs::read_to_string(path).map_err(|cause| {
        DavisError::Config(format!("couldn't read config file `{}`: {cause}", path.display()))
    })?;
    toml::from_str(&config).map_err(|cause| {
        DavisError::Config(format!("couldn't parse config file `{}`: {cause}", path.display()))
    })
}
