//! Inversion geometry: image centre, sampling steps and the radial/angular
//! grids derived from them.

use std::f64::consts::PI;

use crate::error::{DavisError, DavisResult};

/// Polar sampling geometry of a velocity-map image.
///
/// Everything downstream (basis matrices, cached inverses, projected
/// moments) is derived from these values, so a `Geometry` is immutable once
/// built; changing the centre or a step means building a new one and
/// precalculating again.
#[derive(Clone, Debug)]
pub struct Geometry {
    height: usize,
    width: usize,
    centre_x: f64,
    centre_y: f64,
    /// Angular bin width in radians.
    angular_step: f64,
    /// Radial bin width in pixels.
    radial_step: f64,
    /// Number of absorbed photons; Legendre orders 0..=2·photons contribute.
    photons: usize,
    radius_count: usize,
    angle_count: usize,
    radii: Vec<f64>,
    alphas: Vec<f64>,
}

impl Geometry {
    /// `image_shape` is (height, width) in pixels, i.e. the row/column counts
    /// of the Cartesian image; `centre` is (x, y) with x along the width.
    /// The radial grid runs from the centre towards the nearest of the top
    /// and right edges, one bin per `radial_step`.
    pub fn new(
        image_shape: (usize, usize),
        centre: (f64, f64),
        angular_step_deg: f64,
        radial_step: f64,
        photons: usize,
    ) -> DavisResult<Self> {
        let (height, width) = image_shape;
        let (centre_x, centre_y) = centre;
        if !angular_step_deg.is_finite() || angular_step_deg <= 0.0 {
            return Err(DavisError::Config(format!(
                "angular step must be positive and finite, got {angular_step_deg}"
            )));
        }
        if !radial_step.is_finite() || radial_step <= 0.0 {
            return Err(DavisError::Config(format!(
                "radial step must be positive and finite, got {radial_step}"
            )));
        }
        if photons < 1 {
            return Err(DavisError::Config("photon count must be at least 1".into()));
        }
        if !centre_x.is_finite() || !centre_y.is_finite()
            || centre_x < 0.0 || centre_x >= width  as f64
            || centre_y < 0.0 || centre_y >= height as f64
        {
            return Err(DavisError::Config(format!(
                "centre ({centre_x}, {centre_y}) lies outside the {width}x{height} image"
            )));
        }

        let angular_step = angular_step_deg.to_radians();
        let angle_count = (2.0 * PI / angular_step) as usize;
        if angle_count < 1 {
            return Err(DavisError::Config(format!(
                "angular step {angular_step_deg} degrees exceeds a full turn"
            )));
        }
        let radius_count = ((height as f64 - centre_y) / radial_step)
            .min((width as f64 - centre_x) / radial_step) as usize;
        if radius_count < 1 {
            return Err(DavisError::Config(format!(
                "no radial bin of width {radial_step} fits between the centre \
                 ({centre_x}, {centre_y}) and the image edge"
            )));
        }

        let radii = (1..=radius_count).map(|i| i as f64 * radial_step).collect();
        let alphas = (1..=angle_count)
            .map(|j| j as f64 * 2.0 * PI / angle_count as f64)
            .collect();

        Ok(Geometry {
            height,
            width,
            centre_x,
            centre_y,
            angular_step,
            radial_step,
            photons,
            radius_count,
            angle_count,
            radii,
            alphas,
        })
    }

    /// (height, width) of the Cartesian image this geometry was built for.
    pub fn image_shape(&self) -> (usize, usize) { (self.height, self.width) }

    pub fn centre(&self) -> (f64, f64) { (self.centre_x, self.centre_y) }

    /// Angular bin width in radians.
    pub fn angular_step(&self) -> f64 { self.angular_step }

    pub fn radial_step(&self) -> f64 { self.radial_step }

    pub fn photons(&self) -> usize { self.photons }

    /// Highest Legendre order carried by the expansion: 2·photons.
    pub fn max_order(&self) -> usize { 2 * self.photons }

    pub fn radius_count(&self) -> usize { self.radius_count }

    pub fn angle_count(&self) -> usize { self.angle_count }

    /// Radial bin centres: radial_step, 2·radial_step, …
    pub fn radii(&self) -> &[f64] { &self.radii }

    /// Angular samples: 2π/angle_count, …, 2π.
    pub fn alphas(&self) -> &[f64] { &self.alphas }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    #[rstest(/**/    shape     ,      centre    ,  deg , dr , expected_nr, expected_na,
             case((260 ,  260), ( 256.0,  256.0),   1.0, 1.0,        4,   360),
             case((2048, 2048), (1024.0, 1024.0),   1.0, 1.0,     1024,   360),
             case(( 100,  100), (  97.2,   97.2),   2.0, 0.5,        5,   180),
             case((  10,   10), (   8.5,    8.5),   1.0, 1.0,        1,   360),
             case(( 260,  260), ( 256.0,  256.0),   7.0, 1.0,        4,    51), // 2pi/da = 51.43 floored
             case(( 260,  260), ( 256.0,  256.0), 120.0, 1.0,        4,     3),
             // the tighter margin wins: width 20 pixels, height 10 pixels
             case(( 300,  520), ( 500.0,  290.0),   1.0, 1.0,       10,   360),
    )]
    fn derived_counts(
        shape: (usize, usize),
        centre: (f64, f64),
        deg: f64,
        dr: f64,
        expected_nr: usize,
        expected_na: usize,
    ) {
        let g = Geometry::new(shape, centre, deg, dr, 1).unwrap();
        assert_eq!(g.radius_count(), expected_nr);
        assert_eq!(g.angle_count(), expected_na);
        assert_eq!(g.radii().len(), expected_nr);
        assert_eq!(g.alphas().len(), expected_na);
    }

    #[test]
    fn grids_start_one_step_in_and_end_on_the_rim() {
        let g = Geometry::new((260, 260), (256.0, 256.0), 2.0, 0.5, 1).unwrap();
        assert_float_eq!(g.radii()[0], 0.5, ulps <= 1);
        assert_float_eq!(g.radii()[g.radius_count() - 1], 4.0, ulps <= 1);
        assert_float_eq!(g.alphas()[0], 2.0 * PI / 180.0, ulps <= 2);
        assert_float_eq!(g.alphas()[g.angle_count() - 1], 2.0 * PI, ulps <= 2);
    }

    #[test]
    fn max_order_is_twice_the_photon_count() {
        let g = Geometry::new((260, 260), (256.0, 256.0), 1.0, 1.0, 3).unwrap();
        assert_eq!(g.max_order(), 6);
    }

    #[rstest(/**/    shape    ,     centre     ,  deg ,  dr , photons,
             case((260, 260), (256.0, 256.0),   0.0,  1.0, 1), // zero angular step
             case((260, 260), (256.0, 256.0),  -1.0,  1.0, 1),
             case((260, 260), (256.0, 256.0),   1.0,  0.0, 1), // zero radial step
             case((260, 260), (256.0, 256.0),   1.0, -0.5, 1),
             case((260, 260), (256.0, 256.0),   1.0,  1.0, 0), // no photons
             case((260, 260), (300.0, 256.0),   1.0,  1.0, 1), // centre outside
             case((260, 260), (-1.0,  256.0),   1.0,  1.0, 1),
             case((260, 260), (256.0, 256.0), 400.0,  1.0, 1), // beyond a full turn
             case(( 10,  10), (  9.5,   9.5),   1.0,  1.0, 1), // margin under one bin
    )]
    fn degenerate_geometries_are_rejected(
        shape: (usize, usize),
        centre: (f64, f64),
        deg: f64,
        dr: f64,
        photons: usize,
    ) {
        let result = Geometry::new(shape, centre, deg, dr, photons);
        assert!(matches!(result, Err(DavisError::Config(_))));
    }
}
