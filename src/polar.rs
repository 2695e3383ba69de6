//! Polar-resampled image data and the resampling seam.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{DavisError, DavisResult};
use crate::geometry::Geometry;

/// Intensity grid in polar coordinates, radius along rows and angle along
/// columns, shaped radius_count × angle_count.
#[derive(Clone, Debug)]
pub struct PolarGrid {
    data: Array2<f64>,
}

impl PolarGrid {
    pub fn new(geometry: &Geometry, data: Array2<f64>) -> DavisResult<Self> {
        let expected = (geometry.radius_count(), geometry.angle_count());
        if data.dim() != expected {
            return Err(DavisError::Config(format!(
                "polar grid shape {:?} does not match the geometry's {:?}",
                data.dim(),
                expected
            )));
        }
        Ok(PolarGrid { data })
    }

    pub fn data(&self) -> ArrayView2<f64> {
        self.data.view()
    }

    /// Intensity samples of one radial bin across all angles.
    pub fn ring(&self, i: usize) -> ArrayView1<f64> {
        self.data.row(i)
    }
}

/// Cartesian-to-polar resampling, supplied by the caller.
///
/// Frames arrive as Cartesian images and must be resampled onto the
/// geometry's polar grid before inversion. No interpolation scheme is
/// prescribed here; implementations only have to produce the
/// radius_count × angle_count layout above.
pub trait PolarReproject {
    fn reproject(&self, image: ArrayView2<f64>, geometry: &Geometry)
        -> DavisResult<Array2<f64>>;
}
