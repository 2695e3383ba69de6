//! Angular projection of a polar grid onto Legendre moments.

use nalgebra::DVector;
use ndarray::Array1;

#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use crate::geometry::Geometry;
use crate::polar::PolarGrid;
use crate::special::legendre_p;

/// Trapezoidal weights |sin α|·P_k(cos α) over the angle grid, end samples
/// halved.
fn angular_weights(geometry: &Geometry, k: usize) -> Array1<f64> {
    let mut w: Array1<f64> = geometry
        .alphas()
        .iter()
        .map(|&a| a.sin().abs() * legendre_p(k, a.cos()))
        .collect();
    let last = w.len() - 1;
    w[0] *= 0.5;
    w[last] *= 0.5;
    w
}

/// Legendre moment of order k for every radial ring.
///
/// Moment_k(R) = (2k+1)/2 · ½ · ∫ |sin α| P_k(cos α) I(R, α) dα, integrated
/// trapezoidally over the angle grid with the configured angular step as dx.
/// The trailing ½ folds the full-turn domain back onto the physical half
/// turn, which the grid covers twice: cos(2π − α) = cos α and |sin| matches.
pub fn moment(geometry: &Geometry, grid: &PolarGrid, k: usize) -> DVector<f64> {
    let nr = geometry.radius_count();
    // a single angular sample integrates to nothing
    if geometry.angle_count() < 2 {
        return DVector::zeros(nr);
    }
    let weights = angular_weights(geometry, k);
    let scale = (2 * k + 1) as f64 / 2.0 * geometry.angular_step() * 0.5;
    DVector::from_iterator(nr, (0..nr).map(|i| grid.ring(i).dot(&weights) * scale))
}

/// Moments of all orders 0..=2N, one vector per order.
pub fn moments(geometry: &Geometry, grid: &PolarGrid) -> Vec<DVector<f64>> {
    let orders: Vec<usize> = (0..=geometry.max_order()).collect();
    #[cfg(feature = "serial")]
    let order_iter = orders.iter();
    #[cfg(not(feature = "serial"))]
    let order_iter = orders.par_iter();
    order_iter.map(|&k| moment(geometry, grid, k)).collect()
}
