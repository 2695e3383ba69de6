//! The inversion engine: cached basis matrices and the order-descending
//! back-substitution that turns angular moments into radial profiles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, ArrayView2};

#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use crate::basis::basis_matrix;
use crate::error::{DavisError, DavisResult};
use crate::geometry::Geometry;
use crate::polar::{PolarGrid, PolarReproject};
use crate::progress::{CancelToken, NoProgress, ProgressSink};
use crate::projection;

/// Relative size below which a diagonal entry marks the matrix as
/// numerically singular.
const DIAGONAL_RATIO_FLOOR: f64 = 1e-12;

/// Radial profiles F_k(R), one vector per Legendre order 0..=2N.
#[derive(Clone, Debug, PartialEq)]
pub struct Profiles {
    data: Vec<DVector<f64>>,
}

impl Profiles {
    pub fn new(data: Vec<DVector<f64>>) -> Self {
        Profiles { data }
    }

    pub fn order(&self, k: usize) -> &DVector<f64> {
        &self.data[k]
    }

    pub fn max_order(&self) -> usize {
        self.data.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &DVector<f64>> {
        self.data.iter()
    }
}

/// Higher orders feeding corrections into order k during back-substitution:
/// the cached pairs are (k + 2i, k) for each i in this range.
fn correction_orders(k: usize, photons: usize) -> std::ops::RangeInclusive<usize> {
    let top = if k % 2 == 0 {
        photons - k / 2
    } else {
        photons - k / 2 - 1
    };
    1..=top
}

/// Inversion engine for one fixed geometry.
///
/// `precalculate` fills a cache of inverted diagonal matrices and raw
/// off-diagonal ones; `invert` then reduces any number of frames against
/// that cache. The cache never outlives its geometry: a new geometry means
/// a new `Inverter`.
pub struct Inverter {
    geometry: Geometry,
    polar: Option<PolarGrid>,
    inverse_diagonal: Vec<DMatrix<f64>>,
    off_diagonal: HashMap<(usize, usize), DMatrix<f64>>,
}

impl Inverter {
    /// A cold engine: no polar data, nothing cached.
    pub fn new(geometry: Geometry) -> Self {
        Inverter {
            geometry,
            polar: None,
            inverse_diagonal: Vec::new(),
            off_diagonal: HashMap::new(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn polar(&self) -> Option<&PolarGrid> {
        self.polar.as_ref()
    }

    /// Whether `precalculate` has completed for this geometry.
    pub fn is_ready(&self) -> bool {
        self.inverse_diagonal.len() == self.geometry.max_order() + 1
    }

    /// Replaces the polar grid wholesale; the matrix cache is unaffected.
    pub fn set_polar(&mut self, data: Array2<f64>) -> DavisResult<()> {
        self.polar = Some(PolarGrid::new(&self.geometry, data)?);
        Ok(())
    }

    /// Resamples a Cartesian image through `reproject` and installs the
    /// result as the current polar grid.
    pub fn set_image(
        &mut self,
        image: ArrayView2<f64>,
        reproject: &impl PolarReproject,
    ) -> DavisResult<()> {
        if image.dim() != self.geometry.image_shape() {
            return Err(DavisError::Config(format!(
                "image shape {:?} does not match the geometry's {:?}",
                image.dim(),
                self.geometry.image_shape()
            )));
        }
        let data = reproject.reproject(image, &self.geometry)?;
        self.polar = Some(PolarGrid::new(&self.geometry, data)?);
        Ok(())
    }

    /// `precalculate_with` without progress reporting or cancellation.
    pub fn precalculate(&mut self) -> DavisResult<()> {
        self.precalculate_with(&NoProgress, &CancelToken::new())
    }

    /// Builds and caches every matrix the back-substitution will need.
    ///
    /// Phase one (reported as 0 to 50 %) builds the diagonal matrices M_{k,k}
    /// for k = 0..=2N and inverts them; phase two (50 to 100 %) builds the
    /// off-diagonal matrices M_{k+2i,k}, walking k downwards the same way
    /// the inversion will consume them. Matrix builds run in parallel
    /// unless the `serial` feature is enabled; the cache is only replaced
    /// once both phases have fully succeeded, so a failed or cancelled run
    /// leaves the previous state intact.
    pub fn precalculate_with(
        &mut self,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DavisResult<()> {
        let geometry = &self.geometry;
        let photons = geometry.photons();
        let top = geometry.max_order();
        let total = (top + 1) as f64;

        // ----- Phase 1: inverted diagonals, orders ascending --------------
        let orders: Vec<usize> = (0..=top).collect();
        let completed = AtomicUsize::new(0);
        #[cfg(feature = "serial")]
        let order_iter = orders.iter();
        #[cfg(not(feature = "serial"))]
        let order_iter = orders.par_iter();
        let inverse_diagonal = order_iter
            .map(|&k| {
                if cancel.is_cancelled() {
                    return Err(DavisError::Cancelled);
                }
                let inverse = invert_diagonal(geometry, k)?;
                let n = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.percent((n as f64 / total * 50.0) as u8);
                Ok(inverse)
            })
            .collect::<DavisResult<Vec<_>>>()?;

        // ----- Phase 2: off-diagonal corrections, orders descending -------
        let mut off_diagonal = HashMap::new();
        for (step, k) in (0..=top).rev().enumerate() {
            if cancel.is_cancelled() {
                return Err(DavisError::Cancelled);
            }
            let sources: Vec<usize> = correction_orders(k, photons).collect();
            #[cfg(feature = "serial")]
            let source_iter = sources.iter();
            #[cfg(not(feature = "serial"))]
            let source_iter = sources.par_iter();
            let built = source_iter
                .map(|&i| {
                    if cancel.is_cancelled() {
                        return Err(DavisError::Cancelled);
                    }
                    Ok(((k + 2 * i, k), basis_matrix(geometry, k + 2 * i, k)?))
                })
                .collect::<DavisResult<Vec<_>>>()?;
            off_diagonal.extend(built);
            progress.percent(((step + 1) as f64 / total * 50.0 + 50.0) as u8);
        }

        self.inverse_diagonal = inverse_diagonal;
        self.off_diagonal = off_diagonal;
        Ok(())
    }

    /// Inverts the current polar grid into radial profiles.
    pub fn invert(&self) -> DavisResult<Profiles> {
        let grid = self.polar.as_ref().ok_or_else(|| {
            DavisError::Dependency("no polar grid set; call set_polar or set_image first".into())
        })?;
        let moments = projection::moments(&self.geometry, grid);
        self.invert_moments(&moments)
    }

    /// Back-substitutes pre-computed moment vectors into radial profiles.
    ///
    /// Orders are solved from 2N down to 0; each step subtracts the cached
    /// higher-order corrections from the moment vector and applies the
    /// inverted diagonal.
    pub fn invert_moments(&self, moments: &[DVector<f64>]) -> DavisResult<Profiles> {
        self.ensure_ready()?;
        let top = self.geometry.max_order();
        let nr = self.geometry.radius_count();
        if moments.len() != top + 1 {
            return Err(DavisError::Dependency(format!(
                "expected {} moment vectors, got {}",
                top + 1,
                moments.len()
            )));
        }
        if let Some(bad) = moments.iter().find(|m| m.len() != nr) {
            return Err(DavisError::Dependency(format!(
                "moment vector of length {} against {} radial bins",
                bad.len(),
                nr
            )));
        }

        let mut profiles = vec![DVector::zeros(nr); top + 1];
        for k in (0..=top).rev() {
            let mut rhs = moments[k].clone();
            for i in correction_orders(k, self.geometry.photons()) {
                let matrix = self.cached(k + 2 * i, k)?;
                rhs -= matrix * &profiles[k + 2 * i];
            }
            profiles[k] = &self.inverse_diagonal[k] * rhs;
        }
        Ok(Profiles::new(profiles))
    }

    /// Forward model of the projection: the moment vectors a grid carrying
    /// `profiles` would produce, Moment[k] = M_{k,k}·F_k + Σ_i M_{k+2i,k}·F_{k+2i}.
    ///
    /// Diagonal matrices are rebuilt on demand since the cache only holds
    /// their inverses.
    pub fn forward_moments(&self, profiles: &Profiles) -> DavisResult<Vec<DVector<f64>>> {
        self.ensure_ready()?;
        let top = self.geometry.max_order();
        if profiles.max_order() != top {
            return Err(DavisError::Dependency(format!(
                "profiles carry orders up to {}, geometry needs {}",
                profiles.max_order(),
                top
            )));
        }
        let mut moments = Vec::with_capacity(top + 1);
        for k in 0..=top {
            let mut m = basis_matrix(&self.geometry, k, k)? * profiles.order(k);
            for i in correction_orders(k, self.geometry.photons()) {
                m += self.cached(k + 2 * i, k)? * profiles.order(k + 2 * i);
            }
            moments.push(m);
        }
        Ok(moments)
    }

    fn cached(&self, n: usize, k: usize) -> DavisResult<&DMatrix<f64>> {
        self.off_diagonal.get(&(n, k)).ok_or_else(|| {
            DavisError::Dependency(format!("matrix ({n},{k}) missing from the cache"))
        })
    }

    fn ensure_ready(&self) -> DavisResult<()> {
        if !self.is_ready() {
            return Err(DavisError::Dependency(
                "matrix cache is cold; run precalculate() for this geometry first".into(),
            ));
        }
        Ok(())
    }
}

/// Inverts the diagonal matrix M_{k,k}, rejecting near-singular ones.
fn invert_diagonal(geometry: &Geometry, k: usize) -> DavisResult<DMatrix<f64>> {
    let m = basis_matrix(geometry, k, k)?;
    let mut smallest = f64::INFINITY;
    let mut largest = 0.0f64;
    for i in 0..m.nrows() {
        let d = m[(i, i)].abs();
        smallest = smallest.min(d);
        largest = largest.max(d);
    }
    if largest == 0.0 || smallest / largest <= DIAGONAL_RATIO_FLOOR {
        return Err(DavisError::NumericalInstability {
            n: k,
            k,
            detail: format!(
                "near-singular diagonal matrix, |diagonal| ratio {:e}",
                if largest == 0.0 { 0.0 } else { smallest / largest }
            ),
        });
    }
    m.try_inverse()
        .ok_or_else(|| DavisError::NumericalInstability {
            n: k,
            k,
            detail: "diagonal matrix inversion failed".into(),
        })
}
