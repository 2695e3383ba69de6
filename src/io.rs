//! Reading polar grids and writing radial profiles as raw binary files.

pub mod raw;

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::{DavisError, DavisResult};
use crate::geometry::Geometry;
use crate::inverter::Profiles;

/// Reads a polar grid stored as radius-major little-endian `f64`s.
///
/// The file must hold exactly `radius_count * angle_count` values for the
/// given geometry; ring i occupies values `i*angle_count ..< (i+1)*angle_count`.
pub fn read_polar_grid(path: &Path, geometry: &Geometry) -> DavisResult<Array2<f64>> {
    let data: Vec<f64> = raw::read(path)?.collect::<Result<_, _>>()?;
    let (nr, na) = (geometry.radius_count(), geometry.angle_count());
    if data.len() != nr * na {
        return Err(DavisError::Config(format!(
            "`{}` holds {} values, expected {nr} x {na} = {}",
            path.display(),
            data.len(),
            nr * na
        )));
    }
    Array2::from_shape_vec((nr, na), data).map_err(|cause| DavisError::Config(cause.to_string()))
}

/// Writes one raw file per Legendre order under `dir` (`profile-00.raw`,
/// `profile-01.raw`, ...) and returns the paths written.
pub fn write_profiles(dir: &Path, profiles: &Profiles) -> DavisResult<Vec<PathBuf>> {
    create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(profiles.max_order() + 1);
    for (k, profile) in profiles.iter().enumerate() {
        let path = dir.join(format!("profile-{k:02}.raw"));
        raw::write(profile.iter().copied(), &path)?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use tempfile::tempdir;

    // one ring, three angular samples
    fn tiny_geometry() -> Geometry {
        Geometry::new((10, 10), (8.5, 8.5), 120.0, 1.0, 1).unwrap()
    }

    #[test]
    fn polar_grid_roundtrip() -> DavisResult<()> {
        let geometry = tiny_geometry();
        let dir = tempdir()?;
        let path = dir.path().join("grid.raw");
        raw::write([1.0, 2.0, 3.0].into_iter(), &path)?;

        let grid = read_polar_grid(&path, &geometry)?;
        assert_eq!(grid.dim(), (1, 3));
        assert_eq!(grid.row(0).to_vec(), vec![1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn polar_grid_with_wrong_length_is_rejected() -> DavisResult<()> {
        let geometry = tiny_geometry();
        let dir = tempdir()?;
        let path = dir.path().join("short.raw");
        raw::write([1.0, 2.0].into_iter(), &path)?;

        let result = read_polar_grid(&path, &geometry);
        assert!(matches!(result, Err(DavisError::Config(_))));
        Ok(())
    }

    #[test]
    fn profiles_land_in_one_file_per_order() -> DavisResult<()> {
        let profiles = Profiles::new(vec![
            DVector::from_vec(vec![1.0]),
            DVector::from_vec(vec![2.0]),
            DVector::from_vec(vec![3.0]),
        ]);
        let dir = tempdir()?;
        let out = dir.path().join("profiles");

        let paths = write_profiles(&out, &profiles)?;
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[1], out.join("profile-01.raw"));
        for (k, path) in paths.iter().enumerate() {
            let reloaded: Vec<f64> = raw::read(path)?.collect::<Result<_, _>>()?;
            assert_eq!(reloaded, vec![(k + 1) as f64]);
        }
        Ok(())
    }
}
