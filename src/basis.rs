//! Basis matrices M_{n,k} of the DAVIS inversion (doi 10.1063/1.5025057).
//!
//! Entry (i, i′) weighs how much a shell of true radius R[i′] contributes to
//! the annulus observed around R[i]; projection geometry makes every matrix
//! upper triangular, since a shell only shows up at radii at or below its
//! own. Eleven (n, κ) instances have closed forms, cross-checked against the
//! hypergeometric expansion of eqns 7, 11 and 13; every other valid pair is
//! evaluated through that expansion directly.

use nalgebra::DMatrix;

use crate::error::{DavisError, DavisResult};
use crate::geometry::Geometry;
use crate::special::{factorial, falling_factorial, gauss_2f1};

/// Radial integration bounds of one matrix entry.
///
/// `hi` is clamped to R[i] on the diagonal, keeping hi/shell ≤ 1 where the
/// hypergeometric argument is defined; the closed forms inherit the same
/// clamp so both paths integrate over the same annulus.
struct Annulus {
    lo: f64,
    hi: f64,
    shell: f64,
}

fn annulus(radii: &[f64], radial_step: f64, i: usize, ip: usize) -> Annulus {
    let hi = if ip == i { radii[i] } else { radii[i] + radial_step / 2.0 };
    Annulus { lo: radii[i] - radial_step / 2.0, hi, shell: radii[ip] }
}

fn validate_order_pair(n: usize, k: usize) -> DavisResult<()> {
    if k > n || (n - k) % 2 != 0 {
        return Err(DavisError::Config(format!(
            "invalid order pair ({n},{k}): need k <= n with n - k even"
        )));
    }
    Ok(())
}

/// Builds M_{n,k} for observed Legendre order k and source order n.
///
/// Closed form where one is tabulated, hypergeometric fallback otherwise;
/// the caller cannot tell which path was taken.
pub fn basis_matrix(geometry: &Geometry, n: usize, k: usize) -> DavisResult<DMatrix<f64>> {
    validate_order_pair(n, k)?;
    let kappa = (n - k) / 2;
    match tabulated_matrix(geometry, n, kappa) {
        Some(m) => Ok(m),
        None => general_basis_matrix(geometry, n, k),
    }
}

/// Builds M_{n,k} through eqns 7/11/13 regardless of the closed-form table.
///
/// This is the slow path; it exists for orders beyond the table and as an
/// independent cross-check of the closed forms.
pub fn general_basis_matrix(geometry: &Geometry, n: usize, k: usize) -> DavisResult<DMatrix<f64>> {
    validate_order_pair(n, k)?;
    let kappa = (n - k) / 2;
    let radii = geometry.radii();
    let dr = geometry.radial_step();
    let da = geometry.angular_step();
    let nr = geometry.radius_count();
    let mut m = DMatrix::zeros(nr, nr);
    let upper_triangle = itertools::iproduct!(0..nr, 0..nr).filter(|&(i, ip)| ip >= i);
    for (i, ip) in upper_triangle {
        m[(i, ip)] = general_entry(n, kappa, &annulus(radii, dr, i, ip), dr, da)
            .map_err(|detail| DavisError::NumericalInstability { n, k, detail })?;
    }
    Ok(m)
}

fn tabulated_matrix(geometry: &Geometry, n: usize, kappa: usize) -> Option<DMatrix<f64>> {
    let radii = geometry.radii();
    let dr = geometry.radial_step();
    let da = geometry.angular_step();
    let nr = geometry.radius_count();
    let mut m = DMatrix::zeros(nr, nr);
    let upper_triangle = itertools::iproduct!(0..nr, 0..nr).filter(|&(i, ip)| ip >= i);
    for (i, ip) in upper_triangle {
        m[(i, ip)] = closed_entry(n, kappa, &annulus(radii, dr, i, ip), dr, da)?;
    }
    Some(m)
}

/// Table I of the paper, plus the (4,2) form as corrected against eqn 13 and
/// the (6,2)/(6,3) forms derived the same way.
fn closed_entry(n: usize, kappa: usize, a: &Annulus, dr: f64, da: f64) -> Option<f64> {
    let (lo, hi, q) = (a.lo, a.hi, a.shell);
    let lo2 = lo * lo;
    let hi2 = hi * hi;
    let q2 = q * q;
    let v = match (n, kappa) {
        (0, 0) => 2.0*dr*da/q * ((q2 - lo2).sqrt() - (q2 - hi2).sqrt()),
        (1, 0) => dr*da/q2
                  * (lo*(q2 - lo2).sqrt() - hi*(q2 - hi2).sqrt()
                     + q2*(hi/q).asin() - q2*(lo/q).asin()),
        (2, 0) => 2.0*dr*da/(3.0*q2*q)
                  * ((q2 - lo2).sqrt()*(2.0*q2 + lo2) - (q2 - hi2).sqrt()*(2.0*q2 + hi2)),
        (2, 1) => dr*da/(3.0*q2*q) * ((q2 - hi2).powf(1.5) - (q2 - lo2).powf(1.5)),
        (3, 0) => dr*da/(4.0*q2*q2)
                  * (lo*(q2 - lo2).sqrt()*(3.0*q2 + 2.0*lo2)
                     - hi*(q2 - hi2).sqrt()*(3.0*q2 + 2.0*hi2)
                     + 3.0*q2*q2*(hi/q).asin() - 3.0*q2*q2*(lo/q).asin()),
        (3, 1) => 3.0*dr*da/(8.0*q2*q2)
                  * (lo*(q2 - lo2).sqrt()*(2.0*lo2 - q2)
                     - hi*(q2 - hi2).sqrt()*(2.0*hi2 - q2)
                     + q2*q2*(lo/q).asin() - q2*q2*(hi/q).asin()),
        (4, 0) => 2.0*dr*da/(15.0*q2*q2*q)
                  * ((q2 - lo2).sqrt()*(8.0*q2*q2 + 4.0*q2*lo2 + 3.0*lo2*lo2)
                     - (q2 - hi2).sqrt()*(8.0*q2*q2 + 4.0*q2*hi2 + 3.0*hi2*hi2)),
        (4, 1) => dr*da/(3.0*q2*q2*q)
                  * ((q2 - hi2).powf(1.5)*(2.0*q2 + 3.0*hi2)
                     - (q2 - lo2).powf(1.5)*(2.0*q2 + 3.0*lo2)),
        (4, 2) => dr*da/(60.0*q2*q2*q)
                  * ((q2 - hi2).powf(1.5)*(19.0*q2 + 51.0*hi2)
                     - (q2 - lo2).powf(1.5)*(19.0*q2 + 51.0*lo2)),
        (6, 2) => dr*da/(84.0*q2*q2*q2*q)
                  * ((q2 - hi2).powf(1.5)*(975.0*hi2*hi2 + 633.0*hi2*q2 + 422.0*q2*q2)
                     - (q2 - lo2).powf(1.5)*(975.0*lo2*lo2 + 633.0*lo2*q2 + 422.0*q2*q2)),
        (6, 3) => dr*da/(1680.0*q2*q2*q2*q)
                  * ((q2 - hi2).powf(1.5)*(2670.0*hi2*hi2 - 1329.0*hi2*q2 - 536.0*q2*q2)
                     - (q2 - lo2).powf(1.5)*(2670.0*lo2*lo2 - 1329.0*lo2*q2 - 536.0*q2*q2)),
        _ => return None,
    };
    Some(v)
}

/// One entry of eqn 13: the l-sum of signed, weighted c·Γ products.
fn general_entry(n: usize, kappa: usize, a: &Annulus, dr: f64, da: f64) -> Result<f64, String> {
    let mut sum = 0.0;
    for l in 0..=kappa.saturating_sub(1) {
        let sign = if (kappa - l) % 2 == 0 { 1.0 } else { -1.0 };
        let weight = sign * 2f64.powi(2 * l as i32 + 1) / factorial((kappa - l) as u32);
        sum += weight * coefficient_c(n, kappa, l)? * dr * da * shell_integral(n, kappa, l, a)?;
    }
    if !sum.is_finite() {
        return Err(format!("non-finite entry for annulus around {}", a.lo + dr / 2.0));
    }
    Ok(sum)
}

/// Expansion coefficient c(n,κ,l) of eqn 7, with its recursive p-sum
/// correction for l > 0.
fn coefficient_c(n: usize, kappa: usize, l: usize) -> Result<f64, String> {
    let nf = n as f64;
    let kf = kappa as f64;
    let lf = l as f64;
    let numerator = falling_factorial(nf - kf + lf - 0.5, (kappa - l) as u32)
        * falling_factorial(nf - kf, l as u32)
        * falling_factorial(nf - 2.0 * kf + 2.0 * lf - 0.5, 2 * l as u32);
    let denominator = falling_factorial(2.0 * lf, 2 * l as u32)
        * falling_factorial(nf - kf + lf - 0.5, l as u32);
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(format!("vanishing denominator in c({n},{kappa},{l})"));
    }
    let mut c = numerator / denominator;
    if l > 0 {
        let mut correction = 0.0;
        for p in 0..l {
            correction += correction_summand(n, kappa, l, p)?;
        }
        c -= correction / 2f64.powi((kappa + l) as i32);
    }
    Ok(c)
}

fn correction_summand(n: usize, kappa: usize, l: usize, p: usize) -> Result<f64, String> {
    let m = n - 2 * kappa + l - p;
    let denominator = falling_factorial(2.0 * (l - p) as f64, 2 * (l - p) as u32);
    if denominator == 0.0 {
        return Err(format!("vanishing denominator in summand ({n},{kappa},{l},{p})"));
    }
    Ok(falling_factorial(2.0 * m as f64, 2 * (l - p) as u32) / denominator
        * coefficient_c(n, kappa - l + p, p)?)
}

/// Radial overlap integral Γ of eqn 11, evaluated at both annulus bounds.
fn shell_integral(n: usize, kappa: usize, l: usize, a: &Annulus) -> Result<f64, String> {
    let nf = n as f64;
    let kf = kappa as f64;
    let lf = l as f64;
    let exponent = 2.0 + 2.0 * lf - 2.0 * kf + nf;
    let hyp = |x: f64| {
        gauss_2f1(
            0.5 + lf - kf,
            1.0 + lf - kf + nf / 2.0,
            2.0 + lf - kf + nf / 2.0,
            x,
        )
    };
    let hi = a.hi / a.shell;
    let lo = a.lo / a.shell;
    Ok((hi.powf(exponent) * hyp(hi * hi)? - lo.powf(exponent) * hyp(lo * lo)?) / exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    fn geometry() -> Geometry {
        Geometry::new((260, 260), (256.0, 256.0), 1.0, 1.0, 3).unwrap()
    }

    // All eleven tabulated (n, κ) pairs, written as (n, observed k).
    const TABLE: [(usize, usize); 11] = [
        (0, 0), (1, 1), (2, 2), (2, 0), (3, 3), (3, 1),
        (4, 4), (4, 2), (4, 0), (6, 2), (6, 0),
    ];

    #[test]
    fn closed_forms_match_the_hypergeometric_fallback() {
        let g = geometry();
        for &(n, k) in &TABLE {
            let closed = basis_matrix(&g, n, k).unwrap();
            let general = general_basis_matrix(&g, n, k).unwrap();
            let scale = closed.amax();
            assert!(scale > 0.0);
            for (a, b) in closed.iter().zip(general.iter()) {
                assert!(
                    (a - b).abs() <= 1e-6 * scale,
                    "({n},{k}): closed {a} vs fallback {b}"
                );
            }
        }
    }

    // Spot values computed independently from the published formulas for
    // dr = 1, dα = 1°, four radial bins.
    #[rstest(/**/ n, k,     entry00                ,        entry03               ,        entry23              ,        entry33,
             case(0, 0,  0.030229989403903628,  0.0022735332799649613,  0.010349866396570187,    0.016899077816556717),
             case(1, 1,  0.02583454253817842,   0.0006187930813127682,  0.007934043354857413,    0.01621355135876077),
             case(2, 2,  0.02267249205292772,   0.00017922723933852712, 0.006135165057697278,    0.015578837362138224),
             case(2, 0, -0.003778748675487954, -0.0010471530203132171, -0.0021073506694364546,  -0.0006601202272092467),
             case(4, 0, -0.0059987635223371265, 0.00044082186483523786,-0.0034698619995797574,  -0.0019158958156893372),
             case(6, 0,  0.004732714021911364,  0.00009656898107294309, 0.0032146909650101634,  -0.000013661371366499957),
    )]
    fn closed_form_spot_values(
        n: usize,
        k: usize,
        entry00: f64,
        entry03: f64,
        entry23: f64,
        entry33: f64,
    ) {
        let m = basis_matrix(&geometry(), n, k).unwrap();
        assert_float_eq!(m[(0, 0)], entry00, rmax <= 1e-9, abs <= 1e-12);
        assert_float_eq!(m[(0, 3)], entry03, rmax <= 1e-9, abs <= 1e-12);
        assert_float_eq!(m[(2, 3)], entry23, rmax <= 1e-9, abs <= 1e-12);
        assert_float_eq!(m[(3, 3)], entry33, rmax <= 1e-9, abs <= 1e-12);
    }

    // Orders beyond the table must produce real values through the fallback,
    // not a silent zero matrix.
    #[test]
    fn untabulated_orders_go_through_the_fallback() {
        let g = geometry();
        let m = basis_matrix(&g, 5, 1).unwrap();
        assert_float_eq!(m[(0, 0)], -0.03446813134151713, rmax <= 1e-9);
        assert_float_eq!(m[(0, 1)], -0.010490211955309588, rmax <= 1e-9);
        let m = basis_matrix(&g, 8, 0).unwrap();
        assert_float_eq!(m[(0, 0)], 0.02058809477219858, rmax <= 1e-9);
        let m = basis_matrix(&g, 8, 8).unwrap();
        assert_float_eq!(m[(0, 0)], 0.014180429181317771, rmax <= 1e-9);
    }

    #[rstest(/**/ n, k,
             case(2, 1), // parity mismatch
             case(3, 2),
             case(1, 3), // k above n
    )]
    fn mismatched_order_pairs_are_rejected(n: usize, k: usize) {
        assert!(matches!(
            basis_matrix(&geometry(), n, k),
            Err(DavisError::Config(_))
        ));
        assert!(matches!(
            general_basis_matrix(&geometry(), n, k),
            Err(DavisError::Config(_))
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        // Geometries with 1 to 7 radial bins, and a valid (n, k) pair.
        fn geometry_and_orders() -> impl Strategy<Value = (Geometry, usize, usize)> {
            (1usize..8, 0usize..7, 0.25f64..2.0)
                .prop_flat_map(|(nr, n, dr)| (Just(nr), Just(n), 0..=n / 2, Just(dr)))
                .prop_map(|(nr, n, kappa, dr)| {
                    // margin of nr + 1/2 radial bins keeps radius_count == nr
                    let centre = 64.0 - (nr as f64 + 0.5) * dr;
                    let g = Geometry::new((64, 64), (centre, centre), 2.0, dr, 1).unwrap();
                    (g, n, n - 2 * kappa)
                })
        }

        proptest! {
            #[test]
            fn every_basis_matrix_is_upper_triangular((g, n, k) in geometry_and_orders()) {
                let m = basis_matrix(&g, n, k).unwrap();
                prop_assert_eq!(m.nrows(), g.radius_count());
                for i in 0..m.nrows() {
                    for j in 0..i {
                        prop_assert_eq!(m[(i, j)], 0.0);
                    }
                    for j in i..m.ncols() {
                        prop_assert!(m[(i, j)].is_finite());
                    }
                }
            }
        }
    }
}
