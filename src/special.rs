//! Scalar special functions backing the basis-matrix builders.
//!
//! Everything here is a pure function of its numeric arguments; the
//! hypergeometric evaluation is the only one that can fail, and it reports
//! the reason as a plain string which the caller wraps with order context.

use std::f64::consts::PI;

/// Falling factorial x·(x−1)·…·(x−m+1); the empty product for m = 0.
pub fn falling_factorial(x: f64, m: u32) -> f64 {
    let mut prod = 1.0;
    for j in 0..m {
        prod *= x - j as f64;
    }
    prod
}

pub(crate) fn factorial(n: u32) -> f64 {
    (2..=n).fold(1.0, |acc, v| acc * v as f64)
}

/// Legendre polynomial P_k(x) by the three-term recurrence
/// k·P_k = (2k−1)·x·P_{k−1} − (k−1)·P_{k−2}.
pub fn legendre_p(k: usize, x: f64) -> f64 {
    if k == 0 {
        return 1.0;
    }
    let mut pm2 = 1.0;
    let mut pm1 = x;
    for j in 2..=k {
        let jf = j as f64;
        let p = ((2.0 * jf - 1.0) * x * pm1 - (jf - 1.0) * pm2) / jf;
        pm2 = pm1;
        pm1 = p;
    }
    pm1
}

/// ln Γ(x), Lanczos approximation (g = 7, n = 9), reflected for x < 1/2.
///
/// Only meaningful where Γ(x) > 0; the Gauss-summation caller below ensures
/// that by working with strictly positive arguments.
pub(crate) fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Γ(x) = π / (sin(πx) · Γ(1−x))
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    const COEFFICIENTS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    const G: f64 = 7.0;
    let z = x - 1.0;
    let mut ag = COEFFICIENTS[0];
    for (i, c) in COEFFICIENTS.iter().enumerate().skip(1) {
        ag += c / (z + i as f64);
    }
    let t = z + G + 0.5;
    0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + ag.ln()
}

/// Gauss hypergeometric ₂F₁(a, b; c; x) on 0 ≤ x ≤ 1.
///
/// The power series handles x < 1; at x = 1 (the clamped diagonal entries)
/// the series degenerates, so the Gauss summation theorem
/// ₂F₁(a,b;c;1) = Γ(c)Γ(c−a−b) / (Γ(c−a)Γ(c−b)) takes over.
pub(crate) fn gauss_2f1(a: f64, b: f64, c: f64, x: f64) -> Result<f64, String> {
    if !(0.0..=1.0).contains(&x) {
        return Err(format!("2F1 argument {x} outside [0, 1]"));
    }
    if c <= 0.0 && (c - c.round()).abs() < 1e-12 {
        return Err(format!("2F1 parameter c = {c} is a non-positive integer"));
    }
    if x == 1.0 {
        let s = c - a - b;
        for (name, v) in [("c", c), ("c-a-b", s), ("c-a", c - a), ("c-b", c - b)] {
            if v <= 0.0 {
                return Err(format!("Gauss summation needs {name} > 0, got {v}"));
            }
        }
        return Ok((ln_gamma(c) + ln_gamma(s) - ln_gamma(c - a) - ln_gamma(c - b)).exp());
    }

    const MAX_TERMS: usize = 500_000;
    let mut term = 1.0;
    let mut sum = 1.0;
    for j in 0..MAX_TERMS {
        let jf = j as f64;
        term *= (a + jf) * (b + jf) / (c + jf) * x / (jf + 1.0);
        sum += term;
        if term.abs() <= f64::EPSILON * sum.abs() {
            return Ok(sum);
        }
    }
    Err(format!(
        "2F1({a}, {b}; {c}; {x}) did not converge in {MAX_TERMS} terms"
    ))
}
