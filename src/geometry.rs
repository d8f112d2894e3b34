//! Geometry-improving steps for the interpolation set.
//!
//! When the trust-region steps stall while the interpolation set has drifted
//! far from the best point, the set itself is repaired: the most remote point
//! is moved to a position that makes the set as well poised as possible. A
//! good such position maximizes the magnitude of the Lagrange function of
//! the replaced point, because that magnitude is the dominant term of the
//! updating denominator of the factorization.
//!
//! The maximization is approximate. The Lagrange function is restricted to
//! the plane spanned by its gradient at the best point and the direction of
//! the replaced point, and sampled on a circle of the requested radius
//! within that plane.

use nalgebra::{convert, DimName, Dyn, OVector, U1};
use num_traits::{One, Zero};

use crate::core::RealField;
use crate::lagrange::Factorization;
use crate::model::ModelState;

/// Number of sample directions on the circle.
const SAMPLES: usize = 50;

/// Computes a step of length `delbar` from the best point that gives the
/// interpolation point `knew` a large Lagrange function magnitude at the
/// reached position.
pub(crate) fn geometry_step<T: RealField>(
    knew: usize,
    delbar: T,
    model: &ModelState<T>,
    fac: &Factorization<T>,
) -> OVector<T, Dyn> {
    let n = model.n();
    let npt = model.npt();
    let half: T = convert(0.5);

    let xopt = model.xopt();
    let hcol = fac.omega_col(knew);

    // Gradient of the Lagrange function of knew at the best point.
    let mut glag = OVector::<T, Dyn>::zeros_generic(Dyn(n), U1::name());
    for j in 0..n {
        glag[j] = fac.bmat[(knew, j)];
    }
    for k in 0..npt {
        let t = hcol[k] * model.point(k).dot(xopt);
        if t != T::zero() {
            glag.axpy(t, model.point(k), T::one());
        }
    }

    // Value of the Lagrange function at the best point itself.
    let phi0 = if knew == model.kopt() {
        T::one()
    } else {
        T::zero()
    };

    let lagrange = |u: &OVector<T, Dyn>| {
        let mut val = phi0 + glag.dot(u);
        for k in 0..npt {
            if hcol[k] != T::zero() {
                val += half * hcol[k] * model.point(k).dot(u).powi(2);
            }
        }
        val
    };

    let e1 = unit(&glag, delbar);
    let toward = model.point(knew) - xopt;
    let e2 = e1
        .as_ref()
        .map(|e1| {
            let mut t = toward.clone_owned();
            t.axpy(-toward.dot(e1), e1, T::one());
            t
        })
        .and_then(|t| unit(&t, delbar));

    let (e1, e2) = match (e1, e2) {
        (Some(e1), Some(e2)) => (e1, e2),
        (Some(e1), None) => {
            // The plane degenerated to a line, search it in both directions.
            let fwd = &e1 * delbar;
            let bwd = -&fwd;
            return if lagrange(&fwd).abs() >= lagrange(&bwd).abs() {
                fwd
            } else {
                bwd
            };
        }
        _ => {
            // No usable direction at all; any step of the right length keeps
            // the set from collapsing.
            let mut d = OVector::zeros_generic(Dyn(n), U1::name());
            d[knew % n] = delbar;
            return d;
        }
    };

    let tau: T = convert(2.0 * std::f64::consts::PI);
    let mut best = &e1 * delbar;
    let mut best_val = lagrange(&best).abs();

    for i in 1..SAMPLES {
        let angle = tau * convert::<_, T>(i as f64 / SAMPLES as f64);
        let mut u = &e1 * (delbar * angle.cos());
        u.axpy(delbar * angle.sin(), &e2, T::one());

        let val = lagrange(&u).abs();
        if val > best_val {
            best_val = val;
            best = u;
        }
    }

    best
}

/// Normalizes the vector, rejecting directions too short to be meaningful at
/// the given step scale.
fn unit<T: RealField>(v: &OVector<T, Dyn>, scale: T) -> Option<OVector<T, Dyn>> {
    let norm = v.norm();
    if norm.is_finite() && norm > T::EPSILON_SQRT * scale {
        Some(v / norm)
    } else {
        None
    }
}
