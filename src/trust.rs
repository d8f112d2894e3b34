//! Approximate solver for the trust-region subproblem.
//!
//! The quadratic model is minimized within a ball around the best point by
//! the truncated conjugate gradient method. The iteration follows the model
//! downhill and stops early when it hits the boundary of the region or runs
//! into a direction of nonpositive curvature, which is all the accuracy the
//! outer loop needs.
//!
//! # References
//!
//! \[1\] [The conjugate gradient method and trust regions in large scale
//! optimization](https://epubs.siam.org/doi/10.1137/0720042)

use nalgebra::{convert, DimName, Dyn, OVector, U1};
use num_traits::{One, Zero};

use crate::core::RealField;

/// Minimizes `g^T d + 0.5 d^T H d` over `|d| <= delta`, with the Hessian
/// available only through matrix-vector products.
///
/// Returns the step together with the least curvature of the model observed
/// along the searched directions. The curvature is reported as zero whenever
/// the step ends on the boundary, so a positive value certifies that the
/// model was convex on the whole searched subspace.
pub(crate) fn trust_region_step<T, H>(
    delta: T,
    gopt: &OVector<T, Dyn>,
    hess_mul: H,
) -> (OVector<T, Dyn>, T)
where
    T: RealField,
    H: Fn(&OVector<T, Dyn>) -> OVector<T, Dyn>,
{
    let n = gopt.nrows();
    let zero = T::zero();

    let mut d = OVector::zeros_generic(Dyn(n), U1::name());
    let gsq0 = gopt.norm_squared();
    if !gsq0.is_finite() || gsq0 == zero {
        return (d, zero);
    }

    let mut g = gopt.clone_owned();
    let mut gsq = gsq0;
    let mut p = -g.clone();
    let mut crvmin: T = convert(f64::INFINITY);
    let mut on_boundary = false;

    // Relative gradient tolerance of 1e-2, squared.
    let tol = convert::<_, T>(1e-4) * gsq0;

    for _ in 0..2 * n {
        let hp = hess_mul(&p);
        let php = p.dot(&hp);
        let psq = p.norm_squared();
        if !php.is_finite() || psq == zero {
            break;
        }

        if php <= zero {
            // Nonpositive curvature, follow the direction to the boundary.
            let alpha = boundary_step(&d, &p, delta);
            d.axpy(alpha, &p, T::one());
            on_boundary = true;
            break;
        }

        crvmin = crvmin.min(php / psq);

        let alpha = gsq / php;
        let dp = d.dot(&p);
        let dsq = d.norm_squared();
        if dsq + alpha * (dp + dp) + alpha * alpha * psq >= delta * delta {
            let alpha = boundary_step(&d, &p, delta);
            d.axpy(alpha, &p, T::one());
            on_boundary = true;
            break;
        }

        d.axpy(alpha, &p, T::one());
        g.axpy(alpha, &hp, T::one());

        let gsq_new = g.norm_squared();
        if !gsq_new.is_finite() || gsq_new <= tol {
            break;
        }

        let beta = gsq_new / gsq;
        gsq = gsq_new;
        p *= beta;
        p -= &g;
    }

    if on_boundary || !crvmin.is_finite() {
        crvmin = zero;
    }

    (d, crvmin)
}

/// Positive root of `|d + alpha * p| = delta`.
///
/// Uses the form of the quadratic formula that avoids cancellation, so the
/// result stays accurate when the root is small.
fn boundary_step<T: RealField>(d: &OVector<T, Dyn>, p: &OVector<T, Dyn>, delta: T) -> T {
    let a = p.norm_squared();
    if a == T::zero() || !a.is_finite() {
        return T::zero();
    }

    let b = d.dot(p);
    // Nonnegative whenever d lies inside the region.
    let c = delta * delta - d.norm_squared();
    let disc = (b * b + a * c).sqrt();

    if b <= T::zero() {
        (disc - b) / a
    } else {
        c / (disc + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::{dvector, DMatrix};

    #[test]
    fn interior_solution_is_the_newton_step() {
        let h = DMatrix::from_diagonal(&dvector![2.0, 2.0]);
        let g = dvector![2.0, -4.0];

        let (d, crvmin) = trust_region_step(10.0, &g, |v| &h * v);

        assert_abs_diff_eq!(d, dvector![-1.0, 2.0], epsilon = 1e-6);
        assert_abs_diff_eq!(crvmin, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn reported_curvature_is_bracketed_by_the_eigenvalues() {
        let h = DMatrix::from_diagonal(&dvector![2.0, 4.0]);
        let g = dvector![2.0, -4.0];

        let (d, crvmin) = trust_region_step(10.0, &g, |v| &h * v);

        assert_abs_diff_eq!(d, dvector![-1.0, 1.0], epsilon = 1e-6);
        assert!(crvmin >= 2.0 - 1e-9 && crvmin <= 4.0 + 1e-9);
    }

    #[test]
    fn boundary_solution_has_full_length_and_zero_curvature() {
        let h = DMatrix::from_diagonal(&dvector![2.0, 2.0]);
        let g = dvector![2.0, 0.0];

        let (d, crvmin) = trust_region_step(0.5, &g, |v| &h * v);

        assert_abs_diff_eq!(d.norm(), 0.5, epsilon = 1e-12);
        assert!(d[0] < 0.0);
        assert_eq!(crvmin, 0.0);
    }

    #[test]
    fn negative_curvature_is_followed_to_the_boundary() {
        let h = DMatrix::from_diagonal(&dvector![-2.0, 1.0]);
        let g = dvector![1.0, 0.0];

        let (d, crvmin) = trust_region_step(1.0, &g, |v| &h * v);

        assert_abs_diff_eq!(d.norm(), 1.0, epsilon = 1e-12);
        assert_eq!(crvmin, 0.0);

        // The model value must have decreased.
        let value = g.dot(&d) + 0.5 * (&h * &d).dot(&d);
        assert!(value < 0.0);
    }

    #[test]
    fn zero_gradient_yields_zero_step() {
        let h = DMatrix::from_diagonal(&dvector![1.0, 1.0]);
        let g = dvector![0.0, 0.0];

        let (d, crvmin) = trust_region_step(1.0, &g, |v| &h * v);

        assert_eq!(d.norm(), 0.0);
        assert_eq!(crvmin, 0.0);
    }
}
