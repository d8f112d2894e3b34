//! Abstractions for defining objective functions.

use nalgebra::{storage::Storage, Dyn, IsContiguous, Vector};

use super::domain::Domain;

/// The base trait for [`Function`].
pub trait Problem {
    /// Type of the field, usually f32 or f64.
    type Field: RealField;

    /// Get the domain (dimension and bound constraints) of the problem.
    fn domain(&self) -> Domain<Self::Field>;
}

/// The trait for defining objective functions.
///
/// ## Defining a function
///
/// A function is any type that implements [`Function`] and [`Problem`] traits.
///
/// ```rust
/// use newuoa::nalgebra as na;
/// use newuoa::{Domain, Function, Problem};
/// use na::{Dyn, IsContiguous};
///
/// struct Rosenbrock {
///     a: f64,
///     b: f64,
/// }
///
/// impl Problem for Rosenbrock {
///     type Field = f64;
///
///     fn domain(&self) -> Domain<Self::Field> {
///         Domain::unconstrained(2)
///     }
/// }
///
/// impl Function for Rosenbrock {
///     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
///     where
///         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
///     {
///         (self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2)
///     }
/// }
/// ```
///
/// The function value is allowed to be NaN or infinite; the optimizer detects
/// such values and terminates with an appropriate status instead of crashing.
pub trait Function: Problem {
    /// Calculate the function value given values of the variables.
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous;
}

/// Extension of [`nalgebra::RealField`] with constants that are used
/// throughout the crate.
pub trait RealField: nalgebra::RealField + Copy {
    /// Machine epsilon.
    const EPSILON: Self;
    /// Square root of machine epsilon.
    const EPSILON_SQRT: Self;

    /// Tests whether the value is NaN.
    fn is_nan(self) -> bool;
}

impl RealField for f32 {
    const EPSILON: Self = f32::EPSILON;
    const EPSILON_SQRT: Self = 0.00034526698;

    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
}

impl RealField for f64 {
    const EPSILON: Self = f64::EPSILON;
    const EPSILON_SQRT: Self = 0.000000014901161193847656;

    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
}
