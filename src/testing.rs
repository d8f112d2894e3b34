//! Testing functions and utilities useful for benchmarking, debugging and
//! smoke testing.
//!
//! [`Sphere`] and [`ExtendedRosenbrock`] are recommended for first tests.
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Numerical Methods for Unconstrained Optimization and Nonlinear
//! Equations](https://epubs.siam.org/doi/book/10.1137/1.9781611971200)

#![allow(unused)]

use nalgebra::{storage::Storage, DVector, Dyn, IsContiguous, OVector, Vector};

use crate::core::{Domain, Function, Problem};

/// Extension of the [`Function`] trait that provides additional information
/// that is useful for testing optimizers.
pub trait TestFunction: Function {
    /// Standard initial values for the problem. Using the same initial values
    /// is essential for fair comparison of methods.
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>>;

    /// A set of global optima, if known and finite. This is mostly just for
    /// information, for example to know how close an optimizer got even if it
    /// failed.
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        Vec::new()
    }
}

/// Sphere function: the sum of squared distances of the variables from a
/// fixed center. Convex, separable and trivially unimodal, which makes it
/// the canonical smoke test.
#[derive(Debug, Clone)]
pub struct Sphere {
    center: Vec<f64>,
}

impl Sphere {
    /// Initializes the function with given dimension, centered at the
    /// origin.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self {
            center: vec![0.0; n],
        }
    }

    /// Initializes the function with the minimum located at given center.
    pub fn with_center(center: Vec<f64>) -> Self {
        assert!(!center.is_empty(), "center must not be empty");
        Self { center }
    }
}

impl Problem for Sphere {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.center.len())
    }
}

impl Function for Sphere {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        x.iter()
            .zip(self.center.iter())
            .map(|(xi, ci)| (xi - ci).powi(2))
            .sum()
    }
}

impl TestFunction for Sphere {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::from_element(self.center.len(), 10.0)]
    }

    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::from_vec(self.center.clone())]
    }
}

/// [Extended Rosenbrock
/// function](https://en.wikipedia.org/wiki/Rosenbrock_function) \[1,2\] (also
/// known as Rosenbrock's valley or banana function).
///
/// The global minimum is inside a long, narrow, parabolic shaped flat valley.
/// The challenge is to find the solution inside the valley.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedRosenbrock {
    n: usize,
}

impl ExtendedRosenbrock {
    /// Initializes the function with given dimension.
    ///
    /// The dimension **must** be a multiple of 2.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        assert!(n % 2 == 0, "n must be a multiple of 2");
        Self { n }
    }
}

impl Problem for ExtendedRosenbrock {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.n)
    }
}

impl Function for ExtendedRosenbrock {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        (0..self.n / 2)
            .map(|i| {
                let x1 = x[2 * i];
                let x2 = x[2 * i + 1];
                100.0 * (x2 - x1 * x1).powi(2) + (1.0 - x1).powi(2)
            })
            .sum()
    }
}

impl TestFunction for ExtendedRosenbrock {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let init1 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { -1.2 } else { 1.0 }),
        );
        let init2 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 6.39 } else { -0.221 }),
        );
        vec![init1, init2]
    }

    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::from_element(self.n, 1.0)]
    }
}
