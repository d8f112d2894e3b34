#![allow(clippy::many_single_char_names)]
#![warn(missing_docs)]

//! # Newuoa
//!
//! A pure Rust implementation of Powell's NEWUOA method for derivative-free
//! unconstrained optimization, with first-class support for simple bound
//! constraints on the variables.
//!
//! The method maintains a quadratic model that interpolates the objective on
//! a set of sample points and minimizes the model within a trust region. No
//! derivatives are ever requested from the objective, which makes the method
//! suitable for noisy simulations, black-box codes and legacy programs. The
//! model is updated after every evaluation at the cost of a few matrix-vector
//! products, so the method spends very few objective evaluations compared to
//! direct-search techniques.
//!
//! ## Problem
//!
//! A problem is defined by implementing the [`Problem`] and [`Function`]
//! traits: the former declares the [domain](Domain) of the variables, the
//! latter computes the objective value.
//!
//! ```rust
//! use newuoa::nalgebra as na;
//! use newuoa::{Domain, Function, Problem};
//! use na::{Dyn, IsContiguous};
//!
//! struct Rosenbrock {
//!     a: f64,
//!     b: f64,
//! }
//!
//! impl Problem for Rosenbrock {
//!     type Field = f64;
//!
//!     fn domain(&self) -> Domain<Self::Field> {
//!         Domain::unconstrained(2)
//!     }
//! }
//!
//! impl Function for Rosenbrock {
//!     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//!     where
//!         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//!     {
//!         (self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2)
//!     }
//! }
//! ```
//!
//! ## Running the optimization
//!
//! The easiest way is to use the [driver](NewuoaDriver):
//!
//! ```rust
//! use newuoa::{ExitStatus, NewuoaDriver};
//! # use newuoa::nalgebra as na;
//! # use newuoa::{Domain, Function, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct Rosenbrock {
//! #     a: f64,
//! #     b: f64,
//! # }
//! #
//! # impl Problem for Rosenbrock {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::unconstrained(2)
//! #     }
//! # }
//! #
//! # impl Function for Rosenbrock {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         (self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2)
//! #     }
//! # }
//!
//! let f = Rosenbrock { a: 1.0, b: 100.0 };
//!
//! let mut driver = newuoa::NewuoaDriver::builder(&f)
//!     .with_initial(vec![-1.2, 1.0])
//!     .build()
//!     .unwrap();
//!
//! let optimum = driver.minimize();
//! assert_eq!(optimum.status(), ExitStatus::SmallTrustRadius);
//! assert!(optimum.fx() < 1e-6);
//! ```
//!
//! The [`Newuoa`] type offers the same functionality without the validation
//! and defaulting conveniences of the driver.
//!
//! ## References
//!
//! \[1\] [The NEWUOA software for unconstrained optimization without
//! derivatives](https://link.springer.com/chapter/10.1007/0-387-30065-1_16)
//!
//! \[2\] [Least Frobenius norm updating of quadratic models that satisfy
//! interpolation conditions](https://link.springer.com/article/10.1007/s10107-003-0490-7)
//!
//! \[3\] [PRIMA: Reference Implementation for Powell's methods with
//! Modernization and Amelioration](https://www.libprima.net)

mod core;
pub mod driver;
pub mod engine;
mod geometry;
mod history;
mod lagrange;
mod model;
mod trust;

pub use core::*;
pub use driver::{NewuoaBuilder, NewuoaDriver, OptionsError};
pub use engine::{Newuoa, NewuoaOptions, Optimum};
pub use history::ExitStatus;

pub mod testing;

/// Re-export of [nalgebra](https://docs.rs/nalgebra) types used in the public
/// interface.
pub use nalgebra;
