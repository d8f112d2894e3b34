//! High-level API for optimization.
//!
//! The driver encapsulates the optimizer together with a validated set of
//! options and an initial point. The simplest way of using it is to
//! initialize it with the defaults:
//!
//! ```rust
//! use newuoa::NewuoaDriver;
//! # use newuoa::{Domain, Function, Problem};
//! # use newuoa::nalgebra as na;
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct MyFunction;
//! #
//! # impl MyFunction {
//! #     fn new() -> Self {
//! #         Self
//! #     }
//! # }
//! #
//! # impl Problem for MyFunction {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::unconstrained(2)
//! #     }
//! # }
//! #
//! # impl Function for MyFunction {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         (x[0] - 1.0).powi(2) + x[1].powi(2)
//! #     }
//! # }
//!
//! let f = MyFunction::new();
//!
//! let mut driver = NewuoaDriver::new(&f);
//! let optimum = driver.minimize();
//! ```
//!
//! If you need to specify the initial point or other settings, use the
//! builder:
//!
//! ```rust
//! use newuoa::{NewuoaDriver, NewuoaOptions};
//! # use newuoa::{Domain, Function, Problem};
//! # use newuoa::nalgebra as na;
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct MyFunction;
//! #
//! # impl MyFunction {
//! #     fn new() -> Self {
//! #         Self
//! #     }
//! # }
//! #
//! # impl Problem for MyFunction {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::unconstrained(2)
//! #     }
//! # }
//! #
//! # impl Function for MyFunction {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         (x[0] - 1.0).powi(2) + x[1].powi(2)
//! #     }
//! # }
//!
//! let f = MyFunction::new();
//!
//! let mut options = NewuoaOptions::default();
//! options.set_rhoend(1e-8);
//!
//! let mut driver = NewuoaDriver::builder(&f)
//!     .with_initial(vec![10.0, -10.0])
//!     .with_options(options)
//!     .build()
//!     .unwrap();
//! let optimum = driver.minimize();
//! ```

use nalgebra::{convert, DimName, Dyn, OVector, U1};
use num_traits::{One, Zero};
use thiserror::Error;

use crate::core::{Domain, Function, Problem};
use crate::engine::{Newuoa, NewuoaOptions, Optimum};

/// Error returned when the options do not describe a valid run.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// The initial point does not match the dimension of the domain.
    #[error("initial point has {len} variables, but the domain has {dim}")]
    InvalidInitial {
        /// Length of the provided initial point.
        len: usize,
        /// Dimension of the domain.
        dim: usize,
    },
    /// The number of interpolation points is outside the admissible range.
    #[error("number of interpolation points {npt} is outside [{min}, {max}]")]
    InvalidPoints {
        /// Requested number of points.
        npt: usize,
        /// Lowest admissible value, `n + 2`.
        min: usize,
        /// Highest admissible value, `(n + 1)(n + 2) / 2`.
        max: usize,
    },
    /// The resolution bounds do not satisfy `0 < rhoend <= rhobeg`.
    #[error("resolution bounds must satisfy 0 < rhoend <= rhobeg")]
    InvalidResolution,
    /// The ratio thresholds do not satisfy `0 <= eta1 <= eta2 < 1`.
    #[error("ratio thresholds must satisfy 0 <= eta1 <= eta2 < 1")]
    InvalidRatioThresholds,
    /// The radius factors do not satisfy `0 < gamma1 < 1 < gamma2`.
    #[error("radius factors must satisfy 0 < gamma1 < 1 < gamma2")]
    InvalidRadiusFactors,
    /// The evaluation budget does not cover the initial interpolation set.
    #[error("evaluation budget {maxfun} cannot cover npt + 1 = {min} evaluations")]
    InvalidBudget {
        /// Requested budget.
        maxfun: usize,
        /// Lowest admissible value, `npt + 1`.
        min: usize,
    },
    /// The history capacity exceeds the evaluation budget.
    #[error("history capacity {maxhist} exceeds the evaluation budget {maxfun}")]
    InvalidHistory {
        /// Requested capacity.
        maxhist: usize,
        /// The evaluation budget.
        maxfun: usize,
    },
}

/// Builder for the [`NewuoaDriver`].
pub struct NewuoaBuilder<'a, F: Problem> {
    f: &'a F,
    dom: Domain<F::Field>,
    options: NewuoaOptions<F>,
    x0: OVector<F::Field, Dyn>,
}

impl<'a, F: Problem> NewuoaBuilder<'a, F> {
    fn new(f: &'a F) -> Self {
        let dom = f.domain();
        let dim = Dyn(dom.dim());
        let x0 = OVector::from_element_generic(dim, U1::name(), convert(0.0));

        Self {
            f,
            dom,
            options: NewuoaOptions::default(),
            x0,
        }
    }

    /// Sets the initial point from which the run starts.
    pub fn with_initial(mut self, x0: Vec<F::Field>) -> Self {
        self.x0 = OVector::from_vec_generic(Dyn(x0.len()), U1::name(), x0);
        self
    }

    /// Sets the options.
    pub fn with_options(mut self, options: NewuoaOptions<F>) -> Self {
        self.options = options;
        self
    }

    /// Validates the settings and builds the [`NewuoaDriver`].
    pub fn build(mut self) -> Result<NewuoaDriver<'a, F>, OptionsError> {
        let n = self.dom.dim();
        let o = &self.options;
        let zero = F::Field::zero();
        let one = F::Field::one();

        if self.x0.nrows() != n {
            return Err(OptionsError::InvalidInitial {
                len: self.x0.nrows(),
                dim: n,
            });
        }

        let npt = o.npt().unwrap_or(2 * n + 1);
        let (min, max) = (n + 2, (n + 1) * (n + 2) / 2);
        if npt < min || npt > max {
            return Err(OptionsError::InvalidPoints { npt, min, max });
        }

        if !(o.rhoend() > zero && o.rhobeg() >= o.rhoend()) {
            return Err(OptionsError::InvalidResolution);
        }

        if !(o.eta1() >= zero && o.eta1() <= o.eta2() && o.eta2() < one) {
            return Err(OptionsError::InvalidRatioThresholds);
        }

        if !(o.gamma1() > zero && o.gamma1() < one && o.gamma2() > one) {
            return Err(OptionsError::InvalidRadiusFactors);
        }

        let maxfun = o.maxfun().unwrap_or(500 * n);
        if maxfun < npt + 1 {
            return Err(OptionsError::InvalidBudget {
                maxfun,
                min: npt + 1,
            });
        }

        if let Some(maxhist) = o.maxhist() {
            if maxhist > maxfun {
                return Err(OptionsError::InvalidHistory { maxhist, maxfun });
            }
        }

        self.dom.project(&mut self.x0);

        Ok(NewuoaDriver {
            f: self.f,
            optimizer: Newuoa::with_options(self.options),
            x0: self.x0,
        })
    }
}

/// The driver for an optimization run.
///
/// For default settings, use [`NewuoaDriver::new`]. For more flexibility, use
/// [`NewuoaDriver::builder`]. For the usage of the driver, see [module](self)
/// documentation.
pub struct NewuoaDriver<'a, F: Problem> {
    f: &'a F,
    optimizer: Newuoa<F>,
    x0: OVector<F::Field, Dyn>,
}

impl<'a, F: Problem> NewuoaDriver<'a, F> {
    /// Returns the builder for specifying additional settings.
    pub fn builder(f: &'a F) -> NewuoaBuilder<'a, F> {
        NewuoaBuilder::new(f)
    }

    /// Initializes the driver with the default settings.
    pub fn new(f: &'a F) -> Self {
        Self {
            f,
            optimizer: Newuoa::new(),
            x0: NewuoaBuilder::new(f).x0,
        }
    }

    /// Returns reference to the initial point.
    pub fn x0(&self) -> &[F::Field] {
        self.x0.as_slice()
    }
}

impl<'a, F: Function> NewuoaDriver<'a, F> {
    /// Runs the optimization until termination.
    pub fn minimize(&mut self) -> Optimum<F::Field> {
        self.optimizer.minimize(self.f, &self.x0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::history::ExitStatus;
    use crate::testing::Sphere;

    #[test]
    fn defaults_minimize_the_sphere() {
        let f = Sphere::with_center(vec![1.0, -2.0]);
        let mut driver = NewuoaDriver::new(&f);

        let optimum = driver.minimize();
        assert_eq!(optimum.status(), ExitStatus::SmallTrustRadius);
        assert!(optimum.fx() < 1e-8);
    }

    #[test]
    fn builder_accepts_initial_and_options() {
        let f = Sphere::with_center(vec![1.0, -2.0]);

        let mut options = NewuoaOptions::default();
        options.set_rhoend(1e-4).set_maxfun(Some(200));

        let mut driver = NewuoaDriver::builder(&f)
            .with_initial(vec![5.0, 5.0])
            .with_options(options)
            .build()
            .unwrap();

        assert_eq!(driver.x0(), &[5.0, 5.0]);
        let optimum = driver.minimize();
        assert!(optimum.fx() < 1e-4);
        assert!(optimum.num_eval() <= 200);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let f = Sphere::new(2);

        let result = NewuoaDriver::builder(&f).with_initial(vec![0.0]).build();
        assert!(matches!(result, Err(OptionsError::InvalidInitial { .. })));

        let mut options = NewuoaOptions::default();
        options.set_npt(Some(100));
        let result = NewuoaDriver::builder(&f).with_options(options).build();
        assert!(matches!(result, Err(OptionsError::InvalidPoints { .. })));

        let mut options = NewuoaOptions::default();
        options.set_rhoend(2.0);
        let result = NewuoaDriver::builder(&f).with_options(options).build();
        assert!(matches!(result, Err(OptionsError::InvalidResolution)));

        let mut options = NewuoaOptions::default();
        options.set_gamma2(0.5);
        let result = NewuoaDriver::builder(&f).with_options(options).build();
        assert!(matches!(result, Err(OptionsError::InvalidRadiusFactors)));

        let mut options = NewuoaOptions::default();
        options.set_maxfun(Some(3));
        let result = NewuoaDriver::builder(&f).with_options(options).build();
        assert!(matches!(result, Err(OptionsError::InvalidBudget { .. })));

        let mut options = NewuoaOptions::default();
        options.set_maxfun(Some(100)).set_maxhist(Some(1000));
        let result = NewuoaDriver::builder(&f).with_options(options).build();
        assert!(matches!(result, Err(OptionsError::InvalidHistory { .. })));
    }

    #[test]
    fn infeasible_initial_point_is_projected() {
        struct Boxed;

        impl Problem for Boxed {
            type Field = f64;

            fn domain(&self) -> Domain<Self::Field> {
                Domain::rect(vec![-10.0, -10.0], vec![10.0, 10.0])
            }
        }

        impl Function for Boxed {
            fn apply<Sx>(
                &self,
                x: &nalgebra::Vector<Self::Field, Dyn, Sx>,
            ) -> Self::Field
            where
                Sx: nalgebra::storage::Storage<Self::Field, Dyn> + nalgebra::IsContiguous,
            {
                x.norm_squared()
            }
        }

        let driver = NewuoaDriver::builder(&Boxed)
            .with_initial(vec![100.0, -100.0])
            .build()
            .unwrap();

        assert_eq!(driver.x0(), &[10.0, -10.0]);
    }
}
