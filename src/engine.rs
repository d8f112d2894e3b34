//! Derivative-free trust-region optimization driven by interpolation models.
//!
//! The optimizer keeps a set of points at which the objective has been
//! evaluated and a quadratic model that interpolates it there. Each
//! iteration either takes a trust-region step on the model, repairs the
//! geometry of the interpolation set, or lowers the resolution parameter
//! that controls how small the steps are allowed to become. Termination is
//! reached when the resolution falls to its lower bound, plus the usual
//! budget, target value and invalid number exits.
//!
//! # References
//!
//! \[1\] [The NEWUOA software for unconstrained optimization without
//! derivatives](https://link.springer.com/chapter/10.1007/0-387-30065-1_16)
//!
//! \[2\] [PRIMA: Reference Implementation for Powell's methods with
//! Modernization and Amelioration](https://www.libprima.net)

use getset::{CopyGetters, Getters, Setters};
use log::debug;
use nalgebra::{
    convert, storage::Storage, ComplexField, Dyn, IsContiguous, OVector, RealField as _, Vector,
};
use num_traits::{One, Zero};

use crate::core::{Domain, Function, Problem, RealField};
use crate::geometry::geometry_step;
use crate::history::{check_exit, ExitStatus, History, Recent};
use crate::lagrange::Factorization;
use crate::model::{initialize, InitOutcome, ModelState};
use crate::trust::trust_region_step;

/// Options for the [`Newuoa`] optimizer.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct NewuoaOptions<P: Problem> {
    /// Initial value of the resolution parameter and of the trust-region
    /// radius. Default: `1`.
    rhobeg: P::Field,
    /// Final value of the resolution parameter; the run terminates once the
    /// resolution falls to it. Default: `1e-6`.
    rhoend: P::Field,
    /// Number of interpolation points, between `n + 2` and
    /// `(n + 1)(n + 2) / 2`. Default: `2n + 1`.
    npt: Option<usize>,
    /// Budget of objective evaluations. Default: `500n`.
    maxfun: Option<usize>,
    /// Target objective value; the run terminates as soon as a value not
    /// greater than it is seen. Default: negative infinity.
    target: P::Field,
    /// Reduction ratio below which the trust-region radius shrinks.
    /// Default: `0.1`.
    eta1: P::Field,
    /// Reduction ratio above which the trust-region radius may grow.
    /// Default: `0.7`.
    eta2: P::Field,
    /// Contraction factor for the trust-region radius. Default: `0.5`.
    gamma1: P::Field,
    /// Expansion factor for the trust-region radius. Default: `2`.
    gamma2: P::Field,
    /// Capacity of the evaluation history kept in the result. Default: the
    /// evaluation budget.
    maxhist: Option<usize>,
}

impl<P: Problem> Default for NewuoaOptions<P> {
    fn default() -> Self {
        Self {
            rhobeg: convert(1.0),
            rhoend: convert(1e-6),
            npt: None,
            maxfun: None,
            target: convert(f64::NEG_INFINITY),
            eta1: convert(0.1),
            eta2: convert(0.7),
            gamma1: convert(0.5),
            gamma2: convert(2.0),
            maxhist: None,
        }
    }
}

/// Result of an optimization run.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Optimum<T: RealField> {
    /// Best point found.
    #[getset(get = "pub")]
    x: OVector<T, Dyn>,
    /// Objective value at the best point.
    #[getset(get_copy = "pub")]
    fx: T,
    /// Number of objective evaluations spent.
    #[getset(get_copy = "pub")]
    num_eval: usize,
    /// Why the run terminated.
    #[getset(get_copy = "pub")]
    status: ExitStatus,
    /// Evaluated points in chronological order, subject to the history
    /// capacity.
    #[getset(get = "pub")]
    x_history: Vec<OVector<T, Dyn>>,
    /// Objective values matching [`Optimum::x_history`].
    #[getset(get = "pub")]
    fx_history: Vec<T>,
}

/// The NEWUOA optimizer.
///
/// See [module](self) documentation for more details.
pub struct Newuoa<P: Problem> {
    options: NewuoaOptions<P>,
}

impl<P: Problem> Newuoa<P> {
    /// Initializes the optimizer with default options.
    pub fn new() -> Self {
        Self::with_options(NewuoaOptions::default())
    }

    /// Initializes the optimizer with given options.
    pub fn with_options(options: NewuoaOptions<P>) -> Self {
        Self { options }
    }

    /// Gets the options.
    pub fn options(&self) -> &NewuoaOptions<P> {
        &self.options
    }

    /// Runs the optimization from given initial point until one of the
    /// termination tests fires.
    ///
    /// The initial point is moved inside the bounds of the domain first when
    /// it is not feasible. Option values are validated by debug assertions
    /// only; use [`NewuoaDriver`](crate::driver::NewuoaDriver) for checked
    /// construction.
    pub fn minimize<Sx>(&self, f: &P, x0: &Vector<P::Field, Dyn, Sx>) -> Optimum<P::Field>
    where
        P: Function,
        Sx: Storage<P::Field, Dyn> + IsContiguous,
    {
        let o = &self.options;
        let dom = f.domain();
        let n = dom.dim();

        let npt = o.npt.unwrap_or(2 * n + 1);
        let maxfun = o.maxfun.unwrap_or(500 * n);
        let maxhist = o.maxhist.unwrap_or(maxfun);

        let zero = P::Field::zero();
        let one = P::Field::one();
        let half: P::Field = convert(0.5);
        let tenth: P::Field = convert(0.1);
        let onehalf: P::Field = convert(1.5);

        debug_assert!(n >= 1);
        debug_assert!(x0.nrows() == n, "initial point has wrong dimension");
        debug_assert!(npt >= n + 2 && npt <= (n + 1) * (n + 2) / 2);
        debug_assert!(o.rhoend > zero && o.rhobeg >= o.rhoend);
        debug_assert!(o.eta1 >= zero && o.eta1 <= o.eta2 && o.eta2 < one);
        debug_assert!(o.gamma1 > zero && o.gamma1 < one && o.gamma2 > one);
        debug_assert!(maxfun >= npt + 1);
        debug_assert!(maxhist <= maxfun);

        let mut x0 = x0.clone_owned();
        nudge_into_bounds(&dom, &mut x0, o.rhobeg);

        let mut history = History::new(maxhist);
        let init = initialize(f, &x0, npt, o.rhobeg, maxfun, o.target, &mut history);
        let mut nf = init.nf;
        let mut last_x = init.last_x;
        let mut last_f = init.last_f;

        let (mut model, mut fac): (ModelState<P::Field>, Factorization<P::Field>) =
            match init.outcome {
                InitOutcome::Built { model, fac } => (model, fac),
                InitOutcome::Stopped {
                    status,
                    best_x,
                    best_f,
                } => return finish(status, best_x, best_f, last_x, last_f, nf, history),
            };

        let mut rho = o.rhobeg;
        let mut delta = rho;
        let mut dnormsav = Recent::new();
        let mut moderrsav = Recent::new();
        let mut itest = 0;
        let mut status = ExitStatus::IterationLimit;
        let mut short_step: Option<OVector<P::Field, Dyn>> = None;

        // Every iteration evaluates, shrinks the radius or exits, so twice
        // the budget of evaluations bounds the number of iterations.
        'iterations: for _ in 0..2 * maxfun {
            let (mut d, crvmin) =
                trust_region_step(delta, &model.gopt, |v: &OVector<P::Field, Dyn>| {
                    model.hess_mul(v)
                });
            if dom.is_bounded() {
                let mut xtrial = model.best() + &d;
                dom.project(&mut xtrial);
                d = xtrial - model.best();
            }

            let dnorm = delta.min(d.norm());
            let shortd = dnorm < half * rho;

            let mut ratio: P::Field = convert(-f64::MAX);
            let mut replaced = false;

            if shortd {
                debug!("step {} shorter than rho / 2, not evaluating", dnorm);
                delta = tenth * delta;
                if delta <= onehalf * rho {
                    delta = rho;
                }
                short_step = Some(d);
            } else {
                short_step = None;
                dnormsav.push(dnorm);

                let x = model.best() + &d;
                let fx = f.apply(&x);
                nf += 1;
                history.record(&x, fx);
                last_x = x;
                last_f = fx;
                debug!("trust-region step: evaluation #{} gave f = {}", nf, fx);

                if let Some(s) = check_exit(nf, maxfun, o.target, &last_x, fx) {
                    status = s;
                    break 'iterations;
                }

                let qred = -model.quad_inc(&d);
                let moderr = fx - model.fopt() + qred;
                moderrsav.push(moderr);

                ratio = if qred.is_finite() && qred > zero {
                    (model.fopt() - fx) / qred
                } else {
                    convert(-f64::MAX)
                };

                delta = trrad(delta, dnorm, o.eta1, o.eta2, o.gamma1, o.gamma2, ratio);
                if delta <= onehalf * rho {
                    delta = rho;
                }

                let ximproved = fx < model.fopt();
                let (vlag, beta) = fac.vlag_beta(&model, &d);
                let knew = fac.choose_drop(&model, beta, &vlag, delta, rho, ximproved);
                debug_assert!(
                    !(ratio > zero) || knew.is_some(),
                    "a step that reduced the objective was not admitted into the set"
                );

                if let Some(knew) = knew {
                    if fac.update(knew, beta, &vlag) {
                        let rep = model.update_xf(knew, &d, fx);
                        model.update_quadratic_model(knew, &d, moderr, &rep, &fac);
                        replaced = true;

                        if delta <= rho {
                            itest = model.try_alternative_model(ratio, itest, &fac);
                        }
                    }
                }
            }

            // Distance of the most remote interpolation point from the best
            // one decides whether the set needs a geometry repair.
            let mut knew_far = 0;
            let mut distsq_max = zero;
            for k in 0..model.npt() {
                let distsq = (model.point(k) - model.xopt()).norm_squared();
                if distsq > distsq_max {
                    distsq_max = distsq;
                    knew_far = k;
                }
            }

            let close_set = distsq_max <= convert::<_, P::Field>(4.0) * delta * delta;
            let errbd = convert::<_, P::Field>(0.125) * crvmin * rho * rho;
            let accurate_model =
                moderrsav.all(|e| e.abs() <= errbd) && dnormsav.all(|dn| dn <= rho);
            let bad_step = shortd || !(ratio > zero) || !replaced;
            let small_radius = delta.max(dnorm) <= rho;
            let reduce_rho =
                (shortd && accurate_model) || (bad_step && close_set && small_radius);
            let bad_step_weak = shortd || !(ratio > tenth) || !replaced;
            let improve_geometry = !reduce_rho && bad_step_weak && !close_set;

            if improve_geometry {
                let delbar = (tenth * distsq_max.sqrt()).min(half * delta).max(rho);
                let mut d = geometry_step(knew_far, delbar, &model, &fac);
                if dom.is_bounded() {
                    let mut xtrial = model.best() + &d;
                    dom.project(&mut xtrial);
                    d = xtrial - model.best();
                }
                debug!(
                    "geometry repair: moving point {} by a step of length {}",
                    knew_far,
                    d.norm()
                );

                let x = model.best() + &d;
                let fx = f.apply(&x);
                nf += 1;
                history.record(&x, fx);
                last_x = x;
                last_f = fx;

                if let Some(s) = check_exit(nf, maxfun, o.target, &last_x, fx) {
                    status = s;
                    break 'iterations;
                }

                let qred = -model.quad_inc(&d);
                let moderr = fx - model.fopt() + qred;
                moderrsav.push(moderr);
                dnormsav.push(delbar.min(d.norm()));

                let (vlag, beta) = fac.vlag_beta(&model, &d);
                if fac.update(knew_far, beta, &vlag) {
                    let rep = model.update_xf(knew_far, &d, fx);
                    model.update_quadratic_model(knew_far, &d, moderr, &rep, &fac);
                }
            }

            if reduce_rho {
                if rho <= o.rhoend {
                    status = ExitStatus::SmallTrustRadius;
                    break 'iterations;
                }

                let next = redrho(rho, o.rhoend);
                delta = (half * rho).max(next);
                debug!("resolution reduced from {} to {}", rho, next);
                rho = next;
                dnormsav.reset();
                moderrsav.reset();
            }

            if model.xopt().norm_squared() >= convert::<_, P::Field>(1e3) * delta * delta {
                model.shift_base(&mut fac);
            }
        }

        // The run ended while a short step was pending. Spending one more
        // evaluation on it is cheap and sometimes improves the result.
        if status == ExitStatus::SmallTrustRadius && nf < maxfun {
            if let Some(d) = short_step {
                let x = model.best() + &d;
                let fx = f.apply(&x);
                nf += 1;
                history.record(&x, fx);
                last_x = x;
                last_f = fx;
            }
        }

        finish(status, model.best(), model.fopt(), last_x, last_f, nf, history)
    }
}

impl<P: Problem> Default for Newuoa<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the winner between the best point of the interpolation set and the
/// very last evaluation and assembles the result. Ties and NaN favour the
/// best-known point.
fn finish<T: RealField>(
    status: ExitStatus,
    best_x: OVector<T, Dyn>,
    best_f: T,
    last_x: OVector<T, Dyn>,
    last_f: T,
    nf: usize,
    history: History<T>,
) -> Optimum<T> {
    let (x, fx) = if !last_f.is_nan() && last_f < best_f {
        (last_x, last_f)
    } else {
        (best_x, best_f)
    };

    let (x_history, fx_history) = history.into_chronological();
    debug_assert!(fx.is_nan() || fx_history.iter().all(|f| !(*f < fx)));

    Optimum {
        x,
        fx,
        num_eval: nf,
        status,
        x_history,
        fx_history,
    }
}

/// Updates the trust-region radius from the reduction ratio of the last
/// step.
fn trrad<T: RealField>(delta: T, dnorm: T, eta1: T, eta2: T, gamma1: T, gamma2: T, ratio: T) -> T {
    if ratio <= eta1 {
        gamma1 * dnorm
    } else if ratio <= eta2 {
        (gamma1 * delta).max(dnorm)
    } else {
        (gamma1 * delta).max(gamma2 * dnorm)
    }
}

/// Next value of the resolution parameter.
///
/// The reduction schedule is a tenth of the current value far from the
/// floor, the geometric mean of the current value and the floor in the
/// middle range, and the floor itself once it is close.
fn redrho<T: RealField>(rho: T, rhoend: T) -> T {
    let r = rho / rhoend;
    if r <= convert(16.0) {
        rhoend
    } else if r <= convert(250.0) {
        (rho * rhoend).sqrt()
    } else {
        convert::<_, T>(0.1) * rho
    }
}

/// Moves the initial point far enough inside the bounds that the whole
/// initial interpolation set fits into the domain.
fn nudge_into_bounds<T: RealField>(dom: &Domain<T>, x: &mut OVector<T, Dyn>, rhobeg: T) {
    if !dom.is_bounded() {
        return;
    }

    let half: T = convert(0.5);
    for i in 0..dom.dim() {
        let l = dom.lower()[i];
        let u = dom.upper()[i];

        if l.is_finite() && u.is_finite() && u - l <= rhobeg + rhobeg {
            x[i] = half * (l + u);
            continue;
        }

        if l.is_finite() && x[i] < l + rhobeg {
            x[i] = l + rhobeg;
        } else if u.is_finite() && x[i] > u - rhobeg {
            x[i] = u - rhobeg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::{dvector, Dyn, IsContiguous, Vector};

    use crate::testing::{ExtendedRosenbrock, Sphere};

    #[test]
    fn sphere_converges_to_the_minimum() {
        let f = Sphere::with_center(vec![5.0, 4.0]);
        let optimum = Newuoa::new().minimize(&f, &dvector![0.0, 0.0]);

        assert_eq!(optimum.status(), ExitStatus::SmallTrustRadius);
        assert_abs_diff_eq!(optimum.x()[0], 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(optimum.x()[1], 4.0, epsilon = 1e-4);
        assert!(optimum.fx() < 1e-8);
        assert!(optimum.num_eval() <= 1000);
    }

    #[test]
    fn rosenbrock_converges_to_the_minimum() {
        let f = ExtendedRosenbrock::new(2);
        let optimum = Newuoa::new().minimize(&f, &dvector![-1.2, 1.0]);

        assert_eq!(optimum.status(), ExitStatus::SmallTrustRadius);
        assert_abs_diff_eq!(optimum.x()[0], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(optimum.x()[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn bound_constraint_is_respected() {
        struct BoundedSphere(Sphere);

        impl Problem for BoundedSphere {
            type Field = f64;

            fn domain(&self) -> Domain<Self::Field> {
                Domain::rect(
                    vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
                    vec![f64::INFINITY, 4.5],
                )
            }
        }

        impl Function for BoundedSphere {
            fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
            where
                Sx: Storage<Self::Field, Dyn> + IsContiguous,
            {
                self.0.apply(x)
            }
        }

        let f = BoundedSphere(Sphere::with_center(vec![5.0, 4.0]));
        let optimum = Newuoa::new().minimize(&f, &dvector![0.0, 0.0]);

        assert!(optimum.x()[1] <= 4.5 + 1e-12);
        assert_abs_diff_eq!(optimum.x()[0], 5.0, epsilon = 1e-3);
        assert_abs_diff_eq!(optimum.x()[1], 4.5, epsilon = 1e-3);
        assert_abs_diff_eq!(optimum.fx(), 0.25, epsilon = 1e-3);
    }

    #[test]
    fn nan_objective_stops_immediately() {
        struct Nan;

        impl Problem for Nan {
            type Field = f64;

            fn domain(&self) -> Domain<Self::Field> {
                Domain::unconstrained(2)
            }
        }

        impl Function for Nan {
            fn apply<Sx>(&self, _x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
            where
                Sx: Storage<Self::Field, Dyn> + IsContiguous,
            {
                f64::NAN
            }
        }

        let optimum = Newuoa::new().minimize(&Nan, &dvector![1.0, 2.0]);

        assert_eq!(optimum.status(), ExitStatus::NanInfF);
        assert_eq!(optimum.num_eval(), 1);
        assert_eq!(optimum.x(), &dvector![1.0, 2.0]);
        assert!(optimum.fx().is_nan());
    }

    #[test]
    fn budget_is_respected_exactly() {
        let f = Sphere::with_center(vec![5.0, 4.0]);
        let mut options = NewuoaOptions::default();
        options.set_maxfun(Some(6));
        let optimum = Newuoa::with_options(options).minimize(&f, &dvector![0.0, 0.0]);

        assert_eq!(optimum.status(), ExitStatus::BudgetExhausted);
        assert_eq!(optimum.num_eval(), 6);
        assert_eq!(optimum.fx_history().len(), 6);
    }

    #[test]
    fn target_value_terminates_the_run() {
        let f = Sphere::with_center(vec![5.0, 4.0]);
        let mut options = NewuoaOptions::default();
        options.set_target(1.0);
        let optimum = Newuoa::with_options(options).minimize(&f, &dvector![0.0, 0.0]);

        assert_eq!(optimum.status(), ExitStatus::TargetReached);
        assert!(optimum.fx() <= 1.0);
    }

    #[test]
    fn result_is_no_worse_than_any_recorded_evaluation() {
        let f = ExtendedRosenbrock::new(2);
        let optimum = Newuoa::new().minimize(&f, &dvector![-1.2, 1.0]);

        assert_eq!(optimum.x_history().len(), optimum.num_eval());
        let min = optimum
            .fx_history()
            .iter()
            .fold(f64::INFINITY, |acc, f| acc.min(*f));
        assert!(optimum.fx() <= min);
    }

    #[test]
    fn history_capacity_is_honoured() {
        let f = Sphere::with_center(vec![5.0, 4.0]);

        let mut options = NewuoaOptions::default();
        options.set_maxhist(Some(0));
        let optimum = Newuoa::with_options(options).minimize(&f, &dvector![0.0, 0.0]);
        assert!(optimum.x_history().is_empty());
        assert!(optimum.fx_history().is_empty());

        let mut options = NewuoaOptions::<Sphere>::default();
        options.set_maxhist(Some(5));
        let optimum = Newuoa::with_options(options).minimize(&f, &dvector![0.0, 0.0]);
        assert_eq!(optimum.x_history().len(), 5);
        assert_eq!(optimum.fx_history().len(), 5);
    }
}
