//! Evaluation history and termination bookkeeping.

use nalgebra::{convert, storage::Storage, ComplexField, Dyn, OVector, Vector};

use crate::core::RealField;

/// Status with which an optimization run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The resolution parameter reached its lower bound. This is the normal
    /// way of finishing a successful run.
    SmallTrustRadius,
    /// The budget of objective evaluations was exhausted.
    BudgetExhausted,
    /// A function value not greater than the target was found.
    TargetReached,
    /// NaN or infinity occurred in a candidate point.
    NanInfX,
    /// The objective returned NaN or infinity.
    NanInfF,
    /// The cap on trust-region iterations was hit. Practically unreachable,
    /// since every iteration either evaluates, shrinks the radius or exits.
    IterationLimit,
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ExitStatus::SmallTrustRadius => "the trust-region radius reached its lower bound",
            ExitStatus::BudgetExhausted => "the budget of function evaluations was exhausted",
            ExitStatus::TargetReached => "the target function value was reached",
            ExitStatus::NanInfX => "NaN or infinity occurred in a candidate point",
            ExitStatus::NanInfF => "the function returned NaN or infinity",
            ExitStatus::IterationLimit => "the trust-region iteration cap was hit",
        };
        f.write_str(msg)
    }
}

/// Decides whether the run must stop right after an evaluation.
///
/// The checks are ordered: invalid point, invalid value, target reached,
/// budget exhausted.
pub(crate) fn check_exit<T: RealField, Sx>(
    nf: usize,
    maxfun: usize,
    target: T,
    x: &Vector<T, Dyn, Sx>,
    f: T,
) -> Option<ExitStatus>
where
    Sx: Storage<T, Dyn>,
{
    if x.iter().any(|xi| !xi.is_finite()) {
        return Some(ExitStatus::NanInfX);
    }
    if f.is_nan() || f == convert(f64::INFINITY) {
        return Some(ExitStatus::NanInfF);
    }
    if f <= target {
        return Some(ExitStatus::TargetReached);
    }
    if nf >= maxfun {
        return Some(ExitStatus::BudgetExhausted);
    }
    None
}

/// Sliding window over the few most recent values of a quantity.
///
/// Used for the last step norms and model errors observed for the current
/// value of the resolution parameter.
#[derive(Debug, Clone)]
pub(crate) struct Recent<T> {
    vals: [T; 3],
}

impl<T: RealField> Recent<T> {
    pub(crate) fn new() -> Self {
        Self {
            vals: [convert(f64::INFINITY); 3],
        }
    }

    /// Pushes a new value, dropping the oldest one.
    pub(crate) fn push(&mut self, val: T) {
        self.vals = [self.vals[1], self.vals[2], val];
    }

    /// Forgets all recorded values by resetting them to the infinite sentinel.
    pub(crate) fn reset(&mut self) {
        self.vals = [convert(f64::INFINITY); 3];
    }

    /// Tests whether all recorded values satisfy the predicate.
    pub(crate) fn all<P: Fn(T) -> bool>(&self, pred: P) -> bool {
        self.vals.iter().all(|v| pred(*v))
    }
}

/// Bounded history of evaluated points and their function values.
///
/// The buffers are circular: when the capacity is exceeded, the oldest entry
/// is overwritten. [`History::into_chronological`] restores chronological
/// order once, at the end of the run. Capacity zero records nothing.
#[derive(Debug, Clone)]
pub(crate) struct History<T: RealField> {
    capacity: usize,
    xs: Vec<OVector<T, Dyn>>,
    fs: Vec<T>,
    /// Index of the slot that the next record overwrites.
    head: usize,
}

impl<T: RealField> History<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            xs: Vec::with_capacity(capacity.min(1024)),
            fs: Vec::with_capacity(capacity.min(1024)),
            head: 0,
        }
    }

    pub(crate) fn record<Sx>(&mut self, x: &Vector<T, Dyn, Sx>, f: T)
    where
        Sx: Storage<T, Dyn>,
    {
        if self.capacity == 0 {
            return;
        }

        if self.xs.len() < self.capacity {
            self.xs.push(x.clone_owned());
            self.fs.push(f);
        } else {
            self.xs[self.head].copy_from(x);
            self.fs[self.head] = f;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Consumes the history, returning the records in chronological order.
    pub(crate) fn into_chronological(mut self) -> (Vec<OVector<T, Dyn>>, Vec<T>) {
        if self.xs.len() == self.capacity && self.head > 0 {
            self.xs.rotate_left(self.head);
            self.fs.rotate_left(self.head);
        }
        (self.xs, self.fs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::dvector;

    #[test]
    fn recent_window_shifts() {
        let mut w = Recent::new();
        assert!(w.all(|v: f64| v.is_infinite()));

        w.push(1.0);
        w.push(2.0);
        assert!(!w.all(|v| v.is_finite()));

        w.push(3.0);
        assert!(w.all(|v| v.is_finite()));
        assert!(w.all(|v| v <= 3.0));

        w.push(4.0);
        assert!(!w.all(|v| v <= 3.0));

        w.reset();
        assert!(w.all(|v| v.is_infinite()));
    }

    #[test]
    fn history_overwrites_oldest() {
        let mut hist = History::new(3);
        for i in 0..5 {
            hist.record(&dvector![i as f64], i as f64);
        }

        let (xs, fs) = hist.into_chronological();
        assert_eq!(fs, vec![2.0, 3.0, 4.0]);
        assert_eq!(xs[0][0], 2.0);
        assert_eq!(xs[2][0], 4.0);
    }

    #[test]
    fn history_zero_capacity_records_nothing() {
        let mut hist = History::new(0);
        hist.record(&dvector![1.0], 1.0);

        let (xs, fs) = hist.into_chronological();
        assert!(xs.is_empty());
        assert!(fs.is_empty());
    }

    #[test]
    fn exit_checks_are_ordered() {
        let x = dvector![1.0, 2.0];
        let bad = dvector![f64::NAN, 2.0];

        assert_eq!(
            check_exit(0, 10, f64::NEG_INFINITY, &bad, 1.0),
            Some(ExitStatus::NanInfX)
        );
        assert_eq!(
            check_exit(0, 10, f64::NEG_INFINITY, &x, f64::NAN),
            Some(ExitStatus::NanInfF)
        );
        assert_eq!(
            check_exit(0, 10, 2.0, &x, 1.0),
            Some(ExitStatus::TargetReached)
        );
        assert_eq!(
            check_exit(10, 10, f64::NEG_INFINITY, &x, 1.0),
            Some(ExitStatus::BudgetExhausted)
        );
        assert_eq!(check_exit(3, 10, f64::NEG_INFINITY, &x, 1.0), None);
    }
}
