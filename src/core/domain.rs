//! Problem domain definition such as bound constraints for variables.

use std::iter::FromIterator;

use nalgebra::{convert, storage::StorageMut, Dim, DimName, Dyn, OVector, RealField, Vector, U1};

/// Domain for a problem.
#[derive(Debug, Clone)]
pub struct Domain<T: RealField + Copy> {
    lower: OVector<T, Dyn>,
    upper: OVector<T, Dyn>,
}

impl<T: RealField + Copy> Domain<T> {
    /// Creates unconstrained domain with given dimension.
    pub fn unconstrained(dim: usize) -> Self {
        assert!(dim > 0, "empty domain");

        let inf: T = convert(f64::INFINITY);
        let n = Dyn(dim);

        Self {
            lower: OVector::from_element_generic(n, U1::name(), -inf),
            upper: OVector::from_element_generic(n, U1::name(), inf),
        }
    }

    /// Creates rectangular domain with given bounds.
    ///
    /// Positive and negative infinity can be used to indicate value unbounded
    /// in that dimension and direction. If the entire domain is unconstrained,
    /// use [`Domain::unconstrained`] instead.
    pub fn rect(lower: Vec<T>, upper: Vec<T>) -> Self {
        assert!(
            lower.len() == upper.len(),
            "lower and upper have different size"
        );

        let dim = lower.len();
        assert!(dim > 0, "empty domain");

        let n = Dyn(dim);

        Self {
            lower: OVector::from_vec_generic(n, U1::name(), lower),
            upper: OVector::from_vec_generic(n, U1::name(), upper),
        }
    }

    /// Gets the dimension of the domain.
    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// Gets the lower bounds.
    pub fn lower(&self) -> &OVector<T, Dyn> {
        &self.lower
    }

    /// Gets the upper bounds.
    pub fn upper(&self) -> &OVector<T, Dyn> {
        &self.upper
    }

    /// Determines whether the domain actually constrains any variable.
    pub fn is_bounded(&self) -> bool {
        self.lower.iter().any(|l| l.is_finite()) || self.upper.iter().any(|u| u.is_finite())
    }

    /// Projects given point into the domain.
    ///
    /// Returns true if the point was not feasible and had to be clipped.
    pub fn project<D, Sx>(&self, x: &mut Vector<T, D, Sx>) -> bool
    where
        D: Dim,
        Sx: StorageMut<T, D>,
    {
        let mut not_feasible = false;

        self.lower
            .iter()
            .zip(self.upper.iter())
            .zip(x.iter_mut())
            .for_each(|((li, ui), xi)| {
                if &*xi < li {
                    *xi = *li;
                    not_feasible = true;
                } else if &*xi > ui {
                    *xi = *ui;
                    not_feasible = true;
                }
            });

        not_feasible
    }
}

impl<T: RealField + Copy> FromIterator<(T, T)> for Domain<T> {
    fn from_iter<I: IntoIterator<Item = (T, T)>>(iter: I) -> Self {
        let (lower, upper): (Vec<_>, Vec<_>) = iter.into_iter().unzip();
        Self::rect(lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection() {
        let dom = Domain::rect(vec![0.0, -1.0], vec![1.0, 1.0]);

        let mut x = nalgebra::dvector![0.5, 0.0];
        assert!(!dom.project(&mut x));
        assert_eq!(x.as_slice(), &[0.5, 0.0]);

        let mut x = nalgebra::dvector![2.0, -3.0];
        assert!(dom.project(&mut x));
        assert_eq!(x.as_slice(), &[1.0, -1.0]);
    }

    #[test]
    fn unconstrained_is_not_bounded() {
        assert!(!Domain::<f64>::unconstrained(3).is_bounded());
        assert!(Domain::rect(vec![f64::NEG_INFINITY], vec![4.5]).is_bounded());
    }
}
