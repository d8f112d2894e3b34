//! Incremental factorization of the inverse KKT matrix of the
//! least-Frobenius-norm interpolation problem.
//!
//! The interpolation conditions of the quadratic model form a KKT system
//! whose inverse is needed both for updating the model after a point
//! replacement and for measuring how much a candidate replacement improves
//! the geometry of the interpolation set. The inverse is kept in factored
//! form: an explicit rectangular part `bmat` and an implicit part
//! `zmat * diag(s) * zmat^T` with `s = -1` for the first `idz` columns and
//! `+1` for the rest. A point replacement is absorbed by plane rotations and
//! a rank-two correction, which costs O(npt * (n + npt)) instead of a cubic
//! refactorization.
//!
//! # References
//!
//! \[1\] [The NEWUOA software for unconstrained optimization without
//! derivatives](https://link.springer.com/chapter/10.1007/0-387-30065-1_16)
//!
//! \[2\] [Least Frobenius norm updating of quadratic models that satisfy
//! interpolation conditions](https://link.springer.com/article/10.1007/s10107-003-0490-7)

use log::debug;
use nalgebra::{convert, DimName, Dyn, OMatrix, OVector, U1};
use num_traits::{One, Zero};

use crate::core::RealField;
use crate::model::ModelState;

/// Factored inverse of the interpolation KKT matrix.
#[derive(Debug, Clone)]
pub(crate) struct Factorization<T: RealField> {
    /// Explicit part, (npt + n) x n. The first npt rows couple function
    /// values with the gradient block, the last n rows are the symmetric
    /// gradient-gradient block.
    pub(crate) bmat: OMatrix<T, Dyn, Dyn>,
    /// Implicit factor, npt x (npt - n - 1).
    pub(crate) zmat: OMatrix<T, Dyn, Dyn>,
    /// Number of leading columns of `zmat` that carry a negative sign in the
    /// implicit product.
    pub(crate) idz: usize,
}

impl<T: RealField> Factorization<T> {
    pub(crate) fn zeros(n: usize, npt: usize) -> Self {
        Self {
            bmat: OMatrix::zeros_generic(Dyn(npt + n), Dyn(n)),
            zmat: OMatrix::zeros_generic(Dyn(npt), Dyn(npt - n - 1)),
            idz: 0,
        }
    }

    fn npt(&self) -> usize {
        self.zmat.nrows()
    }

    fn n(&self) -> usize {
        self.bmat.ncols()
    }

    /// Computes `Z diag(s) Z^T e_k`, the k-th column of the implicit part.
    pub(crate) fn omega_col(&self, k: usize) -> OVector<T, Dyn> {
        let npt = self.npt();
        let mut col = OVector::zeros_generic(Dyn(npt), U1::name());

        for j in 0..self.zmat.ncols() {
            let zkj = if j < self.idz {
                -self.zmat[(k, j)]
            } else {
                self.zmat[(k, j)]
            };
            for i in 0..npt {
                col[i] += zkj * self.zmat[(i, j)];
            }
        }

        col
    }

    /// Computes `Z diag(s) Z^T v`.
    pub(crate) fn omega_mul(&self, v: &OVector<T, Dyn>) -> OVector<T, Dyn> {
        let npt = self.npt();
        let mut out = OVector::zeros_generic(Dyn(npt), U1::name());

        for j in 0..self.zmat.ncols() {
            let mut dot = T::zero();
            for i in 0..npt {
                dot += self.zmat[(i, j)] * v[i];
            }
            if j < self.idz {
                dot = -dot;
            }
            for i in 0..npt {
                out[i] += dot * self.zmat[(i, j)];
            }
        }

        out
    }

    /// Computes the values of all Lagrange functions at `xopt + d` together
    /// with the denominator ingredient `beta` of the replacement update.
    ///
    /// `vlag` has npt + n entries: the npt Lagrange values followed by the
    /// gradient-block products that the update formula consumes.
    pub(crate) fn vlag_beta(&self, model: &ModelState<T>, d: &OVector<T, Dyn>) -> (OVector<T, Dyn>, T) {
        let npt = self.npt();
        let n = self.n();
        let half: T = convert(0.5);

        let xopt = model.xopt();
        let mut vlag = OVector::zeros_generic(Dyn(npt + n), U1::name());
        let mut w = OVector::zeros_generic(Dyn(npt), U1::name());

        for k in 0..npt {
            let xk = model.point(k);
            let suma = xk.dot(d);
            let sumb = xk.dot(xopt);
            w[k] = suma * (half * suma + sumb);

            let mut sum = T::zero();
            for j in 0..n {
                sum += self.bmat[(k, j)] * d[j];
            }
            vlag[k] = sum;
        }

        let mut beta = T::zero();
        for j in 0..self.zmat.ncols() {
            let mut sum = T::zero();
            for i in 0..npt {
                sum += self.zmat[(i, j)] * w[i];
            }
            if j < self.idz {
                beta += sum * sum;
                sum = -sum;
            } else {
                beta -= sum * sum;
            }
            for i in 0..npt {
                vlag[i] += sum * self.zmat[(i, j)];
            }
        }

        let mut bsum = T::zero();
        let mut dx = T::zero();
        for j in 0..n {
            let mut sum = T::zero();
            for i in 0..npt {
                sum += w[i] * self.bmat[(i, j)];
            }
            bsum += sum * d[j];
            let jp = npt + j;
            for k in 0..n {
                sum += self.bmat[(jp, k)] * d[k];
            }
            vlag[jp] = sum;
            bsum += sum * d[j];
            dx += d[j] * xopt[j];
        }

        let dsq = d.norm_squared();
        let xoptsq = xopt.norm_squared();
        beta = dx * dx + dsq * (xoptsq + dx + dx + half * dsq) + beta - bsum;
        vlag[model.kopt()] += T::one();

        (vlag, beta)
    }

    /// Absorbs the replacement of interpolation point `knew` into the
    /// factorization.
    ///
    /// `beta` and `vlag` must come from [`Factorization::vlag_beta`] for the
    /// same step, evaluated before any state was mutated. Returns false and
    /// leaves the factorization untouched when the updating denominator is
    /// zero or non-finite.
    pub(crate) fn update(&mut self, knew: usize, beta: T, vlag: &OVector<T, Dyn>) -> bool {
        let npt = self.npt();
        let n = self.n();
        let nptm = self.zmat.ncols();
        let zero = T::zero();

        let mut vlag = vlag.clone_owned();
        let mut w = OVector::zeros_generic(Dyn(npt + n), U1::name());

        // The updating denominator does not depend on the rotations below,
        // so degeneracy can be detected before anything is mutated.
        {
            let mut alpha = zero;
            for j in 0..nptm {
                let z = self.zmat[(knew, j)].powi(2);
                if j < self.idz {
                    alpha -= z;
                } else {
                    alpha += z;
                }
            }
            let tau = vlag[knew];
            let denom = alpha * beta + tau * tau;
            if !denom.is_finite() || denom == zero {
                debug!("degenerate updating denominator {}, skipping replacement", denom);
                return false;
            }
        }

        // Apply plane rotations that zero the knew-th row of zmat in every
        // column except the first one and, when idz splits the signs, the
        // first column of the positive block.
        let mut jl = 0;
        for j in 1..nptm {
            if j == self.idz {
                jl = self.idz;
            } else if self.zmat[(knew, j)] != zero {
                let temp = (self.zmat[(knew, jl)].powi(2) + self.zmat[(knew, j)].powi(2)).sqrt();
                let tempa = self.zmat[(knew, jl)] / temp;
                let tempb = self.zmat[(knew, j)] / temp;
                for i in 0..npt {
                    let t = tempa * self.zmat[(i, jl)] + tempb * self.zmat[(i, j)];
                    self.zmat[(i, j)] = tempa * self.zmat[(i, j)] - tempb * self.zmat[(i, jl)];
                    self.zmat[(i, jl)] = t;
                }
                self.zmat[(knew, j)] = zero;
            }
        }

        // The first npt components of the knew-th column of the inverse KKT
        // matrix, and the parameters of the updating formula.
        let mut tempa = self.zmat[(knew, 0)];
        if self.idz >= 1 {
            tempa = -tempa;
        }
        let tempb = if jl > 0 { self.zmat[(knew, jl)] } else { zero };
        for i in 0..npt {
            w[i] = tempa * self.zmat[(i, 0)];
            if jl > 0 {
                w[i] += tempb * self.zmat[(i, jl)];
            }
        }

        let alpha = w[knew];
        let tau = vlag[knew];
        let denom = alpha * beta + tau * tau;

        vlag[knew] -= T::one();

        // Complete the updating of zmat.
        let mut swap_first = false;
        if jl == 0 {
            let temp = denom.abs().sqrt();
            let tempb = tempa / temp;
            let tempa = tau / temp;
            for i in 0..npt {
                self.zmat[(i, 0)] = tempa * self.zmat[(i, 0)] - tempb * vlag[i];
            }
            if self.idz == 0 && denom < zero {
                self.idz = 1;
            } else if self.idz >= 1 && denom >= zero {
                swap_first = true;
            }
        } else {
            let (ja, jb) = if beta >= zero { (jl, 0) } else { (0, jl) };
            let temp = self.zmat[(knew, jb)] / denom;
            let tempa = temp * beta;
            let tempb = temp * tau;
            let tempz = self.zmat[(knew, ja)];
            let scala = T::one() / (beta.abs() * tempz * tempz + tau * tau).sqrt();
            let scalb = scala * denom.abs().sqrt();
            for i in 0..npt {
                self.zmat[(i, ja)] = scala * (tau * self.zmat[(i, ja)] - tempz * vlag[i]);
                self.zmat[(i, jb)] = scalb * (self.zmat[(i, jb)] - tempa * w[i] - tempb * vlag[i]);
            }
            if denom <= zero {
                if beta < zero {
                    self.idz += 1;
                } else {
                    swap_first = true;
                }
            }
        }

        // The sign pattern lost one negative column; move the split and keep
        // the negative block leading.
        if swap_first {
            debug_assert!(self.idz >= 1);
            self.idz = self.idz.saturating_sub(1);
            if self.idz > 0 {
                for i in 0..npt {
                    let t = self.zmat[(i, 0)];
                    self.zmat[(i, 0)] = self.zmat[(i, self.idz)];
                    self.zmat[(i, self.idz)] = t;
                }
            }
        }

        // Finally, the rank-two correction of bmat.
        for j in 0..n {
            let jp = npt + j;
            w[jp] = self.bmat[(knew, j)];
            let tempa = (alpha * vlag[jp] - tau * w[jp]) / denom;
            let tempb = (-beta * w[jp] - tau * vlag[jp]) / denom;
            for i in 0..=jp {
                self.bmat[(i, j)] += tempa * vlag[i] + tempb * w[i];
                if i >= npt {
                    self.bmat[(jp, i - npt)] = self.bmat[(i, j)];
                }
            }
        }

        true
    }

    /// Picks the interpolation point to drop in favour of the trust-region
    /// trial point, or `None` when no replacement keeps the set well poised.
    ///
    /// The score of a candidate is the magnitude of the updating denominator
    /// it would produce, overweighted by its distance from the best point so
    /// that remote points are preferred. When the trial point did not improve
    /// the best value, the best point itself is protected and the score must
    /// beat one.
    pub(crate) fn choose_drop(
        &self,
        model: &ModelState<T>,
        beta: T,
        vlag: &OVector<T, Dyn>,
        delta: T,
        rho: T,
        ximproved: bool,
    ) -> Option<usize> {
        let npt = self.npt();
        let tenth: T = convert(0.1);

        let rhosq = (tenth * delta).max(rho).powi(2);
        let protected = if ximproved { None } else { Some(model.kopt()) };
        let mut detrat = if ximproved { T::zero() } else { T::one() };
        let mut knew = None;

        for k in 0..npt {
            if Some(k) == protected {
                continue;
            }

            let mut hdiag = T::zero();
            for j in 0..self.zmat.ncols() {
                let z = self.zmat[(k, j)].powi(2);
                if j < self.idz {
                    hdiag -= z;
                } else {
                    hdiag += z;
                }
            }

            let mut score = (beta * hdiag + vlag[k] * vlag[k]).abs();
            let distsq = (model.point(k) - model.xopt()).norm_squared();
            if distsq > rhosq {
                score *= (distsq / rhosq).powi(3);
            }

            if score > detrat {
                detrat = score;
                knew = Some(k);
            }
        }

        knew
    }
}
