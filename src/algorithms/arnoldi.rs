//! Implicitly restarted Arnoldi method for a few eigenpairs of a general operator.
//!
//! ** NOTE: We recommend using the high-level method [`crate::solvers::eigs`] instead. This
//! module assumes its inputs have already been validated.
//!
//! An order-$m$ Arnoldi factorization
//!
//! $$ \mathbf{A}\mathbf{V}_m = \mathbf{V}_m\mathbf{H}_m + \mathbf{f}_m\mathbf{e}_m^H $$
//!
//! is built with full re-orthogonalization. The eigenvalues of the small Hessenberg matrix
//! $\mathbf{H}_m$ (Ritz values) are ranked by [`Which`]; the $m - k$ unwanted ones are used
//! as exact shifts in $m - k$ shifted-QR sweeps on $\mathbf{H}_m$, which filter the
//! corresponding directions out of the basis without new operator applications. The
//! factorization is then truncated to order $k$ and extended back to $m$.
//!
//! A real operator keeps a real basis: complex unwanted Ritz values come in conjugate
//! pairs, and each pair is applied as one real double-shift sweep.
//!
//! The projected problem is always solved in complex arithmetic, so eigenvalues and Ritz
//! vectors are returned as [`c64`] even for real operators.

use super::{Givens, KrylovBasis, is_breakdown};
use crate::{
    error::{KrylovError, KrylovErrorKind},
    operator::BoundOperator,
    scalar::{Scalar, c64},
    tensor::Tensor,
};
use faer::Mat;
use rand::{Rng, rngs::StdRng};
use std::{cmp::Ordering, fmt, str::FromStr};

/// Which part of the spectrum to target.
///
/// Parsed from and printed as the conventional two-letter codes (`"LR"`, `"LM"`, ...).
/// The Arnoldi solver supports [`Which::LargestReal`] and [`Which::LargestMagnitude`] only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Which {
    /// Largest real part.
    #[value(name = "LR")]
    LargestReal,
    /// Largest magnitude.
    #[value(name = "LM")]
    LargestMagnitude,
    /// Smallest real part.
    #[value(name = "SR")]
    SmallestReal,
    /// Smallest magnitude.
    #[value(name = "SM")]
    SmallestMagnitude,
    /// Largest imaginary part.
    #[value(name = "LI")]
    LargestImaginary,
    /// Smallest imaginary part.
    #[value(name = "SI")]
    SmallestImaginary,
}

impl Which {
    pub fn code(self) -> &'static str {
        match self {
            Which::LargestReal => "LR",
            Which::LargestMagnitude => "LM",
            Which::SmallestReal => "SR",
            Which::SmallestMagnitude => "SM",
            Which::LargestImaginary => "LI",
            Which::SmallestImaginary => "SI",
        }
    }

    pub fn is_supported_by_arnoldi(self) -> bool {
        matches!(self, Which::LargestReal | Which::LargestMagnitude)
    }

    /// Sort key; larger keys are more wanted.
    fn key(self, z: c64) -> f64 {
        match self {
            Which::LargestReal => z.re,
            Which::LargestMagnitude => z.norm(),
            Which::SmallestReal => -z.re,
            Which::SmallestMagnitude => -z.norm(),
            Which::LargestImaginary => z.im,
            Which::SmallestImaginary => -z.im,
        }
    }

    /// Indices of `values`, most wanted first.
    pub fn rank(self, values: &[c64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| {
            self.key(values[b])
                .partial_cmp(&self.key(values[a]))
                .unwrap_or(Ordering::Equal)
        });
        order
    }
}

impl fmt::Display for Which {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Which {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LR" => Ok(Which::LargestReal),
            "LM" => Ok(Which::LargestMagnitude),
            "SR" => Ok(Which::SmallestReal),
            "SM" => Ok(Which::SmallestMagnitude),
            "LI" => Ok(Which::LargestImaginary),
            "SI" => Ok(Which::SmallestImaginary),
            other => Err(format!("unknown spectrum selector `{other}`")),
        }
    }
}

/// Eigenpairs found by the implicitly restarted Arnoldi method.
#[derive(Clone, Debug)]
pub struct ArnoldiEigenpairs {
    /// Ritz values, ordered by the requested [`Which`].
    pub eigenvalues: Vec<c64>,
    /// Unit-norm Ritz vectors with the shape of the initial state.
    pub eigenvectors: Vec<Tensor<c64>>,
    /// Number of implicit restarts performed.
    pub restarts: usize,
    /// Norm of the factorization residual $\mathbf{f}_m$ at exit.
    pub residual_norm: f64,
}

/// An Arnoldi factorization $\mathbf{A}\mathbf{V} = \mathbf{V}\mathbf{H} + \mathbf{f}\mathbf{e}_m^H$.
#[derive(Clone, Debug)]
pub struct ArnoldiFactorization<T> {
    basis: KrylovBasis<T>,
    hessenberg: Mat<T>,
    residual: Tensor<T>,
    order: usize,
}

impl<T: Scalar> ArnoldiFactorization<T> {
    /// Builds an order-`order` factorization starting from `v0` (need not be normalized).
    pub fn new<R: Rng + ?Sized>(
        operator: &BoundOperator<'_, T>,
        v0: &Tensor<T>,
        order: usize,
        rng: &mut R,
    ) -> Result<Self, KrylovError> {
        let mut basis = KrylovBasis::with_capacity(order + 1);
        basis.push_normalized(v0.clone(), v0.norm());
        let mut factorization = Self {
            basis,
            hessenberg: Mat::zeros(order, order),
            residual: Tensor::zeros(v0.shape()),
            order,
        };
        factorization.extend(operator, 0, rng)?;
        Ok(factorization)
    }

    pub fn basis(&self) -> &KrylovBasis<T> {
        &self.basis
    }

    pub fn hessenberg(&self) -> &Mat<T> {
        &self.hessenberg
    }

    pub fn residual_norm(&self) -> f64 {
        self.residual.norm()
    }

    /// Runs Arnoldi steps `start..order`; the basis must hold `start + 1` vectors.
    fn extend<R: Rng + ?Sized>(
        &mut self,
        operator: &BoundOperator<'_, T>,
        start: usize,
        rng: &mut R,
    ) -> Result<(), KrylovError> {
        for j in start..self.order {
            let mut w = operator.apply(self.basis.get(j))?;
            let image_norm = w.norm();
            let coeffs = self.basis.orthogonalize(&mut w, j + 1);
            for (i, h) in coeffs.into_iter().enumerate() {
                self.hessenberg[(i, j)] = h;
            }
            let beta = w.norm();

            if j + 1 == self.order {
                self.residual = w;
                break;
            }
            if is_breakdown(beta, image_norm) {
                log::warn!(
                    "Arnoldi breakdown at step {}; continuing with a random direction",
                    j + 1
                );
                self.hessenberg[(j + 1, j)] = T::zero();
                let v = self
                    .basis
                    .random_orthogonal_direction(w.shape(), rng)
                    .ok_or_else(|| exhausted(self.basis.len()))?;
                self.basis.push(v);
            } else {
                self.hessenberg[(j + 1, j)] = T::from_f64(beta);
                self.basis.push_normalized(w, beta);
            }
        }
        Ok(())
    }

    /// Ritz values and the eigenvectors of $\mathbf{H}$ (as columns).
    fn ritz_pairs(&self) -> Result<(Vec<c64>, Mat<c64>), KrylovError> {
        let m = self.order;
        let h = Mat::<c64>::from_fn(m, m, |i, j| self.hessenberg[(i, j)].to_c64());
        let evd = h.as_ref().eigen()?;
        let values = (0..m).map(|i| evd.S()[i]).collect();
        Ok((values, evd.U().to_owned()))
    }

    /// Applies `shifts` as shifted-QR sweeps, keeps `keep` vectors and re-extends to full order.
    fn restart<R: Rng + ?Sized>(
        &mut self,
        operator: &BoundOperator<'_, T>,
        shifts: &[Shift<T>],
        keep: usize,
        rng: &mut R,
    ) -> Result<(), KrylovError> {
        let m = self.order;
        let mut h = self.hessenberg.clone();
        // Last row of the accumulated orthogonal transformation Q.
        let mut q_last = vec![T::zero(); m];
        q_last[m - 1] = T::one();

        for shift in shifts {
            match *shift {
                Shift::Single(mu) => {
                    self.single_shift_sweep(&mut h, &mut q_last, mu);
                }
                Shift::ConjugatePair { trace, det } => {
                    self.double_shift_sweep(&mut h, &mut q_last, trace, det);
                }
            }
        }

        // f_k = v_{k+1} h_{k+1,k} + f_m q_{m,k}
        let mut f = self.basis.get(keep).scaled(h[(keep, keep - 1)]);
        f.axpy(q_last[keep - 1], &self.residual);
        self.basis.truncate(keep);
        self.hessenberg = Mat::from_fn(m, m, |i, j| {
            if i < keep && j < keep {
                h[(i, j)]
            } else {
                T::zero()
            }
        });

        let beta = f.norm();
        if beta == 0.0 {
            let v = self
                .basis
                .random_orthogonal_direction(f.shape(), rng)
                .ok_or_else(|| exhausted(keep))?;
            self.basis.push(v);
        } else {
            self.hessenberg[(keep, keep - 1)] = T::from_f64(beta);
            self.basis.push_normalized(f, beta);
        }
        self.extend(operator, keep, rng)
    }

    /// One shifted-QR step `H - mu I = QR`, `H <- RQ + mu I`, done with Givens rotations.
    fn single_shift_sweep(&mut self, h: &mut Mat<T>, q_last: &mut [T], mu: T) {
        let m = self.order;
        for i in 0..m {
            h[(i, i)] -= mu;
        }
        let mut rotations = Vec::with_capacity(m - 1);
        for j in 0..m - 1 {
            let (g, r) = Givens::zeroing(h[(j, j)], h[(j + 1, j)]);
            h[(j, j)] = r;
            h[(j + 1, j)] = T::zero();
            for col in j + 1..m {
                let (x, y) = g.apply_rows(h[(j, col)], h[(j + 1, col)]);
                h[(j, col)] = x;
                h[(j + 1, col)] = y;
            }
            rotations.push(g);
        }
        for (j, g) in rotations.iter().enumerate() {
            for row in 0..m {
                let (x, y) = g.apply_cols(h[(row, j)], h[(row, j + 1)]);
                h[(row, j)] = x;
                h[(row, j + 1)] = y;
            }
            let (x, y) = g.apply_cols(q_last[j], q_last[j + 1]);
            q_last[j] = x;
            q_last[j + 1] = y;
            self.basis.rotate(j, g);
        }
        for i in 0..m {
            h[(i, i)] += mu;
        }
    }

    /// One double-shift step with the real quadratic `M = H^2 - trace H + det I`.
    ///
    /// `M = QR` is factored with Givens rotations and `H <- Q^H H Q`. For a conjugate pair
    /// `mu`, `conj(mu)` this is the same as two complex shifts, but stays in the arithmetic
    /// of `T`.
    fn double_shift_sweep(&mut self, h: &mut Mat<T>, q_last: &mut [T], trace: f64, det: f64) {
        let m = self.order;
        let squared = &*h * &*h;
        let mut quadratic = Mat::<T>::from_fn(m, m, |i, j| {
            let diagonal = if i == j { T::from_f64(det) } else { T::zero() };
            squared[(i, j)] - T::from_f64(trace) * h[(i, j)] + diagonal
        });

        // M is Hessenberg with two subdiagonals.
        let mut rotations = Vec::with_capacity(2 * m);
        for j in 0..m - 1 {
            for i in (j + 1..(j + 3).min(m)).rev() {
                let (g, r) = Givens::zeroing(quadratic[(i - 1, j)], quadratic[(i, j)]);
                quadratic[(i - 1, j)] = r;
                quadratic[(i, j)] = T::zero();
                for col in j + 1..m {
                    let (x, y) = g.apply_rows(quadratic[(i - 1, col)], quadratic[(i, col)]);
                    quadratic[(i - 1, col)] = x;
                    quadratic[(i, col)] = y;
                }
                rotations.push((i - 1, g));
            }
        }

        for (k, g) in &rotations {
            let k = *k;
            for col in 0..m {
                let (x, y) = g.apply_rows(h[(k, col)], h[(k + 1, col)]);
                h[(k, col)] = x;
                h[(k + 1, col)] = y;
            }
            for row in 0..m {
                let (x, y) = g.apply_cols(h[(row, k)], h[(row, k + 1)]);
                h[(row, k)] = x;
                h[(row, k + 1)] = y;
            }
            let (x, y) = g.apply_cols(q_last[k], q_last[k + 1]);
            q_last[k] = x;
            q_last[k + 1] = y;
            self.basis.rotate(k, g);
        }
        // Q^H H Q is Hessenberg up to rounding.
        for j in 0..m {
            for i in j + 2..m {
                h[(i, j)] = T::zero();
            }
        }
    }

    fn hessenberg_norm(&self) -> f64 {
        let mut sum = 0.0;
        for j in 0..self.order {
            for i in 0..self.order {
                let a = self.hessenberg[(i, j)].abs();
                sum += a * a;
            }
        }
        sum.sqrt()
    }
}

fn exhausted(len: usize) -> KrylovError {
    KrylovErrorKind::InputError(format!(
        "the Krylov basis cannot be extended beyond {len} vectors; the operator dimension is exhausted"
    ))
    .into()
}

/// An exact shift of one implicit restart sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Shift<T> {
    /// Filters `H - mu I`.
    Single(T),
    /// Filters `(H - mu I)(H - conj(mu) I) = H^2 - trace H + det I` for a complex `mu` of a
    /// real operator.
    ConjugatePair { trace: f64, det: f64 },
}

/// Relative imaginary part below which a Ritz value of a real operator counts as real.
const REAL_RITZ_RTOL: f64 = 1e-10;

/// Relative distance within which two Ritz values of a real operator form a conjugate pair.
const CONJUGATE_PAIR_RTOL: f64 = 1e-6;

/// Turns the unwanted Ritz values into shifts.
///
/// Complex operators use every value as a single shift. Real operators use real values as
/// single shifts and combine each complex value with its conjugate into one real double
/// shift. A complex value whose conjugate is among the wanted values has no partner and is
/// skipped.
fn plan_shifts<T: Scalar>(unwanted: &[c64]) -> Vec<Shift<T>> {
    if T::DTYPE.is_complex() {
        return unwanted
            .iter()
            .map(|&mu| Shift::Single(T::from_c64(mu)))
            .collect();
    }

    let mut used = vec![false; unwanted.len()];
    let mut shifts = Vec::with_capacity(unwanted.len());
    for i in 0..unwanted.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mu = unwanted[i];
        let scale = mu.norm().max(f64::MIN_POSITIVE);
        if mu.im.abs() <= REAL_RITZ_RTOL * scale {
            shifts.push(Shift::Single(T::from_f64(mu.re)));
            continue;
        }
        let partner = (0..unwanted.len())
            .filter(|&j| !used[j])
            .map(|j| (j, (unwanted[j] - mu.conj()).norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .filter(|&(_, distance)| distance <= CONJUGATE_PAIR_RTOL * scale);
        match partner {
            Some((j, _)) => {
                used[j] = true;
                shifts.push(Shift::ConjugatePair {
                    trace: 2.0 * mu.re,
                    det: mu.norm_sqr(),
                });
            }
            None => log::trace!("skipping shift {mu}: its conjugate is a wanted Ritz value"),
        }
    }
    shifts
}

/// Signature of [`implicitly_restarted_arnoldi`] as stored in the routine cache.
pub type ArnoldiRoutine<T> = fn(
    &BoundOperator<'_, T>,
    &Tensor<T>,
    usize,
    usize,
    Which,
    usize,
    &mut StdRng,
) -> Result<ArnoldiEigenpairs, KrylovError>;

/// Computes `numeig` eigenpairs of `operator` with the implicitly restarted Arnoldi method.
///
/// # Arguments
/// * `operator`: The bound operator $\mathbf{A}$.
/// * `v0`: The starting vector. Must be non-zero.
/// * `num_krylov_vecs`: Order $m$ of the factorization; at most the operator dimension.
/// * `numeig`: Number $k \le m$ of eigenpairs to return.
/// * `which`: Selection rule for the wanted Ritz values.
/// * `maxiter`: Maximum number of implicit restarts. `0` runs plain Arnoldi.
/// * `rng`: Source of random directions used after a breakdown.
pub fn implicitly_restarted_arnoldi<T: Scalar, R: Rng + ?Sized>(
    operator: &BoundOperator<'_, T>,
    v0: &Tensor<T>,
    num_krylov_vecs: usize,
    numeig: usize,
    which: Which,
    maxiter: usize,
    rng: &mut R,
) -> Result<ArnoldiEigenpairs, KrylovError> {
    let mut factorization = ArnoldiFactorization::new(operator, v0, num_krylov_vecs, rng)?;
    let mut restarts = 0;

    while restarts < maxiter && numeig < num_krylov_vecs {
        if is_breakdown(
            factorization.residual_norm(),
            factorization.hessenberg_norm(),
        ) {
            log::debug!("Arnoldi found an invariant subspace after {restarts} restarts");
            break;
        }
        let (values, _) = factorization.ritz_pairs()?;
        let order = which.rank(&values);
        let unwanted: Vec<c64> = order[numeig..].iter().map(|&i| values[i]).collect();
        let shifts = plan_shifts::<T>(&unwanted);
        factorization.restart(operator, &shifts, numeig, rng)?;
        restarts += 1;
        log::trace!(
            "restart {restarts}: residual {:.3e}",
            factorization.residual_norm()
        );
    }

    let (values, vectors) = factorization.ritz_pairs()?;
    let order = which.rank(&values);
    let basis = factorization.basis();
    let mut eigenvalues = Vec::with_capacity(numeig);
    let mut eigenvectors = Vec::with_capacity(numeig);
    for &i in &order[..numeig] {
        let coeffs: Vec<c64> = (0..num_krylov_vecs).map(|r| vectors[(r, i)]).collect();
        let mut ritz = basis.combine_c64(&coeffs);
        let norm = ritz.norm();
        if norm > 0.0 {
            ritz.scale(c64::new(norm.recip(), 0.0));
        }
        eigenvalues.push(values[i]);
        eigenvectors.push(ritz);
    }

    let residual_norm = factorization.residual_norm();
    log::debug!(
        "Arnoldi finished: {numeig} eigenpairs, {restarts} restarts, residual {residual_norm:.3e}"
    );
    Ok(ArnoldiEigenpairs {
        eigenvalues,
        eigenvectors,
        restarts,
        residual_norm,
    })
}
