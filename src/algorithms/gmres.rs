//! Restarted GMRES for square linear systems.
//!
//! ** NOTE: We recommend using the high-level method [`crate::solvers::gmres`] instead.
//!
//! Each cycle builds an Arnoldi basis of $\mathcal{K}_m(\mathbf{A}, \mathbf{r}_0)$ and
//! minimizes $\lVert \beta\mathbf{e}_1 - \bar{\mathbf{H}}_m\mathbf{y} \rVert$ over
//! $\mathbf{y}$. The $(m+1) \times m$ Hessenberg matrix is reduced to triangular form by
//! Givens rotations as columns arrive, so the least-squares residual is available after
//! every operator application at no extra cost.

use super::{Givens, KrylovBasis, is_breakdown};
use crate::{error::KrylovError, operator::BoundOperator, scalar::Scalar, tensor::Tensor};
use faer::Mat;

/// Outcome of a GMRES solve.
#[derive(Debug, Clone)]
pub struct GmresSolution<T> {
    /// The approximate solution, with the shape of the right-hand side.
    pub solution: Tensor<T>,
    pub converged: bool,
    /// Number of restart cycles run.
    pub restarts: usize,
    /// True residual norm $\lVert \mathbf{b} - \mathbf{A}\mathbf{x} \rVert$ at exit.
    pub residual_norm: f64,
}

impl<T> GmresSolution<T> {
    /// `0` on convergence, otherwise the number of restarts consumed.
    pub fn status(&self) -> usize {
        if self.converged { 0 } else { self.restarts }
    }
}

/// One GMRES cycle from residual `r` (with norm `beta`); returns the correction to `x`.
fn gmres_cycle<T: Scalar>(
    operator: &BoundOperator<'_, T>,
    r: &Tensor<T>,
    beta: f64,
    num_krylov_vectors: usize,
    threshold: f64,
) -> Result<Tensor<T>, KrylovError> {
    let m = num_krylov_vectors;
    let mut basis = KrylovBasis::with_capacity(m);
    basis.push_normalized(r.clone(), beta);
    let mut h = Mat::<T>::zeros(m + 1, m);
    let mut g = vec![T::zero(); m + 1];
    g[0] = T::from_f64(beta);
    let mut rotations: Vec<Givens<T>> = Vec::with_capacity(m);

    for j in 0..m {
        let mut w = operator.apply(basis.get(j))?;
        let image_norm = w.norm();
        let coeffs = basis.orthogonalize(&mut w, j + 1);
        for (i, c) in coeffs.into_iter().enumerate() {
            h[(i, j)] = c;
        }
        let h_next = w.norm();
        h[(j + 1, j)] = T::from_f64(h_next);

        for (i, rot) in rotations.iter().enumerate() {
            let (x, y) = rot.apply_rows(h[(i, j)], h[(i + 1, j)]);
            h[(i, j)] = x;
            h[(i + 1, j)] = y;
        }
        let (rot, diag) = Givens::zeroing(h[(j, j)], h[(j + 1, j)]);
        h[(j, j)] = diag;
        h[(j + 1, j)] = T::zero();
        let (gj, gj1) = rot.apply_rows(g[j], g[j + 1]);
        g[j] = gj;
        g[j + 1] = gj1;
        rotations.push(rot);

        let estimate = g[j + 1].abs();
        log::trace!("GMRES column {}: estimated residual {estimate:.3e}", j + 1);
        if estimate <= threshold || j + 1 == m || is_breakdown(h_next, image_norm) {
            break;
        }
        basis.push_normalized(w, h_next);
    }

    // Back substitution on the leading triangle.
    let n = rotations.len();
    let mut y = vec![T::zero(); n];
    for i in (0..n).rev() {
        let mut acc = g[i];
        for l in i + 1..n {
            acc -= h[(i, l)] * y[l];
        }
        // A zero pivot means A is singular on the subspace; that direction is dropped.
        if h[(i, i)].abs() > 0.0 {
            y[i] = acc / h[(i, i)];
        }
    }
    Ok(basis.combine(&y))
}

/// Signature of [`restarted_gmres`] as stored in the routine cache.
pub type GmresRoutine<T> = fn(
    &BoundOperator<'_, T>,
    &Tensor<T>,
    Tensor<T>,
    f64,
    usize,
    usize,
) -> Result<GmresSolution<T>, KrylovError>;

/// Solves $\mathbf{A}\mathbf{x} = \mathbf{b}$ with restarted GMRES.
///
/// # Arguments
/// * `operator`: The bound operator $\mathbf{A}$.
/// * `b`: The right-hand side.
/// * `x0`: The initial guess, with the shape of `b`.
/// * `threshold`: Absolute residual norm at which the iteration stops.
/// * `num_krylov_vectors`: Maximum basis size per cycle.
/// * `maxiter`: Maximum number of cycles.
pub fn restarted_gmres<T: Scalar>(
    operator: &BoundOperator<'_, T>,
    b: &Tensor<T>,
    x0: Tensor<T>,
    threshold: f64,
    num_krylov_vectors: usize,
    maxiter: usize,
) -> Result<GmresSolution<T>, KrylovError> {
    let mut x = x0;
    let mut r = b.sub(&operator.apply(&x)?);
    let mut residual_norm = r.norm();
    let mut restarts = 0;

    while residual_norm > threshold && restarts < maxiter {
        let correction = gmres_cycle(operator, &r, residual_norm, num_krylov_vectors, threshold)?;
        x.axpy(T::one(), &correction);
        r = b.sub(&operator.apply(&x)?);
        residual_norm = r.norm();
        restarts += 1;
        log::trace!("GMRES restart {restarts}: residual {residual_norm:.3e}");
    }

    let converged = residual_norm <= threshold;
    log::debug!(
        "GMRES {} after {restarts} cycles: residual {residual_norm:.3e} (threshold {threshold:.3e})",
        if converged { "converged" } else { "stopped" }
    );
    Ok(GmresSolution {
        solution: x,
        converged,
        restarts,
        residual_norm,
    })
}
