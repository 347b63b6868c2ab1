//! Symmetric Lanczos tridiagonalization and the extremal eigenpairs it yields.
//!
//! ** NOTE: We recommend using the high-level method [`crate::solvers::eigsh_lanczos`]
//! instead. This module is intended for use cases where access to the Lanczos basis and
//! coefficients is required.
//!
//! For a Hermitian operator the Arnoldi recurrence collapses to three terms:
//!
//! $$ \beta_{j+1}\mathbf{v}_{j+1} = \mathbf{A}\mathbf{v}_j - \alpha_j\mathbf{v}_j - \beta_j\mathbf{v}_{j-1} $$
//!
//! and the projected matrix $\mathbf{T}_k = \mathbf{V}_k^H\mathbf{A}\mathbf{V}_k$ is real
//! symmetric tridiagonal, with $\alpha_j$ on the diagonal and $\beta_j$ off it. The full
//! basis $\mathbf{V}_k$ is stored so that Ritz vectors can be formed at the end; memory is
//! therefore $O(nk)$.
//!
//! In finite precision the vectors lose orthogonality once Ritz values converge, which
//! shows up as spurious copies of converged eigenvalues. Full re-orthogonalization
//! prevents this and is mandatory whenever more than one eigenpair is requested.

use super::{KrylovBasis, is_breakdown};
use crate::{
    error::{KrylovError, KrylovErrorKind},
    operator::BoundOperator,
    scalar::Scalar,
    tensor::Tensor,
};
use faer::{Mat, Side};
use rand::{Rng, rngs::StdRng};

/// Holds the scalar coefficients of the tridiagonal matrix $\mathbf{T}_k$.
#[derive(Debug, Clone)]
pub struct LanczosDecomposition {
    /// Diagonal entries $\alpha_1, \dots, \alpha_k$.
    pub alphas: Vec<f64>,
    /// Off-diagonal entries $\beta_2, \dots, \beta_k$. A zero marks a restart from a random
    /// direction after an invariant subspace was found.
    pub betas: Vec<f64>,
    /// Number of Lanczos vectors generated.
    pub steps_taken: usize,
    /// Norm of the starting vector.
    pub b_norm: f64,
}

impl LanczosDecomposition {
    /// Assembles $\mathbf{T}_k$ as a dense matrix.
    pub fn tridiagonal(&self) -> Mat<f64> {
        let n = self.steps_taken;
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                self.alphas[i]
            } else if i == j + 1 {
                self.betas[j]
            } else if j == i + 1 {
                self.betas[i]
            } else {
                0.0
            }
        })
    }
}

/// The stored Lanczos basis together with the coefficients of $\mathbf{T}_k$.
#[derive(Debug, Clone)]
pub struct LanczosOutput<T> {
    pub basis: KrylovBasis<T>,
    pub decomposition: LanczosDecomposition,
}

/// Knobs of the Lanczos recurrence.
#[derive(Debug, Clone, Copy)]
pub struct LanczosConfig {
    /// Norm below which a new vector signals an invariant subspace.
    pub delta: f64,
    /// Re-orthogonalize every new vector against the whole basis.
    pub reorthogonalize: bool,
    /// Minimum number of vectors before an invariant subspace may end the iteration.
    pub min_vectors: usize,
}

/// Eigenpairs of a Hermitian operator found by Lanczos.
#[derive(Debug, Clone)]
pub struct LanczosEigenpairs<T> {
    /// The lowest Ritz values, ascending.
    pub eigenvalues: Vec<f64>,
    /// Unit-norm Ritz vectors with the shape of the initial state.
    pub eigenvectors: Vec<Tensor<T>>,
    /// Number of Lanczos vectors generated.
    pub steps_taken: usize,
}

/// Runs up to `k` steps of the Lanczos recurrence starting from `b`.
///
/// # Arguments
/// * `operator`: The bound Hermitian operator $\mathbf{A}$ (not verified).
/// * `b`: The starting vector. Must not be a zero vector.
/// * `k`: The maximum number of Lanczos vectors.
/// * `config`: Breakdown threshold and re-orthogonalization switch.
/// * `rng`: Source of random directions when an invariant subspace is hit too early.
///
/// # Returns
/// The basis $\mathbf{V}_k$ and the coefficients of $\mathbf{T}_k$. Fewer than `k` vectors
/// are returned only when an invariant subspace was found after at least
/// `config.min_vectors` steps.
pub fn lanczos_tridiagonalize<T: Scalar, R: Rng + ?Sized>(
    operator: &BoundOperator<'_, T>,
    b: &Tensor<T>,
    k: usize,
    config: &LanczosConfig,
    rng: &mut R,
) -> Result<LanczosOutput<T>, KrylovError> {
    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Err(
            KrylovErrorKind::InputError("the starting vector must not be zero".into()).into(),
        );
    }

    let mut basis = KrylovBasis::with_capacity(k);
    let mut alphas = Vec::with_capacity(k);
    let mut betas = Vec::<f64>::with_capacity(k.saturating_sub(1));
    basis.push_normalized(b.clone(), b_norm);

    for j in 0..k {
        let v = basis.get(j);
        let mut w = operator.apply(v)?;
        let image_norm = w.norm();
        // <v, A v> is real for Hermitian A; the imaginary part is rounding noise.
        let alpha = v.inner(&w).real();
        w.axpy(T::from_f64(-alpha), v);
        if j > 0 {
            w.axpy(T::from_f64(-betas[j - 1]), basis.get(j - 1));
        }
        if config.reorthogonalize {
            basis.orthogonalize(&mut w, j + 1);
        }
        alphas.push(alpha);

        if j + 1 == k {
            break;
        }
        let beta = w.norm();
        if beta < config.delta || is_breakdown(beta, image_norm) {
            if alphas.len() >= config.min_vectors {
                log::debug!("Lanczos found an invariant subspace after {} steps", j + 1);
                break;
            }
            log::warn!(
                "Lanczos breakdown at step {} before {} vectors; continuing with a random direction",
                j + 1,
                config.min_vectors
            );
            let fresh = basis
                .random_orthogonal_direction(w.shape(), rng)
                .ok_or_else(|| {
                    KrylovError::from(KrylovErrorKind::InputError(format!(
                        "the operator has no invariant subspace of dimension {} reachable from the initial state",
                        config.min_vectors
                    )))
                })?;
            betas.push(0.0);
            basis.push(fresh);
            continue;
        }
        betas.push(beta);
        basis.push_normalized(w, beta);
    }

    let steps_taken = alphas.len();
    Ok(LanczosOutput {
        basis,
        decomposition: LanczosDecomposition {
            alphas,
            betas,
            steps_taken,
            b_norm,
        },
    })
}

/// Signature of [`lanczos_eigenpairs`] as stored in the routine cache.
pub type LanczosRoutine<T> = fn(
    &BoundOperator<'_, T>,
    &Tensor<T>,
    usize,
    usize,
    &LanczosConfig,
    &mut StdRng,
) -> Result<LanczosEigenpairs<T>, KrylovError>;

/// Computes the `numeig` lowest eigenpairs from a Lanczos tridiagonalization.
///
/// $\mathbf{T}_k$ is diagonalized once, after the recurrence, with `faer`'s self-adjoint
/// eigensolver; Ritz vectors are $\mathbf{V}_k\mathbf{y}_i$, normalized.
pub fn lanczos_eigenpairs<T: Scalar, R: Rng + ?Sized>(
    operator: &BoundOperator<'_, T>,
    b: &Tensor<T>,
    num_krylov_vecs: usize,
    numeig: usize,
    config: &LanczosConfig,
    rng: &mut R,
) -> Result<LanczosEigenpairs<T>, KrylovError> {
    let output = lanczos_tridiagonalize(operator, b, num_krylov_vecs, config, rng)?;
    let decomposition = &output.decomposition;
    let steps = decomposition.steps_taken;

    let t_k = decomposition.tridiagonal();
    let evd = t_k.as_ref().self_adjoint_eigen(Side::Lower)?;
    let (values, vectors) = (evd.S(), evd.U());
    let mut order: Vec<usize> = (0..steps).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let count = numeig.min(steps);
    let mut eigenvalues = Vec::with_capacity(count);
    let mut eigenvectors = Vec::with_capacity(count);
    for &i in &order[..count] {
        let coeffs: Vec<T> = (0..steps).map(|r| T::from_f64(vectors[(r, i)])).collect();
        let mut ritz = output.basis.combine(&coeffs);
        let norm = ritz.norm();
        if norm > 0.0 {
            ritz.scale(T::from_f64(norm.recip()));
        }
        eigenvalues.push(values[i]);
        eigenvectors.push(ritz);
    }

    log::debug!(
        "Lanczos finished: {count} eigenpairs from {steps} vectors, lowest {:?}",
        eigenvalues.first()
    );
    Ok(LanczosEigenpairs {
        eigenvalues,
        eigenvectors,
        steps_taken: steps,
    })
}
