//! This module provides the high-level entry points of the crate: [`eigs`],
//! [`eigsh_lanczos`] and [`gmres`].
//!
//! Every entry point follows the same sequence:
//!
//! 1. validate the parameters (all invalid-argument, unsupported-feature and type-mismatch
//!    errors are raised here, before the operator is ever applied);
//! 2. resolve the initial state;
//! 3. bind the operator through the [`KernelCache`] and fetch the compiled routine;
//! 4. run the iteration from [`crate::algorithms`].

use crate::{
    algorithms::{
        arnoldi::{ArnoldiEigenpairs, ArnoldiRoutine, Which},
        gmres::{GmresRoutine, GmresSolution},
        lanczos::{LanczosConfig, LanczosEigenpairs, LanczosRoutine},
    },
    cache::{Algorithm, KernelCache},
    error::{KrylovError, KrylovErrorKind},
    operator::{LinearOperator, OperatorArgs, bind},
    scalar::{DType, Scalar},
    tensor::Tensor,
};
use rand::{SeedableRng, rngs::StdRng};

/// Starting vector of an eigensolver.
#[derive(Clone, Debug)]
pub enum InitialState<T> {
    /// Use this tensor (normalized internally). Must be non-zero.
    Vector(Tensor<T>),
    /// Draw a standard-normal tensor of this shape. `dtype` must match the operator.
    Random { shape: Vec<usize>, dtype: DType },
}

impl<T> InitialState<T> {
    pub fn random(shape: &[usize], dtype: DType) -> Self {
        InitialState::Random {
            shape: shape.to_vec(),
            dtype,
        }
    }
}

impl<T> From<Tensor<T>> for InitialState<T> {
    fn from(tensor: Tensor<T>) -> Self {
        InitialState::Vector(tensor)
    }
}

/// Parameters of [`eigs`].
#[derive(Clone, Copy, Debug)]
pub struct EigsOptions {
    /// Order of the Arnoldi factorization.
    pub num_krylov_vecs: usize,
    /// Number of eigenpairs to return.
    pub numeig: usize,
    /// Accepted for interface compatibility; no convergence test uses it.
    pub tol: f64,
    /// Target part of the spectrum. Only `LR` and `LM` are supported.
    pub which: Which,
    /// Maximum number of implicit restarts.
    pub maxiter: usize,
    /// Seed for random initial states and breakdown recovery. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EigsOptions {
    fn default() -> Self {
        Self {
            num_krylov_vecs: 50,
            numeig: 6,
            tol: 1e-8,
            which: Which::LargestReal,
            maxiter: 20,
            seed: None,
        }
    }
}

/// Parameters of [`eigsh_lanczos`].
#[derive(Clone, Copy, Debug)]
pub struct LanczosOptions {
    pub num_krylov_vecs: usize,
    pub numeig: usize,
    /// Accepted for interface compatibility; no convergence test uses it.
    pub tol: f64,
    /// Norm below which a new Lanczos vector signals an invariant subspace.
    pub delta: f64,
    /// Accepted for interface compatibility; `T` is diagonalized once at the end.
    pub ndiag: usize,
    /// Required when `numeig > 1`.
    pub reorthogonalize: bool,
    pub seed: Option<u64>,
}

impl Default for LanczosOptions {
    fn default() -> Self {
        Self {
            num_krylov_vecs: 20,
            numeig: 1,
            tol: 1e-8,
            delta: 1e-8,
            ndiag: 10,
            reorthogonalize: false,
            seed: None,
        }
    }
}

/// Parameters of [`gmres`].
#[derive(Clone, Debug)]
pub struct GmresOptions<T> {
    /// Initial guess; zeros when `None`.
    pub x0: Option<Tensor<T>>,
    /// Relative tolerance on `||b - A x|| / ||b||`.
    pub tol: f64,
    /// Absolute tolerance; defaults to `tol`.
    pub atol: Option<f64>,
    /// Basis size per restart cycle; defaults to the size of `b`.
    pub num_krylov_vectors: Option<usize>,
    /// Maximum number of restart cycles.
    pub maxiter: usize,
    /// Not supported by this backend; must be `None`.
    pub preconditioner: Option<LinearOperator<T>>,
}

impl<T> Default for GmresOptions<T> {
    fn default() -> Self {
        Self {
            x0: None,
            tol: 1e-5,
            atol: None,
            num_krylov_vectors: None,
            maxiter: 1,
            preconditioner: None,
        }
    }
}

fn solver_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn resolve_initial_state<T: Scalar>(
    initial_state: InitialState<T>,
    rng: &mut StdRng,
) -> Result<Tensor<T>, KrylovError> {
    let v0 = match initial_state {
        InitialState::Vector(v0) => v0,
        InitialState::Random { shape, dtype } => {
            if dtype != T::DTYPE {
                return Err(KrylovErrorKind::TypeMismatch {
                    expected: T::DTYPE,
                    found: dtype,
                }
                .into());
            }
            Tensor::random_normal(&shape, rng)
        }
    };
    if v0.is_empty() {
        return Err(
            KrylovErrorKind::InputError("the initial state must not be empty".into()).into(),
        );
    }
    if v0.norm() == 0.0 {
        return Err(KrylovErrorKind::InputError("the initial state must not be zero".into()).into());
    }
    Ok(v0)
}

/// Looks up the compiled entry point of `algorithm` with signature `F`.
fn routine_entry<F: Copy + 'static>(
    cache: &mut KernelCache,
    algorithm: Algorithm,
) -> Result<F, KrylovError> {
    cache.routine(algorithm).entry::<F>().ok_or_else(|| {
        KrylovErrorKind::Unsupported {
            feature: "Scalar types other than float64 and complex128",
        }
        .into()
    })
}

fn check_tolerance(name: &'static str, value: f64) -> Result<(), KrylovError> {
    if value < 0.0 || value.is_nan() {
        return Err(KrylovErrorKind::NegativeTolerance { name, value }.into());
    }
    Ok(())
}

/// Computes `numeig` eigenpairs of a general square operator with the implicitly
/// restarted Arnoldi method.
///
/// `A(v, args)` must map a tensor of the initial state's shape to a tensor of the same
/// shape. Eigenvalues are ordered by `options.which` and returned as complex numbers
/// together with unit-norm Ritz vectors.
///
/// # Errors
/// Invalid-argument errors for an unsupported `which`, `numeig == 0`,
/// `numeig > num_krylov_vecs`, a zero initial state and `num_krylov_vecs` larger than the
/// problem; a type mismatch for a random initial state of the wrong dtype; unsupported
/// keyword arguments.
pub fn eigs<T: Scalar>(
    cache: &mut KernelCache,
    operator: &LinearOperator<T>,
    args: &OperatorArgs<T>,
    initial_state: impl Into<InitialState<T>>,
    options: &EigsOptions,
) -> Result<ArnoldiEigenpairs, KrylovError> {
    let EigsOptions {
        num_krylov_vecs,
        numeig,
        which,
        maxiter,
        seed,
        ..
    } = *options;

    if !which.is_supported_by_arnoldi() {
        return Err(KrylovErrorKind::UnsupportedWhich {
            which: which.to_string(),
        }
        .into());
    }
    if numeig == 0 {
        return Err(KrylovErrorKind::InputError("numeig must be at least 1".into()).into());
    }
    if num_krylov_vecs < numeig {
        return Err(KrylovErrorKind::TooFewKrylovVectors {
            num_krylov_vecs,
            numeig,
        }
        .into());
    }
    let mut rng = solver_rng(seed);
    let v0 = resolve_initial_state(initial_state.into(), &mut rng)?;
    if num_krylov_vecs > v0.len() {
        return Err(KrylovErrorKind::KrylovSizeOutOfRange {
            requested: num_krylov_vecs,
            size: v0.len(),
        }
        .into());
    }

    let bound = bind(cache, operator, args)?;
    let algorithm = Algorithm::ImplicitlyRestartedArnoldi;
    let run: ArnoldiRoutine<T> = routine_entry(cache, algorithm)?;
    log::debug!(
        "Running {algorithm} on {} (m = {num_krylov_vecs}, k = {numeig}, which = {which})",
        bound.id()
    );
    run(&bound, &v0, num_krylov_vecs, numeig, which, maxiter, &mut rng)
}

/// Computes the `numeig` lowest eigenpairs of a Hermitian operator with Lanczos.
///
/// Hermiticity is not verified. Eigenvalues are returned in ascending order; eigenvectors
/// have unit norm and the shape of the initial state.
///
/// # Errors
/// Invalid-argument errors for `numeig == 0`, `num_krylov_vecs < numeig`,
/// `numeig > 1` without re-orthogonalization, a negative `delta` and a zero initial
/// state; a type mismatch for a random initial state of the wrong dtype; unsupported
/// keyword arguments.
pub fn eigsh_lanczos<T: Scalar>(
    cache: &mut KernelCache,
    operator: &LinearOperator<T>,
    args: &OperatorArgs<T>,
    initial_state: impl Into<InitialState<T>>,
    options: &LanczosOptions,
) -> Result<LanczosEigenpairs<T>, KrylovError> {
    let LanczosOptions {
        num_krylov_vecs,
        numeig,
        delta,
        reorthogonalize,
        seed,
        ..
    } = *options;

    if numeig == 0 {
        return Err(KrylovErrorKind::InputError("numeig must be at least 1".into()).into());
    }
    if num_krylov_vecs < numeig {
        return Err(KrylovErrorKind::TooFewKrylovVectors {
            num_krylov_vecs,
            numeig,
        }
        .into());
    }
    if numeig > 1 && !reorthogonalize {
        return Err(KrylovErrorKind::ReorthogonalizationRequired { numeig }.into());
    }
    check_tolerance("delta", delta)?;
    let mut rng = solver_rng(seed);
    let v0 = resolve_initial_state(initial_state.into(), &mut rng)?;

    let bound = bind(cache, operator, args)?;
    let algorithm = Algorithm::Lanczos;
    let run: LanczosRoutine<T> = routine_entry(cache, algorithm)?;
    log::debug!(
        "Running {algorithm} on {} (m = {num_krylov_vecs}, k = {numeig})",
        bound.id()
    );
    let config = LanczosConfig {
        delta,
        reorthogonalize,
        min_vectors: numeig,
    };
    run(&bound, &v0, num_krylov_vecs, numeig, &config, &mut rng)
}

/// Solves `A(x, args) = b` with restarted GMRES.
///
/// The iteration stops once `||b - A x|| <= max(tol * ||b||, atol)` or after `maxiter`
/// restart cycles; [`GmresSolution::status`] is `0` on convergence and the number of
/// restarts consumed otherwise.
///
/// # Errors
/// Invalid-argument errors for an `x0` whose shape differs from `b`, a basis size outside
/// `0 < num_krylov_vectors <= b.len()`, negative tolerances and `maxiter == 0`;
/// unsupported-feature errors for a preconditioner and for keyword arguments.
pub fn gmres<T: Scalar>(
    cache: &mut KernelCache,
    operator: &LinearOperator<T>,
    b: &Tensor<T>,
    args: &OperatorArgs<T>,
    options: &GmresOptions<T>,
) -> Result<GmresSolution<T>, KrylovError> {
    let x0 = match &options.x0 {
        Some(x0) if x0.shape() != b.shape() => {
            return Err(KrylovErrorKind::ShapeMismatch {
                what: "x0",
                expected: b.shape().to_vec(),
                actual: x0.shape().to_vec(),
            }
            .into());
        }
        Some(x0) => x0.clone(),
        None => Tensor::zeros(b.shape()),
    };
    let size = b.len();
    let num_krylov_vectors = options.num_krylov_vectors.unwrap_or(size);
    if num_krylov_vectors == 0 || num_krylov_vectors > size {
        return Err(KrylovErrorKind::KrylovSizeOutOfRange {
            requested: num_krylov_vectors,
            size,
        }
        .into());
    }
    check_tolerance("tol", options.tol)?;
    let atol = options.atol.unwrap_or(options.tol);
    check_tolerance("atol", atol)?;
    if options.maxiter == 0 {
        return Err(KrylovErrorKind::InputError("maxiter must be at least 1".into()).into());
    }
    if options.preconditioner.is_some() {
        return Err(KrylovErrorKind::Unsupported {
            feature: "Preconditioning (M)",
        }
        .into());
    }

    let bound = bind(cache, operator, args)?;
    let algorithm = Algorithm::Gmres;
    let run: GmresRoutine<T> = routine_entry(cache, algorithm)?;
    let threshold = (options.tol * b.norm()).max(atol);
    log::debug!(
        "Running {algorithm} on {} (m = {num_krylov_vectors}, threshold = {threshold:.3e})",
        bound.id()
    );
    run(
        &bound,
        b,
        x0,
        threshold,
        num_krylov_vectors,
        options.maxiter,
    )
}
