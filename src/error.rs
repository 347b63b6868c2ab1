//! Error types for the Krylov solver layer.
//!
//! All failures are funnelled into a single public type, [`KrylovError`], which wraps
//! a private [`KrylovErrorKind`]. Callers that need to react programmatically use
//! [`KrylovError::category`]: an [`ErrorCategory::Unsupported`] error means the request
//! is well-formed but this backend cannot serve it, whereas
//! [`ErrorCategory::InvalidArgument`] means the call itself must be fixed.
//!
//! Note that [`faer::linalg::evd::EvdError`] does not implement [`std::error::Error`],
//! so it is wrapped manually, as in the other `faer`-based code of this project.
use crate::scalar::DType;
use thiserror::Error;

/// Represents all possible errors raised by the solvers and the operator adapter.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct KrylovError(#[from] KrylovErrorKind);

/// Coarse classification of a [`KrylovError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed parameters; raised before any iteration starts.
    InvalidArgument,
    /// A feature this backend does not implement.
    Unsupported,
    /// An initial state whose element type differs from the operator's.
    TypeMismatch,
    /// A failure inside the dense linear algebra kernels.
    Numerical,
}

/// Private enum containing the distinct kinds of errors.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum KrylovErrorKind {
    /// Occurs when `eigs` is asked for a part of the spectrum other than `LR` or `LM`.
    #[error("which = {which} is currently not supported.")]
    UnsupportedWhich { which: String },

    /// Occurs when the Krylov space is smaller than the number of requested eigenpairs.
    #[error("`num_krylov_vecs` >= `numeig` required! Got num_krylov_vecs = {num_krylov_vecs}, numeig = {numeig}.")]
    TooFewKrylovVectors {
        num_krylov_vecs: usize,
        numeig: usize,
    },

    /// Occurs when Lanczos is asked for several eigenpairs without re-orthogonalization.
    #[error(
        "Got numeig = {numeig} > 1 and `reorthogonalize = false`. Use `reorthogonalize = true` for `numeig > 1`."
    )]
    ReorthogonalizationRequired { numeig: usize },

    /// Occurs when the Krylov dimension is zero or exceeds the size of the problem.
    #[error("num_krylov_vectors must be in 0 < {requested} <= {size}.")]
    KrylovSizeOutOfRange { requested: usize, size: usize },

    /// Occurs when a tolerance (`tol`, `atol`, `delta`) is negative or NaN.
    #[error("{name} = {value} must be non-negative.")]
    NegativeTolerance { name: &'static str, value: f64 },

    /// Occurs when a tensor does not have the shape the call requires.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}.")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A general error for any other invalid input parameter.
    #[error("Invalid input parameter: {0}")]
    InputError(String),

    /// Occurs when a well-formed request needs a feature this backend does not provide.
    #[error("{feature} is not supported by the faer backend.")]
    Unsupported { feature: &'static str },

    /// Occurs when a requested element type differs from the operator's scalar type.
    #[error("Expected a tensor of dtype {expected}. Got {found}.")]
    TypeMismatch { expected: DType, found: DType },

    /// Wraps a failure of the dense eigensolver applied to the projected matrix.
    #[error("A numerical error occurred during the eigendecomposition of the projected matrix: {0:?}")]
    EvdError(faer::linalg::evd::EvdError),
}

impl KrylovError {
    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match &self.0 {
            KrylovErrorKind::Unsupported { .. } => ErrorCategory::Unsupported,
            KrylovErrorKind::TypeMismatch { .. } => ErrorCategory::TypeMismatch,
            KrylovErrorKind::EvdError(_) => ErrorCategory::Numerical,
            _ => ErrorCategory::InvalidArgument,
        }
    }

    /// Whether the call itself was malformed.
    pub fn is_invalid_argument(&self) -> bool {
        self.category() == ErrorCategory::InvalidArgument
    }

    /// Whether the request is valid but needs a feature this backend lacks.
    pub fn is_unsupported(&self) -> bool {
        self.category() == ErrorCategory::Unsupported
    }

    /// Whether an element type did not match the operator.
    pub fn is_type_mismatch(&self) -> bool {
        self.category() == ErrorCategory::TypeMismatch
    }
}

impl From<faer::linalg::evd::EvdError> for KrylovError {
    fn from(e: faer::linalg::evd::EvdError) -> Self {
        KrylovError(KrylovErrorKind::EvdError(e))
    }
}

// Manually implement PartialEq for the public error type.
impl PartialEq for KrylovError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
