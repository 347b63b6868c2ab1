//! Linear operators and the adapter that binds them to the compile cache.
//!
//! Krylov methods never need the entries of a matrix, only its action on a vector. An
//! operator is therefore just a function `A(v, args)` mapping a tensor to a tensor of the
//! same shape, where `args` are auxiliary tensors fixed for the duration of a solve (in
//! tensor-network code these are typically the environment tensors of a local
//! eigenproblem).
//!
//! Every [`LinearOperator`] carries an [`OperatorId`] handed out at construction time. The
//! id, not the closure, is what the [`KernelCache`] keys on: clones share an id and hit
//! the cache, while two operators built from identical closures are distinct and each
//! get compiled once.
//!
//! [`bind`] is the adapter the solvers go through. It rejects keyword arguments, looks up
//! (or compiles) the operator, and returns a [`BoundOperator`] with the positional
//! arguments baked in.

use crate::{
    cache::{CompiledOperator, KernelCache},
    error::{KrylovError, KrylovErrorKind},
    scalar::Scalar,
    tensor::Tensor,
};
use faer::{Mat, sparse::SparseColMat};
use std::{
    cell::Cell,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Signature of a matrix-vector product with auxiliary positional arguments.
pub type MatVecFn<T> = dyn Fn(&Tensor<T>, &[Tensor<T>]) -> Tensor<T> + Send + Sync;

static NEXT_OPERATOR_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque identity of a [`LinearOperator`], used as the cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId(u64);

impl OperatorId {
    fn fresh() -> Self {
        OperatorId(NEXT_OPERATOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// A square linear map on tensors of a fixed shape, defined by its action.
///
/// # Example
///
/// ```
/// use tn_krylov::{LinearOperator, OperatorArgs, Tensor, KernelCache, operator::bind};
///
/// // A(x, h) = h . x, the usual pattern for a local effective Hamiltonian.
/// let op = LinearOperator::<f64>::new(|x, args| args[0].tensordot_vector(x));
/// let h = Tensor::from_vec(vec![2.0, 0.0, 0.0, 3.0], &[2, 2]).unwrap();
/// let args = OperatorArgs::positional(vec![h]);
///
/// let mut cache = KernelCache::new();
/// let bound = bind(&mut cache, &op, &args).unwrap();
/// let y = bound.apply(&Tensor::from_vec(vec![1.0, 1.0], &[2]).unwrap()).unwrap();
/// assert_eq!(y.data(), &[2.0, 3.0]);
/// ```
pub struct LinearOperator<T> {
    id: OperatorId,
    kernel: Arc<MatVecFn<T>>,
}

impl<T> Clone for LinearOperator<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kernel: Arc::clone(&self.kernel),
        }
    }
}

impl<T> fmt::Debug for LinearOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearOperator")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<T: Scalar> LinearOperator<T> {
    /// Wraps `f` with a fresh identity.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Tensor<T>, &[Tensor<T>]) -> Tensor<T> + Send + Sync + 'static,
    {
        Self {
            id: OperatorId::fresh(),
            kernel: Arc::new(f),
        }
    }

    /// An operator applying a square dense matrix to vectors of length `matrix.nrows()`.
    ///
    /// The output keeps the shape of the input, so the operator also acts on tensors whose
    /// total size matches the matrix dimension.
    ///
    /// # Panics
    ///
    /// Applying the operator panics if the input size does not match the matrix columns.
    pub fn from_dense(matrix: Mat<T>) -> Self {
        assert_eq!(
            matrix.nrows(),
            matrix.ncols(),
            "A linear operator must be square, got {} x {}.",
            matrix.nrows(),
            matrix.ncols()
        );
        Self::new(move |v, _| {
            assert_eq!(
                matrix.ncols(),
                v.len(),
                "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
                matrix.ncols(),
                v.len(),
            );
            let y = matrix.as_ref() * v.as_faer_col();
            Tensor::from_faer_col(y.as_ref(), v.shape())
        })
    }

    /// The operator `A(x, h, ..) = h . x` that contracts its first positional argument with
    /// the input vector.
    ///
    /// # Panics
    ///
    /// Applying the operator panics if no positional argument is supplied.
    pub fn dense_from_args() -> Self {
        Self::new(|v, args| {
            assert!(
                !args.is_empty(),
                "dense_from_args expects the operator tensor as its first argument"
            );
            args[0].tensordot_vector(v)
        })
    }

    pub fn id(&self) -> OperatorId {
        self.id
    }

    pub(crate) fn kernel(&self) -> &Arc<MatVecFn<T>> {
        &self.kernel
    }
}

impl LinearOperator<f64> {
    /// An operator applying a square sparse matrix, e.g. one read by
    /// [`crate::utils::matrix_market`].
    ///
    /// # Panics
    ///
    /// Applying the operator panics if the input size does not match the matrix columns.
    pub fn from_sparse(matrix: &SparseColMat<usize, f64>) -> Self {
        assert_eq!(
            matrix.nrows(),
            matrix.ncols(),
            "A linear operator must be square, got {} x {}.",
            matrix.nrows(),
            matrix.ncols()
        );
        let matrix = matrix.clone();
        Self::new(move |v, _| {
            assert_eq!(
                matrix.ncols(),
                v.len(),
                "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
                matrix.ncols(),
                v.len(),
            );
            let x = v.to_faer_col();
            let y = &matrix * &x;
            Tensor::from_faer_col(y.as_ref(), v.shape())
        })
    }
}

/// Auxiliary arguments passed to an operator on every application.
///
/// Keyword arguments can be recorded but every solver of this backend rejects them.
#[derive(Clone, Debug)]
pub struct OperatorArgs<T> {
    positional: Vec<Tensor<T>>,
    keyword: Vec<(String, Tensor<T>)>,
}

impl<T> Default for OperatorArgs<T> {
    fn default() -> Self {
        Self {
            positional: Vec::new(),
            keyword: Vec::new(),
        }
    }
}

impl<T> OperatorArgs<T> {
    /// No auxiliary arguments.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn positional(positional: Vec<Tensor<T>>) -> Self {
        Self {
            positional,
            keyword: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: Tensor<T>) -> Self {
        self.keyword.push((name.into(), value));
        self
    }

    pub fn positional_args(&self) -> &[Tensor<T>] {
        &self.positional
    }

    pub fn has_keywords(&self) -> bool {
        !self.keyword.is_empty()
    }
}

/// An operator with its compiled kernel and positional arguments bound: `v -> A(v, args)`.
pub struct BoundOperator<'a, T> {
    compiled: Arc<CompiledOperator<T>>,
    args: &'a [Tensor<T>],
    applications: Cell<usize>,
}

impl<T: Scalar> BoundOperator<'_, T> {
    /// Applies the operator, checking that it preserves the shape of `v`.
    pub fn apply(&self, v: &Tensor<T>) -> Result<Tensor<T>, KrylovError> {
        let out = self.compiled.call(v, self.args);
        self.applications.set(self.applications.get() + 1);
        if out.shape() != v.shape() {
            return Err(KrylovErrorKind::ShapeMismatch {
                what: "operator output",
                expected: v.shape().to_vec(),
                actual: out.shape().to_vec(),
            }
            .into());
        }
        Ok(out)
    }

    /// Number of operator applications performed through this binding.
    pub fn applications(&self) -> usize {
        self.applications.get()
    }

    pub fn id(&self) -> OperatorId {
        self.compiled.id()
    }
}

/// Binds `operator` and `args` into a callable, compiling the operator on first use.
///
/// Keyword arguments are rejected: the compiled kernel only accepts positional ones.
pub fn bind<'a, T: Scalar>(
    cache: &mut KernelCache,
    operator: &LinearOperator<T>,
    args: &'a OperatorArgs<T>,
) -> Result<BoundOperator<'a, T>, KrylovError> {
    if args.has_keywords() {
        return Err(KrylovErrorKind::Unsupported {
            feature: "Keyword arguments to the operator (A_kwargs)",
        }
        .into());
    }
    let compiled = cache
        .compiled_operator(operator.id(), operator.kernel())
        .map_err(|found| KrylovErrorKind::TypeMismatch {
            expected: T::DTYPE,
            found,
        })?;
    Ok(BoundOperator {
        compiled,
        args: args.positional_args(),
        applications: Cell::new(0),
    })
}
