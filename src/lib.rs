//! Krylov subspace solvers for tensor-network computations.
//!
//! This crate provides the iterative solvers a tensor-network code needs around its local
//! update steps: a few eigenpairs of a general operator, the lowest eigenpairs of a
//! Hermitian one, and the solution of a square linear system. Operators are never
//! materialized; the solvers only apply them to tensors.
//!
//! ## Solvers
//!
//! **Implicitly restarted Arnoldi** ([`eigs`]): eigenvalues with the largest real part
//! (`LR`) or magnitude (`LM`) of a general operator, returned as complex numbers with
//! their Ritz vectors.
//!
//! **Lanczos** ([`eigsh_lanczos`]): the lowest eigenvalues of a Hermitian operator in
//! ascending order. Requesting more than one eigenpair requires full
//! re-orthogonalization.
//!
//! **Restarted GMRES** ([`gmres`]): solves `A x = b`, reporting a status of `0` on
//! convergence and the number of restarts consumed otherwise.
//!
//! ## Operators and the kernel cache
//!
//! An operator is a [`LinearOperator`], i.e. a function `A(v, args)` with a stable
//! [`OperatorId`]. Solvers take a [`KernelCache`] by mutable reference: the first call with
//! a given operator compiles it once, and later calls with the same operator (or a clone)
//! reuse the compiled kernel. Each iteration routine is likewise compiled once and shared
//! by all operators.
//!
//! ## Example Usage
//!
//! The lowest eigenpair of a small effective Hamiltonian passed as a positional argument,
//! followed by a linear solve with the same operator:
//!
//! ```rust
//! use tn_krylov::{
//!     GmresOptions, KernelCache, LanczosOptions, LinearOperator, OperatorArgs, Tensor,
//!     eigsh_lanczos, gmres,
//! };
//!
//! // H = tridiag(-1, 2, -1) as a [4, 4] tensor.
//! let h = Tensor::<f64>::from_fn(&[4, 4], |k| {
//!     let (i, j) = (k % 4, k / 4);
//!     if i == j { 2.0 } else if i.abs_diff(j) == 1 { -1.0 } else { 0.0 }
//! });
//! let op = LinearOperator::dense_from_args();
//! let args = OperatorArgs::positional(vec![h]);
//! let mut cache = KernelCache::new();
//!
//! let options = LanczosOptions { num_krylov_vecs: 4, seed: Some(0), ..Default::default() };
//! let start = Tensor::from_vec(vec![1.0, 0.5, 0.25, 0.125], &[4]).unwrap();
//! let pairs = eigsh_lanczos(&mut cache, &op, &args, start, &options).unwrap();
//! let exact = 2.0 - 2.0 * (std::f64::consts::PI / 5.0).cos();
//! assert!((pairs.eigenvalues[0] - exact).abs() < 1e-10);
//!
//! let b = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], &[4]).unwrap();
//! let solution = gmres(&mut cache, &op, &b, &args, &GmresOptions::default()).unwrap();
//! assert_eq!(solution.status(), 0);
//!
//! // Both solves went through one compiled kernel.
//! assert_eq!(cache.stats().operator_compilations, 1);
//! ```

pub mod algorithms;
pub mod cache;
pub mod error;
pub mod operator;
pub mod scalar;
pub mod solvers;
pub mod tensor;
pub mod utils;

pub use algorithms::{
    arnoldi::{ArnoldiEigenpairs, Which},
    gmres::GmresSolution,
    lanczos::LanczosEigenpairs,
};
pub use cache::{Algorithm, CacheStats, KernelCache};
pub use error::{ErrorCategory, KrylovError};
pub use operator::{BoundOperator, LinearOperator, OperatorArgs, OperatorId, bind};
pub use scalar::{DType, Scalar, c64};
pub use solvers::{
    EigsOptions, GmresOptions, InitialState, LanczosOptions, eigs, eigsh_lanczos, gmres,
};
pub use tensor::Tensor;
