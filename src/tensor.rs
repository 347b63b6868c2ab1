//! Dense column-major tensors, the vector space the solvers iterate in.
//!
//! A Krylov solver never looks at the structure of the vectors it manipulates: it only
//! needs linear combinations, inner products and norms. [`Tensor`] provides exactly that
//! on top of a flat column-major buffer, which also makes zero-copy views into `faer`
//! matrices possible (see [`Tensor::as_faer_mat`]).

use crate::{
    error::{KrylovError, KrylovErrorKind},
    scalar::{DType, Scalar, c64},
};
use faer::{Mat, MatRef};
use rand::Rng;

/// A dense tensor with column-major storage.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Scalar> Tensor<T> {
    /// Creates a tensor from raw column-major data.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, KrylovError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(KrylovErrorKind::InputError(format!(
                "tensor of shape {shape:?} needs {expected} elements, got {}",
                data.len()
            ))
            .into());
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Creates a tensor by evaluating `f` at every linear (column-major) index.
    pub fn from_fn(shape: &[usize], f: impl FnMut(usize) -> T) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: (0..len).map(f).collect(),
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_fn(shape, |_| T::zero())
    }

    /// Samples every element from the standard normal distribution.
    pub fn random_normal<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        Self::from_fn(shape, |_| T::sample_normal(rng))
    }

    /// Copies a `faer` matrix into a tensor of shape `[nrows, ncols]`.
    pub fn from_mat(mat: MatRef<'_, T>) -> Self {
        let (nrows, ncols) = (mat.nrows(), mat.ncols());
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(mat[(i, j)]);
            }
        }
        Self {
            shape: vec![nrows, ncols],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Returns a tensor with the same data and a new shape.
    pub fn reshape(self, shape: &[usize]) -> Result<Self, KrylovError> {
        Self::from_vec(self.data, shape)
    }

    /// Views the data as a column-major `faer` matrix (zero-copy).
    ///
    /// # Panics
    ///
    /// Panics if `nrows * ncols != self.len()`.
    pub fn as_faer_mat(&self, nrows: usize, ncols: usize) -> MatRef<'_, T> {
        assert_eq!(
            nrows * ncols,
            self.len(),
            "Matrix dimensions ({} x {}) must match tensor size ({})",
            nrows,
            ncols,
            self.len()
        );
        MatRef::from_column_major_slice(&self.data, nrows, ncols)
    }

    /// Views the flattened data as a `faer` column (`len x 1`, zero-copy).
    pub fn as_faer_col(&self) -> MatRef<'_, T> {
        MatRef::from_column_major_slice(&self.data, self.len(), 1)
    }

    /// Copies the data into an owned `faer` column vector (`len x 1`).
    pub fn to_faer_col(&self) -> Mat<T> {
        self.as_faer_col().to_owned()
    }

    /// Copies a `faer` column into a tensor of the given shape.
    ///
    /// # Panics
    ///
    /// Panics if `column` is not a single column holding `prod(shape)` elements.
    pub fn from_faer_col(column: MatRef<'_, T>, shape: &[usize]) -> Self {
        let len: usize = shape.iter().product();
        assert_eq!(
            (column.nrows(), column.ncols()),
            (len, 1),
            "a column of {len} elements is needed for shape {shape:?}"
        );
        Self::from_fn(shape, |i| column[(i, 0)])
    }

    /// Euclidean norm of the flattened tensor.
    pub fn norm(&self) -> f64 {
        self.as_faer_col().norm_l2()
    }

    /// Inner product `<self, other> = sum(conj(self_i) * other_i)`.
    ///
    /// # Panics
    ///
    /// Panics if the two tensors have different lengths.
    pub fn inner(&self, other: &Self) -> T {
        assert_eq!(self.len(), other.len(), "inner product of unequal lengths");
        let product = self.as_faer_col().adjoint() * other.as_faer_col();
        product[(0, 0)]
    }

    /// In-place `self += alpha * x`.
    pub fn axpy(&mut self, alpha: T, x: &Self) {
        assert_eq!(self.len(), x.len(), "axpy of unequal lengths");
        for (y, &xi) in self.data.iter_mut().zip(&x.data) {
            *y += alpha * xi;
        }
    }

    /// In-place `self *= alpha`.
    pub fn scale(&mut self, alpha: T) {
        for y in &mut self.data {
            *y = *y * alpha;
        }
    }

    pub fn scaled(&self, alpha: T) -> Self {
        let mut out = self.clone();
        out.scale(alpha);
        out
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a + b)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a - b)
    }

    /// Elementwise (Hadamard) product.
    pub fn mul(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a * b)
    }

    /// Elementwise quotient.
    pub fn div(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a / b)
    }

    pub fn conj(&self) -> Self {
        self.map(|x| x.conj())
    }

    pub fn map<U: Scalar>(&self, f: impl Fn(T) -> U) -> Tensor<U> {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Promotes to complex storage.
    pub fn to_c64(&self) -> Tensor<c64> {
        self.map(|x| x.to_c64())
    }

    /// Contracts the trailing axes of `self` with all axes of `v`.
    ///
    /// With `self` of shape `[a.., b..]` and `v` of shape `[b..]` the result has shape
    /// `[a..]`. For a matrix `[n, n]` and a vector `[n]` this is the matrix-vector product.
    ///
    /// # Panics
    ///
    /// Panics if the trailing axes of `self` do not match the shape of `v`.
    pub fn tensordot_vector(&self, v: &Self) -> Self {
        let rank = v.shape.len();
        assert!(
            self.shape.len() >= rank && self.shape[self.shape.len() - rank..] == v.shape[..],
            "Dimension mismatch: cannot contract tensor of shape {:?} with vector of shape {:?}.",
            self.shape,
            v.shape,
        );
        let out_shape = &self.shape[..self.shape.len() - rank];
        let nrows: usize = out_shape.iter().product();
        let product = self.as_faer_mat(nrows, v.len()) * v.as_faer_col();
        Self::from_faer_col(product.as_ref(), out_shape)
    }

    fn zip_with(&self, other: &Self, f: impl Fn(T, T) -> T) -> Self {
        assert_eq!(
            self.shape, other.shape,
            "elementwise operation on tensors of shapes {:?} and {:?}",
            self.shape, other.shape
        );
        Self {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }
}
