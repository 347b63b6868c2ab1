//! Krylov iterations shared by the solvers.
//!
//! ** NOTE: We recommend using the high-level methods in [`crate::solvers`] instead. The
//! modules below take an already-bound operator and perform no argument validation.
//!
//! All three methods grow an orthonormal [`KrylovBasis`] one operator application at a
//! time; they differ in the projected matrix they keep next to it and in how they reduce
//! it:
//!
//! - [`arnoldi`]: upper Hessenberg projection, implicit restarts with exact shifts.
//! - [`lanczos`]: real symmetric tridiagonal projection (three-term recurrence).
//! - [`gmres`]: Hessenberg projection reduced on the fly by Givens rotations.

pub mod arnoldi;
pub mod gmres;
pub mod lanczos;

use crate::{
    scalar::{Scalar, c64},
    tensor::Tensor,
};
use rand::Rng;

/// Relative size below which a freshly orthogonalized vector is treated as zero.
///
/// A new Krylov direction `w` is discarded when `||w|| <= BREAKDOWN_RTOL * ||A v||`, i.e. the
/// image of the last basis vector lies (numerically) inside the current subspace.
pub(crate) const BREAKDOWN_RTOL: f64 = 1e-12;

/// Attempts at drawing a random direction outside the current subspace.
const RANDOM_DIRECTION_ATTEMPTS: usize = 3;

pub(crate) fn is_breakdown(new_norm: f64, image_norm: f64) -> bool {
    new_norm == 0.0 || new_norm <= BREAKDOWN_RTOL * image_norm
}

/// An ordered orthonormal basis of a Krylov subspace.
///
/// The basis is owned by a single solver call and only ever grows through the
/// orthogonalization helpers below, which keep it orthonormal to working precision.
#[derive(Clone, Debug)]
pub struct KrylovBasis<T> {
    vectors: Vec<Tensor<T>>,
}

impl<T: Scalar> KrylovBasis<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            vectors: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[Tensor<T>] {
        &self.vectors
    }

    pub fn get(&self, i: usize) -> &Tensor<T> {
        &self.vectors[i]
    }

    pub(crate) fn push(&mut self, v: Tensor<T>) {
        self.vectors.push(v);
    }

    /// Appends `w / norm`.
    pub(crate) fn push_normalized(&mut self, mut w: Tensor<T>, norm: f64) {
        w.scale(T::from_f64(norm.recip()));
        self.vectors.push(w);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.vectors.truncate(len);
    }

    /// Removes the components of `w` along the first `count` basis vectors.
    ///
    /// Classical Gram-Schmidt followed by one refinement pass ("twice is enough"). Returns
    /// the accumulated projection coefficients `<v_i, w>`.
    pub(crate) fn orthogonalize(&self, w: &mut Tensor<T>, count: usize) -> Vec<T> {
        let mut coeffs = vec![T::zero(); count];
        for _ in 0..2 {
            let pass: Vec<T> = self.vectors[..count].iter().map(|v| v.inner(w)).collect();
            for (v, (&h, total)) in self.vectors[..count]
                .iter()
                .zip(pass.iter().zip(coeffs.iter_mut()))
            {
                w.axpy(-h, v);
                *total += h;
            }
        }
        coeffs
    }

    /// Draws a random unit vector orthogonal to the whole basis.
    ///
    /// Returns `None` when no such vector can be found, i.e. the basis already spans the
    /// space.
    pub(crate) fn random_orthogonal_direction<R: Rng + ?Sized>(
        &self,
        shape: &[usize],
        rng: &mut R,
    ) -> Option<Tensor<T>> {
        for _ in 0..RANDOM_DIRECTION_ATTEMPTS {
            let mut w = Tensor::<T>::random_normal(shape, rng);
            let drawn = w.norm();
            self.orthogonalize(&mut w, self.len());
            let remaining = w.norm();
            if remaining > 1e-8 * drawn {
                w.scale(T::from_f64(remaining.recip()));
                return Some(w);
            }
        }
        None
    }

    /// Applies a plane rotation to the columns `j`, `j + 1` of the basis: `V <- V G^H`.
    pub(crate) fn rotate(&mut self, j: usize, g: &Givens<T>) {
        let (head, tail) = self.vectors.split_at_mut(j + 1);
        let (a, b) = (&mut head[j], &mut tail[0]);
        for (x, y) in a.data_mut().iter_mut().zip(b.data_mut().iter_mut()) {
            let (nx, ny) = g.apply_cols(*x, *y);
            *x = nx;
            *y = ny;
        }
    }

    /// Returns `sum_i coeffs[i] * v_i`.
    pub fn combine(&self, coeffs: &[T]) -> Tensor<T> {
        let mut out = Tensor::zeros(self.vectors[0].shape());
        for (v, &c) in self.vectors.iter().zip(coeffs) {
            out.axpy(c, v);
        }
        out
    }

    /// Returns `sum_i coeffs[i] * v_i` in complex arithmetic.
    pub fn combine_c64(&self, coeffs: &[c64]) -> Tensor<c64> {
        let mut out = Tensor::<c64>::zeros(self.vectors[0].shape());
        for (v, &c) in self.vectors.iter().zip(coeffs) {
            for (o, &x) in out.data_mut().iter_mut().zip(v.data()) {
                *o += c * x.to_c64();
            }
        }
        out
    }

    /// Largest deviation of the Gram matrix `V^H V` from the identity.
    pub fn orthonormality_error(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for (i, vi) in self.vectors.iter().enumerate() {
            for (j, vj) in self.vectors.iter().enumerate().skip(i) {
                let target = if i == j { T::one() } else { T::zero() };
                worst = worst.max((vi.inner(vj) - target).abs());
            }
        }
        worst
    }
}

/// A complex plane rotation `G = [[c, s], [-conj(s), c]]` with real `c`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Givens<T> {
    c: f64,
    s: T,
}

impl<T: Scalar> Givens<T> {
    /// Builds the rotation with `G [a; b] = [r; 0]` and returns it together with `r`.
    pub(crate) fn zeroing(a: T, b: T) -> (Self, T) {
        let (abs_a, abs_b) = (a.abs(), b.abs());
        if abs_b == 0.0 {
            return (
                Self {
                    c: 1.0,
                    s: T::zero(),
                },
                a,
            );
        }
        if abs_a == 0.0 {
            return (Self { c: 0.0, s: T::one() }, b);
        }
        let rho = abs_a.hypot(abs_b);
        let phase = a * T::from_f64(abs_a.recip());
        (
            Self {
                c: abs_a / rho,
                s: phase * b.conj() * T::from_f64(rho.recip()),
            },
            phase * T::from_f64(rho),
        )
    }

    /// Row action `(x, y) -> G (x, y)`.
    #[inline]
    pub(crate) fn apply_rows(&self, x: T, y: T) -> (T, T) {
        let c = T::from_f64(self.c);
        (c * x + self.s * y, c * y - self.s.conj() * x)
    }

    /// Column action `(x, y) -> (x, y) G^H`.
    #[inline]
    pub(crate) fn apply_cols(&self, x: T, y: T) -> (T, T) {
        let c = T::from_f64(self.c);
        (c * x + self.s.conj() * y, c * y - self.s * x)
    }
}
