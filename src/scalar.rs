//! Scalar element types supported by the Krylov solvers.
//!
//! Every solver in this crate is generic over a [`Scalar`], which wraps `faer`'s
//! [`ComplexField`] with the plain arithmetic operators the Krylov recurrences are
//! written in, plus a runtime [`DType`] tag. The tag exists because callers may ask
//! for a random starting vector by `(shape, dtype)`; that request is checked against
//! the scalar type the operator is instantiated with.

use faer::traits::ComplexField;
use rand::Rng;
use rand_distr::StandardNormal;
use std::{
    fmt::{self, Debug},
    ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

pub use faer::c64;

/// Runtime tag for the element type of a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Float64,
    Complex128,
}

impl DType {
    /// Whether elements of this type carry an imaginary part.
    pub fn is_complex(self) -> bool {
        matches!(self, DType::Complex128)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Float64 => write!(f, "float64"),
            DType::Complex128 => write!(f, "complex128"),
        }
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float64" | "f64" => Ok(DType::Float64),
            "complex128" | "c64" => Ok(DType::Complex128),
            other => Err(format!("unknown dtype `{other}`")),
        }
    }
}

/// Element type of tensors handled by the solvers.
///
/// Implemented for `f64` and [`c64`]. Norms and Ritz values of Hermitian problems are
/// always reported as `f64`; general eigenvalues are reported as [`c64`].
pub trait Scalar:
    ComplexField<Real = f64>
    + Copy
    + Debug
    + Default
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
{
    /// The runtime tag of this type.
    const DTYPE: DType;

    fn zero() -> Self {
        Self::default()
    }

    fn one() -> Self {
        Self::from_f64(1.0)
    }

    fn from_f64(value: f64) -> Self;

    /// Converts from a complex number. Real types keep only the real part.
    fn from_c64(value: c64) -> Self;

    fn to_c64(self) -> c64;

    fn conj(self) -> Self;

    /// Modulus `|x|`.
    fn abs(self) -> f64;

    fn real(self) -> f64;

    /// Draws from the standard (complex) normal distribution.
    fn sample_normal<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

impl Scalar for f64 {
    const DTYPE: DType = DType::Float64;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn from_c64(value: c64) -> Self {
        value.re
    }

    #[inline]
    fn to_c64(self) -> c64 {
        c64::new(self, 0.0)
    }

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn abs(self) -> f64 {
        f64::abs(self)
    }

    #[inline]
    fn real(self) -> f64 {
        self
    }

    fn sample_normal<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }
}

impl Scalar for c64 {
    const DTYPE: DType = DType::Complex128;

    #[inline]
    fn from_f64(value: f64) -> Self {
        c64::new(value, 0.0)
    }

    #[inline]
    fn from_c64(value: c64) -> Self {
        value
    }

    #[inline]
    fn to_c64(self) -> c64 {
        self
    }

    #[inline]
    fn conj(self) -> Self {
        c64::new(self.re, -self.im)
    }

    #[inline]
    fn abs(self) -> f64 {
        self.re.hypot(self.im)
    }

    #[inline]
    fn real(self) -> f64 {
        self.re
    }

    fn sample_normal<R: Rng + ?Sized>(rng: &mut R) -> Self {
        // Real and imaginary parts are N(0, 1/2) so that E|z|^2 = 1.
        let scale = std::f64::consts::FRAC_1_SQRT_2;
        c64::new(
            rng.sample::<f64, _>(StandardNormal) * scale,
            rng.sample::<f64, _>(StandardNormal) * scale,
        )
    }
}
