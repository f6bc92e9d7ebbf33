//! Dense visibility cubes and the kernels applied to them.

use core::fmt;
use core::ops::{Add, Mul};

/// Axis lengths `(times, baselines, frequencies, polarizations)`.
pub type Shape = [usize; 4];

/// Errors raised by the array kernels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Two operands had different shapes.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Shape of the first operand.
        expected: Shape,
        /// Shape of the offending operand.
        found: Shape,
    },
}

/// Single-precision complex number.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Complex32 {
    /// Real part.
    pub re: f32,
    /// Imaginary part.
    pub im: f32,
}

impl Complex32 {
    /// Zero.
    pub const ZERO: Self = Self { re: 0.0, im: 0.0 };

    /// Creates a complex number from its parts.
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    /// Magnitude.
    pub fn norm(self) -> f32 {
        self.re.hypot(self.im)
    }

    /// True if either part is NaN.
    pub fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }

    /// Multiplies both parts by a real factor.
    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.re * factor, self.im * factor)
    }
}

impl Add for Complex32 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Mul for Complex32 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl fmt::Display for Complex32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im.is_sign_negative() {
            write!(f, "{}-{}j", self.re, -self.im)
        } else {
            write!(f, "{}+{}j", self.re, self.im)
        }
    }
}

/// Dense row-major 4-D array.
#[derive(Clone, PartialEq)]
pub struct Cube<T> {
    shape: Shape,
    data: Vec<T>,
}

impl<T> Cube<T> {
    /// Builds a cube by calling `f` once per element in row-major order.
    pub fn from_fn(shape: Shape, mut f: impl FnMut() -> T) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        data.resize_with(len, &mut f);
        Self { shape, data }
    }

    /// Wraps existing row-major data.
    ///
    /// # Errors
    ///
    /// [`KernelError::ShapeMismatch`] if `data` does not hold exactly
    /// `shape.iter().product()` elements.
    pub fn from_vec(shape: Shape, data: Vec<T>) -> Result<Self, KernelError> {
        if data.len() != shape.iter().product::<usize>() {
            return Err(KernelError::ShapeMismatch {
                expected: shape,
                found: [data.len(), 1, 1, 1],
            });
        }
        Ok(Self { shape, data })
    }

    /// Axis lengths.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if any axis has length zero.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the element data in bytes.
    pub fn nbytes(&self) -> usize {
        self.data.len() * size_of::<T>()
    }

    /// Elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Element at `[t, b, f, p]`, if in bounds.
    pub fn get(&self, index: Shape) -> Option<&T> {
        if index.iter().zip(&self.shape).any(|(i, n)| i >= n) {
            return None;
        }
        let [_, b, f, p] = self.shape;
        let offset = ((index[0] * b + index[1]) * f + index[2]) * p + index[3];
        self.data.get(offset)
    }

    fn check_shape<U>(&self, other: &Cube<U>) -> Result<(), KernelError> {
        if self.shape == other.shape {
            Ok(())
        } else {
            Err(KernelError::ShapeMismatch {
                expected: self.shape,
                found: other.shape,
            })
        }
    }
}

impl<T> fmt::Debug for Cube<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cube")
            .field("type", &core::any::type_name::<T>())
            .field("shape", &self.shape)
            .field("nbytes", &self.nbytes())
            .finish()
    }
}

/// Raises a flag wherever the visibility amplitude exceeds this value.
pub const FLAG_THRESHOLD: f32 = 1.2;

/// Returns `flag | (|vis| > FLAG_THRESHOLD)` element-wise.
///
/// # Errors
///
/// [`KernelError::ShapeMismatch`] if the cubes differ in shape.
pub fn flag_outliers(vis: &Cube<Complex32>, flag: &Cube<u8>) -> Result<Cube<u8>, KernelError> {
    vis.check_shape(flag)?;
    let data = vis
        .data
        .iter()
        .zip(&flag.data)
        .map(|(v, &f)| f | u8::from(v.norm() > FLAG_THRESHOLD))
        .collect();
    Ok(Cube {
        shape: vis.shape,
        data,
    })
}

/// Sums `vis * weight` over every element whose flag is non-zero, skipping
/// NaN products.
///
/// # Errors
///
/// [`KernelError::ShapeMismatch`] if the cubes differ in shape.
pub fn flagged_weighted_sum(
    vis: &Cube<Complex32>,
    weight: &Cube<f32>,
    flag: &Cube<u8>,
) -> Result<Complex32, KernelError> {
    vis.check_shape(weight)?;
    vis.check_shape(flag)?;
    let sum = vis
        .data
        .iter()
        .zip(&weight.data)
        .zip(&flag.data)
        .filter(|&(_, &f)| f != 0)
        .map(|((v, &w), _)| v.scale(w))
        .filter(|product| !product.is_nan())
        .fold(Complex32::ZERO, Add::add);
    Ok(sum)
}
