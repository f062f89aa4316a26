use std::fmt;

use num_complex::{Complex32, Complex64};

/// Element types a tensor can hold.
///
/// Every tag has a fixed byte width, used for all size arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 64-bit IEEE 754 double-precision float
    F64,
    /// Complex number with f32 real and imaginary parts
    Complex32,
    /// Complex number with f64 real and imaginary parts
    Complex64,
}

impl DType {
    /// Size in bytes of a single element.
    pub const fn size(&self) -> usize {
        match self {
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 | DType::Complex32 => 8,
            DType::Complex64 => 16,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype.
    ///
    /// For counts already known to fit, such as a live tensor's. Unvalidated
    /// counts go through [`DType::checked_storage_bytes`].
    pub fn storage_bytes(&self, n: usize) -> usize {
        self.size() * n
    }

    /// Bytes for `n` elements, or `None` if the product overflows `usize`.
    pub fn checked_storage_bytes(&self, n: usize) -> Option<usize> {
        self.size().checked_mul(n)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::I32 => write!(f, "i32"),
            DType::I64 => write!(f, "i64"),
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::Complex32 => write!(f, "c32"),
            DType::Complex64 => write!(f, "c64"),
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// A Rust type that can be stored in a tensor.
///
/// Maps each element type to its [`DType`] tag at compile time. Elements are
/// `Pod`, so any byte pattern written by a fill or a raw copy is a valid value.
pub trait Element:
    bytemuck::Pod + fmt::Debug + PartialEq + Send + Sync + private::Sealed + 'static
{
    const DTYPE: DType;

    /// Write this element the way tensor rendering prints it.
    fn write_element(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

macro_rules! impl_real_element {
    ($($t:ty => $tag:ident),*) => {
        $(
            impl private::Sealed for $t {}

            impl Element for $t {
                const DTYPE: DType = DType::$tag;

                fn write_element(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self)
                }
            }
        )*
    };
}

impl_real_element!(i32 => I32, i64 => I64, f32 => F32, f64 => F64);

macro_rules! impl_complex_element {
    ($($t:ty => $tag:ident),*) => {
        $(
            impl private::Sealed for $t {}

            impl Element for $t {
                const DTYPE: DType = DType::$tag;

                fn write_element(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{{{}, {}}}", self.re, self.im)
                }
            }
        )*
    };
}

impl_complex_element!(Complex32 => Complex32, Complex64 => Complex64);

// =============================================================================
// Numeric conversion table used by cast-copy
// =============================================================================

/// Element-wise numeric conversion from `I`.
///
/// Defined for every pair of element types:
/// - real → real uses `as` (float → int saturates, NaN → 0)
/// - real → complex sets the imaginary part to zero
/// - complex → real keeps the real part
/// - complex → complex converts both parts
pub trait CastFrom<I>: Sized {
    fn cast_from(value: I) -> Self;
}

macro_rules! real_from_real {
    ($out:ty: $($in:ty),*) => {
        $(
            impl CastFrom<$in> for $out {
                #[inline]
                fn cast_from(value: $in) -> $out {
                    value as $out
                }
            }
        )*
    };
}

real_from_real!(i32: i32, i64, f32, f64);
real_from_real!(i64: i32, i64, f32, f64);
real_from_real!(f32: i32, i64, f32, f64);
real_from_real!(f64: i32, i64, f32, f64);

macro_rules! complex_from_real {
    ($out:ty, $part:ty: $($in:ty),*) => {
        $(
            impl CastFrom<$in> for $out {
                #[inline]
                fn cast_from(value: $in) -> $out {
                    <$out>::new(value as $part, 0.0)
                }
            }
        )*
    };
}

complex_from_real!(Complex32, f32: i32, i64, f32, f64);
complex_from_real!(Complex64, f64: i32, i64, f32, f64);

macro_rules! real_from_complex {
    ($out:ty: $($in:ty),*) => {
        $(
            impl CastFrom<$in> for $out {
                #[inline]
                fn cast_from(value: $in) -> $out {
                    value.re as $out
                }
            }
        )*
    };
}

real_from_complex!(i32: Complex32, Complex64);
real_from_complex!(i64: Complex32, Complex64);
real_from_complex!(f32: Complex32, Complex64);
real_from_complex!(f64: Complex32, Complex64);

macro_rules! complex_from_complex {
    ($out:ty, $part:ty: $($in:ty),*) => {
        $(
            impl CastFrom<$in> for $out {
                #[inline]
                fn cast_from(value: $in) -> $out {
                    <$out>::new(value.re as $part, value.im as $part)
                }
            }
        )*
    };
}

complex_from_complex!(Complex32, f32: Complex32, Complex64);
complex_from_complex!(Complex64, f64: Complex32, Complex64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(DType::I32.size(), std::mem::size_of::<i32>());
        assert_eq!(DType::I64.size(), std::mem::size_of::<i64>());
        assert_eq!(DType::F32.size(), std::mem::size_of::<f32>());
        assert_eq!(DType::F64.size(), std::mem::size_of::<f64>());
        assert_eq!(DType::Complex32.size(), std::mem::size_of::<Complex32>());
        assert_eq!(DType::Complex64.size(), std::mem::size_of::<Complex64>());
    }

    #[test]
    fn test_storage_bytes() {
        assert_eq!(DType::F32.storage_bytes(10), 40);
        assert_eq!(DType::Complex64.storage_bytes(3), 48);
        assert_eq!(DType::I64.storage_bytes(0), 0);
    }

    #[test]
    fn test_element_tags() {
        assert_eq!(<i32 as Element>::DTYPE, DType::I32);
        assert_eq!(<i64 as Element>::DTYPE, DType::I64);
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(<f64 as Element>::DTYPE, DType::F64);
        assert_eq!(<Complex32 as Element>::DTYPE, DType::Complex32);
        assert_eq!(<Complex64 as Element>::DTYPE, DType::Complex64);
    }

    #[test]
    fn test_checked_storage_bytes() {
        assert_eq!(DType::F64.checked_storage_bytes(4), Some(32));
        assert_eq!(DType::F64.checked_storage_bytes(1usize << 62), None);
        let n = usize::MAX / 4;
        assert_eq!(DType::I32.checked_storage_bytes(n), Some(n * 4));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", DType::F32), "f32");
        assert_eq!(format!("{}", DType::I64), "i64");
        assert_eq!(format!("{}", DType::Complex64), "c64");
    }

    #[test]
    fn test_casts() {
        assert_eq!(f64::cast_from(1.5f32), 1.5);
        assert_eq!(f32::cast_from(2.25f64), 2.25);
        assert_eq!(i32::cast_from(3.9f64), 3);
        assert_eq!(i32::cast_from(f32::INFINITY), i32::MAX);
        assert_eq!(i64::cast_from(-7i32), -7);
        assert_eq!(Complex64::cast_from(2i32), Complex64::new(2.0, 0.0));
        assert_eq!(f32::cast_from(Complex64::new(1.5, -4.0)), 1.5);
        assert_eq!(
            Complex64::cast_from(Complex32::new(0.5, -0.25)),
            Complex64::new(0.5, -0.25)
        );
    }
}
