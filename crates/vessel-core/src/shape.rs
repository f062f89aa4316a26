use smallvec::SmallVec;
use std::fmt;

use crate::error::VesselError;
use crate::Result;

/// Reshape sentinel meaning "compute this extent from the element count".
pub const INFER_DIM: isize = -1;

/// Tensor shape with stack-allocated storage for ≤4 dimensions.
///
/// Axis order is insertion order. The empty shape is a scalar with one element.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    /// Scalar shape (0 dimensions).
    pub fn scalar() -> Self {
        Self {
            dims: SmallVec::new(),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. An empty shape has one element.
    ///
    /// Overflow is not checked; shapes from outside go through
    /// [`Shape::checked_numel`] first.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Total number of elements, or `None` if the product overflows `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Get dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Get size of a specific dimension.
    ///
    /// # Panics
    /// Panics if `axis >= ndim()`.
    pub fn dim_size(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    /// Resize one dimension in place.
    ///
    /// # Panics
    /// Panics if `axis >= ndim()`.
    pub fn set_dim_size(&mut self, axis: usize, size: usize) {
        self.dims[axis] = size;
    }

    /// Append a new trailing dimension.
    pub fn add_dim(&mut self, size: usize) {
        self.dims.push(size);
    }

    /// Remove the dimension at `axis`, shifting later axes down.
    ///
    /// # Panics
    /// Panics if `axis >= ndim()`.
    pub fn remove_dim(&mut self, axis: usize) {
        self.dims.remove(axis);
    }

    /// Whether this is a scalar (0-dimensional).
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Compute default strides for a contiguous row-major layout.
    pub fn contiguous_strides(&self) -> SmallVec<[usize; 4]> {
        let ndim = self.dims.len();
        if ndim == 0 {
            return SmallVec::new();
        }
        let mut strides = SmallVec::from_elem(0usize, ndim);
        strides[ndim - 1] = 1;
        for i in (0..ndim - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Validate and compute a reshape target with the same element count.
    ///
    /// Every target extent must be ≥ 1, except at most one [`INFER_DIM`],
    /// whose value is computed so the total element count is unchanged.
    pub fn resolve_reshape(&self, target: &[isize]) -> Result<Shape> {
        let numel = self.numel();
        let invalid = |reason: &'static str| VesselError::InvalidReshape {
            numel,
            target: target.to_vec(),
            reason,
        };

        let mut inferred_idx = None;
        let mut known_product: usize = 1;

        for (i, &d) in target.iter().enumerate() {
            if d == INFER_DIM {
                if inferred_idx.is_some() {
                    return Err(invalid("only one dimension can be inferred"));
                }
                inferred_idx = Some(i);
            } else if d < 1 {
                return Err(invalid("dimensions must be >= 1 or -1 (inferred)"));
            } else {
                known_product = known_product
                    .checked_mul(d as usize)
                    .ok_or_else(|| invalid("total number of elements does not match"))?;
            }
        }

        let mut dims: SmallVec<[usize; 4]> = target
            .iter()
            .map(|&d| if d == INFER_DIM { 0 } else { d as usize })
            .collect();

        match inferred_idx {
            Some(idx) => {
                let inferred = numel / known_product;
                if inferred < 1 || inferred * known_product != numel {
                    return Err(invalid("total number of elements does not match"));
                }
                dims[idx] = inferred;
            }
            None => {
                if known_product != numel {
                    return Err(invalid("total number of elements does not match"));
                }
            }
        }

        Ok(Shape { dims })
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape {
            dims: SmallVec::from_vec(dims),
        }
    }
}

macro_rules! impl_shape_from_array {
    ($($n:expr),*) => {
        $(
            impl From<[usize; $n]> for Shape {
                fn from(dims: [usize; $n]) -> Self {
                    Shape::new(&dims)
                }
            }
        )*
    };
}

impl_shape_from_array!(0, 1, 2, 3, 4, 5, 6);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1);
        assert!(s.is_scalar());
        assert_eq!(s, Shape::default());
    }

    #[test]
    fn test_basic_shape() {
        let s = Shape::new(&[2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.dim_size(0), 2);
        assert_eq!(s.dim_size(2), 4);
        assert_eq!(s.dim_size(1), 3);
    }

    #[test]
    fn test_checked_numel() {
        assert_eq!(Shape::new(&[2, 3, 4]).checked_numel(), Some(24));
        assert_eq!(Shape::scalar().checked_numel(), Some(1));
        assert_eq!(Shape::new(&[usize::MAX, 2]).checked_numel(), None);
        assert_eq!(Shape::new(&[usize::MAX, 0]).checked_numel(), Some(0));
    }

    #[test]
    fn test_zero_extent() {
        let s = Shape::new(&[3, 0, 2]);
        assert_eq!(s.numel(), 0);
    }

    #[test]
    fn test_size_manipulation() {
        let mut shape = Shape::new(&[2, 3]);
        shape.add_dim(4);
        assert_eq!(shape.dims(), &[2, 3, 4]);

        shape.remove_dim(1);
        assert_eq!(shape.dims(), &[2, 4]);

        shape.set_dim_size(1, 5);
        assert_eq!(shape.dim_size(1), 5);
        assert_eq!(shape.numel(), 10);
    }

    #[test]
    #[should_panic]
    fn test_dim_size_out_of_range() {
        Shape::new(&[2]).dim_size(1);
    }

    #[test]
    fn test_comparison() {
        let a = Shape::new(&[2, 3, 4]);
        let b: Shape = [2, 3, 4].into();
        let c = Shape::new(&[3, 3, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Shape::new(&[2, 3]));
    }

    #[test]
    fn test_contiguous_strides() {
        let s = Shape::new(&[2, 3, 4]);
        assert_eq!(s.contiguous_strides().as_slice(), &[12, 4, 1]);
        assert!(Shape::scalar().contiguous_strides().is_empty());
    }

    #[test]
    fn test_reshape() {
        let s = Shape::new(&[2, 3, 4]);
        assert_eq!(s.resolve_reshape(&[6, 4]).unwrap().dims(), &[6, 4]);
        assert_eq!(s.resolve_reshape(&[-1, 4]).unwrap().dims(), &[6, 4]);
        assert_eq!(s.resolve_reshape(&[2, -1]).unwrap().dims(), &[2, 12]);
        assert_eq!(s.resolve_reshape(&[24]).unwrap().dims(), &[24]);
    }

    #[test]
    fn test_reshape_errors() {
        let s = Shape::new(&[2, 3, 4]);
        let reason = |r: Result<Shape>| match r {
            Err(VesselError::InvalidReshape { reason, .. }) => reason,
            other => panic!("expected InvalidReshape, got {:?}", other),
        };
        assert!(reason(s.resolve_reshape(&[-1, -1])).contains("only one"));
        assert!(reason(s.resolve_reshape(&[0, 24])).contains(">= 1"));
        assert!(reason(s.resolve_reshape(&[-2, 12])).contains(">= 1"));
        assert!(reason(s.resolve_reshape(&[5, 5])).contains("does not match"));
        assert!(reason(s.resolve_reshape(&[5, -1])).contains("does not match"));
    }

    #[test]
    fn test_reshape_empty_tensor_cannot_infer() {
        let s = Shape::new(&[0, 3]);
        assert!(s.resolve_reshape(&[-1, 3]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Shape::new(&[2, 3, 4])), "[2,3,4]");
        assert_eq!(format!("{}", Shape::scalar()), "[]");
        assert_eq!(format!("{:?}", Shape::new(&[2])), "Shape([2])");
    }

    #[test]
    fn test_from_array() {
        let s: Shape = [2, 3].into();
        assert_eq!(s.dims(), &[2, 3]);

        let s: Shape = vec![1, 2, 3, 4].into();
        assert_eq!(s.numel(), 24);
    }
}
