//! Distributed vectors.

use hpgmp_kernels::{KernelBackend, Scalar, copy_cast, scale};

/// The local part of a distributed vector.
///
/// Entries `0..nrow` are owned by this process. When the vector is allocated
/// with a matrix's column count, the tail `nrow..ncol` holds halo copies of
/// neighbor entries; they are only meaningful right after a halo exchange on
/// that matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T> {
    values: Vec<T>,
}

impl<T: Scalar> Vector<T> {
    /// Zero vector of `len` entries.
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![T::zero(); len],
        }
    }

    /// Wrap existing values.
    pub fn from_vec(values: Vec<T>) -> Self {
        Self { values }
    }

    /// Vector of `len` copies of `value`.
    pub fn filled(len: usize, value: T) -> Self {
        Self {
            values: vec![value; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn into_vec(self) -> Vec<T> {
        self.values
    }

    pub fn zero(&mut self) {
        self.fill(T::zero());
    }

    pub fn fill(&mut self, value: T) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    /// Multiply every entry by `s`, computed in the precision of `s`.
    pub fn scale<S: Scalar>(&mut self, s: S, backend: KernelBackend) {
        scale(&mut self.values, s, backend);
    }

    /// Copy the leading `src.len()` entries from another vector, converting
    /// precision. Entries beyond `src.len()` are left untouched.
    pub fn copy_from<S: Scalar>(&mut self, src: &Vector<S>) {
        copy_cast(src.as_slice(), &mut self.values);
    }

    /// Whether any of the first `n` entries is NaN.
    pub fn has_nan(&self, n: usize) -> bool {
        self.values[..n.min(self.values.len())]
            .iter()
            .any(|v| v.is_nan())
    }

    /// Precision-converted copy.
    pub fn to_precision<U: Scalar>(&self) -> Vector<U> {
        Vector {
            values: self.values.iter().map(|v| v.cast()).collect(),
        }
    }
}

impl<T> std::ops::Index<usize> for Vector<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.values[i]
    }
}

impl<T> std::ops::IndexMut<usize> for Vector<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.values[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_from_keeps_halo_tail() {
        let src = Vector::<f64>::filled(3, 2.0);
        let mut dst = Vector::<f32>::filled(5, -1.0);
        dst.copy_from(&src);
        assert_eq!(dst.as_slice(), &[2.0, 2.0, 2.0, -1.0, -1.0]);
    }

    #[test]
    fn scale_in_wider_precision() {
        let mut v = Vector::from_vec(vec![1.0f32, 2.0, 3.0]);
        v.scale(2.0f64, KernelBackend::Reference);
        assert_eq!(v.as_slice(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn nan_detection_limited_to_prefix() {
        let v = Vector::from_vec(vec![1.0, 2.0, f64::NAN]);
        assert!(!v.has_nan(2));
        assert!(v.has_nan(3));
    }
}
