//! Small replicated dense matrices.
//!
//! Used for the Hessenberg matrix, the projected right-hand side and the
//! Givens coefficients. Every rank holds an identical copy; nothing here
//! communicates.

use hpgmp_kernels::Scalar;

/// Column-major `m × n` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialDenseMatrix<T> {
    m: usize,
    n: usize,
    values: Vec<T>,
}

impl<T: Scalar> SerialDenseMatrix<T> {
    /// Zero matrix.
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            m,
            n,
            values: vec![T::zero(); m * n],
        }
    }

    /// Zero column vector of length `m`.
    pub fn column_vector(m: usize) -> Self {
        Self::new(m, 1)
    }

    pub fn rows(&self) -> usize {
        self.m
    }

    pub fn cols(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.m && j < self.n);
        self.values[i + j * self.m]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        debug_assert!(i < self.m && j < self.n);
        self.values[i + j * self.m] = value;
    }

    #[inline]
    pub fn add(&mut self, i: usize, j: usize, value: T) {
        debug_assert!(i < self.m && j < self.n);
        self.values[i + j * self.m] += value;
    }

    pub fn column(&self, j: usize) -> &[T] {
        &self.values[j * self.m..(j + 1) * self.m]
    }

    pub fn column_mut(&mut self, j: usize) -> &mut [T] {
        &mut self.values[j * self.m..(j + 1) * self.m]
    }

    /// Column-major storage, leading dimension [`rows`](Self::rows).
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = T::zero());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_major_layout() {
        let mut h = SerialDenseMatrix::<f64>::new(3, 2);
        h.set(2, 1, 5.0);
        h.add(2, 1, 1.0);
        assert_eq!(h.as_slice()[2 + 3], 6.0);
        assert_eq!(h.column(1), &[0.0, 0.0, 6.0]);
    }

    #[test]
    fn zero_clears_column_vector() {
        let mut t = SerialDenseMatrix::<f32>::column_vector(2);
        t.set(1, 0, 0.5);
        t.add(1, 0, 0.25);
        assert_eq!(t.get(1, 0), 0.75);
        t.zero();
        assert_eq!(t.as_slice(), &[0.0, 0.0]);
    }
}
