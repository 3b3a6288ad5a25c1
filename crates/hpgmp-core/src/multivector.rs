//! Blocks of distributed vectors (the Krylov basis).
//!
//! A [`MultiVector`] stores `n` columns of `local_length` entries each,
//! contiguously in column-major order, so that any leading range of columns
//! is itself a column-major block that the dense kernels can consume.
//! Sub-ranges are handed out as borrowed [`MultiVectorView`]s; the borrow
//! checker keeps the owner from being reallocated while a view is alive.

use hpgmp_kernels::Scalar;

/// Owned column-major block of `n` vectors.
#[derive(Debug, Clone)]
pub struct MultiVector<T> {
    local_length: usize,
    n: usize,
    values: Vec<T>,
}

/// Read-only window onto consecutive columns of a [`MultiVector`].
#[derive(Debug, Clone, Copy)]
pub struct MultiVectorView<'a, T> {
    local_length: usize,
    n: usize,
    values: &'a [T],
}

impl<T: Scalar> MultiVector<T> {
    /// Zero block of `n` columns.
    pub fn new(local_length: usize, n: usize) -> Self {
        Self {
            local_length,
            n,
            values: vec![T::zero(); local_length * n],
        }
    }

    pub fn local_length(&self) -> usize {
        self.local_length
    }

    pub fn num_columns(&self) -> usize {
        self.n
    }

    pub fn zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = T::zero());
    }

    /// Column `j`.
    pub fn column(&self, j: usize) -> &[T] {
        assert!(j < self.n, "column {j} out of range ({} columns)", self.n);
        &self.values[j * self.local_length..(j + 1) * self.local_length]
    }

    /// Column `j`, writable.
    pub fn column_mut(&mut self, j: usize) -> &mut [T] {
        assert!(j < self.n, "column {j} out of range ({} columns)", self.n);
        &mut self.values[j * self.local_length..(j + 1) * self.local_length]
    }

    /// The first `ncols` columns; `ncols` may be zero.
    pub fn leading(&self, ncols: usize) -> MultiVectorView<'_, T> {
        assert!(ncols <= self.n, "{ncols} columns requested, {} available", self.n);
        MultiVectorView {
            local_length: self.local_length,
            n: ncols,
            values: &self.values[..ncols * self.local_length],
        }
    }

    /// Columns `0..k` read-only together with column `k` writable, for
    /// orthogonalizing a new basis vector against its predecessors.
    pub fn split_at_column(&mut self, k: usize) -> (MultiVectorView<'_, T>, &mut [T]) {
        assert!(k < self.n, "column {k} out of range ({} columns)", self.n);
        let len = self.local_length;
        let (head, tail) = self.values.split_at_mut(k * len);
        (
            MultiVectorView {
                local_length: len,
                n: k,
                values: head,
            },
            &mut tail[..len],
        )
    }
}

impl<'a, T: Scalar> MultiVectorView<'a, T> {
    pub fn local_length(&self) -> usize {
        self.local_length
    }

    pub fn num_columns(&self) -> usize {
        self.n
    }

    /// Column `j` of the view.
    pub fn column(&self, j: usize) -> &'a [T] {
        assert!(j < self.n, "column {j} out of range ({} columns)", self.n);
        &self.values[j * self.local_length..(j + 1) * self.local_length]
    }

    /// The underlying column-major storage.
    pub fn as_slice(&self) -> &'a [T] {
        self.values
    }
}
