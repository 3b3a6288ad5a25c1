//! Distributed sparse matrices in CSR form.
//!
//! Each rank stores its own rows. Column indices exist in two numberings:
//! global (lexicographic over the global grid) and local, where owned rows
//! come first (`0..nrows`) and off-rank columns are appended after them in
//! the order fixed by the [`HaloPlan`]. Within a row, entries are sorted by
//! global column so that lower-triangular terms precede the diagonal; the
//! Gauss-Seidel smoother relies on this.

use crate::comm::{Communicator, SerialComm};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::halo::setup_halo;
use hpgmp_kernels::Scalar;
use std::collections::HashMap;
use std::sync::Arc;

/// Which neighbor gets which entries during a halo exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaloPlan {
    /// Neighbor ranks, ascending.
    pub neighbors: Vec<usize>,
    /// Number of external entries received from each neighbor.
    pub receive_length: Vec<usize>,
    /// Number of owned entries sent to each neighbor.
    pub send_length: Vec<usize>,
    /// Local row indices to pack, concatenated per neighbor.
    pub elements_to_send: Vec<usize>,
}

impl HaloPlan {
    /// Total number of external entries this rank receives.
    pub fn external_count(&self) -> usize {
        self.receive_length.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// The next coarser multigrid level, owned by the finer one.
#[derive(Debug, Clone)]
pub struct CoarseLevel<T> {
    /// Coarse operator.
    pub matrix: SparseMatrix<T>,
    /// `f2c[i]` is the fine local row injected into coarse row `i`.
    pub f2c: Vec<usize>,
    pub presmoother_steps: usize,
    pub postsmoother_steps: usize,
}

/// Rows of a distributed sparse matrix owned by one rank.
#[derive(Debug, Clone)]
pub struct SparseMatrix<T> {
    pub(crate) geometry: Geometry,
    pub(crate) comm: Arc<dyn Communicator>,
    pub(crate) total_rows: u64,
    pub(crate) total_nonzeros: u64,
    pub(crate) local_columns: usize,
    pub(crate) row_ptr: Vec<usize>,
    pub(crate) global_col: Vec<u64>,
    pub(crate) local_col: Vec<usize>,
    pub(crate) values: Vec<T>,
    pub(crate) diagonal: Vec<usize>,
    pub(crate) global_to_local: HashMap<u64, usize>,
    pub(crate) local_to_global: Vec<u64>,
    pub(crate) halo: HaloPlan,
    pub(crate) coarse: Option<Box<CoarseLevel<T>>>,
    pub(crate) local_mg_nonzeros: usize,
    pub(crate) total_mg_nonzeros: u64,
}

impl<T: Scalar> SparseMatrix<T> {
    /// Single-process matrix from `(row, col, value)` triplets.
    ///
    /// Duplicates are summed. Every row needs a diagonal entry (the smoother
    /// divides by it).
    pub fn from_triplets(n: usize, triplets: &[(usize, usize, T)]) -> Result<Self> {
        let mut rows: Vec<Vec<(u64, T)>> = vec![Vec::new(); n];
        for &(i, j, v) in triplets {
            if i >= n || j >= n {
                return Err(Error::InvalidParameter(format!(
                    "entry ({i}, {j}) outside a {n}x{n} matrix"
                )));
            }
            let row = &mut rows[i];
            match row.iter_mut().find(|(c, _)| *c == j as u64) {
                Some((_, existing)) => *existing += v,
                None => row.push((j as u64, v)),
            }
        }

        let geometry = Geometry::new(1, 0, [n.max(1), 1, 1], Some([1, 1, 1]))?;
        let mut builder = RowBuilder::with_capacity(n, triplets.len());
        for (i, mut row) in rows.into_iter().enumerate() {
            row.sort_by_key(|&(c, _)| c);
            builder.push_row(i as u64, &row)?;
        }
        let mut matrix = builder.finish(geometry, SerialComm::shared())?;
        setup_halo(&mut matrix)?;
        Ok(matrix)
    }

    /// Number of locally owned rows.
    pub fn nrows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    /// Number of local columns: owned rows followed by halo entries.
    pub fn ncols(&self) -> usize {
        self.local_columns
    }

    pub fn local_nonzeros(&self) -> usize {
        self.values.len()
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn total_nonzeros(&self) -> u64 {
        self.total_nonzeros
    }

    /// Nonzeros summed over this level and every coarser one.
    pub fn total_mg_nonzeros(&self) -> u64 {
        self.total_mg_nonzeros
    }

    pub fn local_mg_nonzeros(&self) -> usize {
        self.local_mg_nonzeros
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn halo(&self) -> &HaloPlan {
        &self.halo
    }

    pub fn coarse(&self) -> Option<&CoarseLevel<T>> {
        self.coarse.as_deref()
    }

    /// Number of multigrid levels, this one included.
    pub fn levels(&self) -> usize {
        1 + self.coarse().map_or(0, |c| c.matrix.levels())
    }

    /// Local column indices and values of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> (&[usize], &[T]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.local_col[range.clone()], &self.values[range])
    }

    /// Global column indices of row `i`.
    pub fn row_global(&self, i: usize) -> &[u64] {
        &self.global_col[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// Position of the diagonal of row `i` inside [`values`](Self::values).
    #[inline]
    pub fn diagonal_position(&self, i: usize) -> usize {
        self.diagonal[i]
    }

    #[inline]
    pub fn diagonal_value(&self, i: usize) -> T {
        self.values[self.diagonal[i]]
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_ind(&self) -> &[usize] {
        &self.local_col
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn local_to_global(&self, i: usize) -> u64 {
        self.local_to_global[i]
    }

    pub fn global_to_local(&self, g: u64) -> Option<usize> {
        self.global_to_local.get(&g).copied()
    }

    /// Copy of the whole hierarchy with values converted to precision `U`.
    /// Structure, halo plan and communicator are shared unchanged.
    pub fn to_precision<U: Scalar>(&self) -> SparseMatrix<U> {
        SparseMatrix {
            geometry: self.geometry.clone(),
            comm: Arc::clone(&self.comm),
            total_rows: self.total_rows,
            total_nonzeros: self.total_nonzeros,
            local_columns: self.local_columns,
            row_ptr: self.row_ptr.clone(),
            global_col: self.global_col.clone(),
            local_col: self.local_col.clone(),
            values: self.values.iter().map(|v| v.cast()).collect(),
            diagonal: self.diagonal.clone(),
            global_to_local: self.global_to_local.clone(),
            local_to_global: self.local_to_global.clone(),
            halo: self.halo.clone(),
            coarse: self.coarse.as_ref().map(|c| {
                Box::new(CoarseLevel {
                    matrix: c.matrix.to_precision(),
                    f2c: c.f2c.clone(),
                    presmoother_steps: c.presmoother_steps,
                    postsmoother_steps: c.postsmoother_steps,
                })
            }),
            local_mg_nonzeros: self.local_mg_nonzeros,
            total_mg_nonzeros: self.total_mg_nonzeros,
        }
    }

    /// Attach a coarse level to this matrix.
    pub(crate) fn set_coarse(&mut self, level: CoarseLevel<T>) {
        self.coarse = Some(Box::new(level));
    }
}

/// Accumulates rows in global-column form; local columns are assigned later
/// by [`setup_halo`].
pub(crate) struct RowBuilder<T> {
    row_ptr: Vec<usize>,
    global_col: Vec<u64>,
    values: Vec<T>,
    diagonal: Vec<usize>,
    local_to_global: Vec<u64>,
}

impl<T: Scalar> RowBuilder<T> {
    pub(crate) fn with_capacity(rows: usize, nonzeros: usize) -> Self {
        let mut row_ptr = Vec::with_capacity(rows + 1);
        row_ptr.push(0);
        Self {
            row_ptr,
            global_col: Vec::with_capacity(nonzeros),
            values: Vec::with_capacity(nonzeros),
            diagonal: Vec::with_capacity(rows),
            local_to_global: Vec::with_capacity(rows),
        }
    }

    /// Append the row with global index `global_row`; entries sorted by column.
    pub(crate) fn push_row(&mut self, global_row: u64, entries: &[(u64, T)]) -> Result<()> {
        let start = self.values.len();
        let mut diagonal = None;
        for (offset, &(col, value)) in entries.iter().enumerate() {
            if col == global_row {
                diagonal = Some(start + offset);
            }
            self.global_col.push(col);
            self.values.push(value);
        }
        let diagonal = diagonal.ok_or_else(|| {
            Error::InvalidParameter(format!("row {global_row} has no diagonal entry"))
        })?;
        self.diagonal.push(diagonal);
        self.local_to_global.push(global_row);
        self.row_ptr.push(self.values.len());
        Ok(())
    }

    /// Freeze the rows; reduces the global nonzero count across ranks.
    pub(crate) fn finish(
        self,
        geometry: Geometry,
        comm: Arc<dyn Communicator>,
    ) -> Result<SparseMatrix<T>> {
        let nrows = self.local_to_global.len();
        let global_to_local = self
            .local_to_global
            .iter()
            .enumerate()
            .map(|(i, &g)| (g, i))
            .collect();

        let mut total = [self.values.len() as f64];
        comm.all_reduce_sum(&mut total)?;
        let local_nonzeros = self.values.len();

        Ok(SparseMatrix {
            total_rows: geometry.global_rows(),
            geometry,
            comm,
            total_nonzeros: total[0] as u64,
            local_columns: nrows,
            row_ptr: self.row_ptr,
            local_col: vec![0; self.global_col.len()],
            global_col: self.global_col,
            values: self.values,
            diagonal: self.diagonal,
            global_to_local,
            local_to_global: self.local_to_global,
            halo: HaloPlan::default(),
            coarse: None,
            local_mg_nonzeros: local_nonzeros,
            total_mg_nonzeros: total[0] as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiagonal(n: usize) -> SparseMatrix<f64> {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 4.0));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -2.0));
            }
        }
        SparseMatrix::from_triplets(n, &t).unwrap()
    }

    #[test]
    fn triplets_build_sorted_rows() {
        let a = tridiagonal(4);
        assert_eq!(a.nrows(), 4);
        assert_eq!(a.ncols(), 4);
        assert_eq!(a.local_nonzeros(), 10);
        assert_eq!(a.total_nonzeros(), 10);
        let (cols, vals) = a.row(1);
        assert_eq!(cols, &[0, 1, 2]);
        assert_eq!(vals, &[-1.0, 4.0, -2.0]);
        assert_eq!(a.diagonal_value(1), 4.0);
        assert_eq!(a.levels(), 1);
    }

    #[test]
    fn duplicates_are_summed() {
        let a = SparseMatrix::from_triplets(1, &[(0, 0, 1.0), (0, 0, 2.5)]).unwrap();
        assert_eq!(a.values(), &[3.5]);
    }

    #[test]
    fn missing_diagonal_is_an_error() {
        let err = SparseMatrix::from_triplets(2, &[(0, 0, 1.0), (1, 0, 1.0)]);
        assert!(matches!(err, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn precision_conversion_keeps_structure() {
        let a = tridiagonal(3);
        let lo: SparseMatrix<f32> = a.to_precision();
        assert_eq!(lo.row_ptr(), a.row_ptr());
        assert_eq!(lo.col_ind(), a.col_ind());
        assert_eq!(lo.values().len(), a.values().len());
        for (got, want) in lo.values().iter().zip(a.values()) {
            assert_eq!(*got, *want as f32);
        }
    }
}
