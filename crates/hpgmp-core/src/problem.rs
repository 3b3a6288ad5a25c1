//! Synthetic nonsymmetric 27-point stencil problem and its multigrid hierarchy.
//!
//! Every grid point couples to its (up to) 26 neighbors. The diagonal is 26;
//! an off-diagonal entry is `-1 - β` when its column precedes the row in the
//! global numbering and `-1 + β` when it follows, which makes the operator
//! nonsymmetric but keeps its structure symmetric. The right-hand side is
//! `b = A·1`, so the exact solution is the vector of ones.

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::halo::setup_halo;
use crate::sparse::{CoarseLevel, RowBuilder, SparseMatrix};
use crate::vector::Vector;
use hpgmp_kernels::Scalar;
use std::sync::Arc;

/// Diagonal value of the stencil.
pub const DIAGONAL: f64 = 26.0;

/// Skew applied to off-diagonal entries.
pub const NONSYMMETRY: f64 = 0.5;

/// Smoother sweeps before and after the coarse-grid correction.
pub const SMOOTHER_STEPS: usize = 1;

/// A generated system together with its reference vectors.
#[derive(Debug, Clone)]
pub struct Problem<T> {
    pub matrix: SparseMatrix<T>,
    /// Right-hand side, `nrows` entries.
    pub b: Vector<T>,
    /// Initial guess (zero), `nrows` entries.
    pub x: Vector<T>,
    /// Exact solution (ones), `nrows` entries.
    pub x_exact: Vector<T>,
}

/// Off-diagonal value for a coupling from `row` to `col`.
#[inline]
fn off_diagonal(row: u64, col: u64) -> f64 {
    if col < row {
        -1.0 - NONSYMMETRY
    } else {
        -1.0 + NONSYMMETRY
    }
}

/// Assemble the stencil rows of `geom` and set up the halo.
pub fn generate_matrix<T: Scalar>(
    geom: &Geometry,
    comm: Arc<dyn Communicator>,
) -> Result<SparseMatrix<T>> {
    if comm.size() != geom.size || comm.rank() != geom.rank {
        return Err(Error::InvalidGeometry(format!(
            "geometry is for rank {} of {}, communicator is rank {} of {}",
            geom.rank,
            geom.size,
            comm.rank(),
            comm.size()
        )));
    }

    let nrows = geom.local_rows();
    let mut builder = RowBuilder::with_capacity(nrows, nrows * 27);
    let mut entries: Vec<(u64, T)> = Vec::with_capacity(27);

    for iz in 0..geom.nz {
        let giz = geom.giz0 + iz;
        for iy in 0..geom.ny {
            let giy = geom.giy0 + iy;
            for ix in 0..geom.nx {
                let gix = geom.gix0 + ix;
                let row = geom.global_index(gix, giy, giz);

                entries.clear();
                // sz, sy, sx ascending keeps columns sorted
                for sz in -1i64..=1 {
                    let z = giz as i64 + sz;
                    if z < 0 || z >= geom.gnz as i64 {
                        continue;
                    }
                    for sy in -1i64..=1 {
                        let y = giy as i64 + sy;
                        if y < 0 || y >= geom.gny as i64 {
                            continue;
                        }
                        for sx in -1i64..=1 {
                            let x = gix as i64 + sx;
                            if x < 0 || x >= geom.gnx as i64 {
                                continue;
                            }
                            let col = geom.global_index(x as usize, y as usize, z as usize);
                            let value = if col == row {
                                DIAGONAL
                            } else {
                                off_diagonal(row, col)
                            };
                            entries.push((col, T::from_f64(value)));
                        }
                    }
                }
                builder.push_row(row, &entries)?;
            }
        }
    }

    let mut matrix = builder.finish(geom.clone(), comm)?;
    setup_halo(&mut matrix)?;
    Ok(matrix)
}

/// Generate the fine-level system: matrix, `b = A·1`, `x = 0`, `x_exact = 1`.
pub fn generate_problem<T: Scalar>(
    geom: &Geometry,
    comm: Arc<dyn Communicator>,
) -> Result<Problem<T>> {
    let matrix = generate_matrix::<T>(geom, comm)?;
    let nrows = matrix.nrows();

    // row sums accumulated in f64 so both precisions see the same b
    let b: Vec<T> = (0..nrows)
        .map(|i| {
            let (_, vals) = matrix.row(i);
            T::from_f64(vals.iter().map(|v| v.as_f64()).sum())
        })
        .collect();

    Ok(Problem {
        b: Vector::from_vec(b),
        x: Vector::new(nrows),
        x_exact: Vector::filled(nrows, T::one()),
        matrix,
    })
}

/// Build the next coarser level below `af` by halving every local extent and
/// injecting every other fine point.
pub fn generate_coarse_problem<T: Scalar>(af: &mut SparseMatrix<T>) -> Result<()> {
    let gf = af.geometry().clone();
    let gc = gf.coarsen()?;

    let mut f2c = Vec::with_capacity(gc.local_rows());
    for izc in 0..gc.nz {
        let izf = 2 * izc;
        for iyc in 0..gc.ny {
            let iyf = 2 * iyc;
            for ixc in 0..gc.nx {
                let ixf = 2 * ixc;
                f2c.push(izf * gf.nx * gf.ny + iyf * gf.nx + ixf);
            }
        }
    }

    let matrix = generate_matrix::<T>(&gc, Arc::clone(af.comm()))?;
    log::debug!(
        "rank {}: coarse level {}x{}x{} with {} nonzeros",
        gc.rank,
        gc.nx,
        gc.ny,
        gc.nz,
        matrix.local_nonzeros()
    );
    af.set_coarse(CoarseLevel {
        matrix,
        f2c,
        presmoother_steps: SMOOTHER_STEPS,
        postsmoother_steps: SMOOTHER_STEPS,
    });
    Ok(())
}

/// Generate the fine problem and `levels - 1` coarse levels beneath it, and
/// record the hierarchy's nonzero totals on the fine matrix.
pub fn setup_matrix<T: Scalar>(
    levels: usize,
    geom: &Geometry,
    comm: Arc<dyn Communicator>,
) -> Result<Problem<T>> {
    if levels == 0 {
        return Err(Error::InvalidParameter(
            "at least one multigrid level is required".to_string(),
        ));
    }
    let mut problem = generate_problem::<T>(geom, comm)?;

    let mut local_mg = problem.matrix.local_nonzeros();
    let mut total_mg = problem.matrix.total_nonzeros();
    let mut current = &mut problem.matrix;
    for _ in 1..levels {
        generate_coarse_problem(current)?;
        let Some(coarse) = current.coarse.as_deref_mut() else {
            break;
        };
        local_mg += coarse.matrix.local_nonzeros();
        total_mg += coarse.matrix.total_nonzeros();
        current = &mut coarse.matrix;
    }
    problem.matrix.local_mg_nonzeros = local_mg;
    problem.matrix.total_mg_nonzeros = total_mg;
    Ok(problem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SerialComm, ThreadComm};
    use crate::halo::exchange_halo;

    fn serial(n: usize, levels: usize) -> Problem<f64> {
        let geom = Geometry::new(1, 0, [n, n, n], None).unwrap();
        setup_matrix(levels, &geom, SerialComm::shared()).unwrap()
    }

    #[test]
    fn stencil_counts() {
        let p = serial(4, 1);
        let a = &p.matrix;
        assert_eq!(a.nrows(), 64);
        // interior 2x2x2 points have 27 entries; the total for a 4^3 box is
        // (3·4-2)^3 = 10^3 = 1000
        assert_eq!(a.local_nonzeros(), 1000);
        assert_eq!(a.total_nonzeros(), 1000);
        assert_eq!(a.ncols(), 64);
    }

    #[test]
    fn rows_sorted_with_signed_skew() {
        let p = serial(4, 1);
        let a = &p.matrix;
        for i in 0..a.nrows() {
            let g = a.row_global(i);
            assert!(g.windows(2).all(|w| w[0] < w[1]));
            let row = a.local_to_global(i);
            let (_, vals) = a.row(i);
            for (&c, &v) in g.iter().zip(vals) {
                let expected = if c == row {
                    26.0
                } else if c < row {
                    -1.5
                } else {
                    -0.5
                };
                assert_eq!(v, expected);
            }
        }
    }

    #[test]
    fn rhs_is_row_sum() {
        let p = serial(4, 1);
        for i in 0..p.matrix.nrows() {
            let (_, vals) = p.matrix.row(i);
            assert_eq!(p.b[i], vals.iter().sum::<f64>());
        }
        assert!(p.x.as_slice().iter().all(|&v| v == 0.0));
        assert!(p.x_exact.as_slice().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn hierarchy_depth_and_injection() {
        let p = serial(8, 3);
        let a = &p.matrix;
        assert_eq!(a.levels(), 3);
        let c = a.coarse().unwrap();
        assert_eq!(c.matrix.nrows(), 64);
        assert_eq!(c.f2c[1], 2);
        assert_eq!(c.f2c[4], 2 * 8);
        let cc = c.matrix.coarse().unwrap();
        assert_eq!(cc.matrix.nrows(), 8);
        assert_eq!(
            a.total_mg_nonzeros(),
            a.total_nonzeros() + c.matrix.total_nonzeros() + cc.matrix.total_nonzeros()
        );
    }

    #[test]
    fn odd_extents_cannot_be_coarsened() {
        let geom = Geometry::new(1, 0, [3, 4, 4], None).unwrap();
        assert!(setup_matrix::<f64>(2, &geom, SerialComm::shared()).is_err());
    }

    #[test]
    fn two_rank_halo_exchange() {
        let results = ThreadComm::launch(2, |comm| {
            let geom = Geometry::new(2, comm.rank(), [2, 2, 2], Some([2, 1, 1])).unwrap();
            let p = generate_problem::<f64>(&geom, comm).unwrap();
            let a = &p.matrix;

            // each rank shares one 2x2 face with the other
            assert_eq!(a.halo().neighbors, vec![1 - geom.rank]);
            assert_eq!(a.halo().external_count(), 4);
            assert_eq!(a.ncols(), 12);
            assert_eq!(a.total_nonzeros(), 2 * a.local_nonzeros() as u64);

            // fill owned entries with their global index, then check the halo
            let mut x = vec![0.0f64; a.ncols()];
            for (i, xi) in x.iter_mut().take(a.nrows()).enumerate() {
                *xi = a.local_to_global(i) as f64;
            }
            exchange_halo(a, &mut x).unwrap();
            let mut ok = true;
            for i in 0..a.nrows() {
                let (cols, _) = a.row(i);
                for (&c, &g) in cols.iter().zip(a.row_global(i)) {
                    ok &= x[c] == g as f64;
                }
            }
            ok
        });
        assert!(results.into_iter().all(|ok| ok));
    }

    #[test]
    fn two_rank_rhs_matches_single_rank() {
        let single = {
            let geom = Geometry::new(1, 0, [4, 2, 2], None).unwrap();
            generate_problem::<f64>(&geom, SerialComm::shared()).unwrap()
        };
        let parts = ThreadComm::launch(2, |comm| {
            let geom = Geometry::new(2, comm.rank(), [2, 2, 2], Some([2, 1, 1])).unwrap();
            let p = generate_problem::<f64>(&geom, comm).unwrap();
            (0..p.matrix.nrows())
                .map(|i| (p.matrix.local_to_global(i), p.b[i]))
                .collect::<Vec<_>>()
        });
        for (g, bi) in parts.into_iter().flatten() {
            let i = single.matrix.global_to_local(g).unwrap();
            assert_eq!(single.b[i], bi);
        }
    }
}
