//! Process grid and local subdomain of the 3-D problem.
//!
//! The global grid of `(npx·nx) × (npy·ny) × (npz·nz)` points is split into
//! equal boxes, one per rank. Ranks are numbered x-fastest:
//! `rank = ipx + ipy·npx + ipz·npx·npy`. Global row indices are lexicographic
//! over the global grid (x fastest), so a rank's rows are not contiguous in
//! the global numbering.

use crate::error::{Error, Result};

/// Description of one rank's subdomain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// Number of ranks.
    pub size: usize,
    /// This rank.
    pub rank: usize,
    /// Local box extents.
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Process grid extents.
    pub npx: usize,
    pub npy: usize,
    pub npz: usize,
    /// This rank's position in the process grid.
    pub ipx: usize,
    pub ipy: usize,
    pub ipz: usize,
    /// Global grid extents.
    pub gnx: usize,
    pub gny: usize,
    pub gnz: usize,
    /// Global coordinates of this rank's first point.
    pub gix0: usize,
    pub giy0: usize,
    pub giz0: usize,
}

impl Geometry {
    /// Build the geometry for `rank` of `size`.
    ///
    /// `process_grid` fixes `[npx, npy, npz]`; when `None` the most cube-like
    /// factorization of `size` is chosen.
    pub fn new(
        size: usize,
        rank: usize,
        local: [usize; 3],
        process_grid: Option<[usize; 3]>,
    ) -> Result<Self> {
        if size == 0 || rank >= size {
            return Err(Error::InvalidGeometry(format!(
                "rank {rank} is not part of a group of {size}"
            )));
        }
        let [nx, ny, nz] = local;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(Error::InvalidGeometry(format!(
                "local box {nx}x{ny}x{nz} is empty"
            )));
        }
        let [npx, npy, npz] = match process_grid {
            Some(grid) => grid,
            None => optimal_process_grid(size),
        };
        if npx * npy * npz != size {
            return Err(Error::InvalidGeometry(format!(
                "process grid {npx}x{npy}x{npz} does not match {size} ranks"
            )));
        }

        let ipz = rank / (npx * npy);
        let ipy = (rank - ipz * npx * npy) / npx;
        let ipx = rank % npx;

        Ok(Self {
            size,
            rank,
            nx,
            ny,
            nz,
            npx,
            npy,
            npz,
            ipx,
            ipy,
            ipz,
            gnx: npx * nx,
            gny: npy * ny,
            gnz: npz * nz,
            gix0: ipx * nx,
            giy0: ipy * ny,
            giz0: ipz * nz,
        })
    }

    /// Number of locally owned points.
    pub fn local_rows(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Number of points in the global grid.
    pub fn global_rows(&self) -> u64 {
        self.gnx as u64 * self.gny as u64 * self.gnz as u64
    }

    /// Global row index of a global grid point.
    #[inline]
    pub fn global_index(&self, gix: usize, giy: usize, giz: usize) -> u64 {
        (giz as u64 * self.gny as u64 + giy as u64) * self.gnx as u64 + gix as u64
    }

    /// Global grid coordinates of a global row index.
    #[inline]
    pub fn global_coords(&self, index: u64) -> (usize, usize, usize) {
        let gnx = self.gnx as u64;
        let gny = self.gny as u64;
        let giz = index / (gnx * gny);
        let giy = (index - giz * gnx * gny) / gnx;
        let gix = index % gnx;
        (gix as usize, giy as usize, giz as usize)
    }

    /// Rank that owns a global row index.
    pub fn owner(&self, index: u64) -> usize {
        let (gix, giy, giz) = self.global_coords(index);
        let ipx = gix / self.nx;
        let ipy = giy / self.ny;
        let ipz = giz / self.nz;
        ipx + ipy * self.npx + ipz * self.npx * self.npy
    }

    /// Geometry of the next coarser multigrid level: every local extent halved,
    /// same process grid.
    pub fn coarsen(&self) -> Result<Self> {
        if self.nx % 2 != 0 || self.ny % 2 != 0 || self.nz % 2 != 0 {
            return Err(Error::InvalidGeometry(format!(
                "local box {}x{}x{} cannot be coarsened (extents must be even)",
                self.nx, self.ny, self.nz
            )));
        }
        Self::new(
            self.size,
            self.rank,
            [self.nx / 2, self.ny / 2, self.nz / 2],
            Some([self.npx, self.npy, self.npz]),
        )
    }
}

/// Factor `size` into `[npx, npy, npz]` with the smallest extent sum
/// (the most cube-like grid); ties favor larger x extents.
pub fn optimal_process_grid(size: usize) -> [usize; 3] {
    let mut best = [size, 1, 1];
    let mut best_sum = size + 2;
    for npz in 1..=size {
        if size % npz != 0 {
            continue;
        }
        let rest = size / npz;
        for npy in 1..=rest {
            if rest % npy != 0 {
                continue;
            }
            let npx = rest / npy;
            if npx < npy || npy < npz {
                continue;
            }
            let sum = npx + npy + npz;
            if sum < best_sum {
                best_sum = sum;
                best = [npx, npy, npz];
            }
        }
    }
    best
}
