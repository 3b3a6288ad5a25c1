//! Halo setup and exchange.
//!
//! [`setup_halo`] derives, from the global column indices of a matrix, which
//! neighbor owns each off-rank column and which owned entries each neighbor
//! needs. [`exchange_halo`] then refreshes the trailing halo slots of a vector
//! before a sparse product or smoother sweep.

use crate::error::{Error, Result};
use crate::sparse::SparseMatrix;
use hpgmp_kernels::Scalar;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

/// Message tag for halo traffic.
pub const HALO_TAG: u32 = 99;

/// Message tag for the entry counts compared during [`setup_halo`].
pub const HALO_SETUP_TAG: u32 = 98;

/// Wall-clock split of one halo exchange, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HaloTiming {
    /// Gathering owned entries into the send buffer.
    pub pack: f64,
    /// Sending and waiting for neighbor data.
    pub communicate: f64,
}

impl HaloTiming {
    pub fn total(&self) -> f64 {
        self.pack + self.communicate
    }
}

/// Build the halo plan of `a` and assign local column indices.
///
/// Externals are numbered after the owned rows, grouped by neighbor in
/// ascending rank order and sorted by global index within each neighbor.
pub fn setup_halo<T: Scalar>(a: &mut SparseMatrix<T>) -> Result<()> {
    let rank = a.geometry.rank;
    let nrows = a.nrows();

    if a.geometry.size == 1 {
        for (slot, &g) in a.local_col.iter_mut().zip(a.global_col.iter()) {
            *slot = a.global_to_local.get(&g).copied().ok_or_else(|| {
                Error::InvalidParameter(format!("column {g} is not owned by the only rank"))
            })?;
        }
        a.local_columns = nrows;
        return Ok(());
    }

    // global indices to receive from, and owned global indices to send to,
    // each neighbor
    let mut receive: BTreeMap<usize, BTreeSet<u64>> = BTreeMap::new();
    let mut send: BTreeMap<usize, BTreeSet<u64>> = BTreeMap::new();
    for i in 0..nrows {
        let row_global = a.local_to_global[i];
        for &g in &a.global_col[a.row_ptr[i]..a.row_ptr[i + 1]] {
            let owner = a.geometry.owner(g);
            if owner != rank {
                receive.entry(owner).or_default().insert(g);
                send.entry(owner).or_default().insert(row_global);
            }
        }
    }

    // what a neighbor expects to receive must match what this rank sends
    let comm = a.comm();
    for (&neighbor, indices) in &receive {
        comm.send(neighbor, HALO_SETUP_TAG, vec![indices.len() as f64])?;
    }
    for (&neighbor, indices) in &send {
        let expected = comm.recv(neighbor, HALO_SETUP_TAG)?;
        if expected.first().copied() != Some(indices.len() as f64) {
            return Err(Error::InvalidParameter(format!(
                "matrix structure is not symmetric across ranks: rank {neighbor} expects {:?} entries, rank {rank} sends {}",
                expected.first(),
                indices.len()
            )));
        }
    }

    let mut external_to_local: HashMap<u64, usize> = HashMap::new();
    let mut plan = crate::sparse::HaloPlan::default();
    for (&neighbor, indices) in &receive {
        plan.neighbors.push(neighbor);
        plan.receive_length.push(indices.len());
        for &g in indices {
            external_to_local.insert(g, nrows + external_to_local.len());
        }
    }
    for indices in send.values() {
        plan.send_length.push(indices.len());
        for g in indices {
            let local = a.global_to_local.get(g).copied().ok_or_else(|| {
                Error::InvalidParameter(format!("send index {g} is not owned locally"))
            })?;
            plan.elements_to_send.push(local);
        }
    }

    for (slot, &g) in a.local_col.iter_mut().zip(a.global_col.iter()) {
        *slot = match a.global_to_local.get(&g) {
            Some(&local) => local,
            None => external_to_local.get(&g).copied().ok_or_else(|| {
                Error::InvalidParameter(format!("column {g} has no local slot"))
            })?,
        };
    }

    a.local_columns = nrows + external_to_local.len();
    log::debug!(
        "rank {rank}: halo with {} neighbors, {} externals, {} entries to send",
        plan.neighbors.len(),
        external_to_local.len(),
        plan.elements_to_send.len()
    );
    a.halo = plan;
    Ok(())
}

/// Refresh the halo slots `x[nrows..ncols]` of `x` from the neighbors of `a`.
///
/// Every rank in the group must call this together. `x` may be in a different
/// precision from the matrix values.
pub fn exchange_halo<T: Scalar, U: Scalar>(a: &SparseMatrix<T>, x: &mut [U]) -> Result<HaloTiming> {
    let comm = a.comm();
    if comm.size() == 1 || a.halo.is_empty() {
        return Ok(HaloTiming::default());
    }
    let nrows = a.nrows();
    if x.len() < a.ncols() {
        return Err(Error::DimensionMismatch {
            expected: a.ncols(),
            actual: x.len(),
        });
    }

    let start = Instant::now();
    let buffer: Vec<f64> = a
        .halo
        .elements_to_send
        .iter()
        .map(|&i| x[i].as_f64())
        .collect();
    let pack = start.elapsed().as_secs_f64();

    let start = Instant::now();
    let mut offset = 0;
    for (&neighbor, &len) in a.halo.neighbors.iter().zip(&a.halo.send_length) {
        comm.send(neighbor, HALO_TAG, buffer[offset..offset + len].to_vec())?;
        offset += len;
    }

    let mut slot = nrows;
    for (&neighbor, &len) in a.halo.neighbors.iter().zip(&a.halo.receive_length) {
        let data = comm.recv(neighbor, HALO_TAG)?;
        if data.len() != len {
            return Err(Error::Communication(format!(
                "halo from rank {neighbor}: expected {len} entries, got {}",
                data.len()
            )));
        }
        for (dst, v) in x[slot..slot + len].iter_mut().zip(data) {
            *dst = U::from_f64(v);
        }
        slot += len;
    }
    let communicate = start.elapsed().as_secs_f64();

    Ok(HaloTiming { pack, communicate })
}
