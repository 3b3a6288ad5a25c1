//! Process-group communication.
//!
//! Distributed objects talk to their peers through the [`Communicator`] trait.
//! Two implementations ship with the crate:
//!
//! - [`SerialComm`]: a group of one; reductions are identities.
//! - [`ThreadComm`]: one rank per OS thread inside a single process, connected
//!   by `std::sync::mpsc` channels. Reductions are carried out in rank order
//!   on rank 0 and broadcast back, so every rank sees bit-identical results.
//!
//! Payloads are `f64` slices; single-precision data is widened exactly on the
//! way in and rounded on the way out (see [`all_reduce_sum_scalars`]).

use crate::error::{Error, Result};
use hpgmp_kernels::Scalar;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tag used by rank 0 to collect reduction partials.
const REDUCE_TAG: u32 = u32::MAX - 1;
/// Tag used by rank 0 to broadcast reduction results.
const BROADCAST_TAG: u32 = u32::MAX - 2;

/// Collective and point-to-point operations of a fixed process group.
///
/// Every rank must issue the same sequence of collective calls; collectives
/// are matched by position, not by tag.
pub trait Communicator: Send + Sync + std::fmt::Debug {
    /// This process's rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Element-wise sum across all ranks, in place.
    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()>;

    /// Element-wise maximum across all ranks, in place. NaN wins.
    fn all_reduce_max(&self, values: &mut [f64]) -> Result<()>;

    /// Send `data` to `dest`. Never blocks on the receiver.
    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<()>;

    /// Receive the next message from `source` carrying `tag`.
    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>>;

    /// Block until every rank has reached the barrier.
    fn barrier(&self) -> Result<()>;
}

/// Sum `values` across ranks in any supported precision.
pub fn all_reduce_sum_scalars<T: Scalar>(comm: &dyn Communicator, values: &mut [T]) -> Result<()> {
    if comm.size() == 1 {
        return Ok(());
    }
    let mut buf: Vec<f64> = values.iter().map(|v| v.as_f64()).collect();
    comm.all_reduce_sum(&mut buf)?;
    for (v, b) in values.iter_mut().zip(buf) {
        *v = T::from_f64(b);
    }
    Ok(())
}

/// Maximum of a single value across ranks.
pub fn all_reduce_max_value(comm: &dyn Communicator, value: f64) -> Result<f64> {
    let mut buf = [value];
    comm.all_reduce_max(&mut buf)?;
    Ok(buf[0])
}

#[inline]
fn max_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

// ============================================================================
// Serial
// ============================================================================

/// The trivial group of one process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl SerialComm {
    /// Shared handle, ready to attach to a matrix.
    pub fn shared() -> Arc<dyn Communicator> {
        Arc::new(SerialComm)
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _values: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn all_reduce_max(&self, _values: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn send(&self, dest: usize, _tag: u32, _data: Vec<f64>) -> Result<()> {
        Err(Error::Communication(format!(
            "serial communicator has no peer {dest}"
        )))
    }

    fn recv(&self, source: usize, _tag: u32) -> Result<Vec<f64>> {
        Err(Error::Communication(format!(
            "serial communicator has no peer {source}"
        )))
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Threaded
// ============================================================================

struct Message {
    source: usize,
    tag: u32,
    data: Vec<f64>,
}

struct Inbox {
    receiver: Receiver<Message>,
    /// Messages that arrived before anyone asked for them, in arrival order.
    pending: Vec<Message>,
}

/// One rank of an in-process group; see [`ThreadComm::launch`].
pub struct ThreadComm {
    rank: usize,
    senders: Vec<Sender<Message>>,
    inbox: Mutex<Inbox>,
    timeout: Duration,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.senders.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ThreadComm {
    /// How long a receive waits before the peer is declared lost.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Build a fully connected group of `size` ranks.
    pub fn group(size: usize, timeout: Duration) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ThreadComm {
                rank,
                senders: senders.clone(),
                inbox: Mutex::new(Inbox {
                    receiver,
                    pending: Vec::new(),
                }),
                timeout,
            })
            .collect()
    }

    /// Run `f` once per rank, each on its own scoped thread, and collect the
    /// results in rank order.
    pub fn launch<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(Arc<dyn Communicator>) -> R + Sync,
        R: Send,
    {
        Self::launch_with_timeout(size, Self::DEFAULT_TIMEOUT, f)
    }

    /// [`ThreadComm::launch`] with an explicit receive timeout.
    pub fn launch_with_timeout<F, R>(size: usize, timeout: Duration, f: F) -> Vec<R>
    where
        F: Fn(Arc<dyn Communicator>) -> R + Sync,
        R: Send,
    {
        let group = Self::group(size, timeout);
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = group
                .into_iter()
                .map(|comm| {
                    let comm: Arc<dyn Communicator> = Arc::new(comm);
                    scope.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn reduce(&self, values: &mut [f64], op: fn(f64, f64) -> f64) -> Result<()> {
        let size = self.senders.len();
        if size == 1 {
            return Ok(());
        }
        if self.rank == 0 {
            for source in 1..size {
                let part = self.recv(source, REDUCE_TAG)?;
                if part.len() != values.len() {
                    return Err(Error::Communication(format!(
                        "reduction length mismatch from rank {source}: {} vs {}",
                        part.len(),
                        values.len()
                    )));
                }
                for (v, p) in values.iter_mut().zip(part) {
                    *v = op(*v, p);
                }
            }
            for dest in 1..size {
                self.send(dest, BROADCAST_TAG, values.to_vec())?;
            }
        } else {
            self.send(0, REDUCE_TAG, values.to_vec())?;
            let result = self.recv(0, BROADCAST_TAG)?;
            if result.len() != values.len() {
                return Err(Error::Communication(
                    "broadcast length mismatch".to_string(),
                ));
            }
            values.copy_from_slice(&result);
        }
        Ok(())
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()> {
        self.reduce(values, |a, b| a + b)
    }

    fn all_reduce_max(&self, values: &mut [f64]) -> Result<()> {
        self.reduce(values, max_nan)
    }

    fn send(&self, dest: usize, tag: u32, data: Vec<f64>) -> Result<()> {
        let sender = self.senders.get(dest).ok_or_else(|| {
            Error::Communication(format!("rank {dest} is outside the group"))
        })?;
        sender
            .send(Message {
                source: self.rank,
                tag,
                data,
            })
            .map_err(|_| Error::Communication(format!("rank {dest} has hung up")))
    }

    fn recv(&self, source: usize, tag: u32) -> Result<Vec<f64>> {
        let mut inbox = self
            .inbox
            .lock()
            .map_err(|_| Error::Communication("inbox lock poisoned".to_string()))?;

        if let Some(pos) = inbox
            .pending
            .iter()
            .position(|m| m.source == source && m.tag == tag)
        {
            return Ok(inbox.pending.remove(pos).data);
        }

        loop {
            match inbox.receiver.recv_timeout(self.timeout) {
                Ok(m) if m.source == source && m.tag == tag => return Ok(m.data),
                Ok(m) => inbox.pending.push(m),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::Communication(format!(
                        "rank {} timed out waiting for rank {source} (tag {tag})",
                        self.rank
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Communication(format!(
                        "rank {source} disconnected"
                    )));
                }
            }
        }
    }

    fn barrier(&self) -> Result<()> {
        let mut token = [0.0];
        self.all_reduce_sum(&mut token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_is_identity() {
        let comm = SerialComm;
        let mut v = [1.0, 2.0];
        comm.all_reduce_sum(&mut v).unwrap();
        assert_eq!(v, [1.0, 2.0]);
        assert!(comm.send(1, 0, vec![]).is_err());
    }

    #[test]
    fn threaded_sum_and_max() {
        let results = ThreadComm::launch(4, |comm| {
            let r = comm.rank() as f64;
            let mut v = [r, 1.0];
            comm.all_reduce_sum(&mut v).unwrap();
            let max = all_reduce_max_value(comm.as_ref(), r).unwrap();
            (v, max)
        });
        for (v, max) in results {
            assert_eq!(v, [6.0, 4.0]);
            assert_eq!(max, 3.0);
        }
    }

    #[test]
    fn threaded_max_propagates_nan() {
        let results = ThreadComm::launch(3, |comm| {
            let v = if comm.rank() == 1 { f64::NAN } else { 1.0 };
            all_reduce_max_value(comm.as_ref(), v).unwrap()
        });
        assert!(results.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn point_to_point_matches_tags_out_of_order() {
        let results = ThreadComm::launch(2, |comm| {
            if comm.rank() == 0 {
                comm.send(1, 7, vec![7.0]).unwrap();
                comm.send(1, 5, vec![5.0]).unwrap();
                Vec::new()
            } else {
                let five = comm.recv(0, 5).unwrap();
                let seven = comm.recv(0, 7).unwrap();
                vec![five[0], seven[0]]
            }
        });
        assert_eq!(results[1], vec![5.0, 7.0]);
    }

    #[test]
    fn recv_times_out() {
        let results = ThreadComm::launch_with_timeout(2, Duration::from_millis(20), |comm| {
            if comm.rank() == 1 {
                comm.recv(0, 1).is_err()
            } else {
                true
            }
        });
        assert!(results.iter().all(|&ok| ok));
    }

    #[test]
    fn typed_reduction_in_single_precision() {
        let results = ThreadComm::launch(2, |comm| {
            let mut v = [0.25f32, comm.rank() as f32];
            all_reduce_sum_scalars(comm.as_ref(), &mut v).unwrap();
            v
        });
        assert_eq!(results[0], [0.5, 1.0]);
        assert_eq!(results[0], results[1]);
    }
}
