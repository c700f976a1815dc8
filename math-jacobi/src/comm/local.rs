//! In-process multi-rank transport
//!
//! A [`LocalCluster`] of `P` ranks is a `P x P` matrix of unbounded FIFO
//! channels, one per ordered (source, destination) pair. Since every rank
//! issues the same collectives in the same order, the `k`-th message a rank
//! receives from a given peer always belongs to its `k`-th collective with
//! that peer, and no message tags are needed.
//!
//! Sends never block. Receives block until the peer's message arrives, which
//! gives the collectives the same blocking points as an MPI implementation.

use super::{CommError, Communicator, ROOT, check_counts, check_len, displacements};
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::thread;

#[derive(Debug)]
enum Packet {
    Words(Vec<u64>),
    Values(Vec<f64>),
}

/// A group of ranks running on threads of the current process
#[derive(Debug, Clone)]
pub struct LocalCluster {
    size: usize,
}

impl LocalCluster {
    /// Create a cluster of `size` ranks (at least one)
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    /// Number of ranks
    pub fn size(&self) -> usize {
        self.size
    }

    /// Build one connected communicator per rank, in rank order
    pub fn communicators(&self) -> Vec<LocalComm> {
        let size = self.size;
        let mut outboxes: Vec<Vec<Sender<Packet>>> = (0..size).map(|_| Vec::new()).collect();
        let mut inboxes: Vec<Vec<Receiver<Packet>>> = (0..size).map(|_| Vec::new()).collect();

        // inboxes[dst] is filled in source order because src is the outer loop
        for outbox in outboxes.iter_mut() {
            for inbox in inboxes.iter_mut() {
                let (tx, rx) = unbounded();
                outbox.push(tx);
                inbox.push(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| LocalComm {
                rank,
                size,
                outbox,
                inbox,
            })
            .collect()
    }

    /// Run `task` once per rank on scoped threads and collect the results in
    /// rank order.
    ///
    /// A panic on any rank is propagated to the caller once all ranks have
    /// stopped.
    pub fn run<R, F>(&self, task: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&LocalComm) -> R + Sync,
    {
        let task = &task;
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .communicators()
                .into_iter()
                .map(|comm| scope.spawn(move || task(&comm)))
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}

/// One rank's endpoint in a [`LocalCluster`]
#[derive(Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    /// `outbox[dst]` sends to rank `dst`
    outbox: Vec<Sender<Packet>>,
    /// `inbox[src]` receives from rank `src`
    inbox: Vec<Receiver<Packet>>,
}

impl LocalComm {
    fn send(&self, dst: usize, packet: Packet) -> Result<(), CommError> {
        self.outbox[dst]
            .send(packet)
            .map_err(|_| CommError::Disconnected { peer: dst })
    }

    fn recv(&self, src: usize) -> Result<Packet, CommError> {
        self.inbox[src]
            .recv()
            .map_err(|_| CommError::Disconnected { peer: src })
    }

    fn recv_values(&self, src: usize, expected: usize) -> Result<Vec<f64>, CommError> {
        match self.recv(src)? {
            Packet::Values(values) => {
                check_len(expected, values.len())?;
                Ok(values)
            }
            Packet::Words(_) => Err(CommError::Protocol { peer: src }),
        }
    }

    fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&r| r != self.rank)
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_words(&self, words: &mut [u64]) -> Result<(), CommError> {
        if self.rank == ROOT {
            for dst in self.peers() {
                self.send(dst, Packet::Words(words.to_vec()))?;
            }
            return Ok(());
        }

        match self.recv(ROOT)? {
            Packet::Words(received) => {
                check_len(words.len(), received.len())?;
                words.copy_from_slice(&received);
                Ok(())
            }
            Packet::Values(_) => Err(CommError::Protocol { peer: ROOT }),
        }
    }

    fn scatter_varcount(&self, send: &[f64], counts: &[usize]) -> Result<Vec<f64>, CommError> {
        check_counts(counts, self.size)?;

        if self.rank != ROOT {
            return self.recv_values(ROOT, counts[self.rank]);
        }

        check_len(counts.iter().sum(), send.len())?;
        let displs = displacements(counts);
        for dst in self.peers() {
            let block = &send[displs[dst]..displs[dst] + counts[dst]];
            self.send(dst, Packet::Values(block.to_vec()))?;
        }
        Ok(send[displs[ROOT]..displs[ROOT] + counts[ROOT]].to_vec())
    }

    fn all_gather_varcount(
        &self,
        local: &[f64],
        counts: &[usize],
    ) -> Result<Vec<f64>, CommError> {
        check_counts(counts, self.size)?;
        check_len(counts[self.rank], local.len())?;

        for dst in self.peers() {
            self.send(dst, Packet::Values(local.to_vec()))?;
        }

        let mut gathered = Vec::with_capacity(counts.iter().sum());
        for (src, &count) in counts.iter().enumerate() {
            if src == self.rank {
                gathered.extend_from_slice(local);
            } else {
                gathered.extend(self.recv_values(src, count)?);
            }
        }
        Ok(gathered)
    }

    fn gather_varcount(
        &self,
        local: &[f64],
        counts: &[usize],
    ) -> Result<Option<Vec<f64>>, CommError> {
        check_counts(counts, self.size)?;
        check_len(counts[self.rank], local.len())?;

        if self.rank != ROOT {
            self.send(ROOT, Packet::Values(local.to_vec()))?;
            return Ok(None);
        }

        let mut gathered = Vec::with_capacity(counts.iter().sum());
        for (src, &count) in counts.iter().enumerate() {
            if src == ROOT {
                gathered.extend_from_slice(local);
            } else {
                gathered.extend(self.recv_values(src, count)?);
            }
        }
        Ok(Some(gathered))
    }

    fn all_reduce_max(&self, local: f64) -> Result<f64, CommError> {
        let counts = vec![1; self.size];
        let values = self.all_gather_varcount(&[local], &counts)?;
        // Folded in rank order on every rank, so every rank gets the same bits
        Ok(values.into_iter().fold(f64::NEG_INFINITY, f64::max))
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.all_reduce_max(0.0).map(|_| ())
    }
}
