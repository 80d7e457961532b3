//! In-process multi-rank communicator.
//!
//! Every collective is built on a single all-gather rendezvous: each rank
//! deposits a payload, the last rank to arrive publishes the gathered payloads,
//! and the round is closed once every rank has picked the result up. A rank that
//! races ahead into the next collective waits until the previous round is closed.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use pcat_result::{Error, Result};

use crate::Communicator;

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::communication("rendezvous lock poisoned")
}

#[derive(Debug)]
struct RoundState {
    generation: u64,
    arrived: usize,
    departed: usize,
    draining: bool,
    slots: Vec<Option<Vec<u8>>>,
    gathered: Option<Arc<Vec<Vec<u8>>>>,
}

#[derive(Debug)]
struct Rendezvous {
    size: usize,
    state: Mutex<RoundState>,
    cond: Condvar,
}

impl Rendezvous {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(RoundState {
                generation: 0,
                arrived: 0,
                departed: 0,
                draining: false,
                slots: vec![None; size],
                gathered: None,
            }),
            cond: Condvar::new(),
        }
    }

    fn all_gather(&self, rank: usize, payload: Vec<u8>) -> Result<Arc<Vec<Vec<u8>>>> {
        let mut state = self.state.lock().map_err(poisoned)?;
        while state.draining {
            state = self.cond.wait(state).map_err(poisoned)?;
        }

        if state.slots[rank].is_some() {
            return Err(Error::communication(format!(
                "rank {rank} entered the same collective round twice"
            )));
        }
        state.slots[rank] = Some(payload);
        state.arrived += 1;
        let generation = state.generation;

        if state.arrived == self.size {
            let gathered = state
                .slots
                .iter_mut()
                .map(|slot| slot.take().unwrap_or_default())
                .collect();
            state.gathered = Some(Arc::new(gathered));
            state.draining = true;
            self.cond.notify_all();
        } else {
            while !(state.draining && state.generation == generation) {
                state = self.cond.wait(state).map_err(poisoned)?;
            }
        }

        let gathered = state
            .gathered
            .clone()
            .ok_or_else(|| Error::Internal("collective round closed without a result".into()))?;

        state.departed += 1;
        if state.departed == self.size {
            state.generation += 1;
            state.arrived = 0;
            state.departed = 0;
            state.draining = false;
            state.gathered = None;
            self.cond.notify_all();
        }
        Ok(gathered)
    }
}

/// One rank of a fixed-size group of ranks sharing a process.
///
/// Create the whole group at once with [`ThreadComm::group`] and move one member
/// to each thread.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    rendezvous: Arc<Rendezvous>,
}

impl ThreadComm {
    /// Build the communicators for a group of `size` ranks, ordered by rank.
    pub fn group(size: usize) -> Result<Vec<ThreadComm>> {
        if size == 0 {
            return Err(Error::InvalidArgumentError(
                "a communicator group needs at least one rank".into(),
            ));
        }
        let rendezvous = Arc::new(Rendezvous::new(size));
        Ok((0..size)
            .map(|rank| ThreadComm {
                rank,
                rendezvous: Arc::clone(&rendezvous),
            })
            .collect())
    }

    /// Collective: every rank receives every rank's payload, ordered by rank.
    pub fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let gathered = self.rendezvous.all_gather(self.rank, payload)?;
        Ok(gathered.as_ref().clone())
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.rendezvous.size
    }

    fn allreduce_sum(&self, value: u64) -> Result<u64> {
        let gathered = self
            .rendezvous
            .all_gather(self.rank, value.to_le_bytes().to_vec())?;
        let mut total: u64 = 0;
        for bytes in gathered.iter() {
            let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                Error::communication(format!("malformed reduction payload of {} bytes", bytes.len()))
            })?;
            total = total
                .checked_add(u64::from_le_bytes(raw))
                .ok_or_else(|| Error::communication("allreduce sum overflowed u64"))?;
        }
        tracing::trace!(rank = self.rank, value, total, "allreduce_sum");
        Ok(total)
    }

    fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let size = self.size();
        if root >= size {
            return Err(Error::communication(format!(
                "broadcast root {root} out of range for {size} ranks"
            )));
        }
        let contribution = if self.rank == root {
            payload.unwrap_or_default()
        } else {
            Vec::new()
        };
        let gathered = self.rendezvous.all_gather(self.rank, contribution)?;
        Ok(gathered[root].clone())
    }

    fn barrier(&self) -> Result<()> {
        self.rendezvous.all_gather(self.rank, Vec::new())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn zero_sized_group_is_rejected() {
        assert!(matches!(
            ThreadComm::group(0),
            Err(Error::InvalidArgumentError(_))
        ));
    }

    #[test]
    fn repeated_collectives_stay_in_lockstep() {
        let comms = ThreadComm::group(3).unwrap();
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let mut sums = Vec::new();
                    for round in 0..50u64 {
                        sums.push(comm.allreduce_sum(round + comm.rank() as u64).unwrap());
                    }
                    sums
                })
            })
            .collect();

        for handle in handles {
            let sums = handle.join().unwrap();
            for (round, sum) in sums.into_iter().enumerate() {
                assert_eq!(sum, 3 * round as u64 + 3);
            }
        }
    }
}
