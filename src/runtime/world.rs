//! In-process SPMD world: one thread per rank sharing a rendezvous.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::ops::Add;
use std::sync::Barrier;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::error::RuntimeError;
use crate::ir::DType;

/// Element types carried by collectives and messages.
pub trait Element: Copy + Default + Add<Output = Self> + Send + Sync + std::fmt::Debug + 'static {
    const DTYPE: DType;
}

macro_rules! element {
    ($($t:ty => $d:ident),* $(,)?) => {
        $(impl Element for $t {
            const DTYPE: DType = DType::$d;
        })*
    };
}

element!(
    i8 => I8,
    u8 => U8,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

type Slot = Option<Box<dyn Any + Send>>;
type MailKey = (i32, i32, i32);

struct Shared {
    size: i32,
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
    mailboxes: Mutex<HashMap<MailKey, VecDeque<Box<dyn Any + Send>>>>,
    delivered: Condvar,
    epoch: Instant,
}

/// Runs a closure on `size` ranks.
pub struct World;

impl World {
    /// Spawns one thread per rank, runs `f` on each and returns the results
    /// in rank order. A panic on any rank is re-raised here.
    pub fn run<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Comm<'_>) -> T + Sync,
    {
        let size = size.max(1);
        let shared = Shared {
            size: size as i32,
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
            mailboxes: Mutex::new(HashMap::new()),
            delivered: Condvar::new(),
            epoch: Instant::now(),
        };
        debug!(size, "starting SPMD world");
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let comm = Comm {
                        rank: rank as i32,
                        shared: &shared,
                    };
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}

/// Outcome of a non-blocking call, consumed by [`Comm::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// The call was issued with a false condition.
    Skipped,
    /// Sends are buffered and complete on issue.
    Sent,
    Recv { src: i32, tag: i32 },
}

/// One rank's view of the world.
pub struct Comm<'w> {
    rank: i32,
    shared: &'w Shared,
}

impl Comm<'_> {
    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn size(&self) -> i32 {
        self.shared.size
    }

    /// Seconds since the world started.
    pub fn get_time(&self) -> f64 {
        self.shared.epoch.elapsed().as_secs_f64()
    }

    pub fn barrier(&self) {
        self.shared.barrier.wait();
    }

    /// Every rank's contribution, in rank order.
    fn gather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>, RuntimeError> {
        let boxed: Box<dyn Any + Send> = Box::new(value);
        self.shared.slots.lock()[self.rank as usize] = Some(boxed);
        self.shared.barrier.wait();
        let all = {
            let slots = self.shared.slots.lock();
            slots
                .iter()
                .enumerate()
                .map(|(peer, slot)| {
                    slot.as_ref()
                        .and_then(|b| b.downcast_ref::<T>())
                        .cloned()
                        .ok_or_else(|| RuntimeError::CollectiveMismatch {
                            rank: self.rank,
                            detail: format!(
                                "rank {} contributed a different type than {}",
                                peer,
                                std::any::type_name::<T>()
                            ),
                        })
                })
                .collect::<Result<Vec<_>, _>>()
        };
        // Nobody may overwrite a slot before every rank has read it.
        self.shared.barrier.wait();
        all
    }

    /// Sum of `value` over all ranks, returned on every rank.
    pub fn reduce<T: Element>(&self, value: T) -> Result<T, RuntimeError> {
        let all = self.gather(value)?;
        Ok(all.into_iter().fold(T::default(), |acc, v| acc + v))
    }

    /// Sum of the values of all lower ranks; zero on rank 0.
    pub fn exscan<T: Element>(&self, value: T) -> Result<T, RuntimeError> {
        let all = self.gather(value)?;
        Ok(all[..self.rank as usize]
            .iter()
            .fold(T::default(), |acc, &v| acc + v))
    }

    /// Element-wise in-place sum of `data` across ranks. Returns status 0.
    pub fn arr_reduce<T: Element>(&self, data: &mut [T]) -> Result<i32, RuntimeError> {
        let all = self.gather(data.to_vec())?;
        if let Some((peer, other)) = all.iter().enumerate().find(|(_, v)| v.len() != data.len()) {
            return Err(RuntimeError::CollectiveMismatch {
                rank: self.rank,
                detail: format!(
                    "array of {} elements, rank {} has {}",
                    data.len(),
                    peer,
                    other.len()
                ),
            });
        }
        for (i, slot) in data.iter_mut().enumerate() {
            *slot = all.iter().fold(T::default(), |acc, v| acc + v[i]);
        }
        Ok(0)
    }

    fn check_peer(&self, peer: i32) -> Result<(), RuntimeError> {
        if (0..self.shared.size).contains(&peer) {
            Ok(())
        } else {
            Err(RuntimeError::Unsupported(format!(
                "peer {} outside a world of {}",
                peer, self.shared.size
            )))
        }
    }

    pub fn isend<T: Element>(
        &self,
        data: &[T],
        peer: i32,
        tag: i32,
        cond: bool,
    ) -> Result<Request, RuntimeError> {
        if !cond {
            return Ok(Request::Skipped);
        }
        self.check_peer(peer)?;
        trace!(rank = self.rank, peer, tag, len = data.len(), "isend");
        self.shared
            .mailboxes
            .lock()
            .entry((self.rank, peer, tag))
            .or_default()
            .push_back(Box::new(data.to_vec()));
        self.shared.delivered.notify_all();
        Ok(Request::Sent)
    }

    pub fn irecv(&self, peer: i32, tag: i32, cond: bool) -> Result<Request, RuntimeError> {
        if !cond {
            return Ok(Request::Skipped);
        }
        self.check_peer(peer)?;
        Ok(Request::Recv { src: peer, tag })
    }

    /// Completes a request. A receive blocks until the matching message
    /// arrives and copies it into the front of `buf`.
    pub fn wait<T: Element>(
        &self,
        req: Request,
        buf: &mut [T],
        cond: bool,
    ) -> Result<i32, RuntimeError> {
        let (src, tag) = match req {
            Request::Recv { src, tag } if cond => (src, tag),
            _ => return Ok(0),
        };
        let key = (src, self.rank, tag);
        let msg = {
            let mut boxes = self.shared.mailboxes.lock();
            loop {
                if let Some(msg) = boxes.get_mut(&key).and_then(VecDeque::pop_front) {
                    break msg;
                }
                self.shared.delivered.wait(&mut boxes);
            }
        };
        let data = msg.downcast::<Vec<T>>().map_err(|_| RuntimeError::CollectiveMismatch {
            rank: self.rank,
            detail: format!("message from rank {} is not {}", src, T::DTYPE),
        })?;
        if data.len() > buf.len() {
            return Err(RuntimeError::CollectiveMismatch {
                rank: self.rank,
                detail: format!("{} elements into a buffer of {}", data.len(), buf.len()),
            });
        }
        buf[..data.len()].copy_from_slice(&data);
        trace!(rank = self.rank, src, tag, len = data.len(), "recv complete");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_exchange() {
        let got = World::run(3, |comm| {
            let next = (comm.rank() + 1) % comm.size();
            let prev = (comm.rank() + comm.size() - 1) % comm.size();
            let send = comm.isend(&[comm.rank() as i64], next, 7, true).unwrap();
            let recv = comm.irecv(prev, 7, true).unwrap();
            let mut buf = [0i64; 1];
            comm.wait(send, &mut [0i64; 0], true).unwrap();
            comm.wait(recv, &mut buf, true).unwrap();
            buf[0]
        });
        assert_eq!(got, vec![2, 0, 1]);
    }

    #[test]
    fn skipped_requests_complete_immediately() {
        let got = World::run(2, |comm| {
            let req = comm.irecv(0, 1, false).unwrap();
            let mut buf = [5i32; 1];
            comm.wait(req, &mut buf, true).unwrap();
            buf[0]
        });
        assert_eq!(got, vec![5, 5]);
    }

    #[test]
    fn mismatched_array_lengths_are_reported() {
        let got = World::run(2, |comm| {
            let mut data = vec![1.0f64; 2 + comm.rank() as usize];
            comm.arr_reduce(&mut data).is_err()
        });
        assert_eq!(got, vec![true, true]);
    }
}
