//! Fixed-capacity frame buffer pool
//!
//! Every slot is either free (owned by the pool) or checked out (owned by a
//! [`FrameGuard`]). The slot storage itself moves into the guard on fetch and
//! back into the pool on release, so a slot can never be in both places.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use bytes::BytesMut;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use tracing::{trace, warn};

use crate::capture::FrameMeta;
use crate::error::{Error, Result};
use crate::sdk::{FrameSource, StreamStatistics};

struct PoolState<S> {
    source: S,
    /// Indices of free slots, oldest-released first
    free: HeapRb<usize>,
    /// Slot storage; `None` while the slot is checked out
    slots: Vec<Option<BytesMut>>,
    stats: Stats,
}

#[derive(Default)]
struct Stats {
    frames_received: u64,
    frames_released: u64,
    empty_polls: u64,
}

/// Ring of frame slots bound to one stream
pub struct BufferPool<S: FrameSource> {
    capacity: usize,
    state: RefCell<PoolState<S>>,
}

impl<S: FrameSource> BufferPool<S> {
    pub fn new(source: S, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "buffer pool needs at least one slot".into(),
            ));
        }
        let mut free = HeapRb::new(capacity);
        for index in 0..capacity {
            // Cannot fail: the ring holds exactly `capacity` indices.
            let _ = free.try_push(index);
        }
        Ok(Self {
            capacity,
            state: RefCell::new(PoolState {
                source,
                free,
                slots: (0..capacity).map(|_| Some(BytesMut::new())).collect(),
                stats: Stats::default(),
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of fetched frames not yet released
    pub fn outstanding(&self) -> usize {
        self.capacity - self.state.borrow().free.occupied_len()
    }

    /// Fetch the next filled buffer.
    ///
    /// `Ok(None)` means nothing arrived this poll. With every slot checked
    /// out the fetch is rejected with [`Error::PoolExhausted`] and the stream
    /// is not touched.
    pub fn try_fetch_next(&self, timeout: Duration) -> Result<Option<FrameGuard<'_, S>>> {
        let mut state = self.state.borrow_mut();
        let Some(index) = state.free.try_pop() else {
            return Err(Error::PoolExhausted {
                capacity: self.capacity,
            });
        };
        let mut data = state.slots[index].take().unwrap_or_default();
        data.clear();

        let result = state.source.next_frame(&mut data, timeout);
        match result {
            Ok(Some(meta)) => {
                state.stats.frames_received += 1;
                trace!("slot {} checked out for frame {}", index, meta.sequence);
                Ok(Some(FrameGuard {
                    pool: self,
                    index,
                    data: Some(data),
                    meta,
                }))
            }
            Ok(None) => {
                state.stats.empty_polls += 1;
                state.return_slot(index, data);
                Ok(None)
            }
            Err(e) => {
                state.return_slot(index, data);
                Err(Error::Stream(e))
            }
        }
    }

    fn release(&self, index: usize, data: BytesMut, sequence: u64) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.return_slot(index, data);
        state.stats.frames_released += 1;
        trace!("slot {} released (frame {})", index, sequence);
        state.source.release(sequence).map_err(Error::Stream)
    }

    /// Snapshot of pool and device counters
    pub fn statistics(&self) -> StreamStatistics {
        let state = self.state.borrow();
        let counters = state.source.counters();
        StreamStatistics {
            frames_received: state.stats.frames_received,
            frames_dropped: counters.frames_dropped,
            frames_incomplete: counters.frames_incomplete,
            empty_polls: state.stats.empty_polls,
            outstanding: self.capacity - state.free.occupied_len(),
            fps: counters.fps,
        }
    }

    /// Number of frames given back to the pool so far
    pub fn frames_released(&self) -> u64 {
        self.state.borrow().stats.frames_released
    }

    /// Borrow the underlying stream
    pub fn with_source<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.borrow().source)
    }
}

impl<S> PoolState<S> {
    fn return_slot(&mut self, index: usize, data: BytesMut) {
        self.slots[index] = Some(data);
        if self.free.try_push(index).is_err() {
            // Only reachable if an index were returned twice.
            warn!("slot {} returned to a full pool", index);
        }
    }
}

impl<S: FrameSource> fmt::Debug for BufferPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// A checked-out frame. The slot goes back to the pool when the guard is
/// released or dropped, whichever comes first.
pub struct FrameGuard<'p, S: FrameSource> {
    pool: &'p BufferPool<S>,
    index: usize,
    data: Option<BytesMut>,
    meta: FrameMeta,
}

impl<S: FrameSource> FrameGuard<'_, S> {
    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Release now and report errors from the stream.
    pub fn release(mut self) -> Result<()> {
        match self.data.take() {
            Some(data) => self.pool.release(self.index, data, self.meta.sequence),
            None => Ok(()),
        }
    }
}

impl<S: FrameSource> Deref for FrameGuard<'_, S> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl<S: FrameSource> Drop for FrameGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            if let Err(e) = self.pool.release(self.index, data, self.meta.sequence) {
                warn!("releasing frame {} failed: {}", self.meta.sequence, e);
            }
        }
    }
}
