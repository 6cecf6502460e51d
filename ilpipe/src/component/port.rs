// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Ports and their buffer pools.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::{
    Buffer, Error, Result,
    config::BufferMode,
    engine::Direction,
};

struct PoolState {
    available: VecDeque<Buffer>,
    total: usize,
    flushing: bool,
    installed: bool,
}

/// Fixed-size set of buffers handed out to callers and reclaimed from the engine.
///
/// Buffers not in the pool are owned either by a caller or by the engine; the
/// pool only counts them. Acquisition blocks on a condition variable until a
/// buffer comes back, a flush begins, the fatal flag is raised or the deadline
/// passes.
pub struct BufferPool {
    state: Mutex<PoolState>,
    cond: Condvar,
    fatal: Arc<AtomicBool>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_fatal_flag(Arc::new(AtomicBool::new(false)))
    }

    pub(crate) fn with_fatal_flag(fatal: Arc<AtomicBool>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                available: VecDeque::new(),
                total: 0,
                flushing: false,
                installed: false,
            }),
            cond: Condvar::new(),
            fatal,
        }
    }

    /// Takes ownership of a freshly allocated buffer set and makes it available.
    pub fn install(&self, buffers: Vec<Buffer>) {
        let mut state = self.state.lock();
        state.total = buffers.len();
        state.available = buffers
            .into_iter()
            .enumerate()
            .map(|(index, mut buffer)| {
                buffer.set_index(index);
                buffer
            })
            .collect();
        state.flushing = false;
        state.installed = true;
        self.cond.notify_all();
    }

    /// Waits up to `timeout` for a buffer.
    ///
    /// Returns `None` on timeout, while a flush is in progress, when the pool
    /// holds no buffer set, or once the fatal flag is raised. A timeout is
    /// only logged when `timeout` is non-zero.
    pub fn acquire(&self, timeout: Duration) -> Option<Buffer> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if self.fatal.load(Ordering::Acquire) || state.flushing || !state.installed {
                return None;
            }
            if let Some(buffer) = state.available.pop_front() {
                return Some(buffer);
            }
            if timed_out {
                if !timeout.is_zero() {
                    warn!(
                        total = state.total,
                        "Timed out waiting for a free buffer after {:?}", timeout
                    );
                }
                return None;
            }
            timed_out = self.cond.wait_until(&mut state, deadline).timed_out();
        }
    }

    /// Returns a buffer to the pool and wakes this pool's waiters.
    ///
    /// Once the pool has been torn down the buffer is dropped instead; the
    /// return value tells whether the buffer was pooled.
    pub fn release(&self, buffer: Buffer) -> bool {
        let mut state = self.state.lock();
        if !state.installed {
            trace!(
                port = buffer.port(),
                index = buffer.index(),
                "Dropping buffer returned after pool teardown"
            );
            return false;
        }
        state.available.push_back(buffer);
        self.cond.notify_all();
        true
    }

    /// Stops handing out buffers and wakes every waiter.
    pub fn begin_flush(&self) {
        let mut state = self.state.lock();
        state.flushing = true;
        self.cond.notify_all();
    }

    pub fn end_flush(&self) {
        self.state.lock().flushing = false;
    }

    /// Blocks until every buffer of the set is back in the pool.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if buffers are still out at the deadline
    /// - [`Error::Fatal`] once the fatal flag is raised
    pub fn wait_drained(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if state.available.len() >= state.total {
                return Ok(());
            }
            if self.fatal.load(Ordering::Acquire) {
                return Err(Error::Fatal);
            }
            if timed_out {
                return Err(Error::Timeout);
            }
            timed_out = self.cond.wait_until(&mut state, deadline).timed_out();
        }
    }

    /// Removes every pooled buffer and forgets the set.
    ///
    /// Buffers still outstanding are dropped when they come back.
    pub fn take_all(&self) -> Vec<Buffer> {
        let mut state = self.state.lock();
        state.installed = false;
        state.total = 0;
        state.flushing = false;
        self.cond.notify_all();
        state.available.drain(..).collect()
    }

    /// Number of buffers currently in the pool.
    pub fn available(&self) -> usize {
        self.state.lock().available.len()
    }

    /// Size of the buffer set.
    pub fn total(&self) -> usize {
        self.state.lock().total
    }

    /// Buffers currently owned by a caller or the engine.
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock();
        state.total - state.available.len()
    }

    pub fn is_flushing(&self) -> bool {
        self.state.lock().flushing
    }

    pub fn is_installed(&self) -> bool {
        self.state.lock().installed
    }

    /// Wakes all waiters so they re-check the fatal flag.
    pub(crate) fn wake(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }
}

/// Buffer geometry negotiated for a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferLayout {
    pub count: usize,
    pub size: usize,
    pub alignment: usize,
    pub mode: BufferMode,
}

/// A numbered, directional attachment point of a component.
pub struct Port {
    direction: Direction,
    index: AtomicU32,
    pool: BufferPool,
    layout: Mutex<BufferLayout>,
}

impl Port {
    pub(crate) fn new(direction: Direction, fatal: Arc<AtomicBool>) -> Self {
        Self {
            direction,
            index: AtomicU32::new(0),
            pool: BufferPool::with_fatal_flag(fatal),
            layout: Mutex::new(BufferLayout::default()),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Engine port number, resolved at init.
    pub fn index(&self) -> u32 {
        self.index.load(Ordering::Acquire)
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn layout(&self) -> BufferLayout {
        *self.layout.lock()
    }

    pub(crate) fn set_index(&self, index: u32) {
        self.index.store(index, Ordering::Release);
    }

    pub(crate) fn set_layout(&self, layout: BufferLayout) {
        *self.layout.lock() = layout;
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn pool_with(count: usize) -> BufferPool {
        let pool = BufferPool::new();
        pool.install((0..count).map(|_| Buffer::new(130, 64)).collect());
        pool
    }

    #[test]
    fn every_buffer_is_either_pooled_or_outstanding() {
        let pool = pool_with(3);
        let first = pool.acquire(Duration::ZERO).unwrap();
        let second = pool.acquire(Duration::ZERO).unwrap();
        assert_eq!(pool.available() + pool.outstanding(), pool.total());
        assert_eq!(pool.outstanding(), 2);
        assert!(pool.release(first));
        assert!(pool.release(second));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn acquire_times_out_when_empty() {
        let pool = pool_with(1);
        let _held = pool.acquire(Duration::ZERO).unwrap();
        let started = Instant::now();
        assert!(pool.acquire(Duration::from_millis(30)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn release_wakes_a_blocked_acquire() {
        let pool = Arc::new(pool_with(1));
        let held = pool.acquire(Duration::ZERO).unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(30));
        pool.release(held);
        assert!(waiter.join().unwrap().is_some());
    }

    #[test]
    fn flush_blocks_acquisition_and_wakes_waiters() {
        let pool = Arc::new(pool_with(1));
        let held = pool.acquire(Duration::ZERO).unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(30));
        pool.begin_flush();
        assert!(waiter.join().unwrap().is_none());
        pool.release(held);
        assert!(pool.acquire(Duration::ZERO).is_none());
        pool.end_flush();
        assert!(pool.acquire(Duration::ZERO).is_some());
    }

    #[test]
    fn fatal_flag_short_circuits_acquire() {
        let fatal = Arc::new(AtomicBool::new(false));
        let pool = BufferPool::with_fatal_flag(fatal.clone());
        pool.install(vec![Buffer::new(0, 8)]);
        fatal.store(true, Ordering::Release);
        assert!(pool.acquire(Duration::from_secs(10)).is_none());
        assert!(matches!(
            pool.wait_drained(Duration::from_secs(10)),
            Err(Error::Fatal)
        ));
    }

    #[test]
    fn release_after_teardown_drops_the_buffer() {
        let pool = pool_with(2);
        let held = pool.acquire(Duration::ZERO).unwrap();
        assert_eq!(pool.take_all().len(), 1);
        assert!(!pool.release(held));
        assert_eq!(pool.available(), 0);
        assert!(pool.acquire(Duration::ZERO).is_none());
    }

    #[test]
    fn wait_drained_returns_once_all_buffers_are_back() {
        let pool = Arc::new(pool_with(2));
        let a = pool.acquire(Duration::ZERO).unwrap();
        let b = pool.acquire(Duration::ZERO).unwrap();
        assert!(matches!(
            pool.wait_drained(Duration::from_millis(10)),
            Err(Error::Timeout)
        ));
        let returner = {
            let pool = pool.clone();
            thread::spawn(move || {
                pool.release(a);
                thread::sleep(Duration::from_millis(20));
                pool.release(b);
            })
        };
        pool.wait_drained(Duration::from_secs(5)).unwrap();
        returner.join().unwrap();
    }
}
