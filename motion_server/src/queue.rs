//! Increment Queue (§4.A): per-group bounded FIFO of fixed-period pulse
//! deltas, mutex-guarded. Single-writer (Interpolator) / single-reader
//! (Dispatcher), but still mutex-protected because control operations
//! (`clear`, `count`) run from the Motion Control Handler on reader tasks.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use motion_common::consts::MAX_AXES_PER_GROUP;

/// Default frame/tool/user tag: pulse-delta, no tool.
pub const FRAME_PULSE_INC: i32 = 0;

/// One realtime dispatch unit (§3 `Increment`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Increment {
    /// Timestamp, milliseconds from trajectory start.
    pub time_ms: i64,
    pub inc: [i32; MAX_AXES_PER_GROUP],
    pub tool: i32,
    pub frame: i32,
    pub user: i32,
}

impl Default for Increment {
    fn default() -> Self {
        Self {
            time_ms: 0,
            inc: [0; MAX_AXES_PER_GROUP],
            tool: 0,
            frame: FRAME_PULSE_INC,
            user: 0,
        }
    }
}

/// Outcome of `enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The queue stayed full until motion-readiness was lost while waiting.
    AbortedNotReady,
    /// The mutex could not be acquired within the configured timeout.
    LockTimeout,
}

struct RingState {
    slots: Vec<Increment>,
    head: usize,
    count: usize,
}

/// Ring buffer of fixed capacity Q, with head index, count, and a mutex.
///
/// Invariant: `0 <= count <= capacity`; mutation of `(head, count, slots)`
/// always happens under `inner`'s mutex.
pub struct IncrementQueue {
    inner: Mutex<RingState>,
    capacity: usize,
    lock_timeout: Duration,
}

impl IncrementQueue {
    pub fn new(capacity: usize) -> Self {
        Self::with_lock_timeout(capacity, Duration::from_millis(100))
    }

    pub fn with_lock_timeout(capacity: usize, lock_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(RingState {
                slots: vec![Increment::default(); capacity],
                head: 0,
                count: 0,
            }),
            capacity,
            lock_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire the mutex, spin-retrying briefly on contention up to
    /// `lock_timeout` before declaring a lock-acquisition fault
    /// ("queue is locked up", §4.A / §7 Realtime error kind).
    fn try_lock_with_timeout(&self) -> Option<std::sync::MutexGuard<'_, RingState>> {
        if let Ok(guard) = self.inner.try_lock() {
            return Some(guard);
        }
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            if let Ok(guard) = self.inner.try_lock() {
                return Some(guard);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_micros(100));
        }
    }

    /// Append at `(head+count) mod capacity`, blocking up to one
    /// interpolation period and retrying if full, and aborting if
    /// `is_motion_ready` goes false while waiting (§4.A, §8 boundary case).
    pub fn enqueue(
        &self,
        inc: Increment,
        period: Duration,
        is_motion_ready: impl Fn() -> bool,
    ) -> EnqueueOutcome {
        loop {
            let mut guard = match self.try_lock_with_timeout() {
                Some(g) => g,
                None => return EnqueueOutcome::LockTimeout,
            };
            if guard.count < self.capacity {
                let idx = (guard.head + guard.count) % self.capacity;
                guard.slots[idx] = inc;
                guard.count += 1;
                return EnqueueOutcome::Enqueued;
            }
            drop(guard);
            if !is_motion_ready() {
                return EnqueueOutcome::AbortedNotReady;
            }
            std::thread::sleep(period);
        }
    }

    /// Pop from head; `None` if empty.
    pub fn dequeue_one(&self) -> Option<Increment> {
        let mut guard = self.try_lock_with_timeout()?;
        if guard.count == 0 {
            return None;
        }
        let idx = guard.head;
        let item = guard.slots[idx];
        guard.head = (guard.head + 1) % self.capacity;
        guard.count -= 1;
        Some(item)
    }

    /// Peek the head without popping it, used by the Dispatcher's
    /// greedy-merge loop (§4.F).
    pub fn peek_head(&self) -> Option<Increment> {
        let guard = self.try_lock_with_timeout()?;
        if guard.count == 0 {
            return None;
        }
        Some(guard.slots[guard.head])
    }

    pub fn clear(&self) -> bool {
        match self.try_lock_with_timeout() {
            Some(mut guard) => {
                guard.count = 0;
                guard.head = 0;
                true
            }
            None => false,
        }
    }

    /// Returns queue depth, or `None` on lock timeout (caller maps this
    /// to FAILURE/-1 per §4.E `check-queue-count`).
    pub fn count(&self) -> Option<usize> {
        self.try_lock_with_timeout().map(|g| g.count)
    }
}
