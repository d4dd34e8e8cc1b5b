//! Bounded idle queues backing the pool
//!
//! Two interchangeable backends implement [`IdleQueue`]:
//!
//! - [`ChannelQueue`] suspends waiters on tokio semaphores, so a waiting task
//!   costs nothing until a connection or a slot frees up.
//! - [`PollingQueue`] wraps a lock-free `ArrayQueue` and re-checks it every
//!   millisecond. It never parks on a wakeup primitive, which makes it usable
//!   from runtimes where only timers are reliable, but every waiter wakes
//!   1000 times per second and hand-off latency is up to one tick. Prefer
//!   the channel backend under contention.
//!
//! Both treat a zero timeout as "try once, do not wait".

use async_trait::async_trait;
use crossbeam::queue::ArrayQueue;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};

use crate::config::QueueKind;

/// Tick of the polling backend
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue operation timed out")]
    Timeout,

    #[error("Queue is closed")]
    Closed,
}

/// An item the queue refused to take, handed back to the caller
#[derive(Debug)]
pub struct Rejected<T> {
    pub item: T,
    pub reason: QueueError,
}

/// Fixed-capacity queue with timed pop/push and terminal close
#[async_trait]
pub trait IdleQueue<T: Send + 'static>: Send + Sync {
    /// Take the oldest item, waiting up to `timeout`
    async fn pop(&self, timeout: Duration) -> Result<T, QueueError>;

    /// Append an item, waiting up to `timeout` for a free slot
    async fn push(&self, item: T, timeout: Duration) -> Result<(), Rejected<T>>;

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    fn is_closed(&self) -> bool;

    /// Close the queue and hand back everything still queued
    ///
    /// Later pops and pushes fail with [`QueueError::Closed`]. Closing twice
    /// returns an empty batch.
    fn close(&self) -> Vec<T>;
}

/// Build the backend selected by `kind`
pub(crate) fn idle_queue<T: Send + 'static>(
    kind: QueueKind,
    capacity: usize,
) -> Box<dyn IdleQueue<T>> {
    match kind {
        QueueKind::Blocking => Box::new(ChannelQueue::new(capacity)),
        QueueKind::Polling => Box::new(PollingQueue::new(capacity)),
    }
}

async fn acquire_within(
    semaphore: &Semaphore,
    timeout: Duration,
) -> Result<SemaphorePermit<'_>, QueueError> {
    if timeout.is_zero() {
        return semaphore.try_acquire().map_err(|err| match err {
            TryAcquireError::Closed => QueueError::Closed,
            TryAcquireError::NoPermits => QueueError::Timeout,
        });
    }

    match tokio::time::timeout(timeout, semaphore.acquire()).await {
        Ok(Ok(permit)) => Ok(permit),
        Ok(Err(_)) => Err(QueueError::Closed),
        Err(_) => Err(QueueError::Timeout),
    }
}

struct Slots<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Scheduler-blocking queue
///
/// `filled` holds one permit per queued item and `free` one per empty slot.
/// A permit is always taken before touching the deque and returned to the
/// other semaphore afterwards, so waiters are served in arrival order.
pub struct ChannelQueue<T> {
    slots: Mutex<Slots<T>>,
    filled: Semaphore,
    free: Semaphore,
    capacity: usize,
}

impl<T> ChannelQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            filled: Semaphore::new(0),
            free: Semaphore::new(capacity),
            capacity,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> IdleQueue<T> for ChannelQueue<T> {
    async fn pop(&self, timeout: Duration) -> Result<T, QueueError> {
        acquire_within(&self.filled, timeout).await?.forget();

        // A permit without an item means close() drained the deque first
        let item = self.slots.lock().items.pop_front();
        match item {
            Some(item) => {
                self.free.add_permits(1);
                Ok(item)
            }
            None => Err(QueueError::Closed),
        }
    }

    async fn push(&self, item: T, timeout: Duration) -> Result<(), Rejected<T>> {
        match acquire_within(&self.free, timeout).await {
            Ok(permit) => permit.forget(),
            Err(reason) => return Err(Rejected { item, reason }),
        }

        {
            let mut slots = self.slots.lock();
            if slots.closed {
                return Err(Rejected {
                    item,
                    reason: QueueError::Closed,
                });
            }
            slots.items.push_back(item);
        }
        self.filled.add_permits(1);
        Ok(())
    }

    fn len(&self) -> usize {
        self.slots.lock().items.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    fn close(&self) -> Vec<T> {
        let drained = {
            let mut slots = self.slots.lock();
            if slots.closed {
                return Vec::new();
            }
            slots.closed = true;
            slots.items.drain(..).collect()
        };
        self.filled.close();
        self.free.close();
        drained
    }
}

/// Busy-polling queue over a lock-free ring buffer
pub struct PollingQueue<T> {
    items: ArrayQueue<T>,
    closed: RwLock<bool>,
}

impl<T> PollingQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: ArrayQueue::new(capacity.max(1)),
            closed: RwLock::new(false),
        }
    }

    async fn tick(remaining: &mut Duration) {
        tokio::task::yield_now().await;
        tokio::time::sleep(POLL_INTERVAL).await;
        *remaining = remaining.saturating_sub(POLL_INTERVAL);
    }

    fn try_pop(&self) -> Option<Result<T, QueueError>> {
        // Held across the pop so close() drains everything it reports
        let closed = self.closed.read();
        if *closed {
            return Some(Err(QueueError::Closed));
        }
        self.items.pop().map(Ok)
    }

    fn try_push(&self, item: T) -> Result<(), Rejected<T>> {
        // Held across the push so close() cannot drain in between
        let closed = self.closed.read();
        if *closed {
            return Err(Rejected {
                item,
                reason: QueueError::Closed,
            });
        }
        self.items.push(item).map_err(|item| Rejected {
            item,
            reason: QueueError::Timeout,
        })
    }
}

#[async_trait]
impl<T: Send + 'static> IdleQueue<T> for PollingQueue<T> {
    async fn pop(&self, timeout: Duration) -> Result<T, QueueError> {
        let mut remaining = timeout;
        loop {
            if let Some(popped) = self.try_pop() {
                return popped;
            }
            if remaining.is_zero() {
                return Err(QueueError::Timeout);
            }
            Self::tick(&mut remaining).await;
        }
    }

    async fn push(&self, item: T, timeout: Duration) -> Result<(), Rejected<T>> {
        let mut remaining = timeout;
        let mut item = item;
        loop {
            match self.try_push(item) {
                Ok(()) => return Ok(()),
                Err(rejected) if rejected.reason == QueueError::Closed => return Err(rejected),
                Err(rejected) => {
                    if remaining.is_zero() {
                        return Err(rejected);
                    }
                    item = rejected.item;
                }
            }
            Self::tick(&mut remaining).await;
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn capacity(&self) -> usize {
        self.items.capacity()
    }

    fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    fn close(&self) -> Vec<T> {
        let mut closed = self.closed.write();
        if *closed {
            return Vec::new();
        }
        *closed = true;
        let mut drained = Vec::with_capacity(self.items.len());
        while let Some(item) = self.items.pop() {
            drained.push(item);
        }
        drained
    }
}
