//! Lock-free MPSC queue for in-process (inter-thread) communication.
//!
//! A bounded queue using a heap-allocated, padded circular slot array with
//! atomic indices. Any number of producer threads, exactly one consumer.
//!
//! # Overview
//!
//! - [`Producer`] - Write end; clone one per producer thread
//! - [`Consumer`] - Read end; a unique handle whose mutating operations take
//!   `&mut self`, making the single-consumer rule a compile-time property
//! - Lock-free: no mutexes or syscalls anywhere in the hot path. `offer`
//!   spins only on CAS contention; `poll` spins only across the narrow
//!   window of a reserved-but-unpublished slot
//!
//! # Example
//!
//! ```
//! use rhea::sync::mpsc;
//!
//! let (producer, mut consumer) = mpsc::queue::<u64>(1024)?;
//!
//! // Producer threads (clone per thread)
//! producer.offer(42).expect("queue full");
//!
//! // Consumer thread
//! assert_eq!(consumer.poll(), Some(42));
//! assert_eq!(consumer.poll(), None);
//! # Ok::<(), rhea::ConfigError>(())
//! ```
//!
//! # Ordering
//!
//! Elements come out in producer-index reservation order. For any single
//! producer that is exactly its offer order; across producers it is the
//! order their CAS reservations landed, not the real-time order `offer` was
//! entered. A successful `offer(e)` happens-before the `poll` that returns
//! `e`.
//!
//! # Iteration
//!
//! Deliberately unsupported: neither endpoint implements [`Iterator`] or
//! [`IntoIterator`]. Drain with [`Consumer::poll`].

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::mpsc::ring::Ring;
use crate::trace::debug;

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the MPSC queue.
///
/// Multiple producers are the expected use: clone the handle once per
/// producer thread.
///
/// # Thread Safety
///
/// `Producer` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share one `&Producer` across threads; clone instead
pub struct Producer<E: Send> {
    ring: Arc<Ring<E>>,
    _unsync: PhantomUnsync,
}

/// Read end of the MPSC queue.
///
/// Only one consumer exists per queue: the handle is not [`Clone`], and
/// `poll`/`peek`/`clear` take `&mut self`, so no two threads can drain the
/// same queue concurrently.
pub struct Consumer<E: Send> {
    ring: Arc<Ring<E>>,
}

/// Creates a new MPSC queue with the default [`Config`].
///
/// `capacity` is rounded up to the next power of two (at least 2). Returns a
/// `(Producer, Consumer)` pair; both can be sent to other threads.
///
/// # Errors
///
/// Rejects a zero capacity.
pub fn queue<E: Send>(capacity: usize) -> Result<(Producer<E>, Consumer<E>), ConfigError> {
    queue_with(capacity, Config::default())
}

/// Creates a new MPSC queue with explicit layout options.
///
/// # Errors
///
/// Rejects a zero capacity, a cache line size that is not a power of two,
/// and a capacity/sparse-shift combination that overflows the slot index
/// range.
///
/// # Example
///
/// ```
/// use rhea::Config;
/// use rhea::sync::mpsc;
///
/// let config = Config { sparse_shift: 2, ..Config::default() };
/// let (producer, mut consumer) = mpsc::queue_with::<String>(16, config)?;
///
/// producer.offer("hello".to_string()).unwrap();
/// assert_eq!(consumer.poll(), Some("hello".to_string()));
/// # Ok::<(), rhea::ConfigError>(())
/// ```
pub fn queue_with<E: Send>(
    capacity: usize,
    config: Config,
) -> Result<(Producer<E>, Consumer<E>), ConfigError> {
    let ring = Arc::new(Ring::new(capacity, config)?);
    debug!(
        requested = capacity,
        capacity = ring.capacity(),
        sparse_shift = config.sparse_shift,
        cache_line_size = config.cache_line_size,
        "created mpsc queue"
    );

    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };
    let consumer = Consumer { ring };

    Ok((producer, consumer))
}

impl<E: Send> Producer<E> {
    /// Attempts to enqueue an item.
    ///
    /// Never blocks and never spins on a slot; under CAS contention it
    /// retries the reservation.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, allowing retry.
    #[inline]
    pub fn offer(&self, item: E) -> Result<(), E> {
        self.ring.offer(item)
    }

    /// Exact capacity in elements.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<E: Send> Clone for Producer<E> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
            _unsync: PhantomData,
        }
    }
}

impl<E: Send> Consumer<E> {
    /// Dequeues the oldest element, or `None` if the queue is empty.
    ///
    /// If the oldest slot is reserved but its publication is still in
    /// flight, spins until that producer's store lands: elements never come
    /// out ahead of a slower reservation before them.
    #[inline]
    #[must_use]
    pub fn poll(&mut self) -> Option<E> {
        // SAFETY: `&mut self` on a non-Clone handle means this thread is the
        // only consumer for the duration of the call.
        unsafe { self.ring.poll() }
    }

    /// Borrows the oldest element without removing it, or `None` if empty.
    ///
    /// The borrow keeps the consumer exclusively borrowed, so the element
    /// cannot be polled (and freed) while observed.
    #[inline]
    #[must_use]
    pub fn peek(&mut self) -> Option<&E> {
        // SAFETY: as in `poll`; the returned borrow is tied to `&mut self`,
        // so no poll can free the element while it is observed.
        unsafe { self.ring.peek() }
    }

    /// Drains the queue until it observes itself empty.
    ///
    /// Specified only against quiescent producers: with offers still
    /// arriving, the drain loop chases them and does not terminate.
    pub fn clear(&mut self) {
        // SAFETY: as in `poll`.
        unsafe { self.ring.clear() }
    }

    /// Loose element count, always within `[0, capacity]`.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// Loose emptiness snapshot.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Exact capacity in elements.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}
