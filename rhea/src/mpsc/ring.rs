//! Core lock-free MPSC circular array algorithm.
//!
//! This module provides a bounded lock-free MPSC (Multi-Producer
//! Single-Consumer) queue over a padded power-of-two slot array.
//!
//! # Algorithm
//!
//! Logical indices are unbounded monotonic `u64` counters; the physical slot
//! for index `i` is `pad + ((i & mask) << sparse_shift)`:
//!
//! - Producers reserve an index with a CAS on the producer index, then
//!   publish the element into the reserved slot with a release store
//! - A slot is an `AtomicPtr`: null means "not yet published or already
//!   consumed", non-null is an owned pointer to a published element
//! - The consumer acquire-loads the slot at its own index; on null it
//!   distinguishes "empty" from "reservation in flight" via the producer
//!   index, then clears the slot and advances
//!
//! FIFO follows the CAS reservation order, not the order publication stores
//! physically complete: the consumer waits at index `i` until the producer
//! that won `i` publishes, even if `i + 1` is already visible.
//!
//! # Layout
//!
//! The producer index, the producers' stale consumer-index cache, and the
//! consumer index each live in their own 128-byte-aligned cell so no two of
//! them (and no adjacent-line prefetcher pair) share a cache line. The slot
//! array carries two cache lines of permanent padding at each end so the live
//! slots never share a line with a hot heap neighbour.
//!
//! # Safety
//!
//! Producer-side operations are safe to call from any number of threads. The
//! consumer-side operations have unsafe APIs because they require the caller
//! to uphold the single-consumer invariant: at most one thread executing
//! `poll`, `peek`, or `clear` at any time.

use std::mem::size_of;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::config::{Config, ConfigError, round_capacity};

/// Producer index cell: count of slots reserved by producers.
///
/// CAS-advanced by every producer. Aligned so reservation traffic cannot
/// invalidate the line holding the consumer index or the slot array.
#[repr(C)]
#[repr(align(128))]
pub(crate) struct ProducerState {
    /// Next logical index to reserve.
    pub(crate) index: AtomicU64,
}

impl ProducerState {
    pub(crate) const fn new() -> Self {
        Self {
            index: AtomicU64::new(0),
        }
    }
}

impl Default for ProducerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Producers' shared stale view of the consumer index.
///
/// Consulted on every `offer` and refreshed from [`ConsumerState`] only when
/// the stale value makes the queue look full, which keeps the common offer
/// path off the consumer's cache line entirely.
#[repr(C)]
#[repr(align(128))]
pub(crate) struct ConsumerCache {
    /// A consumer index observed at some point in the past.
    pub(crate) index: AtomicU64,
}

impl ConsumerCache {
    pub(crate) const fn new() -> Self {
        Self {
            index: AtomicU64::new(0),
        }
    }
}

impl Default for ConsumerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer index cell: count of slots consumed.
///
/// Written only by the consumer, acquire-read by producers on the fullness
/// slow path.
#[repr(C)]
#[repr(align(128))]
pub(crate) struct ConsumerState {
    /// Next logical index to consume.
    pub(crate) index: AtomicU64,
}

impl ConsumerState {
    pub(crate) const fn new() -> Self {
        Self {
            index: AtomicU64::new(0),
        }
    }
}

impl Default for ConsumerState {
    fn default() -> Self {
        Self::new()
    }
}

/// A single element cell.
///
/// Null is the "not yet published or already consumed" sentinel; a non-null
/// value is an owned `Box<E>` pointer published by a producer. Publication
/// never stores null because `Box::into_raw` never returns null.
#[repr(transparent)]
pub(crate) struct Slot<E>(AtomicPtr<E>);

impl<E> Slot<E> {
    const fn empty() -> Self {
        Self(AtomicPtr::new(ptr::null_mut()))
    }

    /// Acquire load, pairing with the release store in [`Slot::publish`].
    #[inline]
    fn load_acquire(&self) -> *mut E {
        self.0.load(Ordering::Acquire)
    }

    /// Release store of a published element pointer. Everything the producer
    /// wrote before this store is visible to whoever acquire-loads it.
    #[inline]
    fn publish(&self, e: *mut E) {
        self.0.store(e, Ordering::Release);
    }

    /// Release store of the null sentinel, returning the slot to EMPTY for
    /// the next wrap-around generation.
    #[inline]
    fn clear(&self) {
        self.0.store(ptr::null_mut(), Ordering::Release);
    }

    /// Re-reads the slot until a reservation in flight becomes a publication.
    #[inline]
    fn spin_until_published(&self) -> *mut E {
        loop {
            let e = self.load_acquire();
            if !e.is_null() {
                return e;
            }
            std::hint::spin_loop();
        }
    }
}

// SAFETY: Slot is a pointer cell whose pointee ownership transfers between
// threads via the publish/clear protocol, so sharing it requires E: Send.
unsafe impl<E: Send> Send for Slot<E> {}
unsafe impl<E: Send> Sync for Slot<E> {}

/// Core MPSC ring structure.
///
/// Field order matters: the read-only geometry fields are grouped up front,
/// and each index cell starts a fresh 128-byte block, so a write to one index
/// never invalidates a line holding another index or the geometry.
#[repr(C)]
pub(crate) struct Ring<E> {
    /// Capacity minus one; wrap-around is `index & mask`.
    mask: u64,

    /// Successive logical slots sit `1 << sparse_shift` physical slots apart.
    sparse_shift: u32,

    /// Slots of permanent padding at each end of the buffer: two cache lines
    /// of element pointers.
    pad: usize,

    /// Padded slot storage. Data lives in `[pad, pad + (capacity << sparse_shift))`;
    /// everything outside is never touched.
    slots: Box<[Slot<E>]>,

    /// Producer index on its own cache line pair.
    producer: ProducerState,

    /// Producers' stale consumer index, separately isolated because every
    /// producer writes it on the fullness slow path.
    consumer_cache: ConsumerCache,

    /// Consumer index on its own cache line pair.
    consumer: ConsumerState,
}

impl<E> Ring<E> {
    /// Allocates a ring for at least `requested` elements.
    ///
    /// The capacity is rounded up to the next power of two, clamped below at
    /// two. All slots start as the null sentinel.
    ///
    /// # Errors
    ///
    /// Rejects a zero capacity, an invalid cache line size, and geometries
    /// whose padded sparse buffer overflows the slot index range.
    pub(crate) fn new(requested: usize, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        if requested == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let slot_range = ConfigError::SlotRange {
            capacity: requested,
            sparse_shift: config.sparse_shift,
        };
        let capacity = round_capacity(requested).ok_or(slot_range)?;
        let pad = (config.cache_line_size * 2) / size_of::<*mut E>();
        // checked_shl only rejects the shift amount, not shifted-out bits.
        let len = 1usize
            .checked_shl(config.sparse_shift)
            .and_then(|stride| capacity.checked_mul(stride))
            .and_then(|data| data.checked_add(pad * 2))
            .ok_or(slot_range)?;

        let slots = (0..len).map(|_| Slot::empty()).collect();
        Ok(Self {
            mask: capacity as u64 - 1,
            sparse_shift: config.sparse_shift,
            pad,
            slots,
            producer: ProducerState::new(),
            consumer_cache: ConsumerCache::new(),
            consumer: ConsumerState::new(),
        })
    }

    /// Exact capacity in elements.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        (self.mask + 1) as usize
    }

    /// Physical slot for a logical index.
    #[inline]
    fn slot_of(&self, index: u64) -> &Slot<E> {
        let offset = ((index & self.mask) as usize) << self.sparse_shift;
        &self.slots[self.pad + offset]
    }

    /// Attempts to enqueue an item.
    ///
    /// Lock-free for any number of concurrent producers: the only contended
    /// operation is the CAS on the producer index. Never spins on a slot.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, allowing retry.
    pub(crate) fn offer(&self, item: E) -> Result<(), E> {
        let capacity = self.mask + 1;
        let mut cached = self.consumer_cache.index.load(Ordering::Relaxed);
        let mut reserved;
        loop {
            reserved = self.producer.index.load(Ordering::Acquire);

            // Fullness check against the stale consumer index first; touch
            // the consumer's line only when the stale value says full.
            if cached + capacity <= reserved {
                let consumed = self.consumer.index.load(Ordering::Acquire);
                if consumed + capacity <= reserved {
                    return Err(item);
                }
                // A fresh consumer index racing a stale producer index can
                // exceed `reserved`; that classifies as "not full" here and
                // the CAS below fails, restarting with a fresh reservation.
                self.consumer_cache.index.store(consumed, Ordering::Relaxed);
                cached = consumed;
            }

            if self
                .producer
                .index
                .compare_exchange_weak(reserved, reserved + 1, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }

        // Reservation won: this thread is the only writer of slot `reserved`
        // this generation. The release store publishes the element and
        // everything it transitively references.
        let e = Box::into_raw(Box::new(item));
        self.slot_of(reserved).publish(e);
        Ok(())
    }

    /// Attempts to dequeue the oldest element.
    ///
    /// Returns `None` if the queue is empty. If the slot at the consumer
    /// index is reserved but not yet published, spins until the in-flight
    /// publication lands: FIFO is per logical index, so index `i + 1` is
    /// never returned before index `i`.
    ///
    /// # Safety
    ///
    /// Caller must ensure at most one thread executes `poll`, `peek`, or
    /// `clear` at any time (single consumer).
    pub(crate) unsafe fn poll(&self) -> Option<E> {
        // Plain load: the consumer is the only writer of its own index.
        let current = self.consumer.index.load(Ordering::Relaxed);
        let slot = self.slot_of(current);

        let mut e = slot.load_acquire();
        if e.is_null() {
            if self.producer.index.load(Ordering::Acquire) == current {
                return None;
            }
            // A producer won `current` but hasn't published yet.
            e = slot.spin_until_published();
        }

        slot.clear();
        self.consumer.index.store(current + 1, Ordering::Release);

        // SAFETY: non-null slot pointers come from Box::into_raw in offer,
        // and the acquire load synchronised with the publishing release
        // store. The slot is cleared and the single-consumer invariant holds,
        // so this is the sole owner of the allocation.
        Some(*unsafe { Box::from_raw(e) })
    }

    /// As [`Ring::poll`], but leaves the element in place.
    ///
    /// # Safety
    ///
    /// Caller must ensure at most one thread executes `poll`, `peek`, or
    /// `clear` at any time, and that the returned borrow ends before the
    /// element is polled.
    pub(crate) unsafe fn peek(&self) -> Option<&E> {
        let current = self.consumer.index.load(Ordering::Relaxed);
        let slot = self.slot_of(current);

        let mut e = slot.load_acquire();
        if e.is_null() {
            if self.producer.index.load(Ordering::Acquire) == current {
                return None;
            }
            e = slot.spin_until_published();
        }

        // SAFETY: the pointer is a published Box that only the consumer can
        // free, and the caller keeps the borrow within its exclusive section.
        Some(unsafe { &*e })
    }

    /// Drains the queue until it observes itself empty.
    ///
    /// Specified only against a quiescent producer population: under
    /// sustained concurrent offers this loop does not terminate.
    ///
    /// # Safety
    ///
    /// Same contract as [`Ring::poll`].
    pub(crate) unsafe fn clear(&self) {
        while unsafe { self.poll() }.is_some() || !self.is_empty() {}
    }

    /// Loose element count, clamped to `[0, capacity]`.
    ///
    /// Re-reads the consumer index around the producer index load until it is
    /// stable, so the snapshot never pairs a fresh consumer index with a
    /// staler producer index.
    pub(crate) fn size(&self) -> usize {
        let mut after = self.consumer.index.load(Ordering::Acquire);
        loop {
            let before = after;
            let produced = self.producer.index.load(Ordering::Acquire);
            after = self.consumer.index.load(Ordering::Acquire);
            if before == after {
                return (produced - after).min(self.mask + 1) as usize;
            }
        }
    }

    /// Loose emptiness snapshot.
    pub(crate) fn is_empty(&self) -> bool {
        self.consumer.index.load(Ordering::Acquire) == self.producer.index.load(Ordering::Acquire)
    }
}

impl<E> Drop for Ring<E> {
    fn drop(&mut self) {
        // Exclusive access: every reserved slot has been published by now
        // (no endpoint means no producer mid-offer), so free the window of
        // still-queued elements.
        let consumed = *self.consumer.index.get_mut();
        let produced = *self.producer.index.get_mut();
        for index in consumed..produced {
            let offset = self.pad + (((index & self.mask) as usize) << self.sparse_shift);
            let e = *self.slots[offset].0.get_mut();
            if !e.is_null() {
                // SAFETY: the pointer came from Box::into_raw and nothing
                // else can free it while we hold &mut self.
                drop(unsafe { Box::from_raw(e) });
            }
        }
    }
}

// SAFETY: Ring is Send because transferring it transfers ownership of the
// queued elements, which requires E: Send.
unsafe impl<E: Send> Send for Ring<E> {}

// SAFETY: Ring is Sync because concurrent access is mediated by atomics:
// - Producers coordinate via the CAS on the producer index
// - Slot publish/clear carry elements across threads with release/acquire
// - The consumer side additionally requires the single-consumer contract,
//   enforced by the unsafe APIs above
unsafe impl<E: Send> Sync for Ring<E> {}
