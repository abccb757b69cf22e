//! Bounded lock-free MPSC queue over a padded power-of-two circular slot
//! array.
//!
//! Many producer threads reserve slots with a single CAS on a shared
//! producer index and publish elements with a release store; one consumer
//! drains the slots in reservation order. No locks, no syscalls, and no
//! full fences on the hot path; the layout keeps the producer index, the
//! consumer index, and the element storage on separate cache lines.
//!
//! # Example
//!
//! ```
//! use std::thread;
//!
//! let (producer, mut consumer) = rhea::sync::mpsc::queue::<u64>(1024)?;
//!
//! let handles: Vec<_> = (0..3)
//!     .map(|p| {
//!         let producer = producer.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 while producer.offer(p * 100 + i).is_err() {
//!                     thread::yield_now();
//!                 }
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let mut received = 0;
//! while received < 300 {
//!     if consumer.poll().is_some() {
//!         received += 1;
//!     }
//! }
//!
//! for h in handles {
//!     h.join().unwrap();
//! }
//! # Ok::<(), rhea::ConfigError>(())
//! ```
//!
//! Memory layout is tunable per queue instance via [`Config`]; see
//! [`sync::mpsc::queue_with`].

pub mod config;
pub(crate) mod mpsc;
pub mod sync;
pub mod trace;

#[doc(inline)]
pub use config::{Config, ConfigError};

pub use trace::init_tracing;
