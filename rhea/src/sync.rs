//! In-process (inter-thread) queue endpoints.
//!
//! This module wraps the core algorithms in safe, typed endpoint handles:
//! - [`mpsc`] - Many producers, one consumer, over heap memory

pub mod mpsc;
