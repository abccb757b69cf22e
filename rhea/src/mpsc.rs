//! Core MPSC (Multi-Producer Single-Consumer) queue primitives.
//!
//! This module contains a bounded lock-free MPSC circular array algorithm.
//! Producers contend on a single CAS; the consumer synchronises on the slots
//! themselves.
//!
//! Used by:
//! - [`crate::sync::mpsc`] - In-process queues over heap memory

pub(crate) mod ring;
