//! # Synchronization for the DMA pool
//!
//! Busy-wait [`SpinGate`] guarding the pool's free list. Critical sections
//! are a handful of loads and stores; a waiter never enters the kernel.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_gate;

pub use spin_gate::{GateGuard, SpinGate};
