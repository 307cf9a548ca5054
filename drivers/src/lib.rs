#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod irq;
pub mod pic;
pub mod pit;
pub mod ps2;
pub mod random;
pub mod serial;
pub mod tty;

pub use ps2::keyboard;
