#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod apps;
pub mod init_process;
pub mod libc;
pub mod program_registry;
pub mod runtime;
pub mod syscall;

/// Initializes userland runtime and registers lightweight startup steps.
///
/// This function performs minimal crate-level setup required to prepare the userland
/// runtime for operation.
///
/// # Examples
///
/// ```
/// userland::init();
/// ```
pub fn init() {}
