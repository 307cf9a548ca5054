//! Unified syscall module for SlopOS userland.
//!
//! This module provides a clean, layered API for issuing system calls:
//!
//! - **Layer 1** (`raw`): Inline assembly primitives
//! - **Layer 2** (`error`): Error demultiplexing and `SyscallResult` type
//! - **Layer 3** (domain modules): Syscall wrappers organized by function
//!   - `fs`: Returns `SyscallResult<T>` for proper error handling
//!   - `tty`: Returns raw `i64` (fire-and-forget console I/O)
//!   - Others: Mix based on use case
//! - **Layer 4** (`wrappers`): RAII wrappers for resources
//!
//! # Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `raw` | Low-level inline asm syscall primitives |
//! | `error` | `SyscallError`, `SyscallResult`, `demux()` |
//! | `numbers` | Re-exports syscall numbers from `slopos_abi` |
//! | `core` | Yield, exit, sleep, time, CPU info |
//! | `tty` | TTY/console I/O (not file descriptors!) |
//! | `fs` | File descriptor operations |
//! | `memory` | brk, sbrk |
//! | `process` | spawn by path, exec, fork, halt, reboot |
//! | `wrappers` | RAII types (FdGuard) |

pub mod core;
pub mod error;
pub mod fs;
pub mod memory;
pub mod numbers;
pub mod process;
pub mod raw;
pub mod tty;
pub mod wrappers;

// Re-export commonly used items at the module root
pub use error::{SyscallError, SyscallResult};
pub use numbers::*;

// Re-export ABI types used by syscalls
pub use slopos_abi::syscall::UserSysInfo;
pub use slopos_abi::{
    USER_FS_OPEN_APPEND, USER_FS_OPEN_CREAT, USER_FS_OPEN_READ, USER_FS_OPEN_WRITE, UserFsEntry,
    UserFsList, UserFsStat,
};

pub use wrappers::fd::FdGuard;

pub type RawFd = i32;
