#![no_std]

pub const MAX_PATH_LEN: usize = 256;
pub const MAX_NAME_LEN: usize = 32;

pub mod devfs;
pub mod fileio;
pub mod ramfs;
pub mod vfs;

pub mod tests;

#[cfg(test)]
extern crate std;

pub use devfs::DevFs;
pub use fileio::*;
pub use ramfs::RamFs;
pub use vfs::{
    FileStat, FileSystem, FileType, InodeId, VfsError, VfsResult, mount,
    vfs_init_builtin_filesystems, vfs_is_initialized,
};
