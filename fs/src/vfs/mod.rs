pub mod init;
pub mod mount;
pub mod ops;
pub mod path;
pub mod traits;

pub use init::{vfs_init_builtin_filesystems, vfs_is_initialized};
pub use mount::{mount, unmount, with_mount_table};
pub use ops::{
    VfsHandle, vfs_chmod, vfs_link, vfs_list, vfs_mkdir, vfs_open, vfs_readlink, vfs_rename,
    vfs_stat, vfs_symlink, vfs_unlink,
};
pub use path::{ResolvedPath, resolve_no_follow, resolve_parent, resolve_path};
pub use traits::{FileStat, FileSystem, FileType, InodeId, VfsError, VfsResult};
