//! Mounts the built-in filesystems the kernel boots with: `ramfs` at `/`
//! and `devfs` at `/dev`.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::devfs::DevFs;
use crate::ramfs::RamFs;
use crate::vfs::mount::mount;
use crate::vfs::traits::VfsResult;

static ROOT_FS: RamFs = RamFs::new_const();
static DEV_FS: DevFs = DevFs::new();
static VFS_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub fn vfs_init_builtin_filesystems() -> VfsResult<()> {
    if VFS_INITIALIZED.load(Ordering::Acquire) {
        return Ok(());
    }

    mount(b"/", &ROOT_FS, 0)?;
    mount(b"/dev", &DEV_FS, 0)?;

    VFS_INITIALIZED.store(true, Ordering::Release);
    Ok(())
}

pub fn vfs_is_initialized() -> bool {
    VFS_INITIALIZED.load(Ordering::Acquire)
}
