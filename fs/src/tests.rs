use core::ffi::c_int;

use slopos_abi::fs::UserFsEntry;
use slopos_lib::klog_info;

use crate::vfs::{
    vfs_init_builtin_filesystems, vfs_is_initialized, vfs_list, vfs_mkdir, vfs_open, vfs_stat,
    vfs_unlink,
};

pub fn test_vfs_initialized() -> c_int {
    klog_info!("VFS_TEST: check initialized");
    if !vfs_is_initialized() {
        return -1;
    }
    0
}

pub fn test_vfs_root_stat() -> c_int {
    klog_info!("VFS_TEST: root stat");
    let (kind, _size) = match vfs_stat(b"/") {
        Ok(stat) => stat,
        Err(_) => return -1,
    };
    if kind != 1 {
        return -1;
    }
    0
}

pub fn test_vfs_file_roundtrip() -> c_int {
    klog_info!("VFS_TEST: file roundtrip");
    if vfs_mkdir(b"/vfs_test").is_err() {
        return -1;
    }

    let handle = match vfs_open(b"/vfs_test/hello.txt", true) {
        Ok(h) => h,
        Err(_) => return -1,
    };

    let content = b"hello vfs";
    if handle.write(0, content).is_err() {
        return -1;
    }

    let mut buf = [0u8; 32];
    let read_len = match handle.read(0, &mut buf) {
        Ok(len) => len,
        Err(_) => return -1,
    };

    if read_len != content.len() || &buf[..content.len()] != content {
        return -1;
    }
    0
}

pub fn test_vfs_list() -> c_int {
    klog_info!("VFS_TEST: list directory");
    let mut entries = [UserFsEntry::new(); 8];
    let count = match vfs_list(b"/vfs_test", &mut entries) {
        Ok(count) => count,
        Err(_) => return -1,
    };

    let mut found = false;
    for entry in entries.iter().take(count) {
        if entry.name_str() == "hello.txt" {
            found = true;
            break;
        }
    }

    if !found {
        return -1;
    }
    0
}

pub fn test_vfs_unlink() -> c_int {
    klog_info!("VFS_TEST: unlink file");
    if vfs_unlink(b"/vfs_test/hello.txt").is_err() {
        return -1;
    }

    let mut entries = [UserFsEntry::new(); 8];
    let count = match vfs_list(b"/vfs_test", &mut entries) {
        Ok(count) => count,
        Err(_) => return -1,
    };

    for entry in entries.iter().take(count) {
        if entry.name_str() == "hello.txt" {
            return -1;
        }
    }
    0
}

pub fn vfs_tests_init() -> bool {
    if let Err(_) = vfs_init_builtin_filesystems() {
        klog_info!("VFS_TEST: failed to initialize VFS");
        return false;
    }
    true
}

const VFS_SUITE_NAME: &[u8] = b"vfs\0";

fn run_vfs_suite(_config: *const (), out: *mut slopos_lib::testing::TestSuiteResult) -> i32 {
    let start = slopos_lib::tsc::rdtsc();

    if !vfs_tests_init() {
        if let Some(out_ref) = unsafe { out.as_mut() } {
            out_ref.name = VFS_SUITE_NAME.as_ptr() as *const core::ffi::c_char;
            out_ref.total = 0;
            out_ref.passed = 0;
            out_ref.failed = 0;
            out_ref.elapsed_ms = 0;
        }
        return 0;
    }

    let mut passed = 0u32;
    let mut total = 0u32;

    slopos_lib::run_test!(passed, total, test_vfs_initialized);
    slopos_lib::run_test!(passed, total, test_vfs_root_stat);
    slopos_lib::run_test!(passed, total, test_vfs_file_roundtrip);
    slopos_lib::run_test!(passed, total, test_vfs_list);
    slopos_lib::run_test!(passed, total, test_vfs_unlink);

    let elapsed = slopos_lib::testing::measure_elapsed_ms(start, slopos_lib::tsc::rdtsc());

    if let Some(out_ref) = unsafe { out.as_mut() } {
        out_ref.name = VFS_SUITE_NAME.as_ptr() as *const core::ffi::c_char;
        out_ref.total = total;
        out_ref.passed = passed;
        out_ref.failed = total.saturating_sub(passed);
        out_ref.exceptions_caught = 0;
        out_ref.unexpected_exceptions = 0;
        out_ref.elapsed_ms = elapsed;
        out_ref.timed_out = 0;
    }

    if passed == total { 0 } else { -1 }
}

#[used]
#[unsafe(link_section = ".test_registry")]
static VFS_SUITE_DESC: slopos_lib::testing::TestSuiteDesc = slopos_lib::testing::TestSuiteDesc {
    name: VFS_SUITE_NAME.as_ptr() as *const core::ffi::c_char,
    run: Some(run_vfs_suite),
};
