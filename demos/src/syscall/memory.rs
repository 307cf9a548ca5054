//! Memory management syscalls: brk, sbrk.

use core::ffi::c_void;

use super::numbers::*;
use super::raw::syscall1;

#[inline(always)]
#[unsafe(link_section = ".user_text")]
pub fn brk(addr: *mut c_void) -> *mut c_void {
    unsafe { syscall1(SYSCALL_BRK, addr as u64) as *mut c_void }
}

#[inline(always)]
#[unsafe(link_section = ".user_text")]
pub fn sbrk(increment: isize) -> *mut c_void {
    unsafe {
        let current = syscall1(SYSCALL_BRK, 0) as usize;
        if increment == 0 {
            return current as *mut c_void;
        }
        let new_brk = if increment > 0 {
            current.wrapping_add(increment as usize)
        } else {
            current.wrapping_sub((-increment) as usize)
        };
        let result = syscall1(SYSCALL_BRK, new_brk as u64) as usize;
        if result == new_brk {
            current as *mut c_void
        } else {
            usize::MAX as *mut c_void
        }
    }
}
