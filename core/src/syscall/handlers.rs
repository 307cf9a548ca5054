use core::ffi::c_char;
use core::ptr;

use slopos_abi::syscall::*;

use crate::syscall::common::SyscallEntry;
use crate::syscall::core_handlers::{
    syscall_clock_getres, syscall_clock_gettime, syscall_exit, syscall_get_time_ms,
    syscall_gettimeofday, syscall_halt, syscall_nanosleep, syscall_random_next, syscall_reboot,
    syscall_sleep_ms, syscall_sys_info, syscall_user_read, syscall_user_read_char,
    syscall_user_read_char_nb, syscall_user_write, syscall_yield,
};
use crate::syscall::fs::{
    syscall_chmod, syscall_dup, syscall_dup2, syscall_dup3, syscall_fcntl, syscall_fs_close,
    syscall_fs_list, syscall_fs_mkdir, syscall_fs_open, syscall_fs_read, syscall_fs_stat,
    syscall_fs_unlink, syscall_fs_write, syscall_fstat, syscall_ioctl, syscall_link,
    syscall_lseek, syscall_pipe, syscall_pipe2, syscall_poll, syscall_ppoll, syscall_pselect6,
    syscall_readlink, syscall_rename, syscall_select, syscall_symlink, syscall_truncate64,
    syscall_ftruncate64,
};
use crate::syscall::memory_handlers::{
    syscall_brk, syscall_mmap, syscall_mprotect, syscall_munmap,
};
use crate::syscall::process_handlers::{
    syscall_arch_prctl, syscall_clone, syscall_exec, syscall_exit_group, syscall_fork,
    syscall_futex, syscall_get_cpu_affinity, syscall_get_cpu_count, syscall_get_current_cpu,
    syscall_getegid, syscall_geteuid, syscall_getgid, syscall_getpgid, syscall_getpid,
    syscall_getppid, syscall_getuid, syscall_set_cpu_affinity, syscall_set_thread_area,
    syscall_set_tid_address, syscall_setpgid, syscall_setsid, syscall_spawn_path,
    syscall_terminate_task, syscall_vfork, syscall_wait4, syscall_waitpid,
};
use crate::syscall::signal::{
    syscall_kill, syscall_pause, syscall_rt_sigaction, syscall_rt_sigprocmask,
    syscall_rt_sigreturn, syscall_sigsuspend, syscall_tgkill, syscall_tkill,
};

macro_rules! syscall_table {
    (size: $size:expr; $( [$num:expr] => $handler:expr, $name:literal; )*) => {{
        let mut table: [SyscallEntry; $size] = [SyscallEntry {
            handler: None,
            name: core::ptr::null(),
        }; $size];
        $(
            table[$num as usize] = SyscallEntry {
                handler: Some($handler),
                name: concat!($name, "\0").as_ptr() as *const c_char,
            };
        )*
        table
    }};
}

static SYSCALL_TABLE: [SyscallEntry; SYSCALL_TABLE_SIZE] = syscall_table! {
    size: SYSCALL_TABLE_SIZE;

    // Core
    [SYSCALL_YIELD]          => syscall_yield,          "yield";
    [SYSCALL_EXIT]           => syscall_exit,           "exit";
    [SYSCALL_WRITE]          => syscall_user_write,     "write";
    [SYSCALL_READ]           => syscall_user_read,      "read";
    [SYSCALL_READ_CHAR]      => syscall_user_read_char, "read_char";
    [SYSCALL_READ_CHAR_NB]   => syscall_user_read_char_nb, "read_char_nb";
    [SYSCALL_SLEEP_MS]       => syscall_sleep_ms,       "sleep_ms";
    [SYSCALL_GET_TIME_MS]    => syscall_get_time_ms,    "get_time_ms";
    [SYSCALL_CLOCK_GETTIME]  => syscall_clock_gettime,  "clock_gettime";
    [SYSCALL_SYS_INFO]       => syscall_sys_info,       "sys_info";
    [SYSCALL_HALT]           => syscall_halt,           "halt";
    [SYSCALL_REBOOT]         => syscall_reboot,         "reboot";
    [SYSCALL_GETTIMEOFDAY]   => syscall_gettimeofday,   "gettimeofday";
    [SYSCALL_CLOCK_GETRES]   => syscall_clock_getres,   "clock_getres";
    [SYSCALL_NANOSLEEP]      => syscall_nanosleep,      "nanosleep";

    // Random
    [SYSCALL_RANDOM_NEXT] => syscall_random_next, "random_next";

    // Filesystem
    [SYSCALL_FS_OPEN]   => syscall_fs_open,   "fs_open";
    [SYSCALL_FS_CLOSE]  => syscall_fs_close,  "fs_close";
    [SYSCALL_FS_READ]   => syscall_fs_read,   "fs_read";
    [SYSCALL_FS_WRITE]  => syscall_fs_write,  "fs_write";
    [SYSCALL_FS_STAT]   => syscall_fs_stat,   "fs_stat";
    [SYSCALL_FS_MKDIR]  => syscall_fs_mkdir,  "fs_mkdir";
    [SYSCALL_FS_UNLINK] => syscall_fs_unlink, "fs_unlink";
    [SYSCALL_FS_LIST]   => syscall_fs_list,   "fs_list";
    [SYSCALL_DUP]       => syscall_dup,       "dup";
    [SYSCALL_DUP2]      => syscall_dup2,      "dup2";
    [SYSCALL_DUP3]      => syscall_dup3,      "dup3";
    [SYSCALL_FCNTL]     => syscall_fcntl,     "fcntl";
    [SYSCALL_LSEEK]     => syscall_lseek,     "lseek";
    [SYSCALL_FSTAT]     => syscall_fstat,     "fstat";
    [SYSCALL_PIPE]      => syscall_pipe,      "pipe";
    [SYSCALL_PIPE2]     => syscall_pipe2,     "pipe2";
    [SYSCALL_POLL]      => syscall_poll,      "poll";
    [SYSCALL_SELECT]    => syscall_select,    "select";
    [SYSCALL_IOCTL]     => syscall_ioctl,     "ioctl";
    [SYSCALL_RENAME]       => syscall_rename,       "rename";
    [SYSCALL_LINK]         => syscall_link,         "link";
    [SYSCALL_SYMLINK]      => syscall_symlink,      "symlink";
    [SYSCALL_READLINK]     => syscall_readlink,     "readlink";
    [SYSCALL_CHMOD]        => syscall_chmod,        "chmod";
    [SYSCALL_TRUNCATE64]   => syscall_truncate64,   "truncate64";
    [SYSCALL_FTRUNCATE64]  => syscall_ftruncate64,  "ftruncate64";
    [SYSCALL_PPOLL]        => syscall_ppoll,        "ppoll";
    [SYSCALL_PSELECT6]     => syscall_pselect6,     "pselect6";

    // Task management
    [SYSCALL_SPAWN_PATH]     => syscall_spawn_path,     "spawn_path";
    [SYSCALL_WAITPID]        => syscall_waitpid,        "waitpid";
    [SYSCALL_TERMINATE_TASK] => syscall_terminate_task, "terminate_task";
    [SYSCALL_EXEC]           => syscall_exec,           "exec";
    [SYSCALL_FORK]           => syscall_fork,           "fork";
    [SYSCALL_VFORK]          => syscall_vfork,          "vfork";
    [SYSCALL_WAIT4]          => syscall_wait4,          "wait4";
    [SYSCALL_EXIT_GROUP]     => syscall_exit_group,     "exit_group";
    [SYSCALL_CLONE]          => syscall_clone,          "clone";
    [SYSCALL_FUTEX]          => syscall_futex,          "futex";
    [SYSCALL_SET_TID_ADDRESS]  => syscall_set_tid_address,  "set_tid_address";
    [SYSCALL_SET_THREAD_AREA] => syscall_set_thread_area, "set_thread_area";

    // Memory management
    [SYSCALL_BRK]      => syscall_brk,      "brk";
    [SYSCALL_MMAP]     => syscall_mmap,     "mmap";
    [SYSCALL_MUNMAP]   => syscall_munmap,   "munmap";
    [SYSCALL_MPROTECT] => syscall_mprotect, "mprotect";

    // Process identity
    [SYSCALL_GETPID]  => syscall_getpid,  "getpid";
    [SYSCALL_GETPPID] => syscall_getppid, "getppid";
    [SYSCALL_GETPGID] => syscall_getpgid, "getpgid";
    [SYSCALL_SETPGID] => syscall_setpgid, "setpgid";
    [SYSCALL_SETSID]  => syscall_setsid,  "setsid";
    [SYSCALL_GETUID]  => syscall_getuid,  "getuid";
    [SYSCALL_GETGID]  => syscall_getgid,  "getgid";
    [SYSCALL_GETEUID] => syscall_geteuid, "geteuid";
    [SYSCALL_GETEGID] => syscall_getegid, "getegid";
    [SYSCALL_ARCH_PRCTL] => syscall_arch_prctl, "arch_prctl";

    // Signals
    [SYSCALL_RT_SIGACTION]   => syscall_rt_sigaction,   "rt_sigaction";
    [SYSCALL_RT_SIGPROCMASK] => syscall_rt_sigprocmask, "rt_sigprocmask";
    [SYSCALL_KILL]           => syscall_kill,           "kill";
    [SYSCALL_RT_SIGRETURN]   => syscall_rt_sigreturn,   "rt_sigreturn";
    [SYSCALL_TKILL]          => syscall_tkill,          "tkill";
    [SYSCALL_TGKILL]         => syscall_tgkill,         "tgkill";
    [SYSCALL_PAUSE]          => syscall_pause,          "pause";
    [SYSCALL_SIGSUSPEND]     => syscall_sigsuspend,     "sigsuspend";

    // SMP / CPU affinity
    [SYSCALL_GET_CPU_COUNT]    => syscall_get_cpu_count,    "get_cpu_count";
    [SYSCALL_GET_CURRENT_CPU]  => syscall_get_current_cpu,  "get_current_cpu";
    [SYSCALL_SET_CPU_AFFINITY] => syscall_set_cpu_affinity, "set_cpu_affinity";
    [SYSCALL_GET_CPU_AFFINITY] => syscall_get_cpu_affinity, "get_cpu_affinity";
};

pub fn syscall_lookup(sysno: u64) -> *const SyscallEntry {
    if (sysno as usize) >= SYSCALL_TABLE.len() {
        return ptr::null();
    }
    let entry = &SYSCALL_TABLE[sysno as usize];
    if entry.handler.is_none() {
        ptr::null()
    } else {
        entry as *const SyscallEntry
    }
}
