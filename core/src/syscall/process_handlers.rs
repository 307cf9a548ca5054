use core::ffi::c_void;

use crate::exec;
use crate::sched::{clear_scheduler_current_task, schedule, task_wait_for};
use crate::scheduler::task::{task_find_by_id, task_fork, task_iterate_active, task_terminate};
use crate::scheduler::task_struct::Task;
use crate::syscall::common::{
    SyscallDisposition, syscall_bounded_from_user, syscall_copy_user_str, syscall_return_err,
};
use crate::syscall::context::SyscallContext;
use slopos_abi::syscall::*;
use slopos_abi::task::{INVALID_TASK_ID, MAX_TASKS, TaskExitRecord, TaskExitReason, TaskFaultReason};
use slopos_lib::InterruptFrame;
use slopos_mm::user_copy::{copy_from_user, copy_to_user};
use slopos_mm::user_ptr::UserPtr;

use crate::task::task_get_exit_record;

struct ChildCollectContext {
    parent_id: u32,
    ids: [u32; MAX_TASKS],
    len: usize,
}

fn collect_child(task: *mut Task, context: *mut c_void) {
    if task.is_null() || context.is_null() {
        return;
    }
    let ctx = unsafe { &mut *(context as *mut ChildCollectContext) };
    if ctx.len >= ctx.ids.len() {
        return;
    }
    if unsafe { (*task).parent_task_id } == ctx.parent_id {
        ctx.ids[ctx.len] = unsafe { (*task).task_id };
        ctx.len += 1;
    }
}

fn collect_children(parent_id: u32) -> ([u32; MAX_TASKS], usize) {
    let mut collected = ChildCollectContext {
        parent_id,
        ids: [INVALID_TASK_ID; MAX_TASKS],
        len: 0,
    };
    task_iterate_active(
        Some(collect_child),
        (&mut collected as *mut ChildCollectContext).cast(),
    );
    (collected.ids, collected.len)
}

struct TgidCollectContext {
    tgid: u32,
    exclude_task_id: u32,
    ids: [u32; MAX_TASKS],
    len: usize,
}

fn collect_tgid_member(task: *mut Task, context: *mut c_void) {
    if task.is_null() || context.is_null() {
        return;
    }
    let ctx = unsafe { &mut *(context as *mut TgidCollectContext) };
    if ctx.len >= ctx.ids.len() {
        return;
    }
    let task_id = unsafe { (*task).task_id };
    if task_id == ctx.exclude_task_id {
        return;
    }
    if unsafe { (*task).tgid } == ctx.tgid {
        ctx.ids[ctx.len] = task_id;
        ctx.len += 1;
    }
}

define_syscall!(syscall_spawn_path(ctx, args) {
    let path_ptr = args.arg0 as *const u8;
    let path_len = args.arg1 as usize;
    let priority = args.arg2 as u8;
    let flags = args.arg3 as u16;

    if path_ptr.is_null() || path_len == 0 || path_len > exec::EXEC_MAX_PATH {
        return ctx.err();
    }

    let mut path_buf = [0u8; exec::EXEC_MAX_PATH];
    let copied_len = match syscall_bounded_from_user(
        &mut path_buf,
        path_ptr as u64,
        path_len as u64,
        exec::EXEC_MAX_PATH,
    ) {
        Ok(len) => len,
        Err(_) => {
            return ctx.err();
        }
    };

    match exec::spawn_program_with_attrs(&path_buf[..copied_len], priority, flags) {
        Ok(task_id) => ctx.ok(task_id as u64),
        Err(err) => ctx.ok(err as i32 as u64),
    }
});

define_syscall!(syscall_waitpid(ctx, args) {
    let target_id = args.arg0 as u32;
    let options = args.arg1 as u32;
    if target_id == 0 || target_id == INVALID_TASK_ID {
        return ctx.err();
    }

    let mut record = TaskExitRecord::empty();
    if task_get_exit_record(target_id, &mut record) == 0 {
        return ctx.ok(record.exit_code as u64);
    }

    if (options & 0x1) != 0 {
        return ctx.err_with(ERRNO_EAGAIN);
    }

    task_wait_for(target_id);

    let mut record2 = TaskExitRecord::empty();
    if task_get_exit_record(target_id, &mut record2) == 0 {
        ctx.ok(record2.exit_code as u64)
    } else {
        ctx.ok(0)
    }
});

// `pid <= 0` is treated as "wait for any child" against the caller's
// currently active children; it does not track process groups.
define_syscall!(syscall_wait4(ctx, args) requires(let task_id: task_id) {
    let raw_pid = args.arg0 as i64;
    let status_ptr = args.arg1;
    let options = args.arg2_u32();

    let target_id = if raw_pid > 0 {
        let candidate = raw_pid as u32;
        let task_ptr = task_find_by_id(candidate);
        if task_ptr.is_null() || unsafe { (*task_ptr).parent_task_id } != task_id {
            return ctx.err_with(ERRNO_ECHILD);
        }
        candidate
    } else {
        let (children, len) = collect_children(task_id);
        if len == 0 {
            return ctx.err_with(ERRNO_ECHILD);
        }
        children[0]
    };

    let mut record = TaskExitRecord::empty();
    if task_get_exit_record(target_id, &mut record) != 0 {
        if (options & 0x1) != 0 {
            return ctx.ok(0);
        }
        task_wait_for(target_id);
        if task_get_exit_record(target_id, &mut record) != 0 {
            return ctx.ok(0);
        }
    }

    if status_ptr != 0 {
        let status = (record.exit_code & 0xff) << 8;
        let user_ptr = try_or_err!(ctx, UserPtr::<u32>::try_new(status_ptr));
        try_or_err!(ctx, copy_to_user(user_ptr, &status));
    }

    ctx.ok(target_id as u64)
});

define_syscall!(syscall_terminate_task(ctx, args) {
    let target_id = args.arg0_u32();
    if target_id == 0 || target_id == INVALID_TASK_ID {
        return ctx.err();
    }

    let caller_id = ctx.task_id().unwrap_or(INVALID_TASK_ID);
    if target_id == caller_id {
        return ctx.err();
    }

    if task_terminate(target_id) != 0 {
        return ctx.err();
    }

    ctx.ok(0)
});

pub fn syscall_exec(task: *mut Task, frame: *mut InterruptFrame) -> SyscallDisposition {
    let Some(ctx) = SyscallContext::new(task, frame) else {
        return syscall_return_err(frame, ERRNO_EINVAL);
    };

    let process_id = match ctx.require_process_id() {
        Ok(id) => id,
        Err(d) => return d,
    };

    let args = ctx.args();
    let path_ptr = args.arg0;

    if path_ptr == 0 {
        return ctx.err();
    }

    let mut path_buf = [0u8; exec::EXEC_MAX_PATH];
    if syscall_copy_user_str(&mut path_buf, path_ptr).is_err() {
        return ctx.err();
    }

    let path_len = path_buf
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(path_buf.len());
    let path = &path_buf[..path_len];

    let mut entry_point = 0u64;
    let mut stack_ptr = 0u64;

    match exec::do_exec(
        process_id,
        path,
        None,
        None,
        &mut entry_point,
        &mut stack_ptr,
    ) {
        Ok(()) => {
            unsafe {
                (*frame).rip = entry_point;
                (*frame).rsp = stack_ptr;
                (*frame).rax = 0;
                (*frame).rdi = 0;
                (*frame).rsi = 0;
                (*frame).rdx = 0;
                (*frame).rcx = 0;
                (*frame).r8 = 0;
                (*frame).r9 = 0;
                (*frame).r10 = 0;
                (*frame).r11 = 0;
            }
            SyscallDisposition::Ok
        }
        Err(e) => {
            unsafe {
                (*frame).rax = e as i32 as u64;
            }
            SyscallDisposition::Ok
        }
    }
}

define_syscall!(syscall_get_cpu_count(ctx, args) {
    let _ = args;
    ctx.ok(slopos_lib::get_cpu_count() as u64)
});

define_syscall!(syscall_get_current_cpu(ctx, args) {
    let _ = args;
    ctx.ok(slopos_lib::get_current_cpu() as u64)
});

define_syscall!(syscall_set_cpu_affinity(ctx, args) requires(let task_id) {
    let target_or_zero = args.arg0_u32();
    let new_affinity = args.arg1_u32();
    let resolved_task_id = if target_or_zero == 0 { task_id } else { target_or_zero };

    let task_ptr = task_find_by_id(resolved_task_id);
    if task_ptr.is_null() {
        return ctx.err();
    }

    unsafe { (*task_ptr).cpu_affinity = new_affinity; }
    ctx.ok(0)
});

define_syscall!(syscall_get_cpu_affinity(ctx, args) requires(let task_id) {
    let target_or_zero = args.arg0_u32();
    let resolved_task_id = if target_or_zero == 0 { task_id } else { target_or_zero };

    let task_ptr = task_find_by_id(resolved_task_id);
    if task_ptr.is_null() {
        return ctx.err();
    }

    ctx.ok(unsafe { (*task_ptr).cpu_affinity } as u64)
});

define_syscall!(syscall_getpid(ctx, args) requires(let task_id) {
    let _ = args;
    ctx.ok(task_id as u64)
});

define_syscall!(syscall_getppid(ctx, args) {
    let _ = args;
    let task = some_or_err!(ctx, ctx.task_mut());
    ctx.ok(task.parent_task_id as u64)
});

define_syscall!(syscall_getpgid(ctx, args) requires(let task_id) {
    let target = args.arg0_u32();
    let resolved = if target == 0 { task_id } else { target };
    let task_ptr = task_find_by_id(resolved);
    if task_ptr.is_null() {
        return ctx.err();
    }
    ctx.ok(unsafe { (*task_ptr).pgid } as u64)
});

define_syscall!(syscall_setpgid(ctx, args) requires(let task_id) {
    let pid = args.arg0_u32();
    let pgid_arg = args.arg1_u32();
    let resolved_pid = if pid == 0 { task_id } else { pid };
    let resolved_pgid = if pgid_arg == 0 { resolved_pid } else { pgid_arg };

    let caller_ptr = task_find_by_id(task_id);
    let target_ptr = task_find_by_id(resolved_pid);
    if caller_ptr.is_null() || target_ptr.is_null() || resolved_pgid == 0 {
        return ctx.err();
    }

    let caller = unsafe { &*caller_ptr };
    let target = unsafe { &mut *target_ptr };
    if resolved_pid != task_id && target.parent_task_id != task_id {
        return ctx.err();
    }
    if target.sid != caller.sid {
        return ctx.err();
    }

    if resolved_pgid != resolved_pid {
        let leader_ptr = task_find_by_id(resolved_pgid);
        if leader_ptr.is_null() {
            return ctx.err();
        }
        let leader = unsafe { &*leader_ptr };
        if leader.sid != caller.sid {
            return ctx.err();
        }
    }

    target.pgid = resolved_pgid;
    ctx.ok(0)
});

define_syscall!(syscall_setsid(ctx, args) requires(let task_id) {
    let _ = args;
    let task_ptr = task_find_by_id(task_id);
    if task_ptr.is_null() {
        return ctx.err();
    }
    let task = unsafe { &mut *task_ptr };
    if task.pgid == task.task_id {
        return ctx.err();
    }
    task.sid = task.task_id;
    task.pgid = task.task_id;
    ctx.ok(task.sid as u64)
});

define_syscall!(syscall_getuid(ctx, args) {
    let _ = args;
    ctx.ok(0)
});

define_syscall!(syscall_getgid(ctx, args) {
    let _ = args;
    ctx.ok(0)
});

define_syscall!(syscall_geteuid(ctx, args) {
    let _ = args;
    ctx.ok(0)
});

define_syscall!(syscall_getegid(ctx, args) {
    let _ = args;
    ctx.ok(0)
});

pub fn syscall_arch_prctl(task: *mut Task, frame: *mut InterruptFrame) -> SyscallDisposition {
    let Some(ctx) = SyscallContext::new(task, frame) else {
        return syscall_return_err(frame, ERRNO_EINVAL);
    };

    let args = ctx.args();
    let cmd = args.arg0;
    let addr = args.arg1;

    match cmd {
        ARCH_SET_FS => {
            if addr >= slopos_mm::memory_layout_defs::USER_SPACE_END_VA && addr != 0 {
                return ctx.invalid_arg();
            }
            let t = some_or_err!(ctx, ctx.task_mut());
            t.fs_base = addr;
            slopos_lib::cpu::msr::write_msr(slopos_lib::cpu::msr::Msr::FS_BASE, addr);
            ctx.ok(0)
        }
        ARCH_GET_FS => {
            if addr == 0 {
                return ctx.invalid_arg();
            }
            let t = some_or_err!(ctx, ctx.task_mut());
            let fs_base_val = t.fs_base;
            let user_ptr = try_or_err!(ctx, UserPtr::<u64>::try_new(addr));
            try_or_err!(ctx, copy_to_user(user_ptr, &fs_base_val));
            ctx.ok(0)
        }
        _ => ctx.invalid_arg(),
    }
}

pub fn syscall_fork(task: *mut Task, frame: *mut InterruptFrame) -> SyscallDisposition {
    let Some(ctx) = SyscallContext::new(task, frame) else {
        return syscall_return_err(frame, ERRNO_EINVAL);
    };

    let child_id = task_fork(task);
    ctx.from_bool_value(
        child_id != slopos_abi::task::INVALID_TASK_ID,
        child_id as u64,
    )
}

// `vfork` does not suspend the parent or share the address space with the
// child the way Linux does; it behaves exactly like `fork`. Callers that
// rely on vfork's copy-avoidance or exec-wakeup semantics are out of scope.
pub fn syscall_vfork(task: *mut Task, frame: *mut InterruptFrame) -> SyscallDisposition {
    syscall_fork(task, frame)
}

pub fn syscall_exit_group(task: *mut Task, frame: *mut InterruptFrame) -> SyscallDisposition {
    let Some(ctx) = SyscallContext::new(task, frame) else {
        return syscall_return_err(frame, ERRNO_EINVAL);
    };

    let caller_id = match ctx.task_id() {
        Some(id) => id,
        None => return syscall_return_err(frame, ERRNO_EINVAL),
    };
    let code = ctx.args().arg0 as u32;

    let caller_tgid = match ctx.task_mut() {
        Some(t) => {
            t.exit_reason = TaskExitReason::Normal;
            t.fault_reason = TaskFaultReason::None;
            t.exit_code = code;
            t.tgid
        }
        None => return syscall_return_err(frame, ERRNO_EINVAL),
    };

    let mut members = TgidCollectContext {
        tgid: caller_tgid,
        exclude_task_id: caller_id,
        ids: [INVALID_TASK_ID; MAX_TASKS],
        len: 0,
    };
    task_iterate_active(
        Some(collect_tgid_member),
        (&mut members as *mut TgidCollectContext).cast(),
    );
    for id in &members.ids[..members.len] {
        task_terminate(*id);
    }

    task_terminate(caller_id);
    clear_scheduler_current_task();
    schedule();
    SyscallDisposition::NoReturn
}

define_syscall!(syscall_set_tid_address(ctx, args) requires(let task_id: task_id) {
    if let Some(t) = ctx.task_mut() {
        t.clear_child_tid = args.arg0;
    }
    ctx.ok(task_id as u64)
});

define_syscall!(syscall_set_thread_area(ctx, args) {
    let _ = args;
    // 32-bit TLS descriptor tables are not implemented on this 64-bit-only
    // kernel; userspace is expected to use `arch_prctl(ARCH_SET_FS, ...)`.
    ctx.err_with(ENOSYS_RETURN)
});

pub fn syscall_clone(task: *mut Task, frame: *mut InterruptFrame) -> SyscallDisposition {
    let Some(ctx) = SyscallContext::new(task, frame) else {
        return syscall_return_err(frame, ERRNO_EINVAL);
    };

    let args = ctx.args();
    let flags = args.arg0;
    let child_stack = args.arg1;
    let parent_tidptr = args.arg2;
    let child_tidptr = args.arg3;
    let tls = args.arg4;

    match crate::scheduler::task::task_clone(
        task,
        flags,
        child_stack,
        parent_tidptr,
        child_tidptr,
        tls,
    ) {
        Ok(child_id) => ctx.ok(child_id as u64),
        Err(errno) => syscall_return_err(frame, errno),
    }
}

pub fn syscall_futex(task: *mut Task, frame: *mut InterruptFrame) -> SyscallDisposition {
    let Some(ctx) = SyscallContext::new(task, frame) else {
        return syscall_return_err(frame, ERRNO_EINVAL);
    };

    let args = ctx.args();
    let uaddr = args.arg0;
    let op = args.arg1;
    let val = args.arg2_u32();
    let timeout = args.arg3;

    if (uaddr & 0x3) != 0 {
        return ctx.invalid_arg();
    }

    let user_word = match UserPtr::<u32>::try_new(uaddr) {
        Ok(p) => p,
        Err(_) => return ctx.bad_address(),
    };
    if copy_from_user(user_word).is_err() {
        return ctx.bad_address();
    }

    let rc = match op {
        FUTEX_WAIT => crate::scheduler::futex::futex_wait(uaddr, val, timeout),
        FUTEX_WAKE => crate::scheduler::futex::futex_wake(uaddr, val),
        _ => ENOSYS_RETURN as i64,
    };

    ctx.ok(rc as u64)
}
