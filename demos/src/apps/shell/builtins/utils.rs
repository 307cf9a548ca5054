//! Utility builtins: sleep, true, false, seq, yes, random.

use crate::runtime;
use crate::syscall::core as sys_core;

use super::super::NL;
use super::super::display::shell_write;
use super::super::jobs::{parse_u32_arg, write_u64};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_u64_arg(ptr: *const u8) -> Option<u64> {
    if ptr.is_null() {
        return None;
    }
    let len = runtime::u_strlen(ptr);
    if len == 0 {
        return None;
    }
    let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
    let mut v: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        v = v.checked_mul(10)?;
        v = v.checked_add((b - b'0') as u64)?;
    }
    Some(v)
}

// ─── Commands ───────────────────────────────────────────────────────────────

pub fn cmd_sleep(argc: i32, argv: &[*const u8]) -> i32 {
    if argc < 2 {
        shell_write(b"sleep: missing operand (milliseconds)\n");
        return 1;
    }
    let Some(ms) = parse_u32_arg(argv[1]) else {
        shell_write(b"sleep: invalid number\n");
        return 1;
    };
    if ms == 0 {
        return 0;
    }
    sys_core::sleep_ms(ms);
    0
}

pub fn cmd_true(_argc: i32, _argv: &[*const u8]) -> i32 {
    0
}

pub fn cmd_false(_argc: i32, _argv: &[*const u8]) -> i32 {
    1
}

pub fn cmd_seq(argc: i32, argv: &[*const u8]) -> i32 {
    if argc < 2 {
        shell_write(b"seq: missing operand\n");
        return 1;
    }

    let (start, end) = if argc >= 3 {
        let Some(s) = parse_u64_arg(argv[1]) else {
            shell_write(b"seq: invalid start\n");
            return 1;
        };
        let Some(e) = parse_u64_arg(argv[2]) else {
            shell_write(b"seq: invalid end\n");
            return 1;
        };
        (s, e)
    } else {
        let Some(e) = parse_u64_arg(argv[1]) else {
            shell_write(b"seq: invalid number\n");
            return 1;
        };
        (1u64, e)
    };

    if start > end {
        return 0;
    }

    let mut i = start;
    loop {
        write_u64(i);
        if !shell_write(NL) {
            break;
        }
        if i == end {
            break;
        }
        i += 1;
    }
    0
}

pub fn cmd_yes(argc: i32, argv: &[*const u8]) -> i32 {
    const MAX_ITERATIONS: u32 = 100_000;

    let text: &[u8] = if argc >= 2 && !argv[1].is_null() {
        let len = runtime::u_strlen(argv[1]);
        if len > 0 {
            unsafe { core::slice::from_raw_parts(argv[1], len) }
        } else {
            b"y"
        }
    } else {
        b"y"
    };

    for _ in 0..MAX_ITERATIONS {
        if !shell_write(text) || !shell_write(NL) {
            break;
        }
        sys_core::yield_now();
    }
    0
}

pub fn cmd_random(argc: i32, argv: &[*const u8]) -> i32 {
    let raw = sys_core::random_next();
    let value = if argc >= 2 {
        let Some(max) = parse_u32_arg(argv[1]) else {
            shell_write(b"random: invalid max\n");
            return 1;
        };
        if max == 0 {
            shell_write(b"random: max must be > 0\n");
            return 1;
        }
        raw % max
    } else {
        raw
    };
    write_u64(value as u64);
    shell_write(NL);
    0
}

