//! Console output: a thin wrapper over the tty syscalls.
//!
//! There is no framebuffer in this kernel, so the shell's console is just
//! the serial/VGA tty. The color constants are kept as markers so callers
//! can tag output semantically; they currently have no visual effect.

use core::cell::Cell;

use crate::syscall::fs;

use super::SyncUnsafeCell;

pub const COLOR_DEFAULT: u8 = 0;
pub const COLOR_PATH_BLUE: u8 = 1;
pub const COLOR_EXEC_GREEN: u8 = 2;
pub const COLOR_ERROR_RED: u8 = 3;
pub const COLOR_WARN_YELLOW: u8 = 4;
pub const COLOR_COMMENT_GRAY: u8 = 5;
pub const COLOR_PROMPT_ACCENT: u8 = 6;

pub struct DisplayState {
    pub enabled: Cell<bool>,
    pub follow: Cell<bool>,
}

// Safety: userland is single-threaded with no preemption during shell code.
unsafe impl Sync for DisplayState {}

pub static DISPLAY: DisplayState = DisplayState {
    enabled: Cell::new(false),
    follow: Cell::new(true),
};

static OUTPUT_FD: SyncUnsafeCell<i32> = SyncUnsafeCell::new(-1);

pub fn shell_console_init() {}

pub fn shell_console_clear() {
    // ANSI clear-screen + home-cursor; tty drivers that ignore escapes just
    // pass it through harmlessly.
    let _ = crate::syscall::tty::write(b"\x1b[2J\x1b[H");
}

pub fn shell_write(buf: &[u8]) {
    let redirected_fd = unsafe { *OUTPUT_FD.get() };
    if redirected_fd >= 0 {
        let _ = fs::write_slice(redirected_fd, buf);
        return;
    }
    let _ = crate::syscall::tty::write(buf);
}

pub fn shell_write_idx(buf: &[u8], _color_idx: u8) {
    shell_write(buf);
}

pub fn shell_console_write_colored(buf: &[u8], _color_idx: u8) {
    let _ = crate::syscall::tty::write(buf);
}

pub fn shell_set_output_fd(fd: i32) {
    unsafe {
        *OUTPUT_FD.get() = fd;
    }
}

pub fn shell_clear_output_fd() {
    unsafe {
        *OUTPUT_FD.get() = -1;
    }
}

pub fn shell_echo_char(c: u8) {
    let buf = [c];
    let _ = crate::syscall::tty::write(&buf);
}

pub fn shell_console_get_cursor() -> (i32, i32) {
    (0, 0)
}

pub fn shell_console_page_up() {}

pub fn shell_console_page_down() {}

pub fn shell_console_commit() {}

pub fn shell_console_follow_bottom() {}

pub fn shell_redraw_input(_line_row: i32, _prompt: &[u8], _input: &[u8], _cursor_pos: usize) {}
