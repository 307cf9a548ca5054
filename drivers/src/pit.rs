//! Legacy PIT (Intel 8254) channel 0 — periodic timer tick.
//!
//! Programmed in mode 2 (rate generator) at [`TIMER_HZ`] to drive IRQ0, the
//! sole source of preemption and the timer wheel. No APIC, no HPET: this
//! kernel assumes a single CPU and the PIT is the only timer it needs.

use slopos_lib::ports::{PIT_BASE_FREQUENCY_HZ, PIT_CHANNEL0, PIT_COMMAND};

/// Scheduler tick rate in Hz.
pub const TIMER_HZ: u32 = 100;

const DEFAULT_RELOAD: u32 = 0x10000;

const MODE_RATE_GENERATOR: u8 = 0x34; // channel 0, lobyte/hibyte, mode 2, binary

/// Program channel 0 to fire IRQ0 at [`TIMER_HZ`].
pub fn init() {
    let reload = (PIT_BASE_FREQUENCY_HZ / TIMER_HZ).min(DEFAULT_RELOAD);
    let reload = if reload == 0 { 1 } else { reload };

    unsafe {
        PIT_COMMAND.write(MODE_RATE_GENERATOR);
        PIT_CHANNEL0.write((reload & 0xFF) as u8);
        PIT_CHANNEL0.write(((reload >> 8) & 0xFF) as u8);
    }
}

/// Latch and read the PIT channel 0 down-counter.
///
/// Interrupts are briefly disabled to prevent a stale two-byte read.
fn pit_read_count() -> u16 {
    let flags = slopos_lib::cpu::save_flags_cli();
    let count = unsafe {
        PIT_COMMAND.write(0x00); // latch channel 0
        let low = PIT_CHANNEL0.read();
        let high = PIT_CHANNEL0.read();
        ((high as u16) << 8) | (low as u16)
    };
    slopos_lib::cpu::restore_flags(flags);
    count
}

/// Polled spin-wait for `ms` milliseconds using the PIT hardware counter.
///
/// Used only before `init()` has reprogrammed the channel (early boot
/// calibration delays); reads the free-running counter directly.
pub fn pit_poll_delay_ms(ms: u32) {
    if ms == 0 {
        return;
    }

    let ticks_needed = ((ms as u64) * (PIT_BASE_FREQUENCY_HZ as u64) / 1000) as u32;
    let mut last = pit_read_count();
    let mut elapsed: u32 = 0;

    while elapsed < ticks_needed {
        core::hint::spin_loop();

        let current = pit_read_count();
        if current <= last {
            elapsed = elapsed.saturating_add((last - current) as u32);
        } else {
            elapsed =
                elapsed.saturating_add(last as u32 + DEFAULT_RELOAD.saturating_sub(current as u32));
        }
        last = current;
    }
}
