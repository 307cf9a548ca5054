use core::ffi::{c_char, c_int, c_void};

use crate::{early_init, gdt, idt, shutdown};
use slopos_drivers::{pic, pit, random, serial};
use slopos_lib::kernel_services::platform::{PlatformServices, register_platform_services};

fn kernel_shutdown_fn(reason: *const c_char) -> ! {
    shutdown::kernel_shutdown(reason)
}

fn kernel_reboot_fn(reason: *const c_char) -> ! {
    shutdown::kernel_reboot(reason)
}

fn is_kernel_initialized_fn() -> bool {
    early_init::is_kernel_initialized() != 0
}

fn idt_get_gate_fn(vector: u8, entry: *mut c_void) -> c_int {
    idt::idt_get_gate_opaque(vector, entry)
}

static PLATFORM_SERVICES: PlatformServices = PlatformServices {
    timer_ticks: || slopos_core::irq::get_timer_ticks(),
    timer_frequency: || pit::TIMER_HZ,
    timer_poll_delay_ms: |ms| pit::pit_poll_delay_ms(ms),
    timer_sleep_ms: |ms| pit::pit_poll_delay_ms(ms),
    timer_enable_irq: || pic::unmask(slopos_core::irq::LEGACY_IRQ_TIMER),
    timer_disable_irq: || pic::mask(slopos_core::irq::LEGACY_IRQ_TIMER),
    console_putc: |c| serial::serial_putc_com1(c),
    console_puts: |s| {
        for &c in s {
            serial::serial_putc_com1(c);
        }
    },
    rng_next: || random::random_next(),
    gdt_set_kernel_rsp0: gdt::gdt_set_kernel_rsp0,
    kernel_shutdown: kernel_shutdown_fn,
    kernel_reboot: kernel_reboot_fn,
    is_kernel_initialized: is_kernel_initialized_fn,
    idt_get_gate: idt_get_gate_fn,
    irq_send_eoi: |irq_line| pic::eoi(irq_line),
    irq_mask_line: |irq_line| pic::mask(irq_line),
    irq_unmask_line: |irq_line| pic::unmask(irq_line),
};

pub fn register_boot_services() {
    register_platform_services(&PLATFORM_SERVICES);
}
