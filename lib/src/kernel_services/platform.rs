use core::ffi::{c_char, c_int, c_void};

crate::define_service! {
    platform => PlatformServices {
        timer_ticks() -> u64;
        timer_frequency() -> u32;
        timer_poll_delay_ms(ms: u32);
        timer_sleep_ms(ms: u32);
        timer_enable_irq();
        timer_disable_irq();

        console_putc(c: u8);
        @no_wrapper console_puts(s: &[u8]);

        rng_next() -> u64;

        gdt_set_kernel_rsp0(rsp0: u64);

        @no_wrapper kernel_shutdown(reason: *const c_char) -> !;
        @no_wrapper kernel_reboot(reason: *const c_char) -> !;

        is_kernel_initialized() -> bool;
        idt_get_gate(vector: u8, entry: *mut c_void) -> c_int;

        irq_send_eoi(irq_line: u8);
        irq_mask_line(irq_line: u8);
        irq_unmask_line(irq_line: u8);
    }
}

#[inline(always)]
pub fn console_puts(s: &[u8]) {
    (platform_services().console_puts)(s)
}

#[inline(always)]
pub fn kernel_shutdown(reason: *const c_char) -> ! {
    (platform_services().kernel_shutdown)(reason)
}

#[inline(always)]
pub fn kernel_reboot(reason: *const c_char) -> ! {
    (platform_services().kernel_reboot)(reason)
}

#[inline(always)]
pub fn get_time_ms() -> u64 {
    let ticks = timer_ticks();
    let freq = timer_frequency();
    if freq == 0 {
        return 0;
    }
    (ticks * 1000) / freq as u64
}
