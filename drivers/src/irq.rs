use core::ffi::c_void;

use slopos_lib::kernel_services::driver_runtime::{
    DRIVER_LEGACY_IRQ_COM1, DRIVER_LEGACY_IRQ_KEYBOARD, DRIVER_LEGACY_IRQ_TIMER,
    irq_get_timer_ticks, irq_increment_keyboard_events, irq_increment_timer_ticks, irq_init,
    irq_register_handler, save_preempt_context, scheduler_timer_tick,
};
use slopos_lib::{InterruptFrame, cpu, klog_debug, klog_info};

use crate::{pic, pit, ps2};

extern "C" fn timer_irq_handler(_irq: u8, frame: *mut InterruptFrame, _ctx: *mut c_void) {
    irq_increment_timer_ticks();
    let tick = irq_get_timer_ticks();
    if tick <= 3 {
        klog_debug!("IRQ: Timer tick #{}", tick);
    }
    save_preempt_context(frame);
    scheduler_timer_tick();
}

extern "C" fn keyboard_irq_handler(_irq: u8, _frame: *mut InterruptFrame, _ctx: *mut c_void) {
    if ps2::has_data() && !ps2::is_mouse_data() {
        let scancode = ps2::read_data_nowait();
        irq_increment_keyboard_events();
        ps2::keyboard::handle_scancode(scancode);
    }
}

extern "C" fn com1_irq_handler(_irq: u8, _frame: *mut InterruptFrame, _ctx: *mut c_void) {
    crate::serial::serial_poll_receive(slopos_lib::ports::COM1.address());
    crate::tty::tty_notify_input_ready();
}

/// Bring up the 8259 PIC, program the PIT for the scheduler tick, register
/// legacy-IRQ handlers and unmask them, then enable interrupts.
pub fn init() {
    irq_init();

    pic::init();
    pit::init();
    ps2::init_controller();
    ps2::keyboard::init();
    ps2::enable_irqs();

    let _ = irq_register_handler(
        DRIVER_LEGACY_IRQ_TIMER,
        Some(timer_irq_handler),
        core::ptr::null_mut(),
        core::ptr::null(),
    );
    let _ = irq_register_handler(
        DRIVER_LEGACY_IRQ_KEYBOARD,
        Some(keyboard_irq_handler),
        core::ptr::null_mut(),
        core::ptr::null(),
    );
    let _ = irq_register_handler(
        DRIVER_LEGACY_IRQ_COM1,
        Some(com1_irq_handler),
        core::ptr::null_mut(),
        core::ptr::null(),
    );

    pic::unmask(DRIVER_LEGACY_IRQ_TIMER);
    pic::unmask(DRIVER_LEGACY_IRQ_KEYBOARD);
    pic::unmask(DRIVER_LEGACY_IRQ_COM1);

    klog_info!(
        "IRQ: legacy PIC/PIT dispatcher ready (timer {} Hz)",
        pit::TIMER_HZ
    );

    cpu::enable_interrupts();
}
