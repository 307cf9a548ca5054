use core::ffi::CStr;

use slopos_lib::klog::{self, KlogLevel};
use slopos_lib::{klog_debug, klog_info};
use slopos_tests::{
    TestRunSummary, tests_request_shutdown, tests_reset_panic_state, tests_run_all,
};

use crate::early_init::{boot_get_cmdline, boot_init_priority};
use crate::idt::{idt_init, idt_load};
use crate::ist_stacks::ist_stacks_init;

fn serial_note(msg: &str) {
    slopos_drivers::serial::write_line(msg);
}

fn boot_step_idt_setup_fn() {
    klog_debug!("Initializing IDT...");
    serial_note("boot: idt setup start");
    idt_init();
    ist_stacks_init();
    idt_load();
    serial_note("boot: idt setup done");
    klog_debug!("IDT initialized and loaded.");
}

fn boot_step_irq_setup_fn() {
    klog_debug!("Configuring legacy IRQ dispatcher...");
    slopos_drivers::irq::init();
    klog_debug!("IRQ dispatcher ready.");
}

use slopos_lib::testing::config_from_cmdline;

fn boot_step_interrupt_tests_fn() -> i32 {
    let cmdline = boot_get_cmdline();
    let cmdline_str = if cmdline.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(cmdline) }.to_str().ok()
    };
    let test_config = config_from_cmdline(cmdline_str);

    if !test_config.enabled {
        klog_debug!("INTERRUPT_TEST: Harness disabled");
        return 0;
    }

    klog_info!("INTERRUPT_TEST: Running orchestrated harness");

    if klog::is_enabled_level(KlogLevel::Debug) {
        klog_info!("INTERRUPT_TEST: Verbosity -> {}", test_config.verbosity);
        klog_info!("INTERRUPT_TEST: Timeout (ms) -> {}", test_config.timeout_ms);
    }

    tests_reset_panic_state();

    use crate::ffi_boundary::{__start_test_registry, __stop_test_registry};
    let registry_start: *const slopos_lib::testing::TestSuiteDesc =
        unsafe { &__start_test_registry };
    let registry_end: *const slopos_lib::testing::TestSuiteDesc = unsafe { &__stop_test_registry };

    let mut summary = TestRunSummary::default();

    let rc = tests_run_all(&test_config, &mut summary, registry_start, registry_end);

    if test_config.shutdown {
        klog_debug!("TESTS: Auto shutdown enabled after harness");
        tests_request_shutdown(summary.failed as i32);
    }

    if summary.failed > 0 {
        klog_info!("TESTS: Failures detected");
    } else {
        klog_info!("TESTS: Completed successfully");
    }

    rc
}

crate::boot_init!(
    BOOT_STEP_IDT_SETUP,
    drivers,
    b"idt\0",
    boot_step_idt_setup_fn,
    flags = boot_init_priority(30)
);
crate::boot_init!(
    BOOT_STEP_IRQ_SETUP,
    drivers,
    b"irq dispatcher\0",
    boot_step_irq_setup_fn,
    flags = boot_init_priority(60)
);
crate::boot_init!(
    BOOT_STEP_INTERRUPT_TESTS,
    drivers,
    b"interrupt tests\0",
    boot_step_interrupt_tests_fn,
    fallible,
    flags = boot_init_priority(90)
);
