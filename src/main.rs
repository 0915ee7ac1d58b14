#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(ferrum::testing::test_runner)]
#![reexport_test_harness_main = "test_main"]

use limine::request::{RequestsEndMarker, RequestsStartMarker};
use limine::BaseRevision;

use ferrum::{idle_loop, logging, processes, segmentation, serial, serial_println};

#[used]
#[link_section = ".requests"]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[link_section = ".requests_start_marker"]
static _START_MARKER: RequestsStartMarker = RequestsStartMarker::new();

#[used]
#[link_section = ".requests_end_marker"]
static _END_MARKER: RequestsEndMarker = RequestsEndMarker::new();

#[no_mangle]
extern "C" fn kmain() -> ! {
    assert!(BASE_REVISION.is_supported());

    serial::init();
    logging::init();
    serial_println!("Booting ferrum...");

    // Segment tables first: nothing may trap or change rings before
    // the TSS is live.
    segmentation::init();
    processes::init();
    segmentation::set_kernel_stack();

    #[cfg(test)]
    test_main();

    let pid = processes::create_process();
    processes::switch_to(pid);
    log::info!(
        "task {} scheduled, kernel stack top {:#x}",
        pid,
        segmentation::get_kernel_stack()
    );
    processes::switch_to(0);
    processes::log_process_table();

    serial_println!("Entering idle loop");
    idle_loop();
}

#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    #[cfg(test)]
    ferrum::testing::test_panic_handler(info);
    #[cfg(not(test))]
    {
        serial_println!("Kernel panic: {}", info);
        idle_loop();
    }
}
