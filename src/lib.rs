#![no_std]
#![cfg_attr(test, no_main)]
#![cfg_attr(feature = "strict", deny(warnings))]
#![feature(custom_test_frameworks)]
#![test_runner(crate::testing::test_runner)]
#![reexport_test_harness_main = "test_main"]

use x86_64::instructions::hlt;

pub mod constants;
pub mod devices;
pub mod logging;
pub mod processes;
pub mod segmentation;
pub mod testing;

pub use devices::serial;
pub use testing::{exit_qemu, QemuExitCode};

pub mod prelude {
    pub use crate::debug_print;
    pub use crate::debug_println;
    pub use crate::serial_print;
    pub use crate::serial_println;
}

#[macro_export]
macro_rules! debug_print {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        $crate::serial_print!($($arg)*);
    }
}

#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        $crate::serial_println!($($arg)*);
    }
}

pub fn idle_loop() -> ! {
    loop {
        hlt();
    }
}

#[cfg(test)]
#[used]
#[link_section = ".requests"]
static BASE_REVISION: limine::BaseRevision = limine::BaseRevision::new();

#[cfg(test)]
#[used]
#[link_section = ".requests_start_marker"]
static _START_MARKER: limine::request::RequestsStartMarker =
    limine::request::RequestsStartMarker::new();

#[cfg(test)]
#[used]
#[link_section = ".requests_end_marker"]
static _END_MARKER: limine::request::RequestsEndMarker =
    limine::request::RequestsEndMarker::new();

#[cfg(test)]
#[no_mangle]
extern "C" fn kmain() -> ! {
    assert!(BASE_REVISION.is_supported());

    serial::init();
    logging::init();
    test_main();
    idle_loop()
}

#[cfg(test)]
#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    testing::test_panic_handler(info)
}
