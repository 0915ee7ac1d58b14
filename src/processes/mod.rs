//! Task bookkeeping consumed by the segmentation subsystem.

pub mod process;
pub mod stack;

pub use process::{create_process, current, log_process_table, switch_to, Pcb, ProcessState};

use spin::Once;

static INIT: Once<()> = Once::new();

/// Registers the boot task. Idempotent.
pub fn init() {
    INIT.call_once(|| {
        process::register_boot_task();
    });
}
