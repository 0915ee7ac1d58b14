//! Minimal process records: enough scheduler state for the
//! segmentation core to ask "whose kernel stack is live right now?".

use arrayvec::ArrayVec;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use lazy_static::lazy_static;
use spin::Mutex;

use crate::constants::processes::{KERNEL_STACK_SIZE, MAX_PROCESSES};
use crate::segmentation;

use super::stack;

// process counter must be thread-safe
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

/// Index of the running task in the process table.
static CURRENT_SLOT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
}

/// Process control block. The stack region behind `stack_base` is
/// owned by [`super::stack`]; consumers only read the address.
#[derive(Debug, Clone, Copy)]
pub struct Pcb {
    pub pid: u32,
    pub state: ProcessState,
    stack_base: u64,
}

impl Pcb {
    pub fn stack_base(&self) -> u64 {
        self.stack_base
    }

    pub fn stack_size(&self) -> usize {
        KERNEL_STACK_SIZE
    }
}

lazy_static! {
    static ref PROCESS_TABLE: Mutex<ArrayVec<Pcb, MAX_PROCESSES>> = Mutex::new(ArrayVec::new());
}

/// Registers the boot task (pid 0) on the boot stack. The boot task
/// is current until the first switch.
pub(super) fn register_boot_task() {
    let mut table = PROCESS_TABLE.lock();
    assert!(table.is_empty(), "boot task already registered");
    table.push(Pcb {
        pid: 0,
        state: ProcessState::Running,
        stack_base: stack::boot_stack_base(),
    });
}

/// Creates a new task with its own kernel stack and returns its pid.
pub fn create_process() -> u32 {
    let pid = NEXT_PID.fetch_add(1, Ordering::SeqCst);
    let stack_base = stack::allocate_stack();

    let mut table = PROCESS_TABLE.lock();
    assert!(!table.is_full(), "process table full");
    table.push(Pcb {
        pid,
        state: ProcessState::Ready,
        stack_base,
    });

    log::debug!("created process {} with stack base {:#x}", pid, stack_base);
    pid
}

/// Copy of the currently scheduled task's record.
pub fn current() -> Pcb {
    let table = PROCESS_TABLE.lock();
    table[CURRENT_SLOT.load(Ordering::SeqCst)]
}

/// Makes `pid` current and publishes its kernel stack into the TSS.
/// The publish happens after the table lock is released but before
/// this function returns; no trap may be taken in between, which on
/// this single-context kernel means the caller keeps interrupts
/// disabled across the switch.
pub fn switch_to(pid: u32) {
    {
        let mut table = PROCESS_TABLE.lock();
        let old = CURRENT_SLOT.load(Ordering::SeqCst);
        let new = table
            .iter()
            .position(|p| p.pid == pid)
            .expect("switch_to: unknown pid");
        table[old].state = ProcessState::Ready;
        table[new].state = ProcessState::Running;
        CURRENT_SLOT.store(new, Ordering::SeqCst);
    }
    // The hardware reads this field on the next ring transition.
    segmentation::set_kernel_stack();
}

pub fn log_process_table() {
    let table = PROCESS_TABLE.lock();
    for pcb in table.iter() {
        log::debug!(
            "pid {}: {:?}, stack base {:#x}",
            pcb.pid,
            pcb.state,
            pcb.stack_base
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::{get_kernel_stack, published_kernel_stack};

    #[test_case]
    fn boot_task_runs_on_the_boot_stack() {
        super::super::init();
        let table = PROCESS_TABLE.lock();
        let boot = table[0];
        drop(table);
        assert_eq!(boot.pid, 0);
        assert_eq!(boot.stack_base(), stack::boot_stack_base());
        assert_eq!(boot.stack_size(), KERNEL_STACK_SIZE);
    }

    #[test_case]
    fn switch_publishes_the_new_kernel_stack() {
        super::super::init();
        let pid = create_process();
        let base = {
            let table = PROCESS_TABLE.lock();
            let pcb = table.iter().find(|p| p.pid == pid).copied().unwrap();
            pcb.stack_base()
        };

        switch_to(pid);
        assert_eq!(current().pid, pid);
        assert_eq!(
            published_kernel_stack(),
            base + KERNEL_STACK_SIZE as u64 - 16
        );
        assert_eq!(published_kernel_stack() % 16, 0);
        assert_eq!(get_kernel_stack(), published_kernel_stack());

        switch_to(0);
        assert_eq!(current().pid, 0);
    }
}
