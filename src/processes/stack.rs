//! Statically allocated kernel stacks.
//!
//! The scheduler side owns all task stack memory; the segmentation
//! core only ever reads base addresses from here. Stacks are 16-byte
//! aligned and grow downward.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::constants::processes::{KERNEL_STACK_SIZE, MAX_PROCESSES};

#[repr(align(16))]
pub struct KernelStack([u8; KERNEL_STACK_SIZE]);

/// Stack the kernel boots on, used for the privilege-0 stack default
/// before any task exists and owned by the boot task afterwards.
static mut BOOT_STACK: KernelStack = KernelStack([0; KERNEL_STACK_SIZE]);

/// Fixed pool handed out to created tasks, one slot per process-table
/// slot past the boot task.
static mut TASK_STACKS: [KernelStack; MAX_PROCESSES - 1] =
    [const { KernelStack([0; KERNEL_STACK_SIZE]) }; MAX_PROCESSES - 1];

static NEXT_STACK: AtomicUsize = AtomicUsize::new(0);

pub fn boot_stack_base() -> u64 {
    &raw const BOOT_STACK as u64
}

/// Highest address of the boot stack.
pub fn boot_stack_top() -> u64 {
    boot_stack_base() + KERNEL_STACK_SIZE as u64
}

/// Hands out the base address of the next unused pool stack. Panics
/// when the pool is exhausted; the process table has the same
/// capacity, so this fires only on scheduler misuse.
pub(super) fn allocate_stack() -> u64 {
    let slot = NEXT_STACK.fetch_add(1, Ordering::SeqCst);
    assert!(slot < MAX_PROCESSES - 1, "out of kernel stacks");
    unsafe { (&raw const TASK_STACKS as *const KernelStack).add(slot) as u64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn boot_stack_is_aligned() {
        assert_eq!(boot_stack_base() % 16, 0);
        assert_eq!(boot_stack_top() % 16, 0);
    }

    #[test_case]
    fn pool_stacks_are_distinct_and_aligned() {
        let first = allocate_stack();
        let second = allocate_stack();
        assert_eq!(first % 16, 0);
        assert_eq!(second % 16, 0);
        assert_eq!(second - first, KERNEL_STACK_SIZE as u64);
    }
}
