//! Process and kernel-stack configuration.

/// Fixed size of every kernel stack in bytes (16 KiB).
pub const KERNEL_STACK_SIZE: usize = 0x4000;

/// Capacity of the process table, boot task included.
pub const MAX_PROCESSES: usize = 8;
