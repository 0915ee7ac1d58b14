//! System-wide constants and hardware-specific values.

pub mod gdt;
pub mod processes;
