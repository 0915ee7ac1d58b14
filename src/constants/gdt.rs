//! Global Descriptor Table layout and flag constants.
//!
//! The descriptor order below is a de facto ABI: a selector is
//! `index * 8`, and other kernel components (trap stubs, user-mode
//! setup) hardcode the resulting values. Reordering entries is a
//! breaking change.

/// Total number of descriptor slots. Slot 0 is the mandatory null
/// descriptor and is never written with a live segment.
pub const GDT_ENTRIES: usize = 7;

/// Null descriptor, required by the hardware.
pub const NULL_INDEX: usize = 0;
/// Ring-0 code segment.
pub const KERNEL_CODE_INDEX: usize = 1;
/// Ring-0 data segment.
pub const KERNEL_DATA_INDEX: usize = 2;
/// Ring-3 32-bit code segment, kept in both modes for compatibility
/// with narrower user programs.
pub const USER_CODE32_INDEX: usize = 3;
/// Ring-3 data segment.
pub const USER_DATA_INDEX: usize = 4;
/// Ring-3 64-bit code segment (long mode only).
pub const USER_CODE64_INDEX: usize = 5;
/// Task State Segment descriptor in protected mode, appended directly
/// after the ring-3 data segment.
pub const TSS_INDEX_PROTECTED: usize = 5;
/// Task State Segment descriptor in long mode.
pub const TSS_INDEX_LONG: usize = 6;

// Access byte bits.

/// Segment is present.
pub const ACCESS_PRESENT: u8 = 0x80;
/// Descriptor privilege level 0 (kernel).
pub const ACCESS_RING0: u8 = 0x00;
/// Descriptor privilege level 3 (user).
pub const ACCESS_RING3: u8 = 0x60;
/// Code or data segment (as opposed to a system descriptor).
pub const ACCESS_SEGMENT: u8 = 0x10;
/// Executable, readable code segment type.
pub const ACCESS_CODE: u8 = 0x0a;
/// Writable data segment type.
pub const ACCESS_DATA: u8 = 0x02;
/// Available 32-bit/64-bit TSS system descriptor type.
pub const ACCESS_TSS: u8 = 0x09;

// Granularity byte flag nibble. The low nibble of this byte carries
// limit bits 16-19 and must stay clear in these flags.

/// Limit counts 4 KiB units instead of bytes.
pub const FLAG_4K_GRANULARITY: u8 = 0x80;
/// 32-bit protected-mode segment.
pub const FLAG_32BIT: u8 = 0x40;
/// 64-bit long-mode code segment.
pub const FLAG_64BIT: u8 = 0x20;

// Protected-mode initial register state written into the Task State
// Block before any task exists. The selector values are derived
// strictly from the descriptor order above, not chosen independently:
// 0x10 is the ring-0 data selector (index 2), 0x13 the same selector
// with RPL 3, and 0x0b the ring-0 code selector (index 1) with RPL 3.

/// Initial EFLAGS image (interrupts enabled, IOPL 1).
pub const INITIAL_EFLAGS: u32 = 0x1202;
/// Initial ring-0 stack segment: kernel data.
pub const INITIAL_SS0: u16 = 0x10;
/// Initial code segment selector.
pub const INITIAL_CS: u16 = 0x0b;
/// Initial data/extra segment selectors (ss, ds, es, fs, gs).
pub const INITIAL_DATA_SELECTORS: u16 = 0x13;
