//! Segment descriptor encoding and the descriptor table.
//!
//! Entries are the raw 8-byte records the hardware reads. Inputs are
//! trusted boot-time constants: out-of-range base and limit values are
//! silently truncated to their field widths rather than rejected.

use core::mem::size_of;

use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

use crate::constants::gdt::GDT_ENTRIES;

/// One encoded descriptor-table entry.
///
/// Field order is fixed by the architecture: the base is split
/// low 16 / middle 8 / high 8, the 20-bit limit is split low 16 plus
/// the low nibble of the granularity byte, whose high nibble carries
/// the granularity flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Entry {
    limit_low: u16,
    base_low: u16,
    base_middle: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl Entry {
    /// The all-zero null descriptor.
    pub const NULL: Entry = Entry::new(0, 0, 0, 0);

    /// Packs base, limit, access and granularity flags into the entry
    /// layout. The low nibble of `granularity` is discarded; it is
    /// occupied by limit bits 16-19.
    pub const fn new(base: u32, limit: u32, access: u8, granularity: u8) -> Self {
        Self {
            limit_low: (limit & 0xffff) as u16,
            base_low: (base & 0xffff) as u16,
            base_middle: ((base >> 16) & 0xff) as u8,
            access,
            granularity: (((limit >> 16) & 0x0f) as u8) | (granularity & 0xf0),
            base_high: ((base >> 24) & 0xff) as u8,
        }
    }

    /// Recombines the split base address.
    pub(crate) fn base(&self) -> u32 {
        (self.base_low as u32) | ((self.base_middle as u32) << 16) | ((self.base_high as u32) << 24)
    }

    /// Recombines the 20-bit limit.
    pub(crate) fn limit(&self) -> u32 {
        (self.limit_low as u32) | (((self.granularity & 0x0f) as u32) << 16)
    }

    pub(crate) fn access(&self) -> u8 {
        self.access
    }

    /// The flag nibble of the granularity byte, with the limit bits
    /// masked off.
    pub(crate) fn granularity_flags(&self) -> u8 {
        self.granularity & 0xf0
    }

    pub(crate) fn is_null(&self) -> bool {
        *self == Entry::NULL
    }
}

/// Fixed-capacity, index-addressed descriptor table.
///
/// `index * 8` is the hardware selector for a slot, so the order in
/// which the installer fills the table is ABI.
#[repr(C, align(8))]
pub struct DescriptorTable {
    entries: [Entry; GDT_ENTRIES],
}

impl DescriptorTable {
    /// A table of null descriptors.
    pub const fn new() -> Self {
        Self {
            entries: [Entry::NULL; GDT_ENTRIES],
        }
    }

    /// Encodes and writes one slot. Idempotent for identical inputs.
    pub fn set_entry(&mut self, index: usize, base: u32, limit: u32, access: u8, granularity: u8) {
        self.entries[index] = Entry::new(base, limit, access, granularity);
    }

    pub(crate) fn entry(&self, index: usize) -> Entry {
        self.entries[index]
    }

    /// The pointer pair loaded into the table register: byte limit
    /// plus the table's base address.
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<[Entry; GDT_ENTRIES]>() - 1) as u16,
            base: VirtAddr::from_ptr(self.entries.as_ptr()),
        }
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn encode_decode_round_trip() {
        let entry = Entry::new(0x1234_5678, 0x000a_bcde, 0x9a, 0xc0);
        assert_eq!(entry.base(), 0x1234_5678);
        assert_eq!(entry.limit(), 0x000a_bcde);
        assert_eq!(entry.access(), 0x9a);
        assert_eq!(entry.granularity_flags(), 0xc0);
    }

    #[test_case]
    fn limit_truncates_to_twenty_bits() {
        let entry = Entry::new(0, 0xffff_ffff, 0x92, 0x00);
        assert_eq!(entry.limit(), 0x000f_ffff);
    }

    #[test_case]
    fn base_extremes_survive() {
        let entry = Entry::new(0xffff_ffff, 0, 0x92, 0x00);
        assert_eq!(entry.base(), 0xffff_ffff);

        let entry = Entry::new(0, 0, 0x92, 0x00);
        assert_eq!(entry.base(), 0);
    }

    #[test_case]
    fn flag_nibble_does_not_collide_with_limit() {
        // Low nibble of the caller's flag byte is dropped, high nibble
        // of the limit lands in its place.
        let entry = Entry::new(0, 0x000f_0000, 0x92, 0x2f);
        assert_eq!(entry.granularity_flags(), 0x20);
        assert_eq!(entry.limit(), 0x000f_0000);
    }

    #[test_case]
    fn null_entry_is_all_zero() {
        assert!(Entry::NULL.is_null());
        assert_eq!(Entry::NULL.base(), 0);
        assert_eq!(Entry::NULL.limit(), 0);
        assert_eq!(Entry::NULL.access(), 0);
    }

    #[test_case]
    fn writing_a_slot_is_idempotent() {
        let mut table = DescriptorTable::new();
        table.set_entry(1, 0, 0xffff_ffff, 0x9a, 0xc0);
        let first = table.entry(1);
        table.set_entry(1, 0, 0xffff_ffff, 0x9a, 0xc0);
        assert_eq!(table.entry(1), first);
    }

    #[test_case]
    fn pointer_limit_covers_every_entry() {
        let table = DescriptorTable::new();
        let pointer = table.pointer();
        let limit = pointer.limit;
        assert_eq!(limit as usize, GDT_ENTRIES * size_of::<Entry>() - 1);
    }

    #[test_case]
    fn entry_is_eight_bytes() {
        assert_eq!(size_of::<Entry>(), 8);
    }
}
