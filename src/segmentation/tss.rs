//! Task State Block: the single shared TSS image.
//!
//! The hardware reads this structure on every ring-3 to ring-0
//! transition to find the privilege-0 stack. Exactly one instance
//! exists; it is populated once at boot and afterwards only the
//! privilege-stack field changes, once per task switch.
//!
//! The addressing mode is a tagged variant chosen at construction.
//! Storage is union-backed so the hardware-visible image always sits
//! at offset 0 of the 4096-aligned allocation; the tag lives behind
//! it. Page alignment is a hard precondition of the hardware and is
//! not validated at runtime.

use core::mem::size_of;

use crate::constants::gdt::{INITIAL_CS, INITIAL_DATA_SELECTORS, INITIAL_EFLAGS, INITIAL_SS0};

use super::AddressingMode;

/// i386 TSS image. Besides the ring-0 stack fields it carries a full
/// set of initial register and selector values used before any task
/// exists.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct TaskState32 {
    pub backlink: u32,
    pub esp0: u32,
    pub ss0: u32,
    pub esp1: u32,
    pub ss1: u32,
    pub esp2: u32,
    pub ss2: u32,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u32,
    pub cs: u32,
    pub ss: u32,
    pub ds: u32,
    pub fs: u32,
    pub gs: u32,
    pub ldt: u32,
    pub trace: u16,
    pub iomap_base: u16,
}

impl TaskState32 {
    pub const fn zeroed() -> Self {
        Self {
            backlink: 0,
            esp0: 0,
            ss0: 0,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trace: 0,
            iomap_base: 0,
        }
    }
}

/// x86-64 TSS image. Segmentation does not describe memory here, so
/// only the stack-pointer tables and the I/O-map base are meaningful.
#[derive(Clone, Copy)]
#[repr(C, packed(4))]
pub struct TaskState64 {
    _reserved0: u32,
    pub rsp0: u64,
    pub rsp1: u64,
    pub rsp2: u64,
    _reserved1: u64,
    pub ist: [u64; 7],
    _reserved2: u64,
    _reserved3: u16,
    pub iomap_base: u16,
}

impl TaskState64 {
    pub const fn zeroed() -> Self {
        Self {
            _reserved0: 0,
            rsp0: 0,
            rsp1: 0,
            rsp2: 0,
            _reserved1: 0,
            ist: [0; 7],
            _reserved2: 0,
            _reserved3: 0,
            iomap_base: 0,
        }
    }
}

#[repr(C)]
union TssImage {
    protected: TaskState32,
    long: TaskState64,
}

/// The shared Task State Block.
#[repr(C, align(4096))]
pub struct TaskStateBlock {
    image: TssImage,
    mode: AddressingMode,
}

impl TaskStateBlock {
    /// Zero-initialized block for the given addressing mode. The mode
    /// is fixed for the lifetime of the block.
    pub const fn new(mode: AddressingMode) -> Self {
        let image = match mode {
            AddressingMode::Protected => TssImage {
                protected: TaskState32::zeroed(),
            },
            AddressingMode::Long => TssImage {
                long: TaskState64::zeroed(),
            },
        };
        Self { image, mode }
    }

    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    /// Address the TSS descriptor points at. The image sits at offset
    /// 0 of the aligned allocation.
    pub fn base_address(&self) -> u64 {
        &self.image as *const TssImage as u64
    }

    /// Byte size of the active image, used as `limit + 1` by the TSS
    /// descriptor.
    pub fn size(&self) -> u32 {
        match self.mode {
            AddressingMode::Protected => size_of::<TaskState32>() as u32,
            AddressingMode::Long => size_of::<TaskState64>() as u32,
        }
    }

    /// Publishes a new privilege-0 stack top into the width-correct
    /// field (`esp0` or `rsp0`).
    pub fn set_privilege_stack(&mut self, top: u64) {
        match self.mode {
            AddressingMode::Protected => unsafe { self.image.protected.esp0 = top as u32 },
            AddressingMode::Long => unsafe { self.image.long.rsp0 = top },
        }
    }

    /// Reads back the published privilege-0 stack top.
    pub fn privilege_stack(&self) -> u64 {
        match self.mode {
            AddressingMode::Protected => unsafe { self.image.protected.esp0 as u64 },
            AddressingMode::Long => unsafe { self.image.long.rsp0 },
        }
    }

    /// Writes the protected-mode initial register state used before
    /// any task exists. These are raw register images, not
    /// descriptors, so they bypass the encoder on purpose; the
    /// selector values derive from the fixed descriptor order.
    ///
    /// No-op in long mode, where the hardware loads no initial
    /// register state from the TSS.
    pub fn write_initial_state(&mut self, esp0: u32) {
        if let AddressingMode::Protected = self.mode {
            let tss = unsafe { &mut self.image.protected };
            tss.eflags = INITIAL_EFLAGS;
            tss.ss0 = INITIAL_SS0 as u32;
            tss.esp0 = esp0;
            tss.cs = INITIAL_CS as u32;
            tss.ss = INITIAL_DATA_SELECTORS as u32;
            tss.ds = INITIAL_DATA_SELECTORS as u32;
            tss.es = INITIAL_DATA_SELECTORS as u32;
            tss.fs = INITIAL_DATA_SELECTORS as u32;
            tss.gs = INITIAL_DATA_SELECTORS as u32;
        }
    }

    /// Copy of the protected-mode image, for inspection.
    pub(crate) fn protected_image(&self) -> TaskState32 {
        debug_assert!(matches!(self.mode, AddressingMode::Protected));
        unsafe { self.image.protected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn images_match_the_architectural_size() {
        assert_eq!(size_of::<TaskState32>(), 104);
        assert_eq!(size_of::<TaskState64>(), 104);
    }

    #[test_case]
    fn block_is_page_aligned_with_image_at_offset_zero() {
        let block = TaskStateBlock::new(AddressingMode::Long);
        assert_eq!(block.base_address() % 4096, 0);
        assert_eq!(block.base_address(), &block as *const TaskStateBlock as u64);
    }

    #[test_case]
    fn privilege_stack_round_trips_in_long_mode() {
        let mut block = TaskStateBlock::new(AddressingMode::Long);
        block.set_privilege_stack(0xffff_8000_0010_3ff0);
        assert_eq!(block.privilege_stack(), 0xffff_8000_0010_3ff0);
    }

    #[test_case]
    fn privilege_stack_truncates_to_field_width_in_protected_mode() {
        let mut block = TaskStateBlock::new(AddressingMode::Protected);
        block.set_privilege_stack(0x0010_3ff0);
        assert_eq!(block.privilege_stack(), 0x0010_3ff0);
    }

    #[test_case]
    fn initial_state_sets_the_documented_registers() {
        let mut block = TaskStateBlock::new(AddressingMode::Protected);
        block.write_initial_state(0x9000);
        let image = block.protected_image();
        assert_eq!(image.eflags, INITIAL_EFLAGS);
        assert_eq!(image.ss0, INITIAL_SS0 as u32);
        assert_eq!(image.esp0, 0x9000);
        assert_eq!(image.cs, INITIAL_CS as u32);
        assert_eq!(image.ds, INITIAL_DATA_SELECTORS as u32);
        assert_eq!(image.gs, INITIAL_DATA_SELECTORS as u32);
    }
}
