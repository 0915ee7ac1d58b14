//! Segmentation subsystem: GDT, TSS and the kernel-stack protocol.
//!
//! The descriptor table and the Task State Block are populated exactly
//! once at boot and never torn down. After installation the only
//! mutable state is the TSS privilege-0 stack field, which the
//! scheduler publishes through [`set_kernel_stack`] on every task
//! switch. A stale value there does not fail loudly: the next trap
//! simply runs on another task's kernel stack, so the write must
//! happen after the scheduling decision and before any trap can occur.

pub mod activation;
pub mod descriptor;
pub mod tss;

use spin::Mutex;
use x86_64::structures::DescriptorTablePointer;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use crate::constants::gdt::{
    ACCESS_CODE, ACCESS_DATA, ACCESS_PRESENT, ACCESS_RING0, ACCESS_RING3, ACCESS_SEGMENT,
    ACCESS_TSS, FLAG_32BIT, FLAG_4K_GRANULARITY, FLAG_64BIT, KERNEL_CODE_INDEX, KERNEL_DATA_INDEX,
    NULL_INDEX, TSS_INDEX_LONG, TSS_INDEX_PROTECTED, USER_CODE32_INDEX, USER_CODE64_INDEX,
    USER_DATA_INDEX,
};
use crate::constants::processes::KERNEL_STACK_SIZE;
use crate::processes;
use crate::processes::stack;

use activation::{ActivateDescriptorTable, BootActivation};
use descriptor::DescriptorTable;
use tss::TaskStateBlock;

/// Addressing mode the subsystem is configured for, chosen once at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// 32-bit protected mode; segmentation limits are live.
    Protected,
    /// 64-bit long mode; segmentation is flat and limits are ignored.
    Long,
}

/// Selectors assigned by the fixed descriptor order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selectors {
    pub kernel_code: SegmentSelector,
    pub kernel_data: SegmentSelector,
    pub user_code32: SegmentSelector,
    pub user_data: SegmentSelector,
    /// Only assigned in long mode.
    pub user_code64: Option<SegmentSelector>,
    pub tss: SegmentSelector,
}

impl Selectors {
    const fn empty() -> Self {
        Self {
            kernel_code: SegmentSelector::new(0, PrivilegeLevel::Ring0),
            kernel_data: SegmentSelector::new(0, PrivilegeLevel::Ring0),
            user_code32: SegmentSelector::new(0, PrivilegeLevel::Ring0),
            user_data: SegmentSelector::new(0, PrivilegeLevel::Ring0),
            user_code64: None,
            tss: SegmentSelector::new(0, PrivilegeLevel::Ring0),
        }
    }
}

/// Owner of the descriptor table and the Task State Block.
pub struct Segmentation {
    table: DescriptorTable,
    task_state: TaskStateBlock,
    selectors: Selectors,
    installed: bool,
}

/// The process-wide subsystem instance. Statically allocated so the
/// table and TSS addresses handed to the hardware never move.
static SEGMENTATION: Mutex<Segmentation> = Mutex::new(Segmentation::new(AddressingMode::Long));

impl Segmentation {
    pub const fn new(mode: AddressingMode) -> Self {
        Self {
            table: DescriptorTable::new(),
            task_state: TaskStateBlock::new(mode),
            selectors: Selectors::empty(),
            installed: false,
        }
    }

    pub fn mode(&self) -> AddressingMode {
        self.task_state.mode()
    }

    /// Writes the full descriptor layout and the Task State Block
    /// defaults. Idempotent; takes hardware effect only through
    /// [`Segmentation::install`].
    fn populate(&mut self) {
        let mode = self.mode();
        let (gran_code, gran_data, limit) = match mode {
            AddressingMode::Protected => (
                FLAG_32BIT | FLAG_4K_GRANULARITY,
                FLAG_32BIT | FLAG_4K_GRANULARITY,
                0xffff_ffff,
            ),
            AddressingMode::Long => (FLAG_64BIT, 0, 0),
        };

        self.table.set_entry(NULL_INDEX, 0, 0, 0, 0);
        self.table.set_entry(
            KERNEL_CODE_INDEX,
            0,
            limit,
            ACCESS_RING0 | ACCESS_SEGMENT | ACCESS_CODE | ACCESS_PRESENT,
            gran_code,
        );
        self.table.set_entry(
            KERNEL_DATA_INDEX,
            0,
            limit,
            ACCESS_RING0 | ACCESS_SEGMENT | ACCESS_DATA | ACCESS_PRESENT,
            gran_data,
        );
        // 32-bit user code keeps its full 4 GiB flat segment in both
        // modes so narrower user programs stay loadable.
        self.table.set_entry(
            USER_CODE32_INDEX,
            0,
            0xffff_ffff,
            ACCESS_RING3 | ACCESS_SEGMENT | ACCESS_CODE | ACCESS_PRESENT,
            FLAG_32BIT | FLAG_4K_GRANULARITY,
        );
        self.table.set_entry(
            USER_DATA_INDEX,
            0,
            limit,
            ACCESS_RING3 | ACCESS_SEGMENT | ACCESS_DATA | ACCESS_PRESENT,
            gran_data,
        );

        let boot_top = stack::boot_stack_top() - 16;
        let tss_index = match mode {
            AddressingMode::Long => {
                self.table.set_entry(
                    USER_CODE64_INDEX,
                    0,
                    limit,
                    ACCESS_RING3 | ACCESS_SEGMENT | ACCESS_CODE | ACCESS_PRESENT,
                    gran_code,
                );
                self.task_state.set_privilege_stack(boot_top);
                TSS_INDEX_LONG
            }
            AddressingMode::Protected => {
                // Raw initial-register state, not descriptors, so it
                // bypasses the encoder.
                self.task_state.write_initial_state(boot_top as u32);
                TSS_INDEX_PROTECTED
            }
        };
        self.table.set_entry(
            tss_index,
            self.task_state.base_address() as u32,
            self.task_state.size() - 1,
            ACCESS_PRESENT | ACCESS_TSS | ACCESS_RING0,
            gran_data,
        );

        let user_code64 = match mode {
            AddressingMode::Long => Some(SegmentSelector::new(
                USER_CODE64_INDEX as u16,
                PrivilegeLevel::Ring3,
            )),
            AddressingMode::Protected => None,
        };
        self.selectors = Selectors {
            kernel_code: SegmentSelector::new(KERNEL_CODE_INDEX as u16, PrivilegeLevel::Ring0),
            kernel_data: SegmentSelector::new(KERNEL_DATA_INDEX as u16, PrivilegeLevel::Ring0),
            user_code32: SegmentSelector::new(USER_CODE32_INDEX as u16, PrivilegeLevel::Ring3),
            user_data: SegmentSelector::new(USER_DATA_INDEX as u16, PrivilegeLevel::Ring3),
            user_code64,
            tss: SegmentSelector::new(tss_index as u16, PrivilegeLevel::Ring0),
        };
    }

    /// Populates the table and hands it to the activation capability.
    /// Must run exactly once, before any ring transition or task
    /// switch.
    ///
    /// # Safety
    ///
    /// The caller must guarantee the activation target matches the
    /// configured addressing mode and that no trap can occur during
    /// the selector reload.
    pub unsafe fn install(&mut self, activation: &dyn ActivateDescriptorTable) {
        assert!(!self.installed, "segmentation tables already installed");
        self.populate();
        activation.activate(&self.table.pointer(), &self.selectors);
        self.installed = true;
    }

    pub fn selectors(&self) -> Selectors {
        self.selectors
    }

    pub fn table_pointer(&self) -> DescriptorTablePointer {
        self.table.pointer()
    }
}

/// Computes a task's privilege-0 stack top. 16 bytes are reserved so
/// the resulting pointer stays 16-byte aligned for call frames.
fn kernel_stack_top(stack_base: u64) -> u64 {
    stack_base + KERNEL_STACK_SIZE as u64 - 16
}

/// Builds and activates the boot descriptor table. Invoked exactly
/// once, early in boot.
pub fn init() {
    let mut seg = SEGMENTATION.lock();
    unsafe {
        seg.install(&BootActivation);
    }
    let selectors = seg.selectors();
    drop(seg);

    log::info!(
        "GDT installed: kernel code {:#x}, kernel data {:#x}, tss {:#x}",
        selectors.kernel_code.0,
        selectors.kernel_data.0,
        selectors.tss.0
    );
}

/// Publishes the current task's kernel stack top into the TSS. The
/// scheduler calls this after every scheduling decision, before
/// control can re-enter user mode or take a trap.
pub fn set_kernel_stack() {
    let task = processes::current();
    let top = kernel_stack_top(task.stack_base());
    SEGMENTATION.lock().task_state.set_privilege_stack(top);
}

/// The current task's kernel stack top, computed without touching the
/// shared TSS.
pub fn get_kernel_stack() -> u64 {
    kernel_stack_top(processes::current().stack_base())
}

/// Selectors assigned at installation.
pub fn selectors() -> Selectors {
    SEGMENTATION.lock().selectors()
}

/// The stack top most recently published into the shared TSS field.
pub(crate) fn published_kernel_stack() -> u64 {
    SEGMENTATION.lock().task_state.privilege_stack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::gdt::{GDT_ENTRIES, INITIAL_CS, INITIAL_DATA_SELECTORS, INITIAL_SS0};

    struct NoopActivation;

    impl ActivateDescriptorTable for NoopActivation {
        unsafe fn activate(&self, _pointer: &DescriptorTablePointer, _selectors: &Selectors) {}
    }

    #[test_case]
    fn null_descriptor_stays_zero() {
        let mut seg = Segmentation::new(AddressingMode::Long);
        seg.populate();
        assert!(seg.table.entry(NULL_INDEX).is_null());
    }

    #[test_case]
    fn table_pointer_limit_matches_capacity() {
        let mut seg = Segmentation::new(AddressingMode::Long);
        seg.populate();
        let limit = seg.table_pointer().limit;
        assert_eq!(limit as usize, GDT_ENTRIES * 8 - 1);
    }

    #[test_case]
    fn layout_is_stable_across_repeated_population() {
        for mode in [AddressingMode::Protected, AddressingMode::Long] {
            let mut seg = Segmentation::new(mode);
            seg.populate();
            let first: [descriptor::Entry; GDT_ENTRIES] =
                core::array::from_fn(|i| seg.table.entry(i));
            let selectors = seg.selectors();
            seg.populate();
            for (i, entry) in first.iter().enumerate() {
                assert_eq!(seg.table.entry(i), *entry);
            }
            assert_eq!(seg.selectors(), selectors);
        }
    }

    #[test_case]
    fn selector_values_follow_the_descriptor_order() {
        let mut seg = Segmentation::new(AddressingMode::Long);
        seg.populate();
        let selectors = seg.selectors();
        assert_eq!(selectors.kernel_code.0, 0x08);
        assert_eq!(selectors.kernel_data.0, 0x10);
        assert_eq!(selectors.user_code32.0, 0x18 | 3);
        assert_eq!(selectors.user_data.0, 0x20 | 3);
        assert_eq!(selectors.user_code64.unwrap().0, 0x28 | 3);
        assert_eq!(selectors.tss.0, 0x30);
    }

    #[test_case]
    fn protected_mode_defaults_follow_the_descriptor_order() {
        let mut seg = Segmentation::new(AddressingMode::Protected);
        seg.populate();
        let image = seg.task_state.protected_image();
        assert_eq!(image.ss0, INITIAL_SS0 as u32);
        assert_eq!(image.cs, INITIAL_CS as u32);
        assert_eq!(image.ss, INITIAL_DATA_SELECTORS as u32);
        assert_eq!(image.ds, INITIAL_DATA_SELECTORS as u32);
        assert_eq!(image.es, INITIAL_DATA_SELECTORS as u32);
        assert_eq!(image.fs, INITIAL_DATA_SELECTORS as u32);
        assert_eq!(image.gs, INITIAL_DATA_SELECTORS as u32);
        assert_eq!(seg.selectors().tss.0, (TSS_INDEX_PROTECTED * 8) as u16);
    }

    #[test_case]
    fn tss_descriptor_references_the_task_state_block() {
        let mut seg = Segmentation::new(AddressingMode::Long);
        seg.populate();
        let entry = seg.table.entry(TSS_INDEX_LONG);
        assert_eq!(entry.base(), seg.task_state.base_address() as u32);
        assert_eq!(entry.limit(), seg.task_state.size() - 1);
        assert_eq!(entry.access(), ACCESS_PRESENT | ACCESS_TSS | ACCESS_RING0);
    }

    #[test_case]
    fn boot_default_stack_is_published_and_aligned() {
        let mut seg = Segmentation::new(AddressingMode::Long);
        seg.populate();
        assert_eq!(seg.task_state.privilege_stack(), stack::boot_stack_top() - 16);
        assert_eq!(seg.task_state.privilege_stack() % 16, 0);
    }

    #[test_case]
    fn install_marks_the_subsystem_installed() {
        let mut seg = Segmentation::new(AddressingMode::Long);
        unsafe {
            seg.install(&NoopActivation);
        }
        assert!(seg.installed);
    }

    #[test_case]
    fn kernel_stack_top_reserves_sixteen_bytes() {
        assert_eq!(kernel_stack_top(0x0010_0000), 0x0010_3ff0);
        assert_eq!(kernel_stack_top(0x0010_0000) % 16, 0);
    }

    #[test_case]
    fn set_kernel_stack_publishes_the_current_task_stack() {
        crate::processes::init();
        set_kernel_stack();
        let expected = get_kernel_stack();
        assert_eq!(published_kernel_stack(), expected);
        assert_eq!(expected % 16, 0);
    }
}
