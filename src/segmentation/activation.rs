//! Architecture-specific activation of a populated descriptor table.
//!
//! The portable segmentation core never issues a privileged
//! instruction itself; it hands the finished table pointer and
//! selectors to an implementation of this capability.

use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
use x86_64::instructions::tables::{lgdt, load_tss};
use x86_64::structures::DescriptorTablePointer;

use super::Selectors;

/// Loads the descriptor-table register and reloads the segment
/// selectors. This is the only point at which a populated table takes
/// hardware effect; prior table writes are inert.
pub trait ActivateDescriptorTable {
    /// # Safety
    ///
    /// `pointer` and `selectors` must describe a fully populated,
    /// statically allocated table whose layout matches the fixed
    /// selector ABI, and no trap may be in flight during the reload.
    unsafe fn activate(&self, pointer: &DescriptorTablePointer, selectors: &Selectors);
}

/// Boot-processor activation using the privileged table and segment
/// register instructions.
pub struct BootActivation;

impl ActivateDescriptorTable for BootActivation {
    unsafe fn activate(&self, pointer: &DescriptorTablePointer, selectors: &Selectors) {
        lgdt(pointer);

        CS::set_reg(selectors.kernel_code);
        SS::set_reg(selectors.kernel_data);
        DS::set_reg(selectors.kernel_data);
        ES::set_reg(selectors.kernel_data);

        load_tss(selectors.tss);
    }
}
