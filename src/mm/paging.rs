//! Page directory and tables.
//!
//! One directory plus two tables cover everything the kernel maps:
//!
//! - PD[0] -> low 4 MiB table: identity entries (writable, not present)
//!   except the VGA frame and the three terminal backing pages;
//! - PD[1] -> the kernel image as one supervisor 4 MiB page;
//! - PD[32] -> the scheduled process's 4 MiB image slot (remapped at every
//!   `execute` and every tick);
//! - PD[33..=35] -> the vidmap table, exposing video memory to ring 3 at the
//!   per-terminal `vidmap` addresses.
//!
//! Entry manipulation is ordinary data code and is unit tested on the host;
//! only the CR0/CR3/CR4 writes live in [`crate::arch::x86::paging`].

use bitflags::bitflags;
use spin::Mutex;

use super::{KERNEL_BASE, MB4, TERMINAL_VIDEO, VIDEO_MEMORY};
use crate::arch;

bitflags! {
    /// Bits shared by directory and table entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT = 1;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const PAGE_SIZE_4MB = 1 << 7;
    }
}

/// Kernel-only 4 KiB mapping.
const KERNEL_PAGE: u32 = PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();
/// User 4 MiB task mapping.
const USER_LARGE_PAGE: u32 = PageFlags::PRESENT.bits()
    | PageFlags::WRITABLE.bits()
    | PageFlags::USER.bits()
    | PageFlags::PAGE_SIZE_4MB.bits();
/// User 4 KiB mapping (vidmap).
const USER_PAGE: u32 =
    PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits() | PageFlags::USER.bits();

/// One 4 KiB-aligned table of 1024 entries.
#[repr(C, align(4096))]
pub struct PageTable(pub [u32; 1024]);

impl PageTable {
    pub const fn empty() -> Self {
        Self([0; 1024])
    }
}

/// The kernel's single address-space layout.
pub struct AddressSpace {
    directory: PageTable,
    low_table: PageTable,
    vidmap_table: PageTable,
}

impl AddressSpace {
    pub const fn new() -> Self {
        Self {
            directory: PageTable::empty(),
            low_table: PageTable::empty(),
            vidmap_table: PageTable::empty(),
        }
    }

    /// Build the static boot mappings described in the module docs.
    pub fn init_static_mappings(&mut self) {
        for i in 0..1024 {
            // Writable but not present until something claims the slot.
            self.directory.0[i] = PageFlags::WRITABLE.bits();
            self.low_table.0[i] = ((i as u32) << 12) | PageFlags::WRITABLE.bits();
        }

        self.directory.0[0] = self.low_table_address() | KERNEL_PAGE;
        self.directory.0[1] =
            KERNEL_BASE | KERNEL_PAGE | PageFlags::PAGE_SIZE_4MB.bits();

        self.low_table.0[(VIDEO_MEMORY >> 12) as usize] = VIDEO_MEMORY | KERNEL_PAGE;
        for backing in TERMINAL_VIDEO {
            self.low_table.0[(backing >> 12) as usize] = backing | KERNEL_PAGE;
        }
    }

    /// Map the 4 MiB user window at `virt` onto the image slot at `phys`.
    pub fn map_task(&mut self, virt: u32, phys: u32) {
        self.directory.0[(virt / MB4) as usize] = phys | USER_LARGE_PAGE;
    }

    /// Expose the 4 KiB video page at `phys` to ring 3 at `virt`.
    pub fn map_vidmem(&mut self, virt: u32, phys: u32) {
        self.directory.0[(virt / MB4) as usize] = self.vidmap_table_address() | USER_PAGE;
        self.vidmap_table.0[0] = phys | USER_PAGE;
    }

    /// Retarget one low-table 4 KiB slot (terminal switch aliasing).
    /// Pages outside the low 4 MiB have no slot here and are ignored.
    pub fn point_page_at(&mut self, page_index: usize, phys: u32) {
        if let Some(entry) = self.low_table.0.get_mut(page_index) {
            *entry = phys | KERNEL_PAGE;
        }
    }

    pub fn directory_address(&self) -> u32 {
        self.directory.0.as_ptr() as usize as u32
    }

    fn low_table_address(&self) -> u32 {
        self.low_table.0.as_ptr() as usize as u32
    }

    fn vidmap_table_address(&self) -> u32 {
        self.vidmap_table.0.as_ptr() as usize as u32
    }

    pub fn directory_entry(&self, index: usize) -> u32 {
        self.directory.0[index]
    }

    pub fn low_table_entry(&self, index: usize) -> u32 {
        self.low_table.0[index]
    }

    pub fn vidmap_entry(&self, index: usize) -> u32 {
        self.vidmap_table.0[index]
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// The one live address space. Mutated only inside interrupt-disabled
/// windows (boot, syscall handlers, the scheduler tick).
static ADDRESS_SPACE: Mutex<AddressSpace> = Mutex::new(AddressSpace::new());

/// Build the static mappings and turn paging on.
pub fn init() {
    let directory = {
        let mut space = ADDRESS_SPACE.lock();
        space.init_static_mappings();
        space.directory_address()
    };
    arch::enable_paging(directory);
    log::info!(target: "mm", "paging enabled, directory at {:#x}", directory);
}

/// Point the user window at a process image slot and flush the TLB.
pub fn map_task(virt: u32, phys: u32) {
    crate::arch::interrupts::without(|| {
        ADDRESS_SPACE.lock().map_task(virt, phys);
        arch::flush_tlb();
    });
}

/// Point a user vidmap address at a physical video page and flush the TLB.
pub fn map_vidmem(virt: u32, phys: u32) {
    crate::arch::interrupts::without(|| {
        ADDRESS_SPACE.lock().map_vidmem(virt, phys);
        arch::flush_tlb();
    });
}

/// Retarget a low-table page (terminal switch) and flush the TLB.
pub fn point_page_at(page_index: usize, phys: u32) {
    crate::arch::interrupts::without(|| {
        ADDRESS_SPACE.lock().point_page_at(page_index, phys);
        arch::flush_tlb();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::{MB128, MB8, USER_VIDEO_VA};

    #[test]
    fn static_mappings_cover_kernel_and_video() {
        let mut space = AddressSpace::new();
        space.init_static_mappings();

        // Kernel large page at PD[1], supervisor only.
        assert_eq!(
            space.directory_entry(1),
            KERNEL_BASE | 0x83,
            "kernel must be a present 4 MiB supervisor page"
        );
        // Low table is hooked into PD[0].
        assert_eq!(space.directory_entry(0) & 0x3, 0x3);

        // VGA frame and the three backing pages are present; an arbitrary
        // other low page is identity-filled but not present.
        assert_eq!(space.low_table_entry(0xB8), VIDEO_MEMORY | 0x3);
        for backing in TERMINAL_VIDEO {
            assert_eq!(
                space.low_table_entry((backing >> 12) as usize),
                backing | 0x3
            );
        }
        assert_eq!(space.low_table_entry(0x10), (0x10 << 12) | 0x2);
    }

    #[test]
    fn map_task_writes_a_user_large_page() {
        let mut space = AddressSpace::new();
        space.init_static_mappings();

        space.map_task(MB128, MB8);
        assert_eq!(space.directory_entry((MB128 / MB4) as usize), MB8 | 0x87);

        // Remapping for another process replaces the slot.
        space.map_task(MB128, MB8 + MB4);
        assert_eq!(
            space.directory_entry((MB128 / MB4) as usize),
            (MB8 + MB4) | 0x87
        );
    }

    #[test]
    fn map_vidmem_routes_through_the_vidmap_table() {
        let mut space = AddressSpace::new();
        space.init_static_mappings();

        space.map_vidmem(USER_VIDEO_VA[1], VIDEO_MEMORY);
        let pd_index = (USER_VIDEO_VA[1] / MB4) as usize;
        assert_eq!(space.directory_entry(pd_index) & 0x7, 0x7);
        assert_eq!(space.vidmap_entry(0), VIDEO_MEMORY | 0x7);

        // Rescheduling a non-visible terminal repoints PTE 0 at its backing.
        space.map_vidmem(USER_VIDEO_VA[1], TERMINAL_VIDEO[1]);
        assert_eq!(space.vidmap_entry(0), TERMINAL_VIDEO[1] | 0x7);
    }

    #[test]
    fn terminal_switch_retargets_low_pages() {
        let mut space = AddressSpace::new();
        space.init_static_mappings();

        let index = (TERMINAL_VIDEO[0] >> 12) as usize;
        space.point_page_at(index, VIDEO_MEMORY);
        assert_eq!(space.low_table_entry(index), VIDEO_MEMORY | 0x3);
        space.point_page_at(index, TERMINAL_VIDEO[0]);
        assert_eq!(space.low_table_entry(index), TERMINAL_VIDEO[0] | 0x3);
    }
}
