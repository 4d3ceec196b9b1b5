//! Processes: PID table, PCB storage, current-process derivation.
//!
//! PCBs live in a fixed six-slot table rather than at the base of their
//! kernel stacks; the "current" process is the one owned by the currently
//! scheduled terminal. The kernel stacks themselves remain at the fixed
//! physical addresses below 8 MiB, one 8 KiB region per PID.

pub mod exec;
pub mod pcb;

use spin::Mutex;

use crate::error::{KernelError, KernelResult};
use crate::mm::{KB8, MB4, MB8};

pub use pcb::Pcb;

pub const MAX_PROCESSES: usize = 6;

/// Process identifier: an index into the process table, 0..6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(pub u8);

impl Pid {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Top of a process's 8 KiB kernel stack (the value loaded into esp0).
pub fn kernel_stack_top(pid: Pid) -> u32 {
    MB8 - KB8 * pid.0 as u32 - 4
}

/// Physical base of a process's 4 MiB image slot.
pub fn image_physical(pid: Pid) -> u32 {
    MB8 + pid.0 as u32 * MB4
}

/// Fixed-capacity process table.
pub struct ProcessTable {
    slots: [Option<Pcb>; MAX_PROCESSES],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_PROCESSES],
        }
    }

    /// Claim the lowest free PID and install a fresh PCB in it.
    pub fn allocate(&mut self, parent: Option<Pid>, terminal: usize) -> KernelResult<Pid> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                let pid = Pid(index as u8);
                *slot = Some(Pcb::new(pid, parent, terminal));
                return Ok(pid);
            }
        }
        Err(KernelError::ResourceExhausted {
            resource: "process table",
        })
    }

    pub fn free(&mut self, pid: Pid) {
        if pid.index() < MAX_PROCESSES {
            self.slots[pid.index()] = None;
        }
    }

    pub fn is_busy(&self, pid: Pid) -> bool {
        pid.index() < MAX_PROCESSES && self.slots[pid.index()].is_some()
    }

    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.slots.get(pid.index())?.as_ref()
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.slots.get_mut(pid.index())?.as_mut()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The global process table. Mutated only inside interrupt-disabled
/// windows (execute, halt, scheduler tick).
static PROCESS_TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());

/// Run `f` against the process table inside an interrupt-disabled window.
/// Must not be nested.
pub fn with_table<R>(f: impl FnOnce(&mut ProcessTable) -> R) -> R {
    crate::arch::interrupts::without(|| f(&mut PROCESS_TABLE.lock()))
}

/// Borrow a PCB for the rest of the kernel's lifetime.
pub fn pcb_mut(pid: Pid) -> Option<&'static mut Pcb> {
    crate::arch::interrupts::without(|| {
        let mut table = PROCESS_TABLE.lock();
        table.get_mut(pid).map(|pcb| {
            // SAFETY: the PCB sits in a fixed-size static array behind a
            // Mutex, so its address is stable. Casting to *mut and back to
            // &'static mut extends the borrow past the lock; sound on this
            // single-CPU kernel because every mutation happens inside an
            // interrupt-disabled window and slots are never moved, only
            // dropped at halt when no references remain.
            unsafe { &mut *(pcb as *mut Pcb) }
        })
    })
}

/// PID of the process the scheduler is currently running.
pub fn current_pid() -> Option<Pid> {
    crate::terminal::current_process(crate::sched::current_terminal())
}

/// PCB of the process the scheduler is currently running.
pub fn current_pcb() -> Option<&'static mut Pcb> {
    pcb_mut(current_pid()?)
}

/// Squash path for CPU exceptions: kill the offending user process, or hang
/// the machine if the fault hit before any process existed.
pub fn exception_squash() -> ! {
    if current_pid().is_some() {
        exec::halt(exec::HALT_BY_EXCEPTION)
    } else {
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        crate::arch::x86::idt::error_hang();
        #[cfg(not(all(target_arch = "x86", target_os = "none")))]
        panic!("CPU exception with no process to squash");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_allocate_lowest_first_and_recycle() {
        let mut table = ProcessTable::new();
        let a = table.allocate(None, 0).unwrap();
        let b = table.allocate(Some(a), 0).unwrap();
        assert_eq!(a, Pid(0));
        assert_eq!(b, Pid(1));

        table.free(a);
        assert!(!table.is_busy(a));
        // Lowest free slot comes back first.
        assert_eq!(table.allocate(None, 1).unwrap(), Pid(0));
    }

    #[test]
    fn the_seventh_process_is_refused() {
        let mut table = ProcessTable::new();
        for i in 0..MAX_PROCESSES {
            assert_eq!(table.allocate(None, 0).unwrap(), Pid(i as u8));
        }
        assert!(matches!(
            table.allocate(None, 0),
            Err(KernelError::ResourceExhausted { .. })
        ));
        assert_eq!(table.busy_count(), MAX_PROCESSES);
    }

    #[test]
    fn kernel_stacks_stack_down_from_8_mib() {
        assert_eq!(kernel_stack_top(Pid(0)), 0x7F_FFFC);
        assert_eq!(kernel_stack_top(Pid(1)), 0x7F_DFFC);
        assert_eq!(kernel_stack_top(Pid(5)), 0x7F_5FFC);
        // Stack tops stay inside the kernel's 4..8 MiB page.
        for pid in 0..MAX_PROCESSES as u8 {
            let top = kernel_stack_top(Pid(pid));
            assert!(top > crate::mm::MB4 && top < MB8);
        }
    }

    #[test]
    fn image_slots_start_at_8_mib() {
        assert_eq!(image_physical(Pid(0)), MB8);
        assert_eq!(image_physical(Pid(1)), MB8 + MB4);
        assert_eq!(image_physical(Pid(5)), MB8 + 5 * MB4);
    }

    #[test]
    fn table_lookup_follows_the_pid() {
        let mut table = ProcessTable::new();
        let pid = table.allocate(None, 2).unwrap();
        let pcb = table.get(pid).unwrap();
        assert_eq!(pcb.pid, pid);
        assert_eq!(pcb.terminal, 2);
        assert_eq!(pcb.parent, None);
        assert!(table.get(Pid(5)).is_none());
    }
}
