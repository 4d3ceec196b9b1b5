//! Kernel/user context plumbing, typed surface.
//!
//! Three operations cover every control transfer the kernel performs:
//!
//! - [`jump_to_user`]: capture the calling kernel continuation into a PCB's
//!   saved SP/BP, then IRET into ring 3. It "returns" only when a matching
//!   [`resume_from_halt`] replays the continuation, and its return value is
//!   the status that call supplied.
//! - [`resume_from_halt`]: unwind across a finished (or squashed) process
//!   back into the `jump_to_user` that started it.
//! - [`switch_context`]: cooperative kernel-stack switch used by the
//!   scheduler tick.
//!
//! Hosted builds stub these out; nothing on the host can enter ring 3.

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use crate::arch::x86::context::{jump_to_user, resume_from_halt, switch_context};

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
mod stubs {
    /// Hosted stand-in for the ring-3 transfer.
    ///
    /// # Safety
    /// Never sound to reach on a hosted target; panics.
    pub unsafe fn jump_to_user(
        _entry: u32,
        _user_stack: u32,
        _saved_esp: *mut u32,
        _saved_ebp: *mut u32,
    ) -> u32 {
        panic!("jump_to_user requires bare metal");
    }

    /// Hosted stand-in for the halt unwind.
    ///
    /// # Safety
    /// Never sound to reach on a hosted target; panics.
    pub unsafe fn resume_from_halt(_status: u32, _esp: u32, _ebp: u32) -> ! {
        panic!("resume_from_halt requires bare metal");
    }

    /// Hosted stand-in for the scheduler switch.
    ///
    /// # Safety
    /// Never sound to reach on a hosted target; panics.
    pub unsafe fn switch_context(
        _old_esp: *mut u32,
        _old_ebp: *mut u32,
        _new_esp: u32,
        _new_ebp: u32,
    ) {
        panic!("switch_context requires bare metal");
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub use stubs::{jump_to_user, resume_from_halt, switch_context};
