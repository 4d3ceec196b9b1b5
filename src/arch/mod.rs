//! Architecture support.
//!
//! The `x86` submodule carries the real 32-bit protected-mode implementation
//! (port I/O, GDT/TSS surface, IDT, paging control, context plumbing). On a
//! hosted target every function here degrades to a stub so the rest of the
//! kernel compiles and its logic can be unit tested.

pub mod context;
pub mod interrupts;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod x86;

/// Point the TSS at the given ring-0 stack top.
///
/// Called at every `execute` and every scheduler tick so ring 3 → ring 0
/// transitions land on the incoming process's kernel stack.
pub fn set_kernel_stack(esp0: u32) {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    x86::gdt::set_kernel_stack(esp0);
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    let _ = esp0;
}

/// Flush the TLB by reloading CR3.
pub fn flush_tlb() {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    x86::paging::flush_tlb();
}

/// Load CR3 with the page directory and turn on 4 MiB pages + paging.
///
/// Called exactly once during boot, after the static mappings are built.
pub fn enable_paging(directory: u32) {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    // SAFETY: the boot path builds the identity/kernel mappings before
    // calling this, so the instruction stream stays mapped across the
    // CR0.PG write.
    unsafe {
        x86::paging::enable(directory)
    };
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    let _ = directory;
}

/// Halt the CPU until the next interrupt, forever.
pub fn halt_loop() -> ! {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    loop {
        // SAFETY: hlt in ring 0 sleeps until the next interrupt; resuming
        // the loop afterwards is always valid.
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    panic!("halt_loop is only meaningful on bare metal");
}
