//! Trident kernel entry point.
//!
//! The boot loader (outside this crate) drops us into `kernel_main` in
//! 32-bit protected mode with a flat GDT loaded, interrupts disabled, and
//! the filesystem image already in memory.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod boot {
    use core::panic::PanicInfo;

    use trident_kernel::{arch, drivers, fs, klog, mm, process, sched, serial, terminal};
    use trident_kernel::{println, serial_println};

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        println!("[KERNEL PANIC] {}", info);
        serial_println!("[KERNEL PANIC] {}", info);
        arch::halt_loop();
    }

    /// Kernel entry. `fs_image_base`/`fs_image_len` locate the preloaded
    /// filesystem image.
    #[no_mangle]
    pub extern "C" fn kernel_main(fs_image_base: u32, fs_image_len: u32) -> ! {
        serial::init();
        klog::init();
        log::info!(target: "boot", "trident kernel v{}", env!("CARGO_PKG_VERSION"));

        // Descriptor tables, then the interrupt controller, then paging.
        arch::x86::init();
        drivers::pic::init();
        mm::paging::init();

        // Console up before anything prints to the screen.
        terminal::init();
        println!("trident v{}", env!("CARGO_PKG_VERSION"));

        // SAFETY: the boot loader placed the filesystem image at this
        // address and nothing else claims the region.
        let image = unsafe {
            core::slice::from_raw_parts(fs_image_base as usize as *const u8, fs_image_len as usize)
        };
        if let Err(error) = fs::init(image) {
            panic!("filesystem image unusable: {}", error);
        }

        drivers::rtc::init();
        drivers::keyboard::init();
        drivers::mouse::init();
        sched::init();

        arch::interrupts::enable();
        log::info!(target: "boot", "launching the first shell");

        // The base shell never hands control back; if a launch fails the
        // loop retries rather than leaving the machine idle.
        loop {
            process::exec::execute(b"shell");
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("trident-kernel only runs on a bare-metal 32-bit x86 target");
}
