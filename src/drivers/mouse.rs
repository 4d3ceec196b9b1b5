//! PS/2 mouse stub. The line is unmasked and acknowledged so a chatty
//! mouse cannot wedge the slave PIC, but packets are dropped.

pub const MOUSE_IRQ: u8 = 12;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod hw {
    use super::MOUSE_IRQ;
    use crate::arch::x86::idt::InterruptStackFrame;
    use crate::drivers::pic;

    pub fn init() {
        pic::enable_irq(MOUSE_IRQ);
    }

    pub extern "x86-interrupt" fn mouse_interrupt(_frame: InterruptStackFrame) {
        pic::send_eoi(MOUSE_IRQ);
        log::debug!(target: "mouse", "packet dropped");
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use hw::{init, mouse_interrupt};

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn init() {}
