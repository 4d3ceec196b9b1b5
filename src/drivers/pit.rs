//! Programmable interval timer, channel 0.
//!
//! Drives the scheduler at roughly 40 Hz. The divisor below is the one the
//! hardware behaved best with; channel 0 runs in rate-generator mode.

pub const PIT_IRQ: u8 = 0;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod hw {
    use super::PIT_IRQ;
    use crate::arch::x86::idt::InterruptStackFrame;
    use crate::arch::x86::port::Port;
    use crate::drivers::pic;

    const COMMAND_PORT: u16 = 0x43;
    const CHANNEL_0: u16 = 0x40;

    /// Mode/command: channel 0, lobyte/hibyte access, rate generator.
    const MODE_RATE_GENERATOR: u8 = 0x36;

    /// 1.193182 MHz / 0x7486 ~ 40 Hz.
    const DIVISOR_40HZ: u16 = 0x7486;

    /// Program channel 0 and unmask the timer line.
    pub fn init() {
        let mut command: Port<u8> = Port::new(COMMAND_PORT);
        let mut channel0: Port<u8> = Port::new(CHANNEL_0);
        // SAFETY: mode write then low/high divisor bytes, the documented
        // channel-0 programming sequence.
        unsafe {
            command.write(MODE_RATE_GENERATOR);
            channel0.write(DIVISOR_40HZ as u8);
            channel0.write((DIVISOR_40HZ >> 8) as u8);
        }
        pic::enable_irq(PIT_IRQ);
        log::info!(target: "pit", "channel 0 at ~40 Hz (divisor {:#x})", DIVISOR_40HZ);
    }

    /// Timer tick: acknowledge first, then let the scheduler preempt.
    pub extern "x86-interrupt" fn pit_interrupt(_frame: InterruptStackFrame) {
        pic::send_eoi(PIT_IRQ);
        crate::sched::tick();
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use hw::{init, pit_interrupt};

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn init() {}
