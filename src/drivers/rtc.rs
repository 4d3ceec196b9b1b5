//! MC146818 real-time clock.
//!
//! The RTC ticks periodically and raises every terminal's `rtc_flag`;
//! `rtc_read` blocks the calling terminal until its next flag, `rtc_write`
//! reprograms the tick frequency. Boot rate is 2 Hz.

use crate::error::{KernelError, KernelResult};
use crate::terminal;

pub const RTC_IRQ: u8 = 8;

/// Map a requested frequency to the register A rate field.
///
/// Only powers of two in 2..=1024 have a rate; anything else is rejected.
pub fn rate_for_frequency(frequency: i32) -> Option<u8> {
    match frequency {
        2 => Some(0x0F),
        4 => Some(0x0E),
        8 => Some(0x0D),
        16 => Some(0x0C),
        32 => Some(0x0B),
        64 => Some(0x0A),
        128 => Some(0x09),
        256 => Some(0x08),
        512 => Some(0x07),
        1024 => Some(0x06),
        _ => None,
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod hw {
    use super::*;
    use crate::arch::x86::idt::InterruptStackFrame;
    use crate::arch::x86::port::Port;
    use crate::drivers::pic;

    /// Register A rate field for the 2 Hz boot frequency.
    const BOOT_RATE: u8 = 0x0F;

    /// Register B bit 6: periodic interrupt enable.
    const PERIODIC_ENABLE: u8 = 0x40;

    /// Index port; bit 7 set keeps NMI disabled during the access.
    const INDEX_PORT: u16 = 0x70;
    const DATA_PORT: u16 = 0x71;

    const REGISTER_A: u8 = 0x8A;
    const REGISTER_B: u8 = 0x8B;
    const REGISTER_C: u8 = 0x8C;

    /// Read-modify-write the low nibble of register A.
    pub(super) fn write_rate(rate: u8) {
        let mut index: Port<u8> = Port::new(INDEX_PORT);
        let mut data: Port<u8> = Port::new(DATA_PORT);
        crate::arch::interrupts::without(|| {
            // SAFETY: index/data handshake on the CMOS ports; every access
            // re-selects the register first, as the chip requires.
            unsafe {
                index.write(REGISTER_A);
                let previous = data.read();
                index.write(REGISTER_A);
                data.write((previous & 0xF0) | (rate & 0x0F));
            }
        });
    }

    /// Program the boot rate, enable periodic interrupts, unmask IRQ 8.
    pub fn init() {
        let mut index: Port<u8> = Port::new(INDEX_PORT);
        let mut data: Port<u8> = Port::new(DATA_PORT);
        crate::arch::interrupts::without(|| {
            write_rate(BOOT_RATE);
            // SAFETY: as write_rate; sets only bit 6 of register B.
            unsafe {
                index.write(REGISTER_B);
                let previous = data.read();
                index.write(REGISTER_B);
                data.write(previous | PERIODIC_ENABLE);
            }
        });
        pic::enable_irq(RTC_IRQ);
        log::info!(target: "rtc", "periodic interrupts at 2 Hz");
    }

    /// Periodic tick: flag every terminal, drain register C so the chip
    /// keeps ticking.
    pub extern "x86-interrupt" fn rtc_interrupt(_frame: InterruptStackFrame) {
        pic::send_eoi(RTC_IRQ);
        terminal::set_all_rtc_flags();
        let mut index: Port<u8> = Port::new(INDEX_PORT);
        let mut data: Port<u8> = Port::new(DATA_PORT);
        // SAFETY: register C must be read after each interrupt or the RTC
        // stops raising them; the value itself is irrelevant.
        unsafe {
            index.write(REGISTER_C);
            let _ = data.read();
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use hw::{init, rtc_interrupt};

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn init() {}

/// Block the calling terminal until its next RTC tick.
pub fn rtc_read(term: usize) -> KernelResult<usize> {
    loop {
        let ticked = crate::arch::interrupts::without(|| terminal::rtc_flag(term));
        if ticked {
            break;
        }
        crate::arch::interrupts::enable();
        core::hint::spin_loop();
    }
    crate::arch::interrupts::without(|| terminal::clear_rtc_flag(term));
    Ok(0)
}

/// Reprogram the periodic frequency. The buffer must be exactly four bytes
/// naming a power of two in 2..=1024; returns the four bytes consumed.
pub fn rtc_write(buf: &[u8]) -> KernelResult<usize> {
    if buf.len() != 4 {
        return Err(KernelError::InvalidArgument { name: "nbytes" });
    }
    let frequency = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let rate = rate_for_frequency(frequency)
        .ok_or(KernelError::InvalidArgument { name: "frequency" })?;

    #[cfg(all(target_arch = "x86", target_os = "none"))]
    hw::write_rate(rate);
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    let _ = rate;

    Ok(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_power_of_two_has_a_rate() {
        let expected = [
            (2, 0x0F),
            (4, 0x0E),
            (8, 0x0D),
            (16, 0x0C),
            (32, 0x0B),
            (64, 0x0A),
            (128, 0x09),
            (256, 0x08),
            (512, 0x07),
            (1024, 0x06),
        ];
        for (frequency, rate) in expected {
            assert_eq!(rate_for_frequency(frequency), Some(rate));
        }
    }

    #[test]
    fn non_powers_and_out_of_range_are_rejected()  {
        for frequency in [0, 1, 3, 6, 100, 2048, 4096, -2, i32::MAX] {
            assert_eq!(rate_for_frequency(frequency), None);
        }
    }

    #[test]
    fn rtc_write_validates_length_and_value() {
        assert!(rtc_write(&[2, 0, 0]).is_err());
        assert!(rtc_write(&32i32.to_le_bytes()).is_ok());
        assert_eq!(rtc_write(&32i32.to_le_bytes()), Ok(4));
        assert!(rtc_write(&33i32.to_le_bytes()).is_err());
    }
}
