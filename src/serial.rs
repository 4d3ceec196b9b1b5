//! 16550 serial driver for COM1.
//!
//! The serial line carries the kernel log so it survives terminal switches
//! and screen clears. Only the transmit side is programmed.

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod uart {
    use core::fmt;

    use lazy_static::lazy_static;
    use spin::Mutex;

    use crate::arch::x86::port::Port;

    /// I/O base of COM1.
    const COM1: u16 = 0x3F8;

    /// Line status register bit: transmitter holding register empty.
    const LSR_THRE: u8 = 1 << 5;

    pub struct SerialPort {
        data: Port<u8>,
        int_enable: Port<u8>,
        fifo_ctrl: Port<u8>,
        line_ctrl: Port<u8>,
        modem_ctrl: Port<u8>,
        line_status: Port<u8>,
    }

    impl SerialPort {
        const fn new(base: u16) -> Self {
            Self {
                data: Port::new(base),
                int_enable: Port::new(base + 1),
                fifo_ctrl: Port::new(base + 2),
                line_ctrl: Port::new(base + 3),
                modem_ctrl: Port::new(base + 4),
                line_status: Port::new(base + 5),
            }
        }

        /// Program 38400 baud, 8N1, FIFO on, no interrupts.
        fn init(&mut self) {
            // SAFETY: writes target the COM1 register block only; the port
            // assignments above keep each write on its documented register.
            unsafe {
                self.int_enable.write(0x00);
                self.line_ctrl.write(0x80); // DLAB on
                self.data.write(0x03); // divisor low: 38400 baud
                self.int_enable.write(0x00); // divisor high
                self.line_ctrl.write(0x03); // 8N1, DLAB off
                self.fifo_ctrl.write(0xC7);
                self.modem_ctrl.write(0x0B);
            }
        }

        fn write_byte(&mut self, byte: u8) {
            // SAFETY: polling LSR then writing THR is the documented 16550
            // transmit sequence; both ports belong to this driver.
            unsafe {
                while self.line_status.read() & LSR_THRE == 0 {
                    core::hint::spin_loop();
                }
                self.data.write(byte);
            }
        }
    }

    impl fmt::Write for SerialPort {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for byte in s.bytes() {
                if byte == b'\n' {
                    self.write_byte(b'\r');
                }
                self.write_byte(byte);
            }
            Ok(())
        }
    }

    lazy_static! {
        static ref COM1_PORT: Mutex<SerialPort> = {
            let mut port = SerialPort::new(COM1);
            port.init();
            Mutex::new(port)
        };
    }

    pub fn init() {
        lazy_static::initialize(&COM1_PORT);
    }

    #[doc(hidden)]
    pub fn _print(args: fmt::Arguments) {
        use core::fmt::Write;

        crate::arch::interrupts::without(|| {
            // A failed UART write has nowhere to report itself.
            let _ = COM1_PORT.lock().write_fmt(args);
        });
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use uart::{_print, init};

// ---------------------------------------------------------------------------
// Stubs for hosted builds
// ---------------------------------------------------------------------------

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn init() {}
