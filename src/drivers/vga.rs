//! VGA text-mode cells and cursor.
//!
//! [`VideoPage`] is the 80x25 cell grid shared by the real frame at 0xB8000
//! and the per-terminal backing pages; all console drawing goes through it
//! with volatile accesses. The hardware cursor lives behind the CRTC ports
//! and degrades to a no-op on hosted builds.

use core::ptr::{read_volatile, write_volatile};

pub const BUFFER_HEIGHT: usize = 25;
pub const BUFFER_WIDTH: usize = 80;

/// VGA text-mode color palette. Not every variant is used but the full
/// 16-color palette is defined per the VGA specification.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode(((background as u8) << 4) | (foreground as u8))
    }
}

/// The one attribute every terminal draws with.
pub const ATTRIBUTE: ColorCode = ColorCode::new(Color::LightGray, Color::Black);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenChar {
    pub ascii_character: u8,
    pub color_code: ColorCode,
}

const BLANK: ScreenChar = ScreenChar {
    ascii_character: b' ',
    color_code: ATTRIBUTE,
};

/// One 4 KiB video page: 25 rows of 80 (character, attribute) cells.
#[repr(transparent)]
pub struct VideoPage {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

impl VideoPage {
    pub const fn new() -> Self {
        Self {
            chars: [[BLANK; BUFFER_WIDTH]; BUFFER_HEIGHT],
        }
    }

    pub fn write_at(&mut self, row: usize, col: usize, byte: u8) {
        // SAFETY: row/col are bounds-checked by the array type; the volatile
        // write keeps memory-mapped frame stores from being elided.
        unsafe {
            write_volatile(
                &mut self.chars[row][col],
                ScreenChar {
                    ascii_character: byte,
                    color_code: ATTRIBUTE,
                },
            );
        }
    }

    pub fn char_at(&self, row: usize, col: usize) -> u8 {
        // SAFETY: in-bounds volatile read of one cell.
        unsafe { read_volatile(&self.chars[row][col]).ascii_character }
    }

    pub fn clear(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
    }

    pub fn clear_row(&mut self, row: usize) {
        for col in 0..BUFFER_WIDTH {
            // SAFETY: in-bounds volatile store of the blank cell.
            unsafe { write_volatile(&mut self.chars[row][col], BLANK) };
        }
    }

    /// Move rows 1..25 up one line and blank the bottom row.
    pub fn scroll_up(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                // SAFETY: both cells are in bounds; volatile keeps the
                // row-by-row move ordered against the frame.
                let cell = unsafe { read_volatile(&self.chars[row][col]) };
                // SAFETY: row - 1 is in bounds because row starts at 1.
                unsafe { write_volatile(&mut self.chars[row - 1][col], cell) };
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
    }

    /// Cell-for-cell copy from another page (terminal switch).
    pub fn copy_from(&mut self, source: &VideoPage) {
        for row in 0..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                // SAFETY: identical layouts, both in bounds.
                let cell = unsafe { read_volatile(&source.chars[row][col]) };
                // SAFETY: the destination cell is in bounds.
                unsafe { write_volatile(&mut self.chars[row][col], cell) };
            }
        }
    }
}

impl Default for VideoPage {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Hardware cursor
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod cursor {
    use crate::arch::x86::port::Port;

    const CRTC_INDEX: u16 = 0x3D4;
    const CRTC_DATA: u16 = 0x3D5;

    const CURSOR_START: u8 = 0x0A;
    const CURSOR_END: u8 = 0x0B;
    const CURSOR_HIGH: u8 = 0x0E;
    const CURSOR_LOW: u8 = 0x0F;

    /// Cursor occupies scanlines 14..15 of the cell.
    const SCAN_START: u8 = 14;
    const SCAN_END: u8 = 15;

    pub fn enable() {
        let mut index: Port<u8> = Port::new(CRTC_INDEX);
        let mut data: Port<u8> = Port::new(CRTC_DATA);
        // SAFETY: CRTC index/data handshake on the standard color-mode
        // ports; preserves the register bits outside the cursor shape.
        unsafe {
            index.write(CURSOR_START);
            let start = data.read();
            index.write(CURSOR_START);
            data.write((start & 0xC0) | SCAN_START);

            index.write(CURSOR_END);
            let end = data.read();
            index.write(CURSOR_END);
            data.write((end & 0xE0) | SCAN_END);
        }
    }

    pub fn disable() {
        let mut index: Port<u8> = Port::new(CRTC_INDEX);
        let mut data: Port<u8> = Port::new(CRTC_DATA);
        // SAFETY: setting bit 5 of the cursor-start register hides the
        // cursor; nothing else is touched.
        unsafe {
            index.write(CURSOR_START);
            data.write(0x20);
        }
    }

    pub fn move_to(x: usize, y: usize) {
        let position = (y * super::BUFFER_WIDTH + x) as u16;
        let mut index: Port<u8> = Port::new(CRTC_INDEX);
        let mut data: Port<u8> = Port::new(CRTC_DATA);
        // SAFETY: low/high halves of the cursor location registers.
        unsafe {
            index.write(CURSOR_LOW);
            data.write(position as u8);
            index.write(CURSOR_HIGH);
            data.write((position >> 8) as u8);
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use cursor::{disable as disable_cursor, enable as enable_cursor, move_to as move_cursor};

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn enable_cursor() {}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn disable_cursor() {}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn move_cursor(_x: usize, _y: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_start_blank() {
        let page = VideoPage::new();
        assert_eq!(page.char_at(0, 0), b' ');
        assert_eq!(page.char_at(BUFFER_HEIGHT - 1, BUFFER_WIDTH - 1), b' ');
    }

    #[test]
    fn scroll_moves_rows_up_and_blanks_the_bottom() {
        let mut page = VideoPage::new();
        page.write_at(1, 0, b'a');
        page.write_at(24, 79, b'z');

        page.scroll_up();

        assert_eq!(page.char_at(0, 0), b'a');
        assert_eq!(page.char_at(23, 79), b'z');
        for col in 0..BUFFER_WIDTH {
            assert_eq!(page.char_at(24, col), b' ');
        }
    }

    #[test]
    fn copy_is_cell_for_cell() {
        let mut source = VideoPage::new();
        source.write_at(3, 7, b'Q');
        let mut dest = VideoPage::new();
        dest.write_at(0, 0, b'X');

        dest.copy_from(&source);

        assert_eq!(dest.char_at(3, 7), b'Q');
        assert_eq!(dest.char_at(0, 0), b' ');
    }
}
