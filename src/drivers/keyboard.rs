//! PS/2 keyboard line discipline.
//!
//! Scancode set 1, translated through two 256-entry tables (shifted and
//! unshifted). Modifier state lives in a [`KeyboardState`] record guarded by
//! a spinlock rather than loose globals. Translation is pure and returns a
//! [`KeyAction`]; the interrupt handler applies it to the visible terminal.

use bitflags::bitflags;
use spin::Mutex;

pub const KEYBOARD_IRQ: u8 = 1;

pub const ENTER: u8 = 10;
pub const BACKSPACE: u8 = 8;
const SPACE: u8 = 32;

const CAPS_LOCK: u8 = 0x3A;
const LEFT_SHIFT_PRESS: u8 = 0x2A;
const LEFT_SHIFT_RELEASE: u8 = 0xAA;
const RIGHT_SHIFT_PRESS: u8 = 0x36;
const RIGHT_SHIFT_RELEASE: u8 = 0xB6;
const CTRL_PRESS: u8 = 0x1D;
const CTRL_RELEASE: u8 = 0x9D;
const ALT_PRESS: u8 = 0x38;
const ALT_RELEASE: u8 = 0xB8;
const BACKSPACE_PRESS: u8 = 0x0E;

const F1: u8 = 0x3B;
const F2: u8 = 0x3C;
const F3: u8 = 0x3D;

/// Scan codes above this are key releases.
const KEY_PRESS_MAX: u8 = 0x58;

/// Distance between upper- and lower-case letters.
const LETTER_CASE_CHANGE: u8 = 32;

const fn scan_table(prefix: [u8; 90]) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 90 {
        table[i] = prefix[i];
        i += 1;
    }
    table
}

static SCAN_CODES_UNSHIFTED: [u8; 256] = scan_table([
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9',
    b'0', b'-', b'=', 0, 0, b'q', b'w', b'e', b'r', b't',
    b'y', b'u', b'i', b'o', b'p', b'[', b']', ENTER, 0, b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0,
    b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/',
    0, b'*', 0, SPACE, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, b'7', b'8', b'9', b'-', b'4', b'5', b'6', b'+', b'1', b'2',
    b'3', b'0', b'.', 0, 0, 0, 0, 0, 0,
]);

static SCAN_CODES_SHIFTED: [u8; 256] = scan_table([
    0, 0, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(',
    b')', b'_', b'+', 0, 0, b'Q', b'W', b'E', b'R', b'T',
    b'Y', b'U', b'I', b'O', b'P', b'{', b'}', ENTER, 0, b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0,
    b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?',
    0, b'*', 0, SPACE, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, b'7', b'8', b'9', b'-', b'4', b'5', b'6', b'+', b'1', b'2',
    b'3', b'0', b'.', 0, 0, 0, 0, 0, 0,
]);

bitflags! {
    /// Held/locked modifier keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 1;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const CAPS = 1 << 3;
    }
}

/// What the terminal layer should do with one scancode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Modifier change, key release, or unmapped code.
    Ignore,
    /// Echo and buffer a character.
    Char(u8),
    /// Erase on screen and in the line buffer.
    Backspace,
    /// Ctrl+L: clear the visible terminal, no echo.
    ClearScreen,
    /// Alt+F1/F2/F3.
    SwitchTerminal(usize),
}

/// Keyboard translation state.
pub struct KeyboardState {
    modifiers: Modifiers,
}

impl KeyboardState {
    pub const fn new() -> Self {
        Self {
            modifiers: Modifiers::empty(),
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Translate one scancode, updating modifier state.
    pub fn translate(&mut self, code: u8) -> KeyAction {
        match code {
            CAPS_LOCK => self.modifiers.toggle(Modifiers::CAPS),
            LEFT_SHIFT_PRESS | RIGHT_SHIFT_PRESS => self.modifiers.insert(Modifiers::SHIFT),
            LEFT_SHIFT_RELEASE | RIGHT_SHIFT_RELEASE => self.modifiers.remove(Modifiers::SHIFT),
            CTRL_PRESS => self.modifiers.insert(Modifiers::CTRL),
            CTRL_RELEASE => self.modifiers.remove(Modifiers::CTRL),
            ALT_PRESS => self.modifiers.insert(Modifiers::ALT),
            ALT_RELEASE => self.modifiers.remove(Modifiers::ALT),
            BACKSPACE_PRESS => return KeyAction::Backspace,
            _ => {}
        }

        if code > KEY_PRESS_MAX {
            return KeyAction::Ignore;
        }

        let mut value = if self.modifiers.contains(Modifiers::SHIFT) {
            SCAN_CODES_SHIFTED[code as usize]
        } else {
            SCAN_CODES_UNSHIFTED[code as usize]
        };

        if self.modifiers.contains(Modifiers::CTRL) && (value == b'l' || value == b'L') {
            return KeyAction::ClearScreen;
        }

        if self.modifiers.contains(Modifiers::ALT) {
            match code {
                F1 => return KeyAction::SwitchTerminal(0),
                F2 => return KeyAction::SwitchTerminal(1),
                F3 => return KeyAction::SwitchTerminal(2),
                _ => {}
            }
        }

        // Caps Lock flips letter case only, XOR-ing with Shift.
        if self.modifiers.contains(Modifiers::CAPS) {
            if value.is_ascii_uppercase() {
                value += LETTER_CASE_CHANGE;
            } else if value.is_ascii_lowercase() {
                value -= LETTER_CASE_CHANGE;
            }
        }

        if value == 0 {
            KeyAction::Ignore
        } else {
            KeyAction::Char(value)
        }
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

static KEYBOARD: Mutex<KeyboardState> = Mutex::new(KeyboardState::new());

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod hw {
    use super::*;
    use crate::arch::x86::idt::InterruptStackFrame;
    use crate::arch::x86::port::Port;
    use crate::drivers::pic;

    const KEYBOARD_PORT: u16 = 0x60;

    /// Unmask the keyboard line.
    pub fn init() {
        pic::enable_irq(KEYBOARD_IRQ);
    }

    /// Keyboard interrupt: acknowledge, translate, hand the action to the
    /// visible terminal.
    pub extern "x86-interrupt" fn keyboard_interrupt(_frame: InterruptStackFrame) {
        pic::send_eoi(KEYBOARD_IRQ);
        let mut port: Port<u8> = Port::new(KEYBOARD_PORT);
        // SAFETY: the output buffer is full (this interrupt fired); one
        // read of port 0x60 drains it.
        let code = unsafe { port.read() };
        let action = KEYBOARD.lock().translate(code);
        crate::terminal::handle_key(action);
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use hw::{init, keyboard_interrupt};

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn init() {}

#[cfg(test)]
mod tests {
    use super::*;

    const Q_PRESS: u8 = 0x10;
    const L_PRESS: u8 = 0x26;
    const Q_RELEASE: u8 = 0x90;

    #[test]
    fn plain_keys_translate_to_characters() {
        let mut kb = KeyboardState::new();
        assert_eq!(kb.translate(Q_PRESS), KeyAction::Char(b'q'));
        assert_eq!(kb.translate(0x02), KeyAction::Char(b'1'));
        assert_eq!(kb.translate(0x1C), KeyAction::Char(ENTER));
    }

    #[test]
    fn releases_and_unmapped_codes_are_ignored() {
        let mut kb = KeyboardState::new();
        assert_eq!(kb.translate(Q_RELEASE), KeyAction::Ignore);
        assert_eq!(kb.translate(0x01), KeyAction::Ignore); // Esc slot is 0
    }

    #[test]
    fn shift_selects_the_shifted_table() {
        let mut kb = KeyboardState::new();
        kb.translate(LEFT_SHIFT_PRESS);
        assert_eq!(kb.translate(Q_PRESS), KeyAction::Char(b'Q'));
        assert_eq!(kb.translate(0x02), KeyAction::Char(b'!'));
        kb.translate(LEFT_SHIFT_RELEASE);
        assert_eq!(kb.translate(Q_PRESS), KeyAction::Char(b'q'));
    }

    #[test]
    fn caps_lock_xors_with_shift_for_letters_only() {
        let mut kb = KeyboardState::new();
        kb.translate(CAPS_LOCK);
        assert_eq!(kb.translate(Q_PRESS), KeyAction::Char(b'Q'));
        // Shift+letter under Caps goes back to lower case.
        kb.translate(RIGHT_SHIFT_PRESS);
        assert_eq!(kb.translate(Q_PRESS), KeyAction::Char(b'q'));
        // Digits are unaffected by Caps: shift still applies.
        assert_eq!(kb.translate(0x02), KeyAction::Char(b'!'));
        kb.translate(RIGHT_SHIFT_RELEASE);
        assert_eq!(kb.translate(0x02), KeyAction::Char(b'1'));
        // Toggle off restores lower case.
        kb.translate(CAPS_LOCK);
        assert_eq!(kb.translate(Q_PRESS), KeyAction::Char(b'q'));
    }

    #[test]
    fn ctrl_l_clears_instead_of_echoing() {
        let mut kb = KeyboardState::new();
        kb.translate(CTRL_PRESS);
        assert_eq!(kb.translate(L_PRESS), KeyAction::ClearScreen);
        kb.translate(CTRL_RELEASE);
        assert_eq!(kb.translate(L_PRESS), KeyAction::Char(b'l'));
    }

    #[test]
    fn alt_function_keys_switch_terminals() {
        let mut kb = KeyboardState::new();
        kb.translate(ALT_PRESS);
        assert_eq!(kb.translate(F1), KeyAction::SwitchTerminal(0));
        assert_eq!(kb.translate(F2), KeyAction::SwitchTerminal(1));
        assert_eq!(kb.translate(F3), KeyAction::SwitchTerminal(2));
        kb.translate(ALT_RELEASE);
        assert_eq!(kb.translate(F2), KeyAction::Ignore);
    }

    #[test]
    fn backspace_reports_its_own_action() {
        let mut kb = KeyboardState::new();
        assert_eq!(kb.translate(BACKSPACE_PRESS), KeyAction::Backspace);
    }
}
