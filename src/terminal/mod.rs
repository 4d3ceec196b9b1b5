//! Virtual terminals.
//!
//! Three fixed terminal records, each owning an 80x25 video backing page, a
//! 128-byte line buffer, cursor and scroll state, and the process bookkeeping
//! the scheduler reads. Exactly one terminal is visible: its page-table slot
//! is aliased onto the VGA frame, the others draw into their backing pages.
//!
//! Everything that touches a terminal runs inside an interrupt-disabled
//! window; the records themselves sit behind one spinlock.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::drivers::vga::{self, VideoPage, BUFFER_HEIGHT, BUFFER_WIDTH};
use crate::drivers::keyboard::KeyAction;
use crate::error::{KernelError, KernelResult};
use crate::mm::{self, TERMINAL_VIDEO, USER_VIDEO_VA, VIDEO_MEMORY};
use crate::process::Pid;

pub const NUM_TERMINALS: usize = 3;

/// Line buffer size; the last byte is reserved for the newline.
pub const LINE_BUFFER_SIZE: usize = 128;
pub const LINE_LIMIT: usize = LINE_BUFFER_SIZE - 1;

pub const ENTER: u8 = 10;
pub const BACKSPACE: u8 = 8;

/// One virtual terminal.
pub struct Terminal {
    pub index: usize,
    pub io_buffer: [u8; LINE_BUFFER_SIZE],
    pub length: usize,
    /// Set by Enter, consumed by `terminal_read`.
    pub commit_flag: bool,
    /// Row the current input line starts on; backspace stops here.
    pub line_flag: usize,
    /// Column the last `terminal_write` ended on; backspace stops here.
    pub term_write_flag: usize,
    pub screen_x: usize,
    pub screen_y: usize,
    pub current_process: Option<Pid>,
    pub has_been_launched: bool,
    pub is_visible: bool,
    /// Set by the RTC tick, consumed by `rtc_read`.
    pub rtc_flag: bool,
    /// Kernel-visible address of this terminal's video page.
    pub vidmem_addr: usize,
    /// User VA handed out by `vidmap` for this terminal.
    pub user_vidmem_addr: u32,
}

impl Terminal {
    pub const fn new(index: usize) -> Self {
        Self {
            index,
            io_buffer: [0; LINE_BUFFER_SIZE],
            length: 0,
            commit_flag: false,
            line_flag: 0,
            term_write_flag: 0,
            screen_x: 0,
            screen_y: 0,
            current_process: None,
            has_been_launched: false,
            is_visible: false,
            rtc_flag: false,
            vidmem_addr: TERMINAL_VIDEO[index] as usize,
            user_vidmem_addr: USER_VIDEO_VA[index],
        }
    }

    /// This terminal's video page.
    fn page(&mut self) -> &'static mut VideoPage {
        // SAFETY: vidmem_addr names the terminal's private 4 KiB video page
        // (or a test-provided buffer); the terminal-table lock serializes
        // all access, so no two live references coexist.
        unsafe { &mut *(self.vidmem_addr as *mut VideoPage) }
    }

    /// Draw one byte at the cursor, wrapping on newline or column 80 and
    /// scrolling at the bottom row.
    pub fn putc(&mut self, byte: u8) {
        if byte == ENTER {
            self.screen_x = 0;
            self.screen_y += 1;
            if self.screen_y == BUFFER_HEIGHT {
                self.scroll_up();
            }
            self.line_flag = self.screen_y;
            return;
        }
        self.page().write_at(self.screen_y, self.screen_x, byte);
        self.screen_x += 1;
        if self.screen_x == BUFFER_WIDTH {
            self.screen_x = 0;
            self.screen_y += 1;
            if self.screen_y == BUFFER_HEIGHT {
                self.scroll_up();
            }
        }
    }

    fn scroll_up(&mut self) {
        self.page().scroll_up();
        self.screen_x = 0;
        self.screen_y = BUFFER_HEIGHT - 1;
    }

    /// Erase the previous cell unless that would cross the committed-output
    /// barrier.
    pub fn backspace(&mut self) {
        if self.screen_y == self.line_flag && self.screen_x == self.term_write_flag {
            return;
        }
        if self.screen_x == 0 {
            if self.screen_y == 0 || self.screen_y == self.line_flag {
                return;
            }
            self.screen_x = BUFFER_WIDTH - 1;
            self.screen_y -= 1;
        } else {
            self.screen_x -= 1;
        }
        self.page().write_at(self.screen_y, self.screen_x, b' ');
    }

    /// Feed one key into the line buffer.
    ///
    /// A committed line is frozen until `terminal_read` consumes it. The
    /// buffer always carries a trailing newline marker after its content;
    /// Enter commits, backspace retracts, and past 127 bytes everything but
    /// Enter and backspace is dropped.
    pub fn handle_buffer(&mut self, input: u8) {
        if (input == BACKSPACE && self.length == 0) || input == 0 || self.commit_flag {
            return;
        }
        if input == BACKSPACE {
            self.io_buffer[self.length] = 0;
            self.io_buffer[self.length - 1] = ENTER;
            self.length -= 1;
            return;
        }
        if input == ENTER {
            self.io_buffer[self.length] = ENTER;
            self.commit_flag = true;
            return;
        }
        if self.length < LINE_LIMIT {
            self.io_buffer[self.length] = input;
            self.io_buffer[self.length + 1] = ENTER;
            self.length += 1;
        }
    }

    /// Copy the committed line out, newline-terminated, and reset the
    /// buffer. The delivered sequence always ends in a newline: the stored
    /// one when it fits, else one overwriting the final byte.
    pub fn read_committed_line(&mut self, dst: &mut [u8]) -> usize {
        self.commit_flag = false;
        if dst.is_empty() {
            self.clear_buffer();
            return 0;
        }
        let mut i = 0;
        while i < dst.len() && self.io_buffer[i] != ENTER {
            dst[i] = self.io_buffer[i];
            i += 1;
        }
        let delivered = if i == dst.len() {
            dst[i - 1] = ENTER;
            i
        } else {
            dst[i] = ENTER;
            i + 1
        };
        self.clear_buffer();
        delivered
    }

    /// Draw a byte sequence and move the backspace barrier behind it.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.putc(byte);
        }
        self.term_write_flag = self.screen_x;
    }

    pub fn clear_buffer(&mut self) {
        self.length = 0;
        self.commit_flag = false;
        self.io_buffer = [0; LINE_BUFFER_SIZE];
    }

    /// Blank the page and reset cursor, buffer, and both barriers.
    pub fn clear_screen(&mut self) {
        self.page().clear();
        self.clear_buffer();
        self.screen_x = 0;
        self.screen_y = 0;
        self.line_flag = 0;
        self.term_write_flag = 0;
    }
}

// ---------------------------------------------------------------------------
// The three terminal records
// ---------------------------------------------------------------------------

static TERMINALS: Mutex<[Terminal; NUM_TERMINALS]> =
    Mutex::new([Terminal::new(0), Terminal::new(1), Terminal::new(2)]);

static VISIBLE_TERMINAL: AtomicUsize = AtomicUsize::new(0);

/// Index of the terminal whose page is aliased onto the VGA frame.
pub fn visible_terminal() -> usize {
    VISIBLE_TERMINAL.load(Ordering::SeqCst)
}

/// Run `f` against the terminal table inside an interrupt-disabled window.
/// Must not be nested.
pub fn with_terminals<R>(f: impl FnOnce(&mut [Terminal; NUM_TERMINALS]) -> R) -> R {
    crate::arch::interrupts::without(|| f(&mut TERMINALS.lock()))
}

pub fn current_process(term: usize) -> Option<Pid> {
    with_terminals(|terms| terms[term].current_process)
}

pub fn set_current_process(term: usize, pid: Option<Pid>) {
    with_terminals(|terms| terms[term].current_process = pid);
}

pub fn set_all_rtc_flags() {
    with_terminals(|terms| {
        for term in terms.iter_mut() {
            term.rtc_flag = true;
        }
    });
}

pub fn rtc_flag(term: usize) -> bool {
    TERMINALS.lock()[term].rtc_flag
}

pub fn clear_rtc_flag(term: usize) {
    TERMINALS.lock()[term].rtc_flag = false;
}

/// Blank a terminal; if it is the visible one, park the cursor too.
pub fn clear_screen(term: usize) {
    with_terminals(|terms| terms[term].clear_screen());
    if visible_terminal() == term {
        vga::move_cursor(0, 0);
    }
}

/// Prepare all three records, mark terminal 0 launched and visible, and
/// alias its page onto the frame. Boot-time only.
pub fn init() {
    crate::arch::interrupts::without(|| {
        let mut terms = TERMINALS.lock();
        for term in terms.iter_mut() {
            term.clear_screen();
        }
        terms[0].has_been_launched = true;
        terms[0].is_visible = true;
        VISIBLE_TERMINAL.store(0, Ordering::SeqCst);
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        display_terminal(&mut terms, 0, None, frame_page());
    });
    vga::enable_cursor();
    vga::move_cursor(0, 0);
    log::info!(target: "terminal", "three terminals ready, terminal 0 visible");
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn frame_page() -> &'static mut VideoPage {
    // SAFETY: 0xB8000 is the VGA text frame, mapped present in the low page
    // table; the terminal lock serializes access like any other page.
    unsafe { &mut *(VIDEO_MEMORY as usize as *mut VideoPage) }
}

/// Swap which terminal backs the VGA frame.
///
/// The outgoing terminal's page-table slot is pointed back at its backing
/// page and the frame contents are saved into it; the incoming terminal's
/// saved cells are copied onto the frame and its slot aliased there.
pub(crate) fn display_terminal(
    terms: &mut [Terminal; NUM_TERMINALS],
    curr: usize,
    prev: Option<usize>,
    frame: &mut VideoPage,
) {
    if prev == Some(curr) {
        return;
    }
    if let Some(prev) = prev {
        let backing = terms[prev].vidmem_addr as u32;
        mm::paging::point_page_at((backing >> 12) as usize, backing);
        terms[prev].page().copy_from(frame);
    }
    frame.copy_from(terms[curr].page());
    let backing = terms[curr].vidmem_addr as u32;
    mm::paging::point_page_at((backing >> 12) as usize, VIDEO_MEMORY);
}

/// Alt+F1/F2/F3: make `target` visible, launching its base shell the first
/// time it is shown.
pub fn switch_to(target: usize) {
    if target >= NUM_TERMINALS {
        return;
    }
    let needs_launch = crate::arch::interrupts::without(|| {
        let previous = VISIBLE_TERMINAL.load(Ordering::SeqCst);
        if previous == target {
            return false;
        }
        let mut terms = TERMINALS.lock();
        terms[previous].is_visible = false;
        terms[target].is_visible = true;
        VISIBLE_TERMINAL.store(target, Ordering::SeqCst);
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        display_terminal(&mut terms, target, Some(previous), frame_page());
        let (x, y) = (terms[target].screen_x, terms[target].screen_y);
        let needs_launch = !terms[target].has_been_launched;
        drop(terms);
        vga::move_cursor(x, y);
        needs_launch
    });
    if needs_launch {
        crate::arch::interrupts::enable();
        if crate::process::exec::execute(b"shell") == 0 {
            // No PID slot was free; undo the launch bookkeeping so the
            // next switch tries again.
            crate::arch::interrupts::without(|| {
                TERMINALS.lock()[target].has_been_launched = false;
                crate::sched::restore_current_terminal();
            });
        }
    }
}

/// Apply one decoded key to the visible terminal.
pub fn handle_key(action: KeyAction) {
    match action {
        KeyAction::Ignore => {}
        KeyAction::Char(ch) => crate::arch::interrupts::without(|| {
            let visible = visible_terminal();
            let mut terms = TERMINALS.lock();
            let term = &mut terms[visible];
            // Echo while the line still has room; Enter always echoes.
            if term.length < LINE_LIMIT || ch == ENTER {
                term.putc(ch);
            }
            term.handle_buffer(ch);
            let (x, y) = (term.screen_x, term.screen_y);
            drop(terms);
            vga::move_cursor(x, y);
        }),
        KeyAction::Backspace => crate::arch::interrupts::without(|| {
            let visible = visible_terminal();
            let mut terms = TERMINALS.lock();
            let term = &mut terms[visible];
            term.backspace();
            term.handle_buffer(BACKSPACE);
            let (x, y) = (term.screen_x, term.screen_y);
            drop(terms);
            vga::move_cursor(x, y);
        }),
        KeyAction::ClearScreen => {
            clear_screen(visible_terminal());
        }
        KeyAction::SwitchTerminal(target) => switch_to(target),
    }
}

// ---------------------------------------------------------------------------
// The stdin/stdout operations
// ---------------------------------------------------------------------------

/// Block until the terminal's line buffer is committed, then deliver it.
/// The spin re-enables interrupts between checks so the keyboard can run.
pub fn terminal_read(term: usize, buf: &mut [u8]) -> KernelResult<usize> {
    if buf.is_empty() {
        return Err(KernelError::InvalidArgument { name: "nbytes" });
    }
    loop {
        let committed = crate::arch::interrupts::without(|| TERMINALS.lock()[term].commit_flag);
        if committed {
            break;
        }
        crate::arch::interrupts::enable();
        core::hint::spin_loop();
    }
    Ok(crate::arch::interrupts::without(|| {
        TERMINALS.lock()[term].read_committed_line(buf)
    }))
}

/// Draw bytes on the process's terminal and bar backspacing over them.
pub fn terminal_write(term: usize, bytes: &[u8]) -> KernelResult<usize> {
    crate::arch::interrupts::without(|| {
        let mut terms = TERMINALS.lock();
        terms[term].write_bytes(bytes);
        let visible = VISIBLE_TERMINAL.load(Ordering::SeqCst);
        let (x, y) = (terms[visible].screen_x, terms[visible].screen_y);
        drop(terms);
        vga::move_cursor(x, y);
    });
    Ok(0)
}

// ---------------------------------------------------------------------------
// Kernel console printing
// ---------------------------------------------------------------------------

struct ConsoleWriter;

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let visible = visible_terminal();
        let mut terms = TERMINALS.lock();
        for byte in s.bytes() {
            terms[visible].putc(byte);
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    crate::arch::interrupts::without(|| {
        // ConsoleWriter::write_str never fails.
        let _ = ConsoleWriter.write_fmt(args);
        let visible = visible_terminal();
        let (x, y) = {
            let terms = TERMINALS.lock();
            (terms[visible].screen_x, terms[visible].screen_y)
        };
        vga::move_cursor(x, y);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A terminal whose video page is an owned buffer instead of 0xB9000.
    fn test_terminal() -> Terminal {
        let page: &'static mut VideoPage = Box::leak(Box::new(VideoPage::new()));
        let mut term = Terminal::new(0);
        term.vidmem_addr = page as *mut VideoPage as usize;
        term
    }

    fn row_text(term: &Terminal, row: usize) -> String {
        // SAFETY: test terminals point at leaked boxed pages.
        let page = unsafe { &*(term.vidmem_addr as *const VideoPage) };
        (0..BUFFER_WIDTH)
            .map(|col| page.char_at(row, col) as char)
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    #[test]
    fn written_bytes_read_back_row_by_row() {
        let mut term = test_terminal();
        term.write_bytes(b"hello\nworld");
        assert_eq!(row_text(&term, 0), "hello");
        assert_eq!(row_text(&term, 1), "world");
        assert_eq!((term.screen_x, term.screen_y), (5, 1));
        // The write barrier landed on the final column.
        assert_eq!(term.term_write_flag, 5);
    }

    #[test]
    fn long_lines_wrap_at_column_80() {
        let mut term = test_terminal();
        let line: Vec<u8> = (0..85).map(|i| b'a' + (i % 26) as u8).collect();
        term.write_bytes(&line);
        assert_eq!((term.screen_x, term.screen_y), (5, 1));
        // SAFETY: test terminals point at leaked boxed pages.
        let page = unsafe { &*(term.vidmem_addr as *const VideoPage) };
        assert_eq!(page.char_at(0, 79), line[79]);
        assert_eq!(page.char_at(1, 0), line[80]);
    }

    #[test]
    fn bottom_row_writes_scroll_the_page() {
        let mut term = test_terminal();
        for i in 0..26 {
            term.write_bytes(&[b'a' + (i % 26) as u8]);
            term.putc(ENTER);
        }
        // 26 newline-terminated lines through a 25-row page: the first two
        // lines scrolled off and the bottom row is the fresh blank one.
        assert_eq!(row_text(&term, 0), "c");
        assert_eq!(row_text(&term, 23), "z");
        assert_eq!(row_text(&term, 24), "");
        assert_eq!((term.screen_x, term.screen_y), (0, 24));
    }

    #[test]
    fn line_buffer_tracks_keys_and_commits_on_enter() {
        let mut term = test_terminal();
        for &b in b"ls" {
            term.handle_buffer(b);
        }
        assert_eq!(term.length, 2);
        assert_eq!(&term.io_buffer[..3], b"ls\n");
        assert!(!term.commit_flag);

        term.handle_buffer(ENTER);
        assert!(term.commit_flag);
        // Committed lines are frozen.
        term.handle_buffer(b'x');
        assert_eq!(term.length, 2);
    }

    #[test]
    fn backspace_retracts_the_buffer() {
        let mut term = test_terminal();
        for &b in b"cat" {
            term.handle_buffer(b);
        }
        term.handle_buffer(BACKSPACE);
        assert_eq!(term.length, 2);
        assert_eq!(&term.io_buffer[..3], b"ca\n");
        // Backspacing an empty buffer does nothing.
        term.handle_buffer(BACKSPACE);
        term.handle_buffer(BACKSPACE);
        term.handle_buffer(BACKSPACE);
        assert_eq!(term.length, 0);
    }

    #[test]
    fn buffer_caps_at_127_characters() {
        let mut term = test_terminal();
        for _ in 0..200 {
            term.handle_buffer(b'x');
        }
        assert_eq!(term.length, LINE_LIMIT);
        // Enter still commits a full line.
        term.handle_buffer(ENTER);
        assert!(term.commit_flag);
        assert_eq!(term.io_buffer[LINE_LIMIT], ENTER);
    }

    #[test]
    fn committed_lines_deliver_with_a_newline() {
        let mut term = test_terminal();
        for &b in b"hello" {
            term.handle_buffer(b);
        }
        term.handle_buffer(ENTER);

        let mut dst = [0u8; 32];
        let n = term.read_committed_line(&mut dst);
        assert_eq!(&dst[..n], b"hello\n");
        assert_eq!(term.length, 0);
        assert!(!term.commit_flag);
    }

    #[test]
    fn short_destinations_get_the_newline_in_the_last_byte() {
        let mut term = test_terminal();
        for &b in b"abcdefgh" {
            term.handle_buffer(b);
        }
        term.handle_buffer(ENTER);

        let mut dst = [0u8; 4];
        let n = term.read_committed_line(&mut dst);
        assert_eq!(n, 4);
        assert_eq!(&dst, b"abc\n");
    }

    #[test]
    fn backspace_stops_at_the_write_barrier() {
        let mut term = test_terminal();
        term.write_bytes(b"trident> ");
        // Cursor sits at the barrier; erasing must refuse.
        term.backspace();
        assert_eq!((term.screen_x, term.screen_y), (9, 0));

        // Typed input can be erased back to the barrier but no further.
        term.putc(b'l');
        term.putc(b's');
        term.backspace();
        term.backspace();
        term.backspace();
        term.backspace();
        assert_eq!((term.screen_x, term.screen_y), (9, 0));
        assert_eq!(row_text(&term, 0), "trident>");
    }

    #[test]
    fn switching_restores_saved_screens_cell_for_cell() {
        let mut terms = [test_terminal(), test_terminal(), test_terminal()];
        for (i, t) in terms.iter_mut().enumerate() {
            t.index = i;
        }
        let frame: &'static mut VideoPage = Box::leak(Box::new(VideoPage::new()));

        // Terminal 0 is on the frame at "boot".
        display_terminal(&mut terms, 0, None, frame);
        frame.write_at(0, 0, b'A'); // drawn while terminal 0 visible

        // Alt+F2: terminal 1 appears blank, terminal 0's frame is saved.
        display_terminal(&mut terms, 1, Some(0), frame);
        assert_eq!(frame.char_at(0, 0), b' ');
        frame.write_at(0, 0, b'B');

        // Alt+F1: terminal 0's screen is restored exactly.
        display_terminal(&mut terms, 0, Some(1), frame);
        assert_eq!(frame.char_at(0, 0), b'A');

        // And terminal 1's drawing survived the round trip too.
        display_terminal(&mut terms, 1, Some(0), frame);
        assert_eq!(frame.char_at(0, 0), b'B');
    }

    #[test]
    fn switch_to_same_terminal_is_a_no_op() {
        let mut terms = [test_terminal(), test_terminal(), test_terminal()];
        let frame: &'static mut VideoPage = Box::leak(Box::new(VideoPage::new()));
        frame.write_at(2, 2, b'K');
        display_terminal(&mut terms, 1, Some(1), frame);
        // Nothing was copied in either direction.
        assert_eq!(frame.char_at(2, 2), b'K');
    }
}
