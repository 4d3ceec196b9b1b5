//! Program launch and teardown.
//!
//! `execute` parses a command line, validates the executable, claims a PID,
//! maps and loads the image, builds the child PCB, and drops into ring 3.
//! It returns, much later, with the status the child's `halt` delivered.
//! `halt` is the other half: it releases the child's resources, restores the
//! parent's mapping and kernel stack, and unwinds into the parent's pending
//! `execute`.

use crate::error::{KernelError, KernelResult};
use crate::fs::{self, FileSystem};
use crate::mm::{self, MB128, USER_STACK_TOP};
use crate::process::{self, image_physical, kernel_stack_top};
use crate::process::pcb::{FdEntry, FD_ARRAY_SIZE, FIRST_DYNAMIC_FD};
use crate::terminal;

/// Halt status used by the exception squash path.
pub const HALT_BY_EXCEPTION: u8 = 255;

/// Status `execute` reports when the child died to an exception.
pub const EXCEPTION_RETURN: u32 = 256;

pub const MAX_COMMAND_LENGTH: usize = 128;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Byte offset of the 32-bit entry point inside the executable.
const ENTRY_POINT_OFFSET: u32 = 24;

const SPACE: u8 = b' ';

/// A command line split into its executable name and argument string.
///
/// Parsing collapses every space: the name is the first token, and the
/// argument string is the concatenation of all remaining non-space bytes.
pub struct ParsedCommand {
    file_name: [u8; MAX_COMMAND_LENGTH],
    name_len: usize,
    arguments: [u8; MAX_COMMAND_LENGTH],
    args_len: usize,
}

impl ParsedCommand {
    pub fn name(&self) -> &[u8] {
        &self.file_name[..self.name_len]
    }

    pub fn arguments(&self) -> &[u8] {
        &self.arguments[..self.args_len]
    }
}

/// Split a command line. Scanning stops at the first NUL or at the end of
/// the slice, whichever comes first.
pub fn parse_command(command: &[u8]) -> ParsedCommand {
    let mut parsed = ParsedCommand {
        file_name: [0; MAX_COMMAND_LENGTH],
        name_len: 0,
        arguments: [0; MAX_COMMAND_LENGTH],
        args_len: 0,
    };

    let mut i = 0;
    let mut done = false;
    while i < command.len() && command[i] != 0 && !done {
        let byte = command[i];
        if byte != SPACE {
            if parsed.name_len < MAX_COMMAND_LENGTH - 1 {
                parsed.file_name[parsed.name_len] = byte;
                parsed.name_len += 1;
            }
            if i + 1 < command.len() && command[i + 1] == SPACE {
                done = true;
            }
        }
        i += 1;
    }

    while i < command.len() && command[i] != 0 {
        let byte = command[i];
        if byte != SPACE && parsed.args_len < MAX_COMMAND_LENGTH - 1 {
            parsed.arguments[parsed.args_len] = byte;
            parsed.args_len += 1;
        }
        i += 1;
    }

    parsed
}

/// Gate on programs that take no arguments.
///
/// Only `cat`, `grep` and `sigtest` accept an argument string; any other
/// name with a non-empty argument string is refused. The comparison treats
/// the typed name as satisfying the list when it is a prefix of one of the
/// allowed names.
pub fn check_exec(name: &[u8], arguments: &[u8]) -> bool {
    const TAKES_ARGUMENTS: [&[u8]; 3] = [b"cat", b"grep", b"sigtest"];
    let allow_listed = TAKES_ARGUMENTS.iter().any(|lit| lit.starts_with(name));
    allow_listed || arguments.is_empty()
}

/// Status value a halting child hands back to its parent's `execute`.
pub fn delivered_status(status: u8) -> u32 {
    if status == HALT_BY_EXCEPTION {
        EXCEPTION_RETURN
    } else {
        status as u32
    }
}

/// Load and run a program on the visible terminal.
///
/// Returns the child's halt status (0..=255, or 256 after an exception
/// squash), 0 without launching for the `term` builtin and for the
/// out-of-PIDs case, and -1 on every validation failure.
pub fn execute(command: &[u8]) -> i32 {
    match execute_inner(command) {
        Ok(status) => status,
        Err(_) => -1,
    }
}

fn execute_inner(command: &[u8]) -> KernelResult<i32> {
    crate::arch::interrupts::disable();

    let visible = terminal::visible_terminal();
    // First program on this terminal: the scheduler starts covering it.
    terminal::with_terminals(|terms| {
        if !terms[visible].has_been_launched {
            terms[visible].has_been_launched = true;
            crate::sched::save_restore_point();
            crate::sched::set_current_terminal(visible);
        }
    });

    let parsed = parse_command(command);
    let name = parsed.name();

    // Builtin: report which terminal the command ran on, 1-based.
    if name.len() >= 4 && &name[..4] == b"term" {
        println!("Terminal Number: {}", visible + 1);
        return Ok(0);
    }

    if !check_exec(name, parsed.arguments()) {
        return Err(KernelError::NotExecutable);
    }

    let fs = fs::filesystem()?;
    let dentry = fs.find_dentry_by_name(name)?;

    let mut magic = [0u8; 4];
    if fs.read_data(dentry.inode, 0, &mut magic)? != 4 || magic != ELF_MAGIC {
        return Err(KernelError::NotExecutable);
    }
    let mut entry_bytes = [0u8; 4];
    if fs.read_data(dentry.inode, ENTRY_POINT_OFFSET, &mut entry_bytes)? != 4 {
        return Err(KernelError::NotExecutable);
    }
    let entry_point = u32::from_le_bytes(entry_bytes);

    let parent = terminal::current_process(visible);
    let pid = match process::with_table(|table| table.allocate(parent, visible)) {
        Ok(pid) => pid,
        Err(_) => {
            println!("Max number of processes reached.");
            return Ok(0);
        }
    };

    mm::paging::map_task(MB128, image_physical(pid));

    if let Err(error) = load_program_image(fs, dentry.inode) {
        process::with_table(|table| table.free(pid));
        return Err(error);
    }

    {
        let pcb = process::pcb_mut(pid).ok_or(KernelError::NotFound)?;
        pcb.set_arguments(parsed.arguments());
    }
    terminal::set_current_process(visible, Some(pid));
    crate::arch::set_kernel_stack(kernel_stack_top(pid));

    log::debug!(
        target: "exec",
        "pid {} on terminal {} entry {:#x}",
        pid,
        visible,
        entry_point
    );

    let pcb = process::pcb_mut(pid).ok_or(KernelError::NotFound)?;
    let saved_esp = &mut pcb.parent_esp as *mut u32;
    let saved_ebp = &mut pcb.parent_ebp as *mut u32;
    // SAFETY: the image was just mapped and loaded, esp0 points at the
    // child's kernel stack, and the saved-context pointers reference this
    // child's PCB, which outlives the child. Control returns here when the
    // child (or its squash path) halts.
    let status = unsafe {
        crate::arch::context::jump_to_user(entry_point, USER_STACK_TOP, saved_esp, saved_ebp)
    };
    Ok(status as i32)
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn load_program_image(fs: &FileSystem, inode: u32) -> KernelResult<usize> {
    let window = (MB128 + mm::MB4 - mm::PROGRAM_IMAGE_VA) as usize;
    // SAFETY: map_task just pointed the 128 MiB directory slot at this
    // process's private image slot; the slice stays inside that window.
    let image =
        unsafe { core::slice::from_raw_parts_mut(mm::PROGRAM_IMAGE_VA as *mut u8, window) };
    Ok(fs.read_data(inode, 0, image)?)
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn load_program_image(_fs: &FileSystem, _inode: u32) -> KernelResult<usize> {
    // Hosted builds have no user window to copy into.
    Ok(0)
}

/// Tear down the current process and deliver `status` to its parent.
///
/// A terminal's base shell has no parent; halting it clears the terminal
/// and starts a fresh shell instead of returning.
pub fn halt(status: u8) -> ! {
    crate::arch::interrupts::disable();

    let pcb = process::current_pcb().unwrap_or_else(|| panic!("halt with no running process"));
    let pid = pcb.pid;
    let terminal_index = pcb.terminal;

    match pcb.parent {
        None => {
            process::with_table(|table| table.free(pid));
            terminal::set_current_process(terminal_index, None);
            terminal::clear_screen(terminal_index);
            crate::arch::interrupts::enable();
            loop {
                execute(b"shell");
            }
        }
        Some(parent) => {
            terminal::set_current_process(terminal_index, Some(parent));

            for fd in FIRST_DYNAMIC_FD..FD_ARRAY_SIZE {
                if pcb.fd_array[fd].is_busy() {
                    // Kind-specific close hooks cannot fail today.
                    let _ = pcb.fd_array[fd].ops.close();
                    pcb.fd_array[fd] = FdEntry::closed();
                }
            }

            mm::paging::map_task(MB128, image_physical(parent));
            crate::arch::set_kernel_stack(kernel_stack_top(parent));

            let parent_esp = pcb.parent_esp;
            let parent_ebp = pcb.parent_ebp;
            process::with_table(|table| table.free(pid));

            log::debug!(target: "exec", "pid {} halted with status {}", pid, status);

            // SAFETY: the saved pair was captured by the jump_to_user that
            // started this process; the parent's kernel stack is intact
            // because the parent has been suspended since.
            unsafe {
                crate::arch::context::resume_from_halt(
                    delivered_status(status),
                    parent_esp,
                    parent_ebp,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::image::testimg::ImageBuilder;
    use crate::fs::image::FILETYPE_REGULAR;
    use crate::process::MAX_PROCESSES;

    #[test]
    fn commands_split_into_name_and_collapsed_arguments() {
        let parsed = parse_command(b"cat frame0.txt");
        assert_eq!(parsed.name(), b"cat");
        assert_eq!(parsed.arguments(), b"frame0.txt");

        // Leading spaces are skipped; interior spaces vanish from the
        // argument string entirely.
        let parsed = parse_command(b"   grep  very long args  ");
        assert_eq!(parsed.name(), b"grep");
        assert_eq!(parsed.arguments(), b"verylongargs");

        let parsed = parse_command(b"ls");
        assert_eq!(parsed.name(), b"ls");
        assert_eq!(parsed.arguments(), b"");

        let parsed = parse_command(b"");
        assert_eq!(parsed.name(), b"");
        assert_eq!(parsed.arguments(), b"");
    }

    #[test]
    fn parsing_stops_at_an_embedded_nul() {
        let parsed = parse_command(b"cat\0 ignored");
        assert_eq!(parsed.name(), b"cat");
        assert_eq!(parsed.arguments(), b"");
    }

    #[test]
    fn oversized_tokens_are_truncated_not_overflowed() {
        let long = [b'a'; 400];
        let parsed = parse_command(&long);
        assert_eq!(parsed.name().len(), MAX_COMMAND_LENGTH - 1);
    }

    #[test]
    fn only_the_allow_list_accepts_arguments() {
        assert!(check_exec(b"cat", b"frame0.txt"));
        assert!(check_exec(b"grep", b"needle"));
        assert!(check_exec(b"sigtest", b"1"));
        assert!(!check_exec(b"ls", b"anything"));
        assert!(!check_exec(b"shell", b"x"));
        // Without arguments everything passes.
        assert!(check_exec(b"ls", b""));
        assert!(check_exec(b"counter", b""));
    }

    #[test]
    fn halt_status_maps_exceptions_to_256() {
        assert_eq!(delivered_status(0), 0);
        assert_eq!(delivered_status(42), 42);
        assert_eq!(delivered_status(254), 254);
        assert_eq!(delivered_status(HALT_BY_EXCEPTION), 256);
    }

    /// Global-state scenario: with every PID taken, `execute` reports the
    /// limit and keeps the caller alive (returns 0, not an error).
    ///
    /// This is the one test that touches the kernel's global tables, so all
    /// of its phases live in a single function.
    #[test]
    fn execute_with_a_full_process_table_keeps_the_shell_up() {
        // ELF-looking "shell" with an entry point at offset 24.
        let mut shell = vec![0u8; 64];
        shell[..4].copy_from_slice(&ELF_MAGIC);
        shell[24..28].copy_from_slice(&0x0804_8094u32.to_le_bytes());
        let image = ImageBuilder::new()
            .file("shell", FILETYPE_REGULAR, &shell)
            .build();
        // A second init attempt must be refused regardless of who won.
        let _ = crate::fs::init(image);
        assert!(crate::fs::init(image).is_err());

        // Unknown names and argument-rule violations fail with -1 and
        // allocate nothing.
        assert_eq!(execute(b"nosuchprogram"), -1);
        assert_eq!(execute(b"shell withargs"), -1);

        let pids: Vec<_> = (0..MAX_PROCESSES)
            .map(|_| process::with_table(|t| t.allocate(None, 0)).unwrap())
            .collect();

        assert_eq!(execute(b"shell"), 0);

        // The builtin also short-circuits without a PID.
        assert_eq!(execute(b"term"), 0);

        for pid in pids {
            process::with_table(|t| t.free(pid));
        }
    }
}
