//! The nine-call syscall surface.
//!
//! Dispatch by call number out of EAX with arguments in EBX/ECX/EDX; every
//! failure surfaces to ring 3 as -1 with nothing printed. The kernel trusts
//! user pointers the way the rest of this kernel does: a null check, then
//! raw access through the process's mapping.

use crate::drivers::rtc;
use crate::error::KernelError;
use crate::fs::{self, FileOps};
use crate::mm::{self, MB128, MB4};
use crate::process::{self, pcb::ARG_BUFFER_SIZE, pcb::FdFlags, pcb::FD_ARRAY_SIZE};
use crate::process::pcb::FIRST_DYNAMIC_FD;
use crate::terminal;

/// System call numbers.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Halt = 1,
    Execute = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    Getargs = 7,
    Vidmap = 8,
    SetHandler = 9,
    Sigreturn = 10,
}

impl TryFrom<u32> for Syscall {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::Halt),
            2 => Ok(Syscall::Execute),
            3 => Ok(Syscall::Read),
            4 => Ok(Syscall::Write),
            5 => Ok(Syscall::Open),
            6 => Ok(Syscall::Close),
            7 => Ok(Syscall::Getargs),
            8 => Ok(Syscall::Vidmap),
            9 => Ok(Syscall::SetHandler),
            10 => Ok(Syscall::Sigreturn),
            _ => Err(()),
        }
    }
}

/// Entry point called by the 0x80 trampoline.
pub extern "C" fn dispatch_raw(number: u32, arg1: u32, arg2: u32, arg3: u32) -> i32 {
    match Syscall::try_from(number) {
        Ok(syscall) => handle(syscall, arg1, arg2, arg3),
        Err(()) => -1,
    }
}

fn handle(syscall: Syscall, arg1: u32, arg2: u32, arg3: u32) -> i32 {
    match syscall {
        Syscall::Halt => process::exec::halt(arg1 as u8),
        Syscall::Execute => sys_execute(arg1),
        Syscall::Read => sys_read(arg1, arg2, arg3),
        Syscall::Write => sys_write(arg1, arg2, arg3),
        Syscall::Open => sys_open(arg1),
        Syscall::Close => sys_close(arg1),
        Syscall::Getargs => sys_getargs(arg1, arg2),
        Syscall::Vidmap => sys_vidmap(arg1),
        // Signals are a stub.
        Syscall::SetHandler | Syscall::Sigreturn => -1,
    }
}

// ---------------------------------------------------------------------------
// User-pointer plumbing
// ---------------------------------------------------------------------------

/// View `len` bytes of user memory.
///
/// # Safety
/// `addr` must lie in the calling process's mapping; beyond the null check
/// the kernel extends the same trust to user pointers everywhere.
unsafe fn user_slice(addr: u32, len: usize) -> Option<&'static [u8]> {
    if addr == 0 {
        return None;
    }
    let len = len.min(i32::MAX as usize);
    // SAFETY: forwarded to the caller.
    Some(unsafe { core::slice::from_raw_parts(addr as usize as *const u8, len) })
}

/// Mutable variant of [`user_slice`].
///
/// # Safety
/// As [`user_slice`].
unsafe fn user_slice_mut(addr: u32, len: usize) -> Option<&'static mut [u8]> {
    if addr == 0 {
        return None;
    }
    let len = len.min(i32::MAX as usize);
    // SAFETY: forwarded to the caller.
    Some(unsafe { core::slice::from_raw_parts_mut(addr as usize as *mut u8, len) })
}

/// View a NUL-terminated user string (without the NUL), scanning at most
/// `max` bytes.
///
/// # Safety
/// As [`user_slice`].
unsafe fn user_cstr(addr: u32, max: usize) -> Option<&'static [u8]> {
    if addr == 0 {
        return None;
    }
    let base = addr as usize as *const u8;
    let mut len = 0;
    // SAFETY: bounded scan of the caller's buffer.
    while len < max && unsafe { core::ptr::read(base.add(len)) } != 0 {
        len += 1;
    }
    // SAFETY: just scanned these bytes.
    Some(unsafe { core::slice::from_raw_parts(base, len) })
}

// ---------------------------------------------------------------------------
// The calls
// ---------------------------------------------------------------------------

fn sys_execute(command: u32) -> i32 {
    // SAFETY: null-checked; the command line lives in the caller's image.
    let Some(command) = (unsafe { user_cstr(command, ARG_BUFFER_SIZE) }) else {
        return -1;
    };
    process::exec::execute(command)
}

fn sys_read(fd: u32, buf: u32, nbytes: u32) -> i32 {
    let fd = fd as i32;
    if !(0..FD_ARRAY_SIZE as i32).contains(&fd) {
        return -1;
    }
    let fd = fd as usize;
    let Some(pcb) = process::current_pcb() else {
        return -1;
    };
    if !pcb.fd_array[fd].is_busy() {
        return -1;
    }
    let terminal_index = pcb.terminal;

    let result = match pcb.fd_array[fd].ops {
        FileOps::Stdin => {
            if nbytes as i32 <= 0 {
                return -1;
            }
            // SAFETY: null-checked; destination is in the caller's image.
            let Some(buffer) = (unsafe { user_slice_mut(buf, nbytes as usize) }) else {
                return -1;
            };
            terminal::terminal_read(terminal_index, buffer)
        }
        // stdout has no read side.
        FileOps::Stdout | FileOps::None => Err(KernelError::InvalidArgument { name: "fd" }),
        FileOps::Rtc => rtc::rtc_read(terminal_index),
        FileOps::Directory => {
            // SAFETY: as the stdin arm.
            let Some(buffer) = (unsafe { user_slice_mut(buf, nbytes as usize) }) else {
                return -1;
            };
            fs::filesystem()
                .and_then(|f| fs::file::directory_read(f, &mut pcb.fd_array[fd], buffer))
        }
        FileOps::Regular => {
            // SAFETY: as the stdin arm.
            let Some(buffer) = (unsafe { user_slice_mut(buf, nbytes as usize) }) else {
                return -1;
            };
            fs::filesystem().and_then(|f| fs::file::file_read(f, &mut pcb.fd_array[fd], buffer))
        }
    };
    match result {
        Ok(read) => read as i32,
        Err(_) => -1,
    }
}

fn sys_write(fd: u32, buf: u32, nbytes: u32) -> i32 {
    let fd = fd as i32;
    if !(0..FD_ARRAY_SIZE as i32).contains(&fd) {
        return -1;
    }
    let fd = fd as usize;
    let Some(pcb) = process::current_pcb() else {
        return -1;
    };
    if !pcb.fd_array[fd].is_busy() {
        return -1;
    }
    let terminal_index = pcb.terminal;

    let result = match pcb.fd_array[fd].ops {
        FileOps::Stdout => {
            // SAFETY: null-checked; source is in the caller's image.
            let Some(bytes) = (unsafe { user_slice(buf, nbytes as usize) }) else {
                return -1;
            };
            terminal::terminal_write(terminal_index, bytes)
        }
        FileOps::Rtc => {
            // SAFETY: as the stdout arm.
            let Some(bytes) = (unsafe { user_slice(buf, nbytes as usize) }) else {
                return -1;
            };
            rtc::rtc_write(bytes)
        }
        // Everything else is read-only.
        FileOps::Stdin | FileOps::None | FileOps::Directory | FileOps::Regular => {
            Err(KernelError::InvalidArgument { name: "fd" })
        }
    };
    match result {
        Ok(written) => written as i32,
        Err(_) => -1,
    }
}

fn sys_open(filename: u32) -> i32 {
    let Some(pcb) = process::current_pcb() else {
        return -1;
    };
    let Some(fd) = pcb.alloc_fd() else {
        return -1;
    };
    // SAFETY: null-checked; the name lives in the caller's image.
    let Some(name) = (unsafe { user_cstr(filename, ARG_BUFFER_SIZE) }) else {
        return -1;
    };
    let Ok(filesystem) = fs::filesystem() else {
        return -1;
    };
    let Ok(dentry) = filesystem.find_dentry_by_name(name) else {
        return -1;
    };
    let Some(ops) = FileOps::for_filetype(dentry.filetype) else {
        return -1;
    };

    let inode = if ops == FileOps::Regular {
        dentry.inode as i32
    } else {
        0
    };
    pcb.fd_array[fd] = process::pcb::FdEntry {
        ops,
        inode,
        file_position: 0,
        flags: FdFlags::Busy,
    };
    if ops.open().is_err() {
        return -1;
    }
    fd as i32
}

fn sys_close(fd: u32) -> i32 {
    let fd = fd as i32;
    if !(FIRST_DYNAMIC_FD as i32..FD_ARRAY_SIZE as i32).contains(&fd) {
        return -1;
    }
    let fd = fd as usize;
    let Some(pcb) = process::current_pcb() else {
        return -1;
    };
    if !pcb.fd_array[fd].is_busy() {
        return -1;
    }
    pcb.fd_array[fd].flags = FdFlags::Free;
    match pcb.fd_array[fd].ops.close() {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

fn sys_getargs(buf: u32, nbytes: u32) -> i32 {
    if buf == 0 {
        return -1;
    }
    let nbytes = nbytes as i32;
    if nbytes < 0 {
        return -1;
    }
    let Some(pcb) = process::current_pcb() else {
        return -1;
    };
    if pcb.arg_buf[0] == 0 {
        return -1;
    }
    // The stored string must fit NUL-terminated.
    if pcb.arg_buf[ARG_BUFFER_SIZE - 1] != 0 {
        return -1;
    }
    let count = (nbytes as usize).min(ARG_BUFFER_SIZE - 1);
    // SAFETY: null-checked; destination is in the caller's image.
    let Some(dst) = (unsafe { user_slice_mut(buf, count) }) else {
        return -1;
    };
    dst.copy_from_slice(&pcb.arg_buf[..count]);
    0
}

fn sys_vidmap(screen_start: u32) -> i32 {
    // The out-pointer itself must sit inside the user image window.
    if screen_start < MB128 || screen_start > MB128 + MB4 {
        return -1;
    }
    let Some(pcb) = process::current_pcb() else {
        return -1;
    };
    let user_vidmem =
        terminal::with_terminals(|terms| terms[pcb.terminal].user_vidmem_addr);
    mm::paging::map_vidmem(user_vidmem, mm::VIDEO_MEMORY);
    // SAFETY: the pointer was range-checked into the mapped user window.
    unsafe { core::ptr::write(screen_start as usize as *mut u32, user_vidmem) };
    user_vidmem as i32
}
