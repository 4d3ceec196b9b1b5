//! Process control block and file-descriptor table.

use crate::fs::FileOps;

use super::Pid;

pub const FD_ARRAY_SIZE: usize = 8;
pub const STDIN_FD: usize = 0;
pub const STDOUT_FD: usize = 1;

/// First slot `open` may hand out.
pub const FIRST_DYNAMIC_FD: usize = 2;

/// Size of the saved argument string, including its NUL terminator.
pub const ARG_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdFlags {
    Free,
    Busy,
}

/// One file-descriptor slot.
#[derive(Debug, Clone, Copy)]
pub struct FdEntry {
    pub ops: FileOps,
    /// Inode for regular files; -1 when the slot carries no inode.
    pub inode: i32,
    pub file_position: u32,
    pub flags: FdFlags,
}

impl FdEntry {
    pub const fn closed() -> Self {
        Self {
            ops: FileOps::None,
            inode: -1,
            file_position: 0,
            flags: FdFlags::Free,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.flags == FdFlags::Busy
    }
}

/// Per-process kernel state.
pub struct Pcb {
    pub fd_array: [FdEntry; FD_ARRAY_SIZE],
    /// Parent process, or none for a terminal's base shell.
    pub parent: Option<Pid>,
    pub pid: Pid,
    /// Parent's kernel SP/BP, captured when `execute` started this process.
    pub parent_esp: u32,
    pub parent_ebp: u32,
    /// This process's own kernel SP/BP, saved at each preemption.
    pub esp: u32,
    pub ebp: u32,
    /// NUL-terminated argument string from the `execute` command line.
    pub arg_buf: [u8; ARG_BUFFER_SIZE],
    pub terminal: usize,
}

impl Pcb {
    /// Fresh PCB: stdin and stdout open, everything else closed.
    pub fn new(pid: Pid, parent: Option<Pid>, terminal: usize) -> Self {
        let mut fd_array = [FdEntry::closed(); FD_ARRAY_SIZE];
        fd_array[STDIN_FD] = FdEntry {
            ops: FileOps::Stdin,
            inode: -1,
            file_position: 0,
            flags: FdFlags::Busy,
        };
        fd_array[STDOUT_FD] = FdEntry {
            ops: FileOps::Stdout,
            inode: -1,
            file_position: 0,
            flags: FdFlags::Busy,
        };
        Self {
            fd_array,
            parent,
            pid,
            parent_esp: 0,
            parent_ebp: 0,
            esp: 0,
            ebp: 0,
            arg_buf: [0; ARG_BUFFER_SIZE],
            terminal,
        }
    }

    /// Store the argument string, NUL-terminated, truncating if oversized.
    pub fn set_arguments(&mut self, arguments: &[u8]) {
        self.arg_buf = [0; ARG_BUFFER_SIZE];
        let len = arguments.len().min(ARG_BUFFER_SIZE - 1);
        self.arg_buf[..len].copy_from_slice(&arguments[..len]);
    }

    /// Length of the stored argument string.
    pub fn arguments_len(&self) -> usize {
        self.arg_buf
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(ARG_BUFFER_SIZE)
    }

    /// Lowest free slot at or above [`FIRST_DYNAMIC_FD`].
    pub fn alloc_fd(&self) -> Option<usize> {
        (FIRST_DYNAMIC_FD..FD_ARRAY_SIZE).find(|&fd| !self.fd_array[fd].is_busy())
    }
}
