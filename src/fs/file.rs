//! File-kind dispatch.
//!
//! Every FD carries a [`FileOps`] tag naming the kind of object behind it;
//! the syscall layer dispatches reads and writes by matching on the tag, so
//! the set of kinds is closed and exhaustive. This module owns the two
//! filesystem-backed implementations (regular files and the directory).

use crate::error::{KernelError, KernelResult};
use crate::process::pcb::FdEntry;

use super::image::FileSystem;

/// What kind of object an FD refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOps {
    /// Unopened slot; every operation fails.
    None,
    /// Terminal input.
    Stdin,
    /// Terminal output.
    Stdout,
    /// The RTC device.
    Rtc,
    /// The (single) directory.
    Directory,
    /// A regular file.
    Regular,
}

impl FileOps {
    /// Dispatch tag for a dentry filetype.
    pub fn for_filetype(filetype: u32) -> Option<Self> {
        match filetype {
            super::image::FILETYPE_RTC => Some(Self::Rtc),
            super::image::FILETYPE_DIRECTORY => Some(Self::Directory),
            super::image::FILETYPE_REGULAR => Some(Self::Regular),
            _ => None,
        }
    }

    /// Kind-specific open hook. Nothing needs per-open setup.
    pub fn open(self) -> KernelResult<()> {
        Ok(())
    }

    /// Kind-specific close hook.
    pub fn close(self) -> KernelResult<()> {
        Ok(())
    }
}

/// Regular-file read: continue from the FD's file position.
pub fn file_read(
    fs: &FileSystem,
    entry: &mut FdEntry,
    buf: &mut [u8],
) -> KernelResult<usize> {
    if entry.inode < 0 {
        return Err(KernelError::InvalidArgument { name: "inode" });
    }
    let read = fs.read_data(entry.inode as u32, entry.file_position, buf)?;
    entry.file_position += read as u32;
    Ok(read)
}

/// Directory read: one filename per call, enumerated through the FD's file
/// position so concurrent listings don't interfere. Returns 0 and rewinds
/// once every dentry has been delivered.
pub fn directory_read(
    fs: &FileSystem,
    entry: &mut FdEntry,
    buf: &mut [u8],
) -> KernelResult<usize> {
    let index = entry.file_position as usize;
    if index >= fs.num_dentries() {
        entry.file_position = 0;
        return Ok(0);
    }
    let dentry = fs.find_dentry_by_index(index)?;
    let name = dentry.name();
    let copy = name.len().min(buf.len());
    buf[..copy].copy_from_slice(&name[..copy]);
    entry.file_position += 1;
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::image::testimg::ImageBuilder;
    use crate::fs::image::{FILETYPE_DIRECTORY, FILETYPE_REGULAR, FILETYPE_RTC};

    fn sample() -> FileSystem {
        let image = ImageBuilder::new()
            .file(".", FILETYPE_DIRECTORY, &[])
            .file("shell", FILETYPE_REGULAR, b"\x7fELF-shell")
            .file("ls", FILETYPE_REGULAR, b"\x7fELF-ls")
            .file("cat", FILETYPE_REGULAR, b"\x7fELF-cat")
            .file("frame0.txt", FILETYPE_REGULAR, b"fish frame")
            .build();
        FileSystem::new(image).unwrap()
    }

    fn regular_fd(inode: u32) -> FdEntry {
        FdEntry {
            ops: FileOps::Regular,
            inode: inode as i32,
            file_position: 0,
            flags: crate::process::pcb::FdFlags::Busy,
        }
    }

    #[test]
    fn filetypes_map_to_dispatch_tags() {
        assert_eq!(FileOps::for_filetype(FILETYPE_RTC), Some(FileOps::Rtc));
        assert_eq!(
            FileOps::for_filetype(FILETYPE_DIRECTORY),
            Some(FileOps::Directory)
        );
        assert_eq!(
            FileOps::for_filetype(FILETYPE_REGULAR),
            Some(FileOps::Regular)
        );
        assert_eq!(FileOps::for_filetype(7), None);
    }

    #[test]
    fn file_read_advances_the_position_to_eof() {
        let fs = sample();
        let inode = fs.find_dentry_by_name(b"frame0.txt").unwrap().inode;
        let mut fd = regular_fd(inode);

        let mut buf = [0u8; 4096];
        assert_eq!(file_read(&fs, &mut fd, &mut buf), Ok(10));
        assert_eq!(&buf[..10], b"fish frame");
        assert_eq!(fd.file_position, 10);

        // Second read is a clean EOF.
        assert_eq!(file_read(&fs, &mut fd, &mut buf), Ok(0));
    }

    #[test]
    fn file_read_in_pieces_sees_the_same_bytes() {
        let fs = sample();
        let inode = fs.find_dentry_by_name(b"frame0.txt").unwrap().inode;
        let mut fd = regular_fd(inode);

        let mut piece = [0u8; 4];
        assert_eq!(file_read(&fs, &mut fd, &mut piece), Ok(4));
        assert_eq!(&piece, b"fish");
        assert_eq!(file_read(&fs, &mut fd, &mut piece), Ok(4));
        assert_eq!(&piece, b" fra");
        assert_eq!(file_read(&fs, &mut fd, &mut piece), Ok(2));
        assert_eq!(&piece[..2], b"me");
        assert_eq!(file_read(&fs, &mut fd, &mut piece), Ok(0));
    }

    #[test]
    fn directory_read_lists_names_in_order_then_rewinds() {
        let fs = sample();
        let mut fd = FdEntry {
            ops: FileOps::Directory,
            inode: 0,
            file_position: 0,
            flags: crate::process::pcb::FdFlags::Busy,
        };

        let expected: [&[u8]; 5] = [b".", b"shell", b"ls", b"cat", b"frame0.txt"];
        for name in expected {
            let mut buf = [0u8; 33];
            let n = directory_read(&fs, &mut fd, &mut buf).unwrap();
            assert_eq!(&buf[..n], name);
        }
        let mut buf = [0u8; 33];
        assert_eq!(directory_read(&fs, &mut fd, &mut buf), Ok(0));
        // Cursor rewound: listing starts over.
        let n = directory_read(&fs, &mut fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b".");
    }

    #[test]
    fn two_directory_fds_enumerate_independently() {
        let fs = sample();
        let mut a = FdEntry {
            ops: FileOps::Directory,
            inode: 0,
            file_position: 0,
            flags: crate::process::pcb::FdFlags::Busy,
        };
        let mut b = a;

        let mut buf = [0u8; 33];
        let n = directory_read(&fs, &mut a, &mut buf).unwrap();
        assert_eq!(&buf[..n], b".");
        let n = directory_read(&fs, &mut a, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"shell");

        // The second descriptor still starts from the top.
        let n = directory_read(&fs, &mut b, &mut buf).unwrap();
        assert_eq!(&buf[..n], b".");
    }
}
