//! Read-only boot-block filesystem image.
//!
//! Layout (little-endian, 4 KiB blocks): block 0 is the boot block, a
//! 64-byte statistics header followed by up to 63 directory entries of 64
//! bytes each. Blocks 1..=num_inodes are inodes (a 4-byte length plus up to
//! 1023 data-block indices). The data region follows as a contiguous array
//! of 4 KiB blocks addressed by those indices.

use crate::error::FsError;

pub const BLOCK_SIZE: usize = 4096;
pub const FILENAME_SIZE: usize = 32;
pub const MAX_DENTRIES: usize = 63;
pub const STATS_SIZE: usize = 64;
pub const DENTRY_SIZE: usize = 64;

/// Data-block indices one inode can hold.
pub const INDICES_PER_INODE: usize = BLOCK_SIZE / 4 - 1;

/// Dentry file types.
pub const FILETYPE_RTC: u32 = 0;
pub const FILETYPE_DIRECTORY: u32 = 1;
pub const FILETYPE_REGULAR: u32 = 2;

/// Boot-block statistics header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub num_dentries: u32,
    pub num_inodes: u32,
    pub num_datablocks: u32,
}

/// A directory entry, copied out by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dentry {
    pub filename: [u8; FILENAME_SIZE],
    pub filetype: u32,
    pub inode: u32,
}

impl Dentry {
    /// Visible name length: bytes before the first NUL, capped at 32.
    pub fn name_len(&self) -> usize {
        self.filename
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILENAME_SIZE)
    }

    /// The visible name bytes.
    pub fn name(&self) -> &[u8] {
        &self.filename[..self.name_len()]
    }
}

/// Parsed view over a preloaded filesystem image.
pub struct FileSystem {
    image: &'static [u8],
    stats: Statistics,
}

impl FileSystem {
    /// Parse the boot block. The image must at least hold the boot block
    /// and the inode blocks its header claims.
    pub fn new(image: &'static [u8]) -> Result<Self, FsError> {
        if image.len() < BLOCK_SIZE {
            return Err(FsError::Truncated);
        }
        let stats = Statistics {
            num_dentries: read_u32(image, 0).ok_or(FsError::Truncated)?,
            num_inodes: read_u32(image, 4).ok_or(FsError::Truncated)?,
            num_datablocks: read_u32(image, 8).ok_or(FsError::Truncated)?,
        };
        if stats.num_dentries as usize > MAX_DENTRIES {
            return Err(FsError::Truncated);
        }
        let needed = (1 + stats.num_inodes as usize) * BLOCK_SIZE;
        if image.len() < needed {
            return Err(FsError::Truncated);
        }
        Ok(Self { image, stats })
    }

    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    pub fn num_dentries(&self) -> usize {
        self.stats.num_dentries as usize
    }

    /// Linear scan of the directory.
    ///
    /// A name matches when its length equals the stored visible length (or
    /// both run to the full 32 bytes) and the bytes compare equal. Empty and
    /// over-long names never match anything.
    pub fn find_dentry_by_name(&self, name: &[u8]) -> Result<Dentry, FsError> {
        let len = name.len();
        if len == 0 || len > FILENAME_SIZE {
            return Err(FsError::InvalidArgument);
        }
        for index in 0..self.num_dentries() {
            let dentry = self.dentry_at(index)?;
            let stored_len = dentry.name_len();
            let lengths_match =
                len == stored_len || (len == FILENAME_SIZE && stored_len >= FILENAME_SIZE);
            if lengths_match && &dentry.filename[..len] == name {
                return Ok(dentry);
            }
        }
        Err(FsError::NotFound)
    }

    /// Bounds-checked constant-time lookup.
    pub fn find_dentry_by_index(&self, index: usize) -> Result<Dentry, FsError> {
        if index >= self.num_dentries() {
            return Err(FsError::OutOfRange);
        }
        self.dentry_at(index)
    }

    /// Copy up to `buf.len()` bytes of the file at `inode_index`, starting
    /// `offset` bytes in.
    ///
    /// Returns the bytes copied; `Ok(0)` is end-of-file, distinct from the
    /// error cases (bad inode, offset past the end, bad data-block index).
    pub fn read_data(
        &self,
        inode_index: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, FsError> {
        if inode_index >= self.stats.num_inodes {
            return Err(FsError::OutOfRange);
        }
        let length = self.inode_length(inode_index)?;
        if offset > length {
            return Err(FsError::OutOfRange);
        }
        if offset == length {
            return Ok(0);
        }

        let mut block = (offset as usize) / BLOCK_SIZE;
        let mut block_offset = (offset as usize) % BLOCK_SIZE;
        let mut data_block = self.checked_block_index(inode_index, block)?;
        let mut copied = 0usize;

        while copied < buf.len() {
            let remaining_in_file = (length - offset) as usize - copied;
            if remaining_in_file == 0 {
                break;
            }
            if block_offset == BLOCK_SIZE {
                block += 1;
                block_offset = 0;
                data_block = self.checked_block_index(inode_index, block)?;
            }
            let chunk = (buf.len() - copied)
                .min(BLOCK_SIZE - block_offset)
                .min(remaining_in_file);
            let source = self.data_block_offset(data_block) + block_offset;
            let bytes = self
                .image
                .get(source..source + chunk)
                .ok_or(FsError::Truncated)?;
            buf[copied..copied + chunk].copy_from_slice(bytes);
            copied += chunk;
            block_offset += chunk;
        }
        Ok(copied)
    }

    fn dentry_at(&self, index: usize) -> Result<Dentry, FsError> {
        let base = STATS_SIZE + index * DENTRY_SIZE;
        let bytes = self
            .image
            .get(base..base + DENTRY_SIZE)
            .ok_or(FsError::Truncated)?;
        let mut filename = [0u8; FILENAME_SIZE];
        filename.copy_from_slice(&bytes[..FILENAME_SIZE]);
        Ok(Dentry {
            filename,
            filetype: read_u32(bytes, FILENAME_SIZE).ok_or(FsError::Truncated)?,
            inode: read_u32(bytes, FILENAME_SIZE + 4).ok_or(FsError::Truncated)?,
        })
    }

    fn inode_offset(&self, inode_index: u32) -> usize {
        (1 + inode_index as usize) * BLOCK_SIZE
    }

    fn inode_length(&self, inode_index: u32) -> Result<u32, FsError> {
        read_u32(self.image, self.inode_offset(inode_index)).ok_or(FsError::Truncated)
    }

    /// Fetch the `block`-th data-block index of an inode, validating both
    /// the index slot and the index value.
    fn checked_block_index(&self, inode_index: u32, block: usize) -> Result<usize, FsError> {
        if block >= INDICES_PER_INODE {
            return Err(FsError::OutOfRange);
        }
        let offset = self.inode_offset(inode_index) + 4 + block * 4;
        let index = read_u32(self.image, offset).ok_or(FsError::Truncated)?;
        if index >= self.stats.num_datablocks {
            return Err(FsError::OutOfRange);
        }
        Ok(index as usize)
    }

    fn data_block_offset(&self, data_block: usize) -> usize {
        (1 + self.stats.num_inodes as usize + data_block) * BLOCK_SIZE
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

#[cfg(test)]
pub(crate) mod testimg {
    //! Builder for synthetic filesystem images.

    use super::*;

    pub struct ImageBuilder {
        entries: Vec<(Vec<u8>, u32, Vec<u8>)>,
    }

    impl ImageBuilder {
        pub fn new() -> Self {
            Self {
                entries: Vec::new(),
            }
        }

        /// Add a dentry. `data` is ignored for non-regular filetypes.
        pub fn file(mut self, name: &str, filetype: u32, data: &[u8]) -> Self {
            self.entries
                .push((name.as_bytes().to_vec(), filetype, data.to_vec()));
            self
        }

        pub fn build(self) -> &'static [u8] {
            let num_files = self.entries.len();
            let blocks_per_file: Vec<usize> = self
                .entries
                .iter()
                .map(|(_, _, data)| data.len().div_ceil(BLOCK_SIZE))
                .collect();
            let num_datablocks: usize = blocks_per_file.iter().sum();

            let total = (1 + num_files + num_datablocks) * BLOCK_SIZE;
            let mut image = vec![0u8; total];

            image[0..4].copy_from_slice(&(num_files as u32).to_le_bytes());
            image[4..8].copy_from_slice(&(num_files as u32).to_le_bytes());
            image[8..12].copy_from_slice(&(num_datablocks as u32).to_le_bytes());

            let mut next_block = 0u32;
            for (i, (name, filetype, data)) in self.entries.iter().enumerate() {
                let dentry = STATS_SIZE + i * DENTRY_SIZE;
                let name_len = name.len().min(FILENAME_SIZE);
                image[dentry..dentry + name_len].copy_from_slice(&name[..name_len]);
                image[dentry + 32..dentry + 36].copy_from_slice(&filetype.to_le_bytes());
                image[dentry + 36..dentry + 40].copy_from_slice(&(i as u32).to_le_bytes());

                let inode = (1 + i) * BLOCK_SIZE;
                image[inode..inode + 4].copy_from_slice(&(data.len() as u32).to_le_bytes());
                for b in 0..blocks_per_file[i] {
                    let slot = inode + 4 + b * 4;
                    image[slot..slot + 4].copy_from_slice(&next_block.to_le_bytes());
                    let data_start = (1 + num_files + next_block as usize) * BLOCK_SIZE;
                    let chunk_start = b * BLOCK_SIZE;
                    let chunk_end = data.len().min(chunk_start + BLOCK_SIZE);
                    image[data_start..data_start + (chunk_end - chunk_start)]
                        .copy_from_slice(&data[chunk_start..chunk_end]);
                    next_block += 1;
                }
            }
            Box::leak(image.into_boxed_slice())
        }
    }
}
