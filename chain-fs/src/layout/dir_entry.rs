use core::str::{self, Utf8Error};

use crate::block::Plain;
use crate::{BlockId, FsError, NAME_MAX_LEN};

/// 目录项：文件名与元数据块地址
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    inode: u32,
}

unsafe impl Plain for DirEntry {}

impl DirEntry {
    /// 目录项大小恒为32字节
    pub const SIZE: usize = 32;
    pub const PER_BLOCK: usize = crate::BLOCK_SIZE / Self::SIZE;

    /// `name`须已通过[`DirEntry::check_name`]
    pub fn new(name: &str, inode: BlockId) -> Self {
        let bytes = name.as_bytes();
        let mut raw = [0; NAME_MAX_LEN + 1];
        raw[..bytes.len()].copy_from_slice(bytes);

        Self {
            name: raw,
            inode: inode.into(),
        }
    }

    pub fn check_name(name: &str) -> Result<(), FsError> {
        if name.is_empty() || name.len() > NAME_MAX_LEN || name.contains('\0') {
            Err(FsError::NameTooLong)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    pub fn name(&self) -> Result<&str, Utf8Error> {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        str::from_utf8(&self.name[..len])
    }

    #[inline]
    pub fn inode(&self) -> BlockId {
        BlockId::new(self.inode)
    }
}

#[cfg(test)]
mod tests {
    use core::mem;

    use super::*;

    #[test]
    fn size() {
        assert_eq!(DirEntry::SIZE, mem::size_of::<DirEntry>());
        assert_eq!(4, DirEntry::PER_BLOCK);
    }

    #[test]
    fn names() {
        let entry = DirEntry::new("essai.txt", BlockId::new(30));
        assert_eq!(Ok("essai.txt"), entry.name());
        assert_eq!(BlockId::new(30), entry.inode());
        assert!(DirEntry::default().is_empty());

        assert_eq!(Err(FsError::NameTooLong), DirEntry::check_name(""));
        assert_eq!(
            Err(FsError::NameTooLong),
            DirEntry::check_name("a-name-that-is-28-bytes-long")
        );
        assert!(DirEntry::check_name("exactly-27-bytes-long-name!").is_ok());
    }
}
