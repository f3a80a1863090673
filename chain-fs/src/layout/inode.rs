use crate::block::Plain;
use crate::layout::FatEntry;
use crate::BlockId;

/// 文件的元数据，独占一块，位于块首。
///
/// 首块与尾块按分配表项编码：无数据时为链尾。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    /// 文件字节数
    pub length: u32,
    first: u32,
    last: u32,
}

unsafe impl Plain for DiskInode {}

impl DiskInode {
    #[inline]
    pub fn empty() -> Self {
        Self::new(0, None, None)
    }

    #[inline]
    pub fn new(length: u32, first: Option<BlockId>, last: Option<BlockId>) -> Self {
        Self {
            length,
            first: FatEntry::encode_link(first),
            last: FatEntry::encode_link(last),
        }
    }

    /// 解出首块与尾块；编码非法或与长度矛盾时返回空
    pub fn chain(&self) -> Option<(Option<BlockId>, Option<BlockId>)> {
        let first = FatEntry::decode_link(self.first)?;
        let last = FatEntry::decode_link(self.last)?;

        match (self.length, first, last) {
            (0, None, None) => Some((None, None)),
            (1.., Some(_), Some(_)) => Some((first, last)),
            _ => None,
        }
    }
}
