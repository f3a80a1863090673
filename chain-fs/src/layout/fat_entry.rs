use crate::BLOCK_SIZE;
use crate::BlockId;

/// 每个块在分配表中的记录。
///
/// 落盘时编码为一个`u32`：
/// `0`为空闲，最大的三个值为哨兵，其余为链上下一块的地址。
/// 0号块是超级块，不可能成为链上的块，所以`0`可以表示空闲。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    /// 链尾
    EndOfChain,
    /// 存放文件元数据
    Metadata,
    /// 超级块、分配表与目录
    Reserved,
    Next(BlockId),
}

impl FatEntry {
    /// 一块能容纳多少条记录
    pub const PER_BLOCK: usize = BLOCK_SIZE / core::mem::size_of::<u32>();

    const FREE: u32 = 0;
    const EOF: u32 = u32::MAX;
    const METADATA: u32 = u32::MAX - 1;
    const RESERVED: u32 = u32::MAX - 2;

    /// 可以作为块地址的最大值（不含）
    pub const ADDR_LIMIT: u32 = Self::RESERVED;

    /// 元数据里的首块、尾块只可能是地址或链尾
    #[inline]
    pub fn encode_link(link: Option<BlockId>) -> u32 {
        link.map_or(Self::EOF, u32::from)
    }

    pub fn decode_link(raw: u32) -> Option<Option<BlockId>> {
        match Self::from(raw) {
            Self::EndOfChain => Some(None),
            Self::Next(id) => Some(Some(id)),
            _ => None,
        }
    }
}

impl From<u32> for FatEntry {
    fn from(raw: u32) -> Self {
        match raw {
            Self::FREE => Self::Free,
            Self::EOF => Self::EndOfChain,
            Self::METADATA => Self::Metadata,
            Self::RESERVED => Self::Reserved,
            next => Self::Next(BlockId::new(next)),
        }
    }
}

impl From<FatEntry> for u32 {
    fn from(entry: FatEntry) -> Self {
        match entry {
            FatEntry::Free => FatEntry::FREE,
            FatEntry::EndOfChain => FatEntry::EOF,
            FatEntry::Metadata => FatEntry::METADATA,
            FatEntry::Reserved => FatEntry::RESERVED,
            FatEntry::Next(id) => id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels() {
        assert_eq!(FatEntry::Free, 0.into());
        assert_eq!(FatEntry::EndOfChain, u32::MAX.into());
        assert_eq!(FatEntry::Next(BlockId::new(42)), 42.into());
        assert_eq!(u32::MAX - 2, u32::from(FatEntry::Reserved));
        assert_eq!(32, FatEntry::PER_BLOCK);
    }

    #[test]
    fn links() {
        assert_eq!(u32::MAX, FatEntry::encode_link(None));
        assert_eq!(Some(None), FatEntry::decode_link(u32::MAX));
        assert_eq!(Some(Some(BlockId::new(9))), FatEntry::decode_link(9));
        assert_eq!(None, FatEntry::decode_link(0));
        assert_eq!(None, FatEntry::decode_link(u32::MAX - 1));
    }
}
