//! # 分配表
//!
//! 每个块在表中都有一条 [`FatEntry`]，既记录空闲与否，也把文件的块串成单向链表。
//! 表常驻内存，任何修改都会立刻写回它所在的表块。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use block_dev::BlockDevice;

use crate::layout::FatEntry;
use crate::{BLOCK_SIZE, BlockId, DataBlock, FsError, Result};

type FatBlock = [u32; FatEntry::PER_BLOCK];

pub struct AllocationTable {
    dev: Arc<dyn BlockDevice>,
    /// 表所在的块
    area: Range<usize>,
    entries: Vec<FatEntry>,
    /// 第一个可分配的块
    data_start: usize,
    free: usize,
}

/// 按记录类型统计的块数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub reserved_blocks: usize,
    pub metadata_blocks: usize,
    pub end_of_chain_blocks: usize,
    pub data_blocks: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
}

impl AllocationTable {
    /// 建立新表：`data_start`之前的块保留，其余空闲
    pub fn format(
        dev: Arc<dyn BlockDevice>,
        area: Range<usize>,
        total_blocks: usize,
        data_start: usize,
    ) -> Self {
        let mut entries = vec![FatEntry::Free; total_blocks];
        entries[..data_start].fill(FatEntry::Reserved);

        let table = Self {
            dev,
            area,
            entries,
            data_start,
            free: total_blocks - data_start,
        };
        for nth in 0..table.area.len() {
            table.sync(nth);
        }
        table
    }

    /// 读回已有的表，并校验每条记录
    pub fn load(
        dev: Arc<dyn BlockDevice>,
        area: Range<usize>,
        total_blocks: usize,
        data_start: usize,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(total_blocks);
        for bid in area.clone() {
            let block = DataBlock::read(dev.as_ref(), BlockId::new(bid as u32));
            block.map(0, |raw: &FatBlock| {
                let remain = total_blocks - entries.len();
                entries.extend(raw.iter().take(remain).map(|&raw| FatEntry::from(raw)));
            });
        }

        let mut table = Self {
            dev,
            area,
            entries,
            data_start,
            free: 0,
        };

        for (i, &entry) in table.entries.iter().enumerate() {
            let valid = match entry {
                FatEntry::Reserved => i < data_start,
                _ if i < data_start => false,
                FatEntry::Next(next) => table.is_data(next) && next.index() != i,
                _ => true,
            };
            if !valid {
                log::warn!("allocation table entry {i} is {entry:?}");
                return Err(FsError::Corrupt);
            }
        }
        table.free = table.count(FatEntry::Free);

        Ok(table)
    }

    /// 分配编号最小的空闲块。
    ///
    /// 新块先标记为链尾，调用者再按用途改写。
    pub fn allocate(&mut self) -> Result<BlockId> {
        let index = self.entries[self.data_start..]
            .iter()
            .position(|&entry| entry == FatEntry::Free)
            .map(|i| i + self.data_start)
            .ok_or(FsError::DiskFull)?;

        let id = BlockId::new(index as u32);
        self.set(id, FatEntry::EndOfChain);
        log::debug!("allocate block {id}, {} left", self.free);

        Ok(id)
    }

    #[inline]
    pub fn free(&mut self, id: BlockId) {
        self.set(id, FatEntry::Free);
    }

    /// 把`next`接在`id`之后
    #[inline]
    pub fn link(&mut self, id: BlockId, next: BlockId) {
        debug_assert!(self.is_data(next));
        self.set(id, FatEntry::Next(next));
    }

    pub fn set(&mut self, id: BlockId, entry: FatEntry) {
        let index = id.index();
        debug_assert!(index >= self.data_start, "block {id} is reserved");

        let old = core::mem::replace(&mut self.entries[index], entry);
        match (old, entry) {
            (FatEntry::Free, FatEntry::Free) => {}
            (FatEntry::Free, _) => self.free -= 1,
            (_, FatEntry::Free) => self.free += 1,
            _ => {}
        }
        self.sync(index / FatEntry::PER_BLOCK);
    }

    pub fn get(&self, id: BlockId) -> Result<FatEntry> {
        self.entries
            .get(id.index())
            .copied()
            .ok_or(FsError::Corrupt)
    }

    /// 获取链上的下一块。
    /// `Ok(None)`表示`id`为链上最后一块；`id`不在任何链上则报错。
    pub fn chain_next(&self, id: BlockId) -> Result<Option<BlockId>> {
        match self.get(id)? {
            FatEntry::Next(next) => {
                log::trace!("chain {id} -> {next}");
                Ok(Some(next))
            }
            FatEntry::EndOfChain => Ok(None),
            entry => {
                log::warn!("block {id} is {entry:?} but reached through a chain");
                Err(FsError::Corrupt)
            }
        }
    }

    #[inline]
    pub fn free_block_count(&self) -> usize {
        self.free
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.entries.len()
    }

    /// 可分配区域内的块
    #[inline]
    pub fn is_data(&self, id: BlockId) -> bool {
        (self.data_start..self.entries.len()).contains(&id.index())
    }

    pub fn statistics(&self) -> Statistics {
        let mut stat = Statistics::default();
        for entry in &self.entries {
            match entry {
                FatEntry::Free => stat.free_blocks += 1,
                FatEntry::EndOfChain => stat.end_of_chain_blocks += 1,
                FatEntry::Metadata => stat.metadata_blocks += 1,
                FatEntry::Reserved => stat.reserved_blocks += 1,
                FatEntry::Next(_) => stat.data_blocks += 1,
            }
        }
        stat.free_bytes = stat.free_blocks * BLOCK_SIZE;
        stat
    }

    /// 全部块及其记录
    pub fn entries(&self) -> impl Iterator<Item = (BlockId, FatEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, &entry)| (BlockId::new(i as u32), entry))
    }
}

impl AllocationTable {
    fn count(&self, target: FatEntry) -> usize {
        self.entries.iter().filter(|&&entry| entry == target).count()
    }

    /// 写回第`nth`个表块
    fn sync(&self, nth: usize) {
        let start = nth * FatEntry::PER_BLOCK;
        let end = (start + FatEntry::PER_BLOCK).min(self.entries.len());

        let mut block = DataBlock::zeroed();
        block.map_mut(0, |raw: &mut FatBlock| {
            for (raw, &entry) in raw.iter_mut().zip(&self.entries[start..end]) {
                *raw = entry.into();
            }
        });
        block.write_to(self.dev.as_ref(), BlockId::new((self.area.start + nth) as u32));
    }
}

impl core::fmt::Debug for AllocationTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AllocationTable")
            .field("area", &self.area)
            .field("blocks", &self.entries.len())
            .field("free", &self.free)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use block_dev::RamDisk;

    use super::*;

    /// 0号为超级块，1~2号为表，共40块
    fn table() -> (Arc<dyn BlockDevice>, AllocationTable) {
        let dev: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(BLOCK_SIZE, 40));
        let table = AllocationTable::format(dev.clone(), 1..3, 40, 3);
        (dev, table)
    }

    #[test]
    fn lowest_free_first() {
        let (_, mut table) = table();
        assert_eq!(37, table.free_block_count());

        let a = table.allocate().unwrap();
        let b = table.allocate().unwrap();
        assert_eq!((3, 4), (a.index(), b.index()));
        assert_eq!(FatEntry::EndOfChain, table.get(a).unwrap());

        table.free(a);
        assert_eq!(a, table.allocate().unwrap());
        assert_eq!(35, table.free_block_count());
    }

    #[test]
    fn disk_full() {
        let (_, mut table) = table();
        for _ in 0..37 {
            table.allocate().unwrap();
        }
        assert_eq!(Err(FsError::DiskFull), table.allocate());
        assert_eq!(0, table.statistics().free_bytes);
    }

    #[test]
    fn chain() {
        let (_, mut table) = table();
        let a = table.allocate().unwrap();
        let b = table.allocate().unwrap();
        table.link(a, b);

        assert_eq!(Ok(Some(b)), table.chain_next(a));
        assert_eq!(Ok(None), table.chain_next(b));
        assert_eq!(Err(FsError::Corrupt), table.chain_next(BlockId::new(20)));
        assert_eq!(Err(FsError::Corrupt), table.chain_next(BlockId::new(0)));
        assert_eq!(Err(FsError::Corrupt), table.get(BlockId::new(40)));
    }

    #[test]
    fn statistics() {
        let (_, mut table) = table();
        let inode = table.allocate().unwrap();
        table.set(inode, FatEntry::Metadata);
        let a = table.allocate().unwrap();
        let b = table.allocate().unwrap();
        table.link(a, b);

        assert_eq!(
            Statistics {
                reserved_blocks: 3,
                metadata_blocks: 1,
                end_of_chain_blocks: 1,
                data_blocks: 1,
                free_blocks: 34,
                free_bytes: 34 * BLOCK_SIZE,
            },
            table.statistics()
        );
    }

    #[test]
    fn write_through() {
        let (dev, mut table) = table();
        let a = table.allocate().unwrap();
        let b = table.allocate().unwrap();
        table.link(a, b);
        // 第二个表块上的记录
        let c = BlockId::new(35);
        table.set(c, FatEntry::Metadata);

        let loaded = AllocationTable::load(dev, 1..3, 40, 3).unwrap();
        assert_eq!(Ok(FatEntry::Next(b)), loaded.get(a));
        assert_eq!(Ok(FatEntry::Metadata), loaded.get(c));
        assert_eq!(table.free_block_count(), loaded.free_block_count());
    }

    #[test]
    fn corrupt_link_rejected() {
        let (dev, mut table) = table();
        let a = table.allocate().unwrap();
        table.set(a, FatEntry::Next(a));

        assert!(matches!(
            AllocationTable::load(dev, 1..3, 40, 3),
            Err(FsError::Corrupt)
        ));
    }
}
