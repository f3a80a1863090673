//! # 目录
//!
//! 扁平的文件名到元数据块地址的映射，由目录区内定长的槽位组成。
//! 槽位常驻内存，修改时只写回该槽位所在的目录块。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use block_dev::BlockDevice;

use crate::layout::DirEntry;
use crate::{BlockId, DataBlock, FsError, Result};

type DirBlock = [DirEntry; DirEntry::PER_BLOCK];

pub struct Directory {
    dev: Arc<dyn BlockDevice>,
    /// 目录所在的块
    area: Range<usize>,
    slots: Vec<Option<Binding>>,
}

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    inode: BlockId,
}

impl Directory {
    /// 清空目录区
    pub fn format(dev: Arc<dyn BlockDevice>, area: Range<usize>) -> Self {
        let dir = Self {
            dev,
            slots: vec![None; area.len() * DirEntry::PER_BLOCK],
            area,
        };
        for nth in 0..dir.area.len() {
            dir.sync(nth * DirEntry::PER_BLOCK);
        }
        dir
    }

    pub fn load(dev: Arc<dyn BlockDevice>, area: Range<usize>) -> Result<Self> {
        let mut slots = Vec::with_capacity(area.len() * DirEntry::PER_BLOCK);
        for bid in area.clone() {
            let block = DataBlock::read(dev.as_ref(), BlockId::new(bid as u32));
            for entry in block.get::<DirBlock>(0) {
                if entry.is_empty() {
                    slots.push(None);
                    continue;
                }
                let name = entry.name().map_err(|_| {
                    log::warn!("directory block {bid} holds a non UTF-8 name");
                    FsError::Corrupt
                })?;
                slots.push(Some(Binding {
                    name: name.to_string(),
                    inode: entry.inode(),
                }));
            }
        }

        Ok(Self { dev, area, slots })
    }

    pub fn lookup(&self, name: &str) -> Result<BlockId> {
        self.position(name)
            .and_then(|slot| self.slots[slot].as_ref())
            .map(|binding| binding.inode)
            .ok_or(FsError::NotFound)
    }

    /// 绑定`name`到`inode`。
    ///
    /// 同名项原地替换，返回原先的元数据块交由调用者回收；
    /// 替换只改写一个槽位，任何时刻都不会出现两个同名项。
    pub fn bind(&mut self, name: &str, inode: BlockId) -> Result<Option<BlockId>> {
        DirEntry::check_name(name)?;

        let (slot, previous) = match self.position(name) {
            Some(slot) => (slot, self.slots[slot].as_ref().map(|b| b.inode)),
            None => (
                self.slots
                    .iter()
                    .position(Option::is_none)
                    .ok_or(FsError::DirectoryFull)?,
                None,
            ),
        };

        self.slots[slot] = Some(Binding {
            name: name.to_string(),
            inode,
        });
        self.sync(slot);

        Ok(previous)
    }

    /// 解除绑定，返回元数据块
    pub fn unbind(&mut self, name: &str) -> Result<BlockId> {
        let slot = self.position(name).ok_or(FsError::NotFound)?;
        let inode = self.slots[slot]
            .take()
            .map(|binding| binding.inode)
            .ok_or(FsError::NotFound)?;
        self.sync(slot);

        Ok(inode)
    }

    /// 解除所有指向`inode`的绑定，返回解除的项数
    pub fn unbind_inode(&mut self, inode: BlockId) -> usize {
        let mut count = 0;
        for slot in 0..self.slots.len() {
            if self.slots[slot]
                .as_ref()
                .is_some_and(|binding| binding.inode == inode)
            {
                self.slots[slot] = None;
                self.sync(slot);
                count += 1;
            }
        }
        count
    }

    /// 按槽位顺序列出所有项
    pub fn enumerate(&self) -> impl Iterator<Item = (&str, BlockId)> + '_ {
        self.slots
            .iter()
            .flatten()
            .map(|binding| (binding.name.as_str(), binding.inode))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl Directory {
    fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|binding| binding.name == name)
        })
    }

    /// 写回`slot`所在的目录块
    fn sync(&self, slot: usize) {
        let nth = slot / DirEntry::PER_BLOCK;
        let start = nth * DirEntry::PER_BLOCK;

        let mut block = DataBlock::zeroed();
        block.map_mut(0, |entries: &mut DirBlock| {
            for (entry, slot) in entries.iter_mut().zip(&self.slots[start..]) {
                if let Some(binding) = slot {
                    *entry = DirEntry::new(&binding.name, binding.inode);
                }
            }
        });
        block.write_to(self.dev.as_ref(), BlockId::new((self.area.start + nth) as u32));
    }
}

impl core::fmt::Debug for Directory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Directory")
            .field("area", &self.area)
            .field("slots", &self.slots)
            .finish()
    }
}
