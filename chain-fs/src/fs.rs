//! # 卷层
//!
//! 构建出磁盘的布局并使用：分配表与目录都由 [`ChainFs`] 持有，
//! 文件句柄的每次操作都借用它。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;

use crate::file::FileHandle;
use crate::layout::{DiskInode, FatEntry, SuperBlock};
use crate::{AllocationTable, DataBlock, Directory, OpenMode, Statistics};
use crate::{BLOCK_SIZE, BlockId, DEFAULT_DIR_BLOCKS, FsError, Result};

/// 校验过的元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InodeRecord {
    pub length: usize,
    pub first: Option<BlockId>,
    pub last: Option<BlockId>,
}

/// 格式化时可调的卷参数
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// 目录占用的块数，决定了文件数上限
    pub dir_blocks: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            dir_blocks: DEFAULT_DIR_BLOCKS,
        }
    }
}

pub struct ChainFs {
    dev: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
    table: AllocationTable,
    dir: Directory,
}

impl ChainFs {
    /// 在整个设备上建立空卷
    pub fn format(dev: Arc<dyn BlockDevice>, options: FormatOptions) -> Result<Self> {
        let total_blocks = dev.block_count();
        if dev.block_size() != BLOCK_SIZE
            || options.dir_blocks == 0
            || total_blocks > FatEntry::ADDR_LIMIT as usize
            || total_blocks.saturating_mul(BLOCK_SIZE) > u32::MAX as usize
        {
            return Err(FsError::InvalidVolume);
        }

        let mut super_block = SuperBlock::default();
        super_block.init(total_blocks as u32, options.dir_blocks as u32);
        // 至少要容纳一个元数据块和一个数据块
        if super_block.data_start() + 2 > total_blocks {
            return Err(FsError::InvalidVolume);
        }

        let table = AllocationTable::format(
            dev.clone(),
            super_block.fat_area(),
            total_blocks,
            super_block.data_start(),
        );
        let dir = Directory::format(dev.clone(), super_block.dir_area());

        let mut block = DataBlock::zeroed();
        block.map_mut(0, |sb: &mut SuperBlock| *sb = super_block);
        block.write_to(dev.as_ref(), BlockId::new(0));

        log::info!(
            "format: {total_blocks} blocks, {} reserved, {} directory slots",
            super_block.data_start(),
            super_block.dir_slots()
        );

        Ok(Self {
            dev,
            super_block,
            table,
            dir,
        })
    }

    /// 挂载已格式化的卷
    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        if dev.block_size() != BLOCK_SIZE || dev.block_count() == 0 {
            return Err(FsError::InvalidVolume);
        }

        let super_block =
            DataBlock::read(dev.as_ref(), BlockId::new(0)).map(0, |sb: &SuperBlock| *sb);
        if !super_block.is_valid() || super_block.total_blocks as usize > dev.block_count() {
            return Err(FsError::InvalidVolume);
        }

        let table = AllocationTable::load(
            dev.clone(),
            super_block.fat_area(),
            super_block.total_blocks as usize,
            super_block.data_start(),
        )?;
        let dir = Directory::load(dev.clone(), super_block.dir_area())?;
        for (nth, (name, inode)) in dir.enumerate().enumerate() {
            if table.get(inode)? != FatEntry::Metadata {
                log::warn!("{name:?} is bound to block {inode} which holds no metadata");
                return Err(FsError::Corrupt);
            }
            // 名字与元数据块都必须一一对应
            if let Some((other, _)) = dir
                .enumerate()
                .skip(nth + 1)
                .find(|&(other, other_inode)| other == name || other_inode == inode)
            {
                log::warn!("{name:?} and {other:?} collide on block {inode}");
                return Err(FsError::Corrupt);
            }
        }

        log::info!(
            "mount: {} files, {} free blocks",
            dir.len(),
            table.free_block_count()
        );

        Ok(Self {
            dev,
            super_block,
            table,
            dir,
        })
    }

    /// 打开文件。
    ///
    /// - 读：文件须已存在，指针位于开头；
    /// - 写：新建空文件，同名的旧文件被回收；
    /// - 追加：文件须已存在，指针位于末尾。
    pub fn open(&mut self, name: &str, mode: OpenMode) -> Result<FileHandle> {
        match mode {
            OpenMode::Read => FileHandle::open_read(self, name),
            OpenMode::Write => FileHandle::open_write(self, name),
            OpenMode::Append => FileHandle::open_append(self, name),
        }
    }

    /// 回收`inode`描述的文件：链上的所有块以及元数据块本身。
    ///
    /// 先完整走一遍链再释放，链损坏时不会留下释放了一半的状态。
    /// 仍指向`inode`的目录项一并解除，元数据块被重新分配后不会有旧名字指向它。
    pub fn remove(&mut self, inode: BlockId) -> Result<()> {
        let record = self.load_inode(inode)?;

        let mut chain = Vec::new();
        let mut next = record.first;
        while let Some(block) = next {
            // 链长不可能超过块总数，超过即有环
            if chain.len() == self.table.block_count() {
                log::warn!("chain of inode {inode} does not terminate");
                return Err(FsError::Corrupt);
            }
            chain.push(block);
            next = self.table.chain_next(block)?;
        }

        let unbound = self.dir.unbind_inode(inode);
        if unbound > 0 {
            log::debug!("inode {inode}: {unbound} directory entries released");
        }
        for &block in &chain {
            self.table.free(block);
        }
        self.table.free(inode);
        log::debug!(
            "remove inode {inode}: {} blocks, {} free",
            chain.len(),
            self.table.free_block_count()
        );

        Ok(())
    }

    /// 删除名为`name`的文件
    pub fn remove_file(&mut self, name: &str) -> Result<()> {
        let inode = self.dir.lookup(name)?;
        self.remove(inode)
    }

    #[inline]
    pub fn exists(&self, name: &str) -> bool {
        self.dir.lookup(name).is_ok()
    }

    /// 列出所有文件名及其元数据块
    pub fn files(&self) -> impl Iterator<Item = (&str, BlockId)> + '_ {
        self.dir.enumerate()
    }

    pub fn file_len(&self, name: &str) -> Result<usize> {
        let inode = self.dir.lookup(name)?;
        self.read_inode(inode).map(|disk_inode| disk_inode.length as usize)
    }

    #[inline]
    pub fn free_block_count(&self) -> usize {
        self.table.free_block_count()
    }

    #[inline]
    pub fn statistics(&self) -> Statistics {
        self.table.statistics()
    }

    /// 每个块的记录，供外部工具展示
    pub fn block_map(&self) -> impl Iterator<Item = (BlockId, FatEntry)> + '_ {
        self.table.entries()
    }

    #[inline]
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.dir
    }

    #[inline]
    pub fn total_blocks(&self) -> usize {
        self.super_block.total_blocks as usize
    }

    /// 数据区（元数据块与数据块）的字节数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.super_block.data_bytes()
    }
}

impl ChainFs {
    #[inline]
    pub(crate) fn table_mut(&mut self) -> &mut AllocationTable {
        &mut self.table
    }

    #[inline]
    pub(crate) fn directory_mut(&mut self) -> &mut Directory {
        &mut self.dir
    }

    #[inline]
    pub(crate) fn read_block(&self, id: BlockId, block: &mut DataBlock) {
        block.read_from(self.dev.as_ref(), id);
    }

    #[inline]
    pub(crate) fn write_block(&self, id: BlockId, block: &DataBlock) {
        block.write_to(self.dev.as_ref(), id);
    }

    /// 读出元数据并校验
    pub(crate) fn load_inode(&self, inode: BlockId) -> Result<InodeRecord> {
        let disk_inode = self.read_inode(inode)?;
        let (first, last) = disk_inode.chain().ok_or_else(|| {
            log::warn!("inode {inode} holds {disk_inode:?}");
            FsError::Corrupt
        })?;

        if let Some(first) = first {
            if !matches!(
                self.table.get(first)?,
                FatEntry::Next(_) | FatEntry::EndOfChain
            ) {
                return Err(FsError::Corrupt);
            }
        }
        if let Some(last) = last {
            if self.table.get(last)? != FatEntry::EndOfChain {
                return Err(FsError::Corrupt);
            }
        }

        Ok(InodeRecord {
            length: disk_inode.length as usize,
            first,
            last,
        })
    }

    fn read_inode(&self, inode: BlockId) -> Result<DiskInode> {
        if self.table.get(inode)? != FatEntry::Metadata {
            log::warn!("block {inode} holds no metadata");
            return Err(FsError::Corrupt);
        }
        Ok(DataBlock::read(self.dev.as_ref(), inode).map(0, |disk_inode: &DiskInode| *disk_inode))
    }

    pub(crate) fn write_inode(&self, inode: BlockId, disk_inode: DiskInode) {
        let mut block = DataBlock::zeroed();
        block.map_mut(0, |slot: &mut DiskInode| *slot = disk_inode);
        self.write_block(inode, &block);
    }
}

impl core::fmt::Debug for ChainFs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChainFs")
            .field("super_block", &self.super_block)
            .field("table", &self.table)
            .field("dir", &self.dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use block_dev::RamDisk;

    use super::*;

    fn ram_disk(blocks: usize) -> Arc<dyn BlockDevice> {
        Arc::new(RamDisk::new(BLOCK_SIZE, blocks))
    }

    #[test]
    fn geometry() {
        let fs = ChainFs::format(ram_disk(64), FormatOptions::default()).unwrap();
        // 超级块 + 2个表块 + 4个目录块
        let stat = fs.statistics();
        assert_eq!(7, stat.reserved_blocks);
        assert_eq!(57, stat.free_blocks);
        assert_eq!(57 * BLOCK_SIZE, fs.capacity());
        assert_eq!(16, fs.directory().capacity());
    }

    #[test]
    fn rejects_bad_devices() {
        let wrong_size: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(512, 64));
        assert!(matches!(
            ChainFs::format(wrong_size, FormatOptions::default()),
            Err(FsError::InvalidVolume)
        ));
        assert!(matches!(
            ChainFs::format(ram_disk(7), FormatOptions::default()),
            Err(FsError::InvalidVolume)
        ));
        assert!(matches!(
            ChainFs::mount(ram_disk(64)),
            Err(FsError::InvalidVolume)
        ));
    }

    #[test]
    fn remove_empty_file() {
        let mut fs = ChainFs::format(ram_disk(64), FormatOptions::default()).unwrap();
        let before = fs.free_block_count();

        fs.open("empty", OpenMode::Write).unwrap().close(&mut fs).unwrap();
        assert_eq!(before - 1, fs.free_block_count());

        fs.remove_file("empty").unwrap();
        assert_eq!(before, fs.free_block_count());
        assert!(!fs.exists("empty"));
        assert!(matches!(fs.remove_file("empty"), Err(FsError::NotFound)));
    }

    #[test]
    fn cyclic_chain_is_corrupt() {
        let mut fs = ChainFs::format(ram_disk(64), FormatOptions::default()).unwrap();
        let mut file = fs.open("loop", OpenMode::Write).unwrap();
        file.write(&[7; 3 * BLOCK_SIZE], &mut fs).unwrap();
        file.close(&mut fs).unwrap();

        let inode = fs.directory().lookup("loop").unwrap();
        let first = fs.load_inode(inode).unwrap().first.unwrap();
        let middle = fs.table().chain_next(first).unwrap().unwrap();
        let free = fs.free_block_count();

        // 中间块指回首块，尾块不再可达
        fs.table_mut().link(middle, first);
        assert!(matches!(fs.remove(inode), Err(FsError::Corrupt)));
        assert_eq!(free, fs.free_block_count());
    }

    #[test]
    fn debug_output() {
        let fs = ChainFs::format(ram_disk(64), FormatOptions::default()).unwrap();
        let text = format!("{fs:?}");
        assert!(text.starts_with("ChainFs"));
        assert!(text.contains("super_block"));
        assert!(text.contains("AllocationTable"));
    }

    #[test]
    fn remove_releases_name() {
        let mut fs = ChainFs::format(ram_disk(64), FormatOptions::default()).unwrap();
        let free = fs.free_block_count();

        let mut file = fs.open("a", OpenMode::Write).unwrap();
        file.put_str("hello", &mut fs).unwrap();
        file.close(&mut fs).unwrap();
        let inode = fs.directory().lookup("a").unwrap();

        fs.remove(inode).unwrap();
        assert!(!fs.exists("a"));
        assert_eq!(free, fs.free_block_count());

        // 新文件拿到同一个元数据块，目录里只有它
        let mut file = fs.open("b", OpenMode::Write).unwrap();
        file.put_str("world", &mut fs).unwrap();
        file.close(&mut fs).unwrap();
        assert_eq!(Ok(inode), fs.directory().lookup("b"));
        assert_eq!(1, fs.files().count());
        assert!(matches!(fs.remove_file("a"), Err(FsError::NotFound)));
        assert_eq!(Ok(5), fs.file_len("b"));
    }

    #[test]
    fn shared_inode_is_corrupt() {
        let dev = ram_disk(64);
        let mut fs = ChainFs::format(dev.clone(), FormatOptions::default()).unwrap();
        fs.open("a", OpenMode::Write).unwrap().close(&mut fs).unwrap();
        let inode = fs.directory().lookup("a").unwrap();

        fs.directory_mut().bind("b", inode).unwrap();
        assert!(matches!(ChainFs::mount(dev), Err(FsError::Corrupt)));
    }
}
